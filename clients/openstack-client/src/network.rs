// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Neutron v2.0: networks, subnets, routers, security groups, ports and
//! floating IPs

use crate::exactly_one;
use crate::Client;
use crate::Error;
use crate::Named;
use ipnetwork::IpNetwork;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use std::net::IpAddr;
use tierctl_common::api::external;
use tierctl_common::api::external::IpVersion;

/// `device_owner` of the ports that connect a router to its subnets
pub const ROUTER_INTERFACE_OWNER: &str = "network:router_interface";

#[derive(Clone, Debug, Deserialize)]
pub struct NetworkView {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "router:external")]
    pub external: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SubnetView {
    pub id: String,
    pub name: String,
    pub network_id: String,
    pub cidr: IpNetwork,
    pub ip_version: IpVersion,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ExternalGatewayInfo {
    pub network_id: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RouterView {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub external_gateway_info: Option<ExternalGatewayInfo>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SecurityGroupView {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FixedIp {
    pub subnet_id: String,
    pub ip_address: IpAddr,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PortView {
    pub id: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub device_owner: String,
    #[serde(default)]
    pub fixed_ips: Vec<FixedIp>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FloatingIpView {
    pub id: String,
    pub floating_ip_address: IpAddr,
    pub floating_network_id: String,
    #[serde(default)]
    pub port_id: Option<String>,
}

macro_rules! impl_named {
    ($($view:ty),*) => {
        $(
            impl Named for $view {
                fn name(&self) -> &str {
                    &self.name
                }
            }
        )*
    };
}

impl_named!(NetworkView, SubnetView, RouterView, SecurityGroupView);

#[derive(Deserialize)]
struct NetworkList {
    networks: Vec<NetworkView>,
}

#[derive(Deserialize)]
struct NetworkBody {
    network: NetworkView,
}

#[derive(Deserialize)]
struct SubnetList {
    subnets: Vec<SubnetView>,
}

#[derive(Deserialize)]
struct SubnetBody {
    subnet: SubnetView,
}

#[derive(Deserialize)]
struct RouterList {
    routers: Vec<RouterView>,
}

#[derive(Deserialize)]
struct RouterBody {
    router: RouterView,
}

#[derive(Deserialize)]
struct SecurityGroupList {
    security_groups: Vec<SecurityGroupView>,
}

#[derive(Deserialize)]
struct PortList {
    ports: Vec<PortView>,
}

#[derive(Deserialize)]
struct FloatingIpList {
    floatingips: Vec<FloatingIpView>,
}

#[derive(Deserialize)]
struct FloatingIpBody {
    floatingip: FloatingIpView,
}

impl Client {
    fn network_url(&self, path: &str) -> String {
        format!("{}/v2.0/{}", self.endpoints.network, path)
    }

    async fn list_by_name<T>(&self, collection: &str, name: &str) -> Result<T, Error>
    where
        T: serde::de::DeserializeOwned,
    {
        let builder = self
            .request(Method::GET, &self.network_url(collection))
            .query(&[("name", name)]);
        self.get(builder).await
    }

    pub async fn network_find(
        &self,
        name: &str,
    ) -> Result<Option<NetworkView>, Error> {
        let list: NetworkList = self.list_by_name("networks", name).await?;
        exactly_one("network", name, list.networks)
    }

    pub async fn network_create(
        &self,
        params: &external::NetworkCreate,
    ) -> Result<NetworkView, Error> {
        let body = json!({
            "network": { "name": params.name, "admin_state_up": true }
        });
        let created: NetworkBody =
            self.post(&self.network_url("networks"), &body).await?;
        Ok(created.network)
    }

    pub async fn network_delete(&self, id: &str) -> Result<(), Error> {
        self.delete(&self.network_url(&format!("networks/{}", id))).await
    }

    pub async fn subnet_find(
        &self,
        name: &str,
    ) -> Result<Option<SubnetView>, Error> {
        let list: SubnetList = self.list_by_name("subnets", name).await?;
        exactly_one("subnet", name, list.subnets)
    }

    pub async fn subnet_create(
        &self,
        params: &external::SubnetCreate,
    ) -> Result<SubnetView, Error> {
        let body = json!({
            "subnet": {
                "name": params.name,
                "network_id": params.network_id,
                "cidr": params.cidr.to_string(),
                "ip_version": u8::from(params.ip_version),
            }
        });
        let created: SubnetBody =
            self.post(&self.network_url("subnets"), &body).await?;
        Ok(created.subnet)
    }

    pub async fn subnet_delete(&self, id: &str) -> Result<(), Error> {
        self.delete(&self.network_url(&format!("subnets/{}", id))).await
    }

    pub async fn router_find(
        &self,
        name: &str,
    ) -> Result<Option<RouterView>, Error> {
        let list: RouterList = self.list_by_name("routers", name).await?;
        exactly_one("router", name, list.routers)
    }

    /// Create a router whose gateway is on `external_network_id`
    pub async fn router_create(
        &self,
        name: &str,
        external_network_id: &str,
    ) -> Result<RouterView, Error> {
        let body = json!({
            "router": {
                "name": name,
                "admin_state_up": true,
                "external_gateway_info": { "network_id": external_network_id },
            }
        });
        let created: RouterBody =
            self.post(&self.network_url("routers"), &body).await?;
        Ok(created.router)
    }

    pub async fn router_add_interface(
        &self,
        router_id: &str,
        subnet_id: &str,
    ) -> Result<(), Error> {
        let url = self
            .network_url(&format!("routers/{}/add_router_interface", router_id));
        let _: serde_json::Value =
            self.put(&url, &json!({ "subnet_id": subnet_id })).await?;
        Ok(())
    }

    /// Detach the interface that is connected through `port_id`
    pub async fn router_remove_interface(
        &self,
        router_id: &str,
        port_id: &str,
    ) -> Result<(), Error> {
        let url = self.network_url(&format!(
            "routers/{}/remove_router_interface",
            router_id
        ));
        let _: serde_json::Value =
            self.put(&url, &json!({ "port_id": port_id })).await?;
        Ok(())
    }

    pub async fn router_delete(&self, id: &str) -> Result<(), Error> {
        self.delete(&self.network_url(&format!("routers/{}", id))).await
    }

    pub async fn security_group_find(
        &self,
        name: &str,
    ) -> Result<Option<SecurityGroupView>, Error> {
        let list: SecurityGroupList =
            self.list_by_name("security-groups", name).await?;
        exactly_one("security group", name, list.security_groups)
    }

    /// List the ports attached to a device (a server or a router)
    pub async fn port_list(&self, device_id: &str) -> Result<Vec<PortView>, Error> {
        let builder = self
            .request(Method::GET, &self.network_url("ports"))
            .query(&[("device_id", device_id)]);
        let list: PortList = self.get(builder).await?;
        Ok(list.ports)
    }

    /// Allocate a floating IP from the external network
    pub async fn floating_ip_create(
        &self,
        params: &external::FloatingIpCreate,
    ) -> Result<FloatingIpView, Error> {
        let body = json!({
            "floatingip": { "floating_network_id": params.floating_network_id }
        });
        let created: FloatingIpBody =
            self.post(&self.network_url("floatingips"), &body).await?;
        Ok(created.floatingip)
    }

    /// List the floating IPs associated with `port_id`
    pub async fn floating_ip_list(
        &self,
        port_id: &str,
    ) -> Result<Vec<FloatingIpView>, Error> {
        let builder = self
            .request(Method::GET, &self.network_url("floatingips"))
            .query(&[("port_id", port_id)]);
        let list: FloatingIpList = self.get(builder).await?;
        Ok(list.floatingips)
    }

    /// Point the floating IP `id` at `port_id`
    pub async fn floating_ip_associate(
        &self,
        id: &str,
        port_id: &str,
    ) -> Result<FloatingIpView, Error> {
        let body = json!({ "floatingip": { "port_id": port_id } });
        let updated: FloatingIpBody = self
            .put(&self.network_url(&format!("floatingips/{}", id)), &body)
            .await?;
        Ok(updated.floatingip)
    }
}

impl From<NetworkView> for external::Network {
    fn from(view: NetworkView) -> Self {
        external::Network { id: view.id, name: view.name }
    }
}

impl From<SubnetView> for external::Subnet {
    fn from(view: SubnetView) -> Self {
        external::Subnet {
            id: view.id,
            name: view.name,
            network_id: view.network_id,
            cidr: view.cidr,
            ip_version: view.ip_version,
        }
    }
}

impl From<RouterView> for external::Router {
    fn from(view: RouterView) -> Self {
        external::Router {
            id: view.id,
            name: view.name,
            external_gateway_network_id: view
                .external_gateway_info
                .map(|info| info.network_id),
        }
    }
}

impl From<FloatingIpView> for external::FloatingIp {
    fn from(view: FloatingIpView) -> Self {
        external::FloatingIp {
            id: view.id,
            address: view.floating_ip_address,
            floating_network_id: view.floating_network_id,
            port_id: view.port_id,
        }
    }
}
