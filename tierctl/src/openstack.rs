// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! [`CloudProvider`] backed by a real OpenStack cloud

use crate::provider::CloudProvider;
use async_trait::async_trait;
use openstack_client::clouds;
use openstack_client::network::ROUTER_INTERFACE_OWNER;
use openstack_client::Client;
use reqwest::StatusCode;
use slog::debug;
use slog::info;
use slog::o;
use slog::Logger;
use std::time::Duration;
use tierctl_common::api::external::Error;
use tierctl_common::api::external::FloatingIp;
use tierctl_common::api::external::FloatingIpCreate;
use tierctl_common::api::external::Network;
use tierctl_common::api::external::NetworkCreate;
use tierctl_common::api::external::ResourceRef;
use tierctl_common::api::external::ResourceType;
use tierctl_common::api::external::Router;
use tierctl_common::api::external::RouterCreate;
use tierctl_common::api::external::Server;
use tierctl_common::api::external::ServerCreate;
use tierctl_common::api::external::Subnet;
use tierctl_common::api::external::SubnetCreate;
use tokio::time::Instant;

/// how long to wait for a new server's port before giving up on associating
/// a floating IP with it
const PORT_WAIT_TIMEOUT: Duration = Duration::from_secs(120);
const PORT_WAIT_INTERVAL: Duration = Duration::from_secs(2);

pub struct OpenStackProvider {
    client: Client,
    log: Logger,
}

impl OpenStackProvider {
    /// Authenticate using the named cloud profile
    pub async fn connect(
        log: &Logger,
        cloud: &str,
    ) -> Result<OpenStackProvider, openstack_client::Error> {
        let resolved = clouds::resolve(cloud)?;
        debug!(log, "using cloud profile";
            "cloud" => cloud,
            "source" => ?resolved.source,
        );
        let client = Client::new(log, &resolved.profile).await?;
        Ok(OpenStackProvider::new(log, client))
    }

    pub fn new(log: &Logger, client: Client) -> OpenStackProvider {
        OpenStackProvider {
            client,
            log: log.new(o!("component" => "OpenStackProvider")),
        }
    }

    /// Wait for the server to have a port to put a floating IP on
    ///
    /// A server that was just created may not have been scheduled yet.
    async fn wait_for_port(&self, server_id: &str) -> Result<String, Error> {
        let deadline = Instant::now() + PORT_WAIT_TIMEOUT;
        loop {
            let ports =
                self.client.port_list(server_id).await.map_err(provider_error)?;
            if let Some(port) = ports.into_iter().next() {
                return Ok(port.id);
            }
            if Instant::now() >= deadline {
                return Err(Error::unavail(&format!(
                    "server {} has no network port after {} seconds",
                    server_id,
                    PORT_WAIT_TIMEOUT.as_secs()
                )));
            }
            debug!(self.log, "waiting for server port"; "server_id" => server_id);
            tokio::time::sleep(PORT_WAIT_INTERVAL).await;
        }
    }
}

/// Convert an error from the OpenStack client into a control-plane error
pub fn provider_error(error: openstack_client::Error) -> Error {
    use openstack_client::Error as ClientError;
    let text = error.to_string();
    match &error {
        ClientError::ErrorResponse { status, message, .. } => {
            if message.to_lowercase().contains("quota") {
                return Error::InsufficientCapacity { message: text };
            }
            match *status {
                StatusCode::UNAUTHORIZED => {
                    Error::Unauthenticated { internal_message: text }
                }
                StatusCode::FORBIDDEN => Error::Forbidden { message: text },
                StatusCode::PAYLOAD_TOO_LARGE => {
                    Error::InsufficientCapacity { message: text }
                }
                StatusCode::BAD_REQUEST
                | StatusCode::NOT_FOUND
                | StatusCode::CONFLICT => Error::InvalidRequest { message: text },
                StatusCode::BAD_GATEWAY
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT => {
                    Error::ServiceUnavailable { internal_message: text }
                }
                _ => Error::InternalError { internal_message: text },
            }
        }
        ClientError::CommunicationError(_)
        | ClientError::MissingEndpoint { .. } => {
            Error::ServiceUnavailable { internal_message: text }
        }
        ClientError::Profile(_) => {
            Error::Unauthenticated { internal_message: text }
        }
        ClientError::InvalidResponsePayload { .. }
        | ClientError::UnexpectedResponse { .. }
        | ClientError::DuplicateName { .. } => {
            Error::InternalError { internal_message: text }
        }
    }
}

fn reference(id: String, name: String) -> ResourceRef {
    ResourceRef { id, name }
}

#[async_trait]
impl CloudProvider for OpenStackProvider {
    async fn lookup(
        &self,
        kind: ResourceType,
        name: &str,
    ) -> Result<Option<ResourceRef>, Error> {
        debug!(self.log, "lookup"; "kind" => %kind, "name" => name);
        let client = &self.client;
        let result = match kind {
            ResourceType::Network => client
                .network_find(name)
                .await
                .map(|v| v.map(|v| reference(v.id, v.name))),
            ResourceType::Subnet => client
                .subnet_find(name)
                .await
                .map(|v| v.map(|v| reference(v.id, v.name))),
            ResourceType::Router => client
                .router_find(name)
                .await
                .map(|v| v.map(|v| reference(v.id, v.name))),
            ResourceType::SecurityGroup => client
                .security_group_find(name)
                .await
                .map(|v| v.map(|v| reference(v.id, v.name))),
            ResourceType::Server => client
                .server_find(name)
                .await
                .map(|v| v.map(|v| reference(v.id, v.name))),
            ResourceType::Image => client
                .image_find(name)
                .await
                .map(|v| v.map(|v| reference(v.id, v.name))),
            ResourceType::Flavor => client
                .flavor_find(name)
                .await
                .map(|v| v.map(|v| reference(v.id, v.name))),
            ResourceType::Keypair => client
                .keypair_find(name)
                .await
                .map(|v| v.map(|v| reference(v.name.clone(), v.name))),
            ResourceType::FloatingIp => {
                return Err(Error::invalid_request("floating IPs have no name"))
            }
        };
        result.map_err(|error| match error {
            openstack_client::Error::DuplicateName { .. } => {
                Error::ObjectAlreadyExists {
                    type_name: kind,
                    object_name: name.to_string(),
                }
            }
            error => provider_error(error)
                .internal_context(format!("looking up {} \"{}\"", kind, name)),
        })
    }

    async fn server_get(&self, id: &str) -> Result<Server, Error> {
        debug!(self.log, "server get"; "id" => id);
        self.client
            .server_get(id)
            .await
            .map_err(provider_error)?
            .map(Server::from)
            .ok_or_else(|| Error::not_found_by_id(ResourceType::Server, id))
    }

    async fn network_create(
        &self,
        params: &NetworkCreate,
    ) -> Result<Network, Error> {
        info!(self.log, "network create"; "name" => &params.name);
        self.client
            .network_create(params)
            .await
            .map(Network::from)
            .map_err(provider_error)
    }

    async fn subnet_create(
        &self,
        params: &SubnetCreate,
    ) -> Result<Subnet, Error> {
        info!(self.log, "subnet create";
            "name" => &params.name,
            "cidr" => %params.cidr,
        );
        self.client
            .subnet_create(params)
            .await
            .map(Subnet::from)
            .map_err(provider_error)
    }

    async fn router_create(
        &self,
        params: &RouterCreate,
    ) -> Result<Router, Error> {
        info!(self.log, "router create"; "name" => &params.name);
        let router = self
            .client
            .router_create(&params.name, &params.external_gateway_network_id)
            .await
            .map_err(provider_error)?;
        if let Some(subnet_id) = &params.interface_subnet_id {
            info!(self.log, "router add interface";
                "router_id" => &router.id,
                "subnet_id" => subnet_id,
            );
            self.client
                .router_add_interface(&router.id, subnet_id)
                .await
                .map_err(provider_error)?;
        }
        Ok(Router::from(router))
    }

    async fn server_create(
        &self,
        params: &ServerCreate,
    ) -> Result<Server, Error> {
        info!(self.log, "server create"; "name" => &params.name);
        let created =
            self.client.server_create(params).await.map_err(provider_error)?;
        self.server_get(&created.id).await
    }

    async fn floating_ip_create(
        &self,
        params: &FloatingIpCreate,
    ) -> Result<FloatingIp, Error> {
        info!(self.log, "floating IP create";
            "network_id" => &params.floating_network_id,
        );
        self.client
            .floating_ip_create(params)
            .await
            .map(FloatingIp::from)
            .map_err(provider_error)
    }

    async fn server_floating_ips(
        &self,
        server_id: &str,
    ) -> Result<Vec<FloatingIp>, Error> {
        debug!(self.log, "server floating IPs"; "server_id" => server_id);
        let ports =
            self.client.port_list(server_id).await.map_err(provider_error)?;
        let mut floating_ips = Vec::new();
        for port in &ports {
            let found = self
                .client
                .floating_ip_list(&port.id)
                .await
                .map_err(provider_error)?;
            floating_ips.extend(found.into_iter().map(FloatingIp::from));
        }
        Ok(floating_ips)
    }

    async fn floating_ip_associate(
        &self,
        floating_ip: &FloatingIp,
        server_id: &str,
    ) -> Result<FloatingIp, Error> {
        let port_id = self.wait_for_port(server_id).await?;
        info!(self.log, "floating IP associate";
            "address" => %floating_ip.address,
            "server_id" => server_id,
            "port_id" => &port_id,
        );
        self.client
            .floating_ip_associate(&floating_ip.id, &port_id)
            .await
            .map(FloatingIp::from)
            .map_err(provider_error)
    }

    async fn server_start(&self, id: &str) -> Result<(), Error> {
        info!(self.log, "server start"; "id" => id);
        self.client.server_start(id).await.map_err(provider_error)
    }

    async fn server_stop(&self, id: &str) -> Result<(), Error> {
        info!(self.log, "server stop"; "id" => id);
        self.client.server_stop(id).await.map_err(provider_error)
    }

    async fn server_delete(&self, id: &str) -> Result<(), Error> {
        info!(self.log, "server delete"; "id" => id);
        self.client.server_delete(id).await.map_err(provider_error)
    }

    async fn router_delete(&self, id: &str) -> Result<(), Error> {
        let ports = self.client.port_list(id).await.map_err(provider_error)?;
        for port in
            ports.iter().filter(|p| p.device_owner == ROUTER_INTERFACE_OWNER)
        {
            info!(self.log, "router remove interface";
                "router_id" => id,
                "port_id" => &port.id,
            );
            self.client
                .router_remove_interface(id, &port.id)
                .await
                .map_err(provider_error)?;
        }
        info!(self.log, "router delete"; "id" => id);
        self.client.router_delete(id).await.map_err(provider_error)
    }

    async fn subnet_delete(&self, id: &str) -> Result<(), Error> {
        info!(self.log, "subnet delete"; "id" => id);
        self.client.subnet_delete(id).await.map_err(provider_error)
    }

    async fn network_delete(&self, id: &str) -> Result<(), Error> {
        info!(self.log, "network delete"; "id" => id);
        self.client.network_delete(id).await.map_err(provider_error)
    }
}
