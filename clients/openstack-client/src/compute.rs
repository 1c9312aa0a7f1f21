// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Nova: servers, flavors and keypairs

use crate::exactly_one;
use crate::Client;
use crate::Error;
use crate::Named;
use reqwest::Method;
use reqwest::StatusCode;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::net::IpAddr;
use tierctl_common::api::external;

#[derive(Clone, Debug, Deserialize)]
pub struct ServerAddress {
    pub addr: IpAddr,
    #[serde(default)]
    pub version: Option<u8>,
    /// "fixed" or "floating"
    #[serde(default, rename = "OS-EXT-IPS:type")]
    pub address_type: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServerView {
    pub id: String,
    pub name: String,
    pub status: String,
    /// addresses keyed by network name
    #[serde(default)]
    pub addresses: BTreeMap<String, Vec<ServerAddress>>,
}

impl ServerView {
    pub fn floating_addresses(&self) -> Vec<IpAddr> {
        self.addresses
            .values()
            .flatten()
            .filter(|a| a.address_type.as_deref() == Some("floating"))
            .map(|a| a.addr)
            .collect()
    }
}

/// What Nova returns from a create: the server's name and status are not
/// known until it is fetched again.
#[derive(Clone, Debug, Deserialize)]
pub struct ServerCreated {
    pub id: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FlavorView {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct KeypairView {
    pub name: String,
    #[serde(default)]
    pub fingerprint: Option<String>,
}

impl Named for ServerView {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for FlavorView {
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Deserialize)]
struct ServerList {
    servers: Vec<ServerView>,
}

#[derive(Deserialize)]
struct ServerBody {
    server: ServerView,
}

#[derive(Deserialize)]
struct ServerCreatedBody {
    server: ServerCreated,
}

#[derive(Deserialize)]
struct FlavorList {
    flavors: Vec<FlavorView>,
}

#[derive(Deserialize)]
struct KeypairBody {
    keypair: KeypairView,
}

/// Nova's `name` filter is a regular expression.  Escape `name` and anchor it
/// so that the filter only admits exact matches.
pub fn exact_name_filter(name: &str) -> String {
    let mut filter = String::with_capacity(name.len() + 2);
    filter.push('^');
    for c in name.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            filter.push('\\');
        }
        filter.push(c);
    }
    filter.push('$');
    filter
}

impl Client {
    fn compute_url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoints.compute, path)
    }

    /// `collection` followed by `segment` as a single, escaped path segment
    fn compute_url_with_segment(
        &self,
        collection: &str,
        segment: &str,
    ) -> Result<Url, Error> {
        let base = self.compute_url(collection);
        let invalid = |message: String| Error::UnexpectedResponse {
            url: base.clone(),
            message: format!("compute endpoint is not a usable URL: {}", message),
        };
        let mut url =
            Url::parse(&base).map_err(|error| invalid(error.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid(String::from("cannot have path segments")))?
            .push(segment);
        Ok(url)
    }

    pub async fn server_find(
        &self,
        name: &str,
    ) -> Result<Option<ServerView>, Error> {
        let builder = self
            .request(Method::GET, &self.compute_url("servers/detail"))
            .query(&[("name", exact_name_filter(name))]);
        let list: ServerList = self.get(builder).await?;
        exactly_one("server", name, list.servers)
    }

    /// Fetch a server by id.  A server that no longer exists is `None`.
    pub async fn server_get(
        &self,
        id: &str,
    ) -> Result<Option<ServerView>, Error> {
        match self
            .get_by_url::<ServerBody>(&self.compute_url(&format!("servers/{}", id)))
            .await
        {
            Ok(body) => Ok(Some(body.server)),
            Err(error) if error.status() == Some(StatusCode::NOT_FOUND) => {
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    pub async fn server_create(
        &self,
        params: &external::ServerCreate,
    ) -> Result<ServerCreated, Error> {
        let networks: Vec<_> = params
            .network_ids
            .iter()
            .map(|id| json!({ "uuid": id }))
            .collect();
        let security_groups: Vec<_> = params
            .security_groups
            .iter()
            .map(|name| json!({ "name": name }))
            .collect();
        let body = json!({
            "server": {
                "name": params.name,
                "imageRef": params.image_id,
                "flavorRef": params.flavor_id,
                "key_name": params.key_name,
                "networks": networks,
                "security_groups": security_groups,
            }
        });
        let created: ServerCreatedBody =
            self.post(&self.compute_url("servers"), &body).await?;
        Ok(created.server)
    }

    pub async fn server_start(&self, id: &str) -> Result<(), Error> {
        self.server_action(id, json!({ "os-start": null })).await
    }

    pub async fn server_stop(&self, id: &str) -> Result<(), Error> {
        self.server_action(id, json!({ "os-stop": null })).await
    }

    async fn server_action(
        &self,
        id: &str,
        action: serde_json::Value,
    ) -> Result<(), Error> {
        let url = self.compute_url(&format!("servers/{}/action", id));
        self.post_no_content(&url, &action).await
    }

    pub async fn server_delete(&self, id: &str) -> Result<(), Error> {
        self.delete(&self.compute_url(&format!("servers/{}", id))).await
    }

    pub async fn flavor_find(
        &self,
        name: &str,
    ) -> Result<Option<FlavorView>, Error> {
        let list: FlavorList =
            self.get_by_url(&self.compute_url("flavors")).await?;
        exactly_one("flavor", name, list.flavors)
    }

    /// Keypairs are addressed by name, so absence shows up as a 404.
    pub async fn keypair_find(
        &self,
        name: &str,
    ) -> Result<Option<KeypairView>, Error> {
        let url = self.compute_url_with_segment("os-keypairs", name)?;
        match self.get_by_url::<KeypairBody>(url.as_str()).await {
            Ok(body) => Ok(Some(body.keypair)),
            Err(error) if error.status() == Some(StatusCode::NOT_FOUND) => {
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }
}

impl From<ServerView> for external::Server {
    fn from(view: ServerView) -> Self {
        let floating_ips = view.floating_addresses();
        external::Server {
            id: view.id,
            name: view.name,
            status: external::ServerStatus::from(view.status.as_str()),
            floating_ips,
        }
    }
}
