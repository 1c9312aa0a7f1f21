// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The interface between tierctl's operations and a cloud

use async_trait::async_trait;
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

/// A cloud that tierctl can manage resources on
///
/// Resources are always addressed by name first: [`CloudProvider::lookup`] is
/// the only way to find one, and it reports absence as `Ok(None)`.  Every
/// other method takes the provider's id from a lookup (or a create) that
/// happened immediately before.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Find the resource of type `kind` named exactly `name`
    async fn lookup(
        &self,
        kind: ResourceType,
        name: &str,
    ) -> Result<Option<ResourceRef>, Error>;

    /// Fetch the current state of a server
    async fn server_get(&self, id: &str) -> Result<Server, Error>;

    async fn network_create(
        &self,
        params: &NetworkCreate,
    ) -> Result<Network, Error>;

    async fn subnet_create(&self, params: &SubnetCreate)
        -> Result<Subnet, Error>;

    /// Create a router, attaching `params.interface_subnet_id` (if any) as
    /// an interface
    async fn router_create(&self, params: &RouterCreate)
        -> Result<Router, Error>;

    async fn server_create(&self, params: &ServerCreate)
        -> Result<Server, Error>;

    async fn floating_ip_create(
        &self,
        params: &FloatingIpCreate,
    ) -> Result<FloatingIp, Error>;

    /// The floating IPs associated with the server `server_id`, as the
    /// network service reports them
    async fn server_floating_ips(
        &self,
        server_id: &str,
    ) -> Result<Vec<FloatingIp>, Error>;

    /// Associate `floating_ip` with the server `server_id`
    async fn floating_ip_associate(
        &self,
        floating_ip: &FloatingIp,
        server_id: &str,
    ) -> Result<FloatingIp, Error>;

    async fn server_start(&self, id: &str) -> Result<(), Error>;
    async fn server_stop(&self, id: &str) -> Result<(), Error>;

    async fn server_delete(&self, id: &str) -> Result<(), Error>;
    /// Delete a router, detaching its interfaces first
    async fn router_delete(&self, id: &str) -> Result<(), Error>;
    async fn subnet_delete(&self, id: &str) -> Result<(), Error>;
    async fn network_delete(&self, id: &str) -> Result<(), Error>;
}

/// Look up a resource that must already exist
pub async fn require(
    provider: &dyn CloudProvider,
    kind: ResourceType,
    name: &str,
) -> Result<ResourceRef, Error> {
    provider
        .lookup(kind, name)
        .await?
        .ok_or_else(|| Error::not_found_by_name(kind, name))
}
