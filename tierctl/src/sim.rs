// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Simulated cloud
//!
//! [`SimCloud`] keeps the whole resource graph in memory.  State transitions
//! are immediate: a created server is ACTIVE, a started server is ACTIVE, a
//! stopped one is SHUTOFF.  Every call is recorded in a journal so that tests
//! can check exactly which calls an operation made and in what order, and any
//! kind of call can be made to fail once.
//!
//! Like a real cloud, it refuses to delete a subnet that a router is still
//! attached to, or a network that still has subnets or servers on it.

use crate::config::Topology;
use crate::provider::CloudProvider;
use async_trait::async_trait;
use slog::debug;
use slog::o;
use slog::Logger;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::sync::Mutex;
use std::sync::MutexGuard;
use tierctl_common::api::external::Error;
use tierctl_common::api::external::FloatingIp;
use tierctl_common::api::external::FloatingIpCreate;
use tierctl_common::api::external::IpVersion;
use tierctl_common::api::external::Network;
use tierctl_common::api::external::NetworkCreate;
use tierctl_common::api::external::ResourceRef;
use tierctl_common::api::external::ResourceType;
use tierctl_common::api::external::Router;
use tierctl_common::api::external::RouterCreate;
use tierctl_common::api::external::Server;
use tierctl_common::api::external::ServerCreate;
use tierctl_common::api::external::ServerStatus;
use tierctl_common::api::external::Subnet;
use tierctl_common::api::external::SubnetCreate;
use uuid::Uuid;

/// One call made against a [`SimCloud`]
#[derive(Clone, Debug, PartialEq)]
pub enum SimCall {
    Lookup { kind: ResourceType, name: String },
    ServerGet { id: String },
    NetworkCreate(NetworkCreate),
    SubnetCreate(SubnetCreate),
    RouterCreate(RouterCreate),
    ServerCreate(ServerCreate),
    FloatingIpCreate(FloatingIpCreate),
    FloatingIpList { server_id: String },
    FloatingIpAssociate { floating_ip_id: String, server_id: String },
    ServerStart { id: String, name: String },
    ServerStop { id: String, name: String },
    ServerDelete { id: String, name: String },
    RouterDelete { id: String, name: String },
    SubnetDelete { id: String, name: String },
    NetworkDelete { id: String, name: String },
}

/// The kind of a [`SimCall`], for fault injection
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum SimCallKind {
    Lookup,
    ServerGet,
    NetworkCreate,
    SubnetCreate,
    RouterCreate,
    ServerCreate,
    FloatingIpCreate,
    FloatingIpList,
    FloatingIpAssociate,
    ServerStart,
    ServerStop,
    ServerDelete,
    RouterDelete,
    SubnetDelete,
    NetworkDelete,
}

impl SimCall {
    pub fn kind(&self) -> SimCallKind {
        match self {
            SimCall::Lookup { .. } => SimCallKind::Lookup,
            SimCall::ServerGet { .. } => SimCallKind::ServerGet,
            SimCall::NetworkCreate(_) => SimCallKind::NetworkCreate,
            SimCall::SubnetCreate(_) => SimCallKind::SubnetCreate,
            SimCall::RouterCreate(_) => SimCallKind::RouterCreate,
            SimCall::ServerCreate(_) => SimCallKind::ServerCreate,
            SimCall::FloatingIpCreate(_) => SimCallKind::FloatingIpCreate,
            SimCall::FloatingIpList { .. } => SimCallKind::FloatingIpList,
            SimCall::FloatingIpAssociate { .. } => {
                SimCallKind::FloatingIpAssociate
            }
            SimCall::ServerStart { .. } => SimCallKind::ServerStart,
            SimCall::ServerStop { .. } => SimCallKind::ServerStop,
            SimCall::ServerDelete { .. } => SimCallKind::ServerDelete,
            SimCall::RouterDelete { .. } => SimCallKind::RouterDelete,
            SimCall::SubnetDelete { .. } => SimCallKind::SubnetDelete,
            SimCall::NetworkDelete { .. } => SimCallKind::NetworkDelete,
        }
    }

    /// Returns whether this call changes the state of the cloud
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            SimCall::Lookup { .. }
                | SimCall::ServerGet { .. }
                | SimCall::FloatingIpList { .. }
        )
    }
}

#[derive(Clone, Debug)]
struct SimNetwork {
    network: Network,
    external: bool,
}

#[derive(Clone, Debug)]
struct SimRouter {
    router: Router,
    interface_subnet_ids: Vec<String>,
}

#[derive(Clone, Debug)]
struct SimServer {
    server: Server,
    network_ids: Vec<String>,
}

/// A resource that has been deleted but still shows up in lookups for a
/// while, the way a real control plane converges
#[derive(Clone, Debug)]
struct Lingering {
    kind: ResourceType,
    resource: ResourceRef,
    lookups_left: u32,
}

#[derive(Default)]
struct SimState {
    networks: BTreeMap<String, SimNetwork>,
    subnets: BTreeMap<String, Subnet>,
    routers: BTreeMap<String, SimRouter>,
    servers: BTreeMap<String, SimServer>,
    floating_ips: BTreeMap<String, FloatingIp>,
    /// images, flavors, keypairs and security groups, which tierctl only
    /// ever looks up
    fixtures: Vec<(ResourceType, ResourceRef)>,
    lingering: Vec<Lingering>,
    linger_lookups: u32,
    /// servers report no floating addresses, as when the compute service's
    /// view of the network hasn't caught up yet
    stale_server_addresses: bool,
    next_address: u32,
    journal: Vec<SimCall>,
    faults: BTreeMap<SimCallKind, Error>,
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn named(id: &str, name: &str) -> ResourceRef {
    ResourceRef { id: id.to_string(), name: name.to_string() }
}

impl SimState {
    fn candidates(&self, kind: ResourceType) -> Vec<ResourceRef> {
        match kind {
            ResourceType::Network => self
                .networks
                .values()
                .map(|n| named(&n.network.id, &n.network.name))
                .collect(),
            ResourceType::Subnet => {
                self.subnets.values().map(|s| named(&s.id, &s.name)).collect()
            }
            ResourceType::Router => self
                .routers
                .values()
                .map(|r| named(&r.router.id, &r.router.name))
                .collect(),
            ResourceType::Server => self
                .servers
                .values()
                .map(|s| named(&s.server.id, &s.server.name))
                .collect(),
            ResourceType::FloatingIp => Vec::new(),
            ResourceType::Image
            | ResourceType::Flavor
            | ResourceType::Keypair
            | ResourceType::SecurityGroup => self
                .fixtures
                .iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, r)| r.clone())
                .collect(),
        }
    }

    fn lookup(
        &mut self,
        kind: ResourceType,
        name: &str,
    ) -> Result<Option<ResourceRef>, Error> {
        if kind == ResourceType::FloatingIp {
            return Err(Error::invalid_request("floating IPs have no name"));
        }

        let mut matching: Vec<ResourceRef> = self
            .candidates(kind)
            .into_iter()
            .filter(|r| r.name == name)
            .collect();
        if matching.len() > 1 {
            return Err(Error::ObjectAlreadyExists {
                type_name: kind,
                object_name: name.to_string(),
            });
        }
        if let Some(found) = matching.pop() {
            return Ok(Some(found));
        }

        if let Some(lingering) = self
            .lingering
            .iter_mut()
            .find(|l| l.kind == kind && l.resource.name == name)
        {
            lingering.lookups_left -= 1;
            let resource = lingering.resource.clone();
            self.lingering.retain(|l| l.lookups_left > 0);
            return Ok(Some(resource));
        }
        Ok(None)
    }

    fn linger(&mut self, kind: ResourceType, resource: ResourceRef) {
        if self.linger_lookups > 0 {
            self.lingering.push(Lingering {
                kind,
                resource,
                lookups_left: self.linger_lookups,
            });
        }
    }

    fn next_floating_address(&mut self) -> IpAddr {
        // 203.0.113.0/24 is reserved for documentation.
        self.next_address += 1;
        IpAddr::V4(Ipv4Addr::new(203, 0, 113, (self.next_address % 250) as u8))
    }

    fn add_network(&mut self, name: &str, external: bool) -> Network {
        let network = Network { id: new_id(), name: name.to_string() };
        self.networks.insert(
            network.id.clone(),
            SimNetwork { network: network.clone(), external },
        );
        network
    }

    fn add_server(
        &mut self,
        name: &str,
        status: ServerStatus,
        network_ids: Vec<String>,
    ) -> Server {
        let server = Server {
            id: new_id(),
            name: name.to_string(),
            status,
            floating_ips: Vec::new(),
        };
        self.servers.insert(
            server.id.clone(),
            SimServer { server: server.clone(), network_ids },
        );
        server
    }

    fn server_mut(&mut self, id: &str) -> Result<&mut SimServer, Error> {
        self.servers
            .get_mut(id)
            .ok_or_else(|| Error::not_found_by_id(ResourceType::Server, id))
    }
}

/// Builds a [`SimCloud`] with some resources already in place
#[derive(Default)]
pub struct SimCloudBuilder {
    state: SimState,
}

impl SimCloudBuilder {
    pub fn external_network(mut self, name: &str) -> Self {
        self.state.add_network(name, true);
        self
    }

    pub fn network(mut self, name: &str) -> Self {
        self.state.add_network(name, false);
        self
    }

    fn fixture(mut self, kind: ResourceType, name: &str) -> Self {
        self.state.fixtures.push((kind, named(&new_id(), name)));
        self
    }

    pub fn image(self, name: &str) -> Self {
        self.fixture(ResourceType::Image, name)
    }

    pub fn flavor(self, name: &str) -> Self {
        self.fixture(ResourceType::Flavor, name)
    }

    /// Keypairs are identified by their name.
    pub fn keypair(mut self, name: &str) -> Self {
        self.state.fixtures.push((ResourceType::Keypair, named(name, name)));
        self
    }

    pub fn security_group(self, name: &str) -> Self {
        self.fixture(ResourceType::SecurityGroup, name)
    }

    /// Add a server that already exists, on no network
    pub fn server(mut self, name: &str, status: ServerStatus) -> Self {
        self.state.add_server(name, status, Vec::new());
        self
    }

    /// Keep deleted servers and routers visible to this many further lookups
    /// by name
    pub fn linger(mut self, lookups: u32) -> Self {
        self.state.linger_lookups = lookups;
        self
    }

    /// Leave floating addresses out of the servers `server_get` returns
    pub fn stale_server_addresses(mut self) -> Self {
        self.state.stale_server_addresses = true;
        self
    }

    pub fn build(self, log: &Logger) -> SimCloud {
        SimCloud {
            log: log.new(o!("component" => "SimCloud")),
            state: Mutex::new(self.state),
        }
    }
}

/// In-memory [`CloudProvider`]
pub struct SimCloud {
    log: Logger,
    state: Mutex<SimState>,
}

impl SimCloud {
    pub fn builder() -> SimCloudBuilder {
        SimCloudBuilder::default()
    }

    /// A cloud with everything `topology` depends on (external network,
    /// image, flavor, keypair, security group) and nothing that tierctl
    /// creates
    pub fn for_topology(log: &Logger, topology: &Topology) -> SimCloud {
        SimCloud::builder()
            .external_network(&topology.external_network)
            .image(&topology.image)
            .flavor(&topology.flavor)
            .keypair(&topology.keypair)
            .security_group(&topology.security_group)
            .build(log)
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        // A panic while the lock was held has already failed the test.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record `call` and return the fault queued for its kind, if any
    fn begin(&self, call: SimCall) -> Result<MutexGuard<'_, SimState>, Error> {
        debug!(self.log, "call"; "call" => ?call);
        let mut state = self.state();
        let kind = call.kind();
        state.journal.push(call);
        match state.faults.remove(&kind) {
            Some(error) => Err(error),
            None => Ok(state),
        }
    }

    /// Make the next call of `kind` fail with `error`
    pub fn fail_next(&self, kind: SimCallKind, error: Error) {
        self.state().faults.insert(kind, error);
    }

    /// Every call made so far, in order
    pub fn journal(&self) -> Vec<SimCall> {
        self.state().journal.clone()
    }

    /// The calls made so far that changed anything
    pub fn mutations(&self) -> Vec<SimCall> {
        self.state().journal.iter().filter(|c| c.is_mutation()).cloned().collect()
    }

    pub fn clear_journal(&self) {
        self.state().journal.clear();
    }

    /// Returns whether a resource named `name` currently exists
    pub fn exists(&self, kind: ResourceType, name: &str) -> bool {
        self.state().candidates(kind).iter().any(|r| r.name == name)
    }

    /// Returns the id of the resource named `name`, if it exists
    pub fn id_of(&self, kind: ResourceType, name: &str) -> Option<String> {
        self.state()
            .candidates(kind)
            .into_iter()
            .find(|r| r.name == name)
            .map(|r| r.id)
    }

    pub fn server(&self, name: &str) -> Option<Server> {
        self.state()
            .servers
            .values()
            .find(|s| s.server.name == name)
            .map(|s| s.server.clone())
    }

    pub fn router(&self, name: &str) -> Option<(Router, Vec<String>)> {
        self.state()
            .routers
            .values()
            .find(|r| r.router.name == name)
            .map(|r| (r.router.clone(), r.interface_subnet_ids.clone()))
    }

    pub fn subnet(&self, name: &str) -> Option<Subnet> {
        self.state().subnets.values().find(|s| s.name == name).cloned()
    }

    pub fn floating_ips(&self) -> Vec<FloatingIp> {
        self.state().floating_ips.values().cloned().collect()
    }

    /// Change a server's status behind tierctl's back
    pub fn set_server_status(&self, name: &str, status: ServerStatus) {
        let mut state = self.state();
        if let Some(server) =
            state.servers.values_mut().find(|s| s.server.name == name)
        {
            server.server.status = status;
        }
    }
}

#[async_trait]
impl CloudProvider for SimCloud {
    async fn lookup(
        &self,
        kind: ResourceType,
        name: &str,
    ) -> Result<Option<ResourceRef>, Error> {
        let mut state =
            self.begin(SimCall::Lookup { kind, name: name.to_string() })?;
        state.lookup(kind, name)
    }

    async fn server_get(&self, id: &str) -> Result<Server, Error> {
        let mut state = self.begin(SimCall::ServerGet { id: id.to_string() })?;
        let stale = state.stale_server_addresses;
        let mut server = state.server_mut(id)?.server.clone();
        if stale {
            server.floating_ips.clear();
        }
        Ok(server)
    }

    async fn network_create(
        &self,
        params: &NetworkCreate,
    ) -> Result<Network, Error> {
        let mut state = self.begin(SimCall::NetworkCreate(params.clone()))?;
        Ok(state.add_network(&params.name, false))
    }

    async fn subnet_create(
        &self,
        params: &SubnetCreate,
    ) -> Result<Subnet, Error> {
        let mut state = self.begin(SimCall::SubnetCreate(params.clone()))?;
        if !state.networks.contains_key(&params.network_id) {
            return Err(Error::not_found_by_id(
                ResourceType::Network,
                &params.network_id,
            ));
        }
        if IpVersion::of(&params.cidr) != params.ip_version {
            return Err(Error::InvalidValue {
                label: String::from("cidr"),
                message: format!(
                    "{} is not an IPv{} network",
                    params.cidr, params.ip_version
                ),
            });
        }
        let subnet = Subnet {
            id: new_id(),
            name: params.name.clone(),
            network_id: params.network_id.clone(),
            cidr: params.cidr,
            ip_version: params.ip_version,
        };
        state.subnets.insert(subnet.id.clone(), subnet.clone());
        Ok(subnet)
    }

    async fn router_create(
        &self,
        params: &RouterCreate,
    ) -> Result<Router, Error> {
        let mut state = self.begin(SimCall::RouterCreate(params.clone()))?;
        match state.networks.get(&params.external_gateway_network_id) {
            Some(network) if network.external => (),
            Some(_) => {
                return Err(Error::invalid_request(
                    "router gateway must be on an external network",
                ))
            }
            None => {
                return Err(Error::not_found_by_id(
                    ResourceType::Network,
                    &params.external_gateway_network_id,
                ))
            }
        }
        let mut interface_subnet_ids = Vec::new();
        if let Some(subnet_id) = &params.interface_subnet_id {
            if !state.subnets.contains_key(subnet_id) {
                return Err(Error::not_found_by_id(
                    ResourceType::Subnet,
                    subnet_id,
                ));
            }
            interface_subnet_ids.push(subnet_id.clone());
        }
        let router = Router {
            id: new_id(),
            name: params.name.clone(),
            external_gateway_network_id: Some(
                params.external_gateway_network_id.clone(),
            ),
        };
        state.routers.insert(
            router.id.clone(),
            SimRouter { router: router.clone(), interface_subnet_ids },
        );
        Ok(router)
    }

    async fn server_create(
        &self,
        params: &ServerCreate,
    ) -> Result<Server, Error> {
        let mut state = self.begin(SimCall::ServerCreate(params.clone()))?;
        for network_id in &params.network_ids {
            if !state.networks.contains_key(network_id) {
                return Err(Error::not_found_by_id(
                    ResourceType::Network,
                    network_id,
                ));
            }
        }
        Ok(state.add_server(
            &params.name,
            ServerStatus::Active,
            params.network_ids.clone(),
        ))
    }

    async fn floating_ip_create(
        &self,
        params: &FloatingIpCreate,
    ) -> Result<FloatingIp, Error> {
        let mut state = self.begin(SimCall::FloatingIpCreate(params.clone()))?;
        if !state
            .networks
            .get(&params.floating_network_id)
            .is_some_and(|n| n.external)
        {
            return Err(Error::invalid_request(
                "floating IPs must come from an external network",
            ));
        }
        let floating_ip = FloatingIp {
            id: new_id(),
            address: state.next_floating_address(),
            floating_network_id: params.floating_network_id.clone(),
            port_id: None,
        };
        state.floating_ips.insert(floating_ip.id.clone(), floating_ip.clone());
        Ok(floating_ip)
    }

    async fn server_floating_ips(
        &self,
        server_id: &str,
    ) -> Result<Vec<FloatingIp>, Error> {
        let state = self.begin(SimCall::FloatingIpList {
            server_id: server_id.to_string(),
        })?;
        let port_id = format!("port-{}", server_id);
        Ok(state
            .floating_ips
            .values()
            .filter(|f| f.port_id.as_deref() == Some(port_id.as_str()))
            .cloned()
            .collect())
    }

    async fn floating_ip_associate(
        &self,
        floating_ip: &FloatingIp,
        server_id: &str,
    ) -> Result<FloatingIp, Error> {
        let mut state = self.begin(SimCall::FloatingIpAssociate {
            floating_ip_id: floating_ip.id.clone(),
            server_id: server_id.to_string(),
        })?;
        let address = state
            .floating_ips
            .get(&floating_ip.id)
            .ok_or_else(|| {
                Error::not_found_by_id(ResourceType::FloatingIp, &floating_ip.id)
            })?
            .address;
        state.server_mut(server_id)?.server.floating_ips.push(address);
        let updated = state
            .floating_ips
            .get_mut(&floating_ip.id)
            .ok_or_else(|| {
                Error::not_found_by_id(ResourceType::FloatingIp, &floating_ip.id)
            })?;
        updated.port_id = Some(format!("port-{}", server_id));
        Ok(updated.clone())
    }

    async fn server_start(&self, id: &str) -> Result<(), Error> {
        let name = self.server_name(id);
        let mut state =
            self.begin(SimCall::ServerStart { id: id.to_string(), name })?;
        state.server_mut(id)?.server.status = ServerStatus::Active;
        Ok(())
    }

    async fn server_stop(&self, id: &str) -> Result<(), Error> {
        let name = self.server_name(id);
        let mut state =
            self.begin(SimCall::ServerStop { id: id.to_string(), name })?;
        state.server_mut(id)?.server.status = ServerStatus::Shutoff;
        Ok(())
    }

    async fn server_delete(&self, id: &str) -> Result<(), Error> {
        let name = self.server_name(id);
        let mut state =
            self.begin(SimCall::ServerDelete { id: id.to_string(), name })?;
        let removed = state
            .servers
            .remove(id)
            .ok_or_else(|| Error::not_found_by_id(ResourceType::Server, id))?;
        // Like Neutron, deleting the server releases the association but not
        // the address.
        let port_id = format!("port-{}", id);
        for floating_ip in state.floating_ips.values_mut() {
            if floating_ip.port_id.as_deref() == Some(port_id.as_str()) {
                floating_ip.port_id = None;
            }
        }
        state.linger(
            ResourceType::Server,
            named(&removed.server.id, &removed.server.name),
        );
        Ok(())
    }

    async fn router_delete(&self, id: &str) -> Result<(), Error> {
        let name = self.router_name(id);
        let mut state =
            self.begin(SimCall::RouterDelete { id: id.to_string(), name })?;
        let removed = state
            .routers
            .remove(id)
            .ok_or_else(|| Error::not_found_by_id(ResourceType::Router, id))?;
        state.linger(
            ResourceType::Router,
            named(&removed.router.id, &removed.router.name),
        );
        Ok(())
    }

    async fn subnet_delete(&self, id: &str) -> Result<(), Error> {
        let name = self.subnet_name(id);
        let mut state =
            self.begin(SimCall::SubnetDelete { id: id.to_string(), name })?;
        if state
            .routers
            .values()
            .any(|r| r.interface_subnet_ids.iter().any(|s| s == id))
        {
            return Err(Error::invalid_request(&format!(
                "subnet {} has a router interface attached",
                id
            )));
        }
        state
            .subnets
            .remove(id)
            .ok_or_else(|| Error::not_found_by_id(ResourceType::Subnet, id))?;
        Ok(())
    }

    async fn network_delete(&self, id: &str) -> Result<(), Error> {
        let name = self.network_name(id);
        let mut state =
            self.begin(SimCall::NetworkDelete { id: id.to_string(), name })?;
        let in_use = state.subnets.values().any(|s| s.network_id == id)
            || state
                .servers
                .values()
                .any(|s| s.network_ids.iter().any(|n| n == id));
        if in_use {
            return Err(Error::invalid_request(&format!(
                "network {} is still in use",
                id
            )));
        }
        state
            .networks
            .remove(id)
            .ok_or_else(|| Error::not_found_by_id(ResourceType::Network, id))?;
        Ok(())
    }
}

impl SimCloud {
    fn server_name(&self, id: &str) -> String {
        self.state()
            .servers
            .get(id)
            .map(|s| s.server.name.clone())
            .unwrap_or_default()
    }

    fn router_name(&self, id: &str) -> String {
        self.state()
            .routers
            .get(id)
            .map(|r| r.router.name.clone())
            .unwrap_or_default()
    }

    fn subnet_name(&self, id: &str) -> String {
        self.state().subnets.get(id).map(|s| s.name.clone()).unwrap_or_default()
    }

    fn network_name(&self, id: &str) -> String {
        self.state()
            .networks
            .get(id)
            .map(|n| n.network.name.clone())
            .unwrap_or_default()
    }
}
