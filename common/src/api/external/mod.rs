// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Model of the provider resources that tierctl reconciles
//!
//! Every resource here is owned by the cloud control plane, not by this
//! process.  Each one is identified by a human-readable name, which tierctl
//! uses as the natural key, and an opaque identifier assigned by the provider.
//! Nothing here is cached across operations: these are transient views of the
//! remote state as last observed.

mod error;
pub use error::*;

use ipnetwork::IpNetwork;
use serde::Deserialize;
use serde::Serialize;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FormatResult;
use std::net::IpAddr;

/*
 * RESOURCE TYPES
 */

/// Identifies a kind of provider resource
///
/// This is used both to route name lookups and to describe the subject of an
/// error.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Network,
    Subnet,
    Router,
    Server,
    FloatingIp,
    Image,
    Flavor,
    Keypair,
    SecurityGroup,
}

impl Display for ResourceType {
    fn fmt(&self, f: &mut Formatter) -> FormatResult {
        write!(
            f,
            "{}",
            match self {
                ResourceType::Network => "network",
                ResourceType::Subnet => "subnet",
                ResourceType::Router => "router",
                ResourceType::Server => "server",
                ResourceType::FloatingIp => "floating IP",
                ResourceType::Image => "image",
                ResourceType::Flavor => "flavor",
                ResourceType::Keypair => "keypair",
                ResourceType::SecurityGroup => "security group",
            }
        )
    }
}

/// The result of resolving a resource by name: just enough to act on it
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ResourceRef {
    pub id: String,
    pub name: String,
}

/*
 * NETWORKING
 */

/// IP protocol version of a subnet
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    /// Returns the version that matches the address family of `network`
    pub fn of(network: &IpNetwork) -> IpVersion {
        match network {
            IpNetwork::V4(_) => IpVersion::V4,
            IpNetwork::V6(_) => IpVersion::V6,
        }
    }
}

impl TryFrom<u8> for IpVersion {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            4 => Ok(IpVersion::V4),
            6 => Ok(IpVersion::V6),
            _ => Err(format!("unsupported IP version {} (expected 4 or 6)", value)),
        }
    }
}

impl From<IpVersion> for u8 {
    fn from(version: IpVersion) -> u8 {
        match version {
            IpVersion::V4 => 4,
            IpVersion::V6 => 6,
        }
    }
}

impl Display for IpVersion {
    fn fmt(&self, f: &mut Formatter) -> FormatResult {
        write!(f, "{}", u8::from(*self))
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Network {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NetworkCreate {
    pub name: String,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Subnet {
    pub id: String,
    pub name: String,
    pub network_id: String,
    pub cidr: IpNetwork,
    pub ip_version: IpVersion,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SubnetCreate {
    pub name: String,
    /// id of the network this subnet belongs to
    pub network_id: String,
    pub cidr: IpNetwork,
    pub ip_version: IpVersion,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Router {
    pub id: String,
    pub name: String,
    /// id of the external network this router uses as its gateway, if any
    pub external_gateway_network_id: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RouterCreate {
    pub name: String,
    pub external_gateway_network_id: String,
    /// subnet to attach to the router as an interface once it exists
    pub interface_subnet_id: Option<String>,
}

/// A provider-managed, externally routable address
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FloatingIp {
    pub id: String,
    pub address: IpAddr,
    pub floating_network_id: String,
    /// port this address is currently associated with, if any
    pub port_id: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FloatingIpCreate {
    pub floating_network_id: String,
}

/*
 * SERVERS
 */

/// Run state of a server, as reported by the provider
///
/// Providers report more states than tierctl cares about.  Any value we don't
/// recognize is preserved verbatim so that it can still be reported.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ServerStatus {
    Active,
    Build,
    Shutoff,
    Paused,
    Suspended,
    Error,
    Deleted,
    Other(String),
}

impl ServerStatus {
    pub fn label(&self) -> &str {
        match self {
            ServerStatus::Active => "ACTIVE",
            ServerStatus::Build => "BUILD",
            ServerStatus::Shutoff => "SHUTOFF",
            ServerStatus::Paused => "PAUSED",
            ServerStatus::Suspended => "SUSPENDED",
            ServerStatus::Error => "ERROR",
            ServerStatus::Deleted => "DELETED",
            ServerStatus::Other(s) => s.as_str(),
        }
    }

    pub fn is_active(&self) -> bool {
        *self == ServerStatus::Active
    }
}

impl From<&str> for ServerStatus {
    fn from(value: &str) -> Self {
        match value {
            "ACTIVE" => ServerStatus::Active,
            "BUILD" => ServerStatus::Build,
            "SHUTOFF" => ServerStatus::Shutoff,
            "PAUSED" => ServerStatus::Paused,
            "SUSPENDED" => ServerStatus::Suspended,
            "ERROR" => ServerStatus::Error,
            "DELETED" => ServerStatus::Deleted,
            other => ServerStatus::Other(other.to_string()),
        }
    }
}

impl Display for ServerStatus {
    fn fmt(&self, f: &mut Formatter) -> FormatResult {
        write!(f, "{}", self.label())
    }
}

impl Serialize for ServerStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for ServerStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(ServerStatus::from(s.as_str()))
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Server {
    pub id: String,
    pub name: String,
    pub status: ServerStatus,
    /// floating addresses currently associated with any of the server's ports
    pub floating_ips: Vec<IpAddr>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ServerCreate {
    pub name: String,
    pub image_id: String,
    pub flavor_id: String,
    pub key_name: String,
    /// ids of the networks to attach the server to
    pub network_ids: Vec<String>,
    /// names of the security groups to apply to the server's ports
    pub security_groups: Vec<String>,
}
