// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interfaces for parsing configuration files
//!
//! Every setting has a default, so tierctl runs without any file at all.  A
//! file only needs to name what differs, e.g.:
//!
//! ```toml
//! [topology]
//! cidr = "10.10.0.0/24"
//!
//! [topology.servers]
//! web = "blog-web"
//!
//! [create]
//! floating_ip = "created-with-db"
//!
//! [teardown.settle]
//! mode = "poll"
//! interval_seconds = 2
//! timeout_seconds = 60
//! ```

use camino::Utf8Path;
use camino::Utf8PathBuf;
use ipnetwork::IpNetwork;
use serde::Deserialize;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tierctl_common::api::external::IpVersion;
use tierctl_common::logging::ConfigLogging;

/// Configuration for tierctl
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// names and parameters of the managed resources
    pub topology: Topology,
    /// logging configuration (stdout is reserved for the report)
    pub log: ConfigLogging,
    /// behavior of `create`
    pub create: CreateConfig,
    /// behavior of `destroy`
    pub teardown: TeardownConfig,
}

impl Config {
    /// Load a `Config` from the given TOML file
    pub fn from_file(path: &Utf8Path) -> Result<Config, LoadError> {
        let file_contents = std::fs::read_to_string(path)
            .map_err(|err| LoadError::Io { path: path.into(), err })?;
        let config: Config = toml::from_str(&file_contents)
            .map_err(|err| LoadError::Parse { path: path.into(), err })?;
        config
            .validate()
            .map_err(|message| LoadError::Invalid { path: path.into(), message })?;
        Ok(config)
    }

    /// Check the constraints that the format alone can't express
    pub fn validate(&self) -> Result<(), String> {
        let topology = &self.topology;
        if IpVersion::of(&topology.cidr) != topology.ip_version {
            return Err(format!(
                "topology.cidr {} is not an IPv{} network",
                topology.cidr, topology.ip_version
            ));
        }

        let names = &topology.servers;
        if names.web == names.app || names.web == names.db || names.app == names.db
        {
            return Err(String::from(
                "topology.servers: web, app and db must have distinct names",
            ));
        }

        if let SettleStrategy::Poll { interval_seconds, .. } =
            self.teardown.settle
        {
            if interval_seconds == 0 {
                return Err(String::from(
                    "teardown.settle.interval_seconds must be at least 1",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("read \"{path}\": {err}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("parse \"{path}\": {err}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: toml::de::Error,
    },
    #[error("invalid config \"{path}\": {message}")]
    Invalid { path: Utf8PathBuf, message: String },
}

/// The resources that make up the managed topology
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Topology {
    pub image: String,
    pub flavor: String,
    pub keypair: String,
    pub network: String,
    pub subnet: String,
    pub cidr: IpNetwork,
    pub ip_version: IpVersion,
    pub security_group: String,
    pub router: String,
    /// existing network that provides the router's gateway and the floating IP
    pub external_network: String,
    pub servers: ServerNames,
}

impl Default for Topology {
    fn default() -> Self {
        Topology {
            image: String::from("ubuntu-minimal-16.04-x86_64"),
            flavor: String::from("c1.c1r1"),
            keypair: String::from("tawaab1-key"),
            network: String::from("tawaab1-network"),
            subnet: String::from("tawaab1-subnet"),
            cidr: IpNetwork::V4(
                "192.168.50.0/24".parse().expect("valid default CIDR"),
            ),
            ip_version: IpVersion::V4,
            security_group: String::from("assignment2"),
            router: String::from("tawaab1-rtr"),
            external_network: String::from("public-net"),
            servers: ServerNames::default(),
        }
    }
}

impl Topology {
    /// The three servers, in the order every operation visits them
    pub fn servers(&self) -> [(ServerRole, &str); 3] {
        [
            (ServerRole::Web, self.servers.web.as_str()),
            (ServerRole::App, self.servers.app.as_str()),
            (ServerRole::Db, self.servers.db.as_str()),
        ]
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerNames {
    pub web: String,
    pub app: String,
    pub db: String,
}

impl Default for ServerNames {
    fn default() -> Self {
        ServerNames {
            web: String::from("tawaab1-web"),
            app: String::from("tawaab1-app"),
            db: String::from("tawaab1-db"),
        }
    }
}

/// Which tier a server belongs to
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServerRole {
    Web,
    App,
    Db,
}

impl fmt::Display for ServerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ServerRole::Web => "Web",
            ServerRole::App => "App",
            ServerRole::Db => "DB",
        })
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreateConfig {
    pub floating_ip: FloatingIpPolicy,
}

/// When `create` gives the web server a floating IP
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FloatingIpPolicy {
    /// After the servers exist, make sure the web server has a floating IP.
    #[default]
    Ensure,
    /// Only on a run that had to create the db server.
    CreatedWithDb,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TeardownConfig {
    pub settle: SettleStrategy,
}

/// How `destroy` waits between removing the servers and router and removing
/// the subnet and network
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum SettleStrategy {
    /// Sleep unconditionally.
    Fixed {
        #[serde(default = "default_settle_seconds")]
        seconds: u64,
    },
    /// Poll until the servers and router no longer resolve by name, giving up
    /// (and proceeding anyway) after the timeout.
    Poll {
        #[serde(default = "default_poll_interval_seconds")]
        interval_seconds: u64,
        #[serde(default = "default_poll_timeout_seconds")]
        timeout_seconds: u64,
    },
}

fn default_settle_seconds() -> u64 {
    5
}

fn default_poll_interval_seconds() -> u64 {
    2
}

fn default_poll_timeout_seconds() -> u64 {
    60
}

impl Default for SettleStrategy {
    fn default() -> Self {
        SettleStrategy::Fixed { seconds: default_settle_seconds() }
    }
}

impl SettleStrategy {
    pub fn poll(interval: Duration, timeout: Duration) -> SettleStrategy {
        SettleStrategy::Poll {
            interval_seconds: interval.as_secs(),
            timeout_seconds: timeout.as_secs(),
        }
    }
}
