// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `destroy`: tear the topology down
//!
//! The order is fixed: the three servers, then the router, then (after the
//! cloud has had a chance to settle) the subnet, then the network.  A cloud
//! won't delete a subnet or network that something is still attached to, and
//! server and router deletions take a moment to release their ports.
//!
//! Floating IPs are not released: deleting the web server only disassociates
//! its address.

use crate::config::Config;
use crate::config::SettleStrategy;
use crate::config::Topology;
use crate::provider::CloudProvider;
use crate::report::Observation;
use crate::report::Reporter;
use slog::debug;
use slog::info;
use slog::warn;
use std::time::Duration;
use tierctl_common::api::external::Error;
use tierctl_common::api::external::ResourceType;
use tokio::time::Instant;

pub async fn destroy(
    provider: &dyn CloudProvider,
    config: &Config,
    reporter: &mut Reporter,
) -> Result<(), Error> {
    let topology = &config.topology;

    for (_, name) in topology.servers() {
        match provider.lookup(ResourceType::Server, name).await? {
            None => reporter.report(Observation::ServerAlreadyAbsent {
                server: name.to_string(),
            }),
            Some(server) => {
                info!(reporter.log(), "deleting server"; "name" => name);
                provider.server_delete(&server.id).await?;
                reporter.report(Observation::ServerDeleted {
                    server: name.to_string(),
                });
            }
        }
    }

    match provider.lookup(ResourceType::Router, &topology.router).await? {
        None => reporter
            .report(Observation::AlreadyAbsent { kind: ResourceType::Router }),
        Some(router) => {
            info!(reporter.log(), "deleting router"; "name" => &router.name);
            provider.router_delete(&router.id).await?;
            reporter.report(Observation::Deleted { kind: ResourceType::Router });
        }
    }

    settle(provider, topology, config.teardown.settle, reporter).await?;

    match provider.lookup(ResourceType::Subnet, &topology.subnet).await? {
        None => reporter
            .report(Observation::AlreadyAbsent { kind: ResourceType::Subnet }),
        Some(subnet) => {
            info!(reporter.log(), "deleting subnet"; "name" => &subnet.name);
            provider.subnet_delete(&subnet.id).await?;
            reporter.report(Observation::Deleted { kind: ResourceType::Subnet });
        }
    }

    match provider.lookup(ResourceType::Network, &topology.network).await? {
        None => reporter
            .report(Observation::AlreadyAbsent { kind: ResourceType::Network }),
        Some(network) => {
            info!(reporter.log(), "deleting network"; "name" => &network.name);
            provider.network_delete(&network.id).await?;
            reporter
                .report(Observation::Deleted { kind: ResourceType::Network });
        }
    }

    Ok(())
}

/// Wait for server and router deletions to take effect
async fn settle(
    provider: &dyn CloudProvider,
    topology: &Topology,
    strategy: SettleStrategy,
    reporter: &Reporter,
) -> Result<(), Error> {
    let log = reporter.log();
    match strategy {
        SettleStrategy::Fixed { seconds } => {
            debug!(log, "waiting for deletions to settle"; "seconds" => seconds);
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            Ok(())
        }
        SettleStrategy::Poll { interval_seconds, timeout_seconds } => {
            let interval = Duration::from_secs(interval_seconds);
            let deadline = Instant::now() + Duration::from_secs(timeout_seconds);
            loop {
                let remaining = still_present(provider, topology).await?;
                if remaining.is_empty() {
                    return Ok(());
                }
                if Instant::now() >= deadline {
                    warn!(log, "gave up waiting for deletions to settle";
                        "timeout_seconds" => timeout_seconds,
                        "remaining" => remaining.join(", "),
                    );
                    return Ok(());
                }
                debug!(log, "waiting for deletions to settle";
                    "remaining" => remaining.join(", "),
                );
                tokio::time::sleep(interval).await;
            }
        }
    }
}

/// Names of the servers and router that can still be found
async fn still_present(
    provider: &dyn CloudProvider,
    topology: &Topology,
) -> Result<Vec<String>, Error> {
    let mut present = Vec::new();
    for (_, name) in topology.servers() {
        if provider.lookup(ResourceType::Server, name).await?.is_some() {
            present.push(name.to_string());
        }
    }
    if provider.lookup(ResourceType::Router, &topology.router).await?.is_some() {
        present.push(topology.router.clone());
    }
    Ok(present)
}
