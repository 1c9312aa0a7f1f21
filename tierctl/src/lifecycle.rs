// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `run` and `stop`: start or stop the three servers based on what they're
//! doing now

use crate::config::Topology;
use crate::provider::CloudProvider;
use crate::report::Observation;
use crate::report::Reporter;
use slog::info;
use tierctl_common::api::external::Error;
use tierctl_common::api::external::ResourceType;

/// Start each server that exists and isn't ACTIVE
pub async fn run(
    provider: &dyn CloudProvider,
    topology: &Topology,
    reporter: &mut Reporter,
) -> Result<(), Error> {
    for (_, name) in topology.servers() {
        let Some(found) = provider.lookup(ResourceType::Server, name).await?
        else {
            reporter.report(Observation::StartMissing { server: name.to_string() });
            continue;
        };

        let server = provider.server_get(&found.id).await?;
        if server.status.is_active() {
            reporter
                .report(Observation::AlreadyActive { server: name.to_string() });
        } else {
            info!(reporter.log(), "starting server";
                "name" => name,
                "status" => %server.status,
            );
            provider.server_start(&found.id).await?;
            reporter.report(Observation::Started { server: name.to_string() });
        }
    }
    Ok(())
}

/// Stop each server that exists and is ACTIVE
pub async fn stop(
    provider: &dyn CloudProvider,
    topology: &Topology,
    reporter: &mut Reporter,
) -> Result<(), Error> {
    for (_, name) in topology.servers() {
        let Some(found) = provider.lookup(ResourceType::Server, name).await?
        else {
            reporter.report(Observation::StopMissing { server: name.to_string() });
            continue;
        };

        let server = provider.server_get(&found.id).await?;
        if server.status.is_active() {
            info!(reporter.log(), "stopping server"; "name" => name);
            provider.server_stop(&found.id).await?;
            reporter.report(Observation::Stopped { server: name.to_string() });
        } else {
            reporter.report(Observation::NotActive { server: name.to_string() });
        }
    }
    Ok(())
}
