// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `status`: report what each server is doing

use crate::config::Topology;
use crate::provider::CloudProvider;
use crate::report::Observation;
use crate::report::Reporter;
use tierctl_common::api::external::Error;
use tierctl_common::api::external::ResourceType;

/// Report each server's status exactly as the provider gives it
pub async fn status(
    provider: &dyn CloudProvider,
    topology: &Topology,
    reporter: &mut Reporter,
) -> Result<(), Error> {
    for (_, name) in topology.servers() {
        match provider.lookup(ResourceType::Server, name).await? {
            None => reporter
                .report(Observation::StatusMissing { server: name.to_string() }),
            Some(found) => {
                let server = provider.server_get(&found.id).await?;
                reporter.report(Observation::Status {
                    server: name.to_string(),
                    status: server.status,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::status;
    use crate::config::Topology;
    use crate::report::Reporter;
    use crate::sim::SimCloud;
    use tierctl_common::api::external::ServerStatus;
    use tierctl_test_utils::dev::test_setup_log;

    #[tokio::test]
    async fn test_status() {
        let logctx = test_setup_log("test_status");
        let sim = SimCloud::builder()
            .server("tawaab1-web", ServerStatus::Active)
            .server("tawaab1-db", ServerStatus::from("VERIFY_RESIZE"))
            .build(&logctx.log);

        let mut reporter = Reporter::quiet(&logctx.log);
        status(&sim, &Topology::default(), &mut reporter).await.unwrap();
        assert_eq!(
            reporter.lines(),
            vec![
                "tawaab1-web status is ACTIVE",
                "tawaab1-app was not found",
                "tawaab1-db status is VERIFY_RESIZE",
            ]
        );
        assert!(sim.mutations().is_empty());

        logctx.cleanup_successful();
    }
}
