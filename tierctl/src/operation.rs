// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The operations tierctl can carry out

use crate::config::Config;
use crate::lifecycle;
use crate::provider::CloudProvider;
use crate::reconcile;
use crate::report::Reporter;
use crate::status;
use crate::teardown;
use slog::info;
use std::fmt;
use std::str::FromStr;
use tierctl_common::api::external::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation {
    /// build whatever part of the topology is missing
    Create,
    /// start the servers that aren't running
    Run,
    /// stop the servers that are running
    Stop,
    /// delete the servers, router, subnet and network
    Destroy,
    /// print each server's status
    Status,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Create,
        Operation::Run,
        Operation::Stop,
        Operation::Destroy,
        Operation::Status,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Run => "run",
            Operation::Stop => "stop",
            Operation::Destroy => "destroy",
            Operation::Status => "status",
        }
    }

    /// Carry out this operation against `provider`
    ///
    /// Calls are made one at a time and the first fault ends the operation;
    /// nothing already done is undone.
    pub async fn execute(
        self,
        provider: &dyn CloudProvider,
        config: &Config,
        reporter: &mut Reporter,
    ) -> Result<(), Error> {
        info!(reporter.log(), "starting operation"; "operation" => %self);
        let topology = &config.topology;
        match self {
            Operation::Create => {
                reconcile::create(provider, config, reporter).await
            }
            Operation::Run => lifecycle::run(provider, topology, reporter).await,
            Operation::Stop => {
                lifecycle::stop(provider, topology, reporter).await
            }
            Operation::Destroy => {
                teardown::destroy(provider, config, reporter).await
            }
            Operation::Status => {
                status::status(provider, topology, reporter).await
            }
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{0}: no such operation")]
pub struct UnknownOperation(pub String);

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.label() == s)
            .ok_or_else(|| UnknownOperation(s.to_string()))
    }
}
