// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! What the operations observe and do, and how it's shown to the user
//!
//! Every operation describes its progress as a sequence of [`Observation`]s.
//! The [`Reporter`] prints each one as a line of text as soon as it happens,
//! records it in the log, and keeps the sequence so that tests can examine it.

use crate::config::ServerRole;
use slog::info;
use slog::warn;
use slog::Logger;
use std::fmt;
use std::io::Write;
use std::net::IpAddr;
use tierctl_common::api::external::ResourceType;
use tierctl_common::api::external::ServerStatus;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Observation {
    /// `create` made a network, subnet or router.
    Created { kind: ResourceType },
    /// `create` found a network, subnet or router already in place.
    AlreadyExists { kind: ResourceType },
    CreatingServer { role: ServerRole, name: String },
    ServerAlreadyExists { role: ServerRole, name: String },
    FloatingIpAssociated { server: String, address: IpAddr },
    FloatingIpPresent { server: String, address: IpAddr },

    Started { server: String },
    AlreadyActive { server: String },
    StartMissing { server: String },
    Stopped { server: String },
    NotActive { server: String },
    StopMissing { server: String },

    ServerDeleted { server: String },
    ServerAlreadyAbsent { server: String },
    /// `destroy` removed the router, subnet or network.
    Deleted { kind: ResourceType },
    AlreadyAbsent { kind: ResourceType },

    Status { server: String, status: ServerStatus },
    StatusMissing { server: String },
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observation::Created { kind } => {
                write!(f, "{} created", capitalized(*kind))
            }
            Observation::AlreadyExists { kind } => {
                write!(f, "{} already exists", capitalized(*kind))
            }
            Observation::CreatingServer { role, .. } => {
                write!(f, "Creating the {} server", role)
            }
            Observation::ServerAlreadyExists { role, .. } => {
                write!(f, "{} server already exists", role)
            }
            Observation::FloatingIpAssociated { server, address } => {
                write!(f, "Floating IP {} associated with {}", address, server)
            }
            Observation::FloatingIpPresent { server, address } => {
                write!(f, "{} already has floating IP {}", server, address)
            }
            Observation::Started { server } => {
                write!(f, "{} has been started", server)
            }
            Observation::AlreadyActive { server } => {
                write!(f, "{} is already active", server)
            }
            Observation::StartMissing { server } => {
                write!(f, "Attempted to start {} but it doesn't exist", server)
            }
            Observation::Stopped { server } => {
                write!(f, "{} has been stopped successfully", server)
            }
            Observation::NotActive { server } => {
                write!(f, "{} is not active so has not been changed", server)
            }
            Observation::StopMissing { server } => {
                write!(f, "{} not found", server)
            }
            Observation::ServerDeleted { server } => {
                write!(f, "{} server has been deleted", server)
            }
            Observation::ServerAlreadyAbsent { server } => {
                write!(f, "{} server already does not exist", server)
            }
            Observation::Deleted { kind } => {
                write!(f, "{} has been deleted", kind)
            }
            Observation::AlreadyAbsent { kind } => {
                write!(f, "{} already does not exist", kind)
            }
            Observation::Status { server, status } => {
                write!(f, "{} status is {}", server, status)
            }
            Observation::StatusMissing { server } => {
                write!(f, "{} was not found", server)
            }
        }
    }
}

fn capitalized(kind: ResourceType) -> String {
    let label = kind.to_string();
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => label,
    }
}

/// Prints, logs and records [`Observation`]s
pub struct Reporter {
    log: Logger,
    sink: Box<dyn Write + Send>,
    history: Vec<Observation>,
}

impl Reporter {
    pub fn new(log: &Logger, sink: Box<dyn Write + Send>) -> Reporter {
        Reporter { log: log.clone(), sink, history: Vec::new() }
    }

    /// Reporter for the command line: the report goes to stdout
    pub fn stdout(log: &Logger) -> Reporter {
        Reporter::new(log, Box::new(std::io::stdout()))
    }

    /// Reporter that only logs and records
    pub fn quiet(log: &Logger) -> Reporter {
        Reporter::new(log, Box::new(std::io::sink()))
    }

    pub fn log(&self) -> &Logger {
        &self.log
    }

    pub fn report(&mut self, observation: Observation) {
        info!(self.log, "{}", observation);
        if let Err(error) = writeln!(self.sink, "{}", observation)
            .and_then(|()| self.sink.flush())
        {
            warn!(self.log, "failed to write report"; "error" => %error);
        }
        self.history.push(observation);
    }

    pub fn history(&self) -> &[Observation] {
        &self.history
    }

    /// The report as the user saw it, one line per observation
    pub fn lines(&self) -> Vec<String> {
        self.history.iter().map(|o| o.to_string()).collect()
    }
}

#[cfg(test)]
mod test {
    use super::Observation;
    use super::Reporter;
    use crate::config::ServerRole;
    use std::io::Write;
    use std::sync::Arc;
    use std::sync::Mutex;
    use tierctl_common::api::external::ResourceType;
    use tierctl_common::api::external::ServerStatus;
    use tierctl_test_utils::dev::test_setup_log;

    #[test]
    fn test_observation_text() {
        let server = || String::from("tawaab1-web");
        let cases = [
            (Observation::Created { kind: ResourceType::Network }, "Network created"),
            (
                Observation::AlreadyExists { kind: ResourceType::Subnet },
                "Subnet already exists",
            ),
            (
                Observation::CreatingServer { role: ServerRole::Web, name: server() },
                "Creating the Web server",
            ),
            (
                Observation::ServerAlreadyExists {
                    role: ServerRole::Db,
                    name: String::from("tawaab1-db"),
                },
                "DB server already exists",
            ),
            (Observation::AlreadyActive { server: server() }, "tawaab1-web is already active"),
            (
                Observation::StartMissing { server: server() },
                "Attempted to start tawaab1-web but it doesn't exist",
            ),
            (Observation::StopMissing { server: server() }, "tawaab1-web not found"),
            (
                Observation::Stopped { server: server() },
                "tawaab1-web has been stopped successfully",
            ),
            (
                Observation::NotActive { server: server() },
                "tawaab1-web is not active so has not been changed",
            ),
            (
                Observation::ServerAlreadyAbsent { server: server() },
                "tawaab1-web server already does not exist",
            ),
            (
                Observation::ServerDeleted { server: server() },
                "tawaab1-web server has been deleted",
            ),
            (Observation::Deleted { kind: ResourceType::Router }, "router has been deleted"),
            (
                Observation::AlreadyAbsent { kind: ResourceType::Subnet },
                "subnet already does not exist",
            ),
            (Observation::StatusMissing { server: server() }, "tawaab1-web was not found"),
            (
                Observation::Status {
                    server: server(),
                    status: ServerStatus::from("SHUTOFF"),
                },
                "tawaab1-web status is SHUTOFF",
            ),
        ];
        for (observation, text) in cases {
            assert_eq!(observation.to_string(), text);
        }
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_reporter_writes_and_records() {
        let logctx = test_setup_log("test_reporter_writes_and_records");
        let buffer = SharedBuffer::default();
        let mut reporter = Reporter::new(&logctx.log, Box::new(buffer.clone()));

        reporter.report(Observation::Created { kind: ResourceType::Network });
        reporter.report(Observation::AlreadyExists { kind: ResourceType::Router });

        let written = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert_eq!(written, "Network created\nRouter already exists\n");
        assert_eq!(reporter.lines(), vec!["Network created", "Router already exists"]);
        assert_eq!(reporter.history().len(), 2);

        logctx.cleanup_successful();
    }
}
