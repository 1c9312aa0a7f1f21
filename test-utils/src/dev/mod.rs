// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Facilities intended for the test suite.  These should not be used in
//! production code.

pub mod test_cmds;

use slog::Logger;
use std::path::PathBuf;
use tierctl_common::logging::ConfigLogging;
use tierctl_common::logging::ConfigLoggingIfExists;
use tierctl_common::logging::ConfigLoggingLevel;

/// A logger for one test, writing to a file of its own
///
/// The file is left behind if the test fails so that it can be inspected.
/// Tests call [`LogContext::cleanup_successful`] at the end to remove it.
pub struct LogContext {
    pub log: Logger,
    log_path: PathBuf,
}

impl LogContext {
    pub fn new(test_name: &str, level: ConfigLoggingLevel) -> LogContext {
        let log_path = test_cmds::temp_file_path(&format!("{}.log", test_name));
        let config = ConfigLogging::File {
            level,
            path: log_path.clone(),
            if_exists: ConfigLoggingIfExists::Fail,
        };
        let log = config
            .to_logger("tierctl-test")
            .unwrap_or_else(|e| panic!("failed to create test log: {}", e));
        LogContext { log, log_path }
    }

    /// Remove the log file, for tests that passed
    pub fn cleanup_successful(self) {
        let LogContext { log, log_path } = self;
        drop(log);
        if let Err(error) = std::fs::remove_file(&log_path) {
            eprintln!(
                "failed to remove log file \"{}\": {}",
                log_path.display(),
                error
            );
        }
    }
}

/// Set up a [`LogContext`] appropriate for a test named `test_name`
pub fn test_setup_log(test_name: &str) -> LogContext {
    LogContext::new(test_name, ConfigLoggingLevel::Trace)
}
