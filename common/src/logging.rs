// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Logging configuration
//!
//! tierctl prints its human-readable report on stdout.  Everything else goes
//! through slog, either to the terminal on stderr or to a bunyan-formatted
//! file.

use crate::FileKv;
use serde::Deserialize;
use serde::Serialize;
use slog::o;
use slog::Drain;
use slog::Level;
use slog::Logger;
use std::fs::OpenOptions;
use std::path::Path;
use std::path::PathBuf;

/// Represents the logging configuration for a program (the "log" top-level
/// object in a configuration file)
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "mode")]
pub enum ConfigLogging {
    #[serde(rename = "stderr-terminal")]
    StderrTerminal { level: ConfigLoggingLevel },

    #[serde(rename = "file")]
    File {
        level: ConfigLoggingLevel,
        path: PathBuf,
        if_exists: ConfigLoggingIfExists,
    },
}

impl Default for ConfigLogging {
    /// Log warnings and worse to the terminal so that stdout carries only the
    /// report.
    fn default() -> Self {
        ConfigLogging::StderrTerminal { level: ConfigLoggingLevel::Warn }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLoggingIfExists {
    Fail,
    Truncate,
    Append,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLoggingLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl From<ConfigLoggingLevel> for Level {
    fn from(config_level: ConfigLoggingLevel) -> Level {
        match config_level {
            ConfigLoggingLevel::Trace => Level::Trace,
            ConfigLoggingLevel::Debug => Level::Debug,
            ConfigLoggingLevel::Info => Level::Info,
            ConfigLoggingLevel::Warn => Level::Warning,
            ConfigLoggingLevel::Error => Level::Error,
            ConfigLoggingLevel::Critical => Level::Critical,
        }
    }
}

/// Error returned when a logger cannot be created from its configuration
#[derive(Debug, thiserror::Error)]
#[error("open log file \"{path}\": {error}")]
pub struct LogInitError {
    path: PathBuf,
    #[source]
    error: std::io::Error,
}

impl ConfigLogging {
    /// Create the root logger based on the requested configuration.
    ///
    /// `name` identifies the program in file-based (bunyan) logs.
    pub fn to_logger(&self, name: &'static str) -> Result<Logger, LogInitError> {
        match self {
            ConfigLogging::StderrTerminal { level } => {
                let decorator = slog_term::TermDecorator::new().stderr().build();
                let drain =
                    slog_term::FullFormat::new(decorator).build().fuse();
                Ok(async_root_logger(*level, drain))
            }

            ConfigLogging::File { level, path, if_exists } => {
                let mut open_options = std::fs::OpenOptions::new();
                open_options.write(true);

                match if_exists {
                    ConfigLoggingIfExists::Fail => {
                        open_options.create_new(true);
                    }
                    ConfigLoggingIfExists::Append => {
                        open_options.create(true).append(true);
                    }
                    ConfigLoggingIfExists::Truncate => {
                        open_options.create(true).truncate(true);
                    }
                }

                let drain = log_drain_for_file(&open_options, path, name)?;
                Ok(async_root_logger(*level, drain))
            }
        }
    }
}

// The async drain takes care of synchronization for the terminal and file
// drains, neither of which is safe to share across threads on its own.
fn async_root_logger<T>(level: ConfigLoggingLevel, drain: T) -> Logger
where
    T: Drain + Send + 'static,
    <T as Drain>::Err: std::fmt::Debug,
{
    let level_drain = slog::LevelFilter(drain, Level::from(level)).fuse();
    let async_drain = slog_async::Async::new(level_drain).build().fuse();
    Logger::root(async_drain, o!(FileKv))
}

fn log_drain_for_file(
    open_options: &OpenOptions,
    path: &Path,
    name: &'static str,
) -> Result<slog::Fuse<slog_json::Json<std::fs::File>>, LogInitError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|error| LogInitError {
                path: path.to_path_buf(),
                error,
            })?;
        }
    }

    let file = open_options
        .open(path)
        .map_err(|error| LogInitError { path: path.to_path_buf(), error })?;

    // Record a message to the stderr so that a reader who doesn't already know
    // how logging is configured knows where the rest of the log messages went.
    eprintln!("note: configured to log to \"{}\"", path.display());
    Ok(slog_bunyan::with_name(name, file).build().fuse())
}
