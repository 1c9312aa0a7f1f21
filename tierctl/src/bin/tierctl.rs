// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Executable program to manage the three-tier topology

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::Parser;
use tierctl::config::Config;
use tierctl::openstack::OpenStackProvider;
use tierctl::report::Reporter;
use tierctl::Operation;

#[derive(Debug, Parser)]
#[clap(
    name = "tierctl",
    about = "Create, run, stop, destroy or inspect the web, app and db servers",
    after_help = "Without --config or --cloud, the built-in names and the \
                  \"openstack\" cloud profile are used."
)]
struct Args {
    /// one of: create, run, stop, destroy, status
    #[clap(action)]
    operation: String,

    /// Optional: overrides the built-in settings with a TOML file
    #[clap(long, action)]
    config: Option<Utf8PathBuf>,

    /// Optional: overrides the built-in cloud profile name
    #[clap(long, env = "OS_CLOUD", default_value = "openstack", action)]
    cloud: String,
}

#[tokio::main]
async fn main() {
    if let Err(error) = do_run().await {
        eprintln!("tierctl: {}", error_chain(&error));
        std::process::exit(1);
    }
}

/// Join the error and its causes, leaving out any cause whose text is
/// already part of the message it's the source of
fn error_chain(error: &anyhow::Error) -> String {
    let mut message = String::new();
    for cause in error.chain() {
        let text = cause.to_string();
        if message.contains(&text) {
            continue;
        }
        if !message.is_empty() {
            message.push_str(": ");
        }
        message.push_str(&text);
    }
    message
}

async fn do_run() -> Result<(), anyhow::Error> {
    let args = Args::parse();

    let operation = match args.operation.parse::<Operation>() {
        Ok(operation) => operation,
        Err(unknown) => {
            println!("{}", unknown);
            return Ok(());
        }
    };

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let log = config
        .log
        .to_logger("tierctl")
        .context("failed to create logger")?;

    let provider = OpenStackProvider::connect(&log, &args.cloud)
        .await
        .with_context(|| format!("connect to cloud \"{}\"", args.cloud))?;
    let mut reporter = Reporter::stdout(&log);
    operation
        .execute(&provider, &config, &mut reporter)
        .await
        .with_context(|| format!("{} failed", operation))?;
    Ok(())
}
