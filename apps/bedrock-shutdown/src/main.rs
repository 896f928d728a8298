//! *shutdown* CLI (spec §6): concurrently instruct a set of Bedrock daemons
//! to finalize remotely.
//!
//! Grounded on `original_source/bin/bedrock-shutdown.cpp`'s argument set and
//! its concurrent per-address fan-out.

use std::path::PathBuf;
use std::time::Duration;

use bedrock_bootstrap::host::logging::LogLevel;
use clap::Parser;

/// Instruct Bedrock daemons to shut down.
#[derive(Parser)]
#[command(name = "bedrock-shutdown")]
#[command(about = "Instruct Bedrock daemons to shut down")]
#[command(version)]
struct Cli {
    /// Address of a Bedrock daemon (repeatable).
    #[arg(short, long = "addresses")]
    address: Vec<String>,

    /// SSG file from which to read addresses of Bedrock daemons.
    #[arg(short, long = "ssg-file")]
    ssg_file: Option<PathBuf>,

    /// Log verbosity (`-v` debug, `-vv` trace).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = bedrock_bootstrap::host::logging::init_logging(LogLevel::from_verbosity(cli.verbose), None);

    let mut addresses = cli.address;
    if let Some(path) = &cli.ssg_file {
        let members = bedrock_core::group::read_group_file(path)?;
        addresses.extend(members.into_iter().map(|m| m.address));
    }

    let client = reqwest::Client::new();
    let timeout = Duration::from_secs(30);
    let results = futures_util::future::join_all(
        addresses.iter().map(|address| bedrock_core::rpc::client::shutdown(&client, address, timeout)),
    )
    .await;

    for (address, result) in addresses.iter().zip(results) {
        if let Err(e) = result {
            tracing::error!(%address, error = %e, "could not shut down");
        }
    }
    Ok(())
}
