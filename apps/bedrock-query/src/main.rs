//! *query* CLI (spec §6): concurrently fetch `get_config` from a set of
//! Bedrock daemons and print the results as a JSON map keyed by address.
//!
//! Grounded on `original_source/bin/bedrock-query.cpp`'s argument set and
//! its concurrent per-address fan-out.

use std::path::PathBuf;
use std::time::Duration;

use bedrock_bootstrap::host::logging::LogLevel;
use clap::Parser;

/// Query the configuration from Bedrock daemons.
#[derive(Parser)]
#[command(name = "bedrock-query")]
#[command(about = "Query the configuration from Bedrock daemons")]
#[command(version)]
struct Cli {
    /// Address of a Bedrock daemon (repeatable).
    #[arg(short, long = "addresses")]
    address: Vec<String>,

    /// SSG file from which to read addresses of Bedrock daemons.
    #[arg(short, long = "ssg-file")]
    ssg_file: Option<PathBuf>,

    /// Provider id to use when contacting Bedrock daemons.
    #[arg(short = 'i', long = "provider-id", default_value_t = 0)]
    provider_id: u16,

    /// Print human-readable JSON.
    #[arg(short, long)]
    pretty: bool,

    /// Log verbosity (`-v` debug, `-vv` trace).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = bedrock_bootstrap::host::logging::init_logging(LogLevel::from_verbosity(cli.verbose), None);
    tracing::debug!(provider_id = cli.provider_id, "querying config");

    let mut addresses = cli.address;
    if let Some(path) = &cli.ssg_file {
        let members = bedrock_core::group::read_group_file(path)?;
        addresses.extend(members.into_iter().map(|m| m.address));
    }

    let client = reqwest::Client::new();
    let timeout = Duration::from_secs(30);
    let results = futures_util::future::join_all(
        addresses.iter().map(|address| bedrock_core::rpc::client::get_config(&client, address, timeout)),
    )
    .await;

    let mut out = serde_json::Map::new();
    for (address, result) in addresses.iter().zip(results) {
        match result {
            Ok(config) => {
                out.insert(address.clone(), config);
            }
            Err(e) => {
                tracing::error!(%address, error = %e, "could not query config");
            }
        }
    }
    let value = serde_json::Value::Object(out);

    if cli.pretty {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{value}");
    }
    Ok(())
}
