//! Daemon CLI (spec §6 *daemon*): parse the command line, read the
//! configuration document from a file/stdin, bootstrap a [`Server`], serve
//! the Remote Control RPCs, and block until finalized.
//!
//! Grounded on `original_source/bin/bedrock.cpp`'s argument set and startup
//! sequence (parse args, read config, construct the server, optionally dump
//! its resolved config, then wait for finalize).

use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;

use bedrock_bootstrap::host::logging::LogLevel;
use bedrock_core::config::pipeline::SourceTag;
use bedrock_core::rpc;
use bedrock_core::server::Server;
use clap::Parser;

/// Spawns a Bedrock daemon.
#[derive(Parser)]
#[command(name = "bedrockd")]
#[command(about = "Spawns a Bedrock daemon")]
#[command(version)]
struct Cli {
    /// Protocol (e.g. `http`) or address (e.g. `http://127.0.0.1:1234`) this
    /// daemon listens on.
    address: String,

    /// JSON, script-template, or TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON file to write the resolved configuration to after bootstrap.
    #[arg(short = 'o', long = "output-config")]
    output_config: Option<PathBuf>,

    /// Read configuration from standard input.
    #[arg(long)]
    stdin: bool,

    /// Interpret the configuration as a script template.
    #[arg(short = 'j', long = "jx9")]
    jx9: bool,

    /// Configuration is in TOML format instead of JSON.
    #[arg(short = 't', long = "toml")]
    toml: bool,

    /// Comma-separated `k=v` parameters passed to the script template.
    #[arg(long = "jx9-context")]
    jx9_context: Option<String>,

    /// Log verbosity (`-v` debug, `-vv` trace).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = bedrock_bootstrap::host::logging::init_logging(LogLevel::from_verbosity(cli.verbose), None);

    if cli.stdin && cli.config.is_some() {
        anyhow::bail!("both --config and --stdin were provided");
    }
    if cli.jx9 && cli.toml {
        anyhow::bail!("cannot use both --jx9/-j and --toml/-t");
    }
    if cli.jx9_context.is_some() && !cli.jx9 {
        anyhow::bail!("--jx9-context was given for a non-script configuration");
    }

    let config_source = read_config_source(&cli)?;
    let tag = if cli.jx9 {
        SourceTag::Script
    } else if cli.toml {
        SourceTag::Toml
    } else {
        SourceTag::Json
    };
    let context_params = parse_jx9_context(cli.jx9_context.as_deref())?;

    let server = match Server::bootstrap(&config_source, tag, &cli.address, &context_params, 0, 1, &[]).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "bedrock daemon failed to start");
            std::process::exit(1);
        }
    };
    let server = std::sync::Arc::new(server);

    if let Some(path) = cli.output_config {
        let rendered = serde_json::to_string_pretty(&server.current_config())?;
        std::fs::write(&path, rendered)?;
    }

    let router = rpc::router(server.clone());
    let listener = tokio::net::TcpListener::bind(listen_addr(&cli.address)).await?;
    tracing::info!(address = %cli.address, "bedrock daemon listening");

    let server_for_signals = server.clone();
    tokio::spawn(async move {
        if bedrock_bootstrap::host::signals::wait_for_shutdown().await.is_ok() {
            server_for_signals.request_shutdown();
        }
    });

    let wait = server.wait_for_shutdown();
    tokio::select! {
        result = axum::serve(listener, router) => { result?; }
        () = wait => {}
    }

    server.finalize().await?;
    Ok(())
}

/// The daemon's `address` doubles as its HTTP listen address; fall back to
/// binding all interfaces on an ephemeral port when given a bare protocol
/// name rather than a `host:port` address.
fn listen_addr(address: &str) -> String {
    let stripped = address.trim_start_matches("http://").trim_start_matches("https://");
    if stripped.contains(':') && stripped.chars().next().is_some_and(|c| c.is_ascii_digit() || c == '[') {
        stripped.to_owned()
    } else {
        "0.0.0.0:0".to_owned()
    }
}

fn read_config_source(cli: &Cli) -> anyhow::Result<String> {
    if cli.stdin {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else if let Some(path) = &cli.config {
        std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("could not read configuration file {}: {e}", path.display()))
    } else {
        Ok("{}".to_owned())
    }
}

fn parse_jx9_context(raw: Option<&str>) -> anyhow::Result<serde_json::Value> {
    let mut map = HashMap::new();
    if let Some(raw) = raw {
        for assignment in raw.split(',') {
            if assignment.is_empty() {
                continue;
            }
            let (name, value) = assignment
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("invalid definition of '{assignment}' in jx9 parameters"))?;
            map.insert(name.to_owned(), serde_json::Value::String(value.to_owned()));
        }
    }
    Ok(serde_json::Value::Object(map.into_iter().collect()))
}
