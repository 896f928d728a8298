#![allow(clippy::unwrap_used, clippy::expect_used)]

//! CLI smoke tests for the `bedrockd` binary: argument validation and
//! config-dump behavior that don't require a live transport.

use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::timeout;

fn run_bedrockd(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_bedrockd"))
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .expect("failed to execute bedrockd")
}

async fn run_bedrockd_with_timeout(
    args: &[&str],
    timeout_duration: Duration,
) -> Result<std::process::Output, Box<dyn std::error::Error>> {
    let mut cmd = tokio::process::Command::new(env!("CARGO_BIN_EXE_bedrockd"));
    cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);

    let child = cmd.spawn()?;
    match timeout(timeout_duration, child.wait_with_output()).await {
        Ok(result) => result.map_err(Into::into),
        Err(_elapsed) => Err("elapsed".into()),
    }
}

#[test]
fn help_lists_every_documented_flag() {
    let output = run_bedrockd(&["--help"]);
    assert!(output.status.success(), "help should succeed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in ["--config", "--output-config", "--stdin", "--jx9", "--toml", "--jx9-context", "--verbose"] {
        assert!(stdout.contains(flag), "help text missing {flag}: {stdout}");
    }
}

#[test]
fn missing_address_argument_is_rejected() {
    let output = run_bedrockd(&[]);
    assert!(!output.status.success(), "address is a required positional argument");
}

#[test]
fn rejects_both_config_and_stdin() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("config.json");
    std::fs::write(&config_path, "{}").unwrap();

    let output = run_bedrockd(&["http://127.0.0.1:0", "--config", config_path.to_str().unwrap(), "--stdin"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--stdin"), "stderr: {stderr}");
}

#[test]
fn rejects_both_jx9_and_toml() {
    let output = run_bedrockd(&["http://127.0.0.1:0", "--jx9", "--toml"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--jx9"), "stderr: {stderr}");
}

#[test]
fn rejects_jx9_context_without_jx9() {
    let output = run_bedrockd(&["http://127.0.0.1:0", "--jx9-context", "x=1"]);
    assert!(!output.status.success());
}

#[test]
fn rejects_malformed_config_file_path() {
    let output = run_bedrockd(&["http://127.0.0.1:0", "--config", "/nonexistent/config.json"]);
    assert!(!output.status.success());
}

#[tokio::test]
async fn writes_resolved_config_then_keeps_running_until_timeout() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("config.json");
    std::fs::write(&config_path, "{}").unwrap();
    let out_path = tmp.path().join("out.json");

    let args = vec![
        "http://127.0.0.1:0",
        "--config",
        config_path.to_str().unwrap(),
        "--output-config",
        out_path.to_str().unwrap(),
    ];
    // The daemon runs until a shutdown signal, so this is expected to time
    // out rather than exit on its own.
    let result = run_bedrockd_with_timeout(&args, Duration::from_millis(500)).await;
    assert!(result.is_err(), "daemon should still be running at the timeout");
    assert!(out_path.exists(), "output-config file should have been written before serving");

    let written = std::fs::read_to_string(&out_path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert!(parsed.get("bedrock").is_some(), "resolved config should include the bedrock section");
}

#[test]
fn stdin_configuration_is_read_when_requested() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_bedrockd"))
        .args(["http://127.0.0.1:0", "--stdin", "--output-config"])
        .args([std::env::temp_dir().join("bedrockd-stdin-out.json").to_str().unwrap()])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn bedrockd");

    child.stdin.as_mut().unwrap().write_all(b"{}").unwrap();
    drop(child.stdin.take());
    // We don't wait for exit (the daemon keeps serving); just confirm it
    // didn't reject the arguments outright.
    std::thread::sleep(Duration::from_millis(200));
    let _ = child.kill();
}
