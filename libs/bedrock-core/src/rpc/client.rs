//! `reqwest`-based client helpers for the `bedrock-query`/`bedrock-shutdown`
//! CLIs (spec §6 CLI surface) to talk to a remote daemon's Remote Control
//! router without either binary depending on axum directly.

use std::time::Duration;

use super::types::RpcEnvelope;
use crate::error::{BedrockError, BedrockResult};

/// `get_config()` against a remote daemon at `address` (spec §6 *query*).
///
/// # Errors
/// Returns `RemoteLookupFailed` if the request fails or the peer reports an
/// error in its envelope.
pub async fn get_config(client: &reqwest::Client, address: &str, timeout: Duration) -> BedrockResult<serde_json::Value> {
    let envelope = send(client, reqwest::Method::GET, address, "/bedrock/v1/config", timeout, None::<()>).await?;
    Ok(envelope.value)
}

/// Instruct a remote daemon to finalize (spec §6 *shutdown*): hits the
/// `shutdown` route, which wakes the peer's `Server::wait_for_shutdown`.
///
/// # Errors
/// Returns `RemoteLookupFailed` if the request fails or the peer reports an
/// error in its envelope.
pub async fn shutdown(client: &reqwest::Client, address: &str, timeout: Duration) -> BedrockResult<()> {
    send(client, reqwest::Method::POST, address, "/bedrock/v1/shutdown", timeout, None::<()>).await?;
    Ok(())
}

async fn send(
    client: &reqwest::Client,
    method: reqwest::Method,
    address: &str,
    path: &str,
    timeout: Duration,
    body: Option<impl serde::Serialize>,
) -> BedrockResult<RpcEnvelope> {
    let url = format!("{address}{path}");
    let mut request = client.request(method, &url).timeout(timeout);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request
        .send()
        .await
        .map_err(|e| BedrockError::remote_lookup_failed(format!("request to {address} failed: {e}")))?;

    if !response.status().is_success() {
        return Err(BedrockError::remote_lookup_failed(format!(
            "peer at {address} returned status {}",
            response.status()
        )));
    }

    let envelope: RpcEnvelope = response
        .json()
        .await
        .map_err(|e| BedrockError::remote_lookup_failed(format!("malformed response from {address}: {e}")))?;

    if !envelope.success {
        return Err(BedrockError::remote_lookup_failed(
            envelope.error.unwrap_or_else(|| format!("peer at {address} reported an unspecified error")),
        ));
    }

    Ok(envelope)
}
