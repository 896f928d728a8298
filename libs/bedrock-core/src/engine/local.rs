//! Default `EngineManager`: an in-process engine whose "transport" is a
//! plain HTTP call to a peer's own administrative surface (spec §6 names
//! `lookup_provider` as exactly this kind of request-response RPC).
//! Composes an `axum::Router` server-side with a `reqwest` client on the
//! calling side, the same pairing used throughout this crate's RPC layer.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{EngineManager, ResourceTable};
use crate::error::{BedrockError, BedrockResult};
use crate::provider_manager::ProviderDescriptor;
use crate::rpc::types::RpcEnvelope;

pub struct LocalEngine {
    self_address: String,
    pools: ResourceTable,
    xstreams: ResourceTable,
    http: reqwest::Client,
}

impl LocalEngine {
    /// Initialize from `(address, engine-config)` per spec §4.3. The
    /// engine-specific config string is accepted but unused by this
    /// default implementation beyond validating it parses as JSON, since
    /// the local engine has no tunables of its own.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` if `engine_config` is non-empty and not
    /// valid JSON.
    pub fn initialize(address: impl Into<String>, engine_config: &str) -> BedrockResult<Self> {
        if !engine_config.trim().is_empty() {
            serde_json::from_str::<serde_json::Value>(engine_config)
                .map_err(|e| BedrockError::config_invalid(format!("invalid margo config: {e}")))?;
        }
        Ok(Self {
            self_address: address.into(),
            pools: ResourceTable::new(),
            xstreams: ResourceTable::new(),
            http: reqwest::Client::new(),
        })
    }
}

#[derive(Deserialize)]
struct ProviderExistsResponse {
    found: bool,
}

#[derive(Serialize)]
struct LookupProviderRequest<'a> {
    spec: &'a str,
    timeout_ms: u64,
}

#[async_trait]
impl EngineManager for LocalEngine {
    fn self_address(&self) -> &str {
        &self.self_address
    }

    fn pools(&self) -> &ResourceTable {
        &self.pools
    }

    fn xstreams(&self) -> &ResourceTable {
        &self.xstreams
    }

    async fn remote_provider_exists(
        &self,
        address: &str,
        type_tag: &str,
        provider_id: Option<u16>,
        timeout: Duration,
    ) -> BedrockResult<bool> {
        let mut url = format!("{address}/bedrock/v1/providers/exists?type={type_tag}");
        if let Some(id) = provider_id {
            url.push_str(&format!("&provider_id={id}"));
        }
        url.push_str(&format!("&timeout_ms={}", timeout.as_millis()));

        // Client-side timeout must exceed the server's own wait so the
        // server gets a chance to return its "not found" response instead
        // of the request being cut off first.
        let response = self
            .http
            .get(&url)
            .timeout(timeout + Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| BedrockError::remote_lookup_failed(format!("request to {address} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(BedrockError::remote_lookup_failed(format!(
                "peer at {address} returned status {}",
                response.status()
            )));
        }

        let body: ProviderExistsResponse = response
            .json()
            .await
            .map_err(|e| BedrockError::remote_lookup_failed(format!("malformed response: {e}")))?;
        Ok(body.found)
    }

    async fn remote_lookup_provider(
        &self,
        address: &str,
        type_tag: &str,
        name: &str,
        timeout: Duration,
    ) -> BedrockResult<u16> {
        let url = format!("{address}/bedrock/v1/providers/lookup");
        let body = LookupProviderRequest {
            spec: name,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .timeout(timeout + Duration::from_secs(5))
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
            .map_err(|e| BedrockError::remote_lookup_failed(format!("malformed response: {e}")))?;

        if !envelope.success {
            return Err(BedrockError::remote_lookup_failed(
                envelope.error.unwrap_or_else(|| format!("peer at {address} reported an unspecified error")),
            ));
        }

        let descriptor: ProviderDescriptor = serde_json::from_value(envelope.value)
            .map_err(|e| BedrockError::remote_lookup_failed(format!("malformed provider descriptor: {e}")))?;

        if descriptor.type_tag != type_tag {
            return Err(BedrockError::remote_lookup_failed(format!(
                "provider '{name}' at '{address}' has type '{}', expected '{type_tag}'",
                descriptor.type_tag
            )));
        }

        Ok(descriptor.provider_id)
    }
}
