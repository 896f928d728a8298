//! Request/response payloads for the Remote Control RPCs (spec §6).
//!
//! Every RPC is modeled here as a plain `Deserialize` request struct (the
//! JSON body of a `POST`) and funnels through [`RpcEnvelope`] for its
//! response, matching spec §6's "`(success, error-string, value)`" contract
//! rather than the teacher's RFC9457 Problem+JSON convention.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::BedrockResult;

/// The uniform response envelope every RPC returns (spec §6, §7: "Errors
/// inside RPC handlers are packaged into the `Result` envelope; no handler
/// panics the process").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcEnvelope {
    pub success: bool,
    pub error: Option<String>,
    pub value: serde_json::Value,
}

impl RpcEnvelope {
    #[must_use]
    pub fn from_result<T: Serialize>(result: BedrockResult<T>) -> Self {
        match result {
            Ok(value) => Self {
                success: true,
                error: None,
                value: serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
            },
            Err(e) => Self {
                success: false,
                error: Some(e.to_string()),
                value: serde_json::Value::Null,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QueryConfigRequest {
    pub script: String,
}

#[derive(Debug, Deserialize)]
pub struct LoadModuleRequest {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct StartProviderRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default)]
    pub provider_id: Option<u16>,
    #[serde(default)]
    pub pool: Option<String>,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
    #[serde(default)]
    pub dependencies: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeProviderPoolRequest {
    pub provider: String,
    pub pool: String,
}

#[derive(Debug, Deserialize)]
pub struct AddClientRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
    #[serde(default)]
    pub dependencies: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResourceConfigRequest {
    pub config: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct NameRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct MigrateProviderRequest {
    pub provider: String,
    pub dest_addr: String,
    pub dest_provider_id: u16,
    #[serde(default)]
    pub migration_config: serde_json::Value,
    #[serde(default)]
    pub remove_source: bool,
}

#[derive(Debug, Deserialize)]
pub struct SnapshotProviderRequest {
    pub provider: String,
    pub dest_path: String,
    #[serde(default)]
    pub snapshot_config: serde_json::Value,
    #[serde(default)]
    pub remove_source: bool,
}

#[derive(Debug, Deserialize)]
pub struct RestoreProviderRequest {
    pub provider: String,
    pub src_path: String,
    #[serde(default)]
    pub restore_config: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct LookupRequest {
    pub spec: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct LookupClientRequest {
    pub name: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Deserialize)]
pub struct ProviderExistsQuery {
    #[serde(rename = "type")]
    pub type_tag: String,
    pub provider_id: Option<u16>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct ProviderExistsResponse {
    pub found: bool,
}
