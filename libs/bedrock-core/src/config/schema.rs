//! Per-section schema validation (spec §4.2 step 5).
//!
//! Each top-level key of the aggregate configuration is validated
//! independently against its own JSON Schema, so an operator gets a
//! location-annotated error naming the offending section rather than one
//! opaque deserialization failure for the whole document.

use serde_json::json;

use crate::error::{BedrockError, BedrockResult};

fn provider_or_client_schema() -> serde_json::Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "required": ["name", "type"],
            "properties": {
                "name": {"type": "string", "minLength": 1},
                "type": {"type": "string", "minLength": 1},
                "provider_id": {"type": "integer", "minimum": 0, "maximum": 65535},
                "pool": {"type": "string"},
                "tags": {"type": "array", "items": {"type": "string"}},
                "dependencies": {"type": "object"},
                "config": {}
            }
        }
    })
}

fn ssg_schema() -> serde_json::Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "required": ["name", "bootstrap"],
            "properties": {
                "name": {"type": "string", "minLength": 1},
                "pool": {"type": "string"},
                "credential": {"type": "string"},
                "group_file": {"type": "string"},
                "bootstrap": {"type": "string"},
                "swim": {"type": "object"}
            }
        }
    })
}

fn bedrock_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "provider_id": {"type": "integer", "minimum": 0, "maximum": 65535},
            "pool": {"type": "string"},
            "dependency_resolution_timeout": {"type": "integer", "minimum": 0}
        }
    })
}

fn libraries_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "additionalProperties": {"type": ["string", "null"]}
    })
}

fn margo_schema() -> serde_json::Value {
    json!({})
}

/// Validate a single named section of the aggregate configuration.
///
/// # Errors
/// Returns `ConfigInvalid` naming the section and schema violation.
pub fn validate_section(section_name: &str, value: &serde_json::Value) -> BedrockResult<()> {
    let schema = match section_name {
        "providers" | "clients" => provider_or_client_schema(),
        "ssg" => ssg_schema(),
        "bedrock" => bedrock_schema(),
        "libraries" => libraries_schema(),
        "margo" => margo_schema(),
        other => {
            return Err(BedrockError::config_invalid(format!(
                "unknown configuration section '{other}'"
            )))
        }
    };

    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| BedrockError::config_invalid(format!("internal schema for '{section_name}' is invalid: {e}")))?;

    let errors: Vec<String> = validator.iter_errors(value).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(BedrockError::config_invalid(format!(
            "section '{section_name}' failed validation: {}",
            errors.join("; ")
        )))
    }
}

/// Validate every recognized section present in `config`. Missing sections
/// are not an error here; absence is handled by `AggregateConfig`'s
/// `#[serde(default)]` fields.
///
/// # Errors
/// Returns the first `ConfigInvalid` encountered.
pub fn validate_all(config: &serde_json::Value) -> BedrockResult<()> {
    for section in ["margo", "libraries", "providers", "clients", "ssg", "bedrock"] {
        if let Some(value) = config.get(section) {
            validate_section(section, value)?;
        }
    }
    Ok(())
}
