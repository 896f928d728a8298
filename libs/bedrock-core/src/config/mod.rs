//! Aggregate configuration and the pipeline that produces it (spec §3,
//! §4.2, §6).
//!
//! The aggregate document is assembled from a single configuration source
//! (TOML, JSON, or a script template) by `load`, which runs the five-step
//! pipeline in `pipeline` and then validates each section with `schema`
//! before deserializing into [`AggregateConfig`].

pub mod pipeline;
pub mod schema;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{BedrockError, BedrockResult};
use crate::script::ScriptManager;

fn default_bedrock_provider_id() -> u16 {
    0
}

fn default_dependency_resolution_timeout() -> u64 {
    30
}

/// The `bedrock` section: settings for the composition engine's own
/// built-in provider (spec §3, SPEC_FULL.md §F.2/§F.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BedrockConfig {
    #[serde(default = "default_bedrock_provider_id")]
    pub provider_id: u16,
    #[serde(default)]
    pub pool: Option<String>,
    #[serde(default = "default_dependency_resolution_timeout")]
    pub dependency_resolution_timeout: u64,
}

impl Default for BedrockConfig {
    fn default() -> Self {
        Self {
            provider_id: default_bedrock_provider_id(),
            pool: None,
            dependency_resolution_timeout: default_dependency_resolution_timeout(),
        }
    }
}

/// One entry of the `ssg` array: a named process group to bootstrap at
/// startup (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsgGroupConfig {
    pub name: String,
    #[serde(default)]
    pub pool: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
    #[serde(default)]
    pub group_file: Option<String>,
    pub bootstrap: String,
    #[serde(default)]
    pub swim: Option<serde_json::Value>,
}

/// One entry of the `providers`/`clients` arrays (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default)]
    pub provider_id: Option<u16>,
    #[serde(default)]
    pub pool: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub dependencies: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// The fully resolved, schema-validated configuration document (spec §3,
/// §6's `getCurrentConfig` response shape).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateConfig {
    #[serde(default)]
    pub margo: serde_json::Value,
    #[serde(default)]
    pub libraries: HashMap<String, Option<String>>,
    #[serde(default)]
    pub providers: Vec<ComponentConfig>,
    #[serde(default)]
    pub clients: Vec<ComponentConfig>,
    #[serde(default)]
    pub ssg: Vec<SsgGroupConfig>,
    #[serde(default)]
    pub bedrock: BedrockConfig,
}

/// Load and assemble the aggregate configuration from a raw source string,
/// running the full pipeline from spec §4.2: template evaluation /
/// TOML-to-JSON conversion, shorthand expansion, `__if__` filtering with
/// per-rank array selection, and per-section schema validation.
///
/// # Errors
/// Returns `ConfigInvalid` at whichever pipeline step first rejects the
/// input.
pub fn load(
    source: &str,
    tag: pipeline::SourceTag,
    script: &ScriptManager,
    context_params: &serde_json::Value,
    rank: u32,
    process_count: u32,
) -> BedrockResult<AggregateConfig> {
    let raw = pipeline::to_json(source, tag, script, context_params)?;
    let expanded = pipeline::expand_simplified_forms(raw);
    let vars = merge_vars(context_params, rank, process_count);
    let filtered = pipeline::filter_conditional(expanded, script, &vars, rank, process_count)?;
    schema::validate_all(&filtered)?;
    serde_json::from_value(filtered)
        .map_err(|e| BedrockError::config_invalid(format!("aggregate configuration does not match expected shape: {e}")))
}

fn merge_vars(context_params: &serde_json::Value, rank: u32, process_count: u32) -> serde_json::Value {
    let mut map = match context_params {
        serde_json::Value::Object(m) => m.clone(),
        _ => serde_json::Map::new(),
    };
    map.insert("rank".to_owned(), serde_json::Value::from(rank));
    map.insert("process_count".to_owned(), serde_json::Value::from(process_count));
    serde_json::Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{BoaScriptEvaluator, ScriptManager};
    use serde_json::json;

    fn scripts() -> ScriptManager {
        ScriptManager::new(BoaScriptEvaluator::new())
    }

    #[test]
    fn loads_minimal_json_config() {
        let source = r#"{"providers": [{"name": "p1", "type": "module_a"}]}"#;
        let config = load(source, pipeline::SourceTag::Json, &scripts(), &json!({}), 0, 1).unwrap();
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].name, "p1");
        assert_eq!(config.bedrock.provider_id, 0);
        assert_eq!(config.bedrock.dependency_resolution_timeout, 30);
    }

    #[test]
    fn loads_toml_config_with_bedrock_overrides() {
        let source = r#"
[bedrock]
provider_id = 7
dependency_resolution_timeout = 5

[[providers]]
name = "p1"
type = "module_a"
"#;
        let config = load(source, pipeline::SourceTag::Toml, &scripts(), &json!({}), 0, 1).unwrap();
        assert_eq!(config.bedrock.provider_id, 7);
        assert_eq!(config.bedrock.dependency_resolution_timeout, 5);
    }

    #[test]
    fn applies_rank_selection_across_array_entries() {
        let source = r#"[{"providers": [{"name": "p0", "type": "t"}]}, {"providers": [{"name": "p1", "type": "t"}]}]"#;
        let config = load(source, pipeline::SourceTag::Json, &scripts(), &json!({}), 1, 2).unwrap();
        assert_eq!(config.providers[0].name, "p1");
    }

    #[test]
    fn rejects_provider_missing_type() {
        let source = r#"{"providers": [{"name": "p1"}]}"#;
        let err = load(source, pipeline::SourceTag::Json, &scripts(), &json!({}), 0, 1).unwrap_err();
        assert_eq!(err.kind(), "ConfigInvalid");
    }

    #[test]
    fn loads_libraries_as_module_to_path_map() {
        let source = r#"{"libraries": {"mod_a": "/opt/libs/mod_a.so", "mod_b": null}}"#;
        let config = load(source, pipeline::SourceTag::Json, &scripts(), &json!({}), 0, 1).unwrap();
        assert_eq!(config.libraries.get("mod_a"), Some(&Some("/opt/libs/mod_a.so".to_owned())));
        assert_eq!(config.libraries.get("mod_b"), Some(&None));
    }

    #[test]
    fn expands_bare_string_dependency_before_validation() {
        let source = r#"{"providers": [
            {"name": "p1", "type": "t"},
            {"name": "p2", "type": "t", "dependencies": {"x": "p1"}}
        ]}"#;
        let config = load(source, pipeline::SourceTag::Json, &scripts(), &json!({}), 0, 1).unwrap();
        assert_eq!(config.providers[1].dependencies["x"], vec!["p1".to_owned()]);
    }
}
