//! Script Manager: adapter over the external script evaluator (spec §4.4).
//!
//! The evaluator itself is out of scope (spec §1 names it an opaque
//! "script evaluator"); this module defines the trait boundary plus a
//! concrete default backed by `boa_engine`, the JS engine also referenced
//! elsewhere in the example corpus. `ScriptManager` wraps an evaluator
//! behind a single lock exactly as spec §4.4 requires ("a given evaluator
//! instance is not concurrently usable").

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{BedrockError, BedrockResult};

/// The operations a script evaluator must support (spec §4.4), independent
/// of which scripting language backs it.
pub trait ScriptEvaluator: Send {
    fn set_variable(&mut self, name: &str, json_value: &str) -> BedrockResult<()>;
    fn unset_variable(&mut self, name: &str) -> BedrockResult<()>;
    fn evaluate_condition(&mut self, expr: &str, vars: &serde_json::Value) -> BedrockResult<bool>;
    fn execute_query(&mut self, script: &str, vars: &serde_json::Value) -> BedrockResult<String>;
}

/// `boa_engine`-backed default evaluator. Scripts are plain JavaScript
/// expressions/programs; variables are installed as global bindings via
/// JSON round-trip through `serde_json`/Boa's `JsValue`.
pub struct BoaScriptEvaluator {
    context: boa_engine::Context,
}

impl Default for BoaScriptEvaluator {
    fn default() -> Self {
        Self {
            context: boa_engine::Context::default(),
        }
    }
}

impl BoaScriptEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn json_to_js(
        &mut self,
        value: &serde_json::Value,
    ) -> BedrockResult<boa_engine::JsValue> {
        boa_engine::JsValue::from_json(value, &mut self.context)
            .map_err(|e| BedrockError::engine_error(format!("json->js conversion failed: {e}")))
    }

    fn js_to_json(&mut self, value: &boa_engine::JsValue) -> BedrockResult<serde_json::Value> {
        value
            .to_json(&mut self.context)
            .map_err(|e| BedrockError::engine_error(format!("js->json conversion failed: {e}")))?
            .ok_or_else(|| BedrockError::engine_error("script returned no JSON-representable value"))
    }
}

impl ScriptEvaluator for BoaScriptEvaluator {
    fn set_variable(&mut self, name: &str, json_value: &str) -> BedrockResult<()> {
        let parsed: serde_json::Value = serde_json::from_str(json_value)
            .map_err(|e| BedrockError::config_invalid(format!("invalid variable JSON: {e}")))?;
        let js_value = self.json_to_js(&parsed)?;
        self.context
            .register_global_property(
                boa_engine::js_string!(name.to_owned()),
                js_value,
                boa_engine::property::Attribute::all(),
            )
            .map_err(|e| BedrockError::engine_error(format!("set_variable failed: {e}")))?;
        Ok(())
    }

    fn unset_variable(&mut self, name: &str) -> BedrockResult<()> {
        // Boa has no built-in "delete global binding"; shadow it with
        // `undefined`, which is observably equivalent for the read-only
        // template-expansion use case this engine serves.
        self.context
            .register_global_property(
                boa_engine::js_string!(name.to_owned()),
                boa_engine::JsValue::undefined(),
                boa_engine::property::Attribute::all(),
            )
            .map_err(|e| BedrockError::engine_error(format!("unset_variable failed: {e}")))?;
        Ok(())
    }

    fn evaluate_condition(&mut self, expr: &str, vars: &serde_json::Value) -> BedrockResult<bool> {
        self.install_vars(vars)?;
        let result = self
            .context
            .eval(boa_engine::Source::from_bytes(expr))
            .map_err(|e| BedrockError::config_invalid(format!("condition eval failed: {e}")))?;
        Ok(result.to_boolean())
    }

    fn execute_query(&mut self, script: &str, vars: &serde_json::Value) -> BedrockResult<String> {
        self.install_vars(vars)?;
        let result = self
            .context
            .eval(boa_engine::Source::from_bytes(script))
            .map_err(|e| BedrockError::config_invalid(format!("script eval failed: {e}")))?;
        let json = self.js_to_json(&result)?;
        serde_json::to_string(&json)
            .map_err(|e| BedrockError::engine_error(format!("result serialization failed: {e}")))
    }
}

impl BoaScriptEvaluator {
    fn install_vars(&mut self, vars: &serde_json::Value) -> BedrockResult<()> {
        if let serde_json::Value::Object(map) = vars {
            for (key, value) in map {
                let js_value = self.json_to_js(value)?;
                self.context
                    .register_global_property(
                        boa_engine::js_string!(key.clone()),
                        js_value,
                        boa_engine::property::Attribute::all(),
                    )
                    .map_err(|e| {
                        BedrockError::engine_error(format!("installing variable '{key}' failed: {e}"))
                    })?;
            }
        }
        Ok(())
    }
}

/// Thread-safe wrapper enforcing single-evaluator-at-a-time use (spec §4.4).
pub struct ScriptManager {
    evaluator: Arc<Mutex<dyn ScriptEvaluator>>,
}

impl ScriptManager {
    #[must_use]
    pub fn new(evaluator: impl ScriptEvaluator + 'static) -> Self {
        Self {
            evaluator: Arc::new(Mutex::new(evaluator)),
        }
    }

    /// # Errors
    /// Propagates `ConfigInvalid` for malformed variable JSON and
    /// `EngineError` for evaluator-internal failures.
    pub fn set_variable(&self, name: &str, json_value: &str) -> BedrockResult<()> {
        self.evaluator.lock().set_variable(name, json_value)
    }

    /// # Errors
    /// Propagates `EngineError` for evaluator-internal failures.
    pub fn unset_variable(&self, name: &str) -> BedrockResult<()> {
        self.evaluator.lock().unset_variable(name)
    }

    /// # Errors
    /// Propagates `ConfigInvalid` when `expr` fails to evaluate.
    pub fn evaluate_condition(
        &self,
        expr: &str,
        vars: &serde_json::Value,
    ) -> BedrockResult<bool> {
        self.evaluator.lock().evaluate_condition(expr, vars)
    }

    /// # Errors
    /// Propagates `ConfigInvalid` when `script` fails to evaluate.
    pub fn execute_query(&self, script: &str, vars: &serde_json::Value) -> BedrockResult<String> {
        self.evaluator.lock().execute_query(script, vars)
    }
}
