//! Engine Manager: adapter over the external RPC engine (spec §4.3).
//!
//! The engine itself — addresses, endpoints, handler pools — is out of
//! scope (spec §1). This module defines the trait boundary the rest of
//! the composition engine programs against, plus a concrete default
//! (`local::LocalEngine`) backed by `axum`/`reqwest` so the crate is
//! runnable without a real Mercury/Margo-style RPC substrate.

mod local;

pub use local::LocalEngine;

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{BedrockError, BedrockResult};
use crate::named_dependency::NamedDependency;

/// A named, refcounted engine-owned resource table (pools or execution
/// streams both have this exact shape per spec §4.3).
#[derive(Default)]
pub struct ResourceTable {
    entries: Mutex<BTreeMap<String, NamedDependency>>,
}

impl ResourceTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// Returns `NameCollision` if `name` is already present.
    pub fn add(&self, name: &str, kind: &str) -> BedrockResult<NamedDependency> {
        let mut entries = self.entries.lock();
        if entries.contains_key(name) {
            return Err(BedrockError::name_collision(format!(
                "{kind} '{name}' already exists"
            )));
        }
        let dep = NamedDependency::new_unowned(name, kind, ());
        entries.insert(name.to_owned(), dep.clone());
        Ok(dep)
    }

    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<NamedDependency> {
        self.entries.lock().get(name).cloned()
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<NamedDependency> {
        self.entries.lock().values().nth(index).cloned()
    }

    #[must_use]
    pub fn get_by_handle(&self, handle: &NamedDependency) -> Option<NamedDependency> {
        self.entries
            .lock()
            .values()
            .find(|d| d.same_handle(handle))
            .cloned()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    /// Removal is rejected when the wrapper's refcount exceeds 1 — i.e.
    /// something other than this table's own clone still holds it (spec
    /// §4.3 invariants, §5 shared-resource policy, §8 scenario 6).
    ///
    /// # Errors
    /// Returns `DependencyUnresolved` if `name` is absent, or
    /// `DependencyInUse` if the refcount is greater than 1.
    pub fn remove_by_name(&self, name: &str) -> BedrockResult<()> {
        let mut entries = self.entries.lock();
        let Some(dep) = entries.get(name) else {
            return Err(BedrockError::dependency_unresolved(format!(
                "no such resource '{name}'"
            )));
        };
        if dep.refcount() > 1 {
            return Err(BedrockError::dependency_in_use(format!(
                "resource '{name}' is still referenced"
            )));
        }
        entries.remove(name);
        Ok(())
    }

    /// # Errors
    /// See [`ResourceTable::remove_by_name`].
    pub fn remove_by_index(&self, index: usize) -> BedrockResult<()> {
        let name = {
            let entries = self.entries.lock();
            entries
                .keys()
                .nth(index)
                .cloned()
                .ok_or_else(|| BedrockError::dependency_unresolved(format!("no resource at index {index}")))?
        };
        self.remove_by_name(&name)
    }

    /// # Errors
    /// See [`ResourceTable::remove_by_name`].
    pub fn remove_by_handle(&self, handle: &NamedDependency) -> BedrockResult<()> {
        let name = self
            .get_by_handle(handle)
            .ok_or_else(|| BedrockError::dependency_unresolved("no resource matches handle"))?
            .name()
            .to_owned();
        self.remove_by_name(&name)
    }
}

/// The Engine Manager contract (spec §4.3).
#[async_trait]
pub trait EngineManager: Send + Sync {
    /// The address this engine instance is reachable at.
    fn self_address(&self) -> &str;

    fn pools(&self) -> &ResourceTable;
    fn xstreams(&self) -> &ResourceTable;

    /// Add a pool/xstream described by a JSON fragment; returns the table
    /// to add to, selected by the caller (pools vs. xstreams share the
    /// exact same table shape, so this is plumbing rather than a new op).
    fn add_pool_from_config(&self, config: &serde_json::Value) -> BedrockResult<NamedDependency> {
        let name = config
            .get("name")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| BedrockError::config_invalid("pool config missing 'name'"))?;
        self.pools().add(name, "pool")
    }

    fn add_xstream_from_config(
        &self,
        config: &serde_json::Value,
    ) -> BedrockResult<NamedDependency> {
        let name = config
            .get("name")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| BedrockError::config_invalid("xstream config missing 'name'"))?;
        self.xstreams().add(name, "xstream")
    }

    /// Resolve a raw engine address (anything not `local` and not a bare
    /// rank) into a reachable address string. The default/local engine
    /// treats every address as already-canonical; a real Mercury/Margo
    /// engine would normalize protocol/host/port here.
    fn resolve_raw_address(&self, raw: &str) -> BedrockResult<String> {
        Ok(raw.to_owned())
    }

    /// Contact the bedrock provider at `address` and ask whether a
    /// provider matching `type_tag`[`:provider_id`] exists, waiting up to
    /// `timeout` for it to appear (spec §4.6, §5). This is the remote half
    /// of dependency resolution; concrete engines implement it via
    /// whatever transport they wrap (the default does it over HTTP).
    async fn remote_provider_exists(
        &self,
        address: &str,
        type_tag: &str,
        provider_id: Option<u16>,
        timeout: std::time::Duration,
    ) -> BedrockResult<bool>;

    /// Resolve a bare-name remote dependency (spec §4.6 step 4, name form:
    /// `ident@locator` with no `:id`) by asking the peer at `address` for
    /// its live `provider_id`, waiting up to `timeout` for it to appear.
    ///
    /// Grounded on `DependencyFinder.cpp`'s name-keyed `makeProviderHandle`
    /// overload: it calls `lookupRemoteProvider(..., name, &descriptor)` and
    /// builds the handle from `descriptor.provider_id` — the id the remote
    /// side actually resolved, never a locally guessed one.
    async fn remote_lookup_provider(
        &self,
        address: &str,
        type_tag: &str,
        name: &str,
        timeout: std::time::Duration,
    ) -> BedrockResult<u16>;

    /// Live JSON view of this engine's pools/xstreams (spec §4.3
    /// `getCurrentConfig`).
    fn current_config(&self) -> serde_json::Value {
        serde_json::json!({
            "pools": self.pools().names(),
            "xstreams": self.xstreams().names(),
        })
    }
}
