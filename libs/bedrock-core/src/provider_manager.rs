//! Provider Manager: owns server-side component instances (spec §4.7).
//!
//! Grounded on `original_source/src/ProviderManager.cpp`'s mutex-protected
//! vector plus condition-variable wakeup for `lookup_provider`. The vector
//! itself is guarded briefly for bookkeeping only; dependency resolution and
//! factory invocation — both of which may re-enter this manager via
//! `ProviderLookup` — run with the lock released (spec §5 "factory hooks
//! invoked with the mutex released when they might call back into the
//! managers").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::dependency::DependencyDeclaration;
use crate::dependency_resolver::{DependencyResolver, ProviderLookup, ResolvedDependency};
use crate::error::{BedrockError, BedrockResult};
use crate::module_registry::{ModuleFactory, ModuleRegistry, RegisterArgs};
use crate::named_dependency::NamedDependency;

/// Descriptor returned by lookups and the `list_providers`/`lookup_provider`
/// RPCs (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    pub provider_id: u16,
}

/// A provider description as it appears in the `providers` array of the
/// aggregate configuration, or as supplied to `start_provider` (spec §6).
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderDescription {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    pub provider_id: Option<u16>,
    pub pool: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub dependencies: HashMap<String, Vec<String>>,
    #[serde(default = "default_config")]
    pub config: String,
}

fn default_config() -> String {
    "{}".to_owned()
}

struct ProviderInstance {
    name: String,
    type_tag: String,
    provider_id: u16,
    handle: NamedDependency,
    tags: Vec<String>,
    resolved_dependencies: HashMap<String, Vec<ResolvedDependency>>,
    config: String,
}

impl ProviderInstance {
    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            name: self.name.clone(),
            type_tag: self.type_tag.clone(),
            provider_id: self.provider_id,
        }
    }
}

#[derive(Default)]
struct State {
    instances: Vec<ProviderInstance>,
    pending_names: std::collections::HashSet<String>,
}

/// Owns the ordered vector of provider instances (spec §4.7).
pub struct ProviderManager {
    state: Mutex<State>,
    wakeup: Notify,
}

impl Default for ProviderManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            wakeup: Notify::new(),
        }
    }

    /// `addProvider` (spec §4.7). Resolves `description.dependencies`
    /// through `resolver`, invokes `registry`'s factory for
    /// `description.type_tag`, and appends the instance on success.
    ///
    /// # Errors
    /// `NameCollision` if the name is taken; `ConfigInvalid` if a required
    /// slot is missing or arity is violated; whatever `resolver`/the
    /// factory returns otherwise.
    pub async fn add_provider(
        &self,
        description: &ProviderDescription,
        registry: &ModuleRegistry,
        resolver: &DependencyResolver,
        pool: Option<NamedDependency>,
    ) -> BedrockResult<u16> {
        {
            let mut state = self.state.lock();
            if state.instances.iter().any(|i| i.name == description.name)
                || state.pending_names.contains(&description.name)
            {
                return Err(BedrockError::name_collision(format!(
                    "provider '{}' already exists",
                    description.name
                )));
            }
            state.pending_names.insert(description.name.clone());
        }

        let result = self
            .try_construct(description, registry, resolver, pool)
            .await;

        let mut state = self.state.lock();
        state.pending_names.remove(&description.name);
        match result {
            Ok((instance, provider_id)) => {
                state.instances.push(instance);
                drop(state);
                self.wakeup.notify_waiters();
                Ok(provider_id)
            }
            Err(e) => Err(e),
        }
    }

    async fn try_construct(
        &self,
        description: &ProviderDescription,
        registry: &ModuleRegistry,
        resolver: &DependencyResolver,
        pool: Option<NamedDependency>,
    ) -> BedrockResult<(ProviderInstance, u16)> {
        let provider_id = match description.provider_id {
            Some(id) => {
                let state = self.state.lock();
                if state
                    .instances
                    .iter()
                    .any(|i| i.type_tag == description.type_tag && i.provider_id == id)
                {
                    return Err(BedrockError::name_collision(format!(
                        "provider id {id} already in use for type '{}'",
                        description.type_tag
                    )));
                }
                id
            }
            None => self.allocate_provider_id(&description.type_tag),
        };

        let schema = registry.dependencies(&description.type_tag, &description.config)?;
        let resolved = self
            .resolve_dependencies(&schema, &description.dependencies, &description.type_tag, resolver)
            .await?;

        let factory = registry
            .lookup(&description.type_tag)
            .ok_or_else(|| BedrockError::module_missing(format!("module '{}' not registered", description.type_tag)))?;

        let plain_deps: HashMap<String, Vec<NamedDependency>> = resolved
            .iter()
            .map(|(slot, deps)| (slot.clone(), deps.iter().map(|d| d.handle.clone()).collect()))
            .collect();

        let handle = factory
            .register(RegisterArgs {
                name: description.name.clone(),
                provider_id,
                pool,
                config: description.config.clone(),
                tags: description.tags.clone(),
                resolved_dependencies: plain_deps,
            })
            .await?;

        Ok((
            ProviderInstance {
                name: description.name.clone(),
                type_tag: description.type_tag.clone(),
                provider_id,
                handle,
                tags: description.tags.clone(),
                resolved_dependencies: resolved,
                config: description.config.clone(),
            },
            provider_id,
        ))
    }

    async fn resolve_dependencies(
        &self,
        schema: &[DependencyDeclaration],
        declared: &HashMap<String, Vec<String>>,
        dependent_type: &str,
        resolver: &DependencyResolver,
    ) -> BedrockResult<HashMap<String, Vec<ResolvedDependency>>> {
        let mut out = HashMap::new();
        for decl in schema {
            let specs = declared.get(&decl.name).cloned().unwrap_or_default();
            if decl.is_required && specs.is_empty() {
                return Err(BedrockError::config_invalid(format!(
                    "provider type '{dependent_type}' requires dependency slot '{}'",
                    decl.name
                )));
            }
            if !decl.is_array && specs.len() > 1 {
                return Err(BedrockError::config_invalid(format!(
                    "dependency slot '{}' does not accept multiple entries",
                    decl.name
                )));
            }
            let mut bound = Vec::with_capacity(specs.len());
            for spec in &specs {
                bound.push(resolver.resolve(&decl.type_tag, spec, None).await?);
            }
            out.insert(decl.name.clone(), bound);
        }
        Ok(out)
    }

    /// Lowest unused provider id within `type_tag`'s own id space (spec
    /// §4.7 step 2, SPEC_FULL.md §F.1).
    fn allocate_provider_id(&self, type_tag: &str) -> u16 {
        let state = self.state.lock();
        let mut used: Vec<u16> = state
            .instances
            .iter()
            .filter(|i| i.type_tag == type_tag)
            .map(|i| i.provider_id)
            .collect();
        used.sort_unstable();
        let mut candidate = 0u16;
        for id in used {
            if id == candidate {
                candidate = candidate.saturating_add(1);
            } else if id > candidate {
                break;
            }
        }
        candidate
    }

    /// `deregisterProvider` (spec §4.7): locate by name, destroy the
    /// factory handle, drop from the vector. Any remote provider-handles
    /// this instance privately held are torn down via their owning
    /// factory's `destroy_provider_handle`.
    ///
    /// # Errors
    /// `DependencyUnresolved` if no such provider; `DependencyInUse` if its
    /// refcount exceeds 1 (something else still holds it).
    pub async fn deregister_provider(&self, name: &str, registry: &ModuleRegistry) -> BedrockResult<()> {
        let instance = {
            let mut state = self.state.lock();
            let index = state
                .instances
                .iter()
                .position(|i| i.name == name)
                .ok_or_else(|| BedrockError::dependency_unresolved(format!("no provider named '{name}'")))?;
            if state.instances[index].handle.refcount() > 1 {
                return Err(BedrockError::dependency_in_use(format!(
                    "provider '{name}' is still referenced"
                )));
            }
            state.instances.remove(index)
        };

        let factory = registry
            .lookup(&instance.type_tag)
            .ok_or_else(|| BedrockError::module_missing(format!("module '{}' not registered", instance.type_tag)))?;
        factory.deregister(&instance.handle).await?;

        for deps in instance.resolved_dependencies.values() {
            for dep in deps {
                if let Some(owner) = &dep.remote_owner {
                    owner.destroy_provider_handle(&dep.handle).await?;
                }
            }
        }
        Ok(())
    }

    /// Tear down every provider, in reverse-construction order, so a
    /// provider's own dependents (which were necessarily added after it)
    /// release their references before it is deregistered itself (spec
    /// §4.9 shutdown).
    ///
    /// # Errors
    /// Propagates the first factory failure encountered; remaining
    /// providers are still finalized best-effort.
    pub async fn finalize_all(&self, registry: &ModuleRegistry) -> BedrockResult<()> {
        let names: Vec<String> = {
            let state = self.state.lock();
            state.instances.iter().rev().map(|i| i.name.clone()).collect()
        };
        let mut first_err = None;
        for name in names {
            if let Err(e) = self.deregister_provider(&name, registry).await {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    #[must_use]
    pub fn get_provider(&self, name: &str) -> Option<ProviderDescriptor> {
        self.state
            .lock()
            .instances
            .iter()
            .find(|i| i.name == name)
            .map(ProviderInstance::descriptor)
    }

    #[must_use]
    pub fn num_providers(&self) -> usize {
        self.state.lock().instances.len()
    }

    #[must_use]
    pub fn list_providers(&self) -> Vec<ProviderDescriptor> {
        self.state.lock().instances.iter().map(ProviderInstance::descriptor).collect()
    }

    /// `lookup_provider(spec, timeout)` (spec §4.6 suspension point b, §6,
    /// §9 "condition-variable lookups"): block until a provider matching
    /// `spec` (bare name or `type:id`) appears, up to `timeout`.
    ///
    /// # Errors
    /// Returns `RemoteLookupFailed` if no match appears within `timeout`.
    pub async fn lookup_provider_wait(
        &self,
        spec: &crate::dependency::DependencySpec,
        timeout: Duration,
    ) -> BedrockResult<ProviderDescriptor> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(found) = self.find_matching(spec) {
                return Ok(found);
            }
            let notified = self.wakeup.notified();
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(BedrockError::remote_lookup_failed(format!(
                    "no provider matching '{}' appeared within {timeout:?}",
                    spec
                )));
            }
            let _ = tokio::time::timeout(remaining, notified).await;
        }
    }

    /// Whether any provider of `type_tag` (and, if given, exactly
    /// `provider_id`) exists right now. Backs the engine's
    /// `remote_provider_exists` query (spec §4.3, §4.6 step 4); unlike
    /// [`ProviderManager::lookup_provider_wait`] this never blocks — the
    /// caller polls within its own timeout budget.
    #[must_use]
    pub fn type_exists(&self, type_tag: &str, provider_id: Option<u16>) -> bool {
        let state = self.state.lock();
        state
            .instances
            .iter()
            .any(|i| i.type_tag == type_tag && provider_id.is_none_or(|id| i.provider_id == id))
    }

    fn find_matching(&self, spec: &crate::dependency::DependencySpec) -> Option<ProviderDescriptor> {
        let state = self.state.lock();
        if let Some(id) = spec.provider_id {
            state
                .instances
                .iter()
                .find(|i| i.type_tag == spec.ident && i.provider_id == id)
                .map(ProviderInstance::descriptor)
        } else {
            state
                .instances
                .iter()
                .find(|i| i.name == spec.ident)
                .map(ProviderInstance::descriptor)
        }
    }

    fn lookup_handle(&self, name: &str) -> BedrockResult<(NamedDependency, String)> {
        let state = self.state.lock();
        let instance = state
            .instances
            .iter()
            .find(|i| i.name == name)
            .ok_or_else(|| BedrockError::dependency_unresolved(format!("no provider named '{name}'")))?;
        Ok((instance.handle.clone(), instance.type_tag.clone()))
    }

    fn factory_for(type_tag: &str, registry: &ModuleRegistry) -> BedrockResult<Arc<dyn ModuleFactory>> {
        registry
            .lookup(type_tag)
            .ok_or_else(|| BedrockError::module_missing(format!("module '{type_tag}' not registered")))
    }

    /// `changeProviderPool` (spec §4.7).
    ///
    /// # Errors
    /// `DependencyUnresolved` if no such provider; otherwise whatever the
    /// factory's `change_pool` returns (`Unsupported` by default).
    pub async fn change_provider_pool(
        &self,
        name: &str,
        new_pool: &NamedDependency,
        registry: &ModuleRegistry,
    ) -> BedrockResult<()> {
        let (handle, type_tag) = self.lookup_handle(name)?;
        let factory = Self::factory_for(&type_tag, registry)?;
        factory.change_pool(&handle, new_pool).await
    }

    /// `migrate_provider` (spec §6).
    ///
    /// # Errors
    /// `DependencyUnresolved` if no such provider; otherwise whatever the
    /// factory's `migrate` returns (`Unsupported` by default).
    pub async fn migrate_provider(
        &self,
        name: &str,
        dest_address: &str,
        dest_provider_id: u16,
        migration_config: &str,
        remove_source: bool,
        registry: &ModuleRegistry,
    ) -> BedrockResult<()> {
        let (handle, type_tag) = self.lookup_handle(name)?;
        let factory = Self::factory_for(&type_tag, registry)?;
        factory
            .migrate(&handle, dest_address, dest_provider_id, migration_config, remove_source)
            .await
    }

    /// `snapshot_provider` (spec §6).
    ///
    /// # Errors
    /// `DependencyUnresolved` if no such provider; otherwise whatever the
    /// factory's `snapshot` returns (`Unsupported` by default).
    pub async fn snapshot_provider(
        &self,
        name: &str,
        dest_path: &str,
        snapshot_config: &str,
        remove_source: bool,
        registry: &ModuleRegistry,
    ) -> BedrockResult<()> {
        let (handle, type_tag) = self.lookup_handle(name)?;
        let factory = Self::factory_for(&type_tag, registry)?;
        factory.snapshot(&handle, dest_path, snapshot_config, remove_source).await
    }

    /// `restore_provider` (spec §6).
    ///
    /// # Errors
    /// `DependencyUnresolved` if no such provider; otherwise whatever the
    /// factory's `restore` returns (`Unsupported` by default).
    pub async fn restore_provider(
        &self,
        name: &str,
        src_path: &str,
        restore_config: &str,
        registry: &ModuleRegistry,
    ) -> BedrockResult<()> {
        let (handle, type_tag) = self.lookup_handle(name)?;
        let factory = Self::factory_for(&type_tag, registry)?;
        factory.restore(&handle, src_path, restore_config).await
    }

    /// Current JSON view for `getCurrentConfig` (spec §3, §4.9): the
    /// `providers` array of the aggregate configuration.
    #[must_use]
    pub fn current_config(&self) -> serde_json::Value {
        let state = self.state.lock();
        let providers: Vec<serde_json::Value> = state
            .instances
            .iter()
            .map(|i| {
                serde_json::json!({
                    "name": i.name,
                    "type": i.type_tag,
                    "provider_id": i.provider_id,
                    "tags": i.tags,
                    "config": serde_json::from_str::<serde_json::Value>(&i.config).unwrap_or(serde_json::Value::Null),
                })
            })
            .collect();
        serde_json::Value::Array(providers)
    }
}

impl ProviderLookup for ProviderManager {
    fn get_by_name(&self, name: &str) -> Option<NamedDependency> {
        self.state
            .lock()
            .instances
            .iter()
            .find(|i| i.name == name)
            .map(|i| i.handle.clone())
    }

    fn get_by_type_id(&self, type_tag: &str, provider_id: u16) -> Option<NamedDependency> {
        self.state
            .lock()
            .instances
            .iter()
            .find(|i| i.type_tag == type_tag && i.provider_id == provider_id)
            .map(|i| i.handle.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::DependencySpec;
    use crate::dependency_resolver::{ClientLookup, DependencyResolver};
    use crate::engine::LocalEngine;
    use crate::group::GroupManager;
    use crate::module_registry::InitClientArgs;
    use async_trait::async_trait;

    struct NoopFactory;
    #[async_trait]
    impl ModuleFactory for NoopFactory {
        async fn register(&self, args: RegisterArgs) -> BedrockResult<NamedDependency> {
            Ok(NamedDependency::new_unowned(args.name, "module_a", ()))
        }
        async fn deregister(&self, _handle: &NamedDependency) -> BedrockResult<()> {
            Ok(())
        }
        fn get_config(&self, _handle: &NamedDependency) -> BedrockResult<String> {
            Ok("{}".to_owned())
        }
        async fn init_client(&self, args: InitClientArgs) -> BedrockResult<NamedDependency> {
            Ok(NamedDependency::new_unowned(args.name, "module_a", ()))
        }
        async fn finalize_client(&self, _handle: &NamedDependency) -> BedrockResult<()> {
            Ok(())
        }
        fn get_client_config(&self, _handle: &NamedDependency) -> BedrockResult<String> {
            Ok("{}".to_owned())
        }
        async fn create_provider_handle(
            &self,
            _client: &NamedDependency,
            _address: &str,
            _provider_id: u16,
        ) -> BedrockResult<NamedDependency> {
            Ok(NamedDependency::new_unowned("remote", "module_a", ()))
        }
        async fn destroy_provider_handle(&self, _handle: &NamedDependency) -> BedrockResult<()> {
            Ok(())
        }
        fn dependencies(&self, _config: &str) -> BedrockResult<Vec<DependencyDeclaration>> {
            Ok(Vec::new())
        }
    }

    struct NoClients;
    #[async_trait]
    impl ClientLookup for NoClients {
        fn get_by_name(&self, _name: &str) -> Option<NamedDependency> {
            None
        }
        async fn get_or_create_anonymous(
            &self,
            type_tag: &str,
            _module_registry: &ModuleRegistry,
        ) -> BedrockResult<NamedDependency> {
            Ok(NamedDependency::new_unowned("anon", type_tag, ()))
        }
    }

    fn setup() -> (Arc<ProviderManager>, ModuleRegistry, Arc<LocalEngine>) {
        let registry = ModuleRegistry::new();
        registry.register_in_process("module_a", Arc::new(NoopFactory)).unwrap();
        let manager = Arc::new(ProviderManager::new());
        let engine = Arc::new(LocalEngine::initialize("http://local", "{}").unwrap());
        (manager, registry, engine)
    }

    fn resolver_for(manager: Arc<ProviderManager>, engine: Arc<LocalEngine>) -> DependencyResolver {
        DependencyResolver::new(
            engine,
            Arc::new(GroupManager::new()),
            manager,
            Arc::new(NoClients),
            Arc::new(ModuleRegistry::new()),
            0,
            Duration::from_secs(1),
        )
    }

    fn base_description(name: &str) -> ProviderDescription {
        ProviderDescription {
            name: name.to_owned(),
            type_tag: "module_a".to_owned(),
            provider_id: None,
            pool: None,
            tags: Vec::new(),
            dependencies: HashMap::new(),
            config: "{}".to_owned(),
        }
    }

    #[tokio::test]
    async fn add_provider_allocates_sequential_ids() {
        let (manager, registry, engine) = setup();
        let resolver = resolver_for(manager.clone(), engine);
        let id1 = manager
            .add_provider(&base_description("p1"), &registry, &resolver, None)
            .await
            .unwrap();
        let id2 = manager
            .add_provider(&base_description("p2"), &registry, &resolver, None)
            .await
            .unwrap();
        assert_eq!(id1, 0);
        assert_eq!(id2, 1);
        assert_eq!(manager.num_providers(), 2);
    }

    #[tokio::test]
    async fn add_provider_rejects_duplicate_name() {
        let (manager, registry, engine) = setup();
        let resolver = resolver_for(manager.clone(), engine);
        let d = base_description("p1");
        manager.add_provider(&d, &registry, &resolver, None).await.unwrap();
        let err = manager.add_provider(&d, &registry, &resolver, None).await.unwrap_err();
        assert_eq!(err.kind(), "NameCollision");
    }

    #[tokio::test]
    async fn deregister_requires_single_reference() {
        let (manager, registry, engine) = setup();
        let resolver = resolver_for(manager.clone(), engine);
        let d = base_description("p1");
        manager.add_provider(&d, &registry, &resolver, None).await.unwrap();
        let held = manager.get_by_name("p1").unwrap();
        let err = manager.deregister_provider("p1", &registry).await.unwrap_err();
        assert_eq!(err.kind(), "DependencyInUse");
        drop(held);
        manager.deregister_provider("p1", &registry).await.unwrap();
        assert_eq!(manager.num_providers(), 0);
    }

    #[tokio::test]
    async fn lookup_provider_wait_finds_added_provider() {
        let (manager, registry, engine) = setup();
        let resolver = resolver_for(manager.clone(), engine);
        let d = base_description("p1");
        manager.add_provider(&d, &registry, &resolver, None).await.unwrap();
        let spec = DependencySpec::parse("p1").unwrap();
        let found = manager
            .lookup_provider_wait(&spec, Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(found.name, "p1");
    }

    #[tokio::test]
    async fn finalize_all_drains_in_reverse_order() {
        let (manager, registry, engine) = setup();
        let resolver = resolver_for(manager.clone(), engine);
        manager.add_provider(&base_description("p1"), &registry, &resolver, None).await.unwrap();
        manager.add_provider(&base_description("p2"), &registry, &resolver, None).await.unwrap();
        manager.finalize_all(&registry).await.unwrap();
        assert_eq!(manager.num_providers(), 0);
    }

    #[tokio::test]
    async fn lookup_provider_wait_times_out_when_absent() {
        let (manager, _registry, _engine) = setup();
        let spec = DependencySpec::parse("nope").unwrap();
        let err = manager
            .lookup_provider_wait(&spec, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "RemoteLookupFailed");
    }
}
