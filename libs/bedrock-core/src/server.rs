//! Server orchestrator: bootstrap, shutdown, and live-config composition
//! (spec §4.9).
//!
//! Grounded on `original_source/src/ServerImpl.hpp`'s constructor sequence
//! (parse config, then bring up each manager in dependency order, then
//! instantiate providers and clients from the array in document order) and
//! its destructor order (providers torn down before clients so the former's
//! dependents release their handles first).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::client_manager::{AnonymousClientLookup, ClientDescription, ClientManager};
use crate::config::{self, pipeline::SourceTag, AggregateConfig, BedrockConfig};
use crate::dependency_resolver::{ClientLookup, DependencyResolver};
use crate::engine::{EngineManager, LocalEngine};
use crate::error::{BedrockError, BedrockResult};
use crate::group::{Group, GroupManager};
use crate::module_registry::{ModuleFactory, ModuleRegistry};
use crate::provider_manager::{ProviderDescription, ProviderManager};
use crate::script::{BoaScriptEvaluator, ScriptManager};

/// The fully bootstrapped composition engine for one process (spec §4.9).
///
/// Holds every manager named in §4, wired together through a single
/// [`DependencyResolver`]. Constructed only via [`Server::bootstrap`], which
/// enforces the documented start order and rolls back on failure.
pub struct Server {
    engine: Arc<dyn EngineManager>,
    scripts: ScriptManager,
    groups: Arc<GroupManager>,
    module_registry: Arc<ModuleRegistry>,
    providers: Arc<ProviderManager>,
    clients: Arc<ClientManager>,
    resolver: DependencyResolver,
    bedrock: BedrockConfig,
    loaded_libraries: Mutex<HashMap<String, Option<String>>>,
    shutdown: Notify,
}

impl Server {
    /// Bring up a process per spec §4.9's bootstrap order: parse/validate
    /// config, start the Engine/Script/Group Managers, register
    /// `preloaded_modules` and load the libraries named in `libraries`,
    /// construct the Provider Manager and the Dependency Resolver, then
    /// instantiate providers and clients in the order they appear in the
    /// configuration's arrays.
    ///
    /// `preloaded_modules` seeds the module registry before `libraries` is
    /// processed, so a `libraries` entry with a `null` path (spec §4.9: "the
    /// module was already registered in-process") can actually resolve —
    /// the caller passes the factory it already built at its own startup,
    /// keyed by the module name it will appear under in `libraries`.
    ///
    /// On any failure after the managers exist, already-constructed
    /// providers and clients are finalized (in the usual shutdown order)
    /// before the error is returned, per spec §4.9/§7.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` for a malformed document, `ModuleMissing` for
    /// an unloadable library, or whatever a provider/client's dependency
    /// resolution or factory construction returns.
    pub async fn bootstrap(
        config_source: &str,
        tag: SourceTag,
        self_address: &str,
        context_params: &serde_json::Value,
        rank: u32,
        process_count: u32,
        preloaded_modules: &[(&str, Arc<dyn ModuleFactory>)],
    ) -> BedrockResult<Self> {
        let scripts = ScriptManager::new(BoaScriptEvaluator::new());
        let aggregate = config::load(config_source, tag, &scripts, context_params, rank, process_count)?;

        let engine: Arc<dyn EngineManager> =
            Arc::new(LocalEngine::initialize(self_address, &aggregate.margo.to_string())?);

        let groups = Arc::new(GroupManager::new());
        bootstrap_groups(&groups, &aggregate, self_address, rank)?;

        let module_registry = Arc::new(ModuleRegistry::new());
        for (name, factory) in preloaded_modules {
            module_registry.register_in_process(*name, factory.clone())?;
        }
        load_libraries(&module_registry, &aggregate.libraries)?;

        let providers = Arc::new(ProviderManager::new());
        let clients = Arc::new(ClientManager::new());
        let client_lookup: Arc<dyn ClientLookup> =
            Arc::new(AnonymousClientLookup::new(clients.clone(), module_registry.clone()));

        let resolver = DependencyResolver::new(
            engine.clone(),
            groups.clone(),
            providers.clone(),
            client_lookup,
            module_registry.clone(),
            aggregate.bedrock.provider_id,
            Duration::from_secs(aggregate.bedrock.dependency_resolution_timeout),
        );

        let server = Self {
            engine,
            scripts,
            groups,
            module_registry,
            providers,
            clients,
            resolver,
            bedrock: aggregate.bedrock.clone(),
            loaded_libraries: Mutex::new(aggregate.libraries.clone()),
            shutdown: Notify::new(),
        };

        if let Err(e) = server.instantiate(&aggregate).await {
            // Roll back whatever was already constructed, per §4.9 "on any
            // exception, call finalize and rethrow".
            let _ = server.finalize().await;
            return Err(e);
        }

        Ok(server)
    }

    async fn instantiate(&self, aggregate: &AggregateConfig) -> BedrockResult<()> {
        for provider in &aggregate.providers {
            let description = provider_description(provider);
            let pool = resolve_provider_pool(&self.engine, provider.pool.as_deref())?;
            self.providers
                .add_provider(&description, &self.module_registry, &self.resolver, pool)
                .await?;
        }

        for client in &aggregate.clients {
            let description = client_description(client);
            self.clients.add_client(&description, &self.module_registry, &self.resolver).await?;
        }

        Ok(())
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<dyn EngineManager> {
        &self.engine
    }

    #[must_use]
    pub fn scripts(&self) -> &ScriptManager {
        &self.scripts
    }

    #[must_use]
    pub fn groups(&self) -> &Arc<GroupManager> {
        &self.groups
    }

    #[must_use]
    pub fn module_registry(&self) -> &Arc<ModuleRegistry> {
        &self.module_registry
    }

    #[must_use]
    pub fn providers(&self) -> &Arc<ProviderManager> {
        &self.providers
    }

    #[must_use]
    pub fn clients(&self) -> &Arc<ClientManager> {
        &self.clients
    }

    #[must_use]
    pub fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    /// `load_module(name, path)` (spec §6): open `path` and register its
    /// factory, recording it so `getCurrentConfig`'s `libraries` section
    /// reflects modules loaded after bootstrap.
    ///
    /// # Errors
    /// See [`ModuleRegistry::load_library`].
    pub fn load_module(&self, name: &str, path: &str) -> BedrockResult<()> {
        self.module_registry.load_library(name, path)?;
        self.loaded_libraries.lock().insert(name.to_owned(), Some(path.to_owned()));
        Ok(())
    }

    /// `getCurrentConfig` (spec §4.9): compose each manager's live JSON view
    /// under the top-level keys listed in spec §6.
    #[must_use]
    pub fn current_config(&self) -> serde_json::Value {
        serde_json::json!({
            "margo": self.engine.current_config(),
            "libraries": self.loaded_libraries.lock().clone(),
            "providers": self.providers.current_config(),
            "clients": self.clients.current_config(),
            "ssg": self.groups.current_config(),
            "bedrock": {
                "provider_id": self.bedrock.provider_id,
                "pool": self.bedrock.pool,
                "dependency_resolution_timeout": self.bedrock.dependency_resolution_timeout,
            },
        })
    }

    /// `query_config(script)` (spec §6): evaluate `script` against the
    /// current configuration document and return its result.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` if `script` fails to evaluate.
    pub fn query_config(&self, script: &str) -> BedrockResult<String> {
        self.scripts.execute_query(script, &self.current_config())
    }

    /// `start_provider` (spec §6): add a provider described by `description`,
    /// returning its allocated `provider_id`.
    ///
    /// # Errors
    /// See [`ProviderManager::add_provider`].
    pub async fn start_provider(&self, description: &ProviderDescription) -> BedrockResult<u16> {
        let pool = resolve_provider_pool(&self.engine, description.pool.as_deref())?;
        self.providers.add_provider(description, &self.module_registry, &self.resolver, pool).await
    }

    /// `add_client` (spec §6).
    ///
    /// # Errors
    /// See [`ClientManager::add_client`].
    pub async fn add_client(&self, description: &ClientDescription) -> BedrockResult<()> {
        self.clients.add_client(description, &self.module_registry, &self.resolver).await
    }

    /// `add_pool` (spec §6).
    ///
    /// # Errors
    /// `ConfigInvalid` if `config` has no `name`, or `NameCollision` if a
    /// pool by that name already exists.
    pub fn add_pool(&self, config: &serde_json::Value) -> BedrockResult<crate::named_dependency::NamedDependency> {
        self.engine.add_pool_from_config(config)
    }

    /// `remove_pool` (spec §6).
    ///
    /// # Errors
    /// `DependencyUnresolved` if absent, `DependencyInUse` if still held.
    pub fn remove_pool(&self, name: &str) -> BedrockResult<()> {
        self.engine.pools().remove_by_name(name)
    }

    /// `add_xstream` (spec §6).
    ///
    /// # Errors
    /// See [`Server::add_pool`].
    pub fn add_xstream(&self, config: &serde_json::Value) -> BedrockResult<crate::named_dependency::NamedDependency> {
        self.engine.add_xstream_from_config(config)
    }

    /// `remove_xstream` (spec §6).
    ///
    /// # Errors
    /// See [`Server::remove_pool`].
    pub fn remove_xstream(&self, name: &str) -> BedrockResult<()> {
        self.engine.xstreams().remove_by_name(name)
    }

    /// `add_ssg_group` (spec §6): bootstrap a new group at runtime, the same
    /// way the `ssg` section of the aggregate configuration does at startup.
    ///
    /// # Errors
    /// `ConfigInvalid` for a malformed bootstrap method, `NameCollision` if
    /// the group name is taken, `EngineError` if the group file cannot be
    /// read or written.
    pub fn add_ssg_group(&self, config: &crate::config::SsgGroupConfig) -> BedrockResult<()> {
        let group_file = config
            .group_file
            .clone()
            .unwrap_or_else(|| format!("{}.bedrock-group.json", config.name));
        let group = Group::bootstrap(
            &config.name,
            std::path::Path::new(&group_file),
            self.engine.self_address(),
            &config.bootstrap,
            0,
        )?;
        self.groups.add(group)?;
        Ok(())
    }

    /// `change_provider_pool` (spec §6).
    ///
    /// # Errors
    /// `DependencyUnresolved` if either the provider or `new_pool_name` is
    /// absent; otherwise whatever the factory's `change_pool` returns.
    pub async fn change_provider_pool(&self, name: &str, new_pool_name: &str) -> BedrockResult<()> {
        let new_pool = self
            .engine
            .pools()
            .get_by_name(new_pool_name)
            .ok_or_else(|| BedrockError::dependency_unresolved(format!("no pool named '{new_pool_name}'")))?;
        self.providers.change_provider_pool(name, &new_pool, &self.module_registry).await
    }

    /// `migrate_provider` (spec §6).
    ///
    /// # Errors
    /// See [`ProviderManager::migrate_provider`].
    #[allow(clippy::too_many_arguments)]
    pub async fn migrate_provider(
        &self,
        name: &str,
        dest_address: &str,
        dest_provider_id: u16,
        migration_config: &str,
        remove_source: bool,
    ) -> BedrockResult<()> {
        self.providers
            .migrate_provider(name, dest_address, dest_provider_id, migration_config, remove_source, &self.module_registry)
            .await
    }

    /// `snapshot_provider` (spec §6).
    ///
    /// # Errors
    /// See [`ProviderManager::snapshot_provider`].
    pub async fn snapshot_provider(
        &self,
        name: &str,
        dest_path: &str,
        snapshot_config: &str,
        remove_source: bool,
    ) -> BedrockResult<()> {
        self.providers
            .snapshot_provider(name, dest_path, snapshot_config, remove_source, &self.module_registry)
            .await
    }

    /// `restore_provider` (spec §6).
    ///
    /// # Errors
    /// See [`ProviderManager::restore_provider`].
    pub async fn restore_provider(&self, name: &str, src_path: &str, restore_config: &str) -> BedrockResult<()> {
        self.providers.restore_provider(name, src_path, restore_config, &self.module_registry).await
    }

    /// `lookup_provider(spec, timeout)` (spec §6).
    ///
    /// # Errors
    /// `ConfigInvalid` for a malformed specification, `RemoteLookupFailed`
    /// if no match appears within `timeout`.
    pub async fn lookup_provider(
        &self,
        spec_raw: &str,
        timeout: Duration,
    ) -> BedrockResult<crate::provider_manager::ProviderDescriptor> {
        let spec = crate::dependency::DependencySpec::parse(spec_raw)
            .map_err(|e| BedrockError::config_invalid(e.to_string()))?;
        self.providers.lookup_provider_wait(&spec, timeout).await
    }

    /// `list_providers()` (spec §6).
    #[must_use]
    pub fn list_providers(&self) -> Vec<crate::provider_manager::ProviderDescriptor> {
        self.providers.list_providers()
    }

    /// `lookup_client(name, timeout)` (spec §6): poll the Client Manager
    /// until `name` appears or `timeout` elapses. Unlike provider lookup,
    /// the Client Manager has no remote callers waking it on change (§4.8
    /// clients are never the target of a remote resolver lookup), so this
    /// is a plain poll rather than a condition-variable wait.
    ///
    /// # Errors
    /// `RemoteLookupFailed` if no matching client appears within `timeout`.
    pub async fn lookup_client(&self, name: &str, timeout: Duration) -> BedrockResult<crate::client_manager::ClientDescriptor> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(found) = self.clients.get_client(name) {
                return Ok(found);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(BedrockError::remote_lookup_failed(format!(
                    "no client named '{name}' appeared within {timeout:?}"
                )));
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Backs the HTTP `remote_provider_exists` endpoint a peer engine calls
    /// during dependency resolution (spec §4.3, §4.6 step 4): poll for a
    /// provider of `type_tag`/`provider_id` until it appears or `timeout`
    /// elapses, returning `false` rather than an error on timeout since this
    /// is a boolean existence check, not a lookup that must succeed.
    pub async fn provider_exists(&self, type_tag: &str, provider_id: Option<u16>, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.providers.type_exists(type_tag, provider_id) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// `list_clients()` (spec §6).
    #[must_use]
    pub fn list_clients(&self) -> Vec<crate::client_manager::ClientDescriptor> {
        self.clients.list_clients()
    }

    /// `shutdown()` (spec §4.9 `waitForFinalize`/"remote-shutdown RPC"):
    /// wake whoever is blocked in [`Server::wait_for_shutdown`] so the
    /// hosting process can finalize and exit. Does not itself call
    /// [`Server::finalize`] — the caller still owns that sequencing.
    pub fn request_shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    /// Block until [`Server::request_shutdown`] is called, either locally
    /// (e.g. a signal handler) or by the `shutdown` RPC.
    pub async fn wait_for_shutdown(&self) {
        self.shutdown.notified().await;
    }

    /// Shutdown (spec §4.9): finalize the Provider Manager first, forcing
    /// dependents to drop their handles, then finalize the Client Manager.
    ///
    /// # Errors
    /// Propagates the first failure encountered; both managers are still
    /// drained best-effort.
    pub async fn finalize(&self) -> BedrockResult<()> {
        let provider_result = self.providers.finalize_all(&self.module_registry).await;
        let client_result = self.clients.finalize_all(&self.module_registry).await;
        provider_result.and(client_result)
    }
}

fn bootstrap_groups(
    groups: &GroupManager,
    aggregate: &AggregateConfig,
    self_address: &str,
    rank: u32,
) -> BedrockResult<()> {
    for ssg in &aggregate.ssg {
        let group_file = ssg
            .group_file
            .clone()
            .unwrap_or_else(|| format!("{}.bedrock-group.json", ssg.name));
        let group = Group::bootstrap(&ssg.name, std::path::Path::new(&group_file), self_address, &ssg.bootstrap, rank)?;
        groups.add(group)?;
    }
    Ok(())
}

/// Open every library named in `libraries` (spec §4.9 "load modules listed
/// under `libraries`"). A `null` path means the module's factory is already
/// registered in-process (e.g. by the binary's own startup code via
/// [`ModuleRegistry::register_in_process`]); this function only verifies
/// that such a module is in fact already present.
///
/// # Errors
/// Returns `ModuleMissing` if a library fails to load, or if a `null`-path
/// entry names a module that was never registered in-process.
fn load_libraries(registry: &ModuleRegistry, libraries: &HashMap<String, Option<String>>) -> BedrockResult<()> {
    for (name, path) in libraries {
        match path {
            Some(path) => registry.load_library(name, path)?,
            None => {
                if registry.lookup(name).is_none() {
                    return Err(BedrockError::module_missing(format!(
                        "module '{name}' has no library path and was not registered in-process"
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Resolve a provider's optional `pool` field against the engine's pool
/// table. There is no `pools` key in the aggregate configuration (spec §6);
/// pools are created at runtime via `add_pool`, so a provider naming one
/// during bootstrap requires it to already exist.
///
/// # Errors
/// Returns `DependencyUnresolved` if `pool_name` is given but no such pool
/// has been added yet.
fn resolve_provider_pool(
    engine: &Arc<dyn EngineManager>,
    pool_name: Option<&str>,
) -> BedrockResult<Option<crate::named_dependency::NamedDependency>> {
    match pool_name {
        None => Ok(None),
        Some(name) => engine
            .pools()
            .get_by_name(name)
            .map(Some)
            .ok_or_else(|| BedrockError::dependency_unresolved(format!("no pool named '{name}'"))),
    }
}

fn provider_description(component: &config::ComponentConfig) -> ProviderDescription {
    ProviderDescription {
        name: component.name.clone(),
        type_tag: component.type_tag.clone(),
        provider_id: component.provider_id,
        pool: component.pool.clone(),
        tags: component.tags.clone(),
        dependencies: component.dependencies.clone(),
        config: component.config.to_string(),
    }
}

fn client_description(component: &config::ComponentConfig) -> ClientDescription {
    ClientDescription {
        name: component.name.clone(),
        type_tag: component.type_tag.clone(),
        tags: component.tags.clone(),
        dependencies: component.dependencies.clone(),
        config: component.config.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module_registry::{InitClientArgs, RegisterArgs};
    use crate::named_dependency::NamedDependency;
    use async_trait::async_trait;
    use serde_json::json;

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
        fn dependencies(&self, _config: &str) -> BedrockResult<Vec<crate::dependency::DependencyDeclaration>> {
            Ok(Vec::new())
        }
    }

    // Records the order `register`/`init_client` are actually called in.
    struct OrderRecordingFactory {
        calls: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl ModuleFactory for OrderRecordingFactory {
        async fn register(&self, args: RegisterArgs) -> BedrockResult<NamedDependency> {
            self.calls.lock().push("register");
            Ok(NamedDependency::new_unowned(args.name, "module_a", ()))
        }
        async fn deregister(&self, _handle: &NamedDependency) -> BedrockResult<()> {
            Ok(())
        }
        fn get_config(&self, _handle: &NamedDependency) -> BedrockResult<String> {
            Ok("{}".to_owned())
        }
        async fn init_client(&self, args: InitClientArgs) -> BedrockResult<NamedDependency> {
            self.calls.lock().push("init_client");
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
        fn dependencies(&self, _config: &str) -> BedrockResult<Vec<crate::dependency::DependencyDeclaration>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn bootstrap_with_no_providers_succeeds() {
        let server = Server::bootstrap("{}", SourceTag::Json, "http://local", &json!({}), 0, 1, &[])
            .await
            .unwrap();
        assert_eq!(server.providers.num_providers(), 0);
        assert_eq!(server.clients.list_clients().len(), 0);
        server.finalize().await.unwrap();
    }

    #[tokio::test]
    async fn bootstrap_rejects_library_missing_path_and_registration() {
        let source = r#"{"libraries": {"mod_a": null}}"#;
        let err = Server::bootstrap(source, SourceTag::Json, "http://local", &json!({}), 0, 1, &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ModuleMissing");
    }

    #[tokio::test]
    async fn bootstrap_resolves_preregistered_library_with_null_path() {
        let source = r#"{"libraries": {"mod_a": null}}"#;
        let factory: Arc<dyn ModuleFactory> = Arc::new(NoopFactory);
        let server = Server::bootstrap(
            source,
            SourceTag::Json,
            "http://local",
            &json!({}),
            0,
            1,
            &[("mod_a", factory)],
        )
        .await
        .unwrap();
        assert_eq!(server.current_config()["libraries"]["mod_a"], serde_json::Value::Null);
        server.finalize().await.unwrap();
    }

    #[tokio::test]
    async fn bootstrap_instantiates_providers_before_clients() {
        let source = r#"{
            "providers": [{"name": "p1", "type": "module_a"}],
            "clients": [{"name": "c1", "type": "module_a"}]
        }"#;
        let factory = Arc::new(OrderRecordingFactory { calls: Mutex::new(Vec::new()) });
        let server = Server::bootstrap(
            source,
            SourceTag::Json,
            "http://local",
            &json!({}),
            0,
            1,
            &[("module_a", factory.clone() as Arc<dyn ModuleFactory>)],
        )
        .await
        .unwrap();
        assert_eq!(*factory.calls.lock(), vec!["register", "init_client"]);
        server.finalize().await.unwrap();
    }

    #[tokio::test]
    async fn query_config_reflects_bedrock_section() {
        let server = Server::bootstrap("{}", SourceTag::Json, "http://local", &json!({}), 0, 1, &[])
            .await
            .unwrap();
        let out = server.query_config("bedrock.provider_id").unwrap();
        assert_eq!(out, "0");
        server.finalize().await.unwrap();
    }

    #[tokio::test]
    async fn load_module_records_path_in_current_config() {
        let server = Server::bootstrap("{}", SourceTag::Json, "http://local", &json!({}), 0, 1, &[])
            .await
            .unwrap();
        server.module_registry.register_in_process("preloaded", Arc::new(NoopFactory)).unwrap();
        // Simulate a subsequent load via an in-process registration rather
        // than a real path, since this test has no real cdylib to load.
        server.loaded_libraries.lock().insert("preloaded".to_owned(), None);
        let config = server.current_config();
        assert_eq!(config["libraries"]["preloaded"], serde_json::Value::Null);
        server.finalize().await.unwrap();
    }
}
