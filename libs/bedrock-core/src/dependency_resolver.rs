//! Dependency Resolver: binds a declared slot's specification string to a
//! concrete, live `NamedDependency`, local or remote (spec §4.6).
//!
//! Grounded on `original_source/src/DependencyFinder.cpp`'s five-step
//! procedure (reserved-tag short-circuit, grammar parse, local-by-name,
//! local-by-`type:id`, remote-via-locator). To avoid a reference cycle with
//! the Provider/Client Managers (they call into the resolver; the resolver
//! calls back into them for local-by-name lookups), this module defines
//! narrow `ProviderLookup`/`ClientLookup` traits those managers implement,
//! rather than holding concrete manager types.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::dependency::{DependencySpec, Locator, ReservedTag};
use crate::engine::EngineManager;
use crate::error::{BedrockError, BedrockResult};
use crate::group::GroupManager;
use crate::module_registry::{ModuleFactory, ModuleRegistry};
use crate::named_dependency::NamedDependency;

/// A dependency bound by the resolver. `remote_owner` is set only for
/// ephemeral remote provider-handles (spec §4.6 step 4); the manager that
/// stores this in a dependent's resolved-dependency list is responsible for
/// calling `remote_owner.destroy_provider_handle(&handle)` when the
/// dependent itself is torn down. Local handles (`remote_owner: None`) are
/// clones of another instance's own canonical handle and need no action
/// beyond being dropped.
#[derive(Clone)]
pub struct ResolvedDependency {
    pub handle: NamedDependency,
    pub remote_owner: Option<Arc<dyn ModuleFactory>>,
}

pub trait ProviderLookup: Send + Sync {
    fn get_by_name(&self, name: &str) -> Option<NamedDependency>;
    fn get_by_type_id(&self, type_tag: &str, provider_id: u16) -> Option<NamedDependency>;
}

impl<T: ProviderLookup + ?Sized> ProviderLookup for Arc<T> {
    fn get_by_name(&self, name: &str) -> Option<NamedDependency> {
        (**self).get_by_name(name)
    }
    fn get_by_type_id(&self, type_tag: &str, provider_id: u16) -> Option<NamedDependency> {
        (**self).get_by_type_id(type_tag, provider_id)
    }
}

#[async_trait]
pub trait ClientLookup: Send + Sync {
    fn get_by_name(&self, name: &str) -> Option<NamedDependency>;

    /// `getOrCreateAnonymous(type)` (spec §4.8): returns the canonical
    /// `__<type>_client__`, creating it (with no resolved dependencies) if
    /// absent.
    async fn get_or_create_anonymous(
        &self,
        type_tag: &str,
        module_registry: &ModuleRegistry,
    ) -> BedrockResult<NamedDependency>;
}

#[async_trait]
impl<T: ClientLookup + ?Sized> ClientLookup for Arc<T> {
    fn get_by_name(&self, name: &str) -> Option<NamedDependency> {
        (**self).get_by_name(name)
    }
    async fn get_or_create_anonymous(
        &self,
        type_tag: &str,
        module_registry: &ModuleRegistry,
    ) -> BedrockResult<NamedDependency> {
        (**self).get_or_create_anonymous(type_tag, module_registry).await
    }
}

pub struct DependencyResolver {
    engine: Arc<dyn EngineManager>,
    groups: Arc<GroupManager>,
    providers: Arc<dyn ProviderLookup>,
    clients: Arc<dyn ClientLookup>,
    module_registry: Arc<ModuleRegistry>,
    bedrock_provider_id: u16,
    default_timeout: Duration,
}

impl DependencyResolver {
    #[must_use]
    pub fn new(
        engine: Arc<dyn EngineManager>,
        groups: Arc<GroupManager>,
        providers: Arc<dyn ProviderLookup>,
        clients: Arc<dyn ClientLookup>,
        module_registry: Arc<ModuleRegistry>,
        bedrock_provider_id: u16,
        default_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            groups,
            providers,
            clients,
            module_registry,
            bedrock_provider_id,
            default_timeout,
        }
    }

    /// Resolve `spec_raw` declared for a slot typed `type_tag`. `timeout`
    /// overrides the default remote-lookup timeout (spec §6
    /// `dependency_resolution_timeout`, §5).
    ///
    /// # Errors
    /// Returns `ConfigInvalid` for a malformed specification,
    /// `DependencyUnresolved` when no local object matches, or
    /// `RemoteLookupFailed` when a remote locator's target does not appear
    /// within the timeout.
    pub async fn resolve(
        &self,
        type_tag: &str,
        spec_raw: &str,
        timeout: Option<Duration>,
    ) -> BedrockResult<ResolvedDependency> {
        if let Some(reserved) = ReservedTag::parse(type_tag) {
            return self.resolve_reserved(reserved, spec_raw);
        }

        let spec = DependencySpec::parse(spec_raw).map_err(|e| BedrockError::config_invalid(e.to_string()))?;

        match &spec.locator {
            None => self.resolve_local(type_tag, &spec),
            Some(locator) => {
                self.resolve_remote(type_tag, &spec, locator, timeout.unwrap_or(self.default_timeout))
                    .await
            }
        }
    }

    fn resolve_reserved(&self, tag: ReservedTag, spec_raw: &str) -> BedrockResult<ResolvedDependency> {
        let handle = match tag {
            ReservedTag::Pool => self.engine.pools().get_by_name(spec_raw),
            ReservedTag::Xstream => self.engine.xstreams().get_by_name(spec_raw),
            ReservedTag::Group => self
                .groups
                .get_by_name(spec_raw)
                .map(|g| NamedDependency::new_unowned(g.name(), "group", ())),
        };
        handle
            .map(|handle| ResolvedDependency { handle, remote_owner: None })
            .ok_or_else(|| {
                BedrockError::dependency_unresolved(format!("no {} named '{spec_raw}'", tag.as_str()))
            })
    }

    fn resolve_local(&self, type_tag: &str, spec: &DependencySpec) -> BedrockResult<ResolvedDependency> {
        let handle = if let Some(id) = spec.provider_id {
            self.providers.get_by_type_id(type_tag, id).ok_or_else(|| {
                BedrockError::dependency_unresolved(format!(
                    "no provider of type '{type_tag}' with id {id}"
                ))
            })?
        } else {
            let handle = self
                .providers
                .get_by_name(&spec.ident)
                .or_else(|| self.clients.get_by_name(&spec.ident))
                .ok_or_else(|| {
                    BedrockError::dependency_unresolved(format!("no local object named '{}'", spec.ident))
                })?;
            if handle.kind() != type_tag {
                return Err(BedrockError::dependency_unresolved(format!(
                    "'{}' has type '{}', expected '{type_tag}'",
                    spec.ident,
                    handle.kind()
                )));
            }
            handle
        };
        Ok(ResolvedDependency { handle, remote_owner: None })
    }

    async fn resolve_remote(
        &self,
        type_tag: &str,
        spec: &DependencySpec,
        locator: &Locator,
        timeout: Duration,
    ) -> BedrockResult<ResolvedDependency> {
        let address = match locator {
            Locator::Local => self.engine.self_address().to_owned(),
            Locator::Rank(rank) => {
                let group = self.groups.primary().ok_or_else(|| {
                    BedrockError::dependency_unresolved(
                        "rank-based locator used but no group is configured",
                    )
                })?;
                group
                    .resolve_member(u64::from(*rank))
                    .ok_or_else(|| {
                        BedrockError::dependency_unresolved(format!("no member at rank {rank}"))
                    })?
                    .to_owned()
            }
            Locator::Group { group, id, .. } => {
                let g = self.groups.get_by_name(group).ok_or_else(|| {
                    BedrockError::dependency_unresolved(format!("no group named '{group}'"))
                })?;
                g.resolve_member(*id)
                    .ok_or_else(|| {
                        BedrockError::dependency_unresolved(format!("no member {id} in group '{group}'"))
                    })?
                    .to_owned()
            }
            Locator::RawAddress(addr) => self.engine.resolve_raw_address(addr)?,
        };

        // `spec.provider_id` is known only in the `type:id@locator` form; a
        // bare `ident@locator` names the dependency's *name*, and the id it
        // runs under can only be learned from the remote side itself (never
        // guessed locally — see `resolve_remote`'s doc comment).
        let provider_id = match spec.provider_id {
            Some(id) => {
                let found = self.engine.remote_provider_exists(&address, type_tag, Some(id), timeout).await?;
                if !found {
                    return Err(BedrockError::remote_lookup_failed(format!(
                        "no provider of type '{type_tag}' with id {id} at '{address}' within {timeout:?}"
                    )));
                }
                id
            }
            None => self.engine.remote_lookup_provider(&address, type_tag, &spec.ident, timeout).await?,
        };

        let factory = self.module_registry.lookup(type_tag).ok_or_else(|| {
            BedrockError::module_missing(format!("module '{type_tag}' not registered locally"))
        })?;
        let anon_client = self
            .clients
            .get_or_create_anonymous(type_tag, &self.module_registry)
            .await?;
        let handle = factory
            .create_provider_handle(&anon_client, &address, provider_id)
            .await?;

        Ok(ResolvedDependency {
            handle,
            remote_owner: Some(factory),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{LocalEngine, ResourceTable};
    use crate::module_registry::{InitClientArgs, RegisterArgs};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct EmptyProviders;
    impl ProviderLookup for EmptyProviders {
        fn get_by_name(&self, _name: &str) -> Option<NamedDependency> {
            None
        }
        fn get_by_type_id(&self, _type_tag: &str, _provider_id: u16) -> Option<NamedDependency> {
            None
        }
    }

    struct StubProviders(Mutex<HashMap<String, NamedDependency>>);
    impl ProviderLookup for StubProviders {
        fn get_by_name(&self, name: &str) -> Option<NamedDependency> {
            self.0.lock().unwrap().get(name).cloned()
        }
        fn get_by_type_id(&self, type_tag: &str, provider_id: u16) -> Option<NamedDependency> {
            self.0
                .lock()
                .unwrap()
                .values()
                .find(|d| d.kind() == type_tag && d.downcast_ref::<u16>() == Some(&provider_id))
                .cloned()
        }
    }

    struct EmptyClients;
    #[async_trait]
    impl ClientLookup for EmptyClients {
        fn get_by_name(&self, _name: &str) -> Option<NamedDependency> {
            None
        }
        async fn get_or_create_anonymous(
            &self,
            type_tag: &str,
            _module_registry: &ModuleRegistry,
        ) -> BedrockResult<NamedDependency> {
            Ok(NamedDependency::new_unowned(
                format!("__{type_tag}_client__"),
                type_tag,
                (),
            ))
        }
    }

    struct StubFactory;
    #[async_trait]
    impl ModuleFactory for StubFactory {
        async fn register(&self, args: RegisterArgs) -> BedrockResult<NamedDependency> {
            Ok(NamedDependency::new_unowned(args.name, "module_a", args.provider_id))
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
            address: &str,
            provider_id: u16,
        ) -> BedrockResult<NamedDependency> {
            Ok(NamedDependency::new_unowned(
                format!("{address}:{provider_id}"),
                "module_a",
                (),
            ))
        }
        async fn destroy_provider_handle(&self, _handle: &NamedDependency) -> BedrockResult<()> {
            Ok(())
        }
        fn dependencies(&self, _config: &str) -> BedrockResult<Vec<crate::dependency::DependencyDeclaration>> {
            Ok(Vec::new())
        }
    }

    fn resolver_with(
        providers: Arc<dyn ProviderLookup>,
        engine: Arc<dyn EngineManager>,
    ) -> DependencyResolver {
        resolver_with_bedrock_id(providers, engine, 0)
    }

    fn resolver_with_bedrock_id(
        providers: Arc<dyn ProviderLookup>,
        engine: Arc<dyn EngineManager>,
        bedrock_provider_id: u16,
    ) -> DependencyResolver {
        let registry = Arc::new(ModuleRegistry::new());
        registry.register_in_process("module_a", Arc::new(StubFactory)).unwrap();
        DependencyResolver::new(
            engine,
            Arc::new(GroupManager::new()),
            providers,
            Arc::new(EmptyClients),
            registry,
            bedrock_provider_id,
            Duration::from_secs(1),
        )
    }

    /// A fake [`EngineManager`] for exercising `resolve_remote` without real
    /// HTTP (that's `LocalEngine`'s job, covered in `engine::local::tests`).
    struct StubEngine {
        self_address: String,
        pools: ResourceTable,
        xstreams: ResourceTable,
        exists: bool,
        lookup_provider_id: Option<u16>,
    }

    #[async_trait]
    impl EngineManager for StubEngine {
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
            _address: &str,
            _type_tag: &str,
            _provider_id: Option<u16>,
            _timeout: Duration,
        ) -> BedrockResult<bool> {
            Ok(self.exists)
        }
        async fn remote_lookup_provider(
            &self,
            _address: &str,
            _type_tag: &str,
            _name: &str,
            _timeout: Duration,
        ) -> BedrockResult<u16> {
            self.lookup_provider_id
                .ok_or_else(|| BedrockError::remote_lookup_failed("no such provider"))
        }
    }

    #[tokio::test]
    async fn resolve_remote_by_name_uses_resolved_provider_id_not_bedrock_id() {
        // The resolver's own `bedrock_provider_id` (7) deliberately differs
        // from what the "remote" side resolves (42): under the old buggy
        // fallback this test would fail by returning 7.
        let engine = Arc::new(StubEngine {
            self_address: "http://local".to_owned(),
            pools: ResourceTable::new(),
            xstreams: ResourceTable::new(),
            exists: false,
            lookup_provider_id: Some(42),
        });
        let resolver = resolver_with_bedrock_id(Arc::new(EmptyProviders), engine, 7);
        let resolved = resolver
            .resolve("module_a", "p1@ofi+tcp://peer:1234", None)
            .await
            .unwrap();
        assert_eq!(resolved.handle.name(), "ofi+tcp://peer:1234:42");
        assert!(resolved.remote_owner.is_some());
    }

    #[tokio::test]
    async fn resolve_remote_by_name_propagates_lookup_failure() {
        let engine = Arc::new(StubEngine {
            self_address: "http://local".to_owned(),
            pools: ResourceTable::new(),
            xstreams: ResourceTable::new(),
            exists: false,
            lookup_provider_id: None,
        });
        let resolver = resolver_with(Arc::new(EmptyProviders), engine);
        let err = resolver
            .resolve("module_a", "p1@ofi+tcp://peer:1234", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "RemoteLookupFailed");
    }

    #[tokio::test]
    async fn resolve_remote_by_type_id_checks_existence_and_uses_given_id() {
        let engine = Arc::new(StubEngine {
            self_address: "http://local".to_owned(),
            pools: ResourceTable::new(),
            xstreams: ResourceTable::new(),
            exists: true,
            lookup_provider_id: None,
        });
        let resolver = resolver_with_bedrock_id(Arc::new(EmptyProviders), engine, 7);
        let resolved = resolver
            .resolve("module_a", "module_a:9@ofi+tcp://peer:1234", None)
            .await
            .unwrap();
        assert_eq!(resolved.handle.name(), "ofi+tcp://peer:1234:9");
    }

    #[tokio::test]
    async fn resolve_remote_by_type_id_missing_is_lookup_failed() {
        let engine = Arc::new(StubEngine {
            self_address: "http://local".to_owned(),
            pools: ResourceTable::new(),
            xstreams: ResourceTable::new(),
            exists: false,
            lookup_provider_id: None,
        });
        let resolver = resolver_with(Arc::new(EmptyProviders), engine);
        let err = resolver
            .resolve("module_a", "module_a:9@ofi+tcp://peer:1234", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "RemoteLookupFailed");
    }

    #[tokio::test]
    async fn resolves_reserved_pool_tag() {
        let engine = Arc::new(LocalEngine::initialize("http://local", "{}").unwrap());
        engine.pools().add("wp", "pool").unwrap();
        let resolver = resolver_with(Arc::new(EmptyProviders), engine);
        let resolved = resolver.resolve("pool", "wp", None).await.unwrap();
        assert_eq!(resolved.handle.name(), "wp");
        assert!(resolved.remote_owner.is_none());
    }

    #[tokio::test]
    async fn resolve_reserved_missing_pool_is_unresolved() {
        let engine = Arc::new(LocalEngine::initialize("http://local", "{}").unwrap());
        let resolver = resolver_with(Arc::new(EmptyProviders), engine);
        let err = resolver.resolve("pool", "nope", None).await.unwrap_err();
        assert_eq!(err.kind(), "DependencyUnresolved");
    }

    #[tokio::test]
    async fn resolves_local_by_name() {
        let engine = Arc::new(LocalEngine::initialize("http://local", "{}").unwrap());
        let providers: Arc<StubProviders> = Arc::new(StubProviders(Mutex::new(HashMap::from([(
            "p1".to_owned(),
            NamedDependency::new_unowned("p1", "module_a", 0u16),
        )]))));
        let resolver = resolver_with(providers, engine);
        let resolved = resolver.resolve("module_a", "p1", None).await.unwrap();
        assert_eq!(resolved.handle.name(), "p1");
    }

    #[tokio::test]
    async fn resolve_local_rejects_type_mismatch() {
        let engine = Arc::new(LocalEngine::initialize("http://local", "{}").unwrap());
        let providers: Arc<StubProviders> = Arc::new(StubProviders(Mutex::new(HashMap::from([(
            "p1".to_owned(),
            NamedDependency::new_unowned("p1", "module_b", 0u16),
        )]))));
        let resolver = resolver_with(providers, engine);
        let err = resolver.resolve("module_a", "p1", None).await.unwrap_err();
        assert_eq!(err.kind(), "DependencyUnresolved");
    }

    #[tokio::test]
    async fn resolve_local_by_type_id() {
        let engine = Arc::new(LocalEngine::initialize("http://local", "{}").unwrap());
        let providers: Arc<StubProviders> = Arc::new(StubProviders(Mutex::new(HashMap::from([(
            "p1".to_owned(),
            NamedDependency::new_unowned("p1", "module_a", 3u16),
        )]))));
        let resolver = resolver_with(providers, engine);
        let resolved = resolver.resolve("module_a", "module_a:3", None).await.unwrap();
        assert_eq!(resolved.handle.name(), "p1");
    }

    #[tokio::test]
    async fn resolve_rejects_malformed_spec() {
        let engine = Arc::new(LocalEngine::initialize("http://local", "{}").unwrap());
        let resolver = resolver_with(Arc::new(EmptyProviders), engine);
        let err = resolver.resolve("module_a", "9bad", None).await.unwrap_err();
        assert_eq!(err.kind(), "ConfigInvalid");
    }
}
