//! Client Manager: owns client-side component instances (spec §4.8).
//!
//! Same shape as the Provider Manager minus `provider_id`/pool, plus
//! `getOrCreateAnonymous` for dependency-resolver-driven remote handle
//! creation. There is no `remove_client` RPC in spec §6 — clients live for
//! the daemon's lifetime, torn down only at `finalize` (spec §4.9).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::dependency::DependencyDeclaration;
use crate::dependency_resolver::{ClientLookup, DependencyResolver, ResolvedDependency};
use crate::error::{BedrockError, BedrockResult};
use crate::module_registry::{InitClientArgs, ModuleFactory, ModuleRegistry};
use crate::named_dependency::NamedDependency;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientDescription {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
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

struct ClientInstance {
    name: String,
    type_tag: String,
    handle: NamedDependency,
    tags: Vec<String>,
    resolved_dependencies: HashMap<String, Vec<ResolvedDependency>>,
    config: String,
}

impl ClientInstance {
    fn descriptor(&self) -> ClientDescriptor {
        ClientDescriptor {
            name: self.name.clone(),
            type_tag: self.type_tag.clone(),
        }
    }
}

/// Owns the ordered vector of client instances (spec §4.8).
#[derive(Default)]
pub struct ClientManager {
    instances: Mutex<Vec<ClientInstance>>,
}

impl ClientManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `add_client` (spec §6): same construction flow as `addProvider`
    /// minus provider-id allocation and pool binding.
    ///
    /// # Errors
    /// `NameCollision` if the name is taken; propagates resolver/factory
    /// errors otherwise.
    pub async fn add_client(
        &self,
        description: &ClientDescription,
        registry: &ModuleRegistry,
        resolver: &DependencyResolver,
    ) -> BedrockResult<()> {
        if self.instances.lock().iter().any(|i| i.name == description.name) {
            return Err(BedrockError::name_collision(format!(
                "client '{}' already exists",
                description.name
            )));
        }

        let schema = registry.dependencies(&description.type_tag, &description.config)?;
        let mut resolved = HashMap::new();
        for decl in &schema {
            let specs = description.dependencies.get(&decl.name).cloned().unwrap_or_default();
            if decl.is_required && specs.is_empty() {
                return Err(BedrockError::config_invalid(format!(
                    "client type '{}' requires dependency slot '{}'",
                    description.type_tag, decl.name
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
            resolved.insert(decl.name.clone(), bound);
        }

        let factory = registry
            .lookup(&description.type_tag)
            .ok_or_else(|| BedrockError::module_missing(format!("module '{}' not registered", description.type_tag)))?;

        let plain_deps: HashMap<String, Vec<NamedDependency>> = resolved
            .iter()
            .map(|(slot, deps)| (slot.clone(), deps.iter().map(|d| d.handle.clone()).collect()))
            .collect();

        let handle = factory
            .init_client(InitClientArgs {
                name: description.name.clone(),
                config: description.config.clone(),
                tags: description.tags.clone(),
                resolved_dependencies: plain_deps,
            })
            .await?;

        self.instances.lock().push(ClientInstance {
            name: description.name.clone(),
            type_tag: description.type_tag.clone(),
            handle,
            tags: description.tags.clone(),
            resolved_dependencies: resolved,
            config: description.config.clone(),
        });
        Ok(())
    }

    #[must_use]
    pub fn list_clients(&self) -> Vec<ClientDescriptor> {
        self.instances.lock().iter().map(ClientInstance::descriptor).collect()
    }

    #[must_use]
    pub fn get_client(&self, name: &str) -> Option<ClientDescriptor> {
        self.instances.lock().iter().find(|i| i.name == name).map(ClientInstance::descriptor)
    }

    /// Tear down every client, in reverse-construction order, releasing any
    /// remote provider-handles it privately held (spec §4.9 shutdown).
    ///
    /// # Errors
    /// Propagates the first factory failure encountered; remaining clients
    /// are still finalized best-effort.
    pub async fn finalize_all(&self, registry: &ModuleRegistry) -> BedrockResult<()> {
        let instances: Vec<ClientInstance> = std::mem::take(&mut *self.instances.lock());
        let mut first_err = None;
        for instance in instances.into_iter().rev() {
            if let Some(factory) = registry.lookup(&instance.type_tag) {
                if let Err(e) = factory.finalize_client(&instance.handle).await {
                    first_err.get_or_insert(e);
                }
                for deps in instance.resolved_dependencies.values() {
                    for dep in deps {
                        if let Some(owner) = &dep.remote_owner {
                            if let Err(e) = owner.destroy_provider_handle(&dep.handle).await {
                                first_err.get_or_insert(e);
                            }
                        }
                    }
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    #[must_use]
    pub fn current_config(&self) -> serde_json::Value {
        let instances = self.instances.lock();
        let clients: Vec<serde_json::Value> = instances
            .iter()
            .map(|i| {
                serde_json::json!({
                    "name": i.name,
                    "type": i.type_tag,
                    "tags": i.tags,
                    "config": serde_json::from_str::<serde_json::Value>(&i.config).unwrap_or(serde_json::Value::Null),
                })
            })
            .collect();
        serde_json::Value::Array(clients)
    }
}

impl ClientManager {
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<NamedDependency> {
        self.instances.lock().iter().find(|i| i.name == name).map(|i| i.handle.clone())
    }
}

/// The `ClientLookup` implementor used by the resolver: `ClientManager`
/// alone cannot satisfy `get_or_create_anonymous` since that operation
/// needs the Module Registry to construct a new instance — this adapter
/// closes over both.
pub struct AnonymousClientLookup {
    manager: Arc<ClientManager>,
    registry: Arc<ModuleRegistry>,
}

impl AnonymousClientLookup {
    #[must_use]
    pub fn new(manager: Arc<ClientManager>, registry: Arc<ModuleRegistry>) -> Self {
        Self { manager, registry }
    }
}

#[async_trait]
impl ClientLookup for AnonymousClientLookup {
    fn get_by_name(&self, name: &str) -> Option<NamedDependency> {
        self.manager.get_by_name(name)
    }

    async fn get_or_create_anonymous(
        &self,
        type_tag: &str,
        _module_registry: &ModuleRegistry,
    ) -> BedrockResult<NamedDependency> {
        let canonical_name = format!("__{type_tag}_client__");
        if let Some(existing) = self.manager.get_by_name(&canonical_name) {
            return Ok(existing);
        }

        let schema = self.registry.dependencies(type_tag, "{}")?;
        if schema.iter().any(|d| d.is_required) {
            return Err(BedrockError::unsupported(format!(
                "cannot auto-create anonymous client for '{type_tag}': its schema declares required dependencies"
            )));
        }

        let description = ClientDescription {
            name: canonical_name.clone(),
            type_tag: type_tag.to_owned(),
            tags: Vec::new(),
            dependencies: HashMap::new(),
            config: "{}".to_owned(),
        };
        let factory = self
            .registry
            .lookup(type_tag)
            .ok_or_else(|| BedrockError::module_missing(format!("module '{type_tag}' not registered")))?;
        let handle = factory
            .init_client(InitClientArgs {
                name: description.name.clone(),
                config: description.config.clone(),
                tags: Vec::new(),
                resolved_dependencies: HashMap::new(),
            })
            .await?;
        self.manager.instances.lock().push(ClientInstance {
            name: description.name,
            type_tag: description.type_tag,
            handle: handle.clone(),
            tags: Vec::new(),
            resolved_dependencies: HashMap::new(),
            config: "{}".to_owned(),
        });
        Ok(handle)
    }
}
