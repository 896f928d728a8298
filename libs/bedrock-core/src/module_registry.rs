//! Module Registry: loads shared libraries and records typed factories
//! keyed by module name (spec §4.1).
//!
//! Grounded on `original_source/include/bedrock/module.h`'s
//! `BEDROCK_REGISTER_MODULE(__name, __type)` macro, which expands to an
//! exported `extern "C"` function named `<name>_bedrock_init`. The Rust
//! equivalent is a dynamic library exporting a `#[no_mangle] extern "C"`
//! symbol of that same name, resolved at runtime via `libloading`. This is
//! the one place in the crate that needs `unsafe`, since `Library::new`
//! and `Symbol::get` are both unsafe FFI boundaries; the workspace's
//! blanket `unsafe_code = "forbid"` lint is overridden locally (see
//! DESIGN.md).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::dependency::DependencyDeclaration;
use crate::error::{BedrockError, BedrockResult};
use crate::named_dependency::NamedDependency;

/// Arguments passed to a factory's `register` hook (spec §4.1 item 1).
#[derive(Debug, Clone)]
pub struct RegisterArgs {
    pub name: String,
    pub provider_id: u16,
    pub pool: Option<NamedDependency>,
    pub config: String,
    pub tags: Vec<String>,
    pub resolved_dependencies: HashMap<String, Vec<NamedDependency>>,
}

/// Arguments passed to a factory's `init_client` hook (spec §4.1 item 8).
#[derive(Debug, Clone)]
pub struct InitClientArgs {
    pub name: String,
    pub config: String,
    pub tags: Vec<String>,
    pub resolved_dependencies: HashMap<String, Vec<NamedDependency>>,
}

/// The factory contract every module implements (spec §4.1).
///
/// Optional operations (`change_pool`, `migrate`, `snapshot`, `restore`)
/// default to `Unsupported` so a minimal module need only implement
/// `register`/`deregister`/`get_config`/`dependencies` plus the client
/// counterparts it actually needs.
#[async_trait]
pub trait ModuleFactory: Send + Sync {
    async fn register(&self, args: RegisterArgs) -> BedrockResult<NamedDependency>;

    async fn deregister(&self, handle: &NamedDependency) -> BedrockResult<()>;

    fn get_config(&self, handle: &NamedDependency) -> BedrockResult<String>;

    async fn change_pool(
        &self,
        _handle: &NamedDependency,
        _new_pool: &NamedDependency,
    ) -> BedrockResult<()> {
        Err(BedrockError::unsupported("change_pool not implemented by this module"))
    }

    async fn migrate(
        &self,
        _handle: &NamedDependency,
        _dest_address: &str,
        _dest_provider_id: u16,
        _migration_config: &str,
        _remove_source: bool,
    ) -> BedrockResult<()> {
        Err(BedrockError::unsupported("migrate not implemented by this module"))
    }

    async fn snapshot(
        &self,
        _handle: &NamedDependency,
        _dest_path: &str,
        _snapshot_config: &str,
        _remove_source: bool,
    ) -> BedrockResult<()> {
        Err(BedrockError::unsupported("snapshot not implemented by this module"))
    }

    async fn restore(
        &self,
        _handle: &NamedDependency,
        _src_path: &str,
        _restore_config: &str,
    ) -> BedrockResult<()> {
        Err(BedrockError::unsupported("restore not implemented by this module"))
    }

    async fn init_client(&self, args: InitClientArgs) -> BedrockResult<NamedDependency>;

    async fn finalize_client(&self, handle: &NamedDependency) -> BedrockResult<()>;

    fn get_client_config(&self, handle: &NamedDependency) -> BedrockResult<String>;

    async fn create_provider_handle(
        &self,
        client: &NamedDependency,
        address: &str,
        provider_id: u16,
    ) -> BedrockResult<NamedDependency>;

    async fn destroy_provider_handle(&self, handle: &NamedDependency) -> BedrockResult<()>;

    /// Declared dependency schema for an instance's configuration
    /// (spec §4.1 item 9).
    fn dependencies(&self, config: &str) -> BedrockResult<Vec<DependencyDeclaration>>;
}

/// A loaded module: its factory plus the backing library keeping the
/// factory's code mapped in (dropped only when the registry itself drops,
/// mirroring the C++ original's process-lifetime library handles).
struct LoadedModule {
    factory: Arc<dyn ModuleFactory>,
    #[allow(dead_code)]
    library: Option<Arc<libloading::Library>>,
}

/// Signature of the exported `<name>_bedrock_init` symbol: it returns an
/// owned trait object boxed behind a raw pointer, matching the C ABI a
/// `cdylib` can export. `demos/sample-module` shows the producing side.
pub type BedrockInitFn = unsafe extern "C" fn() -> *mut dyn ModuleFactory;

/// Process-wide module registry (spec §4.1).
#[derive(Default)]
pub struct ModuleRegistry {
    modules: RwLock<HashMap<String, LoadedModule>>,
}

impl ModuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory that was already constructed in-process (the
    /// "current image" fallback from spec §4.1/§9, and the path the demo
    /// module's own unit tests and `register_in_process` helper use).
    ///
    /// # Errors
    /// Returns `NameCollision` if `name` is already registered.
    pub fn register_in_process(
        &self,
        name: impl Into<String>,
        factory: Arc<dyn ModuleFactory>,
    ) -> BedrockResult<()> {
        let name = name.into();
        let mut modules = self.modules.write();
        if modules.contains_key(&name) {
            return Err(BedrockError::name_collision(format!(
                "module '{name}' already registered"
            )));
        }
        modules.insert(name, LoadedModule { factory, library: None });
        Ok(())
    }

    /// Load a module library from disk and bind its factory (spec §4.1).
    ///
    /// An empty `library_path` means "the current process image" — since a
    /// Rust binary cannot re-dlopen itself to discover new exported symbols
    /// the way a C++ executable can, that fallback is satisfied instead by
    /// `register_in_process`, and this function rejects an empty path with
    /// `ModuleMissing` pointing callers at that alternative.
    ///
    /// # Errors
    /// Returns `NameCollision` if `name` is already registered, or
    /// `ModuleMissing` if the library cannot be opened or does not export
    /// `<name>_bedrock_init`.
    #[allow(unsafe_code)]
    pub fn load_library(&self, name: &str, library_path: &str) -> BedrockResult<()> {
        if self.modules.read().contains_key(name) {
            return Err(BedrockError::name_collision(format!(
                "module '{name}' already registered"
            )));
        }
        if library_path.is_empty() {
            return Err(BedrockError::module_missing(
                "in-image module loading is not supported from Rust; use register_in_process",
            ));
        }

        let symbol_name = format!("{name}_bedrock_init");

        // SAFETY: loading an operator-supplied shared library and invoking
        // its documented, fixed-ABI init symbol is the documented contract
        // of this function; the symbol's signature is pinned by
        // `BedrockInitFn` and by the `<name>_bedrock_init` naming
        // convention every module built against this crate must follow.
        let (factory, library) = unsafe {
            let library = libloading::Library::new(library_path).map_err(|e| {
                BedrockError::module_missing(format!(
                    "failed to open library '{library_path}': {e}"
                ))
            })?;
            let init: libloading::Symbol<BedrockInitFn> =
                library.get(symbol_name.as_bytes()).map_err(|e| {
                    BedrockError::module_missing(format!(
                        "library '{library_path}' does not export '{symbol_name}': {e}"
                    ))
                })?;
            let raw = init();
            if raw.is_null() {
                return Err(BedrockError::module_missing(format!(
                    "'{symbol_name}' returned a null factory"
                )));
            }
            (Arc::from_raw(raw), library)
        };

        self.modules.write().insert(
            name.to_owned(),
            LoadedModule {
                factory,
                library: Some(Arc::new(library)),
            },
        );
        Ok(())
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn ModuleFactory>> {
        self.modules.read().get(name).map(|m| m.factory.clone())
    }

    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Delegates to the factory, per spec §4.1 "Get declared dependencies".
    ///
    /// # Errors
    /// Returns `ModuleMissing` if `name` is not registered, or whatever the
    /// factory's `dependencies` hook returns.
    pub fn dependencies(
        &self,
        name: &str,
        config: &str,
    ) -> BedrockResult<Vec<DependencyDeclaration>> {
        let factory = self
            .lookup(name)
            .ok_or_else(|| BedrockError::module_missing(format!("module '{name}' not registered")))?;
        factory.dependencies(config)
    }
}
