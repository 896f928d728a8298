//! A minimal module demonstrating the producing side of
//! [`bedrock_core::module_registry::BedrockInitFn`] (spec §4.1, §9).
//!
//! Grounded on `original_source/include/bedrock/module.h`'s
//! `BEDROCK_REGISTER_MODULE(__name__, __struct__)` macro: that macro expands
//! to an exported `<name>_bedrock_init` function filling in a
//! `struct bedrock_module` of callback pointers. The Rust equivalent exports
//! a `<name>_bedrock_init` function returning a boxed [`ModuleFactory`] trait
//! object instead of a callback struct, matching `BedrockInitFn`'s signature.
//!
//! This module stores no real backend; `register`/`init_client` just keep
//! the caller-supplied configuration string around so `get_config`/
//! `get_client_config` can echo it back, which is enough to exercise the
//! whole Module Registry / Provider Manager / Client Manager path end to
//! end without a real external dependency.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bedrock_core::dependency::DependencyDeclaration;
use bedrock_core::error::BedrockResult;
use bedrock_core::module_registry::{InitClientArgs, ModuleFactory, RegisterArgs};
use bedrock_core::named_dependency::NamedDependency;

/// Opaque payload handed back to the Provider Manager: just the config the
/// instance was registered with.
struct SampleProvider {
    config: String,
}

/// Opaque payload handed back to the Client Manager.
struct SampleClient {
    config: String,
}

/// Opaque payload for a remote provider handle obtained via
/// `create_provider_handle` (spec §4.1 item 11): the address and provider id
/// it was resolved against, not a live connection, since this module has no
/// real transport to open one over.
struct SampleProviderHandle {
    address: String,
    provider_id: u16,
}

/// The factory every other module in this crate is modeled on. Stateless:
/// all per-instance data lives in the `NamedDependency` handle itself.
#[derive(Default)]
pub struct SampleFactory;

#[async_trait]
impl ModuleFactory for SampleFactory {
    async fn register(&self, args: RegisterArgs) -> BedrockResult<NamedDependency> {
        Ok(NamedDependency::new_unowned(
            args.name,
            "sample",
            SampleProvider { config: args.config },
        ))
    }

    async fn deregister(&self, _handle: &NamedDependency) -> BedrockResult<()> {
        Ok(())
    }

    fn get_config(&self, handle: &NamedDependency) -> BedrockResult<String> {
        Ok(handle
            .downcast_ref::<SampleProvider>()
            .map_or_else(|| "{}".to_owned(), |p| p.config.clone()))
    }

    async fn init_client(&self, args: InitClientArgs) -> BedrockResult<NamedDependency> {
        Ok(NamedDependency::new_unowned(
            args.name,
            "sample",
            SampleClient { config: args.config },
        ))
    }

    async fn finalize_client(&self, _handle: &NamedDependency) -> BedrockResult<()> {
        Ok(())
    }

    fn get_client_config(&self, handle: &NamedDependency) -> BedrockResult<String> {
        Ok(handle
            .downcast_ref::<SampleClient>()
            .map_or_else(|| "{}".to_owned(), |c| c.config.clone()))
    }

    async fn create_provider_handle(
        &self,
        client: &NamedDependency,
        address: &str,
        provider_id: u16,
    ) -> BedrockResult<NamedDependency> {
        Ok(NamedDependency::new_unowned(
            format!("{}@{address}:{provider_id}", client.name()),
            "sample",
            SampleProviderHandle {
                address: address.to_owned(),
                provider_id,
            },
        ))
    }

    async fn destroy_provider_handle(&self, _handle: &NamedDependency) -> BedrockResult<()> {
        Ok(())
    }

    fn dependencies(&self, _config: &str) -> BedrockResult<Vec<DependencyDeclaration>> {
        Ok(Vec::new())
    }
}

/// Exported symbol the Module Registry's `load_library` resolves by name
/// (`"sample" + "_bedrock_init"`). Matches
/// [`bedrock_core::module_registry::BedrockInitFn`].
///
/// # Safety
/// Called only by `libloading` immediately after `dlopen`, per the fixed ABI
/// documented in `original_source/include/bedrock/module.h`. The returned
/// pointer is later reclaimed with `Arc::from_raw` by the registry, so it
/// must originate from `Arc::into_raw` on a `Arc<dyn ModuleFactory>`, as it
/// does here.
#[allow(unsafe_code)]
#[no_mangle]
pub unsafe extern "C" fn sample_bedrock_init() -> *mut dyn ModuleFactory {
    let factory: Arc<dyn ModuleFactory> = Arc::new(SampleFactory::default());
    Arc::into_raw(factory).cast_mut()
}
