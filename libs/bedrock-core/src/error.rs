//! Error kinds for the composition engine (spec §7).
//!
//! Every variant carries a source location (file/line) for operator
//! debugging, following the teacher's `ConfigError`/`ClientHubError`
//! convention of structured, matchable error enums rather than a single
//! opaque string.

use std::fmt;

/// A source location captured at the call site of a fallible operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub file: &'static str,
    pub line: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Error kinds named in spec §7.
#[derive(thiserror::Error, Debug)]
pub enum BedrockError {
    #[error("{at}: invalid configuration: {message}")]
    ConfigInvalid { at: Location, message: String },

    #[error("{at}: module missing: {message}")]
    ModuleMissing { at: Location, message: String },

    #[error("{at}: dependency unresolved: {message}")]
    DependencyUnresolved { at: Location, message: String },

    #[error("{at}: dependency in use: {message}")]
    DependencyInUse { at: Location, message: String },

    #[error("{at}: name collision: {message}")]
    NameCollision { at: Location, message: String },

    #[error("{at}: remote lookup failed: {message}")]
    RemoteLookupFailed { at: Location, message: String },

    #[error("{at}: factory failed: {message}")]
    FactoryFailed { at: Location, message: String },

    #[error("{at}: unsupported: {message}")]
    Unsupported { at: Location, message: String },

    #[error("{at}: engine error: {message}")]
    EngineError { at: Location, message: String },
}

impl BedrockError {
    /// A short, stable tag for the error kind (used by the RPC envelope and
    /// tests that match on kind without matching the whole enum).
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigInvalid { .. } => "ConfigInvalid",
            Self::ModuleMissing { .. } => "ModuleMissing",
            Self::DependencyUnresolved { .. } => "DependencyUnresolved",
            Self::DependencyInUse { .. } => "DependencyInUse",
            Self::NameCollision { .. } => "NameCollision",
            Self::RemoteLookupFailed { .. } => "RemoteLookupFailed",
            Self::FactoryFailed { .. } => "FactoryFailed",
            Self::Unsupported { .. } => "Unsupported",
            Self::EngineError { .. } => "EngineError",
        }
    }
}

/// Result alias used throughout the composition engine.
pub type BedrockResult<T> = Result<T, BedrockError>;

macro_rules! error_ctor {
    ($fn_name:ident, $variant:ident) => {
        impl BedrockError {
            #[track_caller]
            #[must_use]
            pub fn $fn_name(message: impl Into<String>) -> Self {
                let loc = std::panic::Location::caller();
                Self::$variant {
                    at: Location {
                        file: loc.file(),
                        line: loc.line(),
                    },
                    message: message.into(),
                }
            }
        }
    };
}

error_ctor!(config_invalid, ConfigInvalid);
error_ctor!(module_missing, ModuleMissing);
error_ctor!(dependency_unresolved, DependencyUnresolved);
error_ctor!(dependency_in_use, DependencyInUse);
error_ctor!(name_collision, NameCollision);
error_ctor!(remote_lookup_failed, RemoteLookupFailed);
error_ctor!(factory_failed, FactoryFailed);
error_ctor!(unsupported, Unsupported);
error_ctor!(engine_error, EngineError);
