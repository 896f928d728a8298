//! Host process bootstrap: logging, signal handling, and path utilities
//! shared by the `bedrockd` daemon and the `bedrock-query`/`bedrock-shutdown`
//! control-plane CLIs.

pub mod host;

pub use host::logging::init_logging;
pub use host::paths::{expand_tilde, normalize_executable_path, resolve_home_dir, HomeDirError};
pub use host::signals::wait_for_shutdown;
