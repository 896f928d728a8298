//! Host/in-process bootstrap: logging initialization, signal handling, and
//! path utilities shared by every `bedrock-core`-based binary.

pub mod logging;
pub mod paths;
pub mod signals;
