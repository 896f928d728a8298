use std::path::Path;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How noisy a component's own logging should default to when `RUST_LOG`
/// is unset (spec §9, SPEC_FULL.md ambient-stack section).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    #[must_use]
    pub fn from_verbosity(verbose: u8) -> Self {
        match verbose {
            0 => Self::Info,
            1 => Self::Debug,
            _ => Self::Trace,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Initialize the global tracing subscriber: an `EnvFilter` seeded from
/// `RUST_LOG` (falling back to `default_level`) plus a console formatter,
/// and, if `log_file` is given, a non-blocking file appender writing JSON
/// lines. Returns the file appender's guard; dropping it flushes pending
/// writes, so the caller must hold it for the process lifetime.
pub fn init_logging(default_level: LogLevel, log_file: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.as_str()));

    let console_layer = fmt::layer().with_target(true).with_thread_ids(false);

    match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
            let file_name = path.file_name().map_or_else(|| "bedrockd.log".to_owned(), |n| n.to_string_lossy().into_owned());
            let appender = tracing_appender::rolling::daily(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().json().with_writer(non_blocking);

            tracing_subscriber::registry().with(filter).with(console_layer).with(file_layer).init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(console_layer).init();
            None
        }
    }
}
