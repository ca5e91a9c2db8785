//! Logging infrastructure for the dubbing pipeline.
//!
//! - Process-wide `tracing` subscriber, set up once at start
//! - Per-run loggers with file and sink output, mirrored into `tracing`
//! - Tail buffer of recent lines for failure reports
//!
//! # Example
//!
//! ```no_run
//! use dub_core::logging::{init_tracing, LogConfig, LogLevel, RunLogger};
//! use uuid::Uuid;
//!
//! init_tracing(LogLevel::Info);
//!
//! let logger = RunLogger::builder(Uuid::new_v4())
//!     .log_dir("/var/log/dub")
//!     .config(LogConfig::default())
//!     .build()
//!     .unwrap();
//!
//! logger.stage("Transcription");
//! logger.info("Submitted job talk-1714564800");
//! logger.success("Transcript normalized");
//! ```

mod run_logger;
mod types;

use std::path::Path;

pub use run_logger::{RunLogger, RunLoggerBuilder};
pub use types::{LogConfig, LogLevel, LogSink, MessagePrefix};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber writing to stderr.
///
/// `RUST_LOG` overrides `default_level`. A second call is a no-op.
pub fn init_tracing(default_level: LogLevel) {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(env_filter(default_level))
        .try_init();
}

/// Like [`init_tracing`], plus a daily-rolling file under `log_dir`.
///
/// Keep the returned guard alive for as long as events should reach the file.
pub fn init_tracing_with_file(default_level: LogLevel, log_dir: impl AsRef<Path>) -> WorkerGuard {
    let appender = tracing_appender::rolling::daily(log_dir.as_ref(), "dub_core.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(env_filter(default_level))
        .try_init();

    guard
}

/// Initialize tracing for tests (only logs warnings and above).
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

fn env_filter(default_level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.as_filter()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_to_filter_works() {
        assert_eq!(LogLevel::Debug.as_filter(), "debug");
        assert_eq!(LogLevel::Warn.as_filter(), "warn");
    }

    #[test]
    fn levels_parse_lowercase() {
        let level: LogLevel = serde_json::from_str("\"warn\"").unwrap();
        assert_eq!(level, LogLevel::Warn);
    }
}
