//! Tracing setup: an `EnvFilter`-gated writer, JSON or plain text depending
//! on [`AppConfig::log_json`], grounded on the teacher's non-blocking
//! appender pattern in `logging.rs` (trimmed here to stdout — this service
//! has no per-symbol log-rotation requirement).

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::AppConfig;

/// Installs the global subscriber and returns the `WorkerGuard` the caller
/// must keep alive for the process lifetime — dropping it flushes and
/// stops the background writer thread.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let registry = tracing_subscriber::registry().with(filter);

    if config.log_json {
        registry.with(fmt::layer().json().with_target(true).with_writer(non_blocking)).init();
    } else {
        registry.with(fmt::layer().with_target(false).with_writer(non_blocking)).init();
    }

    guard
}
