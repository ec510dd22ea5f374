//! Subscriber setup shared by the PTP-Perf binaries.

use crate::service::LogCollectionService;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Installs the global subscriber and returns the collection service that
/// run-scoped writers are installed into.
///
/// Console output honours `RUST_LOG` and falls back to `info` (or `debug`
/// when `debug` is set). Collected entries are always captured from `info`
/// upwards, independent of the console filter.
pub fn initialize_logging(debug: bool) -> LogCollectionService {
    let level = if debug { "debug" } else { "info" };
    let service = LogCollectionService::new();

    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)));
    let collection = service.layer().with_filter(if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    });

    if let Err(e) = tracing_subscriber::registry()
        .with(console)
        .with(collection)
        .try_init()
    {
        eprintln!("Logging already initialized: {}", e);
    }

    service
}

/// Set to `1` to log failures with their full cause chain and backtrace.
pub const LOG_EXCEPTIONS_ENV: &str = "LOG_EXCEPTIONS";

pub fn log_exceptions() -> bool {
    std::env::var(LOG_EXCEPTIONS_ENV).is_ok_and(|value| value == "1")
}
