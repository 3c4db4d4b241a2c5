// File: src/monitoring/logging.rs
//
// Structured logging bootstrap shared by the binary and integration tests

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing with env-filter support; JSON output when
/// `LOG_FORMAT=json`. Safe to call more than once.
pub fn init_structured_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let result = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("logging already initialized");
    }
}
