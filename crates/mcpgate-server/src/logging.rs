// crates/mcpgate-server/src/logging.rs
// ============================================================================
// Module: Logging
// Description: Process-wide `tracing` subscriber initialization.
// Purpose: Give every deployment structured logs out of the box, switchable
//          between human-readable and JSON framing without a restart-time
//          config file.
// Dependencies: tracing, tracing-subscriber
// ============================================================================

//! ## Overview
//! [`init`] is called exactly once from `main`, before any other component
//! is constructed. The filter comes from `RUST_LOG` (defaulting to `info`
//! when unset or invalid); the output format comes from `LOG_FORMAT`
//! (`json` or `text`, defaulting to `text`).

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Environment variable selecting the log line format.
const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Default filter directive applied when `RUST_LOG` is unset or invalid.
const DEFAULT_FILTER: &str = "info";

/// Initializes the global `tracing` subscriber.
///
/// Idempotent in the sense that it is meant to be called once; a second
/// call returns an error rather than panicking, since a double-init is a
/// caller bug rather than a fatal condition worth crashing over.
///
/// # Errors
///
/// Returns an error if a global subscriber has already been installed.
pub fn init() -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).try_init()
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).try_init()
    }
}
