//! Tracing subscriber setup for worker processes.

use dvp_types::{DvpError, Result};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber: `RUST_LOG` (or [`DEFAULT_FILTER`]) for
/// filtering, JSON lines when `json` is set, human-readable otherwise.
///
/// # Errors
/// `Configuration` if the filter is malformed or a subscriber is already set.
pub fn init(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .map_err(|e| DvpError::Configuration(format!("RUST_LOG: {e}")))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };
    installed.map_err(|e| DvpError::Configuration(format!("tracing init: {e}")))?;

    tracing::debug!(json, "Tracing initialized");
    Ok(())
}

/// [`init`] with JSON output chosen by `DVP_LOG_JSON=true`.
pub fn init_from_env() -> Result<()> {
    let json = std::env::var("DVP_LOG_JSON")
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes"))
        .unwrap_or(false);
    init(json)
}
