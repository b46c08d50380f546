//! Process-wide tracing setup.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "info";

/// Install the global `tracing` subscriber.
///
/// Honors `RUST_LOG`; falls back to `info` for every target. Calling this twice is harmless,
/// the second registration is ignored.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
}
