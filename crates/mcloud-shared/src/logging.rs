//! Tracing setup, initialized once at process startup.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a global `tracing` subscriber reading `RUST_LOG`
/// (default `info`) for the filter directive.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
