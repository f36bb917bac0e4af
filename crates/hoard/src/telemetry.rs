//! Tracing subscriber setup for the `hoard` binary.
//!
//! Library crates only emit `tracing` events; this is the one place a
//! subscriber is installed. `RUST_LOG` takes precedence over the configured
//! level.

use tracing_subscriber::EnvFilter;

/// Install a console `fmt` subscriber. Call once, before any events.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
