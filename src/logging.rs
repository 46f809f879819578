//! Diagnostics output for hosts and the CLI.
//!
//! The library only emits `tracing` events; nothing is printed unless a host
//! installs a subscriber, e.g. with [`init`].

use tracing_subscriber::EnvFilter;

fn default_directive(debug: bool) -> &'static str {
    if debug { "crashreport=debug" } else { "warn" }
}

/// Install a stderr subscriber. `RUST_LOG` wins over `debug` when set.
/// Returns false if a global subscriber was already installed.
pub fn init(debug: bool) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}
