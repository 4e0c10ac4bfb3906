//! # Logging
//!
//! `tracing` subscriber setup. The filter comes from `RUST_LOG` with
//! `kiroute=info` added on top.

use tracing_subscriber::EnvFilter;

/// Default filter directive
pub const DEFAULT_DIRECTIVE: &str = "kiroute=info";

/// Install the global fmt subscriber; `json` switches to JSON lines
///
/// Returns `false` when a subscriber was already installed.
pub fn init_tracing(json: bool) -> bool {
    let filter = DEFAULT_DIRECTIVE
        .parse()
        .map_or_else(|_| EnvFilter::from_default_env(), |d| EnvFilter::from_default_env().add_directive(d));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}
