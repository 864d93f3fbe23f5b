//! Tracing setup for the aggregator binary.
//!
//! Libraries only emit events; the subscriber is installed here, once, at
//! process start.

use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber from the environment.
///
/// `RUST_LOG` controls the filter (default `info`); `NOCTUA_LOG_JSON=1`
/// switches to JSON lines for machine consumers.
pub fn init_from_env() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("NOCTUA_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
