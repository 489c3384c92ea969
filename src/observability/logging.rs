//! # Logging
//!
//! Tracing subscriber setup shared by the `echoctl` binary and test suites.

use tracing_subscriber::EnvFilter;

/// Build the env filter
///
/// `RUST_LOG` wins when set; otherwise the harness logs at `log_level`.
#[must_use]
pub fn env_filter(log_level: &str) -> EnvFilter {
    let level = log_level.to_lowercase();
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("echo_harness={level},echoctl={level}").into())
}

/// Install the global fmt subscriber
///
/// Safe to call more than once; later calls are ignored so every test can
/// initialise logging without coordinating with the others.
pub fn init_tracing(log_level: &str) {
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(env_filter(log_level))
        .try_init()
    {
        tracing::debug!("Tracing subscriber already initialized: {}", e);
    }
}
