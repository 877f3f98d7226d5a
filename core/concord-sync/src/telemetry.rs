//! Structured logging setup.

use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Installs a global `tracing` subscriber for the given configuration.
///
/// `RUST_LOG` wins over the configured directive when it is set. Returns
/// `false` if a subscriber was already installed, which is not an error.
pub fn init_tracing(config: &LogConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .is_ok()
}
