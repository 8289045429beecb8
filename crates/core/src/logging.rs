//! Logging initialization and configuration.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the logging system with tracing.
///
/// This sets up tracing-subscriber with:
/// - Environment-based filtering (RUST_LOG)
/// - Target and thread id on every line, so producer and GPU threads can be told apart
///
/// # Example
/// ```
/// framering_core::init_logging();
/// tracing::info!("Frame ring initialized");
/// ```
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,framering=debug,framering_rhi=info"));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
    if installed.is_err() {
        tracing::debug!("Logging already initialized, keeping the existing subscriber");
    }
}
