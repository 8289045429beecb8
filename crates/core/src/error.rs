//! Error types shared across the framering crates.

use thiserror::Error;

/// Main error type for applications built on the frame ring.
#[derive(Error, Debug)]
pub enum Error {
    /// GPU or backend errors (device creation, submission, device loss)
    #[error("GPU error: {0}")]
    Gpu(String),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using the shared Error type.
pub type Result<T> = std::result::Result<T, Error>;
