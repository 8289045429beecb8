//! Errors surfaced by the completion fence and the frame resources.

use framering_rhi::RhiError;
use thiserror::Error;

/// Failure of a fence query, wait or signal.
///
/// None of these are transient: the ring never retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FenceError {
    /// The execution engine can no longer make progress.
    #[error("device lost")]
    DeviceLost,

    /// A bounded wait expired before the fence reached `target`.
    #[error("timed out waiting for fence value {target} (completed {completed})")]
    Timeout {
        /// Value that was waited on.
        target: u64,
        /// Last value observed as completed.
        completed: u64,
    },

    /// Any other backend failure.
    #[error("fence backend error: {0}")]
    Backend(String),
}

impl FenceError {
    /// Device loss and backend failures cannot be recovered from; a timeout
    /// leaves the decision to the caller.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FenceError::Timeout { .. })
    }
}

impl From<RhiError> for FenceError {
    fn from(error: RhiError) -> Self {
        if error.is_device_lost() {
            FenceError::DeviceLost
        } else {
            FenceError::Backend(error.to_string())
        }
    }
}

impl From<FenceError> for framering_core::Error {
    fn from(error: FenceError) -> Self {
        framering_core::Error::Gpu(error.to_string())
    }
}

/// Result type alias for fence operations.
pub type FenceResult<T> = std::result::Result<T, FenceError>;

/// Failure writing into a frame slot's constant buffers.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// Element index past the end of the buffer.
    #[error("element {index} out of range for buffer of {len} elements")]
    OutOfRange {
        /// Requested element.
        index: usize,
        /// Number of elements in the buffer.
        len: usize,
    },

    /// GPU buffer access failed.
    #[error(transparent)]
    Rhi(#[from] RhiError),
}

/// Result type alias for frame resource operations.
pub type ResourceResult<T> = std::result::Result<T, ResourceError>;
