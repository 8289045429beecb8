//! RHI-specific error types.

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No GPU with a usable queue and timeline semaphores
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Out-of-range write or missing mapping
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),
}

impl RhiError {
    /// Returns `true` if the device has been lost and cannot make progress.
    pub fn is_device_lost(&self) -> bool {
        matches!(self, RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST))
    }

    /// Returns `true` if a bounded wait expired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, RhiError::VulkanError(vk::Result::TIMEOUT))
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_lost_classification() {
        let lost = RhiError::from(vk::Result::ERROR_DEVICE_LOST);
        assert!(lost.is_device_lost());
        assert!(!lost.is_timeout());

        let timeout = RhiError::from(vk::Result::TIMEOUT);
        assert!(timeout.is_timeout());
        assert!(!timeout.is_device_lost());

        assert!(!RhiError::NoSuitableGpu.is_device_lost());
    }
}
