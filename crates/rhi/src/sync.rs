//! Timeline semaphores.
//!
//! A Vulkan 1.2 timeline semaphore is a 64-bit counter the GPU advances when
//! a submission that signals it completes. The host can read the counter and
//! block until it reaches a value, which is exactly the contract a frame
//! ring's completion fence needs: one semaphore for the whole application
//! instead of one binary fence per frame slot.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use framering_rhi::device::Device;
//! use framering_rhi::sync::TimelineSemaphore;
//!
//! # fn example(device: Arc<Device>) -> Result<(), framering_rhi::RhiError> {
//! let timeline = TimelineSemaphore::new(device.clone(), 0)?;
//!
//! // Queue a signal to 1 behind all earlier work, then wait for it
//! unsafe { device.submit(&[], &[(timeline.handle(), 1)])? };
//! timeline.wait(1, u64::MAX)?;
//! assert!(timeline.value()? >= 1);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Vulkan timeline semaphore wrapper.
///
/// # Thread Safety
///
/// Reading and waiting are host-thread-safe; signaling happens through
/// [`Device::submit`], which serializes queue access.
pub struct TimelineSemaphore {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan semaphore handle.
    semaphore: vk::Semaphore,
}

impl TimelineSemaphore {
    /// Creates a timeline semaphore starting at `initial_value`.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>, initial_value: u64) -> RhiResult<Self> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);

        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
        debug!("Created timeline semaphore at {}", initial_value);

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }

    /// Returns the device the semaphore belongs to.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Reads the current counter value without blocking.
    ///
    /// # Errors
    ///
    /// Returns `ERROR_DEVICE_LOST` if the device was lost.
    pub fn value(&self) -> RhiResult<u64> {
        let value = unsafe {
            self.device
                .handle()
                .get_semaphore_counter_value(self.semaphore)?
        };
        Ok(value)
    }

    /// Blocks until the counter reaches `value`.
    ///
    /// # Arguments
    ///
    /// * `value` - Counter value to wait for
    /// * `timeout` - Timeout in nanoseconds. Use `u64::MAX` for infinite wait.
    ///
    /// # Errors
    ///
    /// Returns `TIMEOUT` if the timeout expired and `ERROR_DEVICE_LOST` if
    /// the device was lost.
    pub fn wait(&self, value: u64, timeout: u64) -> RhiResult<()> {
        let semaphores = [self.semaphore];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);

        unsafe { self.device.handle().wait_semaphores(&wait_info, timeout)? };
        Ok(())
    }

    /// Queues a signal to `value` behind all previously submitted work.
    ///
    /// # Errors
    ///
    /// Returns an error if the submission fails.
    pub fn signal_on_queue(&self, value: u64) -> RhiResult<()> {
        // A bare submission with no command buffers only orders the signal.
        unsafe { self.device.submit(&[], &[(self.semaphore, value)]) }
    }
}

impl Drop for TimelineSemaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        debug!("Destroyed timeline semaphore");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeline_semaphore_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TimelineSemaphore>();
    }
}
