//! Vulkan logical device, submission queue and memory allocator.
//!
//! The [`Device`] is created without any presentation extension. It enables
//! the Vulkan 1.2 `timelineSemaphore` feature, retrieves one queue and
//! initializes gpu-allocator for the per-frame uniform buffers.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use framering_rhi::instance::Instance;
//! use framering_rhi::physical_device::select_physical_device;
//! use framering_rhi::device::Device;
//!
//! let instance = Arc::new(Instance::new("framering", false).expect("Failed to create instance"));
//! let info = select_physical_device(instance.handle()).expect("No suitable GPU found");
//! let device = Device::new(instance, &info).expect("Failed to create logical device");
//! device.wait_idle().expect("Device lost");
//! ```

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::PhysicalDeviceInfo;

/// Vulkan logical device wrapper.
///
/// # Thread Safety
///
/// Shared through `Arc`. The allocator and the queue are each behind a
/// `Mutex`; Vulkan requires host synchronization of `vkQueueSubmit`.
pub struct Device {
    /// Kept alive for as long as the device exists.
    instance: Arc<Instance>,
    /// Vulkan logical device handle.
    device: ash::Device,
    /// Selected physical device.
    physical_device: PhysicalDeviceInfo,
    /// GPU memory allocator, dropped before the device is destroyed.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    /// The single submission queue.
    queue: Mutex<vk::Queue>,
}

impl Device {
    /// Creates a logical device with one queue from the selected family.
    ///
    /// # Errors
    ///
    /// Returns an error if device creation or allocator initialization fails.
    pub fn new(instance: Arc<Instance>, physical_device: &PhysicalDeviceInfo) -> RhiResult<Arc<Self>> {
        let family_index = physical_device.queue.family_index;
        let priorities = [1.0f32];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(family_index)
            .queue_priorities(&priorities)];

        let mut features_1_2 = vk::PhysicalDeviceVulkan12Features::default().timeline_semaphore(true);

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .push_next(&mut features_1_2);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device.device, &create_info, None)?
        };
        info!("Logical device created with timeline semaphores enabled");

        let queue = unsafe { device.get_device_queue(family_index, 0) };
        debug!("Queue retrieved from family {}", family_index);

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical_device.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        });
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };
        info!("GPU memory allocator initialized");

        Ok(Arc::new(Self {
            instance,
            device,
            physical_device: physical_device.clone(),
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            queue: Mutex::new(queue),
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the instance this device was created from.
    #[inline]
    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    /// Returns the selected physical device.
    #[inline]
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Queue family index of the submission queue.
    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.physical_device.queue.family_index
    }

    /// Required alignment of uniform buffer offsets.
    #[inline]
    pub fn uniform_offset_alignment(&self) -> u64 {
        self.physical_device.uniform_offset_alignment()
    }

    /// Locks the GPU memory allocator.
    pub fn allocator(&self) -> RhiResult<MutexGuard<'_, Allocator>> {
        self.allocator
            .lock()
            .map_err(|_| RhiError::InvalidHandle("allocator mutex poisoned".to_string()))
    }

    /// Blocks until every queue is idle.
    ///
    /// # Errors
    ///
    /// Returns `ERROR_DEVICE_LOST` if the device was lost.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Submits command buffers and signals timeline semaphores on completion.
    ///
    /// `signals` pairs each timeline semaphore with the value it is set to
    /// once every command buffer in this and all earlier submissions has
    /// finished. An empty `command_buffers` slice submits a bare signal.
    ///
    /// # Safety
    ///
    /// The command buffers must be fully recorded and must not be pending
    /// execution from an earlier submission. Each signal value must be greater
    /// than any value previously signaled on its semaphore.
    ///
    /// # Errors
    ///
    /// Returns an error if the submission fails (including device loss).
    pub unsafe fn submit(
        &self,
        command_buffers: &[vk::CommandBuffer],
        signals: &[(vk::Semaphore, u64)],
    ) -> RhiResult<()> {
        let semaphores: Vec<vk::Semaphore> = signals.iter().map(|(s, _)| *s).collect();
        let values: Vec<u64> = signals.iter().map(|(_, v)| *v).collect();

        let mut timeline_info =
            vk::TimelineSemaphoreSubmitInfo::default().signal_semaphore_values(&values);
        let submit_info = vk::SubmitInfo::default()
            .command_buffers(command_buffers)
            .signal_semaphores(&semaphores)
            .push_next(&mut timeline_info);

        let queue = self
            .queue
            .lock()
            .map_err(|_| RhiError::InvalidHandle("queue mutex poisoned".to_string()))?;
        unsafe {
            self.device
                .queue_submit(*queue, &[submit_info], vk::Fence::null())?;
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                tracing::error!("Failed to wait for device idle during drop: {:?}", e);
            }
            // Allocator memory must be released while the device still exists.
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: Device is Send+Sync because:
// - ash::Device and the instance are Send+Sync
// - the queue and the allocator are only reached through their mutexes
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
