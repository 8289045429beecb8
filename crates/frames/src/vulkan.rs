//! Vulkan backend: the completion fence on a timeline semaphore and the
//! per-slot GPU resources.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use bytemuck::Pod;
use framering_rhi::buffer::{Buffer, BufferUsage};
use framering_rhi::command::{CommandBuffer, CommandPool};
use framering_rhi::device::Device;
use framering_rhi::sync::TimelineSemaphore;
use framering_rhi::RhiResult;
use tracing::debug;

use crate::constants::{ObjectConstants, PassConstants, constant_buffer_stride};
use crate::error::{FenceError, FenceResult, ResourceError, ResourceResult};
use crate::timeline::Timeline;
use crate::upload::{ConstantBuffer, FrameResources};

/// Converts an optional wait bound into the nanosecond timeout Vulkan takes.
fn timeout_nanos(timeout: Option<Duration>) -> u64 {
    timeout.map_or(u64::MAX, |t| u64::try_from(t.as_nanos()).unwrap_or(u64::MAX))
}

/// Timeline backed by a Vulkan timeline semaphore on the device's queue.
///
/// Signals are bare queue submissions, so each one completes only after all
/// work queued before it.
pub struct QueueTimeline {
    semaphore: TimelineSemaphore,
}

impl QueueTimeline {
    /// Creates a timeline starting at 0.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        Ok(Self {
            semaphore: TimelineSemaphore::new(device, 0)?,
        })
    }

    pub fn semaphore(&self) -> &TimelineSemaphore {
        &self.semaphore
    }
}

impl Timeline for QueueTimeline {
    fn enqueue_signal(&self, value: u64) -> FenceResult<()> {
        Ok(self.semaphore.signal_on_queue(value)?)
    }

    fn completed_value(&self) -> FenceResult<u64> {
        Ok(self.semaphore.value()?)
    }

    fn wait_for_value(&self, value: u64, timeout: Option<Duration>) -> FenceResult<()> {
        match self.semaphore.wait(value, timeout_nanos(timeout)) {
            Ok(()) => Ok(()),
            Err(e) if e.is_timeout() => Err(FenceError::Timeout {
                target: value,
                completed: self.semaphore.value()?,
            }),
            Err(e) => Err(e.into()),
        }
    }
}

/// Constant buffer in persistently mapped uniform memory.
pub struct GpuUploadBuffer<T: Pod> {
    buffer: Buffer,
    len: usize,
    stride: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> GpuUploadBuffer<T> {
    /// Allocates `len` elements at the device's uniform offset alignment.
    ///
    /// # Errors
    ///
    /// Returns an error if `len` is 0 or the allocation fails.
    pub fn new(device: Arc<Device>, len: usize) -> RhiResult<Self> {
        let alignment = device.uniform_offset_alignment().max(16) as usize;
        let stride = constant_buffer_stride(std::mem::size_of::<T>(), alignment);
        let buffer = Buffer::new(device, BufferUsage::Uniform, (stride * len) as vk::DeviceSize)?;

        Ok(Self {
            buffer,
            len,
            stride,
            _marker: PhantomData,
        })
    }

    /// Reads element `index` back through the mapping.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::OutOfRange`] if `index >= len()`.
    pub fn read(&self, index: usize) -> ResourceResult<T> {
        let offset = self.offset(index)?;
        let mut value = T::zeroed();
        self.buffer
            .read_data(offset, bytemuck::bytes_of_mut(&mut value))?;
        Ok(value)
    }

    /// Byte offset of element `index`.
    fn offset(&self, index: usize) -> ResourceResult<vk::DeviceSize> {
        if index >= self.len {
            return Err(ResourceError::OutOfRange {
                index,
                len: self.len,
            });
        }
        Ok((index * self.stride) as vk::DeviceSize)
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }
}

impl<T: Pod> ConstantBuffer<T> for GpuUploadBuffer<T> {
    fn len(&self) -> usize {
        self.len
    }

    fn stride(&self) -> usize {
        self.stride
    }

    fn copy_data(&mut self, index: usize, value: &T) -> ResourceResult<()> {
        let offset = self.offset(index)?;
        self.buffer.write_data(offset, bytemuck::bytes_of(value))?;
        Ok(())
    }
}

/// Frame slot resources on a Vulkan device.
///
/// The command pool is the slot's command allocator: resetting it recycles
/// everything recorded for the slot's previous frame.
pub struct GpuFrameResources {
    device: Arc<Device>,
    pass: GpuUploadBuffer<PassConstants>,
    objects: GpuUploadBuffer<ObjectConstants>,
    // Declared before the pool; buffers are freed with their pool.
    command_buffer: CommandBuffer,
    command_pool: CommandPool,
}

impl GpuFrameResources {
    /// Creates the resources for a frame drawing up to `object_count` objects.
    ///
    /// # Errors
    ///
    /// Returns an error if any buffer or the command pool cannot be created.
    pub fn new(device: &Arc<Device>, object_count: usize) -> RhiResult<Self> {
        let command_pool = CommandPool::new(Arc::clone(device), device.queue_family_index())?;
        let command_buffer = CommandBuffer::new(Arc::clone(device), &command_pool)?;
        let pass = GpuUploadBuffer::new(Arc::clone(device), 1)?;
        let objects = GpuUploadBuffer::new(Arc::clone(device), object_count)?;

        debug!(
            "Frame resources created: pass stride {}, {} objects at stride {}",
            pass.stride(),
            object_count,
            objects.stride()
        );

        Ok(Self {
            device: Arc::clone(device),
            pass,
            objects,
            command_buffer,
            command_pool,
        })
    }

    /// Resets the slot's command pool and records this frame's commands.
    ///
    /// Takes `&mut self`: inside a ring the resources are only reachable
    /// mutably through a slot returned by `acquire`, whose previous
    /// submission has completed, so the pool is no longer in use by the GPU.
    ///
    /// # Errors
    ///
    /// Returns an error if resetting or recording fails.
    pub fn record(&mut self) -> RhiResult<()> {
        self.command_pool.reset()?;
        self.command_buffer.begin()?;
        self.command_buffer.transfer_to_uniform_barrier();
        self.command_buffer.end()
    }

    /// Submits the recorded command buffer to the device queue.
    ///
    /// # Safety
    ///
    /// [`record`](Self::record) must have run since the last submission, and
    /// the ring's `submit` must follow so the fence signal lands behind this
    /// work.
    ///
    /// # Errors
    ///
    /// Returns an error if the submission fails (including device loss).
    pub unsafe fn submit(&self) -> RhiResult<()> {
        unsafe { self.device.submit(&[self.command_buffer.handle()], &[]) }
    }

    pub fn pass(&self) -> &GpuUploadBuffer<PassConstants> {
        &self.pass
    }

    pub fn objects(&self) -> &GpuUploadBuffer<ObjectConstants> {
        &self.objects
    }
}

impl FrameResources for GpuFrameResources {
    fn pass_constants(&mut self) -> &mut dyn ConstantBuffer<PassConstants> {
        &mut self.pass
    }

    fn object_constants(&mut self) -> &mut dyn ConstantBuffer<ObjectConstants> {
        &mut self.objects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vulkan_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<QueueTimeline>();
        assert_send_sync::<GpuUploadBuffer<ObjectConstants>>();
        assert_send_sync::<GpuFrameResources>();
    }

    #[test]
    fn test_timeout_nanos() {
        assert_eq!(timeout_nanos(None), u64::MAX);
        assert_eq!(timeout_nanos(Some(Duration::from_millis(5))), 5_000_000);
        assert_eq!(timeout_nanos(Some(Duration::MAX)), u64::MAX);
    }
}
