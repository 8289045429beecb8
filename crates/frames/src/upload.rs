//! Per-slot constant buffers.
//!
//! Every frame slot owns one pass-constant buffer and one object-constant
//! buffer. The CPU writes them between `acquire` and `submit`; after `submit`
//! they belong to the GPU until the slot's fence target is reached.
//!
//! [`UploadBuffer`] keeps the elements in host memory and is what the
//! simulated-GPU path uses. The Vulkan path writes through persistently mapped
//! uniform buffers instead (see `GpuUploadBuffer`). Both implement
//! [`ConstantBuffer`], so frame logic is written once against
//! [`FrameResources`].

use std::marker::PhantomData;

use bytemuck::Pod;

use crate::constants::{
    HOST_CONSTANT_BUFFER_ALIGNMENT, ObjectConstants, PassConstants, constant_buffer_stride,
};
use crate::error::{ResourceError, ResourceResult};

/// An array of `T` laid out at a constant-buffer stride.
pub trait ConstantBuffer<T: Pod> {
    /// Number of elements.
    fn len(&self) -> usize;

    /// Bytes between consecutive elements.
    fn stride(&self) -> usize;

    /// Overwrites element `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::OutOfRange`] if `index >= len()`.
    fn copy_data(&mut self, index: usize, value: &T) -> ResourceResult<()>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Host-memory constant buffer.
#[derive(Clone, Debug)]
pub struct UploadBuffer<T: Pod> {
    bytes: Vec<u8>,
    len: usize,
    stride: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> UploadBuffer<T> {
    /// Creates a zeroed buffer of `len` elements at the host alignment.
    pub fn new(len: usize) -> Self {
        Self::with_alignment(len, HOST_CONSTANT_BUFFER_ALIGNMENT)
    }

    /// Creates a zeroed buffer of `len` elements, each padded to `alignment`.
    pub fn with_alignment(len: usize, alignment: usize) -> Self {
        let stride = constant_buffer_stride(std::mem::size_of::<T>(), alignment);
        Self {
            bytes: vec![0; stride * len],
            len,
            stride,
            _marker: PhantomData,
        }
    }

    /// Reads element `index` back.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::OutOfRange`] if `index >= len()`.
    pub fn read(&self, index: usize) -> ResourceResult<T> {
        let offset = self.offset(index)?;
        Ok(bytemuck::pod_read_unaligned(
            &self.bytes[offset..offset + std::mem::size_of::<T>()],
        ))
    }

    /// The raw bytes, stride padding included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn offset(&self, index: usize) -> ResourceResult<usize> {
        if index >= self.len {
            return Err(ResourceError::OutOfRange {
                index,
                len: self.len,
            });
        }
        Ok(index * self.stride)
    }
}

impl<T: Pod> ConstantBuffer<T> for UploadBuffer<T> {
    fn len(&self) -> usize {
        self.len
    }

    fn stride(&self) -> usize {
        self.stride
    }

    fn copy_data(&mut self, index: usize, value: &T) -> ResourceResult<()> {
        let offset = self.offset(index)?;
        let size = std::mem::size_of::<T>();
        self.bytes[offset..offset + size].copy_from_slice(bytemuck::bytes_of(value));
        Ok(())
    }
}

/// What a frame writes into its slot.
pub trait FrameResources {
    /// The slot's single-element pass-constant buffer.
    fn pass_constants(&mut self) -> &mut dyn ConstantBuffer<PassConstants>;

    /// The slot's per-object constant buffer.
    fn object_constants(&mut self) -> &mut dyn ConstantBuffer<ObjectConstants>;
}

/// Frame slot resources for the host timeline.
///
/// The command recording context is a list of the object indices drawn this
/// frame; the simulated GPU only needs to know how much work was queued.
#[derive(Debug)]
pub struct HostFrameResources {
    pass: UploadBuffer<PassConstants>,
    objects: UploadBuffer<ObjectConstants>,
    draws: Vec<usize>,
}

impl HostFrameResources {
    /// Resources for a frame drawing up to `object_count` objects.
    pub fn new(object_count: usize) -> Self {
        Self {
            pass: UploadBuffer::new(1),
            objects: UploadBuffer::new(object_count),
            draws: Vec::with_capacity(object_count),
        }
    }

    /// Clears the recorded draws. Only valid once the slot is reacquired.
    pub fn reset(&mut self) {
        self.draws.clear();
    }

    /// Records a draw of object `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::OutOfRange`] for an object with no constants.
    pub fn record_draw(&mut self, index: usize) -> ResourceResult<()> {
        if index >= self.objects.len() {
            return Err(ResourceError::OutOfRange {
                index,
                len: self.objects.len(),
            });
        }
        self.draws.push(index);
        Ok(())
    }

    pub fn draws(&self) -> &[usize] {
        &self.draws
    }

    pub fn pass(&self) -> &UploadBuffer<PassConstants> {
        &self.pass
    }

    pub fn objects(&self) -> &UploadBuffer<ObjectConstants> {
        &self.objects
    }
}

impl FrameResources for HostFrameResources {
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
    use glam::{Mat4, Vec3};

    #[test]
    fn test_upload_buffer_stride_is_aligned() {
        let buffer = UploadBuffer::<ObjectConstants>::new(4);
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.stride(), 256);
        assert_eq!(buffer.as_bytes().len(), 1024);
    }

    #[test]
    fn test_copy_data_writes_only_its_element() {
        let mut buffer = UploadBuffer::<ObjectConstants>::new(3);
        let object = ObjectConstants::new(Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)));
        buffer.copy_data(1, &object).unwrap();

        assert_eq!(buffer.read(1).unwrap(), object);
        assert_eq!(buffer.read(0).unwrap().world, Mat4::ZERO);
        assert_eq!(buffer.read(2).unwrap().world, Mat4::ZERO);
    }

    #[test]
    fn test_copy_data_out_of_range() {
        let mut buffer = UploadBuffer::<ObjectConstants>::new(2);
        let result = buffer.copy_data(2, &ObjectConstants::default());
        assert!(matches!(
            result,
            Err(ResourceError::OutOfRange { index: 2, len: 2 })
        ));
        assert!(buffer.read(5).is_err());
    }

    #[test]
    fn test_custom_alignment() {
        let buffer = UploadBuffer::<PassConstants>::with_alignment(2, 64);
        assert_eq!(buffer.stride(), 448);
    }

    #[test]
    fn test_host_frame_resources_through_trait() {
        let mut resources = HostFrameResources::new(2);
        {
            let frame: &mut dyn FrameResources = &mut resources;
            frame
                .object_constants()
                .copy_data(1, &ObjectConstants::default())
                .unwrap();
            assert_eq!(frame.pass_constants().len(), 1);
        }
        assert_eq!(resources.objects().read(1).unwrap(), ObjectConstants::default());
    }

    #[test]
    fn test_record_draws() {
        let mut resources = HostFrameResources::new(2);
        resources.record_draw(0).unwrap();
        resources.record_draw(1).unwrap();
        assert!(resources.record_draw(2).is_err());
        assert_eq!(resources.draws(), &[0, 1]);

        resources.reset();
        assert!(resources.draws().is_empty());
    }
}
