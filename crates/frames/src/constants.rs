//! Constant layouts written into a frame slot every frame.
//!
//! These structures match the shader constant-buffer layouts exactly. All use
//! `#[repr(C)]` for predictable memory layout and implement `Pod` and
//! `Zeroable` for safe byte casting into the slot's upload buffers.

use bytemuck::{Pod, Zeroable};
use framering_core::CameraConfig;
use glam::{Mat4, Vec2, Vec3};

/// Constant-buffer alignment used on the host path, and the largest
/// `minUniformBufferOffsetAlignment` seen on common hardware.
pub const HOST_CONSTANT_BUFFER_ALIGNMENT: usize = 256;

/// Rounds `size` up to the next multiple of `alignment`.
///
/// # Panics
///
/// Panics if `alignment` is not a power of two.
pub const fn constant_buffer_stride(size: usize, alignment: usize) -> usize {
    assert!(alignment.is_power_of_two(), "alignment must be a power of two");
    (size + alignment - 1) & !(alignment - 1)
}

/// Per-pass constants.
///
/// # Memory Layout
///
/// - Offset 0: view, inv_view, proj, inv_proj, view_proj, inv_view_proj (6 x 64 bytes)
/// - Offset 384: eye position (12 bytes) + padding (4 bytes)
/// - Offset 400: render target size (8 bytes), inverse size (8 bytes)
/// - Offset 416: near_z, far_z, total_time, delta_time (16 bytes)
/// - Total size: 432 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PassConstants {
    pub view: Mat4,
    pub inv_view: Mat4,
    pub proj: Mat4,
    pub inv_proj: Mat4,
    pub view_proj: Mat4,
    pub inv_view_proj: Mat4,
    /// Camera world position.
    pub eye_pos: Vec3,
    pub _padding: f32,
    /// Render target size in pixels.
    pub render_target_size: Vec2,
    pub inv_render_target_size: Vec2,
    pub near_z: f32,
    pub far_z: f32,
    /// Seconds since the demo started.
    pub total_time: f32,
    /// Seconds since the previous frame.
    pub delta_time: f32,
}

impl PassConstants {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Builds the pass constants for `camera` looking through `view`.
    ///
    /// The projection is a right-handed perspective over the camera's depth
    /// range; inverses and products are derived here.
    pub fn new(
        camera: &CameraConfig,
        view: Mat4,
        eye_pos: Vec3,
        total_time: f32,
        delta_time: f32,
    ) -> Self {
        debug_assert!(
            camera.near_z < camera.far_z,
            "degenerate depth range: near_z {} >= far_z {}",
            camera.near_z,
            camera.far_z
        );

        let proj = Mat4::perspective_rh(
            camera.fov_y,
            camera.aspect_ratio(),
            camera.near_z,
            camera.far_z,
        );
        let view_proj = proj * view;
        let size = Vec2::new(camera.width as f32, camera.height as f32);

        Self {
            view,
            inv_view: view.inverse(),
            proj,
            inv_proj: proj.inverse(),
            view_proj,
            inv_view_proj: view_proj.inverse(),
            eye_pos,
            _padding: 0.0,
            render_target_size: size,
            inv_render_target_size: size.recip(),
            near_z: camera.near_z,
            far_z: camera.far_z,
            total_time,
            delta_time,
        }
    }
}

/// Per-object constants.
///
/// # Memory Layout
///
/// - Offset 0: world matrix (64 bytes)
/// - Offset 64: texture transform (64 bytes)
/// - Total size: 128 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ObjectConstants {
    /// Object to world space.
    pub world: Mat4,
    pub tex_transform: Mat4,
}

impl ObjectConstants {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Object constants with an identity texture transform.
    pub fn new(world: Mat4) -> Self {
        Self {
            world,
            tex_transform: Mat4::IDENTITY,
        }
    }
}

impl Default for ObjectConstants {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_constants_size() {
        // 6 Mat4 (384) + Vec3 + pad (16) + 2 Vec2 (16) + 4 f32 (16) = 432 bytes
        assert_eq!(PassConstants::SIZE, 432);
        assert_eq!(std::mem::offset_of!(PassConstants, eye_pos), 384);
        assert_eq!(std::mem::offset_of!(PassConstants, near_z), 416);
    }

    #[test]
    fn test_object_constants_size() {
        assert_eq!(ObjectConstants::SIZE, 128);
    }

    #[test]
    fn test_constants_alignment() {
        assert_eq!(std::mem::align_of::<PassConstants>(), 16);
        assert_eq!(std::mem::align_of::<ObjectConstants>(), 16);
    }

    #[test]
    fn test_constant_buffer_stride() {
        assert_eq!(constant_buffer_stride(PassConstants::SIZE, 256), 512);
        assert_eq!(constant_buffer_stride(ObjectConstants::SIZE, 256), 256);
        assert_eq!(constant_buffer_stride(256, 256), 256);
        assert_eq!(constant_buffer_stride(ObjectConstants::SIZE, 64), 128);
        assert_eq!(constant_buffer_stride(0, 256), 0);
    }

    #[test]
    fn test_pass_constants_derivations() {
        let camera = CameraConfig::default();
        let eye = Vec3::new(0.0, 5.0, 10.0);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let pass = PassConstants::new(&camera, view, eye, 2.0, 0.016);

        assert!(pass.view_proj.abs_diff_eq(pass.proj * pass.view, 1e-5));
        assert!((pass.view * pass.inv_view).abs_diff_eq(Mat4::IDENTITY, 1e-4));
        assert_eq!(pass.render_target_size, Vec2::new(1280.0, 720.0));
        assert!((pass.inv_render_target_size.x - 1.0 / 1280.0).abs() < f32::EPSILON);
        assert_eq!(pass.near_z, 1.0);
        assert_eq!(pass.far_z, 1000.0);
        assert_eq!(pass.total_time, 2.0);
    }

    #[test]
    fn test_object_constants_default_is_identity() {
        let object = ObjectConstants::default();
        assert_eq!(object.world, Mat4::IDENTITY);
        assert_eq!(object.tex_transform, Mat4::IDENTITY);
    }

    #[test]
    fn test_bytes_cast() {
        let object = ObjectConstants::new(Mat4::from_translation(Vec3::X));
        let bytes: &[u8] = bytemuck::bytes_of(&object);
        assert_eq!(bytes.len(), ObjectConstants::SIZE);
    }
}
