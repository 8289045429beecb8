//! A camera orbiting a grid of spinning objects.

use std::f32::consts::TAU;

use framering::{FrameResources, ObjectConstants, PassConstants, ResourceResult};
use framering_core::CameraConfig;
use glam::{Mat4, Quat, Vec3};

/// Spacing between grid cells in world units.
const GRID_SPACING: f32 = 3.0;

/// Scene whose constants are rewritten into every acquired frame slot.
#[derive(Debug, Clone)]
pub struct OrbitScene {
    camera: CameraConfig,
    object_count: usize,
    orbit_radius: f32,
    /// Radians per second.
    orbit_speed: f32,
}

impl OrbitScene {
    pub fn new(camera: CameraConfig, object_count: usize) -> Self {
        let side = grid_side(object_count) as f32;
        Self {
            camera,
            object_count,
            orbit_radius: (side * GRID_SPACING).max(GRID_SPACING) * 1.5,
            orbit_speed: TAU / 10.0,
        }
    }

    pub fn object_count(&self) -> usize {
        self.object_count
    }

    /// Camera position at `time` seconds.
    pub fn eye(&self, time: f32) -> Vec3 {
        let angle = time * self.orbit_speed;
        Vec3::new(
            self.orbit_radius * angle.cos(),
            self.orbit_radius * 0.5,
            self.orbit_radius * angle.sin(),
        )
    }

    /// World transform of object `index` at `time` seconds.
    pub fn object_world(&self, index: usize, time: f32) -> Mat4 {
        let side = grid_side(self.object_count);
        let offset = (side as f32 - 1.0) * GRID_SPACING * 0.5;
        let position = Vec3::new(
            (index % side) as f32 * GRID_SPACING - offset,
            0.0,
            (index / side) as f32 * GRID_SPACING - offset,
        );
        let spin = Quat::from_rotation_y(time + index as f32 * 0.1);
        Mat4::from_rotation_translation(spin, position)
    }

    /// Writes this frame's pass and object constants into `frame`.
    ///
    /// # Errors
    ///
    /// Returns an error if `frame` holds fewer object slots than the scene.
    pub fn write_frame(
        &self,
        frame: &mut dyn FrameResources,
        total_time: f32,
        delta_time: f32,
    ) -> ResourceResult<()> {
        let eye = self.eye(total_time);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let pass = PassConstants::new(&self.camera, view, eye, total_time, delta_time);
        frame.pass_constants().copy_data(0, &pass)?;

        let objects = frame.object_constants();
        for index in 0..self.object_count {
            let world = self.object_world(index, total_time);
            objects.copy_data(index, &ObjectConstants::new(world))?;
        }
        Ok(())
    }
}

/// Smallest square grid holding `count` objects.
fn grid_side(count: usize) -> usize {
    let mut side = 1;
    while side * side < count {
        side += 1;
    }
    side
}

#[cfg(test)]
mod tests {
    use super::*;
    use framering::HostFrameResources;

    #[test]
    fn test_grid_side() {
        assert_eq!(grid_side(0), 1);
        assert_eq!(grid_side(1), 1);
        assert_eq!(grid_side(4), 2);
        assert_eq!(grid_side(5), 3);
    }

    #[test]
    fn test_write_frame_fills_slot() {
        let scene = OrbitScene::new(CameraConfig::default(), 4);
        let mut resources = HostFrameResources::new(4);
        scene.write_frame(&mut resources, 1.5, 0.016).unwrap();

        let pass = resources.pass().read(0).unwrap();
        assert_eq!(pass.eye_pos, scene.eye(1.5));
        assert_eq!(pass.total_time, 1.5);
        assert_eq!(pass.delta_time, 0.016);

        for index in 0..4 {
            let object = resources.objects().read(index).unwrap();
            assert_eq!(object.world, scene.object_world(index, 1.5));
        }
    }

    #[test]
    fn test_write_frame_rejects_small_slot() {
        let scene = OrbitScene::new(CameraConfig::default(), 4);
        let mut resources = HostFrameResources::new(2);
        assert!(scene.write_frame(&mut resources, 0.0, 0.0).is_err());
    }

    #[test]
    fn test_grid_is_centered() {
        let scene = OrbitScene::new(CameraConfig::default(), 4);
        let first = scene.object_world(0, 0.0).w_axis.truncate();
        let last = scene.object_world(3, 0.0).w_axis.truncate();
        assert!((first + last).length() < 1e-5);
    }
}
