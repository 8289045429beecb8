//! Configuration for the frame ring and the demo camera.

use std::time::Duration;

use crate::error::{Error, Result};

/// Number of frame slots used when nothing else is configured.
///
/// Three slots let the CPU run up to two frames ahead of the GPU while the
/// third is being recorded, without adding much input latency.
pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 3;

/// Upper bound on frame slots; every slot duplicates all per-frame constants.
const MAX_FRAMES_IN_FLIGHT: usize = 8;

/// Frame ring configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingConfig {
    /// Number of slots. Fixed for the lifetime of a ring.
    pub frames_in_flight: usize,
    /// Bound on a single fence wait. `None` waits forever.
    pub wait_timeout: Option<Duration>,
}

impl RingConfig {
    /// Sets the number of slots.
    pub fn with_frames_in_flight(mut self, frames_in_flight: usize) -> Self {
        self.frames_in_flight = frames_in_flight;
        self
    }

    /// Sets the fence wait bound.
    pub fn with_wait_timeout(mut self, wait_timeout: Option<Duration>) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for zero slots, more than eight slots, or a
    /// zero timeout.
    pub fn validate(&self) -> Result<()> {
        if self.frames_in_flight == 0 {
            return Err(Error::Config(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }
        if self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(Error::Config(format!(
                "frames_in_flight must be at most {MAX_FRAMES_IN_FLIGHT}, got {}",
                self.frames_in_flight
            )));
        }
        if self.wait_timeout == Some(Duration::ZERO) {
            return Err(Error::Config(
                "wait_timeout must be non-zero when set".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            wait_timeout: None,
        }
    }
}

/// Camera parameters for the per-pass constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraConfig {
    /// Vertical field of view in radians.
    pub fov_y: f32,
    /// Near plane distance.
    pub near_z: f32,
    /// Far plane distance.
    pub far_z: f32,
    /// Render target width in pixels.
    pub width: u32,
    /// Render target height in pixels.
    pub height: u32,
}

impl CameraConfig {
    /// Width over height.
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero-sized target, a field of view
    /// outside (0, π) or a degenerate depth range (`near_z >= far_z`).
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::Config(format!(
                "render target must be non-empty, got {}x{}",
                self.width, self.height
            )));
        }
        if !(self.fov_y > 0.0 && self.fov_y < std::f32::consts::PI) {
            return Err(Error::Config(format!(
                "fov_y must be in (0, pi), got {}",
                self.fov_y
            )));
        }
        if !(self.near_z > 0.0 && self.near_z < self.far_z) {
            return Err(Error::Config(format!(
                "depth range must satisfy 0 < near_z < far_z, got near_z={} far_z={}",
                self.near_z, self.far_z
            )));
        }
        Ok(())
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y: std::f32::consts::FRAC_PI_4,
            near_z: 1.0,
            far_z: 1000.0,
            width: 1280,
            height: 720,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_config_default() {
        let config = RingConfig::default();
        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(config.wait_timeout, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ring_config_rejects_zero_slots() {
        let config = RingConfig::default().with_frames_in_flight(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_ring_config_rejects_too_many_slots() {
        let config = RingConfig::default().with_frames_in_flight(9);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_ring_config_rejects_zero_timeout() {
        let config = RingConfig::default().with_wait_timeout(Some(Duration::ZERO));
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = RingConfig::default().with_wait_timeout(Some(Duration::from_millis(5)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_camera_config_rejects_equal_near_far() {
        let config = CameraConfig {
            near_z: 1.0,
            far_z: 1.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_camera_config_rejects_empty_target() {
        let config = CameraConfig {
            width: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_camera_config_default_is_valid() {
        let config = CameraConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.aspect_ratio() - 1280.0 / 720.0).abs() < f32::EPSILON);
    }
}
