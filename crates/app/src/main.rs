//! Frame ring demo.
//!
//! Drives a ring of frame slots for a fixed number of frames, either against
//! a thread simulating the GPU or against a real Vulkan queue, and reports
//! how often the CPU had to wait.

mod host;
mod scene;
mod vulkan;

use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use framering::{FenceError, RingStats};
use framering_core::{CameraConfig, DEFAULT_FRAMES_IN_FLIGHT, RingConfig};
use tracing::{error, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Simulated GPU thread.
    Host,
    /// First suitable Vulkan 1.2 device.
    Vulkan,
}

#[derive(Debug, Parser)]
#[command(version, about = "Drive a frame slot ring against a GPU or a stand-in")]
struct Args {
    #[arg(long, value_enum, default_value_t = Backend::Host)]
    backend: Backend,

    /// Frames to render.
    #[arg(long, default_value_t = 300)]
    frames: u64,

    /// Frame slots in the ring.
    #[arg(long, default_value_t = DEFAULT_FRAMES_IN_FLIGHT)]
    frames_in_flight: usize,

    /// Objects written into every slot.
    #[arg(long, default_value_t = 16)]
    objects: usize,

    /// Simulated GPU time per frame, host backend only.
    #[arg(long, default_value_t = 4)]
    gpu_frame_ms: u64,

    /// Give up on a fence wait after this many milliseconds.
    #[arg(long)]
    wait_timeout_ms: Option<u64>,

    /// Lose the simulated device after this many frames, host backend only.
    #[arg(long)]
    lose_device_after: Option<u64>,

    /// Enable the Vulkan validation layer.
    #[arg(long)]
    validation: bool,
}

/// Everything a backend needs to run; passed explicitly to each backend.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub ring: RingConfig,
    pub camera: CameraConfig,
    pub frames: u64,
    pub objects: usize,
    pub gpu_frame_cost: Duration,
    pub lose_device_after: Option<u64>,
    pub validation: bool,
}

impl Args {
    fn into_config(self) -> Result<DemoConfig> {
        anyhow::ensure!(self.objects > 0, "--objects must be at least 1");

        let ring = RingConfig::default()
            .with_frames_in_flight(self.frames_in_flight)
            .with_wait_timeout(self.wait_timeout_ms.map(Duration::from_millis));
        ring.validate()?;
        let camera = CameraConfig::default();
        camera.validate()?;

        Ok(DemoConfig {
            ring,
            camera,
            frames: self.frames,
            objects: self.objects,
            gpu_frame_cost: Duration::from_millis(self.gpu_frame_ms),
            lose_device_after: self.lose_device_after,
            validation: self.validation,
        })
    }
}

fn report(stats: &RingStats) {
    info!(
        "Ring finished: {} acquires, {} submissions, {} stalls ({:.1}%), {:?} blocked",
        stats.acquires,
        stats.submissions,
        stats.stalls,
        stats.stall_ratio() * 100.0,
        stats.stalled
    );
}

fn main() -> Result<()> {
    framering_core::init_logging();

    let args = Args::parse();
    let backend = args.backend;
    let config = args.into_config()?;
    info!(
        "Starting framering demo ({:?} backend, {} frames in flight)",
        backend, config.ring.frames_in_flight
    );

    let result = match backend {
        Backend::Host => host::run(&config),
        Backend::Vulkan => vulkan::run(&config),
    };

    match result {
        Ok(stats) => {
            report(&stats);
            Ok(())
        }
        Err(e) => {
            match e.downcast_ref::<FenceError>() {
                Some(FenceError::DeviceLost) => error!("GPU device lost, aborting"),
                Some(FenceError::Timeout { target, completed }) => error!(
                    "Fence wait timed out at target {} (completed {}), aborting",
                    target, completed
                ),
                _ => error!("Demo failed: {:#}", e),
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("framering-demo").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).into_config().unwrap();
        assert_eq!(config.ring.frames_in_flight, 3);
        assert_eq!(config.ring.wait_timeout, None);
        assert_eq!(config.gpu_frame_cost, Duration::from_millis(4));
    }

    #[test]
    fn test_rejects_zero_frames_in_flight() {
        assert!(parse(&["--frames-in-flight", "0"]).into_config().is_err());
    }

    #[test]
    fn test_parses_timeout_and_backend() {
        let args = parse(&["--backend", "vulkan", "--wait-timeout-ms", "250"]);
        assert_eq!(args.backend, Backend::Vulkan);
        let config = args.into_config().unwrap();
        assert_eq!(config.ring.wait_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_host_backend_runs_to_completion() {
        let config = parse(&["--frames", "12", "--objects", "4", "--gpu-frame-ms", "1"])
            .into_config()
            .unwrap();
        let stats = host::run(&config).unwrap();
        assert_eq!(stats.acquires, 12);
        assert_eq!(stats.submissions, 12);
    }

    #[test]
    fn test_host_backend_reports_device_loss() {
        let config = parse(&["--frames", "20", "--gpu-frame-ms", "1", "--lose-device-after", "5"])
            .into_config()
            .unwrap();
        let error = host::run(&config).unwrap_err();
        assert_eq!(error.downcast_ref::<FenceError>(), Some(&FenceError::DeviceLost));
    }
}
