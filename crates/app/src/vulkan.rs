//! Vulkan backend: the ring against a timeline semaphore on a real queue.

use std::sync::Arc;

use anyhow::Result;
use framering::vulkan::{GpuFrameResources, QueueTimeline};
use framering::{FenceError, FrameSlotRing, RingStats};
use framering_core::Timer;
use framering_rhi::device::Device;
use framering_rhi::instance::Instance;
use framering_rhi::physical_device::select_physical_device;
use tracing::{info, warn};

use crate::DemoConfig;
use crate::scene::OrbitScene;

/// Runs the frame loop on the first suitable Vulkan device.
pub fn run(config: &DemoConfig) -> Result<RingStats> {
    if config.lose_device_after.is_some() {
        warn!("--lose-device-after only applies to the host backend");
    }

    let instance = Arc::new(Instance::new("framering-demo", config.validation)?);
    let physical_device = select_physical_device(instance.handle())?;
    info!(
        "Using {} ({})",
        physical_device.device_name(),
        physical_device.device_type_name()
    );
    let device = Device::new(Arc::clone(&instance), &physical_device)?;

    let timeline = QueueTimeline::new(Arc::clone(&device))?;
    let mut ring = FrameSlotRing::with_config(timeline, &config.ring, |_| {
        Ok::<_, anyhow::Error>(GpuFrameResources::new(&device, config.objects)?)
    })?;
    let scene = OrbitScene::new(config.camera, config.objects);
    let mut timer = Timer::new();

    info!(
        "Vulkan backend: {} frames, {} objects",
        config.frames, config.objects
    );

    for _ in 0..config.frames {
        let total_time = timer.elapsed_secs();
        let delta_time = timer.delta_secs();

        let slot = ring.acquire()?;
        let index = slot.index();
        let resources = slot.resources_mut();
        scene.write_frame(resources, total_time, delta_time)?;
        resources.record().map_err(FenceError::from)?;
        // Safety: recorded just above, and the fence signal follows.
        unsafe { resources.submit() }.map_err(FenceError::from)?;
        ring.submit(index)?;
    }

    ring.drain()?;
    Ok(ring.stats())
}
