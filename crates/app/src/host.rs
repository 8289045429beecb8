//! Host backend: the ring against a thread standing in for the GPU.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use framering::{FrameSlotRing, HostFrameResources, HostTimeline, RingStats};
use framering_core::Timer;
use tracing::{debug, error, info, trace};

use crate::DemoConfig;
use crate::scene::OrbitScene;

/// Thread that retires queued fence signals after a fixed per-frame cost.
pub struct SimulatedGpu {
    timeline: Arc<HostTimeline>,
    worker: Option<JoinHandle<u64>>,
}

impl SimulatedGpu {
    /// Starts the worker. With `lose_device_after = Some(n)` the device is
    /// lost when signal `n + 1` reaches the front of the queue.
    pub fn spawn(
        timeline: Arc<HostTimeline>,
        frame_cost: Duration,
        lose_device_after: Option<u64>,
    ) -> Result<Self> {
        let worker_timeline = Arc::clone(&timeline);
        let worker = thread::Builder::new()
            .name("simulated-gpu".to_string())
            .spawn(move || run_gpu(&worker_timeline, frame_cost, lose_device_after))
            .context("failed to spawn the simulated GPU thread")?;

        Ok(Self {
            timeline,
            worker: Some(worker),
        })
    }
}

fn run_gpu(timeline: &HostTimeline, frame_cost: Duration, lose_device_after: Option<u64>) -> u64 {
    let mut retired = 0;
    while let Some(value) = timeline.wait_for_work(None) {
        if lose_device_after.is_some_and(|limit| value > limit) {
            timeline.lose_device();
            break;
        }
        thread::sleep(frame_cost);
        if timeline.retire_next().is_some() {
            trace!("Simulated GPU finished batch {}", value);
            retired += 1;
        }
    }
    retired
}

impl Drop for SimulatedGpu {
    fn drop(&mut self) {
        self.timeline.close();
        if let Some(worker) = self.worker.take() {
            match worker.join() {
                Ok(retired) => debug!("Simulated GPU stopped after {} batches", retired),
                Err(_) => error!("Simulated GPU thread panicked"),
            }
        }
    }
}

/// Runs the frame loop on the host timeline.
pub fn run(config: &DemoConfig) -> Result<RingStats> {
    let timeline = Arc::new(HostTimeline::new());
    let _gpu = SimulatedGpu::spawn(
        Arc::clone(&timeline),
        config.gpu_frame_cost,
        config.lose_device_after,
    )?;

    let mut ring = FrameSlotRing::with_config(Arc::clone(&timeline), &config.ring, |_| {
        Ok::<_, framering_core::Error>(HostFrameResources::new(config.objects))
    })?;
    let scene = OrbitScene::new(config.camera, config.objects);
    let mut timer = Timer::new();

    info!(
        "Host backend: {} frames, {} objects, simulated GPU cost {:?}",
        config.frames, config.objects, config.gpu_frame_cost
    );

    for _ in 0..config.frames {
        let total_time = timer.elapsed_secs();
        let delta_time = timer.delta_secs();

        let slot = ring.acquire()?;
        let index = slot.index();
        let resources = slot.resources_mut();
        resources.reset();
        scene.write_frame(resources, total_time, delta_time)?;
        for object in 0..scene.object_count() {
            resources.record_draw(object)?;
        }
        ring.submit(index)?;
    }

    ring.drain()?;
    Ok(ring.stats())
}
