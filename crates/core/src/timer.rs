//! Monotonic timer used for frame deltas and stall accounting.

use std::time::{Duration, Instant};

/// Monotonic timer with a fixed origin and a movable lap mark.
///
/// The origin drives `total_time` in pass constants, the lap mark drives
/// `delta_time`. The ring also uses one to measure how long `acquire` blocked.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    origin: Instant,
    lap: Instant,
}

impl Timer {
    /// Create a timer whose origin and lap mark are both now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            origin: now,
            lap: now,
        }
    }

    /// Time since the origin.
    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    /// Time since the origin, in seconds.
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Return the time since the previous lap and move the lap mark to now.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now.saturating_duration_since(self.lap);
        self.lap = now;
        delta
    }

    /// [`tick`](Self::tick) in seconds.
    pub fn delta_secs(&mut self) -> f32 {
        self.tick().as_secs_f32()
    }

    /// Run `f` and return its result together with how long it took.
    pub fn measure<T>(f: impl FnOnce() -> T) -> (T, Duration) {
        let start = Instant::now();
        let value = f();
        (value, start.elapsed())
    }

    /// Move both the origin and the lap mark to now.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
