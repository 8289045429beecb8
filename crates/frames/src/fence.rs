//! Monotonic completion fence.
//!
//! [`CompletionFence`] hands out strictly increasing targets, one per
//! submitted batch, and answers "has the engine reached target T" either by
//! polling or by blocking. Target 0 means "nothing submitted" and is always
//! satisfied.
//!
//! # Example
//!
//! ```
//! use framering::{CompletionFence, HostTimeline};
//!
//! let mut fence = CompletionFence::new(HostTimeline::new());
//! let target = fence.advance();
//! fence.signal(target)?;
//!
//! // Stand in for the GPU finishing the batch.
//! fence.timeline().retire_next();
//!
//! fence.wait_until(target)?;
//! assert!(fence.is_complete(target)?);
//! # Ok::<(), framering::FenceError>(())
//! ```

use std::time::Duration;

use tracing::{debug, trace};

use crate::error::FenceResult;
use crate::timeline::Timeline;

/// One application-wide ticket counter paired with an engine [`Timeline`].
#[derive(Debug)]
pub struct CompletionFence<T> {
    timeline: T,
    /// Last target handed out by [`advance`](Self::advance).
    next_target: u64,
    timeout: Option<Duration>,
}

impl<T: Timeline> CompletionFence<T> {
    /// Creates a fence whose waits never time out.
    pub fn new(timeline: T) -> Self {
        Self::with_timeout(timeline, None)
    }

    /// Creates a fence whose waits give up after `timeout`.
    pub fn with_timeout(timeline: T, timeout: Option<Duration>) -> Self {
        Self {
            timeline,
            next_target: 0,
            timeout,
        }
    }

    /// Increments the counter and returns the new target.
    ///
    /// The first call returns 1. Call at most once per submitted batch and
    /// follow it with [`signal`](Self::signal).
    pub fn advance(&mut self) -> u64 {
        self.next_target += 1;
        trace!("Fence advanced to {}", self.next_target);
        self.next_target
    }

    /// Last target returned by [`advance`](Self::advance), 0 if none.
    #[inline]
    pub fn last_target(&self) -> u64 {
        self.next_target
    }

    /// Bound applied to every blocking wait.
    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The engine side of the fence.
    #[inline]
    pub fn timeline(&self) -> &T {
        &self.timeline
    }

    /// Queues the engine command that marks `target` reached.
    ///
    /// # Errors
    ///
    /// Propagates the timeline's failure, including device loss.
    pub fn signal(&self, target: u64) -> FenceResult<()> {
        self.timeline.enqueue_signal(target)
    }

    /// Latest value acknowledged by the engine. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`FenceError::DeviceLost`](crate::FenceError::DeviceLost)
    /// rather than a stale value once the device is gone.
    pub fn completed_value(&self) -> FenceResult<u64> {
        self.timeline.completed_value()
    }

    /// Whether the engine has reached `target`. Target 0 is always complete.
    ///
    /// # Errors
    ///
    /// Same as [`completed_value`](Self::completed_value).
    pub fn is_complete(&self, target: u64) -> FenceResult<bool> {
        if target == 0 {
            return Ok(true);
        }
        Ok(self.completed_value()? >= target)
    }

    /// Blocks until the engine has reached `target`.
    ///
    /// Returns at once for target 0, whatever the fence state, and when the
    /// target is already reached.
    ///
    /// # Errors
    ///
    /// Returns [`FenceError::DeviceLost`](crate::FenceError::DeviceLost) if
    /// the device is lost and [`FenceError::Timeout`](crate::FenceError::Timeout)
    /// if a configured timeout expires.
    ///
    /// # Panics
    ///
    /// Panics if `target` was never handed out by [`advance`](Self::advance);
    /// such a wait could never finish.
    pub fn wait_until(&self, target: u64) -> FenceResult<()> {
        if target == 0 {
            return Ok(());
        }
        assert!(
            target <= self.next_target,
            "waiting on fence value {target} that was never issued (last issued {})",
            self.next_target
        );

        let completed = self.completed_value()?;
        if completed >= target {
            return Ok(());
        }

        debug!(
            "Waiting for fence value {} (completed {}, timeout {:?})",
            target, completed, self.timeout
        );
        self.timeline.wait_for_value(target, self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FenceError;
    use crate::timeline::HostTimeline;

    #[test]
    fn test_advance_is_strictly_increasing_from_one() {
        let mut fence = CompletionFence::new(HostTimeline::new());
        assert_eq!(fence.last_target(), 0);

        let targets: Vec<u64> = (0..5).map(|_| fence.advance()).collect();
        assert_eq!(targets, vec![1, 2, 3, 4, 5]);
        assert_eq!(fence.last_target(), 5);
    }

    #[test]
    fn test_advance_has_no_engine_side_effect() {
        let mut fence = CompletionFence::new(HostTimeline::new());
        fence.advance();
        assert_eq!(fence.timeline().highest_enqueued(), 0);
        assert_eq!(fence.completed_value(), Ok(0));
    }

    #[test]
    fn test_wait_until_zero_never_blocks() {
        let fence = CompletionFence::new(HostTimeline::new());
        assert_eq!(fence.wait_until(0), Ok(()));

        // Not even on a lost device.
        fence.timeline().lose_device();
        assert_eq!(fence.wait_until(0), Ok(()));
        assert_eq!(fence.is_complete(0), Ok(true));
    }

    #[test]
    fn test_wait_until_reached_target_returns_immediately() {
        let mut fence = CompletionFence::new(HostTimeline::new());
        let target = fence.advance();
        fence.signal(target).unwrap();
        fence.timeline().retire_next();

        assert_eq!(fence.wait_until(target), Ok(()));
        // Idempotent.
        assert_eq!(fence.wait_until(target), Ok(()));
    }

    #[test]
    fn test_is_complete_tracks_engine() {
        let mut fence = CompletionFence::new(HostTimeline::new());
        let target = fence.advance();
        fence.signal(target).unwrap();
        assert_eq!(fence.is_complete(target), Ok(false));

        fence.timeline().retire_next();
        assert_eq!(fence.is_complete(target), Ok(true));
    }

    #[test]
    fn test_timeout_is_reported_distinctly() {
        let mut fence =
            CompletionFence::with_timeout(HostTimeline::new(), Some(Duration::from_millis(10)));
        let target = fence.advance();
        fence.signal(target).unwrap();

        assert_eq!(
            fence.wait_until(target),
            Err(FenceError::Timeout {
                target,
                completed: 0
            })
        );
    }

    #[test]
    fn test_device_lost_is_surfaced() {
        let mut fence = CompletionFence::new(HostTimeline::new());
        let target = fence.advance();
        fence.signal(target).unwrap();
        fence.timeline().lose_device();

        assert_eq!(fence.completed_value(), Err(FenceError::DeviceLost));
        assert_eq!(fence.wait_until(target), Err(FenceError::DeviceLost));
        assert_eq!(fence.is_complete(target), Err(FenceError::DeviceLost));
    }

    #[test]
    #[should_panic(expected = "never issued")]
    fn test_wait_on_unissued_target_panics() {
        let fence = CompletionFence::new(HostTimeline::new());
        let _ = fence.wait_until(1);
    }
}
