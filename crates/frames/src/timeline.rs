//! The execution-engine side of the completion fence.
//!
//! A [`Timeline`] is a monotonically increasing counter advanced by whatever
//! consumes submitted work (a GPU queue, or a thread standing in for one).
//! The CPU side queues "signal to `value`" commands behind its work, polls the
//! counter, and blocks until it reaches a value.
//!
//! [`HostTimeline`] implements the contract with a mutex-guarded counter and
//! condition variables. Its progress is driven from outside, either by a
//! thread that retires queued signals one by one or by a test that jumps the
//! counter directly.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use crate::error::{FenceError, FenceResult};

/// Counter advanced by the execution engine.
///
/// Implementations must keep `completed_value` non-decreasing and must block
/// in `wait_for_value` on an OS primitive rather than spinning.
pub trait Timeline: Send + Sync {
    /// Queues a command that sets the counter to `value` once every
    /// previously queued batch has finished.
    ///
    /// # Errors
    ///
    /// Returns [`FenceError::DeviceLost`] if the engine is gone.
    fn enqueue_signal(&self, value: u64) -> FenceResult<()>;

    /// Latest value acknowledged by the engine. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`FenceError::DeviceLost`] if the engine is gone.
    fn completed_value(&self) -> FenceResult<u64>;

    /// Blocks until the counter is at least `value`.
    ///
    /// # Errors
    ///
    /// Returns [`FenceError::Timeout`] when `timeout` expires first and
    /// [`FenceError::DeviceLost`] if the engine is lost while waiting.
    fn wait_for_value(&self, value: u64, timeout: Option<Duration>) -> FenceResult<()>;
}

impl<T: Timeline + ?Sized> Timeline for Arc<T> {
    fn enqueue_signal(&self, value: u64) -> FenceResult<()> {
        (**self).enqueue_signal(value)
    }

    fn completed_value(&self) -> FenceResult<u64> {
        (**self).completed_value()
    }

    fn wait_for_value(&self, value: u64, timeout: Option<Duration>) -> FenceResult<()> {
        (**self).wait_for_value(value, timeout)
    }
}

#[derive(Debug, Default)]
struct HostState {
    completed: u64,
    highest_enqueued: u64,
    pending: VecDeque<u64>,
    lost: bool,
    closed: bool,
}

/// Host-memory timeline driven by an external actor.
///
/// Queued signals are retired strictly in order, so the counter can never
/// move backwards or past a value that was not queued.
#[derive(Debug, Default)]
pub struct HostTimeline {
    state: Mutex<HostState>,
    /// Notified whenever `completed` moves or the device is lost.
    progressed: Condvar,
    /// Notified whenever a signal is queued or the timeline is closed.
    queued: Condvar,
}

impl HostTimeline {
    /// Creates a timeline at 0 with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest value ever queued.
    pub fn highest_enqueued(&self) -> u64 {
        self.state.lock().highest_enqueued
    }

    /// Number of queued signals not yet retired.
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Whether [`lose_device`](Self::lose_device) has been called.
    pub fn is_lost(&self) -> bool {
        self.state.lock().lost
    }

    /// Blocks until a signal is queued and returns it without retiring it.
    ///
    /// Returns `None` once the timeline is closed or lost, or when `timeout`
    /// expires with nothing queued.
    pub fn wait_for_work(&self, timeout: Option<Duration>) -> Option<u64> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        loop {
            if state.closed || state.lost {
                return None;
            }
            if let Some(&next) = state.pending.front() {
                return Some(next);
            }
            match deadline {
                None => self.queued.wait(&mut state),
                Some(deadline) => {
                    if self.queued.wait_until(&mut state, deadline).timed_out() {
                        return state
                            .pending
                            .front()
                            .copied()
                            .filter(|_| !(state.lost || state.closed));
                    }
                }
            }
        }
    }

    /// Retires the oldest queued signal and returns its value.
    pub fn retire_next(&self) -> Option<u64> {
        let mut state = self.state.lock();
        if state.lost {
            return None;
        }
        let value = state.pending.pop_front()?;
        state.completed = state.completed.max(value);
        drop(state);

        self.progressed.notify_all();
        Some(value)
    }

    /// Retires every queued signal up to and including `value` in one step.
    ///
    /// Values at or below the current counter are ignored.
    ///
    /// # Panics
    ///
    /// Panics if `value` was never queued; a real engine cannot complete work
    /// that was not submitted.
    pub fn complete_through(&self, value: u64) {
        let mut state = self.state.lock();
        assert!(
            value <= state.highest_enqueued,
            "cannot complete fence value {value}: highest queued signal is {}",
            state.highest_enqueued
        );
        if state.lost || value <= state.completed {
            return;
        }
        while state.pending.front().is_some_and(|&v| v <= value) {
            state.pending.pop_front();
        }
        state.completed = value;
        drop(state);

        debug!("Host timeline completed through {}", value);
        self.progressed.notify_all();
    }

    /// Puts the timeline into the device-lost state and wakes every waiter.
    pub fn lose_device(&self) {
        let mut state = self.state.lock();
        state.lost = true;
        state.pending.clear();
        drop(state);

        error!("Host timeline lost its device");
        self.progressed.notify_all();
        self.queued.notify_all();
    }

    /// Releases threads blocked in [`wait_for_work`](Self::wait_for_work).
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.queued.notify_all();
    }
}

impl Timeline for HostTimeline {
    fn enqueue_signal(&self, value: u64) -> FenceResult<()> {
        let mut state = self.state.lock();
        if state.lost {
            return Err(FenceError::DeviceLost);
        }
        if value <= state.highest_enqueued {
            return Err(FenceError::Backend(format!(
                "signal value {value} does not exceed previously queued {}",
                state.highest_enqueued
            )));
        }
        state.highest_enqueued = value;
        state.pending.push_back(value);
        drop(state);

        self.queued.notify_all();
        Ok(())
    }

    fn completed_value(&self) -> FenceResult<u64> {
        let state = self.state.lock();
        if state.lost {
            return Err(FenceError::DeviceLost);
        }
        Ok(state.completed)
    }

    fn wait_for_value(&self, value: u64, timeout: Option<Duration>) -> FenceResult<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        loop {
            if state.lost {
                return Err(FenceError::DeviceLost);
            }
            if state.completed >= value {
                return Ok(());
            }
            match deadline {
                None => self.progressed.wait(&mut state),
                Some(deadline) => {
                    if self.progressed.wait_until(&mut state, deadline).timed_out() {
                        if state.lost {
                            return Err(FenceError::DeviceLost);
                        }
                        if state.completed >= value {
                            return Ok(());
                        }
                        return Err(FenceError::Timeout {
                            target: value,
                            completed: state.completed,
                        });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_starts_at_zero() {
        let timeline = HostTimeline::new();
        assert_eq!(timeline.completed_value(), Ok(0));
        assert_eq!(timeline.highest_enqueued(), 0);
        assert_eq!(timeline.pending(), 0);
    }

    #[test]
    fn test_retire_in_order() {
        let timeline = HostTimeline::new();
        timeline.enqueue_signal(1).unwrap();
        timeline.enqueue_signal(2).unwrap();

        assert_eq!(timeline.retire_next(), Some(1));
        assert_eq!(timeline.completed_value(), Ok(1));
        assert_eq!(timeline.retire_next(), Some(2));
        assert_eq!(timeline.completed_value(), Ok(2));
        assert_eq!(timeline.retire_next(), None);
    }

    #[test]
    fn test_rejects_non_increasing_signal() {
        let timeline = HostTimeline::new();
        timeline.enqueue_signal(2).unwrap();
        assert!(matches!(
            timeline.enqueue_signal(2),
            Err(FenceError::Backend(_))
        ));
        assert!(matches!(
            timeline.enqueue_signal(1),
            Err(FenceError::Backend(_))
        ));
    }

    #[test]
    fn test_complete_through_is_monotonic() {
        let timeline = HostTimeline::new();
        for v in 1..=3 {
            timeline.enqueue_signal(v).unwrap();
        }
        timeline.complete_through(3);
        assert_eq!(timeline.completed_value(), Ok(3));
        assert_eq!(timeline.pending(), 0);

        // Going backwards is ignored.
        timeline.complete_through(1);
        assert_eq!(timeline.completed_value(), Ok(3));
    }

    #[test]
    #[should_panic(expected = "highest queued signal")]
    fn test_complete_through_unqueued_value_panics() {
        let timeline = HostTimeline::new();
        timeline.enqueue_signal(1).unwrap();
        timeline.complete_through(2);
    }

    #[test]
    fn test_wait_returns_immediately_when_reached() {
        let timeline = HostTimeline::new();
        timeline.enqueue_signal(1).unwrap();
        timeline.complete_through(1);
        assert_eq!(timeline.wait_for_value(1, None), Ok(()));
        assert_eq!(timeline.wait_for_value(0, None), Ok(()));
    }

    #[test]
    fn test_wait_times_out() {
        let timeline = HostTimeline::new();
        timeline.enqueue_signal(1).unwrap();
        let result = timeline.wait_for_value(1, Some(Duration::from_millis(10)));
        assert_eq!(
            result,
            Err(FenceError::Timeout {
                target: 1,
                completed: 0
            })
        );
    }

    #[test]
    fn test_wait_woken_by_other_thread() {
        let timeline = Arc::new(HostTimeline::new());
        timeline.enqueue_signal(1).unwrap();

        let gpu = {
            let timeline = Arc::clone(&timeline);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                timeline.retire_next()
            })
        };

        assert_eq!(timeline.wait_for_value(1, None), Ok(()));
        assert_eq!(gpu.join().unwrap(), Some(1));
    }

    #[test]
    fn test_lost_device_fails_queries_and_waits() {
        let timeline = Arc::new(HostTimeline::new());
        timeline.enqueue_signal(1).unwrap();

        let waiter = {
            let timeline = Arc::clone(&timeline);
            thread::spawn(move || timeline.wait_for_value(1, None))
        };

        thread::sleep(Duration::from_millis(20));
        timeline.lose_device();

        assert_eq!(waiter.join().unwrap(), Err(FenceError::DeviceLost));
        assert_eq!(timeline.completed_value(), Err(FenceError::DeviceLost));
        assert_eq!(timeline.enqueue_signal(2), Err(FenceError::DeviceLost));
        assert!(timeline.is_lost());
    }

    #[test]
    fn test_wait_for_work_sees_queued_signal() {
        let timeline = Arc::new(HostTimeline::new());
        let consumer = {
            let timeline = Arc::clone(&timeline);
            thread::spawn(move || timeline.wait_for_work(None))
        };

        thread::sleep(Duration::from_millis(10));
        timeline.enqueue_signal(7).unwrap();
        assert_eq!(consumer.join().unwrap(), Some(7));
        // Peeking does not retire.
        assert_eq!(timeline.pending(), 1);
    }

    #[test]
    fn test_close_releases_idle_consumer() {
        let timeline = Arc::new(HostTimeline::new());
        let consumer = {
            let timeline = Arc::clone(&timeline);
            thread::spawn(move || timeline.wait_for_work(None))
        };

        thread::sleep(Duration::from_millis(10));
        timeline.close();
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn test_wait_for_work_times_out_when_idle() {
        let timeline = HostTimeline::new();
        assert_eq!(timeline.wait_for_work(Some(Duration::from_millis(5))), None);
    }

    #[test]
    fn test_bounded_wait_for_work_ignores_pending_after_close() {
        let timeline = Arc::new(HostTimeline::new());
        let consumer = {
            let timeline = Arc::clone(&timeline);
            thread::spawn(move || timeline.wait_for_work(Some(Duration::from_millis(50))))
        };

        thread::sleep(Duration::from_millis(10));
        timeline.close();
        timeline.enqueue_signal(1).unwrap();
        assert_eq!(consumer.join().unwrap(), None);
        assert_eq!(timeline.wait_for_work(Some(Duration::from_millis(5))), None);
    }

    #[test]
    fn test_host_timeline_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HostTimeline>();
        assert_send_sync::<Arc<HostTimeline>>();
    }
}
