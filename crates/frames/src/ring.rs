//! Rotating frame slots guarded by one completion fence.
//!
//! [`FrameSlotRing`] owns N slots and hands them out in strict round-robin
//! order. Before returning a slot whose previous submission may still be
//! read by the GPU, [`acquire`](FrameSlotRing::acquire) blocks on the fence
//! until that submission's target is reached. Because slots are reused in
//! submission order, the wait is always on the oldest outstanding batch, and
//! a single monotonic counter is enough for the whole ring.
//!
//! # Frame loop
//!
//! ```text
//! 1. acquire()   -> slot i (waits only if slot i's last target is unmet)
//! 2. write slot i's constants, record its commands, queue them
//! 3. submit(i)   -> advance the fence to T, queue "signal T", slot i in flight
//! 4. repeat; at shutdown, drain() waits once on the highest target
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use framering::{CompletionFence, FrameSlotRing, HostTimeline};
//!
//! let timeline = Arc::new(HostTimeline::new());
//! let fence = CompletionFence::new(Arc::clone(&timeline));
//! let mut ring = FrameSlotRing::new(fence, 3, |i| Ok::<_, std::convert::Infallible>(i))?;
//!
//! for _ in 0..3 {
//!     let slot = ring.acquire()?;
//!     let index = slot.index();
//!     ring.submit(index)?;
//! }
//!
//! // The GPU stand-in finishes everything, then the ring shuts down cleanly.
//! timeline.complete_through(3);
//! ring.drain()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::time::Duration;

use framering_core::{RingConfig, Timer};
use tracing::{debug, error, info};

use crate::error::FenceResult;
use crate::fence::CompletionFence;
use crate::slot::{FrameSlot, SlotState};
use crate::timeline::Timeline;

/// Counters describing how often the CPU had to wait for the GPU.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RingStats {
    /// Successful `acquire` calls.
    pub acquires: u64,
    /// Successful `submit` calls.
    pub submissions: u64,
    /// Acquires that had to block on the fence.
    pub stalls: u64,
    /// Total time spent blocked in `acquire`.
    pub stalled: Duration,
}

impl RingStats {
    /// Share of acquires that blocked, in `[0, 1]`.
    pub fn stall_ratio(&self) -> f64 {
        if self.acquires == 0 {
            0.0
        } else {
            self.stalls as f64 / self.acquires as f64
        }
    }
}

/// N frame slots reused round robin under a [`CompletionFence`].
///
/// # Thread Safety
///
/// Meant for a single producer thread. The GPU (or its stand-in) only ever
/// touches the fence's timeline.
///
/// # Drop
///
/// Dropping a ring with submissions in flight waits on the highest target,
/// bounded by the fence timeout, before the slot resources are released.
/// Errors from that wait are only logged; call [`drain`](Self::drain) to see
/// them.
pub struct FrameSlotRing<T: Timeline, R> {
    fence: CompletionFence<T>,
    slots: Box<[FrameSlot<R>]>,
    /// Index of the most recently acquired slot; starts at N-1 so the first
    /// acquire yields slot 0.
    cursor: usize,
    stats: RingStats,
}

impl<T: Timeline, R> FrameSlotRing<T, R> {
    /// Creates a ring of `frames_in_flight` slots, building each slot's
    /// resources with `make_resources(index)`.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `make_resources`.
    ///
    /// # Panics
    ///
    /// Panics if `frames_in_flight` is 0.
    pub fn new<E>(
        fence: CompletionFence<T>,
        frames_in_flight: usize,
        mut make_resources: impl FnMut(usize) -> Result<R, E>,
    ) -> Result<Self, E> {
        assert!(frames_in_flight > 0, "a frame ring needs at least one slot");

        let slots = (0..frames_in_flight)
            .map(|index| {
                let resources = make_resources(index)?;
                debug!("Created frame slot {}", index);
                Ok(FrameSlot::new(index, resources))
            })
            .collect::<Result<Vec<_>, E>>()?
            .into_boxed_slice();

        info!(
            "Frame ring created with {} frames in flight",
            frames_in_flight
        );

        Ok(Self {
            fence,
            slots,
            cursor: frames_in_flight - 1,
            stats: RingStats::default(),
        })
    }

    /// Validates `config` and creates a ring over `timeline` with the
    /// configured slot count and wait timeout.
    ///
    /// # Errors
    ///
    /// Returns the configuration error, or the first error produced by
    /// `make_resources`.
    pub fn with_config<E>(
        timeline: T,
        config: &RingConfig,
        make_resources: impl FnMut(usize) -> Result<R, E>,
    ) -> Result<Self, E>
    where
        E: From<framering_core::Error>,
    {
        config.validate()?;
        let fence = CompletionFence::with_timeout(timeline, config.wait_timeout);
        Self::new(fence, config.frames_in_flight, make_resources)
    }

    /// Selects the next slot and waits until the GPU is done with it.
    ///
    /// This is the only call in the frame loop that blocks, and it only
    /// blocks when the CPU is a full ring ahead of the GPU.
    ///
    /// # Errors
    ///
    /// Returns the fence error if the device is lost or a configured timeout
    /// expires. The ring position does not move in that case.
    ///
    /// # Panics
    ///
    /// Panics if the selected slot was acquired earlier and never submitted.
    pub fn acquire(&mut self) -> FenceResult<&mut FrameSlot<R>> {
        let next = (self.cursor + 1) % self.slots.len();
        let slot = &self.slots[next];
        assert!(
            slot.state() != SlotState::Recording,
            "frame slot {next} acquired again before it was submitted"
        );

        let target = slot.completion_target();
        if target != 0 {
            let completed = self.fence.completed_value()?;
            if completed < target {
                debug!(
                    "Frame slot {} still in flight (target {}, completed {}), waiting",
                    next, target, completed
                );
                let (result, waited) = Timer::measure(|| self.fence.wait_until(target));
                result?;
                self.stats.stalls += 1;
                self.stats.stalled += waited;
            }
        }

        self.cursor = next;
        self.stats.acquires += 1;

        let slot = &mut self.slots[next];
        slot.begin_recording();
        Ok(slot)
    }

    /// Marks slot `index` submitted: advances the fence, records the new
    /// target on the slot and queues the GPU signal.
    ///
    /// Call after the GPU work that reads the slot has been queued, so the
    /// signal lands behind it. Returns the slot's new completion target.
    ///
    /// # Errors
    ///
    /// Returns the fence error if the signal cannot be queued. The slot is
    /// left recording; such failures are fatal.
    ///
    /// # Panics
    ///
    /// Panics if the slot is not currently acquired (submit without acquire,
    /// or a second submit of the same acquisition).
    pub fn submit(&mut self, index: usize) -> FenceResult<u64> {
        assert!(
            index < self.slots.len(),
            "frame slot {index} out of range for a ring of {}",
            self.slots.len()
        );
        assert!(
            self.slots[index].state() == SlotState::Recording,
            "submit of frame slot {index} without a matching acquire"
        );

        let target = self.fence.advance();
        self.fence.signal(target)?;
        self.slots[index].mark_in_flight(target);
        self.stats.submissions += 1;

        debug!("Frame slot {} submitted with target {}", index, target);
        Ok(target)
    }

    /// Submits the most recently acquired slot.
    ///
    /// # Errors
    ///
    /// See [`submit`](Self::submit).
    pub fn submit_current(&mut self) -> FenceResult<u64> {
        self.submit(self.cursor)
    }

    /// Waits for every outstanding submission and marks all slots idle.
    ///
    /// Performs one wait on the highest target across the slots; since the
    /// fence is monotonic that covers every lower target too. Call before
    /// releasing anything the GPU might still read.
    ///
    /// # Errors
    ///
    /// Returns the fence error if the device is lost or a timeout expires;
    /// slots keep their state in that case.
    pub fn drain(&mut self) -> FenceResult<()> {
        let highest = self
            .slots
            .iter()
            .map(FrameSlot::completion_target)
            .max()
            .unwrap_or(0);

        info!("Draining frame ring (waiting for fence value {})", highest);
        self.fence.wait_until(highest)?;

        for slot in self.slots.iter_mut() {
            slot.mark_idle();
        }
        Ok(())
    }

    /// The most recently acquired slot.
    #[inline]
    pub fn current(&self) -> &FrameSlot<R> {
        &self.slots[self.cursor]
    }

    /// The most recently acquired slot, mutably.
    #[inline]
    pub fn current_mut(&mut self) -> &mut FrameSlot<R> {
        &mut self.slots[self.cursor]
    }

    /// Index of the most recently acquired slot.
    #[inline]
    pub fn current_index(&self) -> usize {
        self.cursor
    }

    /// Slot `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn slot(&self, index: usize) -> &FrameSlot<R> {
        &self.slots[index]
    }

    /// All slots in ring order.
    #[inline]
    pub fn slots(&self) -> &[FrameSlot<R>] {
        &self.slots
    }

    /// Number of slots (N).
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always `false`; a ring has at least one slot.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn fence(&self) -> &CompletionFence<T> {
        &self.fence
    }

    #[inline]
    pub fn stats(&self) -> RingStats {
        self.stats
    }

    /// Tears the ring down and returns the slot resources in ring order.
    ///
    /// # Panics
    ///
    /// Panics unless every slot is idle, i.e. [`drain`](Self::drain) ran
    /// after the last submission.
    pub fn into_resources(mut self) -> Vec<R> {
        if let Some(busy) = self.slots.iter().find(|s| s.state() != SlotState::Idle) {
            panic!(
                "frame ring torn down while slot {} is {:?}; drain it first",
                busy.index(),
                busy.state()
            );
        }

        std::mem::take(&mut self.slots)
            .into_vec()
            .into_iter()
            .map(FrameSlot::into_resources)
            .collect()
    }
}

impl<T: Timeline, R> Drop for FrameSlotRing<T, R> {
    fn drop(&mut self) {
        let outstanding = self
            .slots
            .iter()
            .filter(|s| s.state() == SlotState::InFlight)
            .map(FrameSlot::completion_target)
            .max()
            .unwrap_or(0);
        if outstanding == 0 {
            return;
        }

        // Slot resources are released right after this returns. A lost device
        // or the configured timeout ends the wait early.
        match self.fence.wait_until(outstanding) {
            Ok(()) => debug!(
                "Frame ring dropped with work in flight, waited for fence value {}",
                outstanding
            ),
            Err(e) => error!(
                "Frame ring dropped before fence value {} was reached: {}",
                outstanding, e
            ),
        }
    }
}
