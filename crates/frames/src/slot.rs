//! One in-flight frame's CPU-writable resources.

/// Where a slot is in its per-frame cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// No outstanding GPU work references the slot.
    Idle,
    /// Handed out by `acquire`, not yet submitted. The CPU owns the buffers.
    Recording,
    /// Submitted; the GPU may read the buffers until the slot's target is reached.
    InFlight,
}

/// A frame slot and the resources it guards.
///
/// `R` is whatever one frame writes into: constant buffers and a command
/// recording context. The ring owns every slot for its whole lifetime.
#[derive(Debug)]
pub struct FrameSlot<R> {
    index: usize,
    /// Fence value marking this slot's last submission finished; 0 = never submitted.
    completion_target: u64,
    state: SlotState,
    resources: R,
}

impl<R> FrameSlot<R> {
    pub(crate) fn new(index: usize, resources: R) -> Self {
        Self {
            index,
            completion_target: 0,
            state: SlotState::Idle,
            resources,
        }
    }

    /// Position in the ring, `0..N`.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Fence value of the slot's last submission, 0 if none is outstanding.
    #[inline]
    pub fn completion_target(&self) -> u64 {
        self.completion_target
    }

    #[inline]
    pub fn state(&self) -> SlotState {
        self.state
    }

    #[inline]
    pub fn resources(&self) -> &R {
        &self.resources
    }

    /// The slot's resources, writable only between `acquire` and `submit`.
    ///
    /// # Panics
    ///
    /// Panics unless the slot is [`SlotState::Recording`]; otherwise the GPU
    /// may still be reading them.
    #[inline]
    pub fn resources_mut(&mut self) -> &mut R {
        assert!(
            self.state == SlotState::Recording,
            "frame slot {} resources written while {:?}",
            self.index,
            self.state
        );
        &mut self.resources
    }

    pub(crate) fn begin_recording(&mut self) {
        self.state = SlotState::Recording;
    }

    pub(crate) fn mark_in_flight(&mut self, target: u64) {
        self.completion_target = target;
        self.state = SlotState::InFlight;
    }

    pub(crate) fn mark_idle(&mut self) {
        self.completion_target = 0;
        self.state = SlotState::Idle;
    }

    pub(crate) fn into_resources(self) -> R {
        self.resources
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_lifecycle() {
        let mut slot = FrameSlot::new(2, ());
        assert_eq!(slot.index(), 2);
        assert_eq!(slot.state(), SlotState::Idle);
        assert_eq!(slot.completion_target(), 0);

        slot.begin_recording();
        assert_eq!(slot.state(), SlotState::Recording);
        *slot.resources_mut() = ();

        slot.mark_in_flight(7);
        assert_eq!(slot.state(), SlotState::InFlight);
        assert_eq!(slot.completion_target(), 7);

        slot.mark_idle();
        assert_eq!(slot.state(), SlotState::Idle);
        assert_eq!(slot.completion_target(), 0);
    }

    #[test]
    #[should_panic(expected = "resources written while InFlight")]
    fn test_resources_mut_panics_while_in_flight() {
        let mut slot = FrameSlot::new(0, 0u32);
        slot.begin_recording();
        slot.mark_in_flight(1);
        *slot.resources_mut() = 1;
    }

    #[test]
    #[should_panic(expected = "resources written while Idle")]
    fn test_resources_mut_panics_before_acquire() {
        let mut slot = FrameSlot::new(0, 0u32);
        *slot.resources_mut() = 1;
    }
}
