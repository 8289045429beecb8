//! Frame resources and CPU/GPU synchronization.
//!
//! This crate lets one CPU thread prepare up to N frames ahead of the GPU:
//! - [`CompletionFence`]: one monotonic counter for all submitted work
//! - [`FrameSlotRing`]: N frame slots reused round robin under that fence
//! - [`Timeline`]: the engine seam, with [`HostTimeline`] for a simulated GPU
//!   and [`vulkan::QueueTimeline`] for a Vulkan timeline semaphore
//! - Per-frame constant layouts and the buffers they are written into

pub mod constants;
mod error;
mod fence;
mod ring;
mod slot;
mod timeline;
pub mod upload;
pub mod vulkan;

pub use constants::{ObjectConstants, PassConstants};
pub use error::{FenceError, FenceResult, ResourceError, ResourceResult};
pub use fence::CompletionFence;
pub use ring::{FrameSlotRing, RingStats};
pub use slot::{FrameSlot, SlotState};
pub use timeline::{HostTimeline, Timeline};
pub use upload::{ConstantBuffer, FrameResources, HostFrameResources, UploadBuffer};

/// Number of frames the CPU may prepare ahead of the GPU by default.
pub const FRAMES_IN_FLIGHT: usize = framering_core::DEFAULT_FRAMES_IN_FLIGHT;
