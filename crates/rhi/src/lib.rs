//! Headless Vulkan layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate,
//! reduced to what a frame slot ring needs on a real GPU:
//! - Instance and device creation (no surface, no swapchain)
//! - Command pool and command buffer recording
//! - CPU-writable uniform buffers
//! - Timeline semaphores for the completion fence

mod error;

pub mod buffer;
pub mod command;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod sync;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
