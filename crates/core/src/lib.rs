//! Core utilities for the frame ring.
//!
//! This crate provides foundational types and utilities used across the workspace:
//! - Error types and result aliases
//! - Logging initialization
//! - Timer utilities
//! - Configuration for the ring and the demo camera

mod config;
mod error;
mod logging;
mod timer;

pub use config::{CameraConfig, DEFAULT_FRAMES_IN_FLIGHT, RingConfig};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::Timer;
