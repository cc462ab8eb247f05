//! Previz Core - Foundation types for the compositing engine
//!
//! This crate provides the fundamental types used throughout Previz:
//! - Error types shared by every subsystem
//! - Frame buffers (plain RGB8 images)
//! - Timecode parsing and formatting
//! - Easing curves for transitions
//! - Naive CPU raster kernels used by the frame generators

pub mod easing;
pub mod error;
pub mod frame;
pub mod raster;
pub mod time;

pub use easing::EasingCurve;
pub use error::{PrevizError, Result};
pub use frame::{Frame, SharedFrame};
pub use time::{frame_to_timecode, interpret_subclip_bounds, timecode_to_frame, Timecode};
