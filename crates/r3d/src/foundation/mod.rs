//! Foundation utilities shared by every part of the renderer
//!
//! Math aliases, bounding volumes, frame timing and logging bootstrap.

pub mod bounds;
pub mod logging;
pub mod math;
pub mod time;
