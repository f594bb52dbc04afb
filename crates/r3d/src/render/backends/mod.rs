//! Backend implementations for the render module
//!
//! `gl` drives a real OpenGL 3.3 context through `glow`; `recording` runs the
//! pipeline headless and keeps a log of every call for inspection.

/// OpenGL backend over `glow`
pub mod gl;

/// Headless command recorder
pub mod recording;

pub use gl::GlowDevice;
pub use recording::{CommandLog, DeviceCommand, RecordingDevice};
