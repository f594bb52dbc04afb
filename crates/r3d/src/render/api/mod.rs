//! Backend abstraction for the rendering system
//!
//! The pipeline never talks to OpenGL directly. Every pass goes through the
//! [`RenderDevice`] trait, which keeps GL calls in one backend module and lets
//! tests run the whole frame against a recording device.

pub mod device;

pub use device::*;
