//! External GPU state restoration
//!
//! The embedding application keeps drawing with the same context after `end`,
//! so the pipeline must hand back the state it expects. [`ExternalStateGuard`]
//! owns the device for the duration of a frame and puts that state back when
//! dropped, including on early error returns.

use crate::foundation::math::Rect;
use crate::render::api::{BlendEquation, BlendFactor, Capability, DepthFunc, Face, RenderDevice, RenderDeviceExt};

/// State the embedding application expects between frames
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExternalState {
    /// Viewport of the output surface
    pub viewport: Rect,
    /// Depth testing
    pub depth_test: bool,
    /// Back-face culling
    pub cull_face: bool,
    /// Alpha blending
    pub blend: bool,
}

impl ExternalState {
    /// Defaults of a 2D-oriented host: no depth test, back-face culling, alpha blending
    pub fn for_output(width: u32, height: u32) -> Self {
        Self {
            viewport: Rect::full(width, height),
            depth_test: false,
            cull_face: true,
            blend: true,
        }
    }

    /// Put the state back on the device
    pub fn apply(&self, device: &mut dyn RenderDevice) {
        device.bind_framebuffer(None);
        device.bind_vertex_array(None);
        device.use_program(None);
        device.viewport(self.viewport);

        device.set_capability(Capability::DepthTest, self.depth_test);
        device.set_capability(Capability::CullFace, self.cull_face);
        device.set_capability(Capability::Blend, self.blend);
        device.disable(Capability::ScissorTest);

        device.depth_func(DepthFunc::LessEqual);
        device.depth_mask(true);
        device.cull_face(Face::Back);
        device.blend_func(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);
        device.blend_equation(BlendEquation::Add);
    }
}

/// Exclusive access to the device for one frame, restoring external state on drop
pub struct ExternalStateGuard<'a> {
    device: &'a mut dyn RenderDevice,
    state: ExternalState,
}

impl<'a> ExternalStateGuard<'a> {
    /// Take the device for a frame
    pub fn acquire(device: &'a mut dyn RenderDevice, state: ExternalState) -> Self {
        Self { device, state }
    }

    /// Device used by the frame's passes
    pub fn device(&mut self) -> &mut dyn RenderDevice {
        &mut *self.device
    }
}

impl Drop for ExternalStateGuard<'_> {
    fn drop(&mut self) {
        self.state.apply(self.device);
        log::trace!("External state restored");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::RecordingDevice;

    #[test]
    fn test_guard_restores_on_drop() {
        let mut device = RecordingDevice::new();
        let log = device.log();
        {
            let mut guard = ExternalStateGuard::acquire(&mut device, ExternalState::for_output(800, 600));
            guard.device().enable(Capability::DepthTest);
            guard.device().disable(Capability::Blend);
            guard.device().blend_func(BlendFactor::One, BlendFactor::One);
        }
        let state = log.state();
        assert!(!state.depth_test);
        assert!(state.blend);
        assert!(state.cull_face);
        assert_eq!(state.blend_func, (BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha));
        assert_eq!(state.depth_func, DepthFunc::LessEqual);
        assert_eq!(state.viewport, Rect::full(800, 600));
        assert_eq!(state.program, None);
        assert_eq!(state.framebuffer, None);
    }

    #[test]
    fn test_guard_restores_after_early_return() {
        fn failing(device: &mut dyn RenderDevice) -> Result<(), ()> {
            let mut guard = ExternalStateGuard::acquire(device, ExternalState::for_output(64, 64));
            guard.device().enable(Capability::ScissorTest);
            Err(())
        }

        let mut device = RecordingDevice::new();
        let log = device.log();
        assert!(failing(&mut device).is_err());
        assert!(!log.state().scissor_test);
    }
}
