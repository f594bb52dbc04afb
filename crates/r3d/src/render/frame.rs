//! Per-frame resource cache
//!
//! [`FrameContext`] holds what nearly every pass reads: the view state captured
//! at `begin`, the render flags, the active layers and the environment. It is
//! owned by the renderer and passed by reference to the passes.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::foundation::bounds::Frustum;
use crate::foundation::math::{utils::mat4_to_array, Mat4, Vec3};
use crate::render::api::{BufferId, BufferTarget, BufferUsage, RenderDevice};
use crate::render::camera::Camera;
use crate::render::environment::Environment;
use crate::render::RenderResult;

bitflags! {
    /// Global pipeline switches
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct RenderFlags: u32 {
        /// Apply FXAA as the last post effect
        const FXAA = 1 << 0;
        /// Linear filtering when blitting to the output
        const BLIT_LINEAR = 1 << 1;
        /// Letterbox the output to keep the internal aspect ratio
        const ASPECT_KEEP = 1 << 2;
        /// Reserved
        const STENCIL_TEST = 1 << 3;
        /// Reserved
        const DEPTH_PREPASS = 1 << 4;
        /// Sort forward draws back to front
        const TRANSPARENT_SORTING = 1 << 5;
        /// Sort deferred draws front to back
        const OPAQUE_SORTING = 1 << 6;
        /// Skip camera frustum culling of draw groups
        const NO_FRUSTUM_CULLING = 1 << 7;
        /// Half precision scene buffers
        const LOW_PRECISION_BUFFERS = 1 << 8;
    }
}

bitflags! {
    /// Visibility layers; a mesh is drawn when its mask intersects the active layers
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Layers: u32 {
        #[allow(missing_docs)] const LAYER_01 = 1 << 0;
        #[allow(missing_docs)] const LAYER_02 = 1 << 1;
        #[allow(missing_docs)] const LAYER_03 = 1 << 2;
        #[allow(missing_docs)] const LAYER_04 = 1 << 3;
        #[allow(missing_docs)] const LAYER_05 = 1 << 4;
        #[allow(missing_docs)] const LAYER_06 = 1 << 5;
        #[allow(missing_docs)] const LAYER_07 = 1 << 6;
        #[allow(missing_docs)] const LAYER_08 = 1 << 7;
        #[allow(missing_docs)] const LAYER_09 = 1 << 8;
        #[allow(missing_docs)] const LAYER_10 = 1 << 9;
        #[allow(missing_docs)] const LAYER_11 = 1 << 10;
        #[allow(missing_docs)] const LAYER_12 = 1 << 11;
        #[allow(missing_docs)] const LAYER_13 = 1 << 12;
        #[allow(missing_docs)] const LAYER_14 = 1 << 13;
        #[allow(missing_docs)] const LAYER_15 = 1 << 14;
        #[allow(missing_docs)] const LAYER_16 = 1 << 15;
        /// Every layer
        const ALL = 0xFFFF;
    }
}

impl Default for Layers {
    fn default() -> Self {
        Self::LAYER_01
    }
}

/// Camera state captured once per frame
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    /// World to view
    pub view: Mat4,
    /// View to clip
    pub proj: Mat4,
    /// View to world
    pub inv_view: Mat4,
    /// Clip to view
    pub inv_proj: Mat4,
    /// World to clip
    pub view_proj: Mat4,
    /// Culling frustum extracted from `view_proj`
    pub frustum: Frustum,
    /// Eye position
    pub position: Vec3,
    /// Render target aspect ratio
    pub aspect: f32,
    /// Near clip distance
    pub near: f32,
    /// Far clip distance
    pub far: f32,
}

impl ViewState {
    /// Capture the matrices of `camera` for a target of the given aspect ratio
    pub fn from_camera(camera: &Camera, aspect: f32, near: f32, far: f32) -> Self {
        let view = camera.view_matrix();
        let proj = camera.projection_matrix(aspect, near, far);
        let view_proj = proj * view;
        Self {
            inv_view: view.try_inverse().unwrap_or_else(Mat4::identity),
            inv_proj: proj.try_inverse().unwrap_or_else(Mat4::identity),
            frustum: Frustum::from_matrix(&view_proj),
            position: camera.position,
            view,
            proj,
            view_proj,
            aspect,
            near,
            far,
        }
    }
}

impl Default for ViewState {
    fn default() -> Self {
        Self::from_camera(&Camera::default(), 1.0, 0.05, 4000.0)
    }
}

/// Resource cache read by the passes
#[derive(Debug, Clone)]
pub struct FrameContext {
    /// View captured at `begin`
    pub view: ViewState,
    /// Pipeline switches
    pub flags: RenderFlags,
    /// Layers drawn this frame
    pub active_layers: Layers,
    /// Environment settings
    pub environment: Environment,
    /// Internal resolution
    pub resolution: (u32, u32),
}

impl FrameContext {
    /// Fresh context for the given internal resolution
    pub fn new(resolution: (u32, u32), flags: RenderFlags, environment: Environment) -> Self {
        Self {
            view: ViewState::default(),
            flags,
            active_layers: Layers::ALL,
            environment,
            resolution,
        }
    }

    /// Internal resolution as floats
    pub fn resolution_f32(&self) -> [f32; 2] {
        [self.resolution.0 as f32, self.resolution.1 as f32]
    }

    /// One over the internal resolution
    pub fn texel_size(&self) -> [f32; 2] {
        let [w, h] = self.resolution_f32();
        [1.0 / w.max(1.0), 1.0 / h.max(1.0)]
    }

    /// Internal aspect ratio
    pub fn aspect(&self) -> f32 {
        let [w, h] = self.resolution_f32();
        w / h.max(1.0)
    }
}

/// `ViewBlock` uniform block, std140 layout
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ViewBlock {
    /// World to view
    pub view: [f32; 16],
    /// View to world
    pub inv_view: [f32; 16],
    /// View to clip
    pub proj: [f32; 16],
    /// Clip to view
    pub inv_proj: [f32; 16],
    /// World to clip
    pub view_proj: [f32; 16],
    /// Eye position
    pub position: [f32; 3],
    /// Aspect ratio
    pub aspect: f32,
    /// Near clip distance
    pub near: f32,
    /// Far clip distance
    pub far: f32,
    _pad: [f32; 2],
}

impl ViewBlock {
    /// Pack a view state
    pub fn from_view(view: &ViewState) -> Self {
        Self {
            view: mat4_to_array(&view.view),
            inv_view: mat4_to_array(&view.inv_view),
            proj: mat4_to_array(&view.proj),
            inv_proj: mat4_to_array(&view.inv_proj),
            view_proj: mat4_to_array(&view.view_proj),
            position: view.position.into(),
            aspect: view.aspect,
            near: view.near,
            far: view.far,
            _pad: [0.0; 2],
        }
    }
}

/// Uniform buffer backing `ViewBlock`
#[derive(Debug)]
pub struct ViewUniforms {
    buffer: BufferId,
}

impl ViewUniforms {
    /// Allocate the buffer
    pub fn new(device: &mut dyn RenderDevice) -> RenderResult<Self> {
        let buffer = device.create_buffer()?;
        let block = ViewBlock::from_view(&ViewState::default());
        device.buffer_data(BufferTarget::Uniform, buffer, bytemuck::bytes_of(&block), BufferUsage::Dynamic);
        device.bind_buffer(BufferTarget::Uniform, None);
        Ok(Self { buffer })
    }

    /// Upload the frame's view state and bind it to `binding`
    pub fn upload_and_bind(&self, device: &mut dyn RenderDevice, view: &ViewState, binding: u32) {
        let block = ViewBlock::from_view(view);
        device.buffer_sub_data(BufferTarget::Uniform, self.buffer, 0, bytemuck::bytes_of(&block));
        device.bind_uniform_buffer_base(binding, self.buffer);
    }

    /// Release the buffer
    pub fn destroy(&self, device: &mut dyn RenderDevice) {
        device.delete_buffer(self.buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::bounds::BoundingBox;
    use approx::assert_relative_eq;

    #[test]
    fn test_view_state_frustum_matches_camera() {
        let camera = Camera::perspective(Vec3::new(0.0, 0.0, 10.0), Vec3::zeros(), 60.0);
        let view = ViewState::from_camera(&camera, 16.0 / 9.0, 0.1, 100.0);
        let ahead = BoundingBox::from_center_extents(Vec3::zeros(), Vec3::repeat(1.0));
        let behind = BoundingBox::from_center_extents(Vec3::new(0.0, 0.0, 20.0), Vec3::repeat(1.0));
        assert!(view.frustum.intersects_aabb(&ahead));
        assert!(!view.frustum.intersects_aabb(&behind));
        assert_relative_eq!(view.inv_view * view.view, Mat4::identity(), epsilon = 1e-5);
    }

    #[test]
    fn test_view_block_matches_std140_size() {
        assert_eq!(std::mem::size_of::<ViewBlock>(), 5 * 64 + 32);
        let view = ViewState::default();
        let block = ViewBlock::from_view(&view);
        assert_eq!(block.near, view.near);
        assert_eq!(block.position, <[f32; 3]>::from(view.position));
    }

    #[test]
    fn test_default_layers() {
        assert_eq!(Layers::default(), Layers::LAYER_01);
        assert!(Layers::ALL.contains(Layers::LAYER_16));
    }

    #[test]
    fn test_texel_size() {
        let ctx = FrameContext::new((200, 100), RenderFlags::empty(), Environment::default());
        assert_relative_eq!(ctx.texel_size()[0], 0.005);
        assert_relative_eq!(ctx.aspect(), 2.0);
    }
}
