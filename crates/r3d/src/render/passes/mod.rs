//! # Render Passes
//!
//! One module per pipeline stage. Each pass receives a [`PassContext`] with
//! everything it may read and the targets it may write, and leaves the device
//! with depth test, blending and culling in whatever state the next pass sets
//! for itself. The renderer sequences the passes.

pub mod deferred;
pub mod post;
pub mod raster;
pub mod scene;
pub mod shadow;

use crate::foundation::math::utils;
use crate::render::api::RenderDevice;
use crate::render::draw::DrawCollector;
use crate::render::frame::FrameContext;
use crate::render::lights::{Light, LightKind, LightManager, SHADOW_NEAR};
use crate::render::primitives::Primitives;
use crate::render::shader::{Program, ShaderLibrary, ShaderRegistry};
use crate::render::targets::RenderTargets;
use crate::render::textures::DefaultTextures;
use crate::render::RenderResult;

pub use raster::InstanceBuffer;

/// GPU resources owned by the pipeline and shared by every pass
#[derive(Debug)]
pub struct PassResources {
    /// Built-in programs
    pub programs: ShaderLibrary,
    /// Fallback textures
    pub defaults: DefaultTextures,
    /// Screen quad and unit cube
    pub primitives: Primitives,
    /// Per-draw instance streams
    pub instances: InstanceBuffer,
}

impl PassResources {
    /// Create every shared resource, releasing what was built if a later step fails
    pub fn new(device: &mut dyn RenderDevice) -> RenderResult<Self> {
        let programs = ShaderLibrary::new(device)?;
        let defaults = match DefaultTextures::create(device) {
            Ok(defaults) => defaults,
            Err(e) => {
                programs.destroy(device);
                return Err(e);
            }
        };
        let primitives = match Primitives::new(device) {
            Ok(primitives) => primitives,
            Err(e) => {
                defaults.destroy(device);
                programs.destroy(device);
                return Err(e);
            }
        };
        let instances = match InstanceBuffer::new(device) {
            Ok(instances) => instances,
            Err(e) => {
                primitives.destroy(device);
                defaults.destroy(device);
                programs.destroy(device);
                return Err(e);
            }
        };
        Ok(Self { programs, defaults, primitives, instances })
    }

    /// Release everything
    pub fn destroy(&self, device: &mut dyn RenderDevice) {
        self.instances.destroy(device);
        self.primitives.destroy(device);
        self.defaults.destroy(device);
        self.programs.destroy(device);
    }
}

/// Borrowed view of the pipeline handed to each pass
pub struct PassContext<'a> {
    /// Device all commands go through
    pub device: &'a mut dyn RenderDevice,
    /// View, flags, layers and environment of the frame
    pub frame: &'a FrameContext,
    /// Intermediate textures and framebuffers
    pub targets: &'a mut RenderTargets,
    /// Built-in programs
    pub programs: &'a ShaderLibrary,
    /// Live custom shaders
    pub custom: &'a ShaderRegistry,
    /// Fallback textures
    pub defaults: &'a DefaultTextures,
    /// Screen quad and unit cube
    pub primitives: &'a Primitives,
    /// Per-draw instance streams
    pub instances: &'a InstanceBuffer,
    /// Draw lists of the frame
    pub draws: &'a DrawCollector,
    /// Lights of the scene
    pub lights: &'a LightManager,
}

impl<'a> PassContext<'a> {
    /// Assemble a context from its parts
    pub fn new(
        device: &'a mut dyn RenderDevice,
        frame: &'a FrameContext,
        targets: &'a mut RenderTargets,
        resources: &'a PassResources,
        custom: &'a ShaderRegistry,
        draws: &'a DrawCollector,
        lights: &'a LightManager,
    ) -> Self {
        Self {
            device,
            frame,
            targets,
            programs: &resources.programs,
            custom,
            defaults: &resources.defaults,
            primitives: &resources.primitives,
            instances: &resources.instances,
            draws,
            lights,
        }
    }

    /// Run `body` inside a named debug group
    pub fn group<R>(&mut self, label: &str, body: impl FnOnce(&mut Self) -> R) -> R {
        log::trace!("Pass {label} begin");
        self.device.push_debug_group(label);
        let result = body(self);
        self.device.pop_debug_group();
        log::trace!("Pass {label} end");
        result
    }

    /// Draw the full-screen quad with the bound program
    pub fn draw_screen(&mut self) {
        self.primitives.quad.draw(self.device);
    }
}

/// Shader encoding of a light type
pub fn light_type_uniform(kind: LightKind) -> i32 {
    match kind {
        LightKind::Directional => 0,
        LightKind::Spot => 1,
        LightKind::Omni => 2,
    }
}

/// Far plane of a light's shadow projection
pub fn light_far(light: &Light) -> f32 {
    match light.kind {
        LightKind::Directional => 2.0 * light.range,
        LightKind::Spot | LightKind::Omni => light.range,
    }
}

/// Upload one light's parameters, into element `index` of the array uniforms when given
///
/// Returns whether the light samples a shadow map.
pub fn upload_light(device: &mut dyn RenderDevice, program: &Program, light: &Light, index: Option<usize>) -> bool {
    let name = |base: &str| match index {
        Some(i) => format!("{base}[{i}]"),
        None => base.to_string(),
    };

    if index.is_some() {
        program.set_bool(device, &name("uLightEnabled"), true);
    }
    program.set_i32(device, &name("uLightType"), light_type_uniform(light.kind));
    program.set_vec3(device, &name("uLightColor"), light.color.to_vec3());
    program.set_f32(device, &name("uLightSpecular"), light.specular);
    program.set_f32(device, &name("uLightEnergy"), light.energy);
    program.set_vec3(device, &name("uLightPosition"), light.position);
    program.set_vec3(device, &name("uLightDirection"), light.direction);
    program.set_f32(device, &name("uLightRange"), light.range);
    program.set_f32(device, &name("uLightAttenuation"), light.attenuation);
    program.set_f32(device, &name("uLightInnerCutOff"), utils::deg_to_rad(light.inner_angle).cos());
    program.set_f32(device, &name("uLightOuterCutOff"), utils::deg_to_rad(light.outer_angle).cos());

    let map = light.shadow.map().filter(|_| light.shadow.enabled);
    program.set_bool(device, &name("uLightShadow"), map.is_some());
    if let Some(map) = map {
        program.set_f32(device, &name("uLightShadowTexelSize"), 1.0 / map.resolution.max(1) as f32);
        program.set_f32(device, &name("uLightShadowSoftness"), light.shadow.softness);
        program.set_f32(device, &name("uLightShadowDepthBias"), light.shadow.depth_bias);
        program.set_f32(device, &name("uLightShadowSlopeBias"), light.shadow.slope_bias);
        program.set_f32(device, &name("uLightNear"), SHADOW_NEAR);
        program.set_f32(device, &name("uLightFar"), light_far(light));
        program.set_mat4(device, &name("uMatLightVP"), &light.view_proj(0));
    }
    map.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::recording::{DeviceCommand, RecordingDevice};
    use crate::render::environment::Environment;
    use crate::render::frame::RenderFlags;

    #[test]
    fn test_group_brackets_body() {
        let mut device = RecordingDevice::new();
        let log = device.log();
        let resources = PassResources::new(&mut device).unwrap();
        let mut targets = RenderTargets::new(&mut device, 64, 64, false).unwrap();
        let frame = FrameContext::new((64, 64), RenderFlags::empty(), Environment::default());
        let custom = ShaderRegistry::new();
        let draws = DrawCollector::new();
        let lights = LightManager::new(256);
        log.clear();

        let mut ctx = PassContext::new(&mut device, &frame, &mut targets, &resources, &custom, &draws, &lights);
        ctx.group("compose", PassContext::draw_screen);

        let commands = log.commands();
        assert_eq!(commands.first(), Some(&DeviceCommand::PushDebugGroup("compose".to_string())));
        assert_eq!(commands.last(), Some(&DeviceCommand::PopDebugGroup));
        assert_eq!(log.draws().len(), 1);
    }

    #[test]
    fn test_spot_cutoffs_are_cosines() {
        use crate::render::backends::recording::UniformValue;
        use approx::assert_relative_eq;

        let mut device = RecordingDevice::new();
        let log = device.log();
        let resources = PassResources::new(&mut device).unwrap();
        let program = &resources.programs.lighting;
        program.bind(&mut device);
        let mut light = Light::new(LightKind::Spot);
        light.inner_angle = 60.0;

        assert!(!upload_light(&mut device, program, &light, None));
        match log.uniform_values("uLightInnerCutOff").last() {
            Some(UniformValue::F32(v)) => assert_relative_eq!(*v, 0.5, epsilon = 1e-6),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(log.uniform_values("uLightType").last(), Some(&UniformValue::I32(1)));
    }

    #[test]
    fn test_array_upload_targets_indexed_names() {
        use crate::render::backends::recording::UniformValue;

        let mut device = RecordingDevice::new();
        let log = device.log();
        let resources = PassResources::new(&mut device).unwrap();
        let program = &resources.programs.forward;
        program.bind(&mut device);
        upload_light(&mut device, program, &Light::new(LightKind::Omni), Some(2));

        assert_eq!(log.uniform_values("uLightType[2]"), vec![UniformValue::I32(2)]);
        assert!(log.uniform_values("uLightType[0]").is_empty());
    }
}
