//! Screen-space passes of the deferred path
//!
//! Everything here draws the full-screen quad with depth testing off. The
//! G-buffer is read-only except for the diffuse and specular targets, which
//! receive additive light contributions before [`compose`] merges them into the
//! scene color.

use crate::render::api::{BlendEquation, BlendFactor, Capability, RenderDeviceExt, TextureId, TextureTarget};
use crate::render::lights::LightKind;
use crate::render::passes::{upload_light, PassContext};
use crate::render::shader::Program;
use crate::render::targets::{PingPong, Target};
use crate::render::RenderResult;

fn screen_state(ctx: &mut PassContext<'_>) {
    ctx.device.disable(Capability::DepthTest);
    ctx.device.disable(Capability::CullFace);
    ctx.device.disable(Capability::Blend);
    ctx.device.depth_mask(false);
}

fn additive(ctx: &mut PassContext<'_>) {
    ctx.device.enable(Capability::Blend);
    ctx.device.blend_func(BlendFactor::One, BlendFactor::One);
    ctx.device.blend_equation(BlendEquation::Add);
}

fn bind_units(ctx: &mut PassContext<'_>, units: &[TextureId]) {
    for (unit, &texture) in units.iter().enumerate() {
        ctx.device.bind_texture_unit(unit as u32, TextureTarget::Texture2D, Some(texture));
    }
}

fn unbind_units(ctx: &mut PassContext<'_>, count: usize) {
    for unit in 0..count as u32 {
        ctx.device.bind_texture_unit(unit, TextureTarget::Texture2D, None);
    }
}

/// Separable depth and normal aware blur of a ping-pong pair, horizontal then vertical
fn bilateral_blur(ctx: &mut PassContext<'_>, pair: PingPong) -> RenderResult<()> {
    let programs = ctx.programs;
    let program = &programs.blur;
    program.bind(ctx.device);
    let normal = ctx.targets.texture(Target::Normal);
    let depth = ctx.targets.texture(Target::Depth);
    for direction in [[1.0, 0.0], [0.0, 1.0]] {
        let source = ctx.targets.texture(ctx.targets.current(pair));
        ctx.targets.bind_and_swap(ctx.device, pair, false)?;
        program.set_vec2(ctx.device, "uDirection", direction.into());
        bind_units(ctx, &[source, normal, depth]);
        ctx.draw_screen();
    }
    unbind_units(ctx, 3);
    Ok(())
}

/// Ambient occlusion at half resolution, then blurred
pub fn ssao(ctx: &mut PassContext<'_>) -> RenderResult<()> {
    screen_state(ctx);
    ctx.targets.bind_and_swap(ctx.device, PingPong::Ssao, false)?;

    let settings = &ctx.frame.environment.ssao;
    let program = &ctx.programs.ssao;
    program.bind(ctx.device);
    program.set_i32(ctx.device, "uSampleCount", settings.sample_count as i32);
    program.set_f32(ctx.device, "uRadius", settings.radius);
    program.set_f32(ctx.device, "uBias", settings.bias);
    program.set_f32(ctx.device, "uIntensity", settings.intensity);
    program.set_f32(ctx.device, "uPower", settings.power);

    let units = [ctx.targets.texture(Target::Depth), ctx.targets.texture(Target::Normal)];
    bind_units(ctx, &units);
    ctx.draw_screen();
    unbind_units(ctx, units.len());

    bilateral_blur(ctx, PingPong::Ssao)
}

/// Occlusion texture read by the light passes; white when SSAO is off
fn ssao_texture(ctx: &PassContext<'_>) -> TextureId {
    if ctx.frame.environment.ssao.enabled {
        ctx.targets.texture(ctx.targets.current(PingPong::Ssao))
    } else {
        ctx.defaults.white
    }
}

/// One scissored full-screen pass per visible light, added into diffuse and specular
pub fn lighting(ctx: &mut PassContext<'_>) -> RenderResult<()> {
    screen_state(ctx);
    ctx.targets.bind(ctx.device, &[Target::Diffuse, Target::Specular], 0)?;
    additive(ctx);

    let programs = ctx.programs;
    let program = &programs.lighting;
    program.bind(ctx.device);
    program.set_f32(ctx.device, "uSSAOLightAffect", ctx.frame.environment.ssao.light_affect);

    let units = [
        ctx.targets.texture(Target::Albedo),
        ctx.targets.texture(Target::Normal),
        ctx.targets.texture(Target::Depth),
        ssao_texture(ctx),
        ctx.targets.texture(Target::Orm),
    ];
    bind_units(ctx, &units);

    let (width, height) = ctx.frame.resolution;
    let view_proj = ctx.frame.view.view_proj;
    let lights = ctx.lights;
    ctx.device.enable(Capability::ScissorTest);
    for (id, light) in lights.visible() {
        ctx.device.scissor(lights.screen_rect(id, &view_proj, width, height));
        let shadowed = upload_light(ctx.device, program, light, None);
        let map = light.shadow.map().filter(|_| shadowed).map(|m| m.texture);
        if light.kind == LightKind::Omni {
            ctx.device.bind_texture_unit(6, TextureTarget::Cube, map);
        } else {
            ctx.device.bind_texture_unit(5, TextureTarget::Texture2D, map);
        }
        ctx.draw_screen();
    }
    ctx.device.disable(Capability::ScissorTest);

    ctx.device.bind_texture_unit(5, TextureTarget::Texture2D, None);
    ctx.device.bind_texture_unit(6, TextureTarget::Cube, None);
    unbind_units(ctx, units.len());
    ctx.device.disable(Capability::Blend);
    Ok(())
}

/// Indirect diffuse bounced from the directly lit diffuse buffer
pub fn ssil(ctx: &mut PassContext<'_>) -> RenderResult<()> {
    screen_state(ctx);
    ctx.targets.bind_and_swap(ctx.device, PingPong::Ssil, false)?;

    let settings = &ctx.frame.environment.ssil;
    let program = &ctx.programs.ssil;
    program.bind(ctx.device);
    program.set_f32(ctx.device, "uSampleCount", settings.sample_count as f32);
    program.set_f32(ctx.device, "uSampleRadius", settings.sample_radius);
    program.set_f32(ctx.device, "uSliceCount", settings.slice_count as f32);
    program.set_f32(ctx.device, "uHitThickness", settings.hit_thickness);
    program.set_f32(ctx.device, "uAoPower", settings.ao_power);
    program.set_f32(ctx.device, "uEnergy", settings.energy);

    let units = [
        ctx.targets.texture(Target::Depth),
        ctx.targets.texture(Target::Normal),
        ctx.targets.texture(Target::Diffuse),
    ];
    bind_units(ctx, &units);
    ctx.draw_screen();
    unbind_units(ctx, units.len());

    bilateral_blur(ctx, PingPong::Ssil)
}

/// Screen-space reflections of the lit diffuse buffer, with a mip chain for rough surfaces
pub fn ssr(ctx: &mut PassContext<'_>) -> RenderResult<()> {
    screen_state(ctx);
    ctx.targets.bind(ctx.device, &[Target::Ssr], 0)?;

    let env = &ctx.frame.environment;
    let program = &ctx.programs.ssr;
    program.bind(ctx.device);
    program.set_i32(ctx.device, "uMaxRaySteps", env.ssr.max_ray_steps as i32);
    program.set_i32(ctx.device, "uBinarySearchSteps", env.ssr.binary_search_steps as i32);
    program.set_f32(ctx.device, "uRayMarchLength", env.ssr.ray_march_length);
    program.set_f32(ctx.device, "uDepthThickness", env.ssr.depth_thickness);
    program.set_f32(ctx.device, "uDepthTolerance", env.ssr.depth_tolerance);
    program.set_f32(ctx.device, "uEdgeFadeStart", env.ssr.edge_fade_start);
    program.set_f32(ctx.device, "uEdgeFadeEnd", env.ssr.edge_fade_end);
    program.set_vec3(ctx.device, "uAmbientColor", env.ambient.color.to_vec3());
    program.set_f32(ctx.device, "uAmbientEnergy", env.ambient.energy);

    let units = [
        ctx.targets.texture(Target::Diffuse),
        ctx.targets.texture(Target::Albedo),
        ctx.targets.texture(Target::Normal),
        ctx.targets.texture(Target::Orm),
        ctx.targets.texture(Target::Depth),
    ];
    bind_units(ctx, &units);
    ctx.draw_screen();
    unbind_units(ctx, units.len());

    let reflections = ctx.targets.texture(Target::Ssr);
    ctx.device.generate_mipmap(TextureTarget::Texture2D, reflections);
    Ok(())
}

/// Ambient or image based light, added into diffuse and specular
pub fn ambient(ctx: &mut PassContext<'_>) -> RenderResult<()> {
    screen_state(ctx);
    ctx.targets.bind(ctx.device, &[Target::Diffuse, Target::Specular], 0)?;
    additive(ctx);

    let frame = ctx.frame;
    let env = &frame.environment;
    let ssil = if env.ssil.enabled { ctx.targets.texture(ctx.targets.current(PingPong::Ssil)) } else { ctx.defaults.black };
    let ssr = if env.ssr.enabled { ctx.targets.texture(Target::Ssr) } else { ctx.defaults.blank };
    let ssao = ssao_texture(ctx);
    let mip_count_ssr = ctx.targets.mip_count(Target::Ssr) as f32;

    let programs = ctx.programs;
    match &env.background.sky {
        Some(sky) => {
            let program: &Program = &programs.ambient_ibl;
            program.bind(ctx.device);
            program.set_vec4(ctx.device, "uQuatSkybox", env.background.rotation.coords);
            program.set_f32(ctx.device, "uAmbientEnergy", env.ambient.energy);
            program.set_f32(ctx.device, "uReflectEnergy", env.ambient.reflect);
            program.set_f32(ctx.device, "uMipCountSSR", mip_count_ssr);
            let units = [
                ctx.targets.texture(Target::Albedo),
                ctx.targets.texture(Target::Normal),
                ctx.targets.texture(Target::Depth),
                ssao,
                ssil,
                ssr,
                ctx.targets.texture(Target::Orm),
            ];
            bind_units(ctx, &units);
            ctx.device.bind_texture_unit(7, TextureTarget::Cube, Some(sky.irradiance));
            ctx.device.bind_texture_unit(8, TextureTarget::Cube, Some(sky.prefilter));
            ctx.device.bind_texture_unit(9, TextureTarget::Texture2D, Some(ctx.defaults.brdf_lut));
            ctx.draw_screen();
            ctx.device.bind_texture_unit(7, TextureTarget::Cube, None);
            ctx.device.bind_texture_unit(8, TextureTarget::Cube, None);
            ctx.device.bind_texture_unit(9, TextureTarget::Texture2D, None);
            unbind_units(ctx, units.len());
        }
        None => {
            let program: &Program = &programs.ambient;
            program.bind(ctx.device);
            program.set_vec3(ctx.device, "uAmbientColor", env.ambient.color.to_vec3());
            program.set_f32(ctx.device, "uAmbientEnergy", env.ambient.energy);
            program.set_f32(ctx.device, "uMipCountSSR", mip_count_ssr);
            let units = [ctx.targets.texture(Target::Albedo), ssao, ssil, ssr, ctx.targets.texture(Target::Orm)];
            bind_units(ctx, &units);
            ctx.draw_screen();
            unbind_units(ctx, units.len());
        }
    }

    ctx.device.disable(Capability::Blend);
    Ok(())
}

/// Merge diffuse and specular into the scene color
pub fn compose(ctx: &mut PassContext<'_>) -> RenderResult<()> {
    screen_state(ctx);
    ctx.targets.bind_and_swap(ctx.device, PingPong::Scene, false)?;
    ctx.programs.compose.bind(ctx.device);
    let units = [ctx.targets.texture(Target::Diffuse), ctx.targets.texture(Target::Specular)];
    bind_units(ctx, &units);
    ctx.draw_screen();
    unbind_units(ctx, units.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::render::backends::recording::{DeviceCommand, RecordingDevice, UniformValue};
    use crate::render::draw::DrawCollector;
    use crate::render::environment::Environment;
    use crate::render::frame::{FrameContext, RenderFlags};
    use crate::render::lights::LightManager;
    use crate::render::passes::PassResources;
    use crate::render::shader::ShaderRegistry;
    use crate::render::targets::RenderTargets;

    struct Fixture {
        device: RecordingDevice,
        frame: FrameContext,
        targets: RenderTargets,
        resources: PassResources,
        custom: ShaderRegistry,
        draws: DrawCollector,
        lights: LightManager,
    }

    impl Fixture {
        fn new(environment: Environment) -> Self {
            let mut device = RecordingDevice::new();
            let resources = PassResources::new(&mut device).unwrap();
            let targets = RenderTargets::new(&mut device, 64, 32, false).unwrap();
            Self {
                device,
                frame: FrameContext::new((64, 32), RenderFlags::empty(), environment),
                targets,
                resources,
                custom: ShaderRegistry::new(),
                draws: DrawCollector::new(),
                lights: LightManager::new(128),
            }
        }

        fn run(&mut self, pass: fn(&mut PassContext<'_>) -> RenderResult<()>) {
            let mut ctx = PassContext::new(
                &mut self.device,
                &self.frame,
                &mut self.targets,
                &self.resources,
                &self.custom,
                &self.draws,
                &self.lights,
            );
            pass(&mut ctx).unwrap();
        }
    }

    #[test]
    fn test_lighting_draws_once_per_visible_light() {
        let mut f = Fixture::new(Environment::default());
        f.lights.create(LightKind::Directional);
        let hidden = f.lights.create(LightKind::Omni);
        f.lights.get_mut(hidden).unwrap().enabled = false;
        let frustum = f.frame.view.frustum.clone();
        f.lights.update_and_cull(&frustum, Vec3::zeros());
        let log = f.device.log();

        f.run(lighting);
        assert_eq!(log.draws().len(), 1);
        assert!(!log.state().scissor_test);
        assert!(!log.state().blend);
    }

    #[test]
    fn test_ssao_blurs_into_the_current_target() {
        let mut f = Fixture::new(Environment::default());
        let log = f.device.log();
        f.run(ssao);
        assert_eq!(log.draws().len(), 3);
        assert_eq!(log.uniform_values("uDirection").len(), 2);
        assert_eq!(log.uniform_values("uSampleCount"), vec![UniformValue::I32(16)]);
    }

    #[test]
    fn test_disabled_screen_effects_fall_back_to_defaults() {
        let mut f = Fixture::new(Environment::default());
        let white = f.resources.defaults.white;
        let log = f.device.log();
        f.run(ambient);
        assert!(log.commands().contains(&DeviceCommand::BindTexture { target: TextureTarget::Texture2D, texture: Some(white) }));
        assert_eq!(log.draws().len(), 1);
    }

    #[test]
    fn test_compose_swaps_scene_targets() {
        let mut f = Fixture::new(Environment::default());
        let before = f.targets.current(PingPong::Scene);
        f.run(compose);
        assert_ne!(f.targets.current(PingPong::Scene), before);
    }
}
