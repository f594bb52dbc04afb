//! Post-processing chain
//!
//! Every effect reads the current scene target and writes the other one, then
//! swaps. Disabled effects are skipped by the renderer, so the chain costs
//! nothing beyond the tonemap when everything is off.

use crate::render::api::{BlendEquation, BlendFactor, Capability, RenderDeviceExt, TextureId, TextureTarget};
use crate::render::environment::{BloomMode, DofMode, FogMode, TonemapMode};
use crate::render::passes::PassContext;
use crate::render::targets::{PingPong, Target};
use crate::render::RenderResult;

fn fog_mode_uniform(mode: FogMode) -> i32 {
    match mode {
        FogMode::Disabled => 0,
        FogMode::Linear => 1,
        FogMode::Exp2 => 2,
        FogMode::Exp => 3,
    }
}

fn bloom_mode_uniform(mode: BloomMode) -> i32 {
    match mode {
        BloomMode::Disabled => 0,
        BloomMode::Mix => 1,
        BloomMode::Additive => 2,
        BloomMode::Screen => 3,
    }
}

fn tonemap_mode_uniform(mode: TonemapMode) -> i32 {
    match mode {
        TonemapMode::Linear => 0,
        TonemapMode::Reinhard => 1,
        TonemapMode::Filmic => 2,
        TonemapMode::Aces => 3,
        TonemapMode::Agx => 4,
    }
}

fn screen_state(ctx: &mut PassContext<'_>) {
    ctx.device.disable(Capability::DepthTest);
    ctx.device.disable(Capability::CullFace);
    ctx.device.disable(Capability::Blend);
    ctx.device.depth_mask(false);
}

/// Bind the scene's write side and return the texture it last wrote
fn swap_scene(ctx: &mut PassContext<'_>) -> RenderResult<TextureId> {
    let source = ctx.targets.texture(ctx.targets.current(PingPong::Scene));
    ctx.targets.bind_and_swap(ctx.device, PingPong::Scene, false)?;
    Ok(source)
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

/// Distance fog over the whole image, including the sky
pub fn fog(ctx: &mut PassContext<'_>) -> RenderResult<()> {
    screen_state(ctx);
    let color = swap_scene(ctx)?;

    let settings = &ctx.frame.environment.fog;
    let program = &ctx.programs.fog;
    program.bind(ctx.device);
    program.set_i32(ctx.device, "uFogMode", fog_mode_uniform(settings.mode));
    program.set_vec3(ctx.device, "uFogColor", settings.color.to_vec3());
    program.set_f32(ctx.device, "uFogStart", settings.start);
    program.set_f32(ctx.device, "uFogEnd", settings.end);
    program.set_f32(ctx.device, "uFogDensity", settings.density);
    program.set_f32(ctx.device, "uSkyAffect", settings.sky_affect);

    let units = [color, ctx.targets.texture(Target::Depth)];
    bind_units(ctx, &units);
    ctx.draw_screen();
    unbind_units(ctx, units.len());
    Ok(())
}

/// Circle-of-confusion blur around the focus distance
pub fn dof(ctx: &mut PassContext<'_>) -> RenderResult<()> {
    screen_state(ctx);
    let color = swap_scene(ctx)?;

    let settings = &ctx.frame.environment.dof;
    let program = &ctx.programs.dof;
    program.bind(ctx.device);
    program.set_f32(ctx.device, "uFocusPoint", settings.focus_point);
    program.set_f32(ctx.device, "uFocusScale", settings.focus_scale);
    program.set_f32(ctx.device, "uMaxBlurSize", settings.max_blur_size);
    program.set_i32(ctx.device, "uDebugMode", i32::from(settings.debug && settings.mode == DofMode::Enabled));

    let units = [color, ctx.targets.texture(Target::Depth)];
    bind_units(ctx, &units);
    ctx.draw_screen();
    unbind_units(ctx, units.len());
    Ok(())
}

/// Downsample the scene through the bloom mip chain, upsample it back, then merge
pub fn bloom(ctx: &mut PassContext<'_>) -> RenderResult<()> {
    screen_state(ctx);
    let frame = ctx.frame;
    let settings = &frame.environment.bloom;
    let levels = settings.max_level(ctx.targets.mip_count(Target::Bloom));
    let scene = ctx.targets.texture(ctx.targets.current(PingPong::Scene));
    let chain = ctx.targets.texture(Target::Bloom);

    let programs = ctx.programs;
    let down = &programs.bloom_down;
    down.bind(ctx.device);
    down.set_vec4(ctx.device, "uPrefilter", settings.prefilter().into());
    for level in 0..levels {
        ctx.targets.set_mip_level(ctx.device, Target::Bloom, level)?;
        let (source, texel) = if level == 0 {
            (scene, frame.texel_size())
        } else {
            (chain, ctx.targets.texel_size(Target::Bloom, level - 1))
        };
        down.set_vec2(ctx.device, "uTexelSize", texel.into());
        down.set_i32(ctx.device, "uDstLevel", level as i32);
        ctx.device.bind_texture_unit(0, TextureTarget::Texture2D, Some(source));
        ctx.draw_screen();
    }

    ctx.device.enable(Capability::Blend);
    ctx.device.blend_func(BlendFactor::One, BlendFactor::One);
    ctx.device.blend_equation(BlendEquation::Add);
    let up = &programs.bloom_up;
    up.bind(ctx.device);
    ctx.device.bind_texture_unit(0, TextureTarget::Texture2D, Some(chain));
    for level in (1..levels).rev() {
        ctx.targets.set_mip_level(ctx.device, Target::Bloom, level - 1)?;
        let [tx, ty] = ctx.targets.texel_size(Target::Bloom, level);
        up.set_vec2(ctx.device, "uFilterRadius", [tx * settings.filter_radius, ty * settings.filter_radius].into());
        up.set_f32(ctx.device, "uSrcLevel", level as f32);
        ctx.draw_screen();
    }
    ctx.device.disable(Capability::Blend);

    let color = swap_scene(ctx)?;
    let program = &programs.bloom;
    program.bind(ctx.device);
    program.set_i32(ctx.device, "uBloomMode", bloom_mode_uniform(settings.mode));
    program.set_f32(ctx.device, "uBloomIntensity", settings.intensity);
    bind_units(ctx, &[color, chain]);
    ctx.draw_screen();
    unbind_units(ctx, 2);
    Ok(())
}

/// Tonemap and color adjustment; always runs
pub fn output(ctx: &mut PassContext<'_>) -> RenderResult<()> {
    screen_state(ctx);
    let color = swap_scene(ctx)?;

    let env = &ctx.frame.environment;
    let program = &ctx.programs.output;
    program.bind(ctx.device);
    program.set_i32(ctx.device, "uTonemapMode", tonemap_mode_uniform(env.tonemap.mode));
    program.set_f32(ctx.device, "uTonemapExposure", env.tonemap.exposure);
    program.set_f32(ctx.device, "uTonemapWhite", env.tonemap.white);
    program.set_f32(ctx.device, "uBrightness", env.adjustment.brightness);
    program.set_f32(ctx.device, "uContrast", env.adjustment.contrast);
    program.set_f32(ctx.device, "uSaturation", env.adjustment.saturation);

    bind_units(ctx, &[color]);
    ctx.draw_screen();
    unbind_units(ctx, 1);
    Ok(())
}

/// Fast approximate anti-aliasing of the tonemapped image
pub fn fxaa(ctx: &mut PassContext<'_>) -> RenderResult<()> {
    screen_state(ctx);
    let color = swap_scene(ctx)?;
    let program = &ctx.programs.fxaa;
    program.bind(ctx.device);
    program.set_vec2(ctx.device, "uTexelSize", ctx.frame.texel_size().into());
    bind_units(ctx, &[color]);
    ctx.draw_screen();
    unbind_units(ctx, 1);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::recording::{RecordingDevice, UniformValue};
    use crate::render::draw::DrawCollector;
    use crate::render::environment::Environment;
    use crate::render::frame::{FrameContext, RenderFlags};
    use crate::render::lights::LightManager;
    use crate::render::passes::PassResources;
    use crate::render::shader::ShaderRegistry;
    use crate::render::targets::RenderTargets;

    fn run(environment: Environment, pass: fn(&mut PassContext<'_>) -> RenderResult<()>) -> (RecordingDevice, RenderTargets) {
        let mut device = RecordingDevice::new();
        let resources = PassResources::new(&mut device).unwrap();
        let mut targets = RenderTargets::new(&mut device, 256, 128, false).unwrap();
        let frame = FrameContext::new((256, 128), RenderFlags::empty(), environment);
        let custom = ShaderRegistry::new();
        let draws = DrawCollector::new();
        let lights = LightManager::new(128);
        device.log().clear();
        {
            let mut ctx = PassContext::new(&mut device, &frame, &mut targets, &resources, &custom, &draws, &lights);
            pass(&mut ctx).unwrap();
        }
        (device, targets)
    }

    #[test]
    fn test_fog_mode_encoding() {
        let mut env = Environment::default();
        env.fog.mode = FogMode::Exp;
        let (device, _) = run(env, fog);
        assert_eq!(device.log().uniform_values("uFogMode"), vec![UniformValue::I32(3)]);
    }

    #[test]
    fn test_each_effect_swaps_the_scene_once() {
        let (_, targets) = run(Environment::default(), output);
        assert_eq!(targets.current(PingPong::Scene), Target::Scene1);
        let (_, targets) = run(Environment::default(), fxaa);
        assert_eq!(targets.current(PingPong::Scene), Target::Scene1);
    }

    #[test]
    fn test_bloom_walks_the_mip_chain_down_and_up() {
        let mut env = Environment::default();
        env.bloom.mode = BloomMode::Additive;
        env.bloom.levels = 1.0;
        let (device, targets) = run(env, bloom);
        let log = device.log();
        let levels = targets.mip_count(Target::Bloom) as usize;

        assert_eq!(log.uniform_values("uDstLevel").len(), levels);
        assert_eq!(log.uniform_values("uSrcLevel").len(), levels - 1);
        assert_eq!(log.uniform_values("uBloomMode"), vec![UniformValue::I32(2)]);
        assert_eq!(log.draws().len(), 2 * levels);
    }
}
