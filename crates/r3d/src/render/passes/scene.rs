//! Passes that rasterize scene geometry: G-buffer, decals, background, prepass and forward

use crate::foundation::math::utils;
use crate::render::api::{Capability, ClearFlags, DepthFunc, RenderDeviceExt, TextureTarget};
use crate::render::draw::{DrawCategory, DrawItem};
use crate::render::lights::{Light, LightKind};
use crate::render::passes::{raster, upload_light, PassContext};
use crate::render::shader::library::forward_slot;
use crate::render::targets::{PingPong, Target};
use crate::render::RenderResult;

/// Dynamic lights a forward draw can receive
pub const MAX_FORWARD_LIGHTS: usize = 4;

fn not_shadow_only(item: &DrawItem<'_>) -> bool {
    !item.call.mesh.shadow_cast_mode.is_shadow_only()
}

/// Clear every G-buffer attachment and the depth buffer
pub fn clear_gbuffer(ctx: &mut PassContext<'_>) -> RenderResult<()> {
    let mut attachments = Target::ALL_DEFERRED.to_vec();
    attachments.push(Target::Depth);
    ctx.targets.bind(ctx.device, &attachments, 0)?;
    ctx.device.depth_mask(true);
    ctx.device.clear_color([0.0, 0.0, 0.0, 0.0]);
    ctx.device.clear(ClearFlags::COLOR | ClearFlags::DEPTH);
    Ok(())
}

/// Clear depth only, used when the frame has no deferred geometry
pub fn clear_depth(ctx: &mut PassContext<'_>) -> RenderResult<()> {
    ctx.targets.bind(ctx.device, &[Target::Depth], 0)?;
    ctx.device.depth_mask(true);
    ctx.device.clear(ClearFlags::DEPTH);
    Ok(())
}

/// Opaque geometry into albedo, emission, normal, ORM and depth
pub fn geometry(ctx: &mut PassContext<'_>) -> RenderResult<()> {
    ctx.targets.bind(ctx.device, &Target::GBUFFER, 0)?;
    ctx.device.enable(Capability::DepthTest);
    ctx.device.depth_func(DepthFunc::Less);
    ctx.device.depth_mask(true);
    ctx.device.disable(Capability::Blend);

    ctx.programs.geometry.bind(ctx.device);
    let draws = ctx.draws;
    for item in draws.iter(&[DrawCategory::Deferred], true, not_shadow_only) {
        raster::raster_geometry(ctx, &item);
    }
    Ok(())
}

/// Project decals onto the G-buffer: depth-tested, depth writes off, no culling
pub fn decals(ctx: &mut PassContext<'_>) -> RenderResult<()> {
    ctx.targets.bind(ctx.device, &Target::GBUFFER, 0)?;
    ctx.device.enable(Capability::DepthTest);
    ctx.device.depth_func(DepthFunc::Less);
    ctx.device.depth_mask(false);
    ctx.device.disable(Capability::CullFace);

    ctx.programs.decal.bind(ctx.device);
    let depth = ctx.targets.texture(Target::Depth);
    ctx.device.bind_texture_unit(0, TextureTarget::Texture2D, Some(depth));

    let draws = ctx.draws;
    for item in draws.iter(&[DrawCategory::Decal], true, |_| true) {
        raster::raster_decal(ctx, &item);
    }

    ctx.device.bind_texture_unit(0, TextureTarget::Texture2D, None);
    ctx.device.disable(Capability::Blend);
    ctx.device.depth_mask(true);
    Ok(())
}

/// Sky or flat color wherever the depth buffer is still clear
pub fn background(ctx: &mut PassContext<'_>) -> RenderResult<()> {
    let scene = ctx.targets.current(PingPong::Scene);
    ctx.targets.bind(ctx.device, &[scene, Target::Depth], 0)?;
    ctx.device.enable(Capability::DepthTest);
    ctx.device.depth_func(DepthFunc::LessEqual);
    ctx.device.depth_mask(false);
    ctx.device.disable(Capability::Blend);
    ctx.device.disable(Capability::CullFace);

    let frame = ctx.frame;
    let background = &frame.environment.background;
    match &background.sky {
        Some(sky) => {
            let program = &ctx.programs.skybox;
            program.bind(ctx.device);
            program.set_vec4(ctx.device, "uRotation", background.rotation.coords);
            program.set_f32(ctx.device, "uSkyEnergy", background.energy);
            ctx.device.bind_texture_unit(0, TextureTarget::Cube, Some(sky.cubemap));
            ctx.primitives.draw_cube(ctx.device);
            ctx.device.bind_texture_unit(0, TextureTarget::Cube, None);
        }
        None => {
            let program = &ctx.programs.background;
            program.bind(ctx.device);
            let mut color = background.color.to_vec4();
            color.x *= background.energy;
            color.y *= background.energy;
            color.z *= background.energy;
            program.set_vec4(ctx.device, "uColor", color);
            ctx.draw_screen();
        }
    }

    ctx.device.depth_mask(true);
    Ok(())
}

/// Depth of alpha-tested transparent geometry, so the forward pass only shades the nearest surface
pub fn prepass(ctx: &mut PassContext<'_>) -> RenderResult<()> {
    ctx.targets.bind(ctx.device, &[Target::Depth], 0)?;
    ctx.device.enable(Capability::DepthTest);
    ctx.device.depth_func(DepthFunc::Less);
    ctx.device.depth_mask(true);
    ctx.device.disable(Capability::Blend);

    let programs = ctx.programs;
    let program = &programs.depth;
    program.bind(ctx.device);
    program.set_mat4(ctx.device, "uMatVP", &ctx.frame.view.view_proj);

    let draws = ctx.draws;
    for item in draws.iter(&[DrawCategory::Prepass], true, not_shadow_only) {
        raster::raster_depth(ctx, program, &item, false);
    }
    Ok(())
}

/// Lights a forward draw receives, in manager order
///
/// Lights beyond [`MAX_FORWARD_LIGHTS`] are dropped; the second value counts them.
pub fn select_forward_lights<'l>(
    lights: impl IntoIterator<Item = &'l Light>,
    item: &DrawItem<'_>,
) -> (Vec<&'l Light>, usize) {
    let aabb = item.call.world_aabb(item.group);
    let mut selected = Vec::with_capacity(MAX_FORWARD_LIGHTS);
    let mut dropped = 0;
    for light in lights.into_iter().filter(|l| l.affects(&aabb)) {
        if selected.len() < MAX_FORWARD_LIGHTS {
            selected.push(light);
        } else {
            dropped += 1;
        }
    }
    (selected, dropped)
}

/// Lit transparent geometry, back to front when sorting is enabled
pub fn forward(ctx: &mut PassContext<'_>) -> RenderResult<()> {
    let scene = ctx.targets.current(PingPong::Scene);
    ctx.targets.bind(ctx.device, &[scene, Target::Depth], 0)?;
    ctx.device.enable(Capability::DepthTest);
    ctx.device.depth_func(DepthFunc::LessEqual);
    ctx.device.depth_mask(false);

    let program = &ctx.programs.forward;
    program.bind(ctx.device);
    bind_ambient(ctx);

    let draws = ctx.draws;
    let lights = ctx.lights;
    let mut dropped_total = 0;
    for item in draws.iter(&[DrawCategory::Prepass, DrawCategory::Forward], true, not_shadow_only) {
        let (selected, dropped) = select_forward_lights(lights.visible().map(|(_, l)| l), &item);
        dropped_total += dropped;
        raster_forward(ctx, &item, &selected);
    }
    if dropped_total > 0 {
        log::trace!("Forward pass dropped {dropped_total} light assignments over the cap of {MAX_FORWARD_LIGHTS}");
    }

    for unit in [forward_slot::IRRADIANCE, forward_slot::PREFILTER] {
        ctx.device.bind_texture_unit(unit, TextureTarget::Cube, None);
    }
    ctx.device.bind_texture_unit(forward_slot::BRDF_LUT, TextureTarget::Texture2D, None);
    ctx.device.disable(Capability::Blend);
    ctx.device.depth_mask(true);
    Ok(())
}

fn bind_ambient(ctx: &mut PassContext<'_>) {
    let program = &ctx.programs.forward;
    let env = &ctx.frame.environment;
    program.set_vec3(ctx.device, "uAmbientColor", env.ambient.color.to_vec3());
    program.set_f32(ctx.device, "uAmbientEnergy", env.ambient.energy);
    program.set_f32(ctx.device, "uReflectEnergy", env.ambient.reflect);
    program.set_vec4(ctx.device, "uQuatSkybox", env.background.rotation.coords);
    program.set_bool(ctx.device, "uHasSkybox", env.background.sky.is_some());
    if let Some(sky) = &env.background.sky {
        ctx.device.bind_texture_unit(forward_slot::IRRADIANCE, TextureTarget::Cube, Some(sky.irradiance));
        ctx.device.bind_texture_unit(forward_slot::PREFILTER, TextureTarget::Cube, Some(sky.prefilter));
    }
    ctx.device.bind_texture_unit(forward_slot::BRDF_LUT, TextureTarget::Texture2D, Some(ctx.defaults.brdf_lut));
}

/// One forward draw with its selected lights
pub fn raster_forward(ctx: &mut PassContext<'_>, item: &DrawItem<'_>, lights: &[&Light]) {
    let material = &item.call.material;
    let program = &ctx.programs.forward;
    let device = &mut *ctx.device;

    program.set_mat4(device, "uMatModel", &item.group.transform);
    program.set_mat4(device, "uMatNormal", &utils::normal_matrix(&item.group.transform));
    program.set_vec4(device, "uAlbedoColor", material.albedo.color.to_vec4());
    program.set_vec3(device, "uEmissionColor", material.emission.color.to_vec3());
    program.set_f32(device, "uEmissionEnergy", material.emission.energy);
    program.set_f32(device, "uNormalScale", material.normal.scale);
    program.set_f32(device, "uOcclusion", material.orm.occlusion);
    program.set_f32(device, "uRoughness", material.orm.roughness);
    program.set_f32(device, "uMetalness", material.orm.metalness);
    program.set_f32(device, "uAlphaCutoff", material.alpha_cutoff);
    program.set_vec2(device, "uTexCoordOffset", material.uv_offset);
    program.set_vec2(device, "uTexCoordScale", material.uv_scale);
    program.set_bool(device, "uInstancing", item.group.instances.is_some());
    program.set_bool(device, "uSkinning", item.group.skin_texture.is_some());
    program.set_i32(device, "uBillboard", material.billboard_mode.as_uniform());

    for i in 0..MAX_FORWARD_LIGHTS {
        let shadow_2d = forward_slot::SHADOW_2D + i as u32;
        let shadow_cube = forward_slot::SHADOW_CUBE + i as u32;
        match lights.get(i) {
            Some(light) => {
                let shadowed = upload_light(device, program, light, Some(i));
                let map = light.shadow.map().filter(|_| shadowed).map(|m| m.texture);
                if light.kind == LightKind::Omni {
                    device.bind_texture_unit(shadow_cube, TextureTarget::Cube, map);
                } else {
                    device.bind_texture_unit(shadow_2d, TextureTarget::Texture2D, map);
                }
            }
            None => program.set_bool(device, &format!("uLightEnabled[{i}]"), false),
        }
    }

    raster::bind_material_textures(device, material, item.group.skin_texture, ctx.defaults);
    raster::apply_blend(device, material.blend_mode, material.transparency_mode);
    raster::apply_cull(device, material.cull_mode);

    raster::draw_item(ctx, item);

    let device = &mut *ctx.device;
    raster::unbind_material_textures(device);
    for i in 0..lights.len() as u32 {
        device.bind_texture_unit(forward_slot::SHADOW_2D + i, TextureTarget::Texture2D, None);
        device.bind_texture_unit(forward_slot::SHADOW_CUBE + i, TextureTarget::Cube, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::bounds::BoundingBox;
    use crate::foundation::math::{Mat4, Vec3};
    use crate::render::api::{BufferId, VertexArrayId};
    use crate::render::draw::{DrawCall, DrawGroup};
    use crate::render::frame::Layers;
    use crate::render::material::Material;
    use crate::render::mesh::{Mesh, ShadowCastMode};

    fn call() -> (DrawGroup, DrawCall) {
        let mesh = Mesh {
            vao: VertexArrayId(1),
            vbo: BufferId(2),
            ebo: None,
            vertex_count: 3,
            index_count: 0,
            aabb: BoundingBox::from_center_extents(Vec3::zeros(), Vec3::repeat(0.5)),
            shadow_cast_mode: ShadowCastMode::OnAuto,
            layer_mask: Layers::LAYER_01,
        };
        let group = DrawGroup::new(Mat4::identity(), mesh.aabb);
        (group, DrawCall { group: 0, mesh, material: Material::default() })
    }

    fn omni_at(x: f32) -> Light {
        let mut light = Light::new(LightKind::Omni);
        light.position = Vec3::new(x, 0.0, 0.0);
        light.range = 2.0;
        light
    }

    #[test]
    fn test_forward_selection_caps_at_four() {
        let (group, call) = call();
        let item = DrawItem { group: &group, call: &call };
        let lights: Vec<Light> = (0..6).map(|_| omni_at(0.0)).collect();
        let (selected, dropped) = select_forward_lights(&lights, &item);
        assert_eq!(selected.len(), MAX_FORWARD_LIGHTS);
        assert_eq!(dropped, 2);
    }

    #[test]
    fn test_forward_selection_uses_overlap() {
        let (group, call) = call();
        let item = DrawItem { group: &group, call: &call };
        let lights = vec![omni_at(100.0), Light::new(LightKind::Directional), omni_at(1.0)];
        let (selected, dropped) = select_forward_lights(&lights, &item);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].kind, LightKind::Directional);
        assert_eq!(dropped, 0);
    }
}
