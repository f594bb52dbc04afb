//! Shadow map rendering
//!
//! Every visible light whose map needs refreshing gets its map re-rendered:
//! one view for directional and spot lights, six cube faces for omni lights.
//! Group visibility is recomputed against each view's frustum, so the camera
//! cull has to run again afterwards.

use crate::foundation::bounds::Frustum;
use crate::foundation::math::Rect;
use crate::render::api::{Attachment, Capability, ClearFlags, DepthFunc, RenderDevice, RenderDeviceExt, TextureTarget};
use crate::render::draw::{DrawCategory, DrawCollector, DrawItem};
use crate::render::frame::FrameContext;
use crate::render::lights::{LightId, LightKind, LightManager};
use crate::render::passes::{raster, PassContext, PassResources};
use crate::render::shader::ShaderRegistry;
use crate::render::targets::RenderTargets;

const CASTERS: [DrawCategory; 3] = [DrawCategory::Deferred, DrawCategory::Prepass, DrawCategory::Forward];

/// Refresh the shadow maps that need it; returns how many lights were rendered
///
/// A light whose map cannot be allocated is skipped with a warning and keeps
/// whatever it had.
pub fn render(
    device: &mut dyn RenderDevice,
    frame: &FrameContext,
    targets: &mut RenderTargets,
    resources: &PassResources,
    custom: &ShaderRegistry,
    draws: &mut DrawCollector,
    lights: &mut LightManager,
) -> usize {
    let pending: Vec<LightId> = lights
        .visible()
        .map(|(id, _)| id)
        .filter(|&id| lights.shadow_should_be_updated(id))
        .collect();

    let mut rendered = 0;
    for id in pending {
        let map = match lights.ensure_shadow_map(device, id) {
            Ok(Some(map)) => map,
            Ok(None) => continue,
            Err(e) => {
                log::warn!("Shadow map of light {id:?} unavailable: {e}");
                continue;
            }
        };
        let Some(light) = lights.get(id).cloned() else { continue };

        device.push_debug_group("shadow");
        device.bind_framebuffer(Some(map.framebuffer));
        device.viewport(Rect::full(map.resolution, map.resolution));
        device.disable(Capability::Blend);
        device.enable(Capability::DepthTest);
        device.depth_func(DepthFunc::Less);
        device.depth_mask(true);

        let omni = light.kind == LightKind::Omni;
        let program = if omni { &resources.programs.depth_cube } else { &resources.programs.depth };
        program.bind(device);
        if omni {
            program.set_vec3(device, "uViewPosition", light.position);
            program.set_f32(device, "uFar", light.range);
        }

        for face in 0..light.shadow_view_count() {
            let view_proj = light.view_proj(face);
            if omni {
                device.framebuffer_texture(Attachment::Depth, TextureTarget::CubeFace(face as u8), Some(map.texture), 0);
            }
            device.clear(ClearFlags::DEPTH);
            program.set_mat4(device, "uMatVP", &view_proj);

            draws.compute_visible_groups(&Frustum::from_matrix(&view_proj));
            let mut ctx = PassContext::new(&mut *device, frame, &mut *targets, resources, custom, draws, lights);
            let casters: Vec<DrawItem<'_>> = draws
                .iter(&CASTERS, true, |item| item.call.mesh.shadow_cast_mode.casts_shadows())
                .collect();
            for item in &casters {
                raster::raster_depth(&mut ctx, program, item, true);
            }
        }

        device.bind_framebuffer(None);
        device.pop_debug_group();
        lights.mark_shadow_updated(id);
        rendered += 1;
        log::trace!("Shadow map of light {id:?} refreshed ({} views)", light.shadow_view_count());
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::bounds::BoundingBox;
    use crate::foundation::math::{Mat4, Vec3};
    use crate::render::backends::recording::{DeviceCommand, RecordingDevice};
    use crate::render::draw::DrawGroup;
    use crate::render::environment::Environment;
    use crate::render::frame::RenderFlags;
    use crate::render::material::Material;
    use crate::render::mesh::{Mesh, MeshData, ShadowCastMode};

    struct Fixture {
        device: RecordingDevice,
        frame: FrameContext,
        targets: RenderTargets,
        resources: PassResources,
        custom: ShaderRegistry,
        draws: DrawCollector,
        lights: LightManager,
        mesh: Mesh,
    }

    fn fixture() -> Fixture {
        let mut device = RecordingDevice::new();
        let resources = PassResources::new(&mut device).unwrap();
        let targets = RenderTargets::new(&mut device, 64, 64, false).unwrap();
        let mesh = Mesh::upload(&mut device, &MeshData::sphere(1.0, 8, 8)).unwrap();
        let frame = FrameContext::new((64, 64), RenderFlags::empty(), Environment::default());
        Fixture {
            device,
            frame,
            targets,
            resources,
            custom: ShaderRegistry::new(),
            draws: DrawCollector::new(),
            lights: LightManager::new(128),
            mesh,
        }
    }

    fn run(f: &mut Fixture) -> usize {
        let frustum = f.frame.view.frustum.clone();
        f.lights.update_and_cull(&frustum, Vec3::zeros());
        render(&mut f.device, &f.frame, &mut f.targets, &f.resources, &f.custom, &mut f.draws, &mut f.lights)
    }

    #[test]
    fn test_omni_light_renders_six_faces() {
        let mut f = fixture();
        f.draws.push_group(DrawGroup::new(Mat4::identity(), BoundingBox::default()));
        f.draws.push_call(&f.mesh, &Material::default(), false);
        let id = f.lights.create(LightKind::Omni);
        f.lights.enable_shadow(id, 64);
        let log = f.device.log();

        assert_eq!(run(&mut f), 1);
        let faces = log
            .commands()
            .iter()
            .filter(|c| matches!(c, DeviceCommand::FramebufferTexture { target: TextureTarget::CubeFace(_), .. }))
            .count();
        assert_eq!(faces, 6);
        assert_eq!(log.commands_in_group("shadow").iter().filter(|c| matches!(c, DeviceCommand::Draw { .. })).count(), 6);
    }

    #[test]
    fn test_non_casters_are_skipped() {
        let mut f = fixture();
        let mut mesh = f.mesh.clone();
        mesh.shadow_cast_mode = ShadowCastMode::Disabled;
        f.draws.push_group(DrawGroup::new(Mat4::identity(), BoundingBox::default()));
        f.draws.push_call(&mesh, &Material::default(), false);
        let id = f.lights.create(LightKind::Directional);
        f.lights.enable_shadow(id, 64);
        let log = f.device.log();

        assert_eq!(run(&mut f), 1);
        assert_eq!(log.count_groups("shadow"), 1);
        assert!(log.draws().is_empty());
    }

    #[test]
    fn test_lights_without_shadows_render_nothing() {
        let mut f = fixture();
        f.lights.create(LightKind::Spot);
        assert_eq!(run(&mut f), 0);
    }
}
