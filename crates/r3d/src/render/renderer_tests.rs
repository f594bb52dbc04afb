//! Whole-frame tests of the Renderer on the recording device

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::config::RendererConfig;
    use crate::foundation::math::{Mat4, Vec3};
    use crate::render::backends::recording::{CommandLog, DeviceCommand, RecordingDevice, UniformValue};
    use crate::render::camera::Camera;
    use crate::render::environment::FogMode;
    use crate::render::frame::{Layers, RenderFlags};
    use crate::render::lights::LightKind;
    use crate::render::material::{Material, TransparencyMode};
    use crate::render::mesh::{Mesh, MeshData};

    fn setup(config: RendererConfig) -> (Renderer, CommandLog, Mesh) {
        let device = RecordingDevice::new();
        let log = device.log();
        let mut renderer = Renderer::new(Box::new(device), config).unwrap();
        let sphere = renderer.upload_mesh(&MeshData::sphere(0.5, 8, 8)).unwrap();
        log.clear();
        (renderer, log, sphere)
    }

    fn camera() -> Camera {
        Camera::perspective(Vec3::new(0.0, 0.0, 5.0), Vec3::zeros(), 60.0)
    }

    fn draws_in(log: &CommandLog, label: &str) -> usize {
        log.commands_in_group(label).iter().filter(|c| matches!(c, DeviceCommand::Draw { .. })).count()
    }

    fn group_start(log: &CommandLog, label: &str) -> Option<usize> {
        log.position(|c| matches!(c, DeviceCommand::PushDebugGroup(l) if l == label))
    }

    /// Z translation of every model matrix set inside a group, in submission order
    fn model_depths(log: &CommandLog, label: &str) -> Vec<f32> {
        log.commands_in_group(label)
            .iter()
            .filter_map(|c| match c {
                DeviceCommand::SetUniform { name, value: UniformValue::Mat4(m), .. } if name == "uMatModel" => Some(m[14]),
                _ => None,
            })
            .collect()
    }

    fn at_depth(z: f32) -> Mat4 {
        Mat4::new_translation(&Vec3::new(0.0, 0.0, z))
    }

    #[test]
    fn test_default_material_draws_share_one_program() {
        let (mut renderer, log, sphere) = setup(RendererConfig::new(320, 180));
        renderer.begin(&camera());
        renderer.draw_mesh(&sphere, None, &Mat4::identity());
        renderer.draw_mesh(&sphere, None, &Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0)));
        renderer.end().unwrap();

        let geometry = log.commands_in_group("geometry");
        let switches = geometry.iter().filter(|c| matches!(c, DeviceCommand::UseProgram(_))).count();
        assert_eq!(switches, 1);
        assert_eq!(draws_in(&log, "geometry"), 2);
    }

    #[test]
    fn test_zero_instances_draw_nothing() {
        let (mut renderer, log, sphere) = setup(RendererConfig::new(320, 180));
        renderer.begin(&camera());
        renderer.draw_mesh_instanced(&sphere, None, &[]);
        renderer.end().unwrap();

        assert_eq!(renderer.stats().draw_calls, 0);
        assert_eq!(log.count_groups("geometry"), 0);
        assert_eq!(log.count_groups("clear"), 1);
    }

    #[test]
    fn test_opaque_geometry_precedes_forward_transparency() {
        let (mut renderer, log, sphere) = setup(RendererConfig::new(320, 180));
        let mut glass = Material::default();
        glass.transparency_mode = TransparencyMode::Alpha;

        renderer.begin(&camera());
        renderer.draw_mesh(&sphere, Some(&glass), &Mat4::identity());
        renderer.draw_mesh(&sphere, None, &Mat4::new_translation(&Vec3::new(0.0, 0.0, -2.0)));
        renderer.end().unwrap();

        let geometry = group_start(&log, "geometry").unwrap();
        let forward = group_start(&log, "forward").unwrap();
        assert!(geometry < forward);
        assert_eq!(draws_in(&log, "geometry"), 1);
        assert_eq!(draws_in(&log, "forward"), 1);
    }

    #[test]
    fn test_shadowed_directional_light_frame() {
        let (mut renderer, log, sphere) = setup(RendererConfig::new(320, 180));
        let sun = renderer.create_light(LightKind::Directional);
        renderer.light_look_at(sun, Vec3::new(0.0, 10.0, 0.0), Vec3::zeros());
        renderer.enable_shadow(sun, 0);

        renderer.begin(&camera());
        renderer.draw_mesh(&sphere, None, &Mat4::identity());
        renderer.end().unwrap();

        assert_eq!(renderer.stats().shadow_maps, 1);
        assert_eq!(log.count_groups("shadow"), 1);
        assert_eq!(draws_in(&log, "shadow"), 1);
        assert_eq!(draws_in(&log, "geometry"), 1);
        assert_eq!(draws_in(&log, "lighting"), 1);
        assert_eq!(log.count_groups("decals"), 0);
        assert_eq!(draws_in(&log, "compose"), 1);
    }

    #[test]
    fn test_custom_shader_draws_with_unset_parameters() {
        let (mut renderer, log, sphere) = setup(RendererConfig::new(320, 180));
        let shader = renderer.create_custom_shader("uniform float uBlend;\nALBEDO.rgb *= uBlend;").unwrap();
        let program = renderer.custom_shaders().get(shader).unwrap().program();
        let material = Material::with_shader(shader);

        renderer.begin(&camera());
        renderer.draw_mesh(&sphere, Some(&material), &Mat4::identity());
        renderer.end().unwrap();

        let geometry = log.commands_in_group("geometry");
        assert!(geometry.contains(&DeviceCommand::UseProgram(Some(program))));
        assert!(log.uniform_values("uBlend").is_empty());
        assert_eq!(draws_in(&log, "geometry"), 1);
    }

    #[test]
    fn test_destroyed_custom_shader_falls_back_to_default_program() {
        let (mut renderer, log, sphere) = setup(RendererConfig::new(320, 180));
        let shader = renderer.create_custom_shader("ALBEDO.rgb = vec3(1.0);").unwrap();
        assert!(renderer.destroy_custom_shader(shader));
        assert!(!renderer.destroy_custom_shader(shader));
        let material = Material::with_shader(shader);

        renderer.begin(&camera());
        renderer.draw_mesh(&sphere, Some(&material), &Mat4::identity());
        renderer.end().unwrap();

        let geometry = log.commands_in_group("geometry");
        let switches = geometry.iter().filter(|c| matches!(c, DeviceCommand::UseProgram(_))).count();
        assert_eq!(switches, 1);
        assert_eq!(draws_in(&log, "geometry"), 1);
    }

    #[test]
    fn test_end_restores_external_state() {
        let (mut renderer, log, sphere) = setup(RendererConfig::new(320, 180).with_flags(RenderFlags::FXAA));
        renderer.environment_mut().fog.mode = FogMode::Exp2;

        renderer.begin(&camera());
        renderer.draw_mesh(&sphere, None, &Mat4::identity());
        renderer.end().unwrap();

        let state = log.state();
        assert!(!state.depth_test);
        assert!(state.blend);
        assert!(!state.scissor_test);
        assert_eq!(state.program, None);
        assert_eq!(state.framebuffer, None);

        let passes = &renderer.stats().passes;
        let fog = passes.iter().position(|p| *p == "fog").unwrap();
        let output = passes.iter().position(|p| *p == "output").unwrap();
        let fxaa = passes.iter().position(|p| *p == "fxaa").unwrap();
        assert!(fog < output && output < fxaa);
        assert_eq!(passes.last(), Some(&"blit"));
    }

    #[test]
    fn test_end_without_begin_is_ignored() {
        let (mut renderer, log, _) = setup(RendererConfig::new(320, 180));
        assert!(renderer.end().is_ok());
        assert!(log.is_empty());
        assert!(!renderer.is_recording());
    }

    #[test]
    fn test_inactive_layers_are_skipped() {
        let (mut renderer, log, sphere) = setup(RendererConfig::new(320, 180));
        let mut hidden = sphere.clone();
        hidden.layer_mask = Layers::LAYER_02;

        renderer.begin(&camera());
        renderer.draw_mesh(&hidden, None, &Mat4::identity());
        renderer.draw_mesh(&sphere, None, &Mat4::identity());
        renderer.end().unwrap();
        assert_eq!(draws_in(&log, "geometry"), 1);

        log.clear();
        renderer.set_active_layers(Layers::LAYER_01 | Layers::LAYER_02);
        renderer.begin(&camera());
        renderer.draw_mesh(&hidden, None, &Mat4::identity());
        renderer.end().unwrap();
        assert_eq!(draws_in(&log, "geometry"), 1);
    }

    #[test]
    fn test_render_texture_receives_the_blit() {
        let (mut renderer, log, sphere) = setup(RendererConfig::new(320, 180));
        let target = renderer.create_render_texture(128, 128).unwrap();
        log.clear();

        renderer.begin_with_target(&camera(), &target);
        renderer.draw_mesh(&sphere, None, &Mat4::identity());
        renderer.end().unwrap();

        let blit = log.position(|c| matches!(c, DeviceCommand::Blit { destination, .. } if *destination == Some(target.framebuffer)));
        assert!(blit.is_some());
        renderer.destroy_render_texture(&target);
    }

    #[test]
    fn test_opaque_sorting_draws_front_to_back() {
        let (mut renderer, log, sphere) = setup(RendererConfig::new(320, 180).with_flags(RenderFlags::OPAQUE_SORTING));
        renderer.begin(&camera());
        for z in [-10.0, -1.0, -5.0] {
            renderer.draw_mesh(&sphere, None, &at_depth(z));
        }
        renderer.end().unwrap();

        assert_eq!(model_depths(&log, "geometry"), vec![-1.0, -5.0, -10.0]);
    }

    #[test]
    fn test_opaque_draws_keep_submission_order_without_sorting() {
        let (mut renderer, log, sphere) = setup(RendererConfig::new(320, 180));
        renderer.begin(&camera());
        for z in [-10.0, -1.0, -5.0] {
            renderer.draw_mesh(&sphere, None, &at_depth(z));
        }
        renderer.end().unwrap();

        assert_eq!(model_depths(&log, "geometry"), vec![-10.0, -1.0, -5.0]);
    }

    #[test]
    fn test_transparent_sorting_draws_back_to_front() {
        let (mut renderer, log, sphere) = setup(RendererConfig::new(320, 180).with_flags(RenderFlags::TRANSPARENT_SORTING));
        let mut cutout = Material::default();
        cutout.transparency_mode = TransparencyMode::Prepass;
        let mut glass = Material::default();
        glass.transparency_mode = TransparencyMode::Alpha;

        renderer.begin(&camera());
        for z in [-1.0, -10.0, -5.0] {
            renderer.draw_mesh(&sphere, Some(&cutout), &at_depth(z));
        }
        for z in [-2.0, -8.0, -4.0] {
            renderer.draw_mesh(&sphere, Some(&glass), &at_depth(z));
        }
        renderer.end().unwrap();

        // Prepass-mode draws come first, then plain alpha blending
        assert_eq!(model_depths(&log, "forward"), vec![-10.0, -5.0, -1.0, -8.0, -4.0, -2.0]);
        assert_eq!(draws_in(&log, "prepass"), 3);
    }

    #[test]
    fn test_opaque_sorting_leaves_transparent_order_alone() {
        let (mut renderer, log, sphere) = setup(RendererConfig::new(320, 180).with_flags(RenderFlags::OPAQUE_SORTING));
        let mut cutout = Material::default();
        cutout.transparency_mode = TransparencyMode::Prepass;

        renderer.begin(&camera());
        for z in [-1.0, -10.0, -5.0] {
            renderer.draw_mesh(&sphere, Some(&cutout), &at_depth(z));
        }
        renderer.end().unwrap();

        assert_eq!(model_depths(&log, "forward"), vec![-1.0, -10.0, -5.0]);
    }

    #[test]
    fn test_frustum_culling_can_be_disabled() {
        let (mut renderer, log, sphere) = setup(RendererConfig::new(320, 180));
        let offscreen = Mat4::new_translation(&Vec3::new(200.0, 0.0, 0.0));

        renderer.begin(&camera());
        renderer.draw_mesh(&sphere, None, &offscreen);
        renderer.end().unwrap();
        assert_eq!(draws_in(&log, "geometry"), 0);

        log.clear();
        renderer.set_flags(renderer.flags() | RenderFlags::NO_FRUSTUM_CULLING).unwrap();
        renderer.begin(&camera());
        renderer.draw_mesh(&sphere, None, &offscreen);
        renderer.end().unwrap();
        assert_eq!(draws_in(&log, "geometry"), 1);
    }

    #[test]
    fn test_lighting_is_skipped_without_visible_lights() {
        let (mut renderer, log, sphere) = setup(RendererConfig::new(320, 180));
        renderer.begin(&camera());
        renderer.draw_mesh(&sphere, None, &Mat4::identity());
        renderer.end().unwrap();

        assert_eq!(log.count_groups("lighting"), 0);
        let passes = &renderer.stats().passes;
        assert!(!passes.contains(&"lighting"));
        assert!(passes.contains(&"ambient") && passes.contains(&"compose"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let device = RecordingDevice::new();
        let result = Renderer::new(Box::new(device), RendererConfig::new(0, 180));
        assert!(matches!(result, Err(RenderError::InitializationFailed(_))));
    }

    #[test]
    fn test_resize_updates_the_resolution() {
        let (mut renderer, _, _) = setup(RendererConfig::new(320, 180));
        renderer.resize(640, 360).unwrap();
        assert_eq!(renderer.resolution(), (640, 360));
    }
}
