//! GLSL 330 sources compiled into the crate

pub const GEOMETRY_VS: &str = include_str!("../../../shaders/geometry.vert");
pub const GEOMETRY_FS: &str = include_str!("../../../shaders/geometry.frag");
pub const DECAL_VS: &str = include_str!("../../../shaders/decal.vert");
pub const DECAL_FS: &str = include_str!("../../../shaders/decal.frag");
pub const DEPTH_VS: &str = include_str!("../../../shaders/depth.vert");
pub const DEPTH_FS: &str = include_str!("../../../shaders/depth.frag");
pub const DEPTH_CUBE_VS: &str = include_str!("../../../shaders/depth_cube.vert");
pub const DEPTH_CUBE_FS: &str = include_str!("../../../shaders/depth_cube.frag");
pub const FORWARD_VS: &str = include_str!("../../../shaders/forward.vert");
pub const FORWARD_FS: &str = include_str!("../../../shaders/forward.frag");
pub const SKYBOX_VS: &str = include_str!("../../../shaders/skybox.vert");
pub const SKYBOX_FS: &str = include_str!("../../../shaders/skybox.frag");
pub const SCREEN_VS: &str = include_str!("../../../shaders/screen.vert");
pub const BACKGROUND_FS: &str = include_str!("../../../shaders/background.frag");
pub const SSAO_FS: &str = include_str!("../../../shaders/ssao.frag");
pub const BLUR_FS: &str = include_str!("../../../shaders/blur.frag");
pub const SSIL_FS: &str = include_str!("../../../shaders/ssil.frag");
pub const SSR_FS: &str = include_str!("../../../shaders/ssr.frag");
pub const AMBIENT_FS: &str = include_str!("../../../shaders/ambient.frag");
pub const AMBIENT_IBL_FS: &str = include_str!("../../../shaders/ambient_ibl.frag");
pub const LIGHTING_FS: &str = include_str!("../../../shaders/lighting.frag");
pub const COMPOSE_FS: &str = include_str!("../../../shaders/compose.frag");
pub const FOG_FS: &str = include_str!("../../../shaders/fog.frag");
pub const DOF_FS: &str = include_str!("../../../shaders/dof.frag");
pub const BLOOM_DOWN_FS: &str = include_str!("../../../shaders/bloom_down.frag");
pub const BLOOM_UP_FS: &str = include_str!("../../../shaders/bloom_up.frag");
pub const BLOOM_FS: &str = include_str!("../../../shaders/bloom.frag");
pub const OUTPUT_FS: &str = include_str!("../../../shaders/output.frag");
pub const FXAA_FS: &str = include_str!("../../../shaders/fxaa.frag");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_template_carries_the_user_marker() {
        assert_eq!(GEOMETRY_FS.matches(super::super::custom::USER_MARKER).count(), 1);
        assert!(GEOMETRY_FS.starts_with("#version 330"));
    }
}
