//! Built-in programs of the pipeline

use std::collections::HashMap;

use crate::foundation::math::{utils, Mat4, Vec2, Vec3, Vec4};
use crate::render::api::{ProgramId, RenderDevice, UniformLocation};
use crate::render::shader::custom::BuiltinLocations;
use crate::render::shader::{compile_program, slot, sources, VIEW_BLOCK_BINDING};
use crate::render::{RenderError, RenderResult};

/// A linked built-in program with its uniform locations resolved once
///
/// Setters for names the program does not declare do nothing, so passes can
/// share upload code between programs that use a subset of the uniforms.
#[derive(Debug, Clone)]
pub struct Program {
    id: ProgramId,
    name: &'static str,
    locations: HashMap<String, UniformLocation>,
}

impl Program {
    /// Compile, link, bind the view block and assign sampler units
    pub fn build(
        device: &mut dyn RenderDevice,
        name: &'static str,
        vertex: &str,
        fragment: &str,
        samplers: &[(&str, u32)],
    ) -> RenderResult<Self> {
        let id = compile_program(device, vertex, fragment).map_err(|e| {
            log::error!("Built-in program '{name}' failed: {e}");
            RenderError::InitializationFailed(format!("program '{name}': {e}"))
        })?;

        let mut locations = HashMap::new();
        for uniform in device.active_uniforms(id) {
            let base = uniform.name.trim_end_matches("[0]").to_string();
            if let Some(location) = device.uniform_location(id, &uniform.name) {
                locations.insert(base.clone(), location);
            }
            if uniform.name.ends_with("[0]") {
                for i in 0..uniform.size.max(1) {
                    let element = format!("{base}[{i}]");
                    if let Some(location) = device.uniform_location(id, &element) {
                        locations.insert(element, location);
                    }
                }
            }
        }

        if let Some(block) = device.uniform_block_index(id, "ViewBlock") {
            device.uniform_block_binding(id, block, VIEW_BLOCK_BINDING);
        }

        let program = Self { id, name, locations };

        device.use_program(Some(id));
        for &(sampler, unit) in samplers {
            program.set_i32(device, sampler, unit as i32);
        }
        device.use_program(None);

        log::debug!("Built-in program '{name}' linked ({} uniforms)", program.locations.len());
        Ok(program)
    }

    /// GPU handle
    pub fn id(&self) -> ProgramId {
        self.id
    }

    /// Debug name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Location of a uniform; array elements are addressed as `name[i]`
    pub fn location(&self, name: &str) -> Option<UniformLocation> {
        self.locations.get(name).copied()
    }

    /// Make this program current
    pub fn bind(&self, device: &mut dyn RenderDevice) {
        device.use_program(Some(self.id));
    }

    /// Set an `int` or sampler uniform
    pub fn set_i32(&self, device: &mut dyn RenderDevice, name: &str, value: i32) {
        if let Some(location) = self.location(name) {
            device.set_uniform_i32(location, value);
        }
    }

    /// Set a `bool` uniform
    pub fn set_bool(&self, device: &mut dyn RenderDevice, name: &str, value: bool) {
        self.set_i32(device, name, i32::from(value));
    }

    /// Set a `float` uniform
    pub fn set_f32(&self, device: &mut dyn RenderDevice, name: &str, value: f32) {
        if let Some(location) = self.location(name) {
            device.set_uniform_f32(location, value);
        }
    }

    /// Set a `vec2` uniform
    pub fn set_vec2(&self, device: &mut dyn RenderDevice, name: &str, value: Vec2) {
        if let Some(location) = self.location(name) {
            device.set_uniform_vec2(location, [value.x, value.y]);
        }
    }

    /// Set a `vec3` uniform
    pub fn set_vec3(&self, device: &mut dyn RenderDevice, name: &str, value: Vec3) {
        if let Some(location) = self.location(name) {
            device.set_uniform_vec3(location, [value.x, value.y, value.z]);
        }
    }

    /// Set a `vec4` uniform
    pub fn set_vec4(&self, device: &mut dyn RenderDevice, name: &str, value: Vec4) {
        if let Some(location) = self.location(name) {
            device.set_uniform_vec4(location, [value.x, value.y, value.z, value.w]);
        }
    }

    /// Set a `mat4` uniform
    pub fn set_mat4(&self, device: &mut dyn RenderDevice, name: &str, value: &Mat4) {
        if let Some(location) = self.location(name) {
            device.set_uniform_mat4(location, &utils::mat4_to_array(value));
        }
    }

    /// Release the GPU program
    pub fn destroy(&self, device: &mut dyn RenderDevice) {
        device.delete_program(self.id);
    }
}

/// Every built-in program, linked once at renderer creation
#[derive(Debug)]
pub struct ShaderLibrary {
    /// G-buffer fill, also the template of custom shaders
    pub geometry: Program,
    /// Cached built-in locations of `geometry`
    pub geometry_builtins: BuiltinLocations,
    /// Projected decals into the G-buffer
    pub decal: Program,
    /// Depth only, for 2D shadow maps and the transparency prepass
    pub depth: Program,
    /// Linear distance into cube shadow maps
    pub depth_cube: Program,
    /// Lit transparent geometry
    pub forward: Program,
    /// Sky cubemap
    pub skybox: Program,
    /// Solid background color
    pub background: Program,
    /// Ambient occlusion
    pub ssao: Program,
    /// Normal and depth aware separable blur
    pub blur: Program,
    /// Indirect light
    pub ssil: Program,
    /// Reflections
    pub ssr: Program,
    /// Flat ambient term
    pub ambient: Program,
    /// Image based ambient term
    pub ambient_ibl: Program,
    /// One light accumulation
    pub lighting: Program,
    /// Diffuse plus specular into the scene target
    pub compose: Program,
    /// Fog
    pub fog: Program,
    /// Depth of field
    pub dof: Program,
    /// Bloom downsampling
    pub bloom_down: Program,
    /// Bloom upsampling
    pub bloom_up: Program,
    /// Bloom merge
    pub bloom: Program,
    /// Tonemap and color grading
    pub output: Program,
    /// Anti-aliasing
    pub fxaa: Program,
}

const GEOMETRY_SAMPLERS: [(&str, u32); 5] = [
    ("uTexBoneMatrices", slot::BONES),
    ("uTexAlbedo", slot::ALBEDO),
    ("uTexNormal", slot::NORMAL),
    ("uTexEmission", slot::EMISSION),
    ("uTexORM", slot::ORM),
];

/// Units of the forward program beyond the geometry samplers
pub mod forward_slot {
    /// `uCubeIrradiance`
    pub const IRRADIANCE: u32 = 5;
    /// `uCubePrefilter`
    pub const PREFILTER: u32 = 6;
    /// `uTexBrdfLut`
    pub const BRDF_LUT: u32 = 7;
    /// `uShadowMap2D[0]`
    pub const SHADOW_2D: u32 = 8;
    /// `uShadowMapCube[0]`
    pub const SHADOW_CUBE: u32 = 12;
}

impl ShaderLibrary {
    /// Link every built-in program
    pub fn new(device: &mut dyn RenderDevice) -> RenderResult<Self> {
        use sources as src;

        let geometry = Program::build(device, "geometry", src::GEOMETRY_VS, src::GEOMETRY_FS, &GEOMETRY_SAMPLERS)?;
        let geometry_builtins = BuiltinLocations::query(device, geometry.id());

        let decal = Program::build(
            device,
            "decal",
            src::DECAL_VS,
            src::DECAL_FS,
            &[("uTexDepth", 0), ("uTexAlbedo", 1), ("uTexNormal", 2), ("uTexEmission", 3), ("uTexORM", 4)],
        )?;
        let depth = Program::build(
            device,
            "depth",
            src::DEPTH_VS,
            src::DEPTH_FS,
            &[("uTexBoneMatrices", slot::BONES), ("uTexAlbedo", slot::ALBEDO)],
        )?;
        let depth_cube = Program::build(
            device,
            "depth_cube",
            src::DEPTH_CUBE_VS,
            src::DEPTH_CUBE_FS,
            &[("uTexBoneMatrices", slot::BONES), ("uTexAlbedo", slot::ALBEDO)],
        )?;

        let mut forward_samplers = GEOMETRY_SAMPLERS.to_vec();
        forward_samplers.extend([
            ("uCubeIrradiance", forward_slot::IRRADIANCE),
            ("uCubePrefilter", forward_slot::PREFILTER),
            ("uTexBrdfLut", forward_slot::BRDF_LUT),
            ("uShadowMap2D[0]", forward_slot::SHADOW_2D),
            ("uShadowMap2D[1]", forward_slot::SHADOW_2D + 1),
            ("uShadowMap2D[2]", forward_slot::SHADOW_2D + 2),
            ("uShadowMap2D[3]", forward_slot::SHADOW_2D + 3),
            ("uShadowMapCube[0]", forward_slot::SHADOW_CUBE),
            ("uShadowMapCube[1]", forward_slot::SHADOW_CUBE + 1),
            ("uShadowMapCube[2]", forward_slot::SHADOW_CUBE + 2),
            ("uShadowMapCube[3]", forward_slot::SHADOW_CUBE + 3),
        ]);
        let forward = Program::build(device, "forward", src::FORWARD_VS, src::FORWARD_FS, &forward_samplers)?;

        let skybox = Program::build(device, "skybox", src::SKYBOX_VS, src::SKYBOX_FS, &[("uCubeSky", 0)])?;
        let background = Program::build(device, "background", src::SCREEN_VS, src::BACKGROUND_FS, &[])?;

        let ssao = Program::build(
            device,
            "ssao",
            src::SCREEN_VS,
            src::SSAO_FS,
            &[("uTexDepth", 0), ("uTexNormal", 1)],
        )?;
        let blur = Program::build(
            device,
            "blur",
            src::SCREEN_VS,
            src::BLUR_FS,
            &[("uTexSource", 0), ("uTexNormal", 1), ("uTexDepth", 2)],
        )?;
        let ssil = Program::build(
            device,
            "ssil",
            src::SCREEN_VS,
            src::SSIL_FS,
            &[("uTexDepth", 0), ("uTexNormal", 1), ("uTexLight", 2)],
        )?;
        let ssr = Program::build(
            device,
            "ssr",
            src::SCREEN_VS,
            src::SSR_FS,
            &[("uTexColor", 0), ("uTexAlbedo", 1), ("uTexNormal", 2), ("uTexORM", 3), ("uTexDepth", 4)],
        )?;

        let ambient = Program::build(
            device,
            "ambient",
            src::SCREEN_VS,
            src::AMBIENT_FS,
            &[("uTexAlbedo", 0), ("uTexSSAO", 1), ("uTexSSIL", 2), ("uTexSSR", 3), ("uTexORM", 4)],
        )?;
        let ambient_ibl = Program::build(
            device,
            "ambient_ibl",
            src::SCREEN_VS,
            src::AMBIENT_IBL_FS,
            &[
                ("uTexAlbedo", 0),
                ("uTexNormal", 1),
                ("uTexDepth", 2),
                ("uTexSSAO", 3),
                ("uTexSSIL", 4),
                ("uTexSSR", 5),
                ("uTexORM", 6),
                ("uCubeIrradiance", 7),
                ("uCubePrefilter", 8),
                ("uTexBrdfLut", 9),
            ],
        )?;
        let lighting = Program::build(
            device,
            "lighting",
            src::SCREEN_VS,
            src::LIGHTING_FS,
            &[
                ("uTexAlbedo", 0),
                ("uTexNormal", 1),
                ("uTexDepth", 2),
                ("uTexSSAO", 3),
                ("uTexORM", 4),
                ("uShadowMap", 5),
                ("uShadowCubemap", 6),
            ],
        )?;
        let compose = Program::build(
            device,
            "compose",
            src::SCREEN_VS,
            src::COMPOSE_FS,
            &[("uTexDiffuse", 0), ("uTexSpecular", 1)],
        )?;

        let fog = Program::build(device, "fog", src::SCREEN_VS, src::FOG_FS, &[("uTexColor", 0), ("uTexDepth", 1)])?;
        let dof = Program::build(device, "dof", src::SCREEN_VS, src::DOF_FS, &[("uTexColor", 0), ("uTexDepth", 1)])?;
        let bloom_down = Program::build(device, "bloom_down", src::SCREEN_VS, src::BLOOM_DOWN_FS, &[("uTexture", 0)])?;
        let bloom_up = Program::build(device, "bloom_up", src::SCREEN_VS, src::BLOOM_UP_FS, &[("uTexture", 0)])?;
        let bloom = Program::build(
            device,
            "bloom",
            src::SCREEN_VS,
            src::BLOOM_FS,
            &[("uTexColor", 0), ("uTexBloomBlur", 1)],
        )?;
        let output = Program::build(device, "output", src::SCREEN_VS, src::OUTPUT_FS, &[("uTexColor", 0)])?;
        let fxaa = Program::build(device, "fxaa", src::SCREEN_VS, src::FXAA_FS, &[("uTexture", 0)])?;

        log::info!("Shader library ready");

        Ok(Self {
            geometry,
            geometry_builtins,
            decal,
            depth,
            depth_cube,
            forward,
            skybox,
            background,
            ssao,
            blur,
            ssil,
            ssr,
            ambient,
            ambient_ibl,
            lighting,
            compose,
            fog,
            dof,
            bloom_down,
            bloom_up,
            bloom,
            output,
            fxaa,
        })
    }

    fn programs(&self) -> [&Program; 22] {
        [
            &self.geometry,
            &self.decal,
            &self.depth,
            &self.depth_cube,
            &self.forward,
            &self.skybox,
            &self.background,
            &self.ssao,
            &self.blur,
            &self.ssil,
            &self.ssr,
            &self.ambient,
            &self.ambient_ibl,
            &self.lighting,
            &self.compose,
            &self.fog,
            &self.dof,
            &self.bloom_down,
            &self.bloom_up,
            &self.bloom,
            &self.output,
            &self.fxaa,
        ]
    }

    /// Release every program
    pub fn destroy(&self, device: &mut dyn RenderDevice) {
        for program in self.programs() {
            program.destroy(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::recording::{RecordingDevice, UniformValue};

    #[test]
    fn test_library_links_every_program() {
        let mut device = RecordingDevice::new();
        let library = ShaderLibrary::new(&mut device).unwrap();
        let mut ids: Vec<_> = library.programs().iter().map(|p| p.id()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 22);
    }

    #[test]
    fn test_sampler_units_are_assigned_at_build() {
        let mut device = RecordingDevice::new();
        let log = device.log();
        let library = ShaderLibrary::new(&mut device).unwrap();

        assert!(library.forward.location("uShadowMapCube[3]").is_some());
        assert!(log.uniform_values("uShadowMapCube[3]").contains(&UniformValue::I32(15)));
        assert!(log.uniform_values("uTexORM").contains(&UniformValue::I32(4)));
    }

    #[test]
    fn test_missing_uniform_is_ignored() {
        let mut device = RecordingDevice::new();
        let log = device.log();
        let library = ShaderLibrary::new(&mut device).unwrap();
        let before = log.len();

        library.fxaa.bind(&mut device);
        library.fxaa.set_f32(&mut device, "uDoesNotExist", 1.0);
        assert_eq!(log.len(), before + 1);
    }

    #[test]
    fn test_failed_build_maps_to_initialization_error() {
        let mut device = RecordingDevice::new();
        let err = Program::build(&mut device, "broken", "void main() {", "void main() {}", &[]).unwrap_err();
        assert!(matches!(err, RenderError::InitializationFailed(_)));
    }
}
