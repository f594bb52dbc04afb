//! User fragment logic injected into the geometry pass
//!
//! User code is a list of `uniform` declarations followed by statements that
//! read and write the template's surface globals:
//!
//! | global     | type   | access     |
//! |------------|--------|------------|
//! | `ALBEDO`   | `vec4` | read-write |
//! | `NORMAL`   | `vec3` | read-write |
//! | `ORM`      | `vec3` | read-write |
//! | `EMISSION` | `vec3` | read-write |
//! | `vTexCoord`| `vec2` | read       |
//! | `vColor`   | `vec4` | read       |
//! | `vTBN`     | `mat3` | read       |
//!
//! Declarations are spliced right after the template's `#version` line and
//! statements replace the [`USER_MARKER`] line. The marker, the globals and
//! the [`BUILTIN_UNIFORMS`] deny-list are a stable public contract.

use crate::foundation::math::{utils, Mat4};
use crate::render::api::{ProgramId, RenderDevice, RenderDeviceExt, TextureTarget, UniformKind, UniformLocation};
use crate::render::material::{Material, ParamValue};
use crate::render::shader::{
    compile_program, slot, sources, FIRST_CUSTOM_SLOT, MAX_CUSTOM_UNIFORMS, MAX_UNIFORM_NAME_LENGTH,
    VIEW_BLOCK_BINDING,
};
use crate::render::{RenderError, RenderResult};

/// Line of the geometry template replaced by the user statements
pub const USER_MARKER: &str = "#define R3D_USER_FRAGMENT_MARKER 0";

/// Uniform names owned by the geometry template, never reported as custom
pub const BUILTIN_UNIFORMS: [&str; 21] = [
    "uTexAlbedo",
    "uTexNormal",
    "uTexEmission",
    "uTexORM",
    "uTexBoneMatrices",
    "uAlphaCutoff",
    "uNormalScale",
    "uOcclusion",
    "uRoughness",
    "uMetalness",
    "uAlbedoColor",
    "uEmissionEnergy",
    "uEmissionColor",
    "uTexCoordOffset",
    "uTexCoordScale",
    "uInstancing",
    "uSkinning",
    "uBillboard",
    "uMatModel",
    "uMatNormal",
    "ViewBlock",
];

/// User code split into its two insertion points
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSource {
    /// `uniform` lines, each newline terminated
    pub declarations: String,
    /// Every other non-blank line, each newline terminated
    pub body: String,
}

/// Route `uniform` lines to the declarations and the rest to the body
///
/// A line is a declaration when `uniform ` follows its leading spaces and
/// tabs. Relative order is kept inside each half.
pub fn split_user_source(code: &str) -> UserSource {
    let mut split = UserSource::default();
    for line in code.lines() {
        if line.trim_start_matches([' ', '\t']).starts_with("uniform ") {
            split.declarations.push_str(line);
            split.declarations.push('\n');
        } else if !line.trim().is_empty() {
            split.body.push_str(line);
            split.body.push('\n');
        }
    }
    split
}

/// Merge user code into a fragment template
pub fn compose_fragment(template: &str, user: &UserSource) -> RenderResult<String> {
    let version = template
        .find("#version")
        .ok_or_else(|| RenderError::ShaderComposition("template has no #version directive".to_string()))?;
    let header_end = template[version..].find('\n').map_or(template.len(), |i| version + i + 1);
    let marker = template[header_end..]
        .find(USER_MARKER)
        .map(|i| header_end + i)
        .ok_or_else(|| RenderError::ShaderComposition("template has no user marker".to_string()))?;

    let mut out = String::with_capacity(template.len() + user.declarations.len() + user.body.len() + 1);
    out.push_str(&template[..header_end]);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&user.declarations);
    out.push_str(&template[header_end..marker]);
    out.push_str(&user.body);
    out.push_str(&template[marker + USER_MARKER.len()..]);
    Ok(out)
}

/// Types a custom uniform can take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CustomUniformKind {
    /// `float`
    Float,
    /// `vec2`
    Vec2,
    /// `vec3`
    Vec3,
    /// `vec4`
    Vec4,
    /// `sampler2D`
    Sampler2D,
}

impl CustomUniformKind {
    /// Classify a reflected type; unsupported types give `None`
    pub fn from_reflected(kind: UniformKind) -> Option<Self> {
        match kind {
            UniformKind::Float => Some(Self::Float),
            UniformKind::Vec2 => Some(Self::Vec2),
            UniformKind::Vec3 => Some(Self::Vec3),
            UniformKind::Vec4 => Some(Self::Vec4),
            UniformKind::Sampler2D => Some(Self::Sampler2D),
            _ => None,
        }
    }

    /// True when a material value can feed a uniform of this type
    pub fn accepts(self, value: &ParamValue) -> bool {
        matches!(
            (self, value),
            (Self::Float, ParamValue::Float(_))
                | (Self::Vec2, ParamValue::Vec2(_))
                | (Self::Vec3, ParamValue::Vec3(_))
                | (Self::Vec4, ParamValue::Vec4(_))
                | (Self::Sampler2D, ParamValue::Texture(_))
        )
    }
}

/// One discovered custom uniform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomUniform {
    /// Name, cut to [`MAX_UNIFORM_NAME_LENGTH`] characters
    pub name: String,
    /// Location in the custom program
    pub location: UniformLocation,
    /// Declared type
    pub kind: CustomUniformKind,
    /// Texture unit of sampler uniforms
    pub slot: Option<u32>,
    /// The reflected name was longer than the limit; never matched to a parameter
    pub truncated: bool,
}

/// Locations of the geometry template uniforms, resolved once per program
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuiltinLocations {
    mat_model: Option<UniformLocation>,
    mat_normal: Option<UniformLocation>,
    albedo_color: Option<UniformLocation>,
    emission_color: Option<UniformLocation>,
    emission_energy: Option<UniformLocation>,
    normal_scale: Option<UniformLocation>,
    occlusion: Option<UniformLocation>,
    roughness: Option<UniformLocation>,
    metalness: Option<UniformLocation>,
    alpha_cutoff: Option<UniformLocation>,
    tex_coord_offset: Option<UniformLocation>,
    tex_coord_scale: Option<UniformLocation>,
    skinning: Option<UniformLocation>,
    billboard: Option<UniformLocation>,
    instancing: Option<UniformLocation>,
}

impl BuiltinLocations {
    /// Resolve every template uniform of `program`
    pub fn query(device: &dyn RenderDevice, program: ProgramId) -> Self {
        let at = |name: &str| device.uniform_location(program, name);
        Self {
            mat_model: at("uMatModel"),
            mat_normal: at("uMatNormal"),
            albedo_color: at("uAlbedoColor"),
            emission_color: at("uEmissionColor"),
            emission_energy: at("uEmissionEnergy"),
            normal_scale: at("uNormalScale"),
            occlusion: at("uOcclusion"),
            roughness: at("uRoughness"),
            metalness: at("uMetalness"),
            alpha_cutoff: at("uAlphaCutoff"),
            tex_coord_offset: at("uTexCoordOffset"),
            tex_coord_scale: at("uTexCoordScale"),
            skinning: at("uSkinning"),
            billboard: at("uBillboard"),
            instancing: at("uInstancing"),
        }
    }

    /// Upload the per-draw template uniforms to the current program
    pub fn apply(&self, device: &mut dyn RenderDevice, model: &Mat4, material: &Material, skinning: bool, instancing: bool) {
        if let Some(l) = self.mat_model {
            device.set_uniform_mat4(l, &utils::mat4_to_array(model));
        }
        if let Some(l) = self.mat_normal {
            device.set_uniform_mat4(l, &utils::mat4_to_array(&utils::normal_matrix(model)));
        }
        if let Some(l) = self.albedo_color {
            let c = material.albedo.color.to_vec4();
            device.set_uniform_vec4(l, [c.x, c.y, c.z, c.w]);
        }
        if let Some(l) = self.emission_color {
            let c = material.emission.color.to_vec3();
            device.set_uniform_vec3(l, [c.x, c.y, c.z]);
        }
        if let Some(l) = self.emission_energy {
            device.set_uniform_f32(l, material.emission.energy);
        }
        if let Some(l) = self.normal_scale {
            device.set_uniform_f32(l, material.normal.scale);
        }
        if let Some(l) = self.occlusion {
            device.set_uniform_f32(l, material.orm.occlusion);
        }
        if let Some(l) = self.roughness {
            device.set_uniform_f32(l, material.orm.roughness);
        }
        if let Some(l) = self.metalness {
            device.set_uniform_f32(l, material.orm.metalness);
        }
        if let Some(l) = self.alpha_cutoff {
            device.set_uniform_f32(l, material.alpha_cutoff);
        }
        if let Some(l) = self.tex_coord_offset {
            device.set_uniform_vec2(l, [material.uv_offset.x, material.uv_offset.y]);
        }
        if let Some(l) = self.tex_coord_scale {
            device.set_uniform_vec2(l, [material.uv_scale.x, material.uv_scale.y]);
        }
        if let Some(l) = self.skinning {
            device.set_uniform_i32(l, i32::from(skinning));
        }
        if let Some(l) = self.billboard {
            device.set_uniform_i32(l, material.billboard_mode.as_uniform());
        }
        if let Some(l) = self.instancing {
            device.set_uniform_i32(l, i32::from(instancing));
        }
    }
}

/// A geometry program with user fragment logic
#[derive(Debug)]
pub struct CustomShader {
    program: ProgramId,
    uniforms: Vec<CustomUniform>,
    builtins: BuiltinLocations,
}

impl CustomShader {
    /// Compose, compile, link and introspect
    ///
    /// No GPU object survives a failure.
    pub fn create(device: &mut dyn RenderDevice, code: &str) -> RenderResult<Self> {
        if code.trim().is_empty() {
            log::error!("Custom shader source is empty");
            return Err(RenderError::ShaderComposition("empty source".to_string()));
        }

        let user = split_user_source(code);
        let fragment = compose_fragment(sources::GEOMETRY_FS, &user).map_err(|e| {
            log::error!("Custom shader composition failed: {e}");
            e
        })?;

        let program = compile_program(device, sources::GEOMETRY_VS, &fragment).map_err(|e| {
            log::error!("Custom shader build failed: {e}");
            e
        })?;

        device.use_program(Some(program));

        if let Some(block) = device.uniform_block_index(program, "ViewBlock") {
            device.uniform_block_binding(program, block, VIEW_BLOCK_BINDING);
        }

        for (name, unit) in [
            ("uTexBoneMatrices", slot::BONES),
            ("uTexAlbedo", slot::ALBEDO),
            ("uTexNormal", slot::NORMAL),
            ("uTexEmission", slot::EMISSION),
            ("uTexORM", slot::ORM),
        ] {
            if let Some(location) = device.uniform_location(program, name) {
                device.set_uniform_i32(location, unit as i32);
            }
        }

        let uniforms = discover_uniforms(device, program);
        let builtins = BuiltinLocations::query(device, program);

        device.use_program(None);

        log::info!("Custom shader program {} has {} custom uniforms", program.0, uniforms.len());
        Ok(Self { program, uniforms, builtins })
    }

    /// GPU program
    pub fn program(&self) -> ProgramId {
        self.program
    }

    /// Discovered custom uniforms, in reflection order
    pub fn uniforms(&self) -> &[CustomUniform] {
        &self.uniforms
    }

    /// Cached template uniform locations
    pub fn builtins(&self) -> &BuiltinLocations {
        &self.builtins
    }

    /// Upload every material parameter matching a custom uniform by name and type
    ///
    /// Uniforms without a matching parameter keep their previous value.
    pub fn bind_params(&self, device: &mut dyn RenderDevice, material: &Material) {
        for uniform in self.uniforms.iter().filter(|u| !u.truncated) {
            let Some(value) = material.param(&uniform.name) else { continue };
            if !uniform.kind.accepts(value) {
                log::trace!("Parameter '{}' does not match the uniform type {:?}", uniform.name, uniform.kind);
                continue;
            }
            match *value {
                ParamValue::Float(v) => device.set_uniform_f32(uniform.location, v),
                ParamValue::Vec2(v) => device.set_uniform_vec2(uniform.location, [v.x, v.y]),
                ParamValue::Vec3(v) => device.set_uniform_vec3(uniform.location, [v.x, v.y, v.z]),
                ParamValue::Vec4(v) => device.set_uniform_vec4(uniform.location, [v.x, v.y, v.z, v.w]),
                ParamValue::Texture(texture) => {
                    if let Some(unit) = uniform.slot {
                        device.bind_texture_unit(unit, TextureTarget::Texture2D, Some(texture));
                    }
                }
            }
        }
    }

    /// Unbind the units of the custom samplers
    pub fn unbind_samplers(&self, device: &mut dyn RenderDevice) {
        for unit in self.uniforms.iter().filter_map(|u| u.slot) {
            device.bind_texture_unit(unit, TextureTarget::Texture2D, None);
        }
    }

    /// Release the program
    pub fn destroy(self, device: &mut dyn RenderDevice) {
        device.delete_program(self.program);
    }
}

fn is_reserved(name: &str) -> bool {
    BUILTIN_UNIFORMS.contains(&name) || name.starts_with("gl_") || name.contains('[') || name.contains('.')
}

/// Collect custom uniforms of the current program and assign sampler units
fn discover_uniforms(device: &mut dyn RenderDevice, program: ProgramId) -> Vec<CustomUniform> {
    let mut uniforms: Vec<CustomUniform> = Vec::new();
    let mut next_slot = FIRST_CUSTOM_SLOT;

    for active in device.active_uniforms(program) {
        if is_reserved(&active.name) {
            continue;
        }
        let Some(kind) = CustomUniformKind::from_reflected(active.kind) else {
            log::debug!("Custom uniform '{}' has an unsupported type {:?}", active.name, active.kind);
            continue;
        };
        if uniforms.len() >= MAX_CUSTOM_UNIFORMS {
            log::warn!("Custom uniform table full, '{}' not registered", active.name);
            continue;
        }
        let Some(location) = device.uniform_location(program, &active.name) else { continue };

        let slot = (kind == CustomUniformKind::Sampler2D).then(|| {
            let unit = next_slot;
            next_slot += 1;
            device.set_uniform_i32(location, unit as i32);
            unit
        });

        let truncated = active.name.chars().count() > MAX_UNIFORM_NAME_LENGTH;
        let name: String = active.name.chars().take(MAX_UNIFORM_NAME_LENGTH).collect();
        log::debug!("Custom uniform '{name}' {kind:?} at {} (slot {slot:?})", location.0);
        uniforms.push(CustomUniform { name, location, kind, slot, truncated });
    }

    uniforms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Vec2, Vec3, Vec4};
    use crate::render::api::TextureId;
    use crate::render::backends::recording::{DeviceCommand, RecordingDevice, UniformValue};

    #[test]
    fn test_split_routes_uniform_lines() {
        let code = "  uniform float uA;\n\nALBEDO.rgb *= uA;\n\tuniform vec3 uB;\nNORMAL = -NORMAL;\n   \n";
        let split = split_user_source(code);
        assert_eq!(split.declarations, "  uniform float uA;\n\tuniform vec3 uB;\n");
        assert_eq!(split.body, "ALBEDO.rgb *= uA;\nNORMAL = -NORMAL;\n");
    }

    #[test]
    fn test_uniform_keyword_needs_a_trailing_space() {
        let split = split_user_source("uniformity = 1.0;");
        assert!(split.declarations.is_empty());
        assert_eq!(split.body, "uniformity = 1.0;\n");
    }

    #[test]
    fn test_compose_places_both_halves() {
        let template = "#version 330 core\nuniform float uBase;\nvoid main() {\n    #define R3D_USER_FRAGMENT_MARKER 0\n}\n";
        let user = split_user_source("uniform float uX;\nALBEDO.r = uX;");
        let composed = compose_fragment(template, &user).unwrap();
        assert_eq!(
            composed,
            "#version 330 core\nuniform float uX;\nuniform float uBase;\nvoid main() {\n    ALBEDO.r = uX;\n\n}\n"
        );
    }

    #[test]
    fn test_compose_requires_version_and_marker() {
        let user = UserSource::default();
        assert!(matches!(compose_fragment("void main() {}", &user), Err(RenderError::ShaderComposition(_))));
        assert!(matches!(
            compose_fragment("#version 330 core\nvoid main() {}", &user),
            Err(RenderError::ShaderComposition(_))
        ));
    }

    #[test]
    fn test_discovers_exactly_the_user_uniforms() {
        let mut device = RecordingDevice::new();
        let code = "uniform float uA;\nuniform vec2 uB;\nuniform sampler2D uMaskA;\nuniform vec4 uC;\nuniform sampler2D uMaskB;\nALBEDO.rgb *= uA;";
        let shader = CustomShader::create(&mut device, code).unwrap();

        let names: Vec<_> = shader.uniforms().iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, ["uA", "uB", "uMaskA", "uC", "uMaskB"]);

        let mut locations: Vec<_> = shader.uniforms().iter().map(|u| u.location).collect();
        locations.dedup();
        assert_eq!(locations.len(), 5);

        let slots: Vec<_> = shader.uniforms().iter().filter_map(|u| u.slot).collect();
        assert_eq!(slots, [FIRST_CUSTOM_SLOT, FIRST_CUSTOM_SLOT + 1]);
    }

    #[test]
    fn test_sampler_slots_are_set_at_creation() {
        let mut device = RecordingDevice::new();
        let log = device.log();
        CustomShader::create(&mut device, "uniform sampler2D uMask;\nALBEDO *= texture(uMask, vTexCoord);").unwrap();
        assert_eq!(log.uniform_values("uMask"), vec![UniformValue::I32(5)]);
        assert_eq!(log.uniform_values("uTexORM"), vec![UniformValue::I32(4)]);
    }

    #[test]
    fn test_unsupported_types_and_overflow_are_dropped() {
        let mut device = RecordingDevice::new();
        let mut code = String::from("uniform mat4 uM;\nuniform int uI;\n");
        for i in 0..20 {
            code.push_str(&format!("uniform float uF{i};\n"));
        }
        code.push_str("ALBEDO.a = 1.0;");
        let shader = CustomShader::create(&mut device, &code).unwrap();
        assert_eq!(shader.uniforms().len(), MAX_CUSTOM_UNIFORMS);
        assert!(shader.uniforms().iter().all(|u| u.kind == CustomUniformKind::Float));
    }

    #[test]
    fn test_long_names_are_truncated_and_never_matched() {
        let mut device = RecordingDevice::new();
        let long = format!("u{}", "x".repeat(80));
        let shader = CustomShader::create(&mut device, &format!("uniform float {long};\nALBEDO.a = {long};")).unwrap();
        let uniform = &shader.uniforms()[0];
        assert_eq!(uniform.name.len(), MAX_UNIFORM_NAME_LENGTH);
        assert!(uniform.truncated);

        let log = device.log();
        let mut material = Material::with_shader(Default::default());
        material.set_float(&long, 1.0);
        material.set_float(&uniform.name, 2.0);
        let before = log.len();
        shader.bind_params(&mut device, &material);
        assert_eq!(log.len(), before);
    }

    #[test]
    fn test_compile_error_leaves_nothing_behind() {
        let mut device = RecordingDevice::new();
        let log = device.log();
        let err = CustomShader::create(&mut device, "ALBEDO.rgb = vec3(1.0);\n}").unwrap_err();
        assert!(matches!(err, RenderError::ShaderCompilation { .. }));
        assert!(!log.commands().iter().any(|c| matches!(c, DeviceCommand::LinkProgram { .. })));
    }

    #[test]
    fn test_empty_source_is_rejected() {
        let mut device = RecordingDevice::new();
        assert!(CustomShader::create(&mut device, "  \n\t\n").is_err());
    }

    #[test]
    fn test_bind_skips_mismatches_and_keeps_components() {
        let mut device = RecordingDevice::new();
        let log = device.log();
        let shader = CustomShader::create(
            &mut device,
            "uniform vec3 uTint;\nuniform float uBlend;\nuniform vec2 uPan;\nuniform sampler2D uMask;\nALBEDO.rgb *= uTint;",
        )
        .unwrap();

        let mut material = Material::default();
        material.set_vec3("uTint", Vec3::new(0.25, -3.5, 1e-7));
        material.set_vec4("uBlend", Vec4::new(1.0, 1.0, 1.0, 1.0));
        material.set_vec2("uPan", Vec2::new(0.5, 0.75));
        material.set_texture("uMask", TextureId(42));

        device.use_program(Some(shader.program()));
        shader.bind_params(&mut device, &material);

        assert_eq!(log.uniform_values("uTint"), vec![UniformValue::Vec3([0.25, -3.5, 1e-7])]);
        assert_eq!(log.uniform_values("uPan"), vec![UniformValue::Vec2([0.5, 0.75])]);
        assert!(log.uniform_values("uBlend").is_empty());
        assert!(log.commands().contains(&DeviceCommand::BindTexture {
            target: TextureTarget::Texture2D,
            texture: Some(TextureId(42)),
        }));
    }
}
