//! Materials and their custom shader parameters

use crate::foundation::math::{Color, Vec2, Vec3, Vec4};
use crate::render::api::{RenderDevice, TextureId};
use crate::render::shader::ShaderId;
use crate::render::textures::DefaultTextures;

/// How transparency is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransparencyMode {
    /// Opaque, rendered in the deferred path
    #[default]
    Disabled,
    /// Depth prepass with a high cutoff, then forward shading
    Prepass,
    /// Forward shading with alpha blending
    Alpha,
}

/// Billboard orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BillboardMode {
    /// Regular geometry
    #[default]
    Disabled,
    /// Faces the camera on every axis
    Front,
    /// Rotates around the Y axis only
    YAxis,
}

impl BillboardMode {
    /// Integer passed to `uBillboard`
    pub fn as_uniform(self) -> i32 {
        match self {
            Self::Disabled => 0,
            Self::Front => 1,
            Self::YAxis => 2,
        }
    }
}

/// Color blend equation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    /// Alpha mix
    #[default]
    Mix,
    /// Additive
    Additive,
    /// Multiplicative
    Multiply,
    /// Premultiplied alpha
    PremultipliedAlpha,
}

/// Face culling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullMode {
    /// Double sided
    None,
    /// Cull back faces
    #[default]
    Back,
    /// Cull front faces
    Front,
}

/// Albedo map and color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlbedoMap {
    /// Texture, white when unset
    pub texture: TextureId,
    /// Tint
    pub color: Color,
}

/// Emission map, color and energy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmissionMap {
    /// Texture, white when unset
    pub texture: TextureId,
    /// Tint
    pub color: Color,
    /// Multiplier
    pub energy: f32,
}

/// Tangent-space normal map
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalMap {
    /// Texture, flat normal when unset
    pub texture: TextureId,
    /// Strength
    pub scale: f32,
}

/// Occlusion (R), roughness (G) and metalness (B)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrmMap {
    /// Texture, white when unset
    pub texture: TextureId,
    /// Occlusion multiplier
    pub occlusion: f32,
    /// Roughness multiplier
    pub roughness: f32,
    /// Metalness multiplier
    pub metalness: f32,
}

/// Value of a named material parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    /// `float`
    Float(f32),
    /// `vec2`
    Vec2(Vec2),
    /// `vec3`
    Vec3(Vec3),
    /// `vec4`
    Vec4(Vec4),
    /// `sampler2D`
    Texture(TextureId),
}

/// Named value consumed by a custom shader uniform of the same name
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialParam {
    /// Uniform name
    pub name: String,
    /// Typed value
    pub value: ParamValue,
}

const INITIAL_PARAM_CAPACITY: usize = 4;

/// Surface description copied into draw calls
///
/// Texture handles are shared; a material never owns texture lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Albedo
    pub albedo: AlbedoMap,
    /// Emission
    pub emission: EmissionMap,
    /// Normal map
    pub normal: NormalMap,
    /// Occlusion/roughness/metalness
    pub orm: OrmMap,
    /// Transparency resolution
    pub transparency_mode: TransparencyMode,
    /// Billboard orientation
    pub billboard_mode: BillboardMode,
    /// Blend equation
    pub blend_mode: BlendMode,
    /// Face culling
    pub cull_mode: CullMode,
    /// Texture coordinate offset
    pub uv_offset: Vec2,
    /// Texture coordinate scale
    pub uv_scale: Vec2,
    /// Fragments with alpha below this are discarded
    pub alpha_cutoff: f32,
    /// Custom geometry shader
    pub shader: Option<ShaderId>,
    params: Vec<MaterialParam>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            albedo: AlbedoMap { texture: TextureId::NONE, color: Color::WHITE },
            emission: EmissionMap { texture: TextureId::NONE, color: Color::BLACK, energy: 0.0 },
            normal: NormalMap { texture: TextureId::NONE, scale: 1.0 },
            orm: OrmMap { texture: TextureId::NONE, occlusion: 1.0, roughness: 1.0, metalness: 0.0 },
            transparency_mode: TransparencyMode::Disabled,
            billboard_mode: BillboardMode::Disabled,
            blend_mode: BlendMode::Mix,
            cull_mode: CullMode::Back,
            uv_offset: Vec2::zeros(),
            uv_scale: Vec2::repeat(1.0),
            alpha_cutoff: 0.01,
            shader: None,
            params: Vec::new(),
        }
    }
}

impl Material {
    /// Material using a custom shader
    pub fn with_shader(shader: ShaderId) -> Self {
        Self { shader: Some(shader), ..Self::default() }
    }

    /// Parameters in insertion order
    pub fn params(&self) -> &[MaterialParam] {
        &self.params
    }

    /// Parameter by name
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    /// Insert or overwrite a parameter; type and value are both replaced
    pub fn set_param(&mut self, name: &str, value: ParamValue) {
        if let Some(existing) = self.params.iter_mut().find(|p| p.name == name) {
            existing.value = value;
            return;
        }
        if self.params.len() == self.params.capacity() {
            let grown = if self.params.capacity() == 0 { INITIAL_PARAM_CAPACITY } else { self.params.capacity() * 2 };
            self.params.reserve_exact(grown - self.params.len());
        }
        self.params.push(MaterialParam { name: name.to_string(), value });
    }

    /// Set a `float` parameter
    pub fn set_float(&mut self, name: &str, value: f32) {
        self.set_param(name, ParamValue::Float(value));
    }

    /// Set a `vec2` parameter
    pub fn set_vec2(&mut self, name: &str, value: Vec2) {
        self.set_param(name, ParamValue::Vec2(value));
    }

    /// Set a `vec3` parameter
    pub fn set_vec3(&mut self, name: &str, value: Vec3) {
        self.set_param(name, ParamValue::Vec3(value));
    }

    /// Set a `vec4` parameter
    pub fn set_vec4(&mut self, name: &str, value: Vec4) {
        self.set_param(name, ParamValue::Vec4(value));
    }

    /// Set a texture parameter
    pub fn set_texture(&mut self, name: &str, texture: TextureId) {
        self.set_param(name, ParamValue::Texture(texture));
    }

    /// True when this material goes through the deferred path
    pub fn is_opaque(&self) -> bool {
        self.transparency_mode == TransparencyMode::Disabled
    }

    /// Free every non-default texture referenced by this material
    pub fn unload(&self, device: &mut dyn RenderDevice, defaults: &DefaultTextures) {
        let textures = [self.albedo.texture, self.emission.texture, self.normal.texture, self.orm.texture];
        let params = self.params.iter().filter_map(|p| match p.value {
            ParamValue::Texture(t) => Some(t),
            _ => None,
        });
        let mut freed: Vec<TextureId> = Vec::new();
        for texture in textures.into_iter().chain(params) {
            if texture.is_set() && !defaults.is_default(texture) && !freed.contains(&texture) {
                device.delete_texture(texture);
                freed.push(texture);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults() {
        let m = Material::default();
        assert_eq!(m.albedo.color, Color::WHITE);
        assert_relative_eq!(m.orm.roughness, 1.0);
        assert_relative_eq!(m.alpha_cutoff, 0.01);
        assert_eq!(m.cull_mode, CullMode::Back);
        assert!(m.shader.is_none());
    }

    #[test]
    fn test_setting_same_name_twice_keeps_one_entry() {
        let mut m = Material::default();
        m.set_float("x", 1.0);
        m.set_float("x", 2.0);
        assert_eq!(m.params().len(), 1);
        assert_eq!(m.param("x"), Some(&ParamValue::Float(2.0)));
    }

    #[test]
    fn test_overwrite_replaces_type() {
        let mut m = Material::default();
        m.set_float("tint", 1.0);
        m.set_vec3("tint", Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(m.param("tint"), Some(&ParamValue::Vec3(Vec3::new(1.0, 2.0, 3.0))));
    }

    #[test]
    fn test_capacity_starts_at_four_and_doubles() {
        let mut m = Material::default();
        m.set_float("a", 0.0);
        assert_eq!(m.params.capacity(), 4);
        for name in ["b", "c", "d", "e"] {
            m.set_float(name, 0.0);
        }
        assert_eq!(m.params.capacity(), 8);
        assert_eq!(m.params().len(), 5);
    }
}
