//! Scene environment: background, ambient light, screen-space effects and post chain settings
//!
//! Every block is a plain serde struct with renderer defaults, so a whole
//! environment can be shipped as a TOML or RON file and loaded through
//! [`Config`].

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::foundation::math::{Color, Quat};
use crate::render::api::TextureId;

/// Complete environment description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Environment {
    /// Background color or sky
    pub background: Background,
    /// Ambient light
    pub ambient: Ambient,
    /// Screen-space ambient occlusion
    pub ssao: Ssao,
    /// Screen-space indirect lighting
    pub ssil: Ssil,
    /// Screen-space reflections
    pub ssr: Ssr,
    /// Bloom
    pub bloom: Bloom,
    /// Distance fog
    pub fog: Fog,
    /// Depth of field
    pub dof: DepthOfField,
    /// Tonemapping operator and exposure
    pub tonemap: Tonemap,
    /// Final color adjustment
    pub adjustment: ColorAdjustment,
}

impl Config for Environment {}

/// Sky cube maps produced by an external loader
///
/// Textures are borrowed: the environment never deletes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Skybox {
    /// Radiance cube map drawn as the background
    pub cubemap: TextureId,
    /// Diffuse irradiance cube map
    pub irradiance: TextureId,
    /// Specular prefiltered cube map
    pub prefilter: TextureId,
    /// Mip count of the prefiltered map
    pub prefilter_mips: u32,
}

/// Background settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Background {
    /// Clear color when no sky is set
    pub color: Color,
    /// Background energy multiplier
    pub energy: f32,
    /// Sky used for the background and image-based lighting
    #[serde(skip)]
    pub sky: Option<Skybox>,
    /// Sky orientation
    pub rotation: Quat,
}

impl Default for Background {
    fn default() -> Self {
        Self {
            color: Color::GRAY,
            energy: 1.0,
            sky: None,
            rotation: Quat::identity(),
        }
    }
}

/// Ambient light used when no sky is set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ambient {
    /// Ambient color
    pub color: Color,
    /// Diffuse ambient energy
    pub energy: f32,
    /// Specular reflection energy of the sky
    pub reflect: f32,
}

impl Default for Ambient {
    fn default() -> Self {
        Self { color: Color::BLACK, energy: 1.0, reflect: 1.0 }
    }
}

/// SSAO settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ssao {
    /// Effect toggle
    pub enabled: bool,
    /// Kernel sample count
    pub sample_count: u32,
    /// Sampling radius in world units
    pub radius: f32,
    /// Depth bias against self-occlusion
    pub bias: f32,
    /// Occlusion intensity
    pub intensity: f32,
    /// Occlusion curve exponent
    pub power: f32,
    /// How much occlusion also darkens direct lighting (0..1)
    pub light_affect: f32,
}

impl Default for Ssao {
    fn default() -> Self {
        Self {
            enabled: false,
            sample_count: 16,
            radius: 0.5,
            bias: 0.025,
            intensity: 1.0,
            power: 1.0,
            light_affect: 0.0,
        }
    }
}

/// SSIL settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ssil {
    /// Effect toggle
    pub enabled: bool,
    /// Samples per slice
    pub sample_count: u32,
    /// Horizon slices per pixel
    pub slice_count: u32,
    /// Sampling radius in world units
    pub sample_radius: f32,
    /// Assumed thickness of depth buffer surfaces
    pub hit_thickness: f32,
    /// Exponent applied to the occlusion term
    pub ao_power: f32,
    /// Indirect light energy
    pub energy: f32,
}

impl Default for Ssil {
    fn default() -> Self {
        Self {
            enabled: false,
            sample_count: 4,
            slice_count: 4,
            sample_radius: 2.0,
            hit_thickness: 0.5,
            ao_power: 1.0,
            energy: 1.0,
        }
    }
}

/// SSR settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ssr {
    /// Effect toggle
    pub enabled: bool,
    /// Linear march steps
    pub max_ray_steps: u32,
    /// Refinement steps after a hit
    pub binary_search_steps: u32,
    /// Maximum ray length in world units
    pub ray_march_length: f32,
    /// Surface thickness for hit detection
    pub depth_thickness: f32,
    /// Depth tolerance for hit detection
    pub depth_tolerance: f32,
    /// Screen edge fade start (0..1)
    pub edge_fade_start: f32,
    /// Screen edge fade end (0..1)
    pub edge_fade_end: f32,
}

impl Default for Ssr {
    fn default() -> Self {
        Self {
            enabled: false,
            max_ray_steps: 64,
            binary_search_steps: 8,
            ray_march_length: 8.0,
            depth_thickness: 0.2,
            depth_tolerance: 0.005,
            edge_fade_start: 0.7,
            edge_fade_end: 1.0,
        }
    }
}

/// How the blurred bloom buffer is merged back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BloomMode {
    /// No bloom
    Disabled,
    /// Linear interpolation by intensity
    Mix,
    /// Added on top of the scene
    Additive,
    /// Screen blend
    Screen,
}

/// Bloom settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bloom {
    /// Merge mode
    pub mode: BloomMode,
    /// Fraction of the mip chain used (0..1)
    pub levels: f32,
    /// Merge intensity
    pub intensity: f32,
    /// Brightness threshold for the prefilter
    pub threshold: f32,
    /// Knee softness relative to the threshold (0..1)
    pub soft_threshold: f32,
    /// Upsampling tent filter radius
    pub filter_radius: f32,
}

impl Default for Bloom {
    fn default() -> Self {
        Self {
            mode: BloomMode::Disabled,
            levels: 0.5,
            intensity: 0.05,
            threshold: 0.0,
            soft_threshold: 0.5,
            filter_radius: 1.0,
        }
    }
}

impl Bloom {
    /// Prefilter curve `(threshold, threshold - knee, 2 * knee, 0.25 / knee)` sent to the down-sampler
    pub fn prefilter(&self) -> [f32; 4] {
        let knee = self.threshold * self.soft_threshold;
        [self.threshold, self.threshold - knee, 2.0 * knee, 0.25 / (knee + 1e-5)]
    }

    /// Number of mip levels processed for a chain of `mip_count` levels
    pub fn max_level(&self, mip_count: u32) -> u32 {
        let wanted = (mip_count as f32 * self.levels).round() as u32;
        wanted.clamp(1, mip_count.max(1))
    }
}

/// Fog falloff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FogMode {
    /// No fog
    Disabled,
    /// Linear between start and end
    Linear,
    /// exp2 falloff by density
    Exp2,
    /// exp falloff by density
    Exp,
}

/// Fog settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fog {
    /// Falloff mode
    pub mode: FogMode,
    /// Fog color
    pub color: Color,
    /// Linear start distance
    pub start: f32,
    /// Linear end distance
    pub end: f32,
    /// Exponential density
    pub density: f32,
    /// Fog amount applied to the sky (0..1)
    pub sky_affect: f32,
}

impl Default for Fog {
    fn default() -> Self {
        Self {
            mode: FogMode::Disabled,
            color: Color::WHITE,
            start: 1.0,
            end: 50.0,
            density: 0.05,
            sky_affect: 0.5,
        }
    }
}

/// Depth of field toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DofMode {
    /// No depth of field
    Disabled,
    /// Circle-of-confusion blur
    Enabled,
}

/// Depth of field settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthOfField {
    /// Toggle
    pub mode: DofMode,
    /// Focus distance in world units
    pub focus_point: f32,
    /// Width of the in-focus region
    pub focus_scale: f32,
    /// Maximum blur radius in pixels
    pub max_blur_size: f32,
    /// Output the circle of confusion instead of the image
    pub debug: bool,
}

impl Default for DepthOfField {
    fn default() -> Self {
        Self {
            mode: DofMode::Disabled,
            focus_point: 10.0,
            focus_scale: 1.0,
            max_blur_size: 20.0,
            debug: false,
        }
    }
}

/// Tonemapping operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TonemapMode {
    /// Clamp only
    Linear,
    /// Reinhard
    Reinhard,
    /// Filmic curve
    Filmic,
    /// ACES fit
    Aces,
    /// AgX
    Agx,
}

/// Tonemap settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tonemap {
    /// Operator
    pub mode: TonemapMode,
    /// Exposure multiplier
    pub exposure: f32,
    /// White point
    pub white: f32,
}

impl Default for Tonemap {
    fn default() -> Self {
        Self { mode: TonemapMode::Linear, exposure: 1.0, white: 1.0 }
    }
}

/// Final color grading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorAdjustment {
    /// Brightness multiplier
    pub brightness: f32,
    /// Contrast multiplier
    pub contrast: f32,
    /// Saturation multiplier
    pub saturation: f32,
}

impl Default for ColorAdjustment {
    fn default() -> Self {
        Self { brightness: 1.0, contrast: 1.0, saturation: 1.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults() {
        let env = Environment::default();
        assert_eq!(env.background.color, Color::new(130, 130, 130, 255));
        assert_eq!(env.ssao.sample_count, 16);
        assert_eq!(env.ssr.max_ray_steps, 64);
        assert_eq!(env.bloom.mode, BloomMode::Disabled);
        assert_relative_eq!(env.fog.end, 50.0);
    }

    #[test]
    fn test_bloom_prefilter_curve() {
        let bloom = Bloom { threshold: 1.0, soft_threshold: 0.5, ..Bloom::default() };
        let [t, t_minus_knee, two_knee, inv] = bloom.prefilter();
        assert_relative_eq!(t, 1.0);
        assert_relative_eq!(t_minus_knee, 0.5);
        assert_relative_eq!(two_knee, 1.0);
        assert_relative_eq!(inv, 0.25 / (0.5 + 1e-5));
    }

    #[test]
    fn test_bloom_max_level_is_clamped() {
        let mut bloom = Bloom::default();
        assert_eq!(bloom.max_level(11), 6);
        bloom.levels = 0.0;
        assert_eq!(bloom.max_level(11), 1);
        bloom.levels = 3.0;
        assert_eq!(bloom.max_level(11), 11);
    }

    #[test]
    fn test_environment_file_skips_sky_handles() {
        let mut env = Environment::default();
        env.fog.mode = FogMode::Exp2;
        env.background.sky = Some(Skybox {
            cubemap: TextureId(4),
            irradiance: TextureId(5),
            prefilter: TextureId(6),
            prefilter_mips: 8,
        });
        let text = env.to_text("env.ron").unwrap();
        let parsed = Environment::parse("env.ron", &text).unwrap();
        assert_eq!(parsed.fog.mode, FogMode::Exp2);
        assert!(parsed.background.sky.is_none());
    }
}
