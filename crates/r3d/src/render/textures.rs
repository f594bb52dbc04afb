//! Default textures, the BRDF lookup table and image loading
//!
//! Unset material textures (`TextureId::NONE`) are replaced at bind time by
//! one of the defaults created here.

use std::path::Path;

use crate::foundation::math::Vec3;
use crate::render::api::{RenderDevice, TextureDesc, TextureFilter, TextureFormat, TextureId, TextureWrap};
use crate::render::{RenderError, RenderResult};

/// Side of the BRDF integration table
pub const BRDF_LUT_SIZE: u32 = 64;

const BRDF_SAMPLES: u32 = 64;

/// Placeholder textures substituted for unset handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultTextures {
    /// Opaque white
    pub white: TextureId,
    /// Opaque black
    pub black: TextureId,
    /// Transparent black
    pub blank: TextureId,
    /// Flat tangent-space normal (128, 128, 255)
    pub normal: TextureId,
    /// Split-sum BRDF integration table, RG16F
    pub brdf_lut: TextureId,
}

impl DefaultTextures {
    /// Create every default texture
    pub fn create(device: &mut dyn RenderDevice) -> RenderResult<Self> {
        let white = pixel(device, [255, 255, 255, 255])?;
        let black = pixel(device, [0, 0, 0, 255])?;
        let blank = pixel(device, [0, 0, 0, 0])?;
        let normal = pixel(device, [128, 128, 255, 255])?;

        let lut = generate_brdf_lut(BRDF_LUT_SIZE);
        let desc = TextureDesc::texture_2d(BRDF_LUT_SIZE, BRDF_LUT_SIZE, TextureFormat::Rg16F);
        let brdf_lut = device.create_texture(&desc, Some(bytemuck::cast_slice(&lut)))?;

        log::debug!("Default textures created (BRDF LUT {BRDF_LUT_SIZE}x{BRDF_LUT_SIZE})");
        Ok(Self { white, black, blank, normal, brdf_lut })
    }

    /// True when `texture` is one of the defaults
    pub fn is_default(&self, texture: TextureId) -> bool {
        [self.white, self.black, self.blank, self.normal, self.brdf_lut].contains(&texture)
    }

    /// Release every default texture
    pub fn destroy(&self, device: &mut dyn RenderDevice) {
        for texture in [self.white, self.black, self.blank, self.normal, self.brdf_lut] {
            device.delete_texture(texture);
        }
    }
}

fn pixel(device: &mut dyn RenderDevice, rgba: [u8; 4]) -> RenderResult<TextureId> {
    let desc = TextureDesc::texture_2d(1, 1, TextureFormat::Rgba8)
        .with_filter(TextureFilter::Nearest)
        .with_wrap(TextureWrap::Repeat);
    device.create_texture(&desc, Some(&rgba))
}

fn radical_inverse(i: u32) -> f32 {
    i.reverse_bits() as f32 * 2.328_306_4e-10
}

fn importance_sample_ggx(xi: (f32, f32), roughness: f32) -> Vec3 {
    let a = roughness * roughness;
    let phi = std::f32::consts::TAU * xi.0;
    let cos_theta = ((1.0 - xi.1) / (1.0 + (a * a - 1.0) * xi.1)).sqrt();
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    Vec3::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta)
}

fn geometry_smith(n_dot_v: f32, n_dot_l: f32, roughness: f32) -> f32 {
    let k = roughness * roughness / 2.0;
    let g = |n_dot_x: f32| n_dot_x / (n_dot_x * (1.0 - k) + k);
    g(n_dot_v) * g(n_dot_l)
}

/// Scale and bias to F0 for one (N·V, roughness) pair
pub fn integrate_brdf(n_dot_v: f32, roughness: f32) -> (f32, f32) {
    let v = Vec3::new((1.0 - n_dot_v * n_dot_v).max(0.0).sqrt(), 0.0, n_dot_v);
    let (mut a, mut b) = (0.0f32, 0.0f32);
    for i in 0..BRDF_SAMPLES {
        let xi = (i as f32 / BRDF_SAMPLES as f32, radical_inverse(i));
        let h = importance_sample_ggx(xi, roughness);
        let l = h * (2.0 * v.dot(&h)) - v;
        let n_dot_l = l.z.max(0.0);
        let n_dot_h = h.z.max(0.0);
        let v_dot_h = v.dot(&h).max(0.0);
        if n_dot_l > 0.0 {
            let g = geometry_smith(n_dot_v, n_dot_l, roughness);
            let g_vis = g * v_dot_h / (n_dot_h * n_dot_v).max(1e-6);
            let fc = (1.0 - v_dot_h).powi(5);
            a += (1.0 - fc) * g_vis;
            b += fc * g_vis;
        }
    }
    (a / BRDF_SAMPLES as f32, b / BRDF_SAMPLES as f32)
}

/// Row-major RG table; x is N·V, y is roughness
pub fn generate_brdf_lut(size: u32) -> Vec<f32> {
    let mut data = Vec::with_capacity((size * size * 2) as usize);
    for y in 0..size {
        let roughness = (y as f32 + 0.5) / size as f32;
        for x in 0..size {
            let n_dot_v = (x as f32 + 0.5) / size as f32;
            let (scale, bias) = integrate_brdf(n_dot_v, roughness);
            data.push(scale);
            data.push(bias);
        }
    }
    data
}

/// Load an image file into an RGBA8 texture with mipmaps
pub fn load_texture(device: &mut dyn RenderDevice, path: impl AsRef<Path>) -> RenderResult<TextureId> {
    let path = path.as_ref();
    let image = image::open(path)
        .map_err(|e| RenderError::ResourceCreationFailed(format!("Failed to load '{}': {e}", path.display())))?;
    let texture = texture_from_image(device, &image)?;
    log::info!("Loaded texture '{}' ({}x{})", path.display(), image.width(), image.height());
    Ok(texture)
}

/// Upload a decoded image as an RGBA8 texture with mipmaps
pub fn texture_from_image(device: &mut dyn RenderDevice, image: &image::DynamicImage) -> RenderResult<TextureId> {
    let rgba = image.to_rgba8();
    let desc = TextureDesc::texture_2d(rgba.width(), rgba.height(), TextureFormat::Rgba8)
        .with_wrap(TextureWrap::Repeat)
        .with_mipmaps();
    device.create_texture(&desc, Some(rgba.as_raw()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::RecordingDevice;

    #[test]
    fn test_brdf_lut_is_bounded() {
        let lut = generate_brdf_lut(8);
        assert_eq!(lut.len(), 8 * 8 * 2);
        assert!(lut.iter().all(|v| v.is_finite() && *v >= 0.0 && *v <= 1.05));
    }

    #[test]
    fn test_smooth_head_on_brdf_is_near_one() {
        let (scale, bias) = integrate_brdf(0.99, 0.05);
        assert!(scale + bias > 0.9, "scale {scale} bias {bias}");
    }

    #[test]
    fn test_defaults_are_recognised() {
        let mut device = RecordingDevice::new();
        let defaults = DefaultTextures::create(&mut device).unwrap();
        assert!(defaults.is_default(defaults.normal));
        assert!(!defaults.is_default(TextureId(999)));
    }

    #[test]
    fn test_image_upload() {
        let mut device = RecordingDevice::new();
        let image = image::DynamicImage::new_rgb8(4, 2);
        assert!(texture_from_image(&mut device, &image).unwrap().is_set());
    }
}
