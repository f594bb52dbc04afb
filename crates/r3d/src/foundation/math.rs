//! Math utilities and types
//!
//! Provides fundamental math types for 3D rendering. Matrices follow OpenGL
//! conventions: column-major storage, right-handed view space, clip depth in [-1, 1].

use serde::{Deserialize, Serialize};

pub use nalgebra::{Matrix3, Matrix4, Quaternion, Unit, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// 8-bit RGBA color
///
/// Shader uniforms receive colors normalized to `[0, 1]` by dividing each channel by 255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    /// Red channel
    pub r: u8,
    /// Green channel
    pub g: u8,
    /// Blue channel
    pub b: u8,
    /// Alpha channel
    pub a: u8,
}

impl Color {
    /// Opaque white
    pub const WHITE: Self = Self::new(255, 255, 255, 255);
    /// Opaque black
    pub const BLACK: Self = Self::new(0, 0, 0, 255);
    /// Fully transparent black
    pub const BLANK: Self = Self::new(0, 0, 0, 0);
    /// Neutral gray used as the default background
    pub const GRAY: Self = Self::new(130, 130, 130, 255);

    /// Create a color from its four channels
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Normalized RGBA
    pub fn to_vec4(self) -> Vec4 {
        Vec4::new(
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
            f32::from(self.a) / 255.0,
        )
    }

    /// Normalized RGB, alpha dropped
    pub fn to_vec3(self) -> Vec3 {
        self.to_vec4().xyz()
    }

    /// Normalized alpha
    pub fn alpha(self) -> f32 {
        f32::from(self.a) / 255.0
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

/// Integer pixel rectangle, origin at the bottom-left like GL viewports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    /// Left edge
    pub x: i32,
    /// Bottom edge
    pub y: i32,
    /// Width in pixels
    pub w: i32,
    /// Height in pixels
    pub h: i32,
}

impl Rect {
    /// Create a rectangle
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Rectangle covering a whole target of the given size
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }
}

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;
}

/// Math utility functions
pub mod utils {
    use super::{constants, Mat3, Mat4, Point3, Quat, Unit, Vec3, Vec4};

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * constants::DEG_TO_RAD
    }

    /// Linear interpolation
    pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
        a + (b - a) * t
    }

    /// Right-handed look-at view matrix
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        Mat4::look_at_rh(&Point3::from(eye), &Point3::from(target), &up)
    }

    /// OpenGL perspective projection, `fovy` in radians
    pub fn perspective(fovy: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        Mat4::new_perspective(aspect, fovy, near, far)
    }

    /// OpenGL orthographic projection
    pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
        Mat4::new_orthographic(left, right, bottom, top, near, far)
    }

    /// Matrix used to transform normals: inverse-transpose of the upper 3x3 of `model`
    ///
    /// Singular models fall back to the plain upper 3x3 so degenerate scales do not produce NaNs.
    pub fn normal_matrix(model: &Mat4) -> Mat4 {
        let upper: Mat3 = model.fixed_view::<3, 3>(0, 0).into_owned();
        let normal = upper.try_inverse().map_or(upper, |inv| inv.transpose());
        normal.to_homogeneous()
    }

    /// Compose scale, axis-angle rotation (angle in radians) and translation
    pub fn scale_rotation_translation(scale: Vec3, axis: Vec3, angle: f32, translation: Vec3) -> Mat4 {
        let rotation = if axis.norm_squared() > f32::EPSILON {
            Quat::from_axis_angle(&Unit::new_normalize(axis), angle).to_homogeneous()
        } else {
            Mat4::identity()
        };
        Mat4::new_translation(&translation) * rotation * Mat4::new_nonuniform_scaling(&scale)
    }

    /// Project a world-space point with a view-projection matrix; `None` behind the eye
    pub fn project_to_ndc(view_proj: &Mat4, point: Vec3) -> Option<Vec3> {
        let clip = view_proj * Vec4::new(point.x, point.y, point.z, 1.0);
        if clip.w <= f32::EPSILON {
            return None;
        }
        Some(clip.xyz() / clip.w)
    }

    /// Column-major float array for GL uniform upload
    pub fn mat4_to_array(matrix: &Mat4) -> [f32; 16] {
        let mut out = [0.0; 16];
        out.copy_from_slice(matrix.as_slice());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_color_normalization() {
        let color = Color::new(255, 0, 51, 255);
        let v = color.to_vec4();
        assert_relative_eq!(v.x, 1.0);
        assert_relative_eq!(v.y, 0.0);
        assert_relative_eq!(v.z, 0.2);
        assert_relative_eq!(v.w, 1.0);
    }

    #[test]
    fn test_normal_matrix_of_uniform_scale_is_scaled_identity() {
        let model = Mat4::new_scaling(2.0);
        let normal = utils::normal_matrix(&model);
        assert_relative_eq!(normal[(0, 0)], 0.5);
        assert_relative_eq!(normal[(1, 1)], 0.5);
        assert_relative_eq!(normal[(2, 2)], 0.5);
        assert_relative_eq!(normal[(3, 3)], 1.0);
    }

    #[test]
    fn test_scale_rotation_translation_places_origin() {
        let m = utils::scale_rotation_translation(
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(0.0, 1.0, 0.0),
            0.0,
            Vec3::new(1.0, 2.0, 3.0),
        );
        let p = m.transform_point(&Point3::origin());
        assert_relative_eq!(p.coords, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_projection_behind_eye_is_rejected() {
        let view = utils::look_at(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0), Vec3::y());
        let proj = utils::perspective(utils::deg_to_rad(60.0), 1.0, 0.1, 100.0);
        let vp = proj * view;
        assert!(utils::project_to_ndc(&vp, Vec3::new(0.0, 0.0, 5.0)).is_none());
        let ndc = utils::project_to_ndc(&vp, Vec3::new(0.0, 0.0, -5.0)).unwrap();
        assert_relative_eq!(ndc.x, 0.0);
        assert_relative_eq!(ndc.y, 0.0);
    }
}
