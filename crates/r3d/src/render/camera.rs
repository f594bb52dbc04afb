//! # 3D Camera
//!
//! Position/target/up camera with perspective or orthographic projection.
//! The renderer supplies aspect ratio and clip distances at `begin`, so the
//! camera itself only describes where it looks and how wide.

use serde::{Deserialize, Serialize};

use crate::foundation::math::{utils, Mat4, Vec3};

/// Projection model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Projection {
    /// `fovy` is the vertical field of view in degrees
    Perspective,
    /// `fovy` is the height of the view volume in world units
    Orthographic,
}

/// 3D camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Eye position in world space
    pub position: Vec3,
    /// Point the camera looks at
    pub target: Vec3,
    /// Up vector
    pub up: Vec3,
    /// Vertical field of view (degrees) or orthographic height
    pub fovy: f32,
    /// Projection model
    pub projection: Projection,
}

impl Camera {
    /// Perspective camera looking at `target`
    pub fn perspective(position: Vec3, target: Vec3, fovy_degrees: f32) -> Self {
        Self {
            position,
            target,
            up: Vec3::y(),
            fovy: fovy_degrees,
            projection: Projection::Perspective,
        }
    }

    /// Orthographic camera looking at `target`
    pub fn orthographic(position: Vec3, target: Vec3, height: f32) -> Self {
        Self {
            projection: Projection::Orthographic,
            ..Self::perspective(position, target, height)
        }
    }

    /// Set the position
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        log::trace!("Camera position updated to: {:?}", position);
    }

    /// Point the camera at `target` with the given up vector
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        self.target = target;
        self.up = up;
        log::trace!("Camera look_at updated - target: {:?}, up: {:?}", target, up);
    }

    /// Normalized viewing direction
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).try_normalize(f32::EPSILON).unwrap_or_else(|| -Vec3::z())
    }

    /// World-to-view matrix
    pub fn view_matrix(&self) -> Mat4 {
        utils::look_at(self.position, self.target, self.up)
    }

    /// View-to-clip matrix for a target of the given aspect ratio
    pub fn projection_matrix(&self, aspect: f32, near: f32, far: f32) -> Mat4 {
        match self.projection {
            Projection::Perspective => utils::perspective(utils::deg_to_rad(self.fovy), aspect, near, far),
            Projection::Orthographic => {
                let top = self.fovy * 0.5;
                let right = top * aspect;
                utils::orthographic(-right, right, -top, top, near, far)
            }
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(Vec3::new(0.0, 3.0, 3.0), Vec3::zeros(), 45.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_view_matrix_moves_eye_to_origin() {
        let camera = Camera::perspective(Vec3::new(0.0, 0.0, 5.0), Vec3::zeros(), 60.0);
        let eye = camera.view_matrix().transform_point(&camera.position.into());
        assert_relative_eq!(eye.coords, Vec3::zeros(), epsilon = 1e-5);
    }

    #[test]
    fn test_forward_falls_back_when_target_equals_position() {
        let camera = Camera::perspective(Vec3::zeros(), Vec3::zeros(), 60.0);
        assert_relative_eq!(camera.forward(), -Vec3::z());
    }

    #[test]
    fn test_orthographic_projection_maps_half_height_to_ndc_edge() {
        let camera = Camera::orthographic(Vec3::new(0.0, 0.0, 5.0), Vec3::zeros(), 10.0);
        let proj = camera.projection_matrix(1.0, 0.1, 100.0);
        let top = proj.transform_point(&crate::foundation::math::Point3::new(0.0, 5.0, -1.0));
        assert_relative_eq!(top.y, 1.0, epsilon = 1e-5);
    }
}
