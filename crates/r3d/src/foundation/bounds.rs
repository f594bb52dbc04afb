//! Bounding volumes and frustum culling

use serde::{Deserialize, Serialize};

use super::math::{Mat4, Point3, Vec3, Vec4};

/// Axis-Aligned Bounding Box for visibility and overlap queries
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl BoundingBox {
    /// Zero-sized box at the origin; treated as "no bounds"
    pub const EMPTY: Self = Self {
        min: Vec3::new(0.0, 0.0, 0.0),
        max: Vec3::new(0.0, 0.0, 0.0),
    };

    /// Create a new box from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create a box centered at a point with given extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Smallest box enclosing every point
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        Some(iter.fold(Self::new(first, first), |acc, p| Self {
            min: acc.min.inf(&p),
            max: acc.max.sup(&p),
        }))
    }

    /// True when the box has no volume and no offset, the "unset" marker
    pub fn is_empty(&self) -> bool {
        self.min == self.max && self.min == Vec3::zeros()
    }

    /// Get the center of the box
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the box
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// The eight corners
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Axis-aligned box enclosing this box after transformation
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let corners = self
            .corners()
            .map(|c| matrix.transform_point(&Point3::from(c)).coords);
        Self::from_points(corners).unwrap_or(*self)
    }

    /// Check if this box contains a point
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// Check if this box intersects another box
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }
}

/// Plane defined by normal and distance from origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Normal vector (normalized)
    pub normal: Vec3,
    /// Distance from origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Build a normalized plane from the raw `ax + by + cz + d` coefficients
    fn from_coefficients(coefficients: Vec4) -> Self {
        let normal = coefficients.xyz();
        let length = normal.norm();
        if length <= f32::EPSILON {
            return Self { normal: Vec3::zeros(), distance: 0.0 };
        }
        Self {
            normal: normal / length,
            distance: coefficients.w / length,
        }
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }
}

/// Frustum for visibility culling
#[derive(Debug, Clone, PartialEq)]
pub struct Frustum {
    /// Six planes (left, right, bottom, top, near, far), normals pointing inward
    pub planes: [Plane; 6],
}

impl Default for Frustum {
    fn default() -> Self {
        Self::from_matrix(&Mat4::identity())
    }
}

impl Frustum {
    /// Extract frustum planes from a view-projection matrix (Gribb-Hartmann)
    pub fn from_matrix(vp: &Mat4) -> Self {
        let row = |i: usize| vp.row(i).transpose();
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));
        Self {
            planes: [
                Plane::from_coefficients(r3 + r0),
                Plane::from_coefficients(r3 - r0),
                Plane::from_coefficients(r3 + r1),
                Plane::from_coefficients(r3 - r1),
                Plane::from_coefficients(r3 + r2),
                Plane::from_coefficients(r3 - r2),
            ],
        }
    }

    /// Check if a box is inside or intersects the frustum
    pub fn intersects_aabb(&self, aabb: &BoundingBox) -> bool {
        for plane in &self.planes {
            // Corner furthest along the plane normal
            let mut p = aabb.min;
            if plane.normal.x >= 0.0 { p.x = aabb.max.x; }
            if plane.normal.y >= 0.0 { p.y = aabb.max.y; }
            if plane.normal.z >= 0.0 { p.z = aabb.max.z; }

            if plane.distance_to_point(p) < 0.0 {
                return false;
            }
        }
        true
    }

    /// Check if a point lies inside the frustum
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.distance_to_point(point) >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::utils;

    fn camera_frustum() -> Frustum {
        let view = utils::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::zeros(), Vec3::y());
        let proj = utils::perspective(utils::deg_to_rad(60.0), 1.0, 0.1, 100.0);
        Frustum::from_matrix(&(proj * view))
    }

    #[test]
    fn test_box_in_front_of_camera_is_visible() {
        let frustum = camera_frustum();
        let aabb = BoundingBox::from_center_extents(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0));
        assert!(frustum.intersects_aabb(&aabb));
    }

    #[test]
    fn test_box_behind_camera_is_culled() {
        let frustum = camera_frustum();
        let aabb = BoundingBox::from_center_extents(Vec3::new(0.0, 0.0, 20.0), Vec3::new(1.0, 1.0, 1.0));
        assert!(!frustum.intersects_aabb(&aabb));
    }

    #[test]
    fn test_box_beyond_far_plane_is_culled() {
        let frustum = camera_frustum();
        let aabb = BoundingBox::from_center_extents(Vec3::new(0.0, 0.0, -500.0), Vec3::new(1.0, 1.0, 1.0));
        assert!(!frustum.intersects_aabb(&aabb));
    }

    #[test]
    fn test_transformed_box_follows_translation() {
        let aabb = BoundingBox::from_center_extents(Vec3::zeros(), Vec3::new(0.5, 0.5, 0.5));
        let moved = aabb.transformed(&Mat4::new_translation(&Vec3::new(3.0, 0.0, 0.0)));
        assert_eq!(moved.center(), Vec3::new(3.0, 0.0, 0.0));
        assert!(!moved.intersects(&aabb));
    }

    #[test]
    fn test_empty_box_marker() {
        assert!(BoundingBox::default().is_empty());
        assert!(!BoundingBox::new(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0)).is_empty());
    }
}
