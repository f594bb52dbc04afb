//! # Draw Call Collector & Sorter
//!
//! Submissions between `begin` and `end` become draw groups (shared transform,
//! skinning and instancing data) and draw calls (one mesh and material each).
//! Calls are bucketed by pass category at push time; passes walk the buckets
//! through [`DrawIter`], filtered by a predicate and by group visibility.

mod collector;
mod iter;

pub use collector::DrawCollector;
pub use iter::{DrawItem, DrawIter};

use crate::foundation::bounds::BoundingBox;
use crate::foundation::math::{Color, Mat4, Vec3};
use crate::render::api::TextureId;
use crate::render::material::{BlendMode, Material, TransparencyMode};
use crate::render::mesh::Mesh;

/// Pass a draw call is rendered in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawCategory {
    /// Opaque geometry written to the G-buffer
    Deferred,
    /// Decals projected onto the G-buffer
    Decal,
    /// Alpha-tested geometry rendered to depth, then shaded forward
    Prepass,
    /// Blended geometry shaded forward
    Forward,
}

impl DrawCategory {
    /// Every category in storage order
    pub const ALL: [Self; 4] = [Self::Deferred, Self::Decal, Self::Prepass, Self::Forward];

    fn index(self) -> usize {
        self as usize
    }

    /// Category of a (material, decal) pair
    pub fn classify(material: &Material, is_decal: bool) -> Self {
        if is_decal {
            return Self::Decal;
        }
        match material.blend_mode {
            BlendMode::Mix => match material.transparency_mode {
                TransparencyMode::Disabled => Self::Deferred,
                TransparencyMode::Prepass => Self::Prepass,
                TransparencyMode::Alpha => Self::Forward,
            },
            _ => Self::Forward,
        }
    }
}

/// Sort direction by camera distance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Nearest first
    FrontToBack,
    /// Farthest first
    BackToFront,
}

/// Per-instance data of an instanced group
#[derive(Debug, Clone, PartialEq)]
pub struct Instances {
    /// Instance transforms, applied before the group transform
    pub transforms: Vec<Mat4>,
    /// Optional per-instance tint, same length as `transforms`
    pub colors: Option<Vec<Color>>,
}

impl Instances {
    /// Number of instances
    pub fn count(&self) -> usize {
        self.transforms.len()
    }
}

/// Data shared by every call of one submission
#[derive(Debug, Clone, PartialEq)]
pub struct DrawGroup {
    /// World transform
    pub transform: Mat4,
    /// Bounds in group space; an empty box disables culling for the group
    pub aabb: BoundingBox,
    /// Bone matrix texture when the geometry is skinned
    pub skin_texture: Option<TextureId>,
    /// Instancing block
    pub instances: Option<Instances>,
    pub(crate) visible: bool,
}

impl DrawGroup {
    /// Non-instanced group
    pub fn new(transform: Mat4, aabb: BoundingBox) -> Self {
        Self { transform, aabb, skin_texture: None, instances: None, visible: true }
    }

    /// Attach skinning data
    pub fn with_skin(mut self, texture: Option<TextureId>) -> Self {
        self.skin_texture = texture;
        self
    }

    /// Attach instancing data
    pub fn with_instances(mut self, instances: Instances) -> Self {
        self.instances = Some(instances);
        self
    }

    /// Bounds in world space
    pub fn world_aabb(&self) -> BoundingBox {
        if self.aabb.is_empty() { self.aabb } else { self.aabb.transformed(&self.transform) }
    }

    /// Visible after the last frustum test
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Instance count, 0 for non-instanced groups
    pub fn instance_count(&self) -> usize {
        self.instances.as_ref().map_or(0, Instances::count)
    }
}

/// One mesh drawn with one material
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    /// Index of the owning group in the collector
    pub group: usize,
    /// Geometry
    pub mesh: Mesh,
    /// Surface
    pub material: Material,
}

impl DrawCall {
    /// Point used as sort key: the mesh box center in world space, or the group origin
    pub fn sort_center(&self, group: &DrawGroup) -> Vec3 {
        let local = if self.mesh.aabb.is_empty() { Vec3::zeros() } else { self.mesh.aabb.center() };
        group.transform.transform_point(&local.into()).coords
    }

    /// Mesh bounds in world space, used for forward light selection
    pub fn world_aabb(&self, group: &DrawGroup) -> BoundingBox {
        if group.instances.is_some() {
            group.world_aabb()
        } else {
            self.mesh.aabb.transformed(&group.transform)
        }
    }
}
