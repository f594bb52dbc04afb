use std::cmp::Ordering;

use crate::foundation::bounds::Frustum;
use crate::foundation::math::Vec3;
use crate::render::material::Material;
use crate::render::mesh::Mesh;

use super::{DrawCall, DrawCategory, DrawGroup, DrawItem, DrawIter, SortOrder};

/// Per-frame draw lists
///
/// Each category keeps a non-instanced and an instanced list.
#[derive(Debug, Default)]
pub struct DrawCollector {
    groups: Vec<DrawGroup>,
    lists: [[Vec<DrawCall>; 2]; 4],
}

impl DrawCollector {
    /// Empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every group and call, keeping allocations
    pub fn clear(&mut self) {
        self.groups.clear();
        for lists in &mut self.lists {
            for list in lists {
                list.clear();
            }
        }
    }

    /// Register a group; following calls attach to it
    pub fn push_group(&mut self, group: DrawGroup) -> usize {
        self.groups.push(group);
        self.groups.len() - 1
    }

    /// Attach a call to the most recent group and bucket it
    ///
    /// A call pushed before any group is dropped.
    pub fn push_call(&mut self, mesh: &Mesh, material: &Material, is_decal: bool) {
        let Some(group) = self.groups.len().checked_sub(1) else {
            log::warn!("Draw call pushed without a group; ignored");
            return;
        };
        let category = DrawCategory::classify(material, is_decal);
        let instanced = usize::from(self.groups[group].instances.is_some());
        self.lists[category.index()][instanced].push(DrawCall {
            group,
            mesh: mesh.clone(),
            material: material.clone(),
        });
    }

    /// Group by index
    pub fn group(&self, index: usize) -> Option<&DrawGroup> {
        self.groups.get(index)
    }

    /// Number of groups
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Calls of one list
    pub fn list(&self, category: DrawCategory, instanced: bool) -> &[DrawCall] {
        &self.lists[category.index()][usize::from(instanced)]
    }

    /// Calls in a category, both lists
    pub fn count(&self, category: DrawCategory) -> usize {
        self.lists[category.index()].iter().map(Vec::len).sum()
    }

    /// Any opaque geometry to run the deferred path for
    pub fn has_deferred(&self) -> bool {
        self.count(DrawCategory::Deferred) > 0
    }

    /// Any decals
    pub fn has_decals(&self) -> bool {
        self.count(DrawCategory::Decal) > 0
    }

    /// Any prepass or forward geometry
    pub fn has_forward(&self) -> bool {
        self.count(DrawCategory::Prepass) + self.count(DrawCategory::Forward) > 0
    }

    /// Total number of calls
    pub fn total_calls(&self) -> usize {
        DrawCategory::ALL.iter().map(|&c| self.count(c)).sum()
    }

    /// Mark every group visible or not for `frustum`; groups with an empty box stay visible
    pub fn compute_visible_groups(&mut self, frustum: &Frustum) {
        for group in &mut self.groups {
            let aabb = group.world_aabb();
            group.visible = aabb.is_empty() || frustum.intersects_aabb(&aabb);
        }
    }

    /// Mark every group visible
    pub fn set_all_visible(&mut self) {
        for group in &mut self.groups {
            group.visible = true;
        }
    }

    /// Reorder both lists of a category by distance to `view_position`
    pub fn sort(&mut self, category: DrawCategory, view_position: Vec3, order: SortOrder) {
        let groups = &self.groups;
        let key = |call: &DrawCall| {
            groups
                .get(call.group)
                .map_or(0.0, |g| (call.sort_center(g) - view_position).norm_squared())
        };
        for list in &mut self.lists[category.index()] {
            list.sort_by(|a, b| {
                let ordering = key(a).partial_cmp(&key(b)).unwrap_or(Ordering::Equal);
                match order {
                    SortOrder::FrontToBack => ordering,
                    SortOrder::BackToFront => ordering.reverse(),
                }
            });
        }
    }

    /// Lazy walk over the given categories, non-instanced list first in each
    ///
    /// With `respect_visibility`, calls of groups marked invisible by the last
    /// [`compute_visible_groups`](Self::compute_visible_groups) are skipped.
    pub fn iter<'a, P>(&'a self, categories: &'a [DrawCategory], respect_visibility: bool, predicate: P) -> DrawIter<'a, P>
    where
        P: Fn(&DrawItem<'a>) -> bool,
    {
        DrawIter::new(&self.groups, &self.lists, categories, respect_visibility, predicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::bounds::BoundingBox;
    use crate::foundation::math::{utils, Mat4};
    use crate::render::api::{BufferId, VertexArrayId};
    use crate::render::frame::Layers;
    use crate::render::material::{BlendMode, TransparencyMode};
    use crate::render::mesh::ShadowCastMode;
    use crate::render::draw::Instances;

    fn mesh() -> Mesh {
        Mesh {
            vao: VertexArrayId(1),
            vbo: BufferId(2),
            ebo: None,
            vertex_count: 3,
            index_count: 0,
            aabb: BoundingBox::from_center_extents(Vec3::zeros(), Vec3::repeat(0.5)),
            shadow_cast_mode: ShadowCastMode::OnAuto,
            layer_mask: Layers::LAYER_01,
        }
    }

    fn at(x: f32, z: f32) -> DrawGroup {
        DrawGroup::new(Mat4::new_translation(&Vec3::new(x, 0.0, z)), mesh().aabb)
    }

    fn alpha() -> Material {
        let mut material = Material::default();
        material.transparency_mode = TransparencyMode::Alpha;
        material
    }

    #[test]
    fn test_classification() {
        let opaque = Material::default();
        let mut prepass = Material::default();
        prepass.transparency_mode = TransparencyMode::Prepass;
        let mut additive = Material::default();
        additive.blend_mode = BlendMode::Additive;
        assert_eq!(DrawCategory::classify(&opaque, false), DrawCategory::Deferred);
        assert_eq!(DrawCategory::classify(&prepass, false), DrawCategory::Prepass);
        assert_eq!(DrawCategory::classify(&alpha(), false), DrawCategory::Forward);
        assert_eq!(DrawCategory::classify(&additive, false), DrawCategory::Forward);
        assert_eq!(DrawCategory::classify(&opaque, true), DrawCategory::Decal);
    }

    #[test]
    fn test_instanced_calls_use_instanced_list() {
        let mut collector = DrawCollector::new();
        let instances = Instances { transforms: vec![Mat4::identity(); 3], colors: None };
        collector.push_group(at(0.0, 0.0).with_instances(instances));
        collector.push_call(&mesh(), &Material::default(), false);
        assert_eq!(collector.list(DrawCategory::Deferred, true).len(), 1);
        assert!(collector.list(DrawCategory::Deferred, false).is_empty());
    }

    #[test]
    fn test_call_without_group_is_dropped() {
        let mut collector = DrawCollector::new();
        collector.push_call(&mesh(), &Material::default(), false);
        assert_eq!(collector.total_calls(), 0);
    }

    #[test]
    fn test_sort_orders() {
        let mut collector = DrawCollector::new();
        for z in [-5.0, -20.0, -10.0] {
            collector.push_group(at(0.0, z));
            collector.push_call(&mesh(), &alpha(), false);
            collector.push_call(&mesh(), &Material::default(), false);
        }
        collector.sort(DrawCategory::Deferred, Vec3::zeros(), SortOrder::FrontToBack);
        collector.sort(DrawCategory::Forward, Vec3::zeros(), SortOrder::BackToFront);
        let opaque: Vec<_> = collector.list(DrawCategory::Deferred, false).iter().map(|c| c.group).collect();
        let blended: Vec<_> = collector.list(DrawCategory::Forward, false).iter().map(|c| c.group).collect();
        assert_eq!(opaque, vec![0, 2, 1]);
        assert_eq!(blended, vec![1, 2, 0]);
    }

    #[test]
    fn test_visibility_and_iteration() {
        let view = utils::look_at(Vec3::zeros(), -Vec3::z(), Vec3::y());
        let proj = utils::perspective(utils::deg_to_rad(60.0), 1.0, 0.1, 100.0);
        let frustum = Frustum::from_matrix(&(proj * view));

        let mut collector = DrawCollector::new();
        collector.push_group(at(0.0, -10.0));
        collector.push_call(&mesh(), &Material::default(), false);
        collector.push_group(at(0.0, 10.0));
        collector.push_call(&mesh(), &Material::default(), false);
        collector.push_group(DrawGroup::new(Mat4::new_translation(&Vec3::new(0.0, 0.0, 50.0)), BoundingBox::EMPTY));
        collector.push_call(&mesh(), &alpha(), false);
        collector.compute_visible_groups(&frustum);

        let visible: Vec<_> = collector
            .iter(&DrawCategory::ALL, true, |_| true)
            .map(|item| item.call.group)
            .collect();
        assert_eq!(visible, vec![0, 2], "empty boxes are always visible");

        let all = collector.iter(&[DrawCategory::Deferred], false, |_| true).count();
        assert_eq!(all, 2);

        let forward_only = collector.iter(&DrawCategory::ALL, false, |item| !item.call.material.is_opaque()).count();
        assert_eq!(forward_only, 1);
    }
}
