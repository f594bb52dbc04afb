//! Mesh representation and the scene objects built from it
//!
//! CPU-side [`MeshData`] is uploaded once into a vertex array; the resulting
//! [`Mesh`] is what draw calls reference. Models, decals and particle systems
//! are thin aggregates the renderer turns into draw groups.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::foundation::bounds::BoundingBox;
use crate::foundation::math::{utils, Color, Mat4, Vec3};
use crate::render::api::{
    AttribKind, BufferId, BufferTarget, BufferUsage, PrimitiveMode, RenderDevice, TextureId,
    VertexArrayId, VertexAttrib,
};
use crate::render::frame::Layers;
use crate::render::material::{CullMode, Material};
use crate::render::RenderResult;

/// Vertex attribute locations shared with the GLSL sources
pub mod attrib {
    /// `aPosition`
    pub const POSITION: u32 = 0;
    /// `aTexCoord`
    pub const TEXCOORD: u32 = 1;
    /// `aNormal`
    pub const NORMAL: u32 = 2;
    /// `aColor`
    pub const COLOR: u32 = 3;
    /// `aTangent`
    pub const TANGENT: u32 = 4;
    /// `aBoneIDs`
    pub const BONE_IDS: u32 = 5;
    /// `aWeights`
    pub const WEIGHTS: u32 = 6;
    /// First column of `iMatModel`; columns occupy 10..=13
    pub const INSTANCE_MODEL: u32 = 10;
    /// `iColor`
    pub const INSTANCE_COLOR: u32 = 14;
}

/// Interleaved vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Position in model space
    pub position: [f32; 3],
    /// Texture coordinates
    pub texcoord: [f32; 2],
    /// Normal vector
    pub normal: [f32; 3],
    /// Vertex color
    pub color: [u8; 4],
    /// Tangent with handedness in `w`
    pub tangent: [f32; 4],
    /// Up to four bone indices
    pub bone_ids: [i32; 4],
    /// Matching bone weights
    pub weights: [f32; 4],
}

impl Vertex {
    /// White, unskinned vertex
    pub fn new(position: [f32; 3], texcoord: [f32; 2], normal: [f32; 3], tangent: [f32; 4]) -> Self {
        Self {
            position,
            texcoord,
            normal,
            color: [255; 4],
            tangent,
            bone_ids: [0; 4],
            weights: [0.0; 4],
        }
    }
}

/// Geometry before upload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    /// Vertices
    pub vertices: Vec<Vertex>,
    /// Triangle indices; empty for non-indexed geometry
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Box enclosing every vertex
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(self.vertices.iter().map(|v| Vec3::from(v.position))).unwrap_or_default()
    }

    /// UV sphere centered at the origin
    pub fn sphere(radius: f32, rings: u32, slices: u32) -> Self {
        let rings = rings.max(2);
        let slices = slices.max(3);
        let mut vertices = Vec::with_capacity(((rings + 1) * (slices + 1)) as usize);
        for ring in 0..=rings {
            let v = ring as f32 / rings as f32;
            let phi = v * std::f32::consts::PI;
            for slice in 0..=slices {
                let u = slice as f32 / slices as f32;
                let theta = u * std::f32::consts::TAU;
                let normal = [phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin()];
                let tangent = [-theta.sin(), 0.0, theta.cos(), 1.0];
                let position = normal.map(|c| c * radius);
                vertices.push(Vertex::new(position, [u, v], normal, tangent));
            }
        }
        let mut indices = Vec::with_capacity((rings * slices * 6) as usize);
        let stride = slices + 1;
        for ring in 0..rings {
            for slice in 0..slices {
                let a = ring * stride + slice;
                let b = a + stride;
                indices.extend_from_slice(&[a, a + 1, b, b, a + 1, b + 1]);
            }
        }
        Self { vertices, indices }
    }

    /// Plane on XZ facing +Y, subdivided `res_x` by `res_z` times
    pub fn plane(width: f32, length: f32, res_x: u32, res_z: u32) -> Self {
        let (res_x, res_z) = (res_x.max(1), res_z.max(1));
        let mut vertices = Vec::new();
        for z in 0..=res_z {
            for x in 0..=res_x {
                let u = x as f32 / res_x as f32;
                let v = z as f32 / res_z as f32;
                let position = [(u - 0.5) * width, 0.0, (v - 0.5) * length];
                vertices.push(Vertex::new(position, [u, v], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0, 1.0]));
            }
        }
        let stride = res_x + 1;
        let mut indices = Vec::new();
        for z in 0..res_z {
            for x in 0..res_x {
                let a = z * stride + x;
                let b = a + stride;
                indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
            }
        }
        Self { vertices, indices }
    }

    /// Axis-aligned box centered at the origin
    pub fn cube(width: f32, height: f32, length: f32) -> Self {
        let h = [width * 0.5, height * 0.5, length * 0.5];
        // (normal, tangent, u axis, v axis)
        let faces: [([f32; 3], [f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ];
        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, tangent, u_axis, v_axis) in faces {
            let base = vertices.len() as u32;
            for (su, sv) in [(-1.0f32, -1.0f32), (1.0, -1.0), (-1.0, 1.0), (1.0, 1.0)] {
                let position: [f32; 3] = std::array::from_fn(|i| (normal[i] + u_axis[i] * su + v_axis[i] * sv) * h[i]);
                let texcoord = [(su + 1.0) * 0.5, (sv + 1.0) * 0.5];
                vertices.push(Vertex::new(position, texcoord, normal, [tangent[0], tangent[1], tangent[2], 1.0]));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 1, base + 3]);
        }
        Self { vertices, indices }
    }
}

/// How a mesh takes part in shadow passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShadowCastMode {
    /// Casts shadows; culling follows the material
    #[default]
    OnAuto,
    /// Casts shadows without face culling
    OnDoubleSided,
    /// Casts shadows from front faces
    OnFrontSide,
    /// Casts shadows from back faces
    OnBackSide,
    /// Shadow only, culling follows the material
    OnlyAuto,
    /// Shadow only, no face culling
    OnlyDoubleSided,
    /// Shadow only, front faces
    OnlyFrontSide,
    /// Shadow only, back faces
    OnlyBackSide,
    /// Never in shadow maps
    Disabled,
}

impl ShadowCastMode {
    /// Drawn into shadow maps
    pub fn casts_shadows(self) -> bool {
        self != Self::Disabled
    }

    /// Drawn into shadow maps and nowhere else
    pub fn is_shadow_only(self) -> bool {
        matches!(self, Self::OnlyAuto | Self::OnlyDoubleSided | Self::OnlyFrontSide | Self::OnlyBackSide)
    }

    /// Face culling used while rendering shadows
    pub fn shadow_cull(self, material_cull: CullMode) -> CullMode {
        match self {
            Self::OnAuto | Self::OnlyAuto => material_cull,
            Self::OnDoubleSided | Self::OnlyDoubleSided => CullMode::None,
            Self::OnFrontSide | Self::OnlyFrontSide => CullMode::Back,
            Self::OnBackSide | Self::OnlyBackSide => CullMode::Front,
            Self::Disabled => material_cull,
        }
    }
}

/// Uploaded geometry
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    /// Vertex array with attributes 0..=6 configured
    pub vao: VertexArrayId,
    /// Vertex buffer
    pub vbo: BufferId,
    /// Index buffer, absent for non-indexed geometry
    pub ebo: Option<BufferId>,
    /// Number of vertices
    pub vertex_count: i32,
    /// Number of indices
    pub index_count: i32,
    /// Model-space bounds
    pub aabb: BoundingBox,
    /// Shadow participation
    pub shadow_cast_mode: ShadowCastMode,
    /// Layers this mesh belongs to
    pub layer_mask: Layers,
}

impl Mesh {
    /// Upload `data` into a new vertex array
    pub fn upload(device: &mut dyn RenderDevice, data: &MeshData) -> RenderResult<Self> {
        let vao = device.create_vertex_array()?;
        let vbo = device.create_buffer()?;
        device.bind_vertex_array(Some(vao));
        device.buffer_data(BufferTarget::Array, vbo, bytemuck::cast_slice(&data.vertices), BufferUsage::Static);

        let stride = std::mem::size_of::<Vertex>() as i32;
        let layout = [
            (attrib::POSITION, 3, AttribKind::Float, 0),
            (attrib::TEXCOORD, 2, AttribKind::Float, 12),
            (attrib::NORMAL, 3, AttribKind::Float, 20),
            (attrib::COLOR, 4, AttribKind::UnsignedByteNormalized, 32),
            (attrib::TANGENT, 4, AttribKind::Float, 36),
            (attrib::BONE_IDS, 4, AttribKind::Int, 52),
            (attrib::WEIGHTS, 4, AttribKind::Float, 68),
        ];
        for (location, components, kind, offset) in layout {
            device.vertex_attrib(&VertexAttrib { location, components, kind, stride, offset, divisor: 0 });
        }

        let ebo = if data.indices.is_empty() {
            None
        } else {
            let ebo = device.create_buffer()?;
            device.buffer_data(BufferTarget::ElementArray, ebo, bytemuck::cast_slice(&data.indices), BufferUsage::Static);
            Some(ebo)
        };
        device.bind_vertex_array(None);

        Ok(Self {
            vao,
            vbo,
            ebo,
            vertex_count: data.vertices.len() as i32,
            index_count: data.indices.len() as i32,
            aabb: data.bounding_box(),
            shadow_cast_mode: ShadowCastMode::default(),
            layer_mask: Layers::default(),
        })
    }

    /// Release the GPU objects
    pub fn unload(&self, device: &mut dyn RenderDevice) {
        if let Some(ebo) = self.ebo {
            device.delete_buffer(ebo);
        }
        device.delete_buffer(self.vbo);
        device.delete_vertex_array(self.vao);
    }

    /// Draw with the currently bound vertex array
    pub fn draw(&self, device: &mut dyn RenderDevice, instances: i32) {
        match (self.ebo.is_some(), instances) {
            (true, 1) => device.draw_elements(PrimitiveMode::Triangles, self.index_count),
            (true, n) => device.draw_elements_instanced(PrimitiveMode::Triangles, self.index_count, n),
            (false, 1) => device.draw_arrays(PrimitiveMode::Triangles, 0, self.vertex_count),
            (false, n) => device.draw_arrays_instanced(PrimitiveMode::Triangles, 0, self.vertex_count, n),
        }
    }
}

/// Bone hierarchy with its bind pose baked into a texture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skeleton {
    /// Number of bones
    pub bone_count: u32,
    /// 1D texture of bind pose matrices, four texels per bone
    pub bind_pose: TextureId,
}

/// Meshes sharing a transform
#[derive(Debug, Clone, Default)]
pub struct Model {
    /// Meshes
    pub meshes: Vec<Mesh>,
    /// Materials referenced by `mesh_materials`
    pub materials: Vec<Material>,
    /// Material index per mesh
    pub mesh_materials: Vec<usize>,
    /// Model-space bounds
    pub aabb: BoundingBox,
    /// Optional skeleton
    pub skeleton: Option<Skeleton>,
    /// Current animation pose texture, owned by the animation system
    pub animation_pose: Option<TextureId>,
}

impl Model {
    /// Model with a single mesh and material
    pub fn from_mesh(mesh: Mesh, material: Material) -> Self {
        Self {
            aabb: mesh.aabb,
            meshes: vec![mesh],
            materials: vec![material],
            mesh_materials: vec![0],
            skeleton: None,
            animation_pose: None,
        }
    }

    /// Texture bound to the skinning slot: the animation pose, else the bind pose
    pub fn skin_texture(&self) -> Option<TextureId> {
        self.animation_pose
            .or_else(|| self.skeleton.as_ref().map(|s| s.bind_pose))
            .filter(|t| t.is_set())
    }

    /// Material of a mesh, `None` when the index is out of range
    pub fn material_for(&self, mesh_index: usize) -> Option<&Material> {
        self.mesh_materials.get(mesh_index).and_then(|&i| self.materials.get(i))
    }
}

/// Texture projected onto the G-buffer inside a unit cube
#[derive(Debug, Clone, Default)]
pub struct Decal {
    /// Surface properties written by the projection
    pub material: Material,
}

/// One live particle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    /// Position in system space
    pub position: Vec3,
    /// Euler rotation in degrees
    pub rotation: Vec3,
    /// Scale
    pub scale: Vec3,
    /// Tint
    pub color: Color,
    /// Remaining lifetime in seconds; dead when `<= 0`
    pub lifetime: f32,
}

impl Particle {
    /// Instance transform of this particle
    pub fn transform(&self) -> Mat4 {
        let r = self.rotation.map(utils::deg_to_rad);
        let rotation = Mat4::from_euler_angles(r.x, r.y, r.z);
        Mat4::new_translation(&self.position) * rotation * Mat4::new_nonuniform_scaling(&self.scale)
    }
}

/// Particle set updated elsewhere and drawn as instances
#[derive(Debug, Clone, Default)]
pub struct ParticleSystem {
    /// Particles, dead ones included
    pub particles: Vec<Particle>,
    /// Bounds of all particles in system space
    pub aabb: BoundingBox,
}

impl ParticleSystem {
    /// Transforms and colors of live particles
    pub fn instances(&self) -> (Vec<Mat4>, Vec<Color>) {
        self.particles
            .iter()
            .filter(|p| p.lifetime > 0.0)
            .map(|p| (p.transform(), p.color))
            .unzip()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::{DeviceCommand, RecordingDevice};
    use approx::assert_relative_eq;

    #[test]
    fn test_vertex_layout_matches_attribute_offsets() {
        assert_eq!(std::mem::size_of::<Vertex>(), 84);
    }

    #[test]
    fn test_sphere_bounds() {
        let data = MeshData::sphere(2.0, 8, 16);
        let aabb = data.bounding_box();
        assert_relative_eq!(aabb.max.y, 2.0, epsilon = 1e-5);
        assert_relative_eq!(aabb.min.y, -2.0, epsilon = 1e-5);
        assert_eq!(data.indices.len(), 8 * 16 * 6);
    }

    #[test]
    fn test_cube_is_centered() {
        let aabb = MeshData::cube(1.0, 1.0, 1.0).bounding_box();
        assert_relative_eq!(aabb.min, Vec3::repeat(-0.5));
        assert_relative_eq!(aabb.max, Vec3::repeat(0.5));
    }

    #[test]
    fn test_upload_configures_seven_attributes() {
        let mut device = RecordingDevice::new();
        let log = device.log();
        let mesh = Mesh::upload(&mut device, &MeshData::plane(1.0, 1.0, 1, 1)).unwrap();
        let attribs = log
            .commands()
            .into_iter()
            .filter(|c| matches!(c, DeviceCommand::VertexAttrib(_)))
            .count();
        assert_eq!(attribs, 7);
        assert_eq!(mesh.index_count, 6);
        assert!(mesh.ebo.is_some());
    }

    #[test]
    fn test_shadow_cast_modes() {
        assert!(ShadowCastMode::OnlyAuto.is_shadow_only());
        assert!(!ShadowCastMode::Disabled.casts_shadows());
        assert_eq!(ShadowCastMode::OnBackSide.shadow_cull(CullMode::Back), CullMode::Front);
        assert_eq!(ShadowCastMode::OnlyAuto.shadow_cull(CullMode::None), CullMode::None);
    }

    #[test]
    fn test_dead_particles_are_not_instanced() {
        let alive = Particle {
            position: Vec3::x(),
            rotation: Vec3::zeros(),
            scale: Vec3::repeat(1.0),
            color: Color::WHITE,
            lifetime: 1.0,
        };
        let system = ParticleSystem {
            particles: vec![alive, Particle { lifetime: 0.0, ..alive }],
            aabb: BoundingBox::default(),
        };
        let (transforms, colors) = system.instances();
        assert_eq!(transforms.len(), 1);
        assert_eq!(colors.len(), 1);
        assert_relative_eq!(transforms[0][(0, 3)], 1.0);
    }
}
