//! Per-draw GPU state and uploads shared by the passes

use crate::foundation::math::utils;
use crate::render::api::{
    AttribKind, BlendEquation, BlendFactor, BufferId, BufferTarget, BufferUsage, Capability, Face, RenderDevice,
    RenderDeviceExt, TextureId, TextureTarget, VertexAttrib,
};
use crate::render::draw::{DrawGroup, DrawItem};
use crate::render::material::{BlendMode, CullMode, Material, TransparencyMode};
use crate::render::mesh::attrib;
use crate::render::passes::PassContext;
use crate::render::shader::custom::BuiltinLocations;
use crate::render::shader::{slot, Program};
use crate::render::textures::DefaultTextures;
use crate::render::RenderResult;

/// Alpha cutoff used while rendering shadow maps
pub const SHADOW_ALPHA_CUTOFF: f32 = 0.1;

/// Alpha cutoff used by the prepass for `Prepass` materials
pub const PREPASS_ALPHA_CUTOFF: f32 = 0.99;

/// Blend state for a material
pub fn apply_blend(device: &mut dyn RenderDevice, blend: BlendMode, transparency: TransparencyMode) {
    let opaque = transparency == TransparencyMode::Disabled;
    let factors = match blend {
        BlendMode::Mix if opaque => None,
        BlendMode::Mix => Some((BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha)),
        BlendMode::Additive if opaque => Some((BlendFactor::One, BlendFactor::One)),
        BlendMode::Additive => Some((BlendFactor::SrcAlpha, BlendFactor::One)),
        BlendMode::Multiply => Some((BlendFactor::DstColor, BlendFactor::Zero)),
        BlendMode::PremultipliedAlpha => Some((BlendFactor::One, BlendFactor::OneMinusSrcAlpha)),
    };
    match factors {
        Some((src, dst)) => {
            device.enable(Capability::Blend);
            device.blend_func(src, dst);
            device.blend_equation(BlendEquation::Add);
        }
        None => device.disable(Capability::Blend),
    }
}

/// Face culling for a cull mode
pub fn apply_cull(device: &mut dyn RenderDevice, cull: CullMode) {
    match cull {
        CullMode::None => device.disable(Capability::CullFace),
        CullMode::Back => {
            device.enable(Capability::CullFace);
            device.cull_face(Face::Back);
        }
        CullMode::Front => {
            device.enable(Capability::CullFace);
            device.cull_face(Face::Front);
        }
    }
}

/// Streaming buffers feeding the per-instance attributes
#[derive(Debug)]
pub struct InstanceBuffer {
    transforms: BufferId,
    colors: BufferId,
}

impl InstanceBuffer {
    /// Allocate both buffers
    pub fn new(device: &mut dyn RenderDevice) -> RenderResult<Self> {
        Ok(Self { transforms: device.create_buffer()?, colors: device.create_buffer()? })
    }

    /// Upload a group's instances and point locations 10..=14 at them on the bound vertex array
    ///
    /// Returns the instance count to draw.
    pub fn bind(&self, device: &mut dyn RenderDevice, group: &DrawGroup) -> i32 {
        let Some(instances) = &group.instances else { return 1 };

        let matrices: Vec<[f32; 16]> = instances
            .transforms
            .iter()
            .map(utils::mat4_to_array)
            .collect();
        device.buffer_data(BufferTarget::Array, self.transforms, bytemuck::cast_slice(&matrices), BufferUsage::Stream);
        for column in 0..4u32 {
            device.vertex_attrib(&VertexAttrib {
                location: attrib::INSTANCE_MODEL + column,
                components: 4,
                kind: AttribKind::Float,
                stride: 64,
                offset: column as i32 * 16,
                divisor: 1,
            });
        }

        match &instances.colors {
            Some(colors) => {
                let bytes: Vec<[u8; 4]> = colors.iter().map(|c| [c.r, c.g, c.b, c.a]).collect();
                device.buffer_data(BufferTarget::Array, self.colors, bytemuck::cast_slice(&bytes), BufferUsage::Stream);
                device.vertex_attrib(&VertexAttrib {
                    location: attrib::INSTANCE_COLOR,
                    components: 4,
                    kind: AttribKind::UnsignedByteNormalized,
                    stride: 4,
                    offset: 0,
                    divisor: 1,
                });
            }
            None => {
                device.disable_vertex_attrib(attrib::INSTANCE_COLOR);
                device.vertex_attrib_constant(attrib::INSTANCE_COLOR, [1.0; 4]);
            }
        }

        instances.count() as i32
    }

    /// Detach the per-instance attributes from the bound vertex array
    pub fn unbind(&self, device: &mut dyn RenderDevice) {
        for location in attrib::INSTANCE_MODEL..=attrib::INSTANCE_COLOR {
            device.disable_vertex_attrib(location);
        }
    }

    /// Release both buffers
    pub fn destroy(&self, device: &mut dyn RenderDevice) {
        device.delete_buffer(self.transforms);
        device.delete_buffer(self.colors);
    }
}

/// Draw an item's mesh, instanced when its group carries instances
pub fn draw_item(ctx: &mut PassContext<'_>, item: &DrawItem<'_>) {
    let device = &mut *ctx.device;
    device.bind_vertex_array(Some(item.call.mesh.vao));
    if item.group.instances.is_some() {
        let count = ctx.instances.bind(device, item.group);
        item.call.mesh.draw(device, count);
        ctx.instances.unbind(device);
    } else {
        item.call.mesh.draw(device, 1);
    }
    device.bind_vertex_array(None);
}

/// Bind the four material maps and the bone texture, substituting defaults for unset maps
pub fn bind_material_textures(device: &mut dyn RenderDevice, material: &Material, skin: Option<TextureId>, defaults: &DefaultTextures) {
    device.bind_texture_unit(slot::BONES, TextureTarget::Texture1D, skin);
    device.bind_texture_unit(slot::ALBEDO, TextureTarget::Texture2D, Some(material.albedo.texture.or(defaults.white)));
    device.bind_texture_unit(slot::NORMAL, TextureTarget::Texture2D, Some(material.normal.texture.or(defaults.normal)));
    device.bind_texture_unit(slot::EMISSION, TextureTarget::Texture2D, Some(material.emission.texture.or(defaults.black)));
    device.bind_texture_unit(slot::ORM, TextureTarget::Texture2D, Some(material.orm.texture.or(defaults.white)));
}

/// Unbind everything [`bind_material_textures`] bound
pub fn unbind_material_textures(device: &mut dyn RenderDevice) {
    device.bind_texture_unit(slot::BONES, TextureTarget::Texture1D, None);
    for unit in [slot::ALBEDO, slot::NORMAL, slot::EMISSION, slot::ORM] {
        device.bind_texture_unit(unit, TextureTarget::Texture2D, None);
    }
}

/// Depth-only draw into a shadow map or the prepass depth buffer
///
/// `program` is the bound depth program; its view-projection is set by the caller.
pub fn raster_depth(ctx: &mut PassContext<'_>, program: &Program, item: &DrawItem<'_>, shadow: bool) {
    let material = &item.call.material;
    let device = &mut *ctx.device;

    let cutoff = if shadow {
        SHADOW_ALPHA_CUTOFF
    } else if material.transparency_mode == TransparencyMode::Prepass {
        PREPASS_ALPHA_CUTOFF
    } else {
        material.alpha_cutoff
    };

    program.set_mat4(device, "uMatModel", &item.group.transform);
    program.set_vec2(device, "uTexCoordOffset", material.uv_offset);
    program.set_vec2(device, "uTexCoordScale", material.uv_scale);
    program.set_f32(device, "uAlpha", material.albedo.color.alpha());
    program.set_f32(device, "uAlphaCutoff", cutoff);
    program.set_bool(device, "uSkinning", item.group.skin_texture.is_some());
    program.set_bool(device, "uInstancing", item.group.instances.is_some());
    program.set_i32(device, "uBillboard", material.billboard_mode.as_uniform());
    if material.billboard_mode.as_uniform() != 0 {
        program.set_mat4(device, "uMatInvView", &ctx.frame.view.inv_view);
    }

    device.bind_texture_unit(slot::BONES, TextureTarget::Texture1D, item.group.skin_texture);
    device.bind_texture_unit(slot::ALBEDO, TextureTarget::Texture2D, Some(material.albedo.texture.or(ctx.defaults.white)));

    let cull = if shadow { item.call.mesh.shadow_cast_mode.shadow_cull(material.cull_mode) } else { material.cull_mode };
    apply_cull(device, cull);

    draw_item(ctx, item);

    let device = &mut *ctx.device;
    device.bind_texture_unit(slot::BONES, TextureTarget::Texture1D, None);
    device.bind_texture_unit(slot::ALBEDO, TextureTarget::Texture2D, None);
}

/// G-buffer draw, through the material's custom shader when it has a live one
///
/// The default geometry program must be current on entry and is current again on exit.
pub fn raster_geometry(ctx: &mut PassContext<'_>, item: &DrawItem<'_>) {
    let material = &item.call.material;
    let registry = ctx.custom;
    let programs = ctx.programs;
    let custom = match material.shader {
        Some(id) => {
            let found = registry.get(id);
            if found.is_none() {
                log::warn!("Material uses destroyed custom shader {id:?}, drawing with the default program");
            }
            found
        }
        None => None,
    };

    let builtins: &BuiltinLocations = match custom {
        Some(shader) => {
            ctx.device.use_program(Some(shader.program()));
            shader.builtins()
        }
        None => &programs.geometry_builtins,
    };

    let device = &mut *ctx.device;
    let skinning = item.group.skin_texture.is_some();
    builtins.apply(device, &item.group.transform, material, skinning, item.group.instances.is_some());
    bind_material_textures(device, material, item.group.skin_texture, ctx.defaults);
    if let Some(shader) = custom {
        shader.bind_params(device, material);
    }
    apply_cull(device, material.cull_mode);

    draw_item(ctx, item);

    let device = &mut *ctx.device;
    unbind_material_textures(device);
    if let Some(shader) = custom {
        shader.unbind_samplers(device);
        programs.geometry.bind(device);
    }
}

/// Projected decal into the G-buffer; the decal box is the unit cube scaled by the group transform
pub fn raster_decal(ctx: &mut PassContext<'_>, item: &DrawItem<'_>) {
    let material = &item.call.material;
    let programs = ctx.programs;
    let program = &programs.decal;
    let device = &mut *ctx.device;

    program.set_mat4(device, "uMatModel", &item.group.transform);
    program.set_mat4(device, "uMatNormal", &utils::normal_matrix(&item.group.transform));
    program.set_vec4(device, "uAlbedoColor", material.albedo.color.to_vec4());
    program.set_vec3(device, "uEmissionColor", material.emission.color.to_vec3());
    program.set_f32(device, "uEmissionEnergy", material.emission.energy);
    program.set_f32(device, "uNormalScale", material.normal.scale);
    program.set_f32(device, "uOcclusion", material.orm.occlusion);
    program.set_f32(device, "uRoughness", material.orm.roughness);
    program.set_f32(device, "uMetalness", material.orm.metalness);
    program.set_f32(device, "uAlphaCutoff", material.alpha_cutoff);
    program.set_vec2(device, "uTexCoordOffset", material.uv_offset);
    program.set_vec2(device, "uTexCoordScale", material.uv_scale);
    program.set_bool(device, "uInstancing", item.group.instances.is_some());

    bind_material_textures(device, material, None, ctx.defaults);
    apply_blend(device, material.blend_mode, material.transparency_mode);

    let count = {
        device.bind_vertex_array(Some(ctx.primitives.cube.vao));
        ctx.instances.bind(device, item.group)
    };
    ctx.primitives.cube.draw(device, count);
    if item.group.instances.is_some() {
        ctx.instances.unbind(device);
    }
    device.bind_vertex_array(None);

    unbind_material_textures(device);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat4;
    use crate::render::backends::recording::{DeviceCommand, RecordingDevice};

    #[test]
    fn test_opaque_mix_disables_blending() {
        let mut device = RecordingDevice::new();
        let log = device.log();
        apply_blend(&mut device, BlendMode::Mix, TransparencyMode::Disabled);
        assert!(!log.state().blend);

        apply_blend(&mut device, BlendMode::Mix, TransparencyMode::Alpha);
        assert!(log.state().blend);
        assert_eq!(log.state().blend_func, (BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha));
    }

    #[test]
    fn test_additive_factors_depend_on_transparency() {
        let mut device = RecordingDevice::new();
        let log = device.log();
        apply_blend(&mut device, BlendMode::Additive, TransparencyMode::Disabled);
        assert_eq!(log.state().blend_func, (BlendFactor::One, BlendFactor::One));
        apply_blend(&mut device, BlendMode::Additive, TransparencyMode::Alpha);
        assert_eq!(log.state().blend_func, (BlendFactor::SrcAlpha, BlendFactor::One));
        apply_blend(&mut device, BlendMode::Multiply, TransparencyMode::Alpha);
        assert_eq!(log.state().blend_func, (BlendFactor::DstColor, BlendFactor::Zero));
    }

    #[test]
    fn test_cull_modes() {
        let mut device = RecordingDevice::new();
        let log = device.log();
        apply_cull(&mut device, CullMode::Front);
        assert!(log.state().cull_face);
        assert_eq!(log.state().cull, Face::Front);
        apply_cull(&mut device, CullMode::None);
        assert!(!log.state().cull_face);
    }

    #[test]
    fn test_instance_attributes_use_divisor_one() {
        use crate::foundation::bounds::BoundingBox;
        use crate::render::draw::Instances;

        let mut device = RecordingDevice::new();
        let log = device.log();
        let buffer = InstanceBuffer::new(&mut device).unwrap();
        let group = DrawGroup::new(Mat4::identity(), BoundingBox::default())
            .with_instances(Instances { transforms: vec![Mat4::identity(); 3], colors: None });

        assert_eq!(buffer.bind(&mut device, &group), 3);
        let attribs: Vec<VertexAttrib> = log
            .commands()
            .into_iter()
            .filter_map(|c| match c {
                DeviceCommand::VertexAttrib(a) => Some(a),
                _ => None,
            })
            .collect();
        assert_eq!(attribs.len(), 4);
        assert!(attribs.iter().all(|a| a.divisor == 1 && a.stride == 64));
        assert!(log.commands().contains(&DeviceCommand::VertexAttribConstant {
            location: attrib::INSTANCE_COLOR,
            value: [1.0, 1.0, 1.0, 1.0],
        }));
    }
}
