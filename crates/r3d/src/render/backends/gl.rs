//! OpenGL 3.3 core device over `glow`
//!
//! Handles are the raw GL names; `0` is never handed out, so the `NonZeroU32`
//! wrappers `glow` expects can be rebuilt from our `u32` newtypes.

#![allow(unsafe_code)]

use std::num::NonZeroU32;

use glow::HasContext;

use crate::foundation::math::Rect;
use crate::render::api::{
    ActiveUniform, AttribKind, Attachment, BlendEquation, BlendFactor, BlitFilter, BufferId,
    BufferTarget, BufferUsage, Capability, ClearFlags, DepthFunc, DeviceResult, Face,
    FramebufferId, PrimitiveMode, ProgramId, RenderDevice, ShaderObjectId, ShaderStage,
    TextureDesc, TextureFilter, TextureFormat, TextureId, TextureTarget, TextureWrap,
    UniformKind, UniformLocation, VertexArrayId, VertexAttrib,
};
use crate::render::RenderError;

/// Real GPU device
pub struct GlowDevice {
    gl: glow::Context,
}

impl GlowDevice {
    /// Wrap a context whose function pointers are already loaded
    pub fn new(gl: glow::Context) -> Self {
        let version = gl.version();
        log::info!(
            "OpenGL {}.{} device created (debug groups: {})",
            version.major,
            version.minor,
            gl.supports_debug()
        );
        Self { gl }
    }

    /// Underlying context, for embedders that issue their own GL calls
    pub fn context(&self) -> &glow::Context {
        &self.gl
    }
}

fn shader(id: ShaderObjectId) -> Option<glow::NativeShader> {
    NonZeroU32::new(id.0).map(glow::NativeShader)
}

fn program(id: ProgramId) -> Option<glow::NativeProgram> {
    NonZeroU32::new(id.0).map(glow::NativeProgram)
}

fn texture(id: TextureId) -> Option<glow::NativeTexture> {
    NonZeroU32::new(id.0).map(glow::NativeTexture)
}

fn framebuffer(id: FramebufferId) -> Option<glow::NativeFramebuffer> {
    NonZeroU32::new(id.0).map(glow::NativeFramebuffer)
}

fn buffer(id: BufferId) -> Option<glow::NativeBuffer> {
    NonZeroU32::new(id.0).map(glow::NativeBuffer)
}

fn vertex_array(id: VertexArrayId) -> Option<glow::NativeVertexArray> {
    NonZeroU32::new(id.0).map(glow::NativeVertexArray)
}

fn location(loc: UniformLocation) -> glow::NativeUniformLocation {
    glow::NativeUniformLocation(loc.0)
}

fn texture_target(target: TextureTarget) -> u32 {
    match target {
        TextureTarget::Texture1D => glow::TEXTURE_1D,
        TextureTarget::Texture2D => glow::TEXTURE_2D,
        TextureTarget::Cube => glow::TEXTURE_CUBE_MAP,
        TextureTarget::CubeFace(face) => glow::TEXTURE_CUBE_MAP_POSITIVE_X + u32::from(face.min(5)),
    }
}

/// (internal format, pixel format, pixel type)
fn texture_format(format: TextureFormat) -> (i32, u32, u32) {
    match format {
        TextureFormat::R8 => (glow::R8 as i32, glow::RED, glow::UNSIGNED_BYTE),
        TextureFormat::Rgb8 => (glow::RGB8 as i32, glow::RGB, glow::UNSIGNED_BYTE),
        TextureFormat::Rgba8 => (glow::RGBA8 as i32, glow::RGBA, glow::UNSIGNED_BYTE),
        TextureFormat::R16F => (glow::R16F as i32, glow::RED, glow::FLOAT),
        TextureFormat::Rg16F => (glow::RG16F as i32, glow::RG, glow::FLOAT),
        TextureFormat::Rgb16F => (glow::RGB16F as i32, glow::RGB, glow::FLOAT),
        TextureFormat::Rgba16F => (glow::RGBA16F as i32, glow::RGBA, glow::FLOAT),
        TextureFormat::Rgba32F => (glow::RGBA32F as i32, glow::RGBA, glow::FLOAT),
        TextureFormat::Depth24 => (glow::DEPTH_COMPONENT24 as i32, glow::DEPTH_COMPONENT, glow::UNSIGNED_INT),
    }
}

fn uniform_kind(utype: u32) -> UniformKind {
    match utype {
        glow::FLOAT => UniformKind::Float,
        glow::FLOAT_VEC2 => UniformKind::Vec2,
        glow::FLOAT_VEC3 => UniformKind::Vec3,
        glow::FLOAT_VEC4 => UniformKind::Vec4,
        glow::INT => UniformKind::Int,
        glow::BOOL => UniformKind::Bool,
        glow::FLOAT_MAT3 => UniformKind::Mat3,
        glow::FLOAT_MAT4 => UniformKind::Mat4,
        glow::SAMPLER_1D => UniformKind::Sampler1D,
        glow::SAMPLER_2D => UniformKind::Sampler2D,
        glow::SAMPLER_CUBE => UniformKind::SamplerCube,
        other => UniformKind::Other(other),
    }
}

fn buffer_target(target: BufferTarget) -> u32 {
    match target {
        BufferTarget::Array => glow::ARRAY_BUFFER,
        BufferTarget::ElementArray => glow::ELEMENT_ARRAY_BUFFER,
        BufferTarget::Uniform => glow::UNIFORM_BUFFER,
    }
}

fn primitive(mode: PrimitiveMode) -> u32 {
    match mode {
        PrimitiveMode::Triangles => glow::TRIANGLES,
        PrimitiveMode::TriangleStrip => glow::TRIANGLE_STRIP,
        PrimitiveMode::Lines => glow::LINES,
        PrimitiveMode::Points => glow::POINTS,
    }
}

fn blend_factor(factor: BlendFactor) -> u32 {
    match factor {
        BlendFactor::Zero => glow::ZERO,
        BlendFactor::One => glow::ONE,
        BlendFactor::SrcAlpha => glow::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => glow::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstColor => glow::DST_COLOR,
    }
}

fn clear_mask(flags: ClearFlags) -> u32 {
    let mut mask = 0;
    if flags.contains(ClearFlags::COLOR) {
        mask |= glow::COLOR_BUFFER_BIT;
    }
    if flags.contains(ClearFlags::DEPTH) {
        mask |= glow::DEPTH_BUFFER_BIT;
    }
    mask
}

fn to_id<T>(result: Result<T, String>, what: &str, raw: impl Fn(T) -> u32) -> DeviceResult<u32> {
    result
        .map(raw)
        .map_err(|e| RenderError::ResourceCreationFailed(format!("Failed to create {what}: {e}")))
}

impl GlowDevice {
    unsafe fn apply_texture_params(&self, target: u32, desc: &TextureDesc) {
        let (min, mag) = match desc.filter {
            TextureFilter::Nearest => (glow::NEAREST, glow::NEAREST),
            TextureFilter::Linear => (glow::LINEAR, glow::LINEAR),
            TextureFilter::LinearMipmapLinear => (glow::LINEAR_MIPMAP_LINEAR, glow::LINEAR),
        };
        let wrap = match desc.wrap {
            TextureWrap::Repeat => glow::REPEAT,
            TextureWrap::ClampToEdge => glow::CLAMP_TO_EDGE,
        };
        self.gl.tex_parameter_i32(target, glow::TEXTURE_MIN_FILTER, min as i32);
        self.gl.tex_parameter_i32(target, glow::TEXTURE_MAG_FILTER, mag as i32);
        self.gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_S, wrap as i32);
        self.gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_T, wrap as i32);
        if target == glow::TEXTURE_CUBE_MAP {
            self.gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_R, wrap as i32);
        }
    }

    unsafe fn upload_level0(&self, desc: &TextureDesc, data: Option<&[u8]>) {
        let (internal, format, ty) = texture_format(desc.format);
        let (w, h) = (desc.width as i32, desc.height as i32);
        match desc.target {
            TextureTarget::Texture1D => {
                self.gl.tex_image_1d(glow::TEXTURE_1D, 0, internal, w, 0, format, ty, data);
            }
            TextureTarget::Texture2D => {
                self.gl.tex_image_2d(glow::TEXTURE_2D, 0, internal, w, h, 0, format, ty, data);
            }
            TextureTarget::Cube | TextureTarget::CubeFace(_) => {
                for face in 0..6 {
                    self.gl.tex_image_2d(glow::TEXTURE_CUBE_MAP_POSITIVE_X + face, 0, internal, w, h, 0, format, ty, None);
                }
            }
        }
    }
}

impl RenderDevice for GlowDevice {
    fn backend_name(&self) -> &'static str {
        "OpenGL"
    }

    fn create_shader(&mut self, stage: ShaderStage, source: &str) -> DeviceResult<ShaderObjectId> {
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        unsafe {
            let handle = self
                .gl
                .create_shader(kind)
                .map_err(|e| RenderError::ResourceCreationFailed(format!("Failed to create {stage} shader: {e}")))?;
            self.gl.shader_source(handle, source);
            self.gl.compile_shader(handle);
            if !self.gl.get_shader_compile_status(handle) {
                let log = self.gl.get_shader_info_log(handle);
                self.gl.delete_shader(handle);
                return Err(RenderError::ShaderCompilation { stage, log });
            }
            Ok(ShaderObjectId(handle.0.get()))
        }
    }

    fn delete_shader(&mut self, id: ShaderObjectId) {
        if let Some(handle) = shader(id) {
            unsafe { self.gl.delete_shader(handle) };
        }
    }

    fn link_program(&mut self, vertex: ShaderObjectId, fragment: ShaderObjectId) -> DeviceResult<ProgramId> {
        let (Some(vs), Some(fs)) = (shader(vertex), shader(fragment)) else {
            return Err(RenderError::ProgramLink("Invalid shader object".to_string()));
        };
        unsafe {
            let handle = self
                .gl
                .create_program()
                .map_err(|e| RenderError::ResourceCreationFailed(format!("Failed to create program: {e}")))?;
            self.gl.attach_shader(handle, vs);
            self.gl.attach_shader(handle, fs);
            self.gl.link_program(handle);
            self.gl.detach_shader(handle, vs);
            self.gl.detach_shader(handle, fs);
            if !self.gl.get_program_link_status(handle) {
                let log = self.gl.get_program_info_log(handle);
                self.gl.delete_program(handle);
                return Err(RenderError::ProgramLink(log));
            }
            Ok(ProgramId(handle.0.get()))
        }
    }

    fn delete_program(&mut self, id: ProgramId) {
        if let Some(handle) = program(id) {
            unsafe { self.gl.delete_program(handle) };
        }
    }

    fn active_uniforms(&self, id: ProgramId) -> Vec<ActiveUniform> {
        let Some(handle) = program(id) else {
            return Vec::new();
        };
        unsafe {
            let count = self.gl.get_active_uniforms(handle);
            (0..count)
                .filter_map(|index| self.gl.get_active_uniform(handle, index))
                .map(|u| ActiveUniform {
                    name: u.name,
                    size: u.size,
                    kind: uniform_kind(u.utype),
                })
                .collect()
        }
    }

    fn uniform_location(&self, id: ProgramId, name: &str) -> Option<UniformLocation> {
        let handle = program(id)?;
        unsafe { self.gl.get_uniform_location(handle, name) }.map(|loc| UniformLocation(loc.0))
    }

    fn uniform_block_index(&self, id: ProgramId, name: &str) -> Option<u32> {
        let handle = program(id)?;
        unsafe { self.gl.get_uniform_block_index(handle, name) }
    }

    fn uniform_block_binding(&mut self, id: ProgramId, block_index: u32, binding: u32) {
        if let Some(handle) = program(id) {
            unsafe { self.gl.uniform_block_binding(handle, block_index, binding) };
        }
    }

    fn use_program(&mut self, id: Option<ProgramId>) {
        unsafe { self.gl.use_program(id.and_then(program)) };
    }

    fn set_uniform_i32(&mut self, loc: UniformLocation, value: i32) {
        unsafe { self.gl.uniform_1_i32(Some(&location(loc)), value) };
    }

    fn set_uniform_f32(&mut self, loc: UniformLocation, value: f32) {
        unsafe { self.gl.uniform_1_f32(Some(&location(loc)), value) };
    }

    fn set_uniform_vec2(&mut self, loc: UniformLocation, [x, y]: [f32; 2]) {
        unsafe { self.gl.uniform_2_f32(Some(&location(loc)), x, y) };
    }

    fn set_uniform_vec3(&mut self, loc: UniformLocation, [x, y, z]: [f32; 3]) {
        unsafe { self.gl.uniform_3_f32(Some(&location(loc)), x, y, z) };
    }

    fn set_uniform_vec4(&mut self, loc: UniformLocation, [x, y, z, w]: [f32; 4]) {
        unsafe { self.gl.uniform_4_f32(Some(&location(loc)), x, y, z, w) };
    }

    fn set_uniform_mat4(&mut self, loc: UniformLocation, value: &[f32; 16]) {
        unsafe { self.gl.uniform_matrix_4_f32_slice(Some(&location(loc)), false, value) };
    }

    fn create_texture(&mut self, desc: &TextureDesc, data: Option<&[u8]>) -> DeviceResult<TextureId> {
        let target = texture_target(desc.target);
        unsafe {
            let raw = to_id(self.gl.create_texture(), "texture", |t| t.0.get())?;
            let handle = texture(TextureId(raw));
            self.gl.bind_texture(target, handle);
            self.upload_level0(desc, data);
            self.apply_texture_params(target, desc);
            if desc.mipmaps {
                self.gl.generate_mipmap(target);
            }
            self.gl.bind_texture(target, None);
            Ok(TextureId(raw))
        }
    }

    fn update_texture(&mut self, id: TextureId, desc: &TextureDesc, data: &[u8]) {
        let target = texture_target(desc.target);
        unsafe {
            self.gl.bind_texture(target, texture(id));
            self.upload_level0(desc, Some(data));
            if desc.mipmaps {
                self.gl.generate_mipmap(target);
            }
            self.gl.bind_texture(target, None);
        }
    }

    fn delete_texture(&mut self, id: TextureId) {
        if let Some(handle) = texture(id) {
            unsafe { self.gl.delete_texture(handle) };
        }
    }

    fn generate_mipmap(&mut self, target: TextureTarget, id: TextureId) {
        let target = texture_target(target);
        unsafe {
            self.gl.bind_texture(target, texture(id));
            self.gl.generate_mipmap(target);
        }
    }

    fn active_texture(&mut self, slot: u32) {
        unsafe { self.gl.active_texture(glow::TEXTURE0 + slot) };
    }

    fn bind_texture(&mut self, target: TextureTarget, id: Option<TextureId>) {
        unsafe { self.gl.bind_texture(texture_target(target), id.and_then(texture)) };
    }

    fn create_framebuffer(&mut self) -> DeviceResult<FramebufferId> {
        unsafe { to_id(self.gl.create_framebuffer(), "framebuffer", |f| f.0.get()) }.map(FramebufferId)
    }

    fn delete_framebuffer(&mut self, id: FramebufferId) {
        if let Some(handle) = framebuffer(id) {
            unsafe { self.gl.delete_framebuffer(handle) };
        }
    }

    fn bind_framebuffer(&mut self, id: Option<FramebufferId>) {
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, id.and_then(framebuffer)) };
    }

    fn framebuffer_texture(&mut self, attachment: Attachment, target: TextureTarget, id: Option<TextureId>, level: i32) {
        let attachment = match attachment {
            Attachment::Color(i) => glow::COLOR_ATTACHMENT0 + i,
            Attachment::Depth => glow::DEPTH_ATTACHMENT,
        };
        unsafe {
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                attachment,
                texture_target(target),
                id.and_then(texture),
                level,
            );
        }
    }

    fn draw_buffers(&mut self, count: u32) {
        let buffers: Vec<u32> = if count == 0 {
            vec![glow::NONE]
        } else {
            (0..count).map(|i| glow::COLOR_ATTACHMENT0 + i).collect()
        };
        unsafe { self.gl.draw_buffers(&buffers) };
    }

    fn framebuffer_complete(&self) -> bool {
        unsafe { self.gl.check_framebuffer_status(glow::FRAMEBUFFER) == glow::FRAMEBUFFER_COMPLETE }
    }

    fn blit_framebuffer(
        &mut self,
        source: Option<FramebufferId>,
        destination: Option<FramebufferId>,
        src: Rect,
        dst: Rect,
        mask: ClearFlags,
        filter: BlitFilter,
    ) {
        let filter = match filter {
            BlitFilter::Nearest => glow::NEAREST,
            BlitFilter::Linear => glow::LINEAR,
        };
        unsafe {
            self.gl.bind_framebuffer(glow::READ_FRAMEBUFFER, source.and_then(framebuffer));
            self.gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, destination.and_then(framebuffer));
            self.gl.blit_framebuffer(
                src.x,
                src.y,
                src.x + src.w,
                src.y + src.h,
                dst.x,
                dst.y,
                dst.x + dst.w,
                dst.y + dst.h,
                clear_mask(mask),
                filter,
            );
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, destination.and_then(framebuffer));
        }
    }

    fn create_buffer(&mut self) -> DeviceResult<BufferId> {
        unsafe { to_id(self.gl.create_buffer(), "buffer", |b| b.0.get()) }.map(BufferId)
    }

    fn delete_buffer(&mut self, id: BufferId) {
        if let Some(handle) = buffer(id) {
            unsafe { self.gl.delete_buffer(handle) };
        }
    }

    fn bind_buffer(&mut self, target: BufferTarget, id: Option<BufferId>) {
        unsafe { self.gl.bind_buffer(buffer_target(target), id.and_then(buffer)) };
    }

    fn buffer_data(&mut self, target: BufferTarget, id: BufferId, data: &[u8], usage: BufferUsage) {
        let usage = match usage {
            BufferUsage::Static => glow::STATIC_DRAW,
            BufferUsage::Dynamic => glow::DYNAMIC_DRAW,
            BufferUsage::Stream => glow::STREAM_DRAW,
        };
        let target = buffer_target(target);
        unsafe {
            self.gl.bind_buffer(target, buffer(id));
            self.gl.buffer_data_u8_slice(target, data, usage);
        }
    }

    fn buffer_sub_data(&mut self, target: BufferTarget, id: BufferId, offset: i32, data: &[u8]) {
        let target = buffer_target(target);
        unsafe {
            self.gl.bind_buffer(target, buffer(id));
            self.gl.buffer_sub_data_u8_slice(target, offset, data);
        }
    }

    fn bind_uniform_buffer_base(&mut self, binding: u32, id: BufferId) {
        unsafe { self.gl.bind_buffer_base(glow::UNIFORM_BUFFER, binding, buffer(id)) };
    }

    fn create_vertex_array(&mut self) -> DeviceResult<VertexArrayId> {
        unsafe { to_id(self.gl.create_vertex_array(), "vertex array", |v| v.0.get()) }.map(VertexArrayId)
    }

    fn delete_vertex_array(&mut self, id: VertexArrayId) {
        if let Some(handle) = vertex_array(id) {
            unsafe { self.gl.delete_vertex_array(handle) };
        }
    }

    fn bind_vertex_array(&mut self, id: Option<VertexArrayId>) {
        unsafe { self.gl.bind_vertex_array(id.and_then(vertex_array)) };
    }

    fn vertex_attrib(&mut self, attrib: &VertexAttrib) {
        unsafe {
            self.gl.enable_vertex_attrib_array(attrib.location);
            match attrib.kind {
                AttribKind::Float => self.gl.vertex_attrib_pointer_f32(
                    attrib.location,
                    attrib.components,
                    glow::FLOAT,
                    false,
                    attrib.stride,
                    attrib.offset,
                ),
                AttribKind::UnsignedByteNormalized => self.gl.vertex_attrib_pointer_f32(
                    attrib.location,
                    attrib.components,
                    glow::UNSIGNED_BYTE,
                    true,
                    attrib.stride,
                    attrib.offset,
                ),
                AttribKind::Int => self.gl.vertex_attrib_pointer_i32(
                    attrib.location,
                    attrib.components,
                    glow::INT,
                    attrib.stride,
                    attrib.offset,
                ),
            }
            self.gl.vertex_attrib_divisor(attrib.location, attrib.divisor);
        }
    }

    fn disable_vertex_attrib(&mut self, location: u32) {
        unsafe { self.gl.disable_vertex_attrib_array(location) };
    }

    fn vertex_attrib_constant(&mut self, location: u32, [x, y, z, w]: [f32; 4]) {
        unsafe { self.gl.vertex_attrib_4_f32(location, x, y, z, w) };
    }

    fn draw_arrays(&mut self, mode: PrimitiveMode, first: i32, count: i32) {
        unsafe { self.gl.draw_arrays(primitive(mode), first, count) };
    }

    fn draw_elements(&mut self, mode: PrimitiveMode, count: i32) {
        unsafe { self.gl.draw_elements(primitive(mode), count, glow::UNSIGNED_INT, 0) };
    }

    fn draw_arrays_instanced(&mut self, mode: PrimitiveMode, first: i32, count: i32, instances: i32) {
        unsafe { self.gl.draw_arrays_instanced(primitive(mode), first, count, instances) };
    }

    fn draw_elements_instanced(&mut self, mode: PrimitiveMode, count: i32, instances: i32) {
        unsafe { self.gl.draw_elements_instanced(primitive(mode), count, glow::UNSIGNED_INT, 0, instances) };
    }

    fn viewport(&mut self, rect: Rect) {
        unsafe { self.gl.viewport(rect.x, rect.y, rect.w, rect.h) };
    }

    fn scissor(&mut self, rect: Rect) {
        unsafe { self.gl.scissor(rect.x, rect.y, rect.w, rect.h) };
    }

    fn set_capability(&mut self, capability: Capability, enabled: bool) {
        let cap = match capability {
            Capability::DepthTest => glow::DEPTH_TEST,
            Capability::Blend => glow::BLEND,
            Capability::CullFace => glow::CULL_FACE,
            Capability::ScissorTest => glow::SCISSOR_TEST,
        };
        unsafe {
            if enabled {
                self.gl.enable(cap);
            } else {
                self.gl.disable(cap);
            }
        }
    }

    fn depth_func(&mut self, func: DepthFunc) {
        let func = match func {
            DepthFunc::Less => glow::LESS,
            DepthFunc::LessEqual => glow::LEQUAL,
            DepthFunc::Greater => glow::GREATER,
            DepthFunc::Always => glow::ALWAYS,
        };
        unsafe { self.gl.depth_func(func) };
    }

    fn depth_mask(&mut self, write: bool) {
        unsafe { self.gl.depth_mask(write) };
    }

    fn blend_func(&mut self, source: BlendFactor, destination: BlendFactor) {
        unsafe { self.gl.blend_func(blend_factor(source), blend_factor(destination)) };
    }

    fn blend_equation(&mut self, equation: BlendEquation) {
        let mode = match equation {
            BlendEquation::Add => glow::FUNC_ADD,
        };
        unsafe { self.gl.blend_equation(mode) };
    }

    fn cull_face(&mut self, face: Face) {
        let face = match face {
            Face::Back => glow::BACK,
            Face::Front => glow::FRONT,
        };
        unsafe { self.gl.cull_face(face) };
    }

    fn clear_color(&mut self, [r, g, b, a]: [f32; 4]) {
        unsafe { self.gl.clear_color(r, g, b, a) };
    }

    fn clear(&mut self, flags: ClearFlags) {
        unsafe { self.gl.clear(clear_mask(flags)) };
    }

    fn push_debug_group(&mut self, label: &str) {
        if self.gl.supports_debug() {
            unsafe { self.gl.push_debug_group(glow::DEBUG_SOURCE_APPLICATION, 0, label) };
        }
    }

    fn pop_debug_group(&mut self) {
        if self.gl.supports_debug() {
            unsafe { self.gl.pop_debug_group() };
        }
    }
}
