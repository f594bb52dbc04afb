//! Headless device that records every call
//!
//! Compilation, linking and uniform reflection are simulated from the GLSL
//! text so the full pipeline, custom shaders included, runs without a GPU.
//! The command log is shared through [`CommandLog`], which stays readable
//! after the device has been boxed into a renderer.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::foundation::math::Rect;
use crate::render::api::{
    ActiveUniform, Attachment, BlendEquation, BlendFactor, BlitFilter, BufferId, BufferTarget,
    BufferUsage, Capability, ClearFlags, DepthFunc, DeviceResult, Face, FramebufferId,
    PrimitiveMode, ProgramId, RenderDevice, ShaderObjectId, ShaderStage, TextureDesc, TextureId,
    TextureTarget, UniformKind, UniformLocation, VertexArrayId, VertexAttrib,
};
use crate::render::RenderError;

/// Value passed to a uniform setter
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    /// `int`, `bool` or sampler slot
    I32(i32),
    /// `float`
    F32(f32),
    /// `vec2`
    Vec2([f32; 2]),
    /// `vec3`
    Vec3([f32; 3]),
    /// `vec4`
    Vec4([f32; 4]),
    /// `mat4`
    Mat4([f32; 16]),
}

/// One recorded device call
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    CreateShader { id: ShaderObjectId, stage: ShaderStage },
    DeleteShader(ShaderObjectId),
    LinkProgram { id: ProgramId, vertex: ShaderObjectId, fragment: ShaderObjectId },
    DeleteProgram(ProgramId),
    UniformBlockBinding { program: ProgramId, block: u32, binding: u32 },
    UseProgram(Option<ProgramId>),
    /// Uniform set on the current program, with the name resolved from its reflection table
    SetUniform { program: Option<ProgramId>, name: String, value: UniformValue },
    CreateTexture { id: TextureId, desc: TextureDesc },
    UpdateTexture(TextureId),
    DeleteTexture(TextureId),
    GenerateMipmap(TextureId),
    ActiveTexture(u32),
    BindTexture { target: TextureTarget, texture: Option<TextureId> },
    CreateFramebuffer(FramebufferId),
    DeleteFramebuffer(FramebufferId),
    BindFramebuffer(Option<FramebufferId>),
    FramebufferTexture { attachment: Attachment, target: TextureTarget, texture: Option<TextureId>, level: i32 },
    DrawBuffers(u32),
    Blit { source: Option<FramebufferId>, destination: Option<FramebufferId>, source_rect: Rect, destination_rect: Rect, mask: ClearFlags, filter: BlitFilter },
    CreateBuffer(BufferId),
    DeleteBuffer(BufferId),
    BindBuffer { target: BufferTarget, buffer: Option<BufferId> },
    BufferData { target: BufferTarget, buffer: BufferId, len: usize },
    BufferSubData { target: BufferTarget, buffer: BufferId, offset: i32, len: usize },
    BindUniformBufferBase { binding: u32, buffer: BufferId },
    CreateVertexArray(VertexArrayId),
    DeleteVertexArray(VertexArrayId),
    BindVertexArray(Option<VertexArrayId>),
    VertexAttrib(VertexAttrib),
    DisableVertexAttrib(u32),
    VertexAttribConstant { location: u32, value: [f32; 4] },
    /// Any draw, with the program and framebuffer bound at the time
    Draw { program: Option<ProgramId>, framebuffer: Option<FramebufferId>, mode: PrimitiveMode, count: i32, instances: i32, indexed: bool },
    Viewport(Rect),
    Scissor(Rect),
    Capability { capability: Capability, enabled: bool },
    DepthFunc(DepthFunc),
    DepthMask(bool),
    BlendFunc(BlendFactor, BlendFactor),
    BlendEquation(BlendEquation),
    CullFace(Face),
    ClearColor([f32; 4]),
    Clear(ClearFlags),
    PushDebugGroup(String),
    PopDebugGroup,
}

/// Fixed-function and binding state tracked by the recorder
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedState {
    /// Current program
    pub program: Option<ProgramId>,
    /// Current framebuffer
    pub framebuffer: Option<FramebufferId>,
    /// Current vertex array
    pub vertex_array: Option<VertexArrayId>,
    /// Current viewport
    pub viewport: Rect,
    /// Depth test enabled
    pub depth_test: bool,
    /// Blending enabled
    pub blend: bool,
    /// Face culling enabled
    pub cull_face: bool,
    /// Scissor test enabled
    pub scissor_test: bool,
    /// Depth comparison
    pub depth_func: DepthFunc,
    /// Depth writes
    pub depth_mask: bool,
    /// Blend factors
    pub blend_func: (BlendFactor, BlendFactor),
    /// Culled face
    pub cull: Face,
}

impl Default for TrackedState {
    fn default() -> Self {
        Self {
            program: None,
            framebuffer: None,
            vertex_array: None,
            viewport: Rect::default(),
            depth_test: false,
            blend: false,
            cull_face: false,
            scissor_test: false,
            depth_func: DepthFunc::Less,
            depth_mask: true,
            blend_func: (BlendFactor::One, BlendFactor::Zero),
            cull: Face::Back,
        }
    }
}

#[derive(Debug, Default)]
struct LogInner {
    commands: Vec<DeviceCommand>,
    state: TrackedState,
}

/// Shared handle to a recorder's command log
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    inner: Rc<RefCell<LogInner>>,
}

impl CommandLog {
    fn push(&self, command: DeviceCommand) {
        self.inner.borrow_mut().commands.push(command);
    }

    fn state_mut<R>(&self, f: impl FnOnce(&mut TrackedState) -> R) -> R {
        f(&mut self.inner.borrow_mut().state)
    }

    /// Snapshot of all commands recorded so far
    pub fn commands(&self) -> Vec<DeviceCommand> {
        self.inner.borrow().commands.clone()
    }

    /// Number of recorded commands
    pub fn len(&self) -> usize {
        self.inner.borrow().commands.len()
    }

    /// True when nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every recorded command, keeping the tracked state
    pub fn clear(&self) {
        self.inner.borrow_mut().commands.clear();
    }

    /// Current tracked state
    pub fn state(&self) -> TrackedState {
        self.inner.borrow().state.clone()
    }

    /// Labels of every debug group, in push order
    pub fn debug_groups(&self) -> Vec<String> {
        self.inner
            .borrow()
            .commands
            .iter()
            .filter_map(|c| match c {
                DeviceCommand::PushDebugGroup(label) => Some(label.clone()),
                _ => None,
            })
            .collect()
    }

    /// How many times a debug group with this label was opened
    pub fn count_groups(&self, label: &str) -> usize {
        self.debug_groups().iter().filter(|l| l.as_str() == label).count()
    }

    /// Every draw command
    pub fn draws(&self) -> Vec<DeviceCommand> {
        self.inner
            .borrow()
            .commands
            .iter()
            .filter(|c| matches!(c, DeviceCommand::Draw { .. }))
            .cloned()
            .collect()
    }

    /// Index of the first command matching `pred`
    pub fn position(&self, pred: impl Fn(&DeviceCommand) -> bool) -> Option<usize> {
        self.inner.borrow().commands.iter().position(pred)
    }

    /// Values set for a named uniform, in order
    pub fn uniform_values(&self, name: &str) -> Vec<UniformValue> {
        self.inner
            .borrow()
            .commands
            .iter()
            .filter_map(|c| match c {
                DeviceCommand::SetUniform { name: n, value, .. } if n == name => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    /// Commands recorded inside every debug group with this label
    pub fn commands_in_group(&self, label: &str) -> Vec<DeviceCommand> {
        let mut out = Vec::new();
        let mut depth = 0usize;
        let mut inside: Option<usize> = None;
        for command in &self.inner.borrow().commands {
            match command {
                DeviceCommand::PushDebugGroup(l) => {
                    depth += 1;
                    if inside.is_none() && l == label {
                        inside = Some(depth);
                        continue;
                    }
                }
                DeviceCommand::PopDebugGroup => {
                    if inside == Some(depth) {
                        inside = None;
                    }
                    depth = depth.saturating_sub(1);
                    if inside.is_none() {
                        continue;
                    }
                }
                _ => {}
            }
            if inside.is_some() {
                out.push(command.clone());
            }
        }
        out
    }
}

#[derive(Debug)]
struct SimProgram {
    uniforms: Vec<ActiveUniform>,
    locations: HashMap<String, u32>,
    blocks: Vec<String>,
}

impl SimProgram {
    fn name_of(&self, location: UniformLocation) -> Option<&str> {
        self.uniforms
            .iter()
            .find(|u| self.locations.get(&u.name) == Some(&location.0))
            .map(|u| u.name.as_str())
            .or_else(|| {
                self.locations
                    .iter()
                    .find(|(_, &l)| l == location.0)
                    .map(|(n, _)| n.as_str())
            })
    }
}

/// Device without a GPU
#[derive(Debug, Default)]
pub struct RecordingDevice {
    log: CommandLog,
    next_id: u32,
    shaders: HashMap<u32, String>,
    programs: HashMap<u32, SimProgram>,
}

impl RecordingDevice {
    /// New recorder with an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the command log
    pub fn log(&self) -> CommandLog {
        self.log.clone()
    }

    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn current_uniform_name(&self, location: UniformLocation) -> String {
        let program = self.log.state().program;
        program
            .and_then(|p| self.programs.get(&p.0))
            .and_then(|p| p.name_of(location))
            .map_or_else(|| format!("<{}>", location.0), str::to_string)
    }

    fn record_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let name = self.current_uniform_name(location);
        let program = self.log.state().program;
        self.log.push(DeviceCommand::SetUniform { program, name, value });
    }
}

/// Reject sources a real compiler would reject in the simulated cases
fn check_source(source: &str) -> Result<(), String> {
    if let Some(line) = source.lines().find(|l| l.trim_start().starts_with("#error")) {
        return Err(format!("0:0: error: {}", line.trim()));
    }
    let mut depth = 0i64;
    for c in source.chars() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return Err("0:0: error: unexpected '}'".to_string());
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err("0:0: error: unexpected end of file, missing '}'".to_string());
    }
    Ok(())
}

fn parse_kind(type_name: &str) -> UniformKind {
    match type_name {
        "float" => UniformKind::Float,
        "vec2" => UniformKind::Vec2,
        "vec3" => UniformKind::Vec3,
        "vec4" => UniformKind::Vec4,
        "int" => UniformKind::Int,
        "bool" => UniformKind::Bool,
        "mat3" => UniformKind::Mat3,
        "mat4" => UniformKind::Mat4,
        "sampler1D" => UniformKind::Sampler1D,
        "sampler2D" => UniformKind::Sampler2D,
        "samplerCube" => UniformKind::SamplerCube,
        _ => UniformKind::Other(0),
    }
}

/// Reflect `uniform` declarations of the given sources
///
/// Block members are skipped; a `uniform Name {` line registers a block.
fn reflect(sources: &[&str]) -> (Vec<ActiveUniform>, Vec<String>) {
    let mut uniforms: Vec<ActiveUniform> = Vec::new();
    let mut blocks: Vec<String> = Vec::new();
    for source in sources {
        let mut in_block = false;
        for line in source.lines() {
            let line = line.trim();
            if in_block {
                if line.starts_with('}') {
                    in_block = false;
                }
                continue;
            }
            let Some(pos) = line.find("uniform ") else { continue };
            if pos > 0 && !line.starts_with("layout") {
                continue;
            }
            let rest = line[pos + "uniform ".len()..].trim();
            if rest.contains('{') || !rest.contains(';') {
                let name = rest.trim_end_matches('{').trim().to_string();
                if !name.is_empty() && !blocks.contains(&name) {
                    blocks.push(name);
                }
                in_block = !rest.contains('}');
                continue;
            }
            let decl = rest.split(';').next().unwrap_or_default();
            let mut tokens = decl
                .split_whitespace()
                .filter(|t| !matches!(*t, "highp" | "mediump" | "lowp"));
            let (Some(type_name), Some(raw_name)) = (tokens.next(), tokens.next()) else { continue };
            let (name, size) = match raw_name.split_once('[') {
                Some((base, count)) => {
                    let count = count.trim_end_matches(']').parse::<i32>().unwrap_or(1);
                    (format!("{base}[0]"), count)
                }
                None => (raw_name.to_string(), 1),
            };
            if uniforms.iter().any(|u| u.name == name) {
                continue;
            }
            uniforms.push(ActiveUniform { name, size, kind: parse_kind(type_name) });
        }
    }
    (uniforms, blocks)
}

impl RenderDevice for RecordingDevice {
    fn backend_name(&self) -> &'static str {
        "Recording"
    }

    fn create_shader(&mut self, stage: ShaderStage, source: &str) -> DeviceResult<ShaderObjectId> {
        check_source(source).map_err(|log| RenderError::ShaderCompilation { stage, log })?;
        let id = ShaderObjectId(self.allocate());
        self.shaders.insert(id.0, source.to_string());
        self.log.push(DeviceCommand::CreateShader { id, stage });
        Ok(id)
    }

    fn delete_shader(&mut self, shader: ShaderObjectId) {
        self.shaders.remove(&shader.0);
        self.log.push(DeviceCommand::DeleteShader(shader));
    }

    fn link_program(&mut self, vertex: ShaderObjectId, fragment: ShaderObjectId) -> DeviceResult<ProgramId> {
        let (Some(vs), Some(fs)) = (self.shaders.get(&vertex.0), self.shaders.get(&fragment.0)) else {
            return Err(RenderError::ProgramLink("Invalid shader object".to_string()));
        };
        if !vs.contains("void main") || !fs.contains("void main") {
            return Err(RenderError::ProgramLink("error: missing entry point 'main'".to_string()));
        }
        let (uniforms, blocks) = reflect(&[vs.as_str(), fs.as_str()]);
        let mut locations = HashMap::new();
        let mut next = 0u32;
        for uniform in &uniforms {
            let base = uniform.name.trim_end_matches("[0]").to_string();
            locations.insert(uniform.name.clone(), next);
            if uniform.size > 1 || uniform.name.ends_with("[0]") {
                locations.insert(base.clone(), next);
                for i in 0..uniform.size.max(1) as u32 {
                    locations.insert(format!("{base}[{i}]"), next + i);
                }
            }
            next += uniform.size.max(1) as u32;
        }
        let id = ProgramId(self.allocate());
        self.programs.insert(id.0, SimProgram { uniforms, locations, blocks });
        self.log.push(DeviceCommand::LinkProgram { id, vertex, fragment });
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program.0);
        self.log.push(DeviceCommand::DeleteProgram(program));
    }

    fn active_uniforms(&self, program: ProgramId) -> Vec<ActiveUniform> {
        self.programs.get(&program.0).map(|p| p.uniforms.clone()).unwrap_or_default()
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.programs
            .get(&program.0)
            .and_then(|p| p.locations.get(name))
            .map(|&l| UniformLocation(l))
    }

    fn uniform_block_index(&self, program: ProgramId, name: &str) -> Option<u32> {
        self.programs
            .get(&program.0)
            .and_then(|p| p.blocks.iter().position(|b| b == name))
            .map(|i| i as u32)
    }

    fn uniform_block_binding(&mut self, program: ProgramId, block: u32, binding: u32) {
        self.log.push(DeviceCommand::UniformBlockBinding { program, block, binding });
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.log.state_mut(|s| s.program = program);
        self.log.push(DeviceCommand::UseProgram(program));
    }

    fn set_uniform_i32(&mut self, location: UniformLocation, value: i32) {
        self.record_uniform(location, UniformValue::I32(value));
    }

    fn set_uniform_f32(&mut self, location: UniformLocation, value: f32) {
        self.record_uniform(location, UniformValue::F32(value));
    }

    fn set_uniform_vec2(&mut self, location: UniformLocation, value: [f32; 2]) {
        self.record_uniform(location, UniformValue::Vec2(value));
    }

    fn set_uniform_vec3(&mut self, location: UniformLocation, value: [f32; 3]) {
        self.record_uniform(location, UniformValue::Vec3(value));
    }

    fn set_uniform_vec4(&mut self, location: UniformLocation, value: [f32; 4]) {
        self.record_uniform(location, UniformValue::Vec4(value));
    }

    fn set_uniform_mat4(&mut self, location: UniformLocation, value: &[f32; 16]) {
        self.record_uniform(location, UniformValue::Mat4(*value));
    }

    fn create_texture(&mut self, desc: &TextureDesc, data: Option<&[u8]>) -> DeviceResult<TextureId> {
        if let Some(data) = data {
            let expected = desc.width as usize * desc.height.max(1) as usize * desc.format.bytes_per_texel();
            if data.len() < expected {
                return Err(RenderError::ResourceCreationFailed(format!(
                    "Texture upload too small: {} bytes, expected {expected}",
                    data.len()
                )));
            }
        }
        let id = TextureId(self.allocate());
        self.log.push(DeviceCommand::CreateTexture { id, desc: *desc });
        Ok(id)
    }

    fn update_texture(&mut self, texture: TextureId, _desc: &TextureDesc, _data: &[u8]) {
        self.log.push(DeviceCommand::UpdateTexture(texture));
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.log.push(DeviceCommand::DeleteTexture(texture));
    }

    fn generate_mipmap(&mut self, _target: TextureTarget, texture: TextureId) {
        self.log.push(DeviceCommand::GenerateMipmap(texture));
    }

    fn active_texture(&mut self, slot: u32) {
        self.log.push(DeviceCommand::ActiveTexture(slot));
    }

    fn bind_texture(&mut self, target: TextureTarget, texture: Option<TextureId>) {
        self.log.push(DeviceCommand::BindTexture { target, texture });
    }

    fn create_framebuffer(&mut self) -> DeviceResult<FramebufferId> {
        let id = FramebufferId(self.allocate());
        self.log.push(DeviceCommand::CreateFramebuffer(id));
        Ok(id)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.log.push(DeviceCommand::DeleteFramebuffer(framebuffer));
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.log.state_mut(|s| s.framebuffer = framebuffer);
        self.log.push(DeviceCommand::BindFramebuffer(framebuffer));
    }

    fn framebuffer_texture(&mut self, attachment: Attachment, target: TextureTarget, texture: Option<TextureId>, level: i32) {
        self.log.push(DeviceCommand::FramebufferTexture { attachment, target, texture, level });
    }

    fn draw_buffers(&mut self, count: u32) {
        self.log.push(DeviceCommand::DrawBuffers(count));
    }

    fn framebuffer_complete(&self) -> bool {
        true
    }

    fn blit_framebuffer(
        &mut self,
        source: Option<FramebufferId>,
        destination: Option<FramebufferId>,
        source_rect: Rect,
        destination_rect: Rect,
        mask: ClearFlags,
        filter: BlitFilter,
    ) {
        self.log.state_mut(|s| s.framebuffer = destination);
        self.log.push(DeviceCommand::Blit { source, destination, source_rect, destination_rect, mask, filter });
    }

    fn create_buffer(&mut self) -> DeviceResult<BufferId> {
        let id = BufferId(self.allocate());
        self.log.push(DeviceCommand::CreateBuffer(id));
        Ok(id)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.log.push(DeviceCommand::DeleteBuffer(buffer));
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferId>) {
        self.log.push(DeviceCommand::BindBuffer { target, buffer });
    }

    fn buffer_data(&mut self, target: BufferTarget, buffer: BufferId, data: &[u8], _usage: BufferUsage) {
        self.log.push(DeviceCommand::BufferData { target, buffer, len: data.len() });
    }

    fn buffer_sub_data(&mut self, target: BufferTarget, buffer: BufferId, offset: i32, data: &[u8]) {
        self.log.push(DeviceCommand::BufferSubData { target, buffer, offset, len: data.len() });
    }

    fn bind_uniform_buffer_base(&mut self, binding: u32, buffer: BufferId) {
        self.log.push(DeviceCommand::BindUniformBufferBase { binding, buffer });
    }

    fn create_vertex_array(&mut self) -> DeviceResult<VertexArrayId> {
        let id = VertexArrayId(self.allocate());
        self.log.push(DeviceCommand::CreateVertexArray(id));
        Ok(id)
    }

    fn delete_vertex_array(&mut self, vertex_array: VertexArrayId) {
        self.log.push(DeviceCommand::DeleteVertexArray(vertex_array));
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>) {
        self.log.state_mut(|s| s.vertex_array = vertex_array);
        self.log.push(DeviceCommand::BindVertexArray(vertex_array));
    }

    fn vertex_attrib(&mut self, attrib: &VertexAttrib) {
        self.log.push(DeviceCommand::VertexAttrib(*attrib));
    }

    fn disable_vertex_attrib(&mut self, location: u32) {
        self.log.push(DeviceCommand::DisableVertexAttrib(location));
    }

    fn vertex_attrib_constant(&mut self, location: u32, value: [f32; 4]) {
        self.log.push(DeviceCommand::VertexAttribConstant { location, value });
    }

    fn draw_arrays(&mut self, mode: PrimitiveMode, _first: i32, count: i32) {
        self.draw_arrays_instanced(mode, 0, count, 1);
    }

    fn draw_elements(&mut self, mode: PrimitiveMode, count: i32) {
        self.draw_elements_instanced(mode, count, 1);
    }

    fn draw_arrays_instanced(&mut self, mode: PrimitiveMode, _first: i32, count: i32, instances: i32) {
        let state = self.log.state();
        self.log.push(DeviceCommand::Draw {
            program: state.program,
            framebuffer: state.framebuffer,
            mode,
            count,
            instances,
            indexed: false,
        });
    }

    fn draw_elements_instanced(&mut self, mode: PrimitiveMode, count: i32, instances: i32) {
        let state = self.log.state();
        self.log.push(DeviceCommand::Draw {
            program: state.program,
            framebuffer: state.framebuffer,
            mode,
            count,
            instances,
            indexed: true,
        });
    }

    fn viewport(&mut self, rect: Rect) {
        self.log.state_mut(|s| s.viewport = rect);
        self.log.push(DeviceCommand::Viewport(rect));
    }

    fn scissor(&mut self, rect: Rect) {
        self.log.push(DeviceCommand::Scissor(rect));
    }

    fn set_capability(&mut self, capability: Capability, enabled: bool) {
        self.log.state_mut(|s| match capability {
            Capability::DepthTest => s.depth_test = enabled,
            Capability::Blend => s.blend = enabled,
            Capability::CullFace => s.cull_face = enabled,
            Capability::ScissorTest => s.scissor_test = enabled,
        });
        self.log.push(DeviceCommand::Capability { capability, enabled });
    }

    fn depth_func(&mut self, func: DepthFunc) {
        self.log.state_mut(|s| s.depth_func = func);
        self.log.push(DeviceCommand::DepthFunc(func));
    }

    fn depth_mask(&mut self, write: bool) {
        self.log.state_mut(|s| s.depth_mask = write);
        self.log.push(DeviceCommand::DepthMask(write));
    }

    fn blend_func(&mut self, source: BlendFactor, destination: BlendFactor) {
        self.log.state_mut(|s| s.blend_func = (source, destination));
        self.log.push(DeviceCommand::BlendFunc(source, destination));
    }

    fn blend_equation(&mut self, equation: BlendEquation) {
        self.log.push(DeviceCommand::BlendEquation(equation));
    }

    fn cull_face(&mut self, face: Face) {
        self.log.state_mut(|s| s.cull = face);
        self.log.push(DeviceCommand::CullFace(face));
    }

    fn clear_color(&mut self, color: [f32; 4]) {
        self.log.push(DeviceCommand::ClearColor(color));
    }

    fn clear(&mut self, flags: ClearFlags) {
        self.log.push(DeviceCommand::Clear(flags));
    }

    fn push_debug_group(&mut self, label: &str) {
        self.log.push(DeviceCommand::PushDebugGroup(label.to_string()));
    }

    fn pop_debug_group(&mut self) {
        self.log.push(DeviceCommand::PopDebugGroup);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VS: &str = "#version 330\nuniform mat4 uMatModel;\nvoid main() {}\n";

    fn link(device: &mut RecordingDevice, fs: &str) -> DeviceResult<ProgramId> {
        let vs = device.create_shader(ShaderStage::Vertex, VS)?;
        let fs = device.create_shader(ShaderStage::Fragment, fs)?;
        device.link_program(vs, fs)
    }

    #[test]
    fn test_compile_error_is_reported() {
        let mut device = RecordingDevice::new();
        let err = device.create_shader(ShaderStage::Fragment, "void main() {").unwrap_err();
        assert!(matches!(err, RenderError::ShaderCompilation { stage: ShaderStage::Fragment, .. }));
    }

    #[test]
    fn test_reflection_skips_block_members_and_reports_arrays() {
        let mut device = RecordingDevice::new();
        let fs = "#version 330\n\
                  layout(std140) uniform ViewBlock {\n    mat4 uView;\n};\n\
                  uniform float uValues[3];\n\
                  uniform sampler2D uTex;\n\
                  void main() {}\n";
        let program = link(&mut device, fs).unwrap();
        let names: Vec<_> = device.active_uniforms(program).into_iter().map(|u| u.name).collect();
        assert_eq!(names, vec!["uMatModel", "uValues[0]", "uTex"]);
        assert_eq!(device.uniform_block_index(program, "ViewBlock"), Some(0));
        assert_eq!(device.uniform_location(program, "uTex"), Some(UniformLocation(4)));
    }

    #[test]
    fn test_uniform_commands_resolve_names() {
        let mut device = RecordingDevice::new();
        let log = device.log();
        let program = link(&mut device, "uniform float uBlend;\nvoid main() {}\n").unwrap();
        let loc = device.uniform_location(program, "uBlend").unwrap();
        device.use_program(Some(program));
        device.set_uniform_f32(loc, 0.5);
        assert_eq!(log.uniform_values("uBlend"), vec![UniformValue::F32(0.5)]);
    }

    #[test]
    fn test_commands_in_group() {
        let mut device = RecordingDevice::new();
        let log = device.log();
        device.push_debug_group("outer");
        device.clear(ClearFlags::COLOR);
        device.push_debug_group("inner");
        device.clear(ClearFlags::DEPTH);
        device.pop_debug_group();
        device.pop_debug_group();
        device.clear(ClearFlags::all());
        let inside = log.commands_in_group("outer");
        assert_eq!(inside.len(), 4);
        assert_eq!(log.commands_in_group("inner"), vec![DeviceCommand::Clear(ClearFlags::DEPTH)]);
    }
}
