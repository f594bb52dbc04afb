//! Graphics device trait and the handle/enum vocabulary shared by all backends

use bitflags::bitflags;

use crate::foundation::math::Rect;
use crate::render::RenderError;

/// Result type for device operations
pub type DeviceResult<T> = Result<T, RenderError>;

/// Handle to a linked GPU program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u32);

/// Handle to a compiled shader stage object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderObjectId(pub u32);

/// Handle to a texture; `TextureId::NONE` (0) means "unset"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct TextureId(pub u32);

impl TextureId {
    /// The unset texture
    pub const NONE: Self = Self(0);

    /// True when this handle refers to a real texture
    pub fn is_set(self) -> bool {
        self.0 != 0
    }

    /// This texture, or `fallback` when unset
    pub fn or(self, fallback: Self) -> Self {
        if self.is_set() { self } else { fallback }
    }
}

/// Handle to a framebuffer object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub u32);

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

/// Handle to a vertex array object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexArrayId(pub u32);

/// Location of a uniform inside a linked program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// Programmable pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex stage
    Vertex,
    /// Fragment stage
    Fragment,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vertex => write!(f, "vertex"),
            Self::Fragment => write!(f, "fragment"),
        }
    }
}

/// Uniform type as reported by program reflection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    /// `float`
    Float,
    /// `vec2`
    Vec2,
    /// `vec3`
    Vec3,
    /// `vec4`
    Vec4,
    /// `int`
    Int,
    /// `bool`
    Bool,
    /// `mat3`
    Mat3,
    /// `mat4`
    Mat4,
    /// `sampler1D`
    Sampler1D,
    /// `sampler2D`
    Sampler2D,
    /// `samplerCube`
    SamplerCube,
    /// Anything else, carrying the raw GL enum
    Other(u32),
}

/// One entry of a program's active uniform list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveUniform {
    /// Reported name; arrays report `name[0]`
    pub name: String,
    /// Array size, 1 for scalars
    pub size: i32,
    /// Reported type
    pub kind: UniformKind,
}

/// Texture binding target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureTarget {
    /// `GL_TEXTURE_1D`
    Texture1D,
    /// `GL_TEXTURE_2D`
    Texture2D,
    /// `GL_TEXTURE_CUBE_MAP`
    Cube,
    /// One face of a cube map, 0..6 in +X, -X, +Y, -Y, +Z, -Z order
    CubeFace(u8),
}

/// Internal storage formats used by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit single channel
    R8,
    /// 8-bit RGB
    Rgb8,
    /// 8-bit RGBA
    Rgba8,
    /// Half float single channel
    R16F,
    /// Half float two channels
    Rg16F,
    /// Half float RGB
    Rgb16F,
    /// Half float RGBA
    Rgba16F,
    /// Full float RGBA, used for bone matrices
    Rgba32F,
    /// 24-bit depth
    Depth24,
}

impl TextureFormat {
    /// Bytes per texel of upload data; float formats are uploaded as `f32`
    pub fn bytes_per_texel(self) -> usize {
        match self {
            Self::R8 => 1,
            Self::Rgb8 => 3,
            Self::Rgba8 | Self::R16F | Self::Depth24 => 4,
            Self::Rg16F => 8,
            Self::Rgb16F => 12,
            Self::Rgba16F | Self::Rgba32F => 16,
        }
    }

    /// True for depth formats
    pub fn is_depth(self) -> bool {
        matches!(self, Self::Depth24)
    }
}

/// Minification/magnification filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    /// Nearest texel
    Nearest,
    /// Bilinear
    Linear,
    /// Trilinear, requires mipmaps
    LinearMipmapLinear,
}

/// Coordinate wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureWrap {
    /// Repeat
    Repeat,
    /// Clamp to the edge texel
    ClampToEdge,
}

/// Everything needed to allocate a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    /// 1D, 2D or cube
    pub target: TextureTarget,
    /// Width in texels
    pub width: u32,
    /// Height in texels, ignored for 1D
    pub height: u32,
    /// Storage format
    pub format: TextureFormat,
    /// Filter used for both minification and magnification (mip filter applies to min only)
    pub filter: TextureFilter,
    /// Wrap mode on all axes
    pub wrap: TextureWrap,
    /// Allocate the full mip chain
    pub mipmaps: bool,
}

impl TextureDesc {
    /// Clamped, linearly filtered 2D texture without mips
    pub fn texture_2d(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            target: TextureTarget::Texture2D,
            width,
            height,
            format,
            filter: TextureFilter::Linear,
            wrap: TextureWrap::ClampToEdge,
            mipmaps: false,
        }
    }

    /// Square cube map
    pub fn cube(size: u32, format: TextureFormat) -> Self {
        Self {
            target: TextureTarget::Cube,
            ..Self::texture_2d(size, size, format)
        }
    }

    /// Set the filter
    pub fn with_filter(mut self, filter: TextureFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Set the wrap mode
    pub fn with_wrap(mut self, wrap: TextureWrap) -> Self {
        self.wrap = wrap;
        self
    }

    /// Allocate a mip chain and sample it trilinearly
    pub fn with_mipmaps(mut self) -> Self {
        self.mipmaps = true;
        self.filter = TextureFilter::LinearMipmapLinear;
        self
    }
}

/// Framebuffer attachment point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attachment {
    /// `GL_COLOR_ATTACHMENTi`
    Color(u32),
    /// `GL_DEPTH_ATTACHMENT`
    Depth,
}

/// Toggleable fixed-function state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Depth testing
    DepthTest,
    /// Color blending
    Blend,
    /// Face culling
    CullFace,
    /// Scissor rectangle
    ScissorTest,
}

/// Depth comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthFunc {
    /// `GL_LESS`
    Less,
    /// `GL_LEQUAL`
    LessEqual,
    /// `GL_GREATER`
    Greater,
    /// `GL_ALWAYS`
    Always,
}

/// Blend factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    /// 0
    Zero,
    /// 1
    One,
    /// Source alpha
    SrcAlpha,
    /// 1 - source alpha
    OneMinusSrcAlpha,
    /// Destination color
    DstColor,
}

/// Blend equation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendEquation {
    /// src + dst
    Add,
}

/// Face selected for culling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Face {
    /// Back faces
    Back,
    /// Front faces
    Front,
}

bitflags! {
    /// Buffers affected by a clear
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        /// Color attachments
        const COLOR = 1 << 0;
        /// Depth attachment
        const DEPTH = 1 << 1;
    }
}

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveMode {
    /// Triangle list
    Triangles,
    /// Triangle strip
    TriangleStrip,
    /// Line list
    Lines,
    /// Points
    Points,
}

/// Buffer binding target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Vertex attributes
    Array,
    /// Indices
    ElementArray,
    /// Uniform block storage
    Uniform,
}

/// Upload frequency hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Written once
    Static,
    /// Rewritten often
    Dynamic,
    /// Rewritten every draw
    Stream,
}

/// Component type of a vertex attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttribKind {
    /// 32-bit floats
    Float,
    /// Unsigned bytes normalized to [0, 1]
    UnsignedByteNormalized,
    /// Integers fed to `ivec` inputs
    Int,
}

/// Layout of one vertex attribute inside the currently bound array buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttrib {
    /// Shader input location
    pub location: u32,
    /// Component count (1..=4)
    pub components: i32,
    /// Component type
    pub kind: AttribKind,
    /// Byte stride between consecutive elements
    pub stride: i32,
    /// Byte offset of the first element
    pub offset: i32,
    /// 0 for per-vertex data, 1 for per-instance data
    pub divisor: u32,
}

/// Blit interpolation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlitFilter {
    /// Nearest texel
    Nearest,
    /// Bilinear
    Linear,
}

/// Main graphics device trait
///
/// A deliberately thin mirror of the GL 3.3 core calls the pipeline issues.
/// Implementations must not cache or reorder state: the renderer relies on
/// calls taking effect in submission order.
pub trait RenderDevice {
    /// Human-readable backend name for logs
    fn backend_name(&self) -> &'static str;

    // === Shaders and programs ===

    /// Compile one stage; on failure the object is deleted and the info log returned
    fn create_shader(&mut self, stage: ShaderStage, source: &str) -> DeviceResult<ShaderObjectId>;

    /// Delete a compiled stage
    fn delete_shader(&mut self, shader: ShaderObjectId);

    /// Link two stages; on failure the program is deleted and the info log returned
    fn link_program(&mut self, vertex: ShaderObjectId, fragment: ShaderObjectId) -> DeviceResult<ProgramId>;

    /// Delete a program
    fn delete_program(&mut self, program: ProgramId);

    /// Active uniforms of a linked program, in reflection order
    fn active_uniforms(&self, program: ProgramId) -> Vec<ActiveUniform>;

    /// Location of a named uniform, `None` when inactive or absent
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;

    /// Index of a named uniform block
    fn uniform_block_index(&self, program: ProgramId, name: &str) -> Option<u32>;

    /// Bind a uniform block to a buffer binding point
    fn uniform_block_binding(&mut self, program: ProgramId, block_index: u32, binding: u32);

    /// Make a program current; `None` unbinds
    fn use_program(&mut self, program: Option<ProgramId>);

    /// Set an `int`/`bool`/sampler uniform of the current program
    fn set_uniform_i32(&mut self, location: UniformLocation, value: i32);

    /// Set a `float` uniform of the current program
    fn set_uniform_f32(&mut self, location: UniformLocation, value: f32);

    /// Set a `vec2` uniform of the current program
    fn set_uniform_vec2(&mut self, location: UniformLocation, value: [f32; 2]);

    /// Set a `vec3` uniform of the current program
    fn set_uniform_vec3(&mut self, location: UniformLocation, value: [f32; 3]);

    /// Set a `vec4` uniform of the current program
    fn set_uniform_vec4(&mut self, location: UniformLocation, value: [f32; 4]);

    /// Set a column-major `mat4` uniform of the current program
    fn set_uniform_mat4(&mut self, location: UniformLocation, value: &[f32; 16]);

    // === Textures ===

    /// Allocate a texture, optionally uploading level 0 (2D and 1D only)
    fn create_texture(&mut self, desc: &TextureDesc, data: Option<&[u8]>) -> DeviceResult<TextureId>;

    /// Replace the texels of a 1D or 2D texture's level 0
    fn update_texture(&mut self, texture: TextureId, desc: &TextureDesc, data: &[u8]);

    /// Delete a texture
    fn delete_texture(&mut self, texture: TextureId);

    /// Regenerate the mip chain from level 0
    fn generate_mipmap(&mut self, target: TextureTarget, texture: TextureId);

    /// Select the active texture unit
    fn active_texture(&mut self, slot: u32);

    /// Bind a texture to the active unit; `None` unbinds
    fn bind_texture(&mut self, target: TextureTarget, texture: Option<TextureId>);

    // === Framebuffers ===

    /// Allocate an empty framebuffer
    fn create_framebuffer(&mut self) -> DeviceResult<FramebufferId>;

    /// Delete a framebuffer
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);

    /// Bind for drawing and reading; `None` is the default framebuffer
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);

    /// Attach a texture level (or cube face) to the bound framebuffer
    fn framebuffer_texture(&mut self, attachment: Attachment, target: TextureTarget, texture: Option<TextureId>, level: i32);

    /// Enable color attachments `0..count` for drawing; 0 disables color output
    fn draw_buffers(&mut self, count: u32);

    /// Completeness check of the bound framebuffer
    fn framebuffer_complete(&self) -> bool;

    /// Copy a region between framebuffers
    fn blit_framebuffer(
        &mut self,
        source: Option<FramebufferId>,
        destination: Option<FramebufferId>,
        source_rect: Rect,
        destination_rect: Rect,
        mask: ClearFlags,
        filter: BlitFilter,
    );

    // === Buffers and vertex arrays ===

    /// Allocate a buffer
    fn create_buffer(&mut self) -> DeviceResult<BufferId>;

    /// Delete a buffer
    fn delete_buffer(&mut self, buffer: BufferId);

    /// Bind a buffer; `None` unbinds
    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferId>);

    /// Bind then (re)allocate and fill a buffer
    fn buffer_data(&mut self, target: BufferTarget, buffer: BufferId, data: &[u8], usage: BufferUsage);

    /// Bind then overwrite part of a buffer
    fn buffer_sub_data(&mut self, target: BufferTarget, buffer: BufferId, offset: i32, data: &[u8]);

    /// Bind a uniform buffer to an indexed binding point
    fn bind_uniform_buffer_base(&mut self, binding: u32, buffer: BufferId);

    /// Allocate a vertex array
    fn create_vertex_array(&mut self) -> DeviceResult<VertexArrayId>;

    /// Delete a vertex array
    fn delete_vertex_array(&mut self, vertex_array: VertexArrayId);

    /// Bind a vertex array; `None` unbinds
    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>);

    /// Enable and describe an attribute sourced from the bound array buffer
    fn vertex_attrib(&mut self, attrib: &VertexAttrib);

    /// Disable an attribute array
    fn disable_vertex_attrib(&mut self, location: u32);

    /// Constant value used by a disabled attribute
    fn vertex_attrib_constant(&mut self, location: u32, value: [f32; 4]);

    // === Drawing ===

    /// Non-indexed draw
    fn draw_arrays(&mut self, mode: PrimitiveMode, first: i32, count: i32);

    /// Indexed draw with `u32` indices from the bound element buffer
    fn draw_elements(&mut self, mode: PrimitiveMode, count: i32);

    /// Instanced non-indexed draw
    fn draw_arrays_instanced(&mut self, mode: PrimitiveMode, first: i32, count: i32, instances: i32);

    /// Instanced indexed draw
    fn draw_elements_instanced(&mut self, mode: PrimitiveMode, count: i32, instances: i32);

    // === Fixed-function state ===

    /// Set the viewport
    fn viewport(&mut self, rect: Rect);

    /// Set the scissor rectangle
    fn scissor(&mut self, rect: Rect);

    /// Enable or disable a capability
    fn set_capability(&mut self, capability: Capability, enabled: bool);

    /// Depth comparison
    fn depth_func(&mut self, func: DepthFunc);

    /// Depth writes
    fn depth_mask(&mut self, write: bool);

    /// Blend factors
    fn blend_func(&mut self, source: BlendFactor, destination: BlendFactor);

    /// Blend equation
    fn blend_equation(&mut self, equation: BlendEquation);

    /// Faces culled when culling is enabled
    fn cull_face(&mut self, face: Face);

    /// Color used by color clears
    fn clear_color(&mut self, color: [f32; 4]);

    /// Clear buffers of the bound framebuffer
    fn clear(&mut self, flags: ClearFlags);

    // === Debugging ===

    /// Open a named region in GPU debuggers and the recording log
    fn push_debug_group(&mut self, label: &str);

    /// Close the innermost named region
    fn pop_debug_group(&mut self);
}

/// Convenience helpers layered over the raw trait
pub trait RenderDeviceExt: RenderDevice {
    /// Bind a texture to a specific unit
    fn bind_texture_unit(&mut self, slot: u32, target: TextureTarget, texture: Option<TextureId>) {
        self.active_texture(slot);
        self.bind_texture(target, texture);
    }

    /// Enable a capability
    fn enable(&mut self, capability: Capability) {
        self.set_capability(capability, true);
    }

    /// Disable a capability
    fn disable(&mut self, capability: Capability) {
        self.set_capability(capability, false);
    }
}

impl<D: RenderDevice + ?Sized> RenderDeviceExt for D {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_fallback() {
        let white = TextureId(7);
        assert_eq!(TextureId::NONE.or(white), white);
        assert_eq!(TextureId(3).or(white), TextureId(3));
        assert!(!TextureId::default().is_set());
    }

    #[test]
    fn test_mipmapped_desc_uses_trilinear_filter() {
        let desc = TextureDesc::texture_2d(64, 32, TextureFormat::Rgb16F).with_mipmaps();
        assert!(desc.mipmaps);
        assert_eq!(desc.filter, TextureFilter::LinearMipmapLinear);
    }
}
