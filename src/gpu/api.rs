//! The GPU boundary: the OpenGL ES 2 subset the pipeline drives.
//!
//! Every pass in the renderer talks to the GPU through [`GraphicsApi`]. Two
//! devices implement it: [`GlowDevice`](super::glow_device::GlowDevice) over a
//! live GL context, and [`SoftwareDevice`](super::software::SoftwareDevice),
//! a CPU reference device used for headless runs and tests.

use std::fmt;

/// Handle of a linked shader program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub(crate) u32);

/// Handle of a 2D texture object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub(crate) u32);

/// Handle of a framebuffer object. The default (on-screen) framebuffer has
/// no handle and is addressed with `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub(crate) u32);

/// Errors raised while creating GPU resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    /// A shader stage failed to compile.
    ShaderCompile {
        /// Program label the stage belongs to.
        label: String,
        /// Driver info log.
        log: String,
    },
    /// Vertex and fragment stages failed to link.
    ProgramLink {
        /// Program label.
        label: String,
        /// Driver info log.
        log: String,
    },
    /// The driver refused to allocate a texture.
    TextureCreation(String),
    /// The driver refused to allocate a framebuffer.
    FramebufferCreation(String),
    /// A framebuffer was created but is not complete.
    IncompleteFramebuffer(u32),
    /// The driver refused to allocate a vertex array or buffer object.
    BufferCreation(String),
    /// The context cannot run GLSL ES 1.00 sources.
    UnsupportedContext(String),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShaderCompile { label, log } => {
                write!(f, "could not compile shader for {label}: {log}")
            }
            Self::ProgramLink { label, log } => {
                write!(f, "could not link program {label}: {log}")
            }
            Self::TextureCreation(msg) => {
                write!(f, "texture creation failed: {msg}")
            }
            Self::FramebufferCreation(msg) => {
                write!(f, "framebuffer creation failed: {msg}")
            }
            Self::IncompleteFramebuffer(status) => {
                write!(f, "framebuffer incomplete (status {status:#x})")
            }
            Self::BufferCreation(msg) => {
                write!(f, "buffer creation failed: {msg}")
            }
            Self::UnsupportedContext(msg) => {
                write!(f, "unsupported GL context: {msg}")
            }
        }
    }
}

impl std::error::Error for GpuError {}

/// Declared GLSL type of an attribute or uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    /// `float`
    Float,
    /// `vec2`
    Vec2,
    /// `vec3`
    Vec3,
    /// `vec4`
    Vec4,
    /// `mat4`
    Mat4,
    /// `int`
    Int,
    /// `sampler2D`
    Sampler2D,
    /// Anything the pipeline does not use directly.
    Other,
}

impl VariableKind {
    /// Parse a GLSL type keyword.
    pub fn from_glsl(keyword: &str) -> Self {
        match keyword {
            "float" => Self::Float,
            "vec2" => Self::Vec2,
            "vec3" => Self::Vec3,
            "vec4" => Self::Vec4,
            "mat4" => Self::Mat4,
            "int" => Self::Int,
            "sampler2D" => Self::Sampler2D,
            _ => Self::Other,
        }
    }
}

/// One active attribute or uniform of a linked program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveVariable {
    /// Name as declared in the shader source.
    pub name: String,
    /// Resolved location.
    pub location: u32,
    /// Declared type.
    pub kind: VariableKind,
}

/// Component type of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    /// Signed 8-bit integer.
    Byte,
    /// Unsigned 8-bit integer.
    UnsignedByte,
    /// Signed 16-bit integer.
    Short,
    /// Unsigned 16-bit integer.
    UnsignedShort,
    /// 32-bit float.
    Float,
}

impl ComponentType {
    /// Size of one component in bytes.
    pub const fn size_bytes(self) -> usize {
        match self {
            Self::Byte | Self::UnsignedByte => 1,
            Self::Short | Self::UnsignedShort => 2,
            Self::Float => 4,
        }
    }
}

/// Primitive assembly mode for [`GraphicsApi::draw_arrays`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    /// One point sprite per vertex.
    Points,
    /// Independent line segments.
    Lines,
    /// Independent triangles.
    Triangles,
    /// Triangle strip.
    TriangleStrip,
    /// Triangle fan around the first vertex.
    TriangleFan,
}

/// Blend equation factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    /// `GL_ZERO`
    Zero,
    /// `GL_ONE`
    One,
    /// `GL_SRC_ALPHA`
    SrcAlpha,
    /// `GL_ONE_MINUS_SRC_ALPHA`
    OneMinusSrcAlpha,
    /// `GL_DST_ALPHA`
    DstAlpha,
    /// `GL_ONE_MINUS_DST_ALPHA`
    OneMinusDstAlpha,
}

bitflags::bitflags! {
    /// Buffers affected by [`GraphicsApi::clear`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ClearMask: u32 {
        /// Clear nothing.
        const NONE = 0;
        /// Clear the color attachment.
        const COLOR = 1 << 0;
        /// Clear the depth attachment.
        const DEPTH = 1 << 1;
    }
}

/// Texture minification/magnification filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFilter {
    /// Nearest texel.
    Nearest,
    /// Bilinear.
    Linear,
}

/// Texel storage for one texture upload. Always RGBA8, clamp-to-edge.
#[derive(Debug, Clone, Copy)]
pub struct TextureUpload<'a> {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Tightly packed RGBA8 rows; row 0 is sampled at `v = 0`. `None` allocates
    /// storage without initializing it (render targets).
    pub pixels: Option<&'a [u8]>,
    /// Sampling filter.
    pub filter: TextureFilter,
}

/// A client-side vertex attribute array, as handed to
/// `glVertexAttribPointer`.
///
/// `data` starts at the first element the draw call addresses with index 0;
/// devices copy what they need before returning.
#[derive(Debug, Clone, Copy)]
pub struct AttribPointer<'a> {
    /// Attribute location.
    pub location: u32,
    /// Components per vertex (1-4).
    pub components: u8,
    /// Component type.
    pub component_type: ComponentType,
    /// Map integer components to `[0, 1]` / `[-1, 1]`.
    pub normalized: bool,
    /// Byte distance between consecutive vertices; 0 means tightly packed.
    pub stride: usize,
    /// Backing bytes.
    pub data: &'a [u8],
}

impl AttribPointer<'_> {
    /// Effective stride in bytes.
    pub fn effective_stride(&self) -> usize {
        if self.stride == 0 {
            usize::from(self.components) * self.component_type.size_bytes()
        } else {
            self.stride
        }
    }
}

/// A uniform value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    /// `int` / `sampler2D` unit index.
    Int(i32),
    /// `float`
    Float(f32),
    /// `vec3`
    Vec3([f32; 3]),
    /// `vec4`
    Vec4([f32; 4]),
    /// Column-major `mat4`.
    Mat4([f32; 16]),
}

/// The GL-ES-equivalent command surface the pipeline needs.
///
/// All calls are confined to the render thread. Methods mirror their GL
/// counterparts: state set here stays set until changed, so every caller is
/// responsible for restoring what it touched.
pub trait GraphicsApi {
    /// Compile and link a program from GLSL sources.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::ShaderCompile`] or [`GpuError::ProgramLink`] with
    /// the driver log.
    fn create_program(
        &mut self,
        label: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<ProgramId, GpuError>;

    /// Delete a program.
    fn delete_program(&mut self, program: ProgramId);

    /// Active vertex attributes of a linked program.
    fn active_attributes(&self, program: ProgramId) -> Vec<ActiveVariable>;

    /// Active uniforms of a linked program.
    fn active_uniforms(&self, program: ProgramId) -> Vec<ActiveVariable>;

    /// The program currently in use, if any.
    fn current_program(&self) -> Option<ProgramId>;

    /// Make `program` current.
    fn use_program(&mut self, program: ProgramId);

    /// Allocate a texture object with no storage.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::TextureCreation`] when the driver refuses.
    fn create_texture(&mut self) -> Result<TextureId, GpuError>;

    /// Define the storage and filter of `texture`. Leaves the texture
    /// binding of the active unit unbound.
    fn upload_texture(&mut self, texture: TextureId, upload: &TextureUpload<'_>);

    /// Delete a texture.
    fn delete_texture(&mut self, texture: TextureId);

    /// Create a framebuffer with `color` as its color attachment. Leaves
    /// the default framebuffer bound.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::FramebufferCreation`] or
    /// [`GpuError::IncompleteFramebuffer`].
    fn create_framebuffer(
        &mut self,
        color: TextureId,
    ) -> Result<FramebufferId, GpuError>;

    /// Delete a framebuffer.
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);

    /// Bind a framebuffer; `None` binds the default framebuffer.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);

    /// Set the viewport rectangle.
    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32);

    /// Set the clear color.
    fn clear_color(&mut self, rgba: [f32; 4]);

    /// Clear the selected buffers of the bound framebuffer.
    fn clear(&mut self, mask: ClearMask);

    /// Enable blending.
    fn enable_blend(&mut self);

    /// Disable blending.
    fn disable_blend(&mut self);

    /// Set blend factors.
    fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor);

    /// Enable a vertex attribute array.
    fn enable_vertex_attrib_array(&mut self, location: u32);

    /// Disable a vertex attribute array.
    fn disable_vertex_attrib_array(&mut self, location: u32);

    /// Point an attribute at client-side data.
    fn vertex_attrib_pointer(&mut self, pointer: &AttribPointer<'_>);

    /// Select the texture unit subsequent [`bind_texture`] calls affect.
    ///
    /// [`bind_texture`]: GraphicsApi::bind_texture
    fn active_texture(&mut self, unit: u32);

    /// Bind a texture to the active unit; `None` unbinds.
    fn bind_texture(&mut self, texture: Option<TextureId>);

    /// Set a uniform of the current program.
    fn set_uniform(&mut self, location: u32, value: UniformValue);

    /// Issue a non-indexed draw.
    fn draw_arrays(&mut self, primitive: Primitive, first: usize, count: usize);

    /// Flush the command stream.
    fn flush(&mut self);
}
