//! [`GraphicsApi`] over a live OpenGL ES, WebGL or desktop OpenGL context.
//!
//! Shaders are GLSL ES 1.00. ES contexts (GLES 2/3, WebGL 1/2) compile them
//! as they are. Desktop contexts must offer the compatibility profile: the
//! sources are rewritten to GLSL 1.20 and shader point sizes are switched
//! on. Core desktop profiles are rejected.

use std::borrow::Cow;
use std::sync::Arc;

use glow::{HasContext, PixelUnpackData};
use rustc_hash::FxHashMap;

use crate::gpu::api::{
    ActiveVariable, AttribPointer, BlendFactor, ClearMask, ComponentType,
    FramebufferId, GpuError, GraphicsApi, Primitive, ProgramId, TextureFilter,
    TextureId, TextureUpload, UniformValue, VariableKind,
};

/// Unsized RGBA: the one internal format GLES 2 and WebGL 1 accept for
/// RGBA8 uploads. Later versions pick an 8-bit layout for it.
const RGBA_INTERNAL_FORMAT: i32 = glow::RGBA as i32;

/// `GL_POINT_SPRITE`, a compatibility-profile enable `glow` does not name.
const POINT_SPRITE: u32 = 0x8861;

const PRECISION_QUALIFIERS: [&str; 3] = ["lowp", "mediump", "highp"];

/// What the wrapped context can do, read once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ContextProfile {
    /// OpenGL ES or WebGL rather than desktop GL.
    embedded: bool,
    /// Vertex array objects exist (GL 3.0, GLES 3.0, WebGL 2).
    vertex_arrays: bool,
}

impl ContextProfile {
    fn new(major: u32, embedded: bool, core_profile: bool) -> Result<Self, GpuError> {
        if !embedded && core_profile {
            return Err(GpuError::UnsupportedContext(format!(
                "desktop GL {major}.x core profile has no GLSL 1.20; \
                 request a compatibility profile"
            )));
        }
        if major < 2 {
            return Err(GpuError::UnsupportedContext(format!(
                "GL {major}.x has no programmable pipeline"
            )));
        }
        Ok(Self {
            embedded,
            vertex_arrays: major >= 3,
        })
    }

    /// Rewrite a GLSL ES 1.00 stage for this context.
    ///
    /// Desktop GLSL 1.20 has every ES 1.00 construct the shaders use except
    /// precision qualifiers, which are dropped. Sources that already carry
    /// a `#version` line are passed through.
    fn shader_source<'a>(&self, source: &'a str) -> Cow<'a, str> {
        if self.embedded || source.trim_start().starts_with("#version") {
            return Cow::Borrowed(source);
        }
        let mut out = String::with_capacity(source.len() + 16);
        out.push_str("#version 120\n");
        for line in source.lines() {
            if line.trim_start().starts_with("precision ") {
                out.push('\n');
                continue;
            }
            let words: Vec<&str> = line
                .split(' ')
                .filter(|word| !PRECISION_QUALIFIERS.contains(word))
                .collect();
            out.push_str(&words.join(" "));
            out.push('\n');
        }
        Cow::Owned(out)
    }
}

struct LinkedProgram {
    program: glow::Program,
    attributes: Vec<ActiveVariable>,
    uniforms: Vec<ActiveVariable>,
    /// Indexed by the uniform locations handed out in `uniforms`.
    uniform_locations: Vec<glow::UniformLocation>,
}

/// Hardware device wrapping a [`glow::Context`].
///
/// Client-side attribute arrays do not exist in WebGL, so each attribute
/// location gets its own streaming VBO that
/// [`vertex_attrib_pointer`](GraphicsApi::vertex_attrib_pointer) refills.
pub struct GlowDevice {
    gl: Arc<glow::Context>,
    profile: ContextProfile,
    /// One shared vertex array, on contexts that have them.
    vao: Option<glow::VertexArray>,
    attribute_buffers: FxHashMap<u32, glow::Buffer>,
    programs: FxHashMap<u32, LinkedProgram>,
    textures: FxHashMap<u32, glow::Texture>,
    framebuffers: FxHashMap<u32, glow::Framebuffer>,
    next_handle: u32,
    current_program: Option<ProgramId>,
}

impl GlowDevice {
    /// Wrap `gl`, check its version and set up the state every pass
    /// relies on.
    ///
    /// # Safety
    ///
    /// `gl` must be current on the calling thread, and every later call on
    /// this device must happen with the same context current.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::UnsupportedContext`] for desktop core profiles
    /// and pre-2.0 contexts, or [`GpuError::BufferCreation`] if the vertex
    /// array cannot be created.
    pub unsafe fn new(gl: Arc<glow::Context>) -> Result<Self, GpuError> {
        let version = gl.version();
        let core_profile = !version.is_embedded
            && (version.major, version.minor) >= (3, 2)
            && (unsafe { gl.get_parameter_i32(glow::CONTEXT_PROFILE_MASK) }
                & glow::CONTEXT_CORE_PROFILE_BIT as i32)
                != 0;
        let profile = ContextProfile::new(version.major, version.is_embedded, core_profile)?;
        log::info!(
            "GL {}.{} ({}), {}",
            version.major,
            version.minor,
            if profile.embedded { "ES" } else { "desktop" },
            version.vendor_info
        );

        let vao = if profile.vertex_arrays {
            let vao = unsafe { gl.create_vertex_array() }.map_err(GpuError::BufferCreation)?;
            unsafe { gl.bind_vertex_array(Some(vao)) };
            Some(vao)
        } else {
            None
        };
        if !profile.embedded {
            // ES always takes point sizes from the vertex stage.
            unsafe {
                gl.enable(glow::PROGRAM_POINT_SIZE);
                gl.enable(POINT_SPRITE);
            }
        }
        Ok(Self {
            gl,
            profile,
            vao,
            attribute_buffers: FxHashMap::default(),
            programs: FxHashMap::default(),
            textures: FxHashMap::default(),
            framebuffers: FxHashMap::default(),
            next_handle: 1,
            current_program: None,
        })
    }

    /// The wrapped context.
    pub fn context(&self) -> &Arc<glow::Context> {
        &self.gl
    }

    fn allocate_handle(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn compile_stage(
        &self,
        label: &str,
        stage: u32,
        source: &str,
    ) -> Result<glow::Shader, GpuError> {
        let gl = &self.gl;
        let compile_error = |log: String| GpuError::ShaderCompile {
            label: label.to_owned(),
            log,
        };
        let source = self.profile.shader_source(source);
        unsafe {
            let shader = gl.create_shader(stage).map_err(compile_error)?;
            gl.shader_source(shader, &source);
            gl.compile_shader(shader);
            if !gl.get_shader_compile_status(shader) {
                let log = gl.get_shader_info_log(shader);
                gl.delete_shader(shader);
                return Err(compile_error(log));
            }
            Ok(shader)
        }
    }

    fn reflect(&self, program: glow::Program) -> LinkedProgram {
        let gl = &self.gl;
        let mut attributes = Vec::new();
        let mut uniforms = Vec::new();
        let mut uniform_locations = Vec::new();
        unsafe {
            for index in 0..gl.get_active_attributes(program) {
                let Some(active) = gl.get_active_attribute(program, index) else {
                    continue;
                };
                let Some(location) = gl.get_attrib_location(program, &active.name)
                else {
                    continue;
                };
                attributes.push(ActiveVariable {
                    name: active.name,
                    location,
                    kind: kind_from_gl(active.atype),
                });
            }
            for index in 0..gl.get_active_uniforms(program) {
                let Some(active) = gl.get_active_uniform(program, index) else {
                    continue;
                };
                let name = active
                    .name
                    .split('[')
                    .next()
                    .unwrap_or_default()
                    .to_owned();
                let Some(location) = gl.get_uniform_location(program, &active.name)
                else {
                    continue;
                };
                uniforms.push(ActiveVariable {
                    name,
                    location: uniform_locations.len() as u32,
                    kind: kind_from_gl(active.utype),
                });
                uniform_locations.push(location);
            }
        }
        LinkedProgram {
            program,
            attributes,
            uniforms,
            uniform_locations,
        }
    }
}

fn kind_from_gl(ty: u32) -> VariableKind {
    match ty {
        glow::FLOAT => VariableKind::Float,
        glow::FLOAT_VEC2 => VariableKind::Vec2,
        glow::FLOAT_VEC3 => VariableKind::Vec3,
        glow::FLOAT_VEC4 => VariableKind::Vec4,
        glow::FLOAT_MAT4 => VariableKind::Mat4,
        glow::INT => VariableKind::Int,
        glow::SAMPLER_2D => VariableKind::Sampler2D,
        _ => VariableKind::Other,
    }
}

fn blend_to_gl(factor: BlendFactor) -> u32 {
    match factor {
        BlendFactor::Zero => glow::ZERO,
        BlendFactor::One => glow::ONE,
        BlendFactor::SrcAlpha => glow::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => glow::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => glow::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => glow::ONE_MINUS_DST_ALPHA,
    }
}

fn component_to_gl(ty: ComponentType) -> u32 {
    match ty {
        ComponentType::Byte => glow::BYTE,
        ComponentType::UnsignedByte => glow::UNSIGNED_BYTE,
        ComponentType::Short => glow::SHORT,
        ComponentType::UnsignedShort => glow::UNSIGNED_SHORT,
        ComponentType::Float => glow::FLOAT,
    }
}

fn primitive_to_gl(primitive: Primitive) -> u32 {
    match primitive {
        Primitive::Points => glow::POINTS,
        Primitive::Lines => glow::LINES,
        Primitive::Triangles => glow::TRIANGLES,
        Primitive::TriangleStrip => glow::TRIANGLE_STRIP,
        Primitive::TriangleFan => glow::TRIANGLE_FAN,
    }
}

fn gl_int(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

impl GraphicsApi for GlowDevice {
    fn create_program(
        &mut self,
        label: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<ProgramId, GpuError> {
        let vertex = self.compile_stage(label, glow::VERTEX_SHADER, vertex_source)?;
        let fragment =
            match self.compile_stage(label, glow::FRAGMENT_SHADER, fragment_source) {
                Ok(shader) => shader,
                Err(e) => {
                    unsafe { self.gl.delete_shader(vertex) };
                    return Err(e);
                }
            };

        let gl = &self.gl;
        let link_error = |log: String| GpuError::ProgramLink {
            label: label.to_owned(),
            log,
        };
        let program = unsafe {
            let program = gl.create_program().map_err(link_error)?;
            gl.attach_shader(program, vertex);
            gl.attach_shader(program, fragment);
            gl.link_program(program);
            gl.detach_shader(program, vertex);
            gl.detach_shader(program, fragment);
            gl.delete_shader(vertex);
            gl.delete_shader(fragment);
            if !gl.get_program_link_status(program) {
                let log = gl.get_program_info_log(program);
                gl.delete_program(program);
                return Err(link_error(log));
            }
            program
        };

        let linked = self.reflect(program);
        let handle = self.allocate_handle();
        let _ = self.programs.insert(handle, linked);
        Ok(ProgramId(handle))
    }

    fn delete_program(&mut self, program: ProgramId) {
        if let Some(linked) = self.programs.remove(&program.0) {
            unsafe { self.gl.delete_program(linked.program) };
        }
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn active_attributes(&self, program: ProgramId) -> Vec<ActiveVariable> {
        self.programs
            .get(&program.0)
            .map(|p| p.attributes.clone())
            .unwrap_or_default()
    }

    fn active_uniforms(&self, program: ProgramId) -> Vec<ActiveVariable> {
        self.programs
            .get(&program.0)
            .map(|p| p.uniforms.clone())
            .unwrap_or_default()
    }

    fn current_program(&self) -> Option<ProgramId> {
        self.current_program
    }

    fn use_program(&mut self, program: ProgramId) {
        let Some(linked) = self.programs.get(&program.0) else {
            log::warn!("use_program on unknown program {program:?}");
            return;
        };
        unsafe { self.gl.use_program(Some(linked.program)) };
        self.current_program = Some(program);
    }

    fn create_texture(&mut self) -> Result<TextureId, GpuError> {
        let texture =
            unsafe { self.gl.create_texture() }.map_err(GpuError::TextureCreation)?;
        let handle = self.allocate_handle();
        let _ = self.textures.insert(handle, texture);
        Ok(TextureId(handle))
    }

    fn upload_texture(&mut self, texture: TextureId, upload: &TextureUpload<'_>) {
        let Some(&native) = self.textures.get(&texture.0) else {
            log::warn!("upload to unknown texture {texture:?}");
            return;
        };
        let filter = match upload.filter {
            TextureFilter::Nearest => glow::NEAREST,
            TextureFilter::Linear => glow::LINEAR,
        } as i32;
        let gl = &self.gl;
        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, Some(native));
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                RGBA_INTERNAL_FORMAT,
                upload.width as i32,
                upload.height as i32,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                PixelUnpackData::Slice(upload.pixels),
            );
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, filter);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, filter);
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_S,
                glow::CLAMP_TO_EDGE as i32,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_T,
                glow::CLAMP_TO_EDGE as i32,
            );
            gl.bind_texture(glow::TEXTURE_2D, None);
        }
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if let Some(native) = self.textures.remove(&texture.0) {
            unsafe { self.gl.delete_texture(native) };
        }
    }

    fn create_framebuffer(
        &mut self,
        color: TextureId,
    ) -> Result<FramebufferId, GpuError> {
        let native_texture = self.textures.get(&color.0).copied();
        let gl = &self.gl;
        let framebuffer = unsafe {
            let framebuffer = gl
                .create_framebuffer()
                .map_err(GpuError::FramebufferCreation)?;
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
            gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                native_texture,
                0,
            );
            let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            if status != glow::FRAMEBUFFER_COMPLETE {
                gl.delete_framebuffer(framebuffer);
                return Err(GpuError::IncompleteFramebuffer(status));
            }
            framebuffer
        };
        let handle = self.allocate_handle();
        let _ = self.framebuffers.insert(handle, framebuffer);
        Ok(FramebufferId(handle))
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        if let Some(native) = self.framebuffers.remove(&framebuffer.0) {
            unsafe { self.gl.delete_framebuffer(native) };
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        let native = framebuffer.and_then(|fb| self.framebuffers.get(&fb.0).copied());
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, native) };
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.viewport(x, y, width, height) };
    }

    fn clear_color(&mut self, rgba: [f32; 4]) {
        let [r, g, b, a] = rgba;
        unsafe { self.gl.clear_color(r, g, b, a) };
    }

    fn clear(&mut self, mask: ClearMask) {
        let mut bits = 0;
        if mask.contains(ClearMask::COLOR) {
            bits |= glow::COLOR_BUFFER_BIT;
        }
        if mask.contains(ClearMask::DEPTH) {
            bits |= glow::DEPTH_BUFFER_BIT;
        }
        if bits != 0 {
            unsafe { self.gl.clear(bits) };
        }
    }

    fn enable_blend(&mut self) {
        unsafe { self.gl.enable(glow::BLEND) };
    }

    fn disable_blend(&mut self) {
        unsafe { self.gl.disable(glow::BLEND) };
    }

    fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor) {
        unsafe { self.gl.blend_func(blend_to_gl(src), blend_to_gl(dst)) };
    }

    fn enable_vertex_attrib_array(&mut self, location: u32) {
        unsafe { self.gl.enable_vertex_attrib_array(location) };
    }

    fn disable_vertex_attrib_array(&mut self, location: u32) {
        unsafe { self.gl.disable_vertex_attrib_array(location) };
    }

    fn vertex_attrib_pointer(&mut self, pointer: &AttribPointer<'_>) {
        let buffer = match self.attribute_buffers.get(&pointer.location) {
            Some(&buffer) => buffer,
            None => match unsafe { self.gl.create_buffer() } {
                Ok(buffer) => {
                    let _ = self.attribute_buffers.insert(pointer.location, buffer);
                    buffer
                }
                Err(e) => {
                    log::error!(
                        "could not allocate vertex buffer for attribute {}: {e}",
                        pointer.location
                    );
                    return;
                }
            },
        };
        let gl = &self.gl;
        unsafe {
            if self.vao.is_some() {
                gl.bind_vertex_array(self.vao);
            }
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
            gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, pointer.data, glow::STREAM_DRAW);
            gl.vertex_attrib_pointer_f32(
                pointer.location,
                i32::from(pointer.components),
                component_to_gl(pointer.component_type),
                pointer.normalized,
                gl_int(pointer.effective_stride()),
                0,
            );
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
        }
    }

    fn active_texture(&mut self, unit: u32) {
        unsafe { self.gl.active_texture(glow::TEXTURE0 + unit) };
    }

    fn bind_texture(&mut self, texture: Option<TextureId>) {
        let native = texture.and_then(|t| self.textures.get(&t.0).copied());
        unsafe { self.gl.bind_texture(glow::TEXTURE_2D, native) };
    }

    fn set_uniform(&mut self, location: u32, value: UniformValue) {
        let Some(linked) = self
            .current_program
            .and_then(|p| self.programs.get(&p.0))
        else {
            log::warn!("set_uniform without a current program");
            return;
        };
        let Some(native) = linked.uniform_locations.get(location as usize) else {
            return;
        };
        let gl = &self.gl;
        unsafe {
            match value {
                UniformValue::Int(v) => gl.uniform_1_i32(Some(native), v),
                UniformValue::Float(v) => gl.uniform_1_f32(Some(native), v),
                UniformValue::Vec3([x, y, z]) => gl.uniform_3_f32(Some(native), x, y, z),
                UniformValue::Vec4([x, y, z, w]) => {
                    gl.uniform_4_f32(Some(native), x, y, z, w);
                }
                UniformValue::Mat4(m) => {
                    gl.uniform_matrix_4_f32_slice(Some(native), false, &m);
                }
            }
        }
    }

    fn draw_arrays(&mut self, primitive: Primitive, first: usize, count: usize) {
        unsafe {
            if self.vao.is_some() {
                self.gl.bind_vertex_array(self.vao);
            }
            self.gl
                .draw_arrays(primitive_to_gl(primitive), gl_int(first), gl_int(count));
        }
    }

    fn flush(&mut self) {
        unsafe { self.gl.flush() };
    }
}

impl Drop for GlowDevice {
    fn drop(&mut self) {
        let gl = &self.gl;
        unsafe {
            for (_, linked) in self.programs.drain() {
                gl.delete_program(linked.program);
            }
            for (_, texture) in self.textures.drain() {
                gl.delete_texture(texture);
            }
            for (_, framebuffer) in self.framebuffers.drain() {
                gl.delete_framebuffer(framebuffer);
            }
            for (_, buffer) in self.attribute_buffers.drain() {
                gl.delete_buffer(buffer);
            }
            if let Some(vao) = self.vao {
                gl.delete_vertex_array(vao);
            }
        }
    }
}
