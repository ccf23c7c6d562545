//! Two-pass separable blur through a fixed-size intermediate surface.

use std::rc::Rc;

use crate::gpu::material::AttributeFormat;
use crate::gpu::{
    ClearMask, GpuProgram, GraphicsApi, Material, OffscreenSurface, Primitive,
    ProgramCache, ShaderKind, Texture, UniformValue, VertexBuffer,
};
use crate::gpu::vertex::{QUAD_STRIDE, QUAD_UV_OFFSET, QUAD_VERTICES};

const BLUR_TEXTURE_NAME: &str = "texture";

/// Horizontal then vertical Gaussian blur.
///
/// The horizontal pass renders into an internal surface of fixed size; the
/// vertical pass renders from it into the caller's surface. Because the two
/// passes never read and write the same texture, the output surface may be
/// the one whose texture is the input.
#[derive(Debug)]
pub struct SeparableBlur {
    surface: Option<OffscreenSurface>,
    horizontal: Option<Material>,
    vertical: Option<Material>,
    quad: VertexBuffer,
    radius: i32,
}

impl SeparableBlur {
    /// Build both materials and a `size` x `size` intermediate surface.
    /// Failures are logged and leave the blur disabled.
    pub fn new(
        gl: &mut dyn GraphicsApi,
        programs: &ProgramCache,
        size: u32,
        radius: i32,
    ) -> Self {
        let surface = OffscreenSurface::new(gl, size, size)
            .map_err(|e| log::error!("blur surface: {e}"))
            .ok();
        Self {
            surface,
            horizontal: quad_material(programs.program(ShaderKind::HBlur)),
            vertical: quad_material(programs.program(ShaderKind::VBlur)),
            quad: VertexBuffer::from_f32(&QUAD_VERTICES),
            radius,
        }
    }

    /// Whether every resource was created.
    pub fn is_ready(&self) -> bool {
        self.surface.is_some() && self.horizontal.is_some() && self.vertical.is_some()
    }

    /// Blur `input` into `output`. Logs and draws nothing when disabled.
    pub fn draw(
        &mut self,
        gl: &mut dyn GraphicsApi,
        input: &Texture,
        output: &OffscreenSurface,
    ) {
        let (Some(surface), Some(horizontal), Some(vertical)) =
            (&self.surface, &mut self.horizontal, &mut self.vertical)
        else {
            log::error!("blur draw skipped: resources unavailable");
            return;
        };
        let step = 1.0 / surface.width() as f32;

        surface.begin_render(gl, ClearMask::NONE);
        pass(gl, horizontal, &mut self.quad, input, step, self.radius);
        surface.end_render(gl);

        gl.flush();

        output.begin_render(gl, ClearMask::NONE);
        pass(gl, vertical, &mut self.quad, surface.texture(), step, self.radius);
        output.end_render(gl);
    }

    /// Delete the intermediate surface.
    pub fn release(self, gl: &mut dyn GraphicsApi) {
        if let Some(surface) = self.surface {
            surface.release(gl);
        }
    }
}

fn quad_material(program: Option<Rc<GpuProgram>>) -> Option<Material> {
    let mut material = Material::new(program)?;
    material.add_attribute("position", AttributeFormat::floats(3));
    material.add_attribute("uv", AttributeFormat::floats(2));
    Some(material)
}

fn pass(
    gl: &mut dyn GraphicsApi,
    material: &mut Material,
    quad: &mut VertexBuffer,
    source: &Texture,
    step: f32,
    radius: i32,
) {
    material.start_render(gl);
    quad.rewind();
    material.set_vertex_buffer(gl, "position", quad, 0, QUAD_STRIDE);
    material.set_vertex_buffer(gl, "uv", quad, QUAD_UV_OFFSET, QUAD_STRIDE);
    material.update_uniform_texture(gl, BLUR_TEXTURE_NAME, 0, source.id());
    material.update_uniform(gl, "blurBufferSize", UniformValue::Float(step));
    material.update_uniform(gl, "blurRadius", UniformValue::Int(radius));
    material.draw(gl, Primitive::TriangleFan, 0, 4);
    material.end_render(gl);
}
