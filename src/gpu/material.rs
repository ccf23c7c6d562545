//! Materials: one program plus its attribute, sampler and blend bindings.
//!
//! A material is used as a scoped block. [`Material::start_render`] binds
//! everything it owns, the caller feeds vertex buffers and uniforms and
//! issues draws, and [`Material::end_render`] undoes every piece of state
//! the block touched so the next material starts from a clean slate.

use std::rc::Rc;

use crate::gpu::api::{
    AttribPointer, BlendFactor, ComponentType, GraphicsApi, Primitive,
    TextureId, UniformValue,
};
use crate::gpu::program::GpuProgram;
use crate::gpu::texture::Texture;
use crate::gpu::vertex::VertexBuffer;

/// Blend state applied for the duration of a render block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendMode {
    /// Whether blending is enabled at all.
    pub enabled: bool,
    /// Source factor.
    pub src: BlendFactor,
    /// Destination factor.
    pub dst: BlendFactor,
}

impl Default for BlendMode {
    fn default() -> Self {
        Self {
            enabled: false,
            src: BlendFactor::One,
            dst: BlendFactor::Zero,
        }
    }
}

/// Layout of one vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeFormat {
    /// Components per vertex.
    pub components: u8,
    /// Component type.
    pub component_type: ComponentType,
    /// Whether integer components are normalized.
    pub normalized: bool,
}

impl AttributeFormat {
    /// `n` 32-bit floats.
    pub const fn floats(n: u8) -> Self {
        Self {
            components: n,
            component_type: ComponentType::Float,
            normalized: false,
        }
    }

    /// Four normalized unsigned bytes (RGBA8 color).
    pub const RGBA8: Self = Self {
        components: 4,
        component_type: ComponentType::UnsignedByte,
        normalized: true,
    };
}

#[derive(Debug)]
struct AttributeBinding {
    name: String,
    location: u32,
    format: AttributeFormat,
}

#[derive(Debug)]
struct SamplerBinding {
    name: String,
    texture: Texture,
}

/// A program with its registered vertex attributes, owned sampler textures
/// and blend mode.
#[derive(Debug)]
pub struct Material {
    program: Rc<GpuProgram>,
    attributes: Vec<AttributeBinding>,
    samplers: Vec<SamplerBinding>,
    blend: BlendMode,
    /// Texture units bound since `start_render`.
    units_in_use: u32,
}

impl Material {
    /// Wrap a linked program. An absent program (it failed to build) is
    /// logged and yields no material.
    pub fn new(program: Option<Rc<GpuProgram>>) -> Option<Self> {
        let Some(program) = program else {
            log::error!("cannot create material: program unavailable");
            return None;
        };
        Some(Self {
            program,
            attributes: Vec::new(),
            samplers: Vec::new(),
            blend: BlendMode::default(),
            units_in_use: 0,
        })
    }

    /// The material's program.
    pub fn program(&self) -> &GpuProgram {
        &self.program
    }

    /// Current blend mode.
    pub fn blend(&self) -> BlendMode {
        self.blend
    }

    /// Register a vertex attribute. Duplicates and names the program does
    /// not declare are logged and ignored.
    pub fn add_attribute(&mut self, name: &str, format: AttributeFormat) {
        if self.attributes.iter().any(|a| a.name == name) {
            log::warn!(
                "attribute {name} already added to {}",
                self.program.label()
            );
            return;
        }
        let Some(location) = self.program.attribute_location(name) else {
            log::error!(
                "attribute {name} not found in program {}",
                self.program.label()
            );
            return;
        };
        self.attributes.push(AttributeBinding {
            name: name.to_owned(),
            location,
            format,
        });
    }

    /// Whether `name` is a registered attribute.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name == name)
    }

    /// Hand a texture to the material, bound to sampler uniform `name` on
    /// every `start_render`. A duplicate name is logged and the texture is
    /// released.
    pub fn add_sampler_texture(
        &mut self,
        gl: &mut dyn GraphicsApi,
        name: &str,
        texture: Texture,
    ) {
        if self.samplers.iter().any(|s| s.name == name) {
            log::warn!(
                "sampler {name} already added to {}",
                self.program.label()
            );
            texture.release(gl);
            return;
        }
        self.samplers.push(SamplerBinding {
            name: name.to_owned(),
            texture,
        });
    }

    /// Set the blend factors. `(One, Zero)` is plain replacement and turns
    /// blending off.
    pub fn set_blend(&mut self, src: BlendFactor, dst: BlendFactor) {
        self.blend = if src == BlendFactor::One && dst == BlendFactor::Zero {
            BlendMode::default()
        } else {
            BlendMode {
                enabled: true,
                src,
                dst,
            }
        };
    }

    /// Begin a render block: use the program, apply blending, enable every
    /// registered attribute and bind the owned samplers to units `0..n`.
    pub fn start_render(&mut self, gl: &mut dyn GraphicsApi) {
        self.program.bind(gl);

        if self.blend.enabled {
            gl.enable_blend();
            gl.blend_func(self.blend.src, self.blend.dst);
        }

        for attribute in &self.attributes {
            gl.enable_vertex_attrib_array(attribute.location);
        }

        for (unit, sampler) in self.samplers.iter().enumerate() {
            let unit = unit as u32;
            gl.active_texture(unit);
            gl.bind_texture(Some(sampler.texture.id()));
            if let Some(location) = self.program.uniform_location(&sampler.name) {
                gl.set_uniform(location, UniformValue::Int(unit as i32));
            }
        }
        self.units_in_use = self.samplers.len() as u32;
    }

    /// Point a registered attribute at `buffer`, starting `element_offset`
    /// elements in. Unregistered names are logged and ignored.
    pub fn set_vertex_buffer(
        &self,
        gl: &mut dyn GraphicsApi,
        name: &str,
        buffer: &mut VertexBuffer,
        element_offset: usize,
        stride: usize,
    ) {
        let Some(attribute) = self.attributes.iter().find(|a| a.name == name) else {
            log::warn!(
                "set_vertex_buffer: attribute {name} not registered on {}",
                self.program.label()
            );
            return;
        };
        buffer.seek(element_offset);
        gl.vertex_attrib_pointer(&AttribPointer {
            location: attribute.location,
            components: attribute.format.components,
            component_type: attribute.format.component_type,
            normalized: attribute.format.normalized,
            stride,
            data: buffer.remaining(),
        });
    }

    /// Set a uniform. Names the program does not declare are ignored.
    pub fn update_uniform(
        &self,
        gl: &mut dyn GraphicsApi,
        name: &str,
        value: UniformValue,
    ) {
        match self.program.uniform_location(name) {
            Some(location) => gl.set_uniform(location, value),
            None => log::warn!(
                "update_uniform: {} has no uniform {name}",
                self.program.label()
            ),
        }
    }

    /// Set a `vec3`, `vec4` or `mat4` uniform from a slice of 3, 4 or 16
    /// floats. Any other length is ignored.
    pub fn update_uniform_slice(
        &self,
        gl: &mut dyn GraphicsApi,
        name: &str,
        values: &[f32],
    ) {
        let value = match values.len() {
            3 => UniformValue::Vec3([values[0], values[1], values[2]]),
            4 => UniformValue::Vec4([values[0], values[1], values[2], values[3]]),
            16 => {
                let mut m = [0.0; 16];
                m.copy_from_slice(values);
                UniformValue::Mat4(m)
            }
            _ => return,
        };
        self.update_uniform(gl, name, value);
    }

    /// Bind `texture` to `unit` and point sampler `name` at it. The unit is
    /// unbound again by [`end_render`](Self::end_render).
    pub fn update_uniform_texture(
        &mut self,
        gl: &mut dyn GraphicsApi,
        name: &str,
        unit: u32,
        texture: TextureId,
    ) {
        let Some(location) = self.program.uniform_location(name) else {
            log::warn!(
                "update_uniform_texture: {} has no sampler {name}",
                self.program.label()
            );
            return;
        };
        gl.active_texture(unit);
        gl.bind_texture(Some(texture));
        gl.set_uniform(location, UniformValue::Int(unit as i32));
        self.units_in_use = self.units_in_use.max(unit + 1);
    }

    /// Issue one non-indexed draw.
    pub fn draw(
        &self,
        gl: &mut dyn GraphicsApi,
        primitive: Primitive,
        first: usize,
        count: usize,
    ) {
        gl.draw_arrays(primitive, first, count);
    }

    /// End the render block, restoring texture units, attribute arrays and
    /// blending to their defaults.
    pub fn end_render(&mut self, gl: &mut dyn GraphicsApi) {
        for unit in 0..self.units_in_use {
            gl.active_texture(unit);
            gl.bind_texture(None);
        }
        if self.units_in_use > 0 {
            gl.active_texture(0);
        }
        self.units_in_use = 0;

        for attribute in &self.attributes {
            gl.disable_vertex_attrib_array(attribute.location);
        }

        if self.blend.enabled {
            gl.disable_blend();
        }
    }

    /// Delete the owned sampler textures.
    pub fn release(self, gl: &mut dyn GraphicsApi) {
        for sampler in self.samplers {
            sampler.texture.release(gl);
        }
    }
}
