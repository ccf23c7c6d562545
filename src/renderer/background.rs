//! The static canvas drawn behind the particles.

use glam::Mat4;

use crate::assets::AssetSource;
use crate::gpu::material::AttributeFormat;
use crate::gpu::{
    BlendFactor, GraphicsApi, Material, Primitive, ProgramCache, ShaderKind,
    Texture, UniformValue, VertexBuffer,
};

/// Strip-ordered full-viewport quad positions.
const CANVAS_POSITIONS: [f32; 8] = [-1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0];
/// Texture coordinates matching [`CANVAS_POSITIONS`].
const CANVAS_UVS: [f32; 8] = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0];

/// One textured quad covering the viewport.
#[derive(Debug)]
pub struct BackgroundLayer {
    material: Option<Material>,
    positions: VertexBuffer,
    uvs: VertexBuffer,
}

impl BackgroundLayer {
    /// Build the canvas material around `texture_path`. A missing program
    /// or image is logged and disables the layer.
    pub fn new(
        gl: &mut dyn GraphicsApi,
        programs: &ProgramCache,
        assets: &dyn AssetSource,
        texture_path: &str,
    ) -> Self {
        let material = Material::new(programs.program(ShaderKind::Texture)).and_then(
            |mut material| {
                material.add_attribute("position", AttributeFormat::floats(2));
                material.add_attribute("uv", AttributeFormat::floats(2));
                material.set_blend(BlendFactor::One, BlendFactor::OneMinusSrcAlpha);
                let texture = Texture::load(gl, assets, texture_path)?;
                material.add_sampler_texture(gl, "texture", texture);
                Some(material)
            },
        );
        Self {
            material,
            positions: VertexBuffer::from_f32(&CANVAS_POSITIONS),
            uvs: VertexBuffer::from_f32(&CANVAS_UVS),
        }
    }

    /// Whether the layer can draw.
    pub fn is_ready(&self) -> bool {
        self.material.is_some()
    }

    /// Draw the canvas into the bound framebuffer.
    pub fn draw(&mut self, gl: &mut dyn GraphicsApi) {
        let Some(material) = &mut self.material else {
            log::error!("background draw skipped: material unavailable");
            return;
        };
        let identity = Mat4::IDENTITY.to_cols_array();
        material.start_render(gl);
        material.set_vertex_buffer(gl, "position", &mut self.positions, 0, 0);
        material.set_vertex_buffer(gl, "uv", &mut self.uvs, 0, 0);
        material.update_uniform(gl, "mvp", UniformValue::Mat4(identity));
        material.update_uniform(gl, "uvTransform", UniformValue::Mat4(identity));
        material.update_uniform(gl, "alphaFactor", UniformValue::Float(1.0));
        material.draw(gl, Primitive::TriangleStrip, 0, 4);
        material.end_render(gl);
    }

    /// Delete the canvas texture.
    pub fn release(self, gl: &mut dyn GraphicsApi) {
        if let Some(material) = self.material {
            material.release(gl);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{EmbeddedAssets, Image, MemoryAssets};
    use crate::gpu::SoftwareDevice;

    #[test]
    fn canvas_covers_the_screen() {
        let mut device = SoftwareDevice::new(16, 8);
        let programs = ProgramCache::load_all(&mut device, &EmbeddedAssets, "shaders/glsl");
        let mut assets = MemoryAssets::default();
        let image = Image::from_rgba(1, 1, vec![10, 20, 30, 255]).unwrap();
        assets.insert_image("canvas.png", &image);

        let mut layer = BackgroundLayer::new(&mut device, &programs, &assets, "canvas.png");
        assert!(layer.is_ready());
        device.viewport(0, 0, 16, 8);
        layer.draw(&mut device);

        for (x, y) in [(0, 0), (15, 7), (8, 4)] {
            assert_eq!(device.screen_pixel(x, y), Some([10, 20, 30, 255]));
        }
        assert!(!device.blend_enabled());
        assert_eq!(device.bound_texture(0), None);
    }

    #[test]
    fn bundled_canvas_loads() {
        let mut device = SoftwareDevice::new(4, 4);
        let programs = ProgramCache::load_all(&mut device, &EmbeddedAssets, "shaders/glsl");
        let layer =
            BackgroundLayer::new(&mut device, &programs, &EmbeddedAssets, "textures/canvas.png");
        assert!(layer.is_ready());
        layer.release(&mut device);
        assert_eq!(device.texture_count(), 0);
    }

    #[test]
    fn missing_texture_disables_the_layer() {
        let mut device = SoftwareDevice::new(4, 4);
        let programs = ProgramCache::load_all(&mut device, &EmbeddedAssets, "shaders/glsl");
        let mut layer =
            BackgroundLayer::new(&mut device, &programs, &MemoryAssets::default(), "nope.png");
        assert!(!layer.is_ready());
        layer.draw(&mut device);
        assert_eq!(device.stats().draw_calls, 0);
    }
}
