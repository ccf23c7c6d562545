//! Offscreen render targets: one framebuffer bound to one texture.

use crate::gpu::api::{ClearMask, FramebufferId, GpuError, GraphicsApi};
use crate::gpu::texture::Texture;

/// A fixed-size framebuffer with a texture color attachment.
///
/// Sized once at construction and never resized; blur and fluid surfaces
/// stay small regardless of screen size.
#[derive(Debug)]
pub struct OffscreenSurface {
    framebuffer: FramebufferId,
    texture: Texture,
    clear_color: [f32; 4],
}

impl OffscreenSurface {
    /// Create a `width` x `height` surface with a transparent clear color.
    ///
    /// # Errors
    ///
    /// Propagates texture or framebuffer creation failures. Nothing is
    /// leaked on failure.
    pub fn new(
        gl: &mut dyn GraphicsApi,
        width: u32,
        height: u32,
    ) -> Result<Self, GpuError> {
        let texture = Texture::blank(gl, width, height)?;
        match gl.create_framebuffer(texture.id()) {
            Ok(framebuffer) => Ok(Self {
                framebuffer,
                texture,
                clear_color: [0.0; 4],
            }),
            Err(e) => {
                texture.release(gl);
                Err(e)
            }
        }
    }

    /// Set the color [`begin_render`](Self::begin_render) clears to.
    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear_color = rgba;
    }

    /// The color attachment.
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.texture.width()
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.texture.height()
    }

    /// Bind the surface and set the viewport to cover it, clearing with
    /// the stored color when `clear` selects any buffer. Must be paired with
    /// [`end_render`](Self::end_render).
    pub fn begin_render(&self, gl: &mut dyn GraphicsApi, clear: ClearMask) {
        gl.bind_framebuffer(Some(self.framebuffer));
        gl.viewport(0, 0, self.width() as i32, self.height() as i32);
        if !clear.is_empty() {
            gl.clear_color(self.clear_color);
            gl.clear(clear);
        }
    }

    /// Rebind the default framebuffer.
    pub fn end_render(&self, gl: &mut dyn GraphicsApi) {
        gl.bind_framebuffer(None);
    }

    /// Delete the framebuffer and its texture.
    pub fn release(self, gl: &mut dyn GraphicsApi) {
        gl.delete_framebuffer(self.framebuffer);
        self.texture.release(gl);
    }
}
