//! Texture objects owned by materials and offscreen surfaces.

use crate::assets::{AssetSource, Image};
use crate::gpu::api::{
    GpuError, GraphicsApi, TextureFilter, TextureId, TextureUpload,
};

/// One GPU texture and its dimensions.
///
/// Either a write-once asset upload or a render target that is redrawn
/// every frame. Textures are never shared-mutated: the creator owns the
/// handle and is responsible for [`release`](Self::release).
#[derive(Debug, PartialEq, Eq)]
pub struct Texture {
    id: TextureId,
    width: u32,
    height: u32,
}

impl Texture {
    /// Allocate uninitialized RGBA8 storage for use as a render target,
    /// with bilinear filtering.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::TextureCreation`] when the device refuses.
    pub fn blank(
        gl: &mut dyn GraphicsApi,
        width: u32,
        height: u32,
    ) -> Result<Self, GpuError> {
        if width == 0 || height == 0 {
            return Err(GpuError::TextureCreation(format!(
                "zero-sized texture {width}x{height}"
            )));
        }
        let id = gl.create_texture()?;
        gl.upload_texture(
            id,
            &TextureUpload {
                width,
                height,
                pixels: None,
                filter: TextureFilter::Linear,
            },
        );
        Ok(Self { id, width, height })
    }

    /// Upload a decoded image with nearest filtering.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::TextureCreation`] when the device refuses.
    pub fn from_image(
        gl: &mut dyn GraphicsApi,
        image: &Image,
    ) -> Result<Self, GpuError> {
        let id = gl.create_texture()?;
        gl.upload_texture(
            id,
            &TextureUpload {
                width: image.width,
                height: image.height,
                pixels: Some(&image.rgba),
                filter: TextureFilter::Nearest,
            },
        );
        Ok(Self {
            id,
            width: image.width,
            height: image.height,
        })
    }

    /// Load and upload an image asset. Logs and returns `None` if the asset
    /// is unavailable or the upload fails.
    pub fn load(
        gl: &mut dyn GraphicsApi,
        assets: &dyn AssetSource,
        path: &str,
    ) -> Option<Self> {
        let Some(image) = assets.load_image(path) else {
            log::error!("texture {path} unavailable");
            return None;
        };
        Self::from_image(gl, &image)
            .map_err(|e| log::error!("texture {path}: {e}"))
            .ok()
    }

    /// Device handle.
    pub fn id(&self) -> TextureId {
        self.id
    }

    /// Width in texels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in texels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Delete the texture from the device.
    pub fn release(self, gl: &mut dyn GraphicsApi) {
        gl.delete_texture(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssets;
    use crate::gpu::SoftwareDevice;

    #[test]
    fn loads_image_assets() {
        let mut assets = MemoryAssets::default();
        let image = Image::from_rgba(2, 1, vec![1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assets.insert_image("t.png", &image);

        let mut device = SoftwareDevice::new(1, 1);
        let texture = Texture::load(&mut device, &assets, "t.png").unwrap();
        assert_eq!((texture.width(), texture.height()), (2, 1));
        let (_, _, pixels) = device.read_texture(texture.id()).unwrap();
        assert_eq!(pixels, image.rgba);

        texture.release(&mut device);
        assert_eq!(device.texture_count(), 0);
    }

    #[test]
    fn missing_asset_yields_none() {
        let mut device = SoftwareDevice::new(1, 1);
        assert!(Texture::load(&mut device, &MemoryAssets::default(), "x.png").is_none());
        assert_eq!(device.texture_count(), 0);
    }

    #[test]
    fn zero_sized_render_target_is_rejected() {
        let mut device = SoftwareDevice::new(1, 1);
        assert!(matches!(
            Texture::blank(&mut device, 0, 16),
            Err(GpuError::TextureCreation(_))
        ));
    }
}
