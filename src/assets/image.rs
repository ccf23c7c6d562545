//! Decoded RGBA8 images and their PNG codec.

use std::io::Write;

use crate::error::FluidError;

/// A decoded image, tightly packed RGBA8, rows in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// `width * height * 4` bytes.
    pub rgba: Vec<u8>,
}

impl Image {
    /// Wrap raw RGBA8 pixels, rejecting a buffer of the wrong length.
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Option<Self> {
        (rgba.len() == width as usize * height as usize * 4).then_some(Self {
            width,
            height,
            rgba,
        })
    }

    /// Same pixels with the row order reversed.
    #[must_use]
    pub fn flipped_vertically(&self) -> Self {
        let row = self.width as usize * 4;
        let rgba = if row == 0 {
            Vec::new()
        } else {
            self.rgba.chunks_exact(row).rev().flatten().copied().collect()
        };
        Self {
            width: self.width,
            height: self.height,
            rgba,
        }
    }

    /// Decode a PNG of any color type into RGBA8.
    ///
    /// # Errors
    ///
    /// Returns [`FluidError::Image`] for malformed data.
    pub fn decode_png(bytes: &[u8]) -> Result<Self, FluidError> {
        let mut decoder = png::Decoder::new(bytes);
        decoder.set_transformations(
            png::Transformations::EXPAND | png::Transformations::STRIP_16,
        );
        let mut reader = decoder
            .read_info()
            .map_err(|e| FluidError::Image(format!("PNG header: {e}")))?;
        let mut buf = vec![0; reader.output_buffer_size()];
        let info = reader
            .next_frame(&mut buf)
            .map_err(|e| FluidError::Image(format!("PNG frame: {e}")))?;
        buf.truncate(info.buffer_size());

        let rgba = match info.color_type {
            png::ColorType::Rgba => buf,
            png::ColorType::Rgb => buf
                .chunks_exact(3)
                .flat_map(|p| [p[0], p[1], p[2], 255])
                .collect(),
            png::ColorType::GrayscaleAlpha => buf
                .chunks_exact(2)
                .flat_map(|p| [p[0], p[0], p[0], p[1]])
                .collect(),
            png::ColorType::Grayscale => {
                buf.iter().flat_map(|&g| [g, g, g, 255]).collect()
            }
            png::ColorType::Indexed => {
                return Err(FluidError::Image(
                    "indexed PNG was not expanded".to_owned(),
                ));
            }
        };
        Self::from_rgba(info.width, info.height, rgba).ok_or_else(|| {
            FluidError::Image("PNG pixel data has unexpected length".to_owned())
        })
    }

    /// Encode as an 8-bit RGBA PNG.
    ///
    /// # Errors
    ///
    /// Returns [`FluidError::Image`] if the encoder rejects the data.
    pub fn write_png(&self, writer: impl Write) -> Result<(), FluidError> {
        let mut encoder = png::Encoder::new(writer, self.width, self.height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder
            .write_header()
            .map_err(|e| FluidError::Image(format!("PNG header: {e}")))?;
        writer
            .write_image_data(&self.rgba)
            .map_err(|e| FluidError::Image(format!("PNG data: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_round_trip_preserves_pixels() {
        let image = Image::from_rgba(
            2,
            2,
            vec![
                255, 0, 0, 255, 0, 255, 0, 128, //
                0, 0, 255, 0, 10, 20, 30, 40,
            ],
        )
        .unwrap();
        let mut encoded = Vec::new();
        image.write_png(&mut encoded).unwrap();
        assert_eq!(Image::decode_png(&encoded).unwrap(), image);
    }

    #[test]
    fn rejects_garbage_and_bad_lengths() {
        assert!(Image::decode_png(b"not a png").is_err());
        assert!(Image::from_rgba(2, 2, vec![0; 15]).is_none());
    }

    #[test]
    fn flip_reverses_rows() {
        let image = Image::from_rgba(1, 2, vec![1, 1, 1, 1, 2, 2, 2, 2]).unwrap();
        assert_eq!(image.flipped_vertically().rgba, vec![2, 2, 2, 2, 1, 1, 1, 1]);
    }
}
