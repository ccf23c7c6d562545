//! Client-side vertex data.

/// Full-viewport quad for triangle-fan draws: `position.xyz, uv.xy` per
/// vertex, counter-clockwise from the bottom-left corner.
pub const QUAD_VERTICES: [f32; 20] = [
    -1.0, -1.0, 0.0, 0.0, 0.0, //
    -1.0, 1.0, 0.0, 0.0, 1.0, //
    1.0, 1.0, 0.0, 1.0, 1.0, //
    1.0, -1.0, 0.0, 1.0, 0.0,
];

/// Byte stride of one [`QUAD_VERTICES`] vertex.
pub const QUAD_STRIDE: usize = 5 * size_of::<f32>();

/// Float offset of the UV pair inside a quad vertex.
pub const QUAD_UV_OFFSET: usize = 3;

/// A fixed-capacity byte buffer with a read position, measured in
/// elements of `element_size` bytes.
///
/// Mirrors how attribute pointers address client memory: a pointer is taken
/// at the current read position, so the same interleaved buffer can feed
/// several attributes by seeking between calls.
#[derive(Debug, Clone)]
pub struct VertexBuffer {
    data: Vec<u8>,
    len: usize,
    element_size: usize,
    position: usize,
}

impl VertexBuffer {
    /// Zeroed buffer of `capacity` bytes addressed in `element_size` units.
    pub fn with_capacity(capacity: usize, element_size: usize) -> Self {
        Self {
            data: vec![0; capacity],
            len: 0,
            element_size: element_size.max(1),
            position: 0,
        }
    }

    /// Buffer holding `values`, addressed per float.
    pub fn from_f32(values: &[f32]) -> Self {
        let data = bytemuck::cast_slice::<f32, u8>(values).to_vec();
        Self {
            len: data.len(),
            data,
            element_size: size_of::<f32>(),
            position: 0,
        }
    }

    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes written.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reset the read position to the start.
    pub fn rewind(&mut self) {
        self.position = 0;
    }

    /// Move the read position to element `element`, clamped to the data.
    pub fn seek(&mut self, element: usize) {
        self.position = (element * self.element_size).min(self.len);
    }

    /// Read position in bytes.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Written bytes from the read position on.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.position..self.len]
    }

    /// Overwrite the contents. `fill` receives the whole capacity and
    /// returns how many bytes it wrote; the read position is rewound.
    pub fn refill(&mut self, fill: impl FnOnce(&mut [u8]) -> usize) {
        self.len = fill(&mut self.data).min(self.data.len());
        self.position = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_addresses_interleaved_attributes() {
        let mut quad = VertexBuffer::from_f32(&QUAD_VERTICES);
        assert_eq!(quad.len(), 80);
        quad.seek(QUAD_UV_OFFSET);
        assert_eq!(quad.position(), 12);
        let first_uv: Vec<f32> = quad.remaining()[..8]
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(first_uv, [0.0, 0.0]);
        quad.rewind();
        assert_eq!(quad.remaining().len(), 80);
    }

    #[test]
    fn refill_clamps_to_capacity() {
        let mut buffer = VertexBuffer::with_capacity(8, 1);
        buffer.seek(3);
        buffer.refill(|dst| {
            dst[..4].copy_from_slice(&[1, 2, 3, 4]);
            4
        });
        assert_eq!(buffer.remaining(), &[1, 2, 3, 4]);
        buffer.refill(|_| 100);
        assert_eq!(buffer.len(), 8);
        buffer.seek(50);
        assert!(buffer.remaining().is_empty());
    }
}
