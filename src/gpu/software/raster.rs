//! Texel storage, sampling, blending and primitive rasterization for the
//! software device.

use crate::gpu::api::{BlendFactor, TextureFilter};

/// RGBA8 texel storage of one texture. Row 0 is `v = 0`.
#[derive(Debug, Clone, Default)]
pub(crate) struct TexImage {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) texels: Vec<[u8; 4]>,
    pub(crate) filter: Option<TextureFilter>,
}

impl TexImage {
    pub(crate) fn new(width: u32, height: u32, filter: TextureFilter) -> Self {
        Self {
            width,
            height,
            texels: vec![[0; 4]; (width * height) as usize],
            filter: Some(filter),
        }
    }

    pub(crate) fn from_rgba(
        width: u32,
        height: u32,
        pixels: &[u8],
        filter: TextureFilter,
    ) -> Self {
        let mut image = Self::new(width, height, filter);
        for (texel, chunk) in image.texels.iter_mut().zip(pixels.chunks_exact(4)) {
            texel.copy_from_slice(chunk);
        }
        image
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    fn texel(&self, x: i64, y: i64) -> [f32; 4] {
        let x = x.clamp(0, i64::from(self.width) - 1) as usize;
        let y = y.clamp(0, i64::from(self.height) - 1) as usize;
        unpack(self.texels[y * self.width as usize + x])
    }

    /// Clamp-to-edge sample at normalized coordinates. Incomplete textures
    /// sample as opaque black, like an unbound GL sampler.
    pub(crate) fn sample(&self, uv: [f32; 2]) -> [f32; 4] {
        if !self.is_complete() {
            return [0.0, 0.0, 0.0, 1.0];
        }
        let x = uv[0] * self.width as f32 - 0.5;
        let y = uv[1] * self.height as f32 - 0.5;
        match self.filter.unwrap_or(TextureFilter::Linear) {
            TextureFilter::Nearest => {
                self.texel(x.round() as i64, y.round() as i64)
            }
            TextureFilter::Linear => {
                let (x0, y0) = (x.floor(), y.floor());
                let (fx, fy) = (x - x0, y - y0);
                let (x0, y0) = (x0 as i64, y0 as i64);
                let top = lerp4(self.texel(x0, y0), self.texel(x0 + 1, y0), fx);
                let bottom =
                    lerp4(self.texel(x0, y0 + 1), self.texel(x0 + 1, y0 + 1), fx);
                lerp4(top, bottom, fy)
            }
        }
    }

    pub(crate) fn fill(&mut self, rgba: [f32; 4]) {
        let packed = pack(rgba);
        self.texels.fill(packed);
    }

    /// Write one fragment, blending against the stored texel when `blend`
    /// is set.
    pub(crate) fn write(
        &mut self,
        x: u32,
        y: u32,
        src: [f32; 4],
        blend: Option<(BlendFactor, BlendFactor)>,
    ) {
        let index = (y * self.width + x) as usize;
        let out = match blend {
            None => src,
            Some((sf, df)) => {
                let dst = unpack(self.texels[index]);
                let s = factor(sf, src, dst);
                let d = factor(df, src, dst);
                std::array::from_fn(|c| src[c] * s + dst[c] * d)
            }
        };
        self.texels[index] = pack(out);
    }

    /// Bottom-up RGBA8 bytes.
    pub(crate) fn to_rgba(&self) -> Vec<u8> {
        self.texels.iter().flatten().copied().collect()
    }
}

fn factor(f: BlendFactor, src: [f32; 4], dst: [f32; 4]) -> f32 {
    match f {
        BlendFactor::Zero => 0.0,
        BlendFactor::One => 1.0,
        BlendFactor::SrcAlpha => src[3],
        BlendFactor::OneMinusSrcAlpha => 1.0 - src[3],
        BlendFactor::DstAlpha => dst[3],
        BlendFactor::OneMinusDstAlpha => 1.0 - dst[3],
    }
}

fn lerp4(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
    std::array::from_fn(|c| a[c] + (b[c] - a[c]) * t)
}

pub(crate) fn unpack(texel: [u8; 4]) -> [f32; 4] {
    texel.map(|c| f32::from(c) / 255.0)
}

pub(crate) fn pack(rgba: [f32; 4]) -> [u8; 4] {
    rgba.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

/// A vertex after the vertex stage, in window coordinates.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct WindowVertex {
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) uv: [f32; 2],
    pub(crate) color: [f32; 4],
    pub(crate) point_size: f32,
}

/// Per-fragment inputs handed to a kernel.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Fragment {
    pub(crate) uv: [f32; 2],
    pub(crate) color: [f32; 4],
    pub(crate) point_coord: [f32; 2],
}

/// Pixel rectangle fragments may touch: the viewport clipped to the target.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scissor {
    pub(crate) x0: i64,
    pub(crate) y0: i64,
    pub(crate) x1: i64,
    pub(crate) y1: i64,
}

impl Scissor {
    pub(crate) fn new(viewport: [i32; 4], width: u32, height: u32) -> Self {
        let [vx, vy, vw, vh] = viewport.map(i64::from);
        Self {
            x0: vx.max(0),
            y0: vy.max(0),
            x1: (vx + vw).min(i64::from(width)),
            y1: (vy + vh).min(i64::from(height)),
        }
    }
}

/// Square point sprite centred on the vertex.
pub(crate) fn raster_point(
    v: &WindowVertex,
    scissor: Scissor,
    mut emit: impl FnMut(u32, u32, Fragment),
) {
    let size = v.point_size.max(1.0);
    let left = v.x - size * 0.5;
    let bottom = v.y - size * 0.5;
    let x_start = (left - 0.5).ceil().max(scissor.x0 as f32) as i64;
    let x_end = (left + size - 0.5).ceil().min(scissor.x1 as f32) as i64;
    let y_start = (bottom - 0.5).ceil().max(scissor.y0 as f32) as i64;
    let y_end = (bottom + size - 0.5).ceil().min(scissor.y1 as f32) as i64;

    for py in y_start..y_end {
        for px in x_start..x_end {
            let cx = px as f32 + 0.5;
            let cy = py as f32 + 0.5;
            // gl_PointCoord has its origin at the top-left of the sprite.
            let point_coord = [(cx - left) / size, 1.0 - (cy - bottom) / size];
            emit(
                px as u32,
                py as u32,
                Fragment {
                    uv: v.uv,
                    color: v.color,
                    point_coord,
                },
            );
        }
    }
}

fn edge(a: &WindowVertex, b: &WindowVertex, px: f32, py: f32) -> f32 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

/// Counter-clockwise top-left fill rule (window y points up).
fn is_top_left(a: &WindowVertex, b: &WindowVertex) -> bool {
    (a.y == b.y && b.x < a.x) || b.y < a.y
}

/// Rasterize one triangle with perspective-free attribute interpolation.
pub(crate) fn raster_triangle(
    tri: [&WindowVertex; 3],
    scissor: Scissor,
    mut emit: impl FnMut(u32, u32, Fragment),
) {
    let [a, mut b, mut c] = tri;
    let mut area = edge(a, b, c.x, c.y);
    if area == 0.0 {
        return;
    }
    if area < 0.0 {
        std::mem::swap(&mut b, &mut c);
        area = -area;
    }

    let min_x = a.x.min(b.x).min(c.x).floor().max(scissor.x0 as f32) as i64;
    let max_x = a.x.max(b.x).max(c.x).ceil().min(scissor.x1 as f32) as i64;
    let min_y = a.y.min(b.y).min(c.y).floor().max(scissor.y0 as f32) as i64;
    let max_y = a.y.max(b.y).max(c.y).ceil().min(scissor.y1 as f32) as i64;

    let bias = [is_top_left(b, c), is_top_left(c, a), is_top_left(a, b)];
    let inside = |w: f32, top_left: bool| w > 0.0 || (w == 0.0 && top_left);

    for py in min_y..max_y {
        for px in min_x..max_x {
            let cx = px as f32 + 0.5;
            let cy = py as f32 + 0.5;
            let w0 = edge(b, c, cx, cy);
            let w1 = edge(c, a, cx, cy);
            let w2 = edge(a, b, cx, cy);
            if !(inside(w0, bias[0]) && inside(w1, bias[1]) && inside(w2, bias[2]))
            {
                continue;
            }
            let (l0, l1, l2) = (w0 / area, w1 / area, w2 / area);
            let uv = std::array::from_fn(|i| {
                a.uv[i] * l0 + b.uv[i] * l1 + c.uv[i] * l2
            });
            let color = std::array::from_fn(|i| {
                a.color[i] * l0 + b.color[i] * l1 + c.color[i] * l2
            });
            emit(
                px as u32,
                py as u32,
                Fragment {
                    uv,
                    color,
                    point_coord: [0.0, 0.0],
                },
            );
        }
    }
}

/// One-pixel-wide DDA line.
pub(crate) fn raster_line(
    a: &WindowVertex,
    b: &WindowVertex,
    scissor: Scissor,
    mut emit: impl FnMut(u32, u32, Fragment),
) {
    let steps = (b.x - a.x).abs().max((b.y - a.y).abs()).ceil().max(1.0);
    for i in 0..=steps as i64 {
        let t = i as f32 / steps;
        let x = (a.x + (b.x - a.x) * t).floor() as i64;
        let y = (a.y + (b.y - a.y) * t).floor() as i64;
        if x < scissor.x0 || x >= scissor.x1 || y < scissor.y0 || y >= scissor.y1
        {
            continue;
        }
        emit(
            x as u32,
            y as u32,
            Fragment {
                uv: std::array::from_fn(|c| a.uv[c] + (b.uv[c] - a.uv[c]) * t),
                color: lerp4(a.color, b.color, t),
                point_coord: [0.0, 0.0],
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(x: f32, y: f32) -> WindowVertex {
        WindowVertex {
            x,
            y,
            color: [1.0; 4],
            ..WindowVertex::default()
        }
    }

    #[test]
    fn quad_diagonal_is_covered_exactly_once() {
        let scissor = Scissor::new([0, 0, 8, 8], 8, 8);
        let quad = [vertex(0.0, 0.0), vertex(0.0, 8.0), vertex(8.0, 8.0), vertex(8.0, 0.0)];
        let mut hits = vec![0u32; 64];
        for tri in [[&quad[0], &quad[1], &quad[2]], [&quad[0], &quad[2], &quad[3]]] {
            raster_triangle(tri, scissor, |x, y, _| hits[(y * 8 + x) as usize] += 1);
        }
        assert!(hits.iter().all(|&h| h == 1), "{hits:?}");
    }

    #[test]
    fn linear_sampling_of_a_uniform_texture_is_uniform() {
        let mut image = TexImage::new(4, 4, TextureFilter::Linear);
        image.fill([0.2, 0.4, 0.6, 0.8]);
        for uv in [[0.0, 0.0], [0.37, 0.91], [1.0, 1.0]] {
            assert_eq!(pack(image.sample(uv)), pack([0.2, 0.4, 0.6, 0.8]));
        }
    }

    #[test]
    fn premultiplied_blend_accumulates() {
        let mut image = TexImage::new(1, 1, TextureFilter::Nearest);
        let blend = Some((BlendFactor::One, BlendFactor::OneMinusSrcAlpha));
        image.write(0, 0, [0.5, 0.0, 0.0, 0.5], blend);
        image.write(0, 0, [0.5, 0.0, 0.0, 0.5], blend);
        // The second write blends against the stored 8-bit texel.
        let stored = unpack(pack([0.5, 0.0, 0.0, 0.5]));
        let expected = stored.map(|c| 0.5 + c * 0.5);
        let expected = pack([expected[0], 0.0, 0.0, expected[3]]);
        assert_eq!(image.texels[0], expected);
        let ideal = pack([0.75, 0.0, 0.0, 0.75]);
        assert!(image.texels[0][0].abs_diff(ideal[0]) <= 1);
    }

    #[test]
    fn point_sprite_covers_its_size() {
        let scissor = Scissor::new([0, 0, 16, 16], 16, 16);
        let mut v = vertex(8.0, 8.0);
        v.point_size = 4.0;
        let mut count = 0;
        raster_point(&v, scissor, |_, _, _| count += 1);
        assert_eq!(count, 16);
    }
}
