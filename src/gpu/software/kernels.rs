//! CPU stand-ins for the bundled shader programs.
//!
//! A software program is chosen by the label it was linked under. Each
//! kernel reproduces what the matching GLSL pair in `assets/shaders/glsl`
//! computes, reading the same uniforms by name.

use glam::{Mat4, Vec4};

use super::raster::{Fragment, TexImage};
use crate::gpu::api::UniformValue;

/// Fallback for the `blurRadius` uniform when a blur program omits it.
const DEFAULT_BLUR_RADIUS: i32 = 4;

/// Largest radius `Blur.frag` honours.
pub(crate) const MAX_BLUR_RADIUS: i32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kernel {
    Particle,
    WaterParticle,
    Texture,
    Screen,
    HorizontalBlur,
    VerticalBlur,
}

impl Kernel {
    pub(crate) fn from_label(label: &str) -> Option<Self> {
        Some(match label {
            "particle" => Self::Particle,
            "water_particle" => Self::WaterParticle,
            "texture" => Self::Texture,
            "screen" => Self::Screen,
            "hblur" => Self::HorizontalBlur,
            "vblur" => Self::VerticalBlur,
            _ => return None,
        })
    }
}

/// Uniform lookup for one draw.
pub(crate) trait Uniforms {
    fn get(&self, name: &str) -> Option<UniformValue>;

    fn float(&self, name: &str) -> Option<f32> {
        match self.get(name)? {
            UniformValue::Float(v) => Some(v),
            UniformValue::Int(v) => Some(v as f32),
            _ => None,
        }
    }

    fn int(&self, name: &str) -> Option<i32> {
        match self.get(name)? {
            UniformValue::Int(v) => Some(v),
            UniformValue::Float(v) => Some(v as i32),
            _ => None,
        }
    }

    fn mat4(&self, name: &str) -> Mat4 {
        match self.get(name) {
            Some(UniformValue::Mat4(m)) => Mat4::from_cols_array(&m),
            _ => Mat4::IDENTITY,
        }
    }
}

/// Vertex attributes the kernels understand, already fetched.
#[derive(Debug, Clone, Copy)]
pub(crate) struct VertexInput {
    pub(crate) position: Vec4,
    pub(crate) uv: [f32; 2],
    pub(crate) color: [f32; 4],
    pub(crate) weight: f32,
}

/// Output of the vertex stage, still in clip space.
#[derive(Debug, Clone, Copy)]
pub(crate) struct VertexOutput {
    pub(crate) clip: Vec4,
    pub(crate) uv: [f32; 2],
    pub(crate) color: [f32; 4],
    pub(crate) point_size: f32,
}

pub(crate) fn run_vertex(
    kernel: Kernel,
    input: &VertexInput,
    uniforms: &impl Uniforms,
) -> VertexOutput {
    let clip = uniforms.mat4("mvp") * input.position;
    let point_size = uniforms.float("pointSize").unwrap_or(1.0);
    let mut out = VertexOutput {
        clip,
        uv: input.uv,
        color: input.color,
        point_size,
    };
    match kernel {
        Kernel::WaterParticle => {
            let w = input.weight.clamp(0.0, 1.0);
            out.point_size = point_size * (0.8 + 0.4 * w);
        }
        Kernel::Texture => {
            let uv = uniforms.mat4("uvTransform")
                * Vec4::new(input.uv[0], input.uv[1], 0.0, 1.0);
            out.uv = [uv.x, uv.y];
        }
        _ => {}
    }
    out
}

/// Returns `None` where the fragment shader would `discard`.
pub(crate) fn run_fragment(
    kernel: Kernel,
    frag: &Fragment,
    uniforms: &impl Uniforms,
    sampler: &dyn Fn(&str, [f32; 2]) -> [f32; 4],
) -> Option<[f32; 4]> {
    match kernel {
        Kernel::Particle | Kernel::WaterParticle => {
            let texel = sampler("texture", frag.point_coord);
            Some(std::array::from_fn(|c| texel[c] * frag.color[c]))
        }
        Kernel::Texture => {
            let alpha = uniforms.float("alphaFactor").unwrap_or(1.0);
            let texel = sampler("texture", frag.uv);
            Some(texel.map(|c| c * alpha))
        }
        Kernel::Screen => {
            let threshold = uniforms.float("alphaThreshold").unwrap_or(0.0);
            let texel = sampler("texture", frag.uv);
            let a = texel[3];
            if a < threshold || a <= 0.0 {
                return None;
            }
            Some([texel[0] / a, texel[1] / a, texel[2] / a, 1.0])
        }
        Kernel::HorizontalBlur | Kernel::VerticalBlur => {
            let step = uniforms.float("blurBufferSize").unwrap_or(0.0);
            let radius = uniforms
                .int("blurRadius")
                .unwrap_or(DEFAULT_BLUR_RADIUS)
                .clamp(0, MAX_BLUR_RADIUS);
            let axis = if kernel == Kernel::HorizontalBlur {
                [step, 0.0]
            } else {
                [0.0, step]
            };
            Some(gaussian(radius, |offset| {
                sampler(
                    "texture",
                    [frag.uv[0] + axis[0] * offset, frag.uv[1] + axis[1] * offset],
                )
            }))
        }
    }
}

/// Normalized Gaussian weights for taps `-radius..=radius`.
pub(crate) fn gaussian_weights(radius: i32) -> Vec<f32> {
    let sigma = (radius as f32 / 2.0).max(1.0);
    let raw: Vec<f32> = (-radius..=radius)
        .map(|i| (-(i * i) as f32 / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f32 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}

fn gaussian(radius: i32, mut tap: impl FnMut(f32) -> [f32; 4]) -> [f32; 4] {
    let mut sum = [0.0; 4];
    for (i, weight) in (-radius..=radius).zip(gaussian_weights(radius)) {
        let texel = tap(i as f32);
        for c in 0..4 {
            sum[c] += texel[c] * weight;
        }
    }
    sum
}

/// Sample helper over the device's bound textures.
pub(crate) fn sample_unit(
    textures: &[Option<&TexImage>],
    unit: Option<i32>,
    uv: [f32; 2],
) -> [f32; 4] {
    unit.and_then(|u| usize::try_from(u).ok())
        .and_then(|u| textures.get(u).copied().flatten())
        .map_or([0.0, 0.0, 0.0, 1.0], |image| image.sample(uv))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<(&'static str, UniformValue)>);

    impl Uniforms for Fixed {
        fn get(&self, name: &str) -> Option<UniformValue> {
            self.0.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
        }
    }

    fn fragment(uv: [f32; 2]) -> Fragment {
        Fragment {
            uv,
            color: [1.0; 4],
            point_coord: [0.5, 0.5],
        }
    }

    #[test]
    fn gaussian_weights_are_normalized_and_symmetric() {
        let weights = gaussian_weights(4);
        assert_eq!(weights.len(), 9);
        assert!((weights.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert_eq!(weights[0], weights[8]);
        assert!(weights[4] > weights[3]);
    }

    #[test]
    fn screen_discards_below_threshold_and_unpremultiplies() {
        let uniforms = Fixed(vec![("alphaThreshold", UniformValue::Float(0.7))]);
        let thin = |_: &str, _: [f32; 2]| [0.3, 0.3, 0.3, 0.5];
        assert!(run_fragment(Kernel::Screen, &fragment([0.5; 2]), &uniforms, &thin)
            .is_none());

        let dense = |_: &str, _: [f32; 2]| [0.4, 0.2, 0.8, 0.8];
        let out = run_fragment(Kernel::Screen, &fragment([0.5; 2]), &uniforms, &dense);
        let out = out.unwrap_or_default();
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert!((out[2] - 1.0).abs() < 1e-6);
        assert_eq!(out[3], 1.0);
    }

    #[test]
    fn blur_of_constant_input_is_constant() {
        let uniforms = Fixed(vec![("blurBufferSize", UniformValue::Float(1.0 / 128.0))]);
        let flat = |_: &str, _: [f32; 2]| [0.25, 0.5, 0.75, 1.0];
        for kernel in [Kernel::HorizontalBlur, Kernel::VerticalBlur] {
            let out = run_fragment(kernel, &fragment([0.3, 0.6]), &uniforms, &flat)
                .unwrap_or_default();
            for (got, want) in out.iter().zip([0.25, 0.5, 0.75, 1.0]) {
                assert!((got - want).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn water_point_size_scales_with_weight() {
        let uniforms = Fixed(vec![("pointSize", UniformValue::Float(10.0))]);
        let input = |weight| VertexInput {
            position: Vec4::W,
            uv: [0.0; 2],
            color: [1.0; 4],
            weight,
        };
        let light = run_vertex(Kernel::WaterParticle, &input(0.0), &uniforms);
        let heavy = run_vertex(Kernel::WaterParticle, &input(5.0), &uniforms);
        assert!((light.point_size - 8.0).abs() < 1e-6);
        assert!((heavy.point_size - 12.0).abs() < 1e-6);
        let plain = run_vertex(Kernel::Particle, &input(5.0), &uniforms);
        assert_eq!(plain.point_size, 10.0);
    }

    #[test]
    fn unknown_labels_have_no_kernel() {
        assert_eq!(Kernel::from_label("hblur"), Some(Kernel::HorizontalBlur));
        assert_eq!(Kernel::from_label("bloom"), None);
    }
}
