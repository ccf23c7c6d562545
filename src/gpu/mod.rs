//! GPU resource management.
//!
//! Provides the [`GraphicsApi`] boundary with its hardware and software
//! devices, plus the program, texture, material, offscreen-surface and
//! vertex-buffer plumbing the render passes are built from.

/// The GL-ES command surface and its value types.
pub mod api;
/// Hardware device over a `glow` context.
pub mod glow_device;
/// Scoped program/attribute/sampler/blend binding.
pub mod material;
/// Linked programs and the program cache.
pub mod program;
/// CPU reference device.
pub mod software;
/// Framebuffer + texture render targets.
pub mod surface;
/// Texture ownership and upload.
pub mod texture;
/// Client-side vertex data with a read position.
pub mod vertex;

pub use api::{
    BlendFactor, ClearMask, GpuError, GraphicsApi, Primitive, TextureFilter,
    UniformValue,
};
pub use glow_device::GlowDevice;
pub use material::Material;
pub use program::{GpuProgram, ProgramCache, ShaderKind};
pub use software::SoftwareDevice;
pub use surface::OffscreenSurface;
pub use texture::Texture;
pub use vertex::VertexBuffer;
