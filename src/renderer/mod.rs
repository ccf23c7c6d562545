//! The render passes: background canvas, fluid particles, and the blur
//! and transform helpers they share.

pub mod background;
pub mod blur;
pub mod particles;
pub mod transform;

pub use background::BackgroundLayer;
pub use blur::SeparableBlur;
pub use particles::{classify, is_fluid, ParticleLayer};
pub use transform::{ViewportState, WorldTransforms};
