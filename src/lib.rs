// -- Lint policy ---------------------------------------------------------
// This is the single source of truth for crate-wide lints.

// Broad lint groups
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
// Documentation
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
#![warn(rustdoc::private_intra_doc_links)]
#![warn(rustdoc::bare_urls)]
// No panicking in library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
// No debug/print artifacts
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
// Import hygiene
#![deny(clippy::wildcard_imports)]
// Function signature hygiene
#![deny(clippy::fn_params_excessive_bools)]
// Clone / pass-by-value hygiene
#![deny(clippy::implicit_clone)]
// String hygiene
#![deny(clippy::inefficient_to_string)]
#![deny(clippy::manual_string_new)]
#![deny(clippy::str_to_string)]
// Unused / redundant code
#![warn(unused_results)]
#![warn(unused_qualifications)]
// Cast hygiene
#![warn(trivial_casts)]
#![warn(trivial_numeric_casts)]
// Tests assert with unwrap freely
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! Multi-pass OpenGL ES renderer for 2D particle fluid simulations.
//!
//! Each frame steps a particle simulation behind a mutex, draws a
//! background canvas, splats water particles into a small offscreen
//! surface, blurs that surface in two separable passes, and composites it
//! over the canvas through an alpha-threshold shader. The result reads as a
//! continuous liquid rather than a cloud of points.
//!
//! # Key entry points
//!
//! - [`engine::FrameCompositor`] - lifecycle hooks and per-frame sequencing
//! - [`sim::SimulationGateway`] - the lock every simulation access goes
//!   through, shared with the [`sim::SensorThread`]
//! - [`gpu::GraphicsApi`] - the GL boundary, implemented by
//!   [`gpu::GlowDevice`] on hardware and [`gpu::SoftwareDevice`] on the CPU
//! - [`options::Options`] - TOML-backed simulation, rendering and water
//!   settings
//!
//! # Threading
//!
//! GL calls happen only on the render thread that owns the compositor.
//! Gravity updates arrive from other threads and serialize with stepping
//! and buffer copies through the gateway; the render pass holds the lock
//! only while copying particle buffers, never while drawing.

pub mod assets;
pub mod engine;
pub mod error;
pub mod gpu;
pub mod options;
pub mod renderer;
pub mod sim;
pub mod util;

pub use engine::{CompositorState, FrameCompositor};
pub use error::FluidError;
pub use options::Options;
