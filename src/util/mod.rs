//! Shared utilities for hosts driving the compositor.

pub mod frame_timing;
