//! Crate-level error types.

use std::fmt;

/// Errors produced by the fluidview crate.
#[derive(Debug)]
pub enum FluidError {
    /// Generic I/O failure.
    Io(std::io::Error),
    /// TOML options parsing/serialization failure.
    OptionsParse(String),
    /// An asset root is missing or is not a directory.
    Asset(String),
    /// Failed to spawn a background thread.
    ThreadSpawn(std::io::Error),
    /// Image decoding or encoding failure.
    Image(String),
}

impl fmt::Display for FluidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::OptionsParse(msg) => {
                write!(f, "options parse error: {msg}")
            }
            Self::Asset(msg) => write!(f, "asset error: {msg}"),
            Self::ThreadSpawn(e) => {
                write!(f, "failed to spawn thread: {e}")
            }
            Self::Image(msg) => write!(f, "image error: {msg}"),
        }
    }
}

impl std::error::Error for FluidError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) | Self::ThreadSpawn(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FluidError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
