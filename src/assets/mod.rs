//! Asset loading boundary: shader sources and texture images.
//!
//! Renderers only see [`AssetSource`]. Lookups that fail return `None` and
//! the caller degrades (skips the program or texture) after logging.

mod image;

use std::borrow::Cow;
use std::path::PathBuf;

use rust_embed::RustEmbed;
use rustc_hash::FxHashMap;

use crate::error::FluidError;

pub use self::image::Image;

/// A read-only store of named assets.
pub trait AssetSource {
    /// Raw bytes of the asset at `path`, or `None` if it does not exist.
    fn load_bytes(&self, path: &str) -> Option<Cow<'_, [u8]>>;

    /// UTF-8 text asset.
    fn load_text(&self, path: &str) -> Option<String> {
        let bytes = self.load_bytes(path)?;
        match std::str::from_utf8(&bytes) {
            Ok(text) => Some(text.to_owned()),
            Err(e) => {
                log::error!("asset {path} is not UTF-8: {e}");
                None
            }
        }
    }

    /// PNG image asset decoded to RGBA8.
    fn load_image(&self, path: &str) -> Option<Image> {
        let bytes = self.load_bytes(path)?;
        match Image::decode_png(&bytes) {
            Ok(image) => Some(image),
            Err(e) => {
                log::error!("asset {path}: {e}");
                None
            }
        }
    }
}

/// Shaders and textures compiled into the binary from `assets/`.
#[derive(RustEmbed)]
#[folder = "assets/"]
pub struct EmbeddedAssets;

impl AssetSource for EmbeddedAssets {
    fn load_bytes(&self, path: &str) -> Option<Cow<'_, [u8]>> {
        <Self as RustEmbed>::get(path).map(|file| file.data)
    }
}

/// Assets read from a directory on disk.
#[derive(Debug, Clone)]
pub struct DirectoryAssets {
    root: PathBuf,
}

impl DirectoryAssets {
    /// Resolve asset paths against `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Like [`DirectoryAssets::new`], but check that `root` is a directory.
    ///
    /// # Errors
    ///
    /// Returns [`FluidError::Asset`] if `root` is missing or not a directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, FluidError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(FluidError::Asset(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }
}

impl AssetSource for DirectoryAssets {
    fn load_bytes(&self, path: &str) -> Option<Cow<'_, [u8]>> {
        let full = self.root.join(path);
        match std::fs::read(&full) {
            Ok(bytes) => Some(Cow::Owned(bytes)),
            Err(e) => {
                log::debug!("{}: {e}", full.display());
                None
            }
        }
    }
}

/// In-memory assets, mostly for tests and hosts that ship their own data.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssets {
    files: FxHashMap<String, Vec<u8>>,
}

impl MemoryAssets {
    /// Store raw bytes under `path`.
    pub fn insert_bytes(&mut self, path: &str, bytes: Vec<u8>) {
        let _ = self.files.insert(path.to_owned(), bytes);
    }

    /// Store text under `path`.
    pub fn insert_text(&mut self, path: &str, text: &str) {
        self.insert_bytes(path, text.as_bytes().to_vec());
    }

    /// Store an image under `path`, PNG-encoded.
    pub fn insert_image(&mut self, path: &str, image: &Image) {
        let mut encoded = Vec::new();
        match image.write_png(&mut encoded) {
            Ok(()) => self.insert_bytes(path, encoded),
            Err(e) => log::error!("could not encode {path}: {e}"),
        }
    }

    /// Copy every file of another source under the given paths.
    pub fn with_files_from(
        mut self,
        source: &dyn AssetSource,
        paths: &[&str],
    ) -> Self {
        for path in paths {
            if let Some(bytes) = source.load_bytes(path) {
                self.insert_bytes(path, bytes.into_owned());
            }
        }
        self
    }
}

impl AssetSource for MemoryAssets {
    fn load_bytes(&self, path: &str) -> Option<Cow<'_, [u8]>> {
        self.files.get(path).map(|bytes| Cow::Borrowed(bytes.as_slice()))
    }
}
