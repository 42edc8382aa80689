//! Persisting finished images
//!
//! The reassembler hands each [`FinishedImage`] to an [`ImageSink`]. A failed
//! emission affects that one image only; callers log it and continue.
//!
//! # Example
//!
//! ```rust,ignore
//! use sat_imager_lib::emitter::{DirectorySink, ImageSink};
//!
//! let mut sink = DirectorySink::new("/tmp/pass")?;
//! for image in images {
//!     let path = sink.emit(&image)?;
//!     println!("saved {}", path.display());
//! }
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::reassembler::FinishedImage;

/// Extension of written image files
pub const IMAGE_EXTENSION: &str = "jpg";

/// Errors that can occur while emitting images.
#[derive(Error, Debug)]
pub enum EmitError {
    /// Output directory does not exist.
    #[error("output directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    /// Image file could not be written.
    #[error("failed to write {path}: {source}")]
    Io {
        /// File being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for emit operations.
pub type Result<T> = std::result::Result<T, EmitError>;

/// Destination for finished images
pub trait ImageSink {
    /// Persist one image and return where it went.
    ///
    /// # Errors
    ///
    /// Returns an `EmitError` if the image could not be stored.
    fn emit(&mut self, image: &FinishedImage) -> Result<PathBuf>;
}

/// Writes images as `<name>.jpg` files into a directory
#[derive(Debug, Clone)]
pub struct DirectorySink {
    out_dir: PathBuf,
}

impl DirectorySink {
    /// Create a sink for an existing directory.
    ///
    /// # Errors
    ///
    /// Returns `EmitError::DirectoryNotFound` if `out_dir` is not a directory.
    pub fn new(out_dir: impl Into<PathBuf>) -> Result<Self> {
        let out_dir = out_dir.into();
        if !out_dir.is_dir() {
            return Err(EmitError::DirectoryNotFound(out_dir));
        }
        Ok(Self { out_dir })
    }

    /// Directory images are written to
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Path an image with this name would be written to
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.out_dir.join(format!("{}.{}", name, IMAGE_EXTENSION))
    }
}

impl ImageSink for DirectorySink {
    fn emit(&mut self, image: &FinishedImage) -> Result<PathBuf> {
        let path = self.path_for(&image.name);
        std::fs::write(&path, &image.content).map_err(|source| EmitError::Io {
            path: path.clone(),
            source,
        })?;

        log::info!("{} saved ({} bytes)", path.display(), image.content.len());
        Ok(path)
    }
}

/// Keeps images in memory, for tests and library callers
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    images: Vec<FinishedImage>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Images emitted so far, in emission order
    pub fn images(&self) -> &[FinishedImage] {
        &self.images
    }

    /// Take the collected images
    pub fn into_images(self) -> Vec<FinishedImage> {
        self.images
    }
}

impl ImageSink for MemorySink {
    fn emit(&mut self, image: &FinishedImage) -> Result<PathBuf> {
        self.images.push(image.clone());
        Ok(PathBuf::from(format!("{}.{}", image.name, IMAGE_EXTENSION)))
    }
}
