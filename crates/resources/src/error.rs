//! Error types for resource loading.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for resource loading operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// Failed to parse or read a glTF file.
    #[error("Failed to load glTF file '{path}': {source}")]
    Gltf {
        /// Path to the file that failed to load.
        path: PathBuf,
        #[source]
        source: gltf::Error,
    },

    /// A mesh primitive has no position data.
    #[error("Mesh '{0}' has a primitive without positions")]
    NoPositionData(String),

    /// Image decode error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// An embedded `data:` image could not be decoded.
    #[error("Embedded image error: {0}")]
    EmbeddedImage(#[source] gltf::Error),

    /// Image source the loader cannot read.
    #[error("Unsupported image source: {0}")]
    UnsupportedImageSource(String),

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;

impl From<ResourceError> for ember_core::Error {
    fn from(err: ResourceError) -> Self {
        ember_core::Error::Resource(err.to_string())
    }
}
