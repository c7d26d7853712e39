//! Resource loading and management.
//!
//! This crate handles the CPU side of asset loading:
//! - glTF scene import
//! - Mesh vertex format
//! - Built-in texture pixels
//!
//! GPU upload lives in the renderer, which consumes a [`LoadedScene`].

pub mod defaults;
pub mod error;
pub mod gltf_loader;
pub mod vertex;

pub use defaults::ImageData;
pub use error::{ResourceError, ResourceResult};
pub use gltf_loader::{LoadedScene, MaterialData, MeshData, NodeData, SamplerInfo, load_gltf};
pub use vertex::Vertex;
