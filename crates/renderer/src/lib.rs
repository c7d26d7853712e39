//! Main rendering pipeline.
//!
//! This crate turns a scene into frames:
//! - Frame slots and the acquire/submit/present loop
//! - Material templates and instances over a bindless texture array
//! - Cascaded shadow, background compute and postprocess passes
//! - Mesh, texture and glTF scene upload
//!
//! [`Engine`] owns all of it and is the entry point for applications.

pub mod bindless;
pub mod compute;
pub mod defaults;
pub mod engine;
pub mod error;
pub mod frame;
pub mod frame_manager;
pub mod gpu_types;
pub mod material;
pub mod mesh;
pub mod postprocess;
pub mod scene_loader;
pub mod shadow;
pub mod stats;
pub mod upload;

pub use engine::Engine;
pub use error::{RendererError, RendererResult};
pub use frame::{FRAME_OVERLAP, FrameData};
pub use frame_manager::FrameManager;
pub use material::{MaterialInstance, MaterialSystem, MaterialTemplate};
pub use mesh::{GpuMeshBuffers, MeshAssetGpu};
pub use scene_loader::GpuScene;
pub use stats::EngineStats;
