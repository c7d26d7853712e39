//! Scene graph and components.
//!
//! This crate provides the CPU side of a frame:
//! - Node hierarchy producing render objects
//! - Free-fly camera
//! - Sun light and cascaded shadow fitting
//! - Frustum culling and draw ordering
//!
//! Nothing here touches the GPU. The renderer plugs its mesh and material
//! types in through [`MeshAsset`] and [`SurfaceMaterial`].

pub mod camera;
pub mod cascade;
pub mod frustum;
pub mod light;
pub mod node;
pub mod render_object;
pub mod transform;

pub use camera::{Camera, MoveInput};
pub use cascade::{CascadeData, CascadeParams, CascadeView, compute_cascades};
pub use frustum::{Frustum, Plane};
pub use light::SunLight;
pub use node::{Node, NodeRef};
pub use render_object::{
    Bounds, DrawContext, GeoSurface, MaterialPass, MeshAsset, RenderObject, SurfaceMaterial,
    draw_order, sort_for_submission,
};
pub use transform::Transform;
