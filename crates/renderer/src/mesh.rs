//! GPU-resident meshes.
//!
//! A mesh lives in a single device-local buffer: vertices first, indices
//! right after. Shaders pull vertices through the buffer's device address, so
//! no vertex input bindings are involved.

use std::rc::Rc;

use ash::vk;
use ember_resources::Vertex;
use ember_rhi::buffer::Buffer;
use ember_scene::{GeoSurface, MeshAsset};

use crate::material::MaterialInstance;

/// Byte layout of a combined vertex+index buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeshLayout {
    pub vertex_bytes: vk::DeviceSize,
    pub index_bytes: vk::DeviceSize,
}

impl MeshLayout {
    pub fn new(vertex_count: usize, index_count: usize) -> Self {
        Self {
            vertex_bytes: (vertex_count * Vertex::size()) as vk::DeviceSize,
            index_bytes: (index_count * std::mem::size_of::<u32>()) as vk::DeviceSize,
        }
    }

    /// Offset of the first index in the buffer.
    #[inline]
    pub fn index_offset(&self) -> vk::DeviceSize {
        self.vertex_bytes
    }

    #[inline]
    pub fn total_bytes(&self) -> vk::DeviceSize {
        self.vertex_bytes + self.index_bytes
    }
}

/// Vertex and index data uploaded to the GPU.
pub struct GpuMeshBuffers {
    pub buffer: Buffer,
    /// Device address of the first vertex
    pub vertex_address: vk::DeviceAddress,
    /// Byte offset of the index data within `buffer`
    pub index_offset: vk::DeviceSize,
}

/// A named mesh with its surfaces, shared by scene nodes.
pub struct MeshAssetGpu {
    pub name: String,
    pub surfaces: Vec<GeoSurface<Rc<MaterialInstance>>>,
    pub buffers: GpuMeshBuffers,
}

impl MeshAsset for MeshAssetGpu {
    type Material = Rc<MaterialInstance>;

    fn surfaces(&self) -> &[GeoSurface<Rc<MaterialInstance>>] {
        &self.surfaces
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_follow_vertices() {
        let layout = MeshLayout::new(4, 6);
        assert_eq!(layout.vertex_bytes, 4 * 48);
        assert_eq!(layout.index_offset(), 192);
        assert_eq!(layout.index_bytes, 24);
        assert_eq!(layout.total_bytes(), 216);
    }

    #[test]
    fn test_empty_mesh_layout() {
        let layout = MeshLayout::new(0, 0);
        assert_eq!(layout.total_bytes(), 0);
    }
}
