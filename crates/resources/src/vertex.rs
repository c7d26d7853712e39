//! Vertex format shared by the loader and the mesh shaders.
//!
//! Meshes are fetched in the vertex shader through a buffer device address
//! rather than fixed-function vertex input, so the layout only has to match
//! the shader-side struct. UVs are split across the padding slots after the
//! two `vec3` fields to keep the struct at 48 bytes with 16-byte alignment of
//! every `vec4`-sized group.
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0      | 12   | position |
//! | 12     | 4    | uv_x |
//! | 16     | 12   | normal |
//! | 28     | 4    | uv_y |
//! | 32     | 16   | color |

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};

/// Mesh vertex.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub uv_x: f32,
    pub normal: Vec3,
    pub uv_y: f32,
    pub color: Vec4,
}

impl Default for Vertex {
    /// Origin, normal along +X, zero UV, white.
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            uv_x: 0.0,
            normal: Vec3::X,
            uv_y: 0.0,
            color: Vec4::ONE,
        }
    }
}

impl Vertex {
    #[inline]
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    #[inline]
    pub fn uv(&self) -> Vec2 {
        Vec2::new(self.uv_x, self.uv_y)
    }

    #[inline]
    pub fn set_uv(&mut self, uv: Vec2) {
        self.uv_x = uv.x;
        self.uv_y = uv.y;
    }

    /// Size of one vertex in bytes.
    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout() {
        assert_eq!(Vertex::size(), 48);
        assert_eq!(std::mem::offset_of!(Vertex, uv_x), 12);
        assert_eq!(std::mem::offset_of!(Vertex, normal), 16);
        assert_eq!(std::mem::offset_of!(Vertex, uv_y), 28);
        assert_eq!(std::mem::offset_of!(Vertex, color), 32);
    }

    #[test]
    fn test_vertex_defaults() {
        let v = Vertex::new(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(v.normal, Vec3::X);
        assert_eq!(v.uv(), Vec2::ZERO);
        assert_eq!(v.color, Vec4::ONE);
    }

    #[test]
    fn test_vertex_bytes() {
        let vertices = [Vertex::default(); 2];
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), 96);
    }
}
