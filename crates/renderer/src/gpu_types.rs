//! Data shared with shaders.
//!
//! These structures must match the GLSL declarations in `shaders/` exactly.
//! All of them are `#[repr(C)]` and `Pod` so they can be copied into uniform
//! buffers and push constants as raw bytes. std140 alignment is kept by
//! using only `vec4`/`mat4` sized members or explicit padding.

use bytemuck::{Pod, Zeroable};
use ember_core::MAX_CASCADES;
use ember_scene::{CascadeData, SunLight};
use glam::{Mat4, UVec4, Vec4};

/// Per-frame scene data bound at set 0, binding 0.
///
/// # Memory Layout
///
/// - Offset 0: view matrix (64 bytes)
/// - Offset 64: projection matrix (64 bytes)
/// - Offset 128: view-projection matrix (64 bytes)
/// - Offset 192: ambient color (16 bytes)
/// - Offset 208: sun direction, power in `w` (16 bytes)
/// - Offset 224: sun color (16 bytes)
/// - Offset 240: cascade light matrices (4 x 64 bytes)
/// - Offset 496: cascade far split distances (16 bytes)
/// - Offset 512: shadow mode, cascade count, padding (16 bytes)
/// - Total size: 528 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuSceneData {
    pub view: Mat4,
    pub proj: Mat4,
    pub viewproj: Mat4,
    pub ambient_color: Vec4,
    pub sunlight_direction: Vec4,
    pub sunlight_color: Vec4,
    pub light_matrices: [Mat4; MAX_CASCADES as usize],
    pub cascade_splits: Vec4,
    /// `x` = shadow mode, `y` = active cascade count
    pub shadow_params: UVec4,
}

impl Default for GpuSceneData {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl GpuSceneData {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Camera matrices, sun and cascades packed for upload.
    pub fn new(
        view: Mat4,
        proj: Mat4,
        sun: &SunLight,
        cascades: &CascadeData,
        shadow_mode: u32,
        active_cascades: u32,
    ) -> Self {
        Self {
            view,
            proj,
            viewproj: proj * view,
            ambient_color: sun.ambient_rgba(),
            sunlight_direction: sun.direction_and_power(),
            sunlight_color: sun.color_rgba(),
            light_matrices: cascades.light_matrices,
            cascade_splits: cascades.splits_vec4(),
            shadow_params: UVec4::new(shadow_mode, active_cascades, 0, 0),
        }
    }
}

/// Per-draw push constants shared by the mesh and shadow pipelines.
///
/// # Memory Layout
///
/// - Offset 0: world matrix (64 bytes)
/// - Offset 64: vertex buffer device address (8 bytes)
/// - Offset 72: cascade index (4 bytes)
/// - Offset 76: padding (4 bytes)
/// - Total size: 80 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct GpuDrawPushConstants {
    pub world_matrix: Mat4,
    pub vertex_buffer: u64,
    /// Which light matrix the shadow vertex shader uses
    pub cascade_index: u32,
    pub _padding: u32,
}

impl GpuDrawPushConstants {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(world_matrix: Mat4, vertex_buffer: u64) -> Self {
        Self {
            world_matrix,
            vertex_buffer,
            ..Default::default()
        }
    }

    pub fn with_cascade(mut self, cascade_index: u32) -> Self {
        self.cascade_index = cascade_index;
        self
    }
}

/// Four free-form vectors passed to compute effects.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ComputePushConstants {
    pub data1: Vec4,
    pub data2: Vec4,
    pub data3: Vec4,
    pub data4: Vec4,
}

impl ComputePushConstants {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// Per-material constants bound at set 2, binding 0.
///
/// # Memory Layout
///
/// - Offset 0: base color factor (16 bytes)
/// - Offset 16: metallic in `x`, roughness in `y` (16 bytes)
/// - Offset 32: bindless ids of albedo, normal and metal-rough textures (16 bytes)
/// - Offset 48: padding to 256 bytes for uniform offset alignment
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct MaterialConstants {
    pub color_factors: Vec4,
    pub metal_rough_factors: Vec4,
    pub texture_ids: UVec4,
    pub _padding: [Vec4; 13],
}

impl Default for MaterialConstants {
    fn default() -> Self {
        Self {
            color_factors: Vec4::ONE,
            metal_rough_factors: Vec4::new(1.0, 1.0, 0.0, 0.0),
            texture_ids: UVec4::new(
                crate::bindless::WHITE_SLOT,
                crate::bindless::NORMAL_SLOT,
                crate::bindless::WHITE_SLOT,
                0,
            ),
            _padding: [Vec4::ZERO; 13],
        }
    }
}

impl MaterialConstants {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn test_scene_data_layout() {
        assert_eq!(GpuSceneData::SIZE, 528);
        assert_eq!(offset_of!(GpuSceneData, ambient_color), 192);
        assert_eq!(offset_of!(GpuSceneData, light_matrices), 240);
        assert_eq!(offset_of!(GpuSceneData, cascade_splits), 496);
        assert_eq!(offset_of!(GpuSceneData, shadow_params), 512);
    }

    #[test]
    fn test_draw_push_constants_layout() {
        assert_eq!(GpuDrawPushConstants::SIZE, 80);
        assert_eq!(offset_of!(GpuDrawPushConstants, vertex_buffer), 64);
        assert_eq!(offset_of!(GpuDrawPushConstants, cascade_index), 72);
        // Vulkan guarantees at least 128 bytes of push constants.
        assert!(GpuDrawPushConstants::SIZE <= 128);
    }

    #[test]
    fn test_compute_push_constants_size() {
        assert_eq!(ComputePushConstants::SIZE, 64);
    }

    #[test]
    fn test_material_constants_fill_alignment_block() {
        assert_eq!(MaterialConstants::SIZE, 256);
        assert_eq!(offset_of!(MaterialConstants, texture_ids), 32);
    }

    #[test]
    fn test_scene_data_viewproj() {
        let view = Mat4::from_translation(glam::Vec3::new(0.0, 0.0, -3.0));
        let proj = Mat4::from_scale(glam::Vec3::splat(2.0));
        let data = GpuSceneData::new(
            view,
            proj,
            &SunLight::default(),
            &CascadeData::default(),
            3,
            4,
        );
        assert_eq!(data.viewproj, proj * view);
        assert_eq!(data.shadow_params, UVec4::new(3, 4, 0, 0));
    }

    #[test]
    fn test_cascade_index_builder() {
        let pc = GpuDrawPushConstants::new(Mat4::IDENTITY, 0xdead_beef).with_cascade(2);
        assert_eq!(pc.cascade_index, 2);
        assert_eq!(pc.vertex_buffer, 0xdead_beef);
    }
}
