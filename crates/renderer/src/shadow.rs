//! Cascaded shadow map pass.
//!
//! The shadow map is a layered `D32_SFLOAT` image with a layer for each of
//! the [`MAX_CASCADES`] possible cascades. Each active cascade renders every object depth-only into its own
//! layer, selecting its light matrix through the push-constant cascade index.
//! Front faces are culled and a depth bias is applied against acne.
//!
//! The map is always left in `DEPTH_STENCIL_READ_ONLY_OPTIMAL`, even when no
//! cascade is rendered, so the geometry pass can sample it unconditionally.

use std::sync::Arc;

use ash::vk;
use ember_core::{MAX_CASCADES, ShadowMode};
use ember_rhi::command::CommandBuffer;
use ember_rhi::device::Device;
use ember_rhi::image::{AllocatedImage, ImageDesc, transition_image};
use ember_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout, push_constant_range};
use ember_rhi::rendering::{DepthAttachment, RenderingConfig};
use ember_rhi::shader::Shader;
use ember_rhi::{RhiError, RhiResult};
use ember_scene::RenderObject;
use tracing::{debug, info};

use crate::gpu_types::GpuDrawPushConstants;
use crate::mesh::MeshAssetGpu;

pub const SHADOW_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Constant and slope depth bias of the shadow pipeline.
const DEPTH_BIAS: (f32, f32) = (1.25, 1.75);

/// Creation-time shadow parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowConfig {
    pub mode: ShadowMode,
    pub cascade_count: u32,
    pub resolution: u32,
}

impl ShadowConfig {
    /// Cascades rendered and sampled each frame.
    pub fn active_cascades(&self) -> u32 {
        self.mode.active_cascades(self.cascade_count.min(MAX_CASCADES))
    }
}

/// Image description of the layered shadow map. All [`MAX_CASCADES`] layers
/// are allocated so shaders always see an array view.
pub fn shadow_map_desc(resolution: u32) -> ImageDesc {
    ImageDesc::new(
        vk::Extent3D {
            width: resolution,
            height: resolution,
            depth: 1,
        },
        SHADOW_FORMAT,
        vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
    )
    .layers(MAX_CASCADES)
}

/// Shadow map plus the depth-only pipeline that fills it.
pub struct ShadowPass {
    pipeline: Pipeline,
    layout: PipelineLayout,
    map: AllocatedImage,
    config: ShadowConfig,
    device: Arc<Device>,
}

impl ShadowPass {
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `vertex` - Shadow vertex shader
    /// * `scene_layout` - Layout of the per-frame scene set
    /// * `config` - Mode, cascade count and resolution
    pub fn new(
        device: Arc<Device>,
        vertex: &Shader,
        scene_layout: vk::DescriptorSetLayout,
        config: ShadowConfig,
    ) -> RhiResult<Self> {
        let mut map = AllocatedImage::new(device.clone(), &shadow_map_desc(config.resolution), "shadow map")?;
        map.create_layer_views()?;

        let push_ranges = [push_constant_range(
            vk::ShaderStageFlags::VERTEX,
            GpuDrawPushConstants::SIZE,
        )];
        let layout = PipelineLayout::new(device.clone(), &[scene_layout], &push_ranges)?;

        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(vertex)
            .cull_mode(vk::CullModeFlags::FRONT, vk::FrontFace::CLOCKWISE)
            .depth_test(true, vk::CompareOp::LESS_OR_EQUAL)
            .depth_bias(DEPTH_BIAS.0, DEPTH_BIAS.1)
            .depth_attachment_format(SHADOW_FORMAT)
            .build(device.clone(), &layout)?;

        info!(
            "Shadow pass: {:?}, {} cascade(s) at {}x{}",
            config.mode,
            config.active_cascades(),
            config.resolution,
            config.resolution
        );

        Ok(Self {
            pipeline,
            layout,
            map,
            config,
            device,
        })
    }

    #[inline]
    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    pub fn set_mode(&mut self, mode: ShadowMode) {
        debug!("Shadow mode {:?} -> {:?}", self.config.mode, mode);
        self.config.mode = mode;
    }

    /// Array view over every cascade layer, for sampling.
    #[inline]
    pub fn map_view(&self) -> vk::ImageView {
        self.map.view()
    }

    /// Records every active cascade.
    ///
    /// # Arguments
    ///
    /// * `cmd` - Command buffer of the current frame
    /// * `scene_set` - Per-frame scene set with the light matrices
    /// * `objects` - All render objects; casters are not camera-culled
    ///
    /// # Errors
    ///
    /// Returns an error if a cascade layer has no view.
    pub fn record(
        &self,
        cmd: &CommandBuffer,
        scene_set: vk::DescriptorSet,
        objects: &[RenderObject<MeshAssetGpu>],
    ) -> RhiResult<()> {
        transition_image(
            &self.device,
            cmd.handle(),
            self.map.handle(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        );

        let extent = self.map.extent_2d();
        for cascade in 0..self.config.active_cascades() {
            let view = self.map.layer_view(cascade).ok_or_else(|| {
                RhiError::InvalidHandle(format!("Shadow map has no view for layer {}", cascade))
            })?;
            let bundle = RenderingConfig::new(extent)
                .with_depth(DepthAttachment::new(view).with_clear_depth(1.0))
                .build();

            cmd.begin_rendering(&bundle.info());
            cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle());
            cmd.bind_descriptor_sets(
                vk::PipelineBindPoint::GRAPHICS,
                self.layout.handle(),
                0,
                &[scene_set],
            );
            cmd.set_viewport(extent);
            cmd.set_scissor(extent);

            let mut last_index_buffer = vk::Buffer::null();
            for object in objects {
                let buffers = &object.mesh.buffers;
                if buffers.buffer.handle() != last_index_buffer {
                    last_index_buffer = buffers.buffer.handle();
                    cmd.bind_index_buffer(last_index_buffer, buffers.index_offset);
                }
                let push = GpuDrawPushConstants::new(object.transform, buffers.vertex_address)
                    .with_cascade(cascade);
                cmd.push_constants(self.layout.handle(), vk::ShaderStageFlags::VERTEX, &push);
                cmd.draw_indexed(object.index_count, object.first_index);
            }
            cmd.end_rendering();
        }

        transition_image(
            &self.device,
            cmd.handle(),
            self.map.handle(),
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: ShadowMode, cascade_count: u32) -> ShadowConfig {
        ShadowConfig {
            mode,
            cascade_count,
            resolution: 2048,
        }
    }

    #[test]
    fn test_active_cascades_per_mode() {
        assert_eq!(config(ShadowMode::Off, 4).active_cascades(), 0);
        assert_eq!(config(ShadowMode::Simple, 4).active_cascades(), 1);
        assert_eq!(config(ShadowMode::Pcf, 4).active_cascades(), 1);
        assert_eq!(config(ShadowMode::Csm, 4).active_cascades(), 4);
        assert_eq!(config(ShadowMode::Csm, 3).active_cascades(), 3);
    }

    #[test]
    fn test_cascade_count_capped() {
        assert_eq!(config(ShadowMode::Csm, 9).active_cascades(), MAX_CASCADES);
    }

    #[test]
    fn test_shadow_map_desc() {
        let desc = shadow_map_desc(1024);
        assert_eq!(desc.format, vk::Format::D32_SFLOAT);
        assert_eq!(desc.array_layers, MAX_CASCADES);
        assert_eq!(desc.mip_levels, 1);
        assert_eq!(desc.extent.width, 1024);
        assert!(desc.usage.contains(vk::ImageUsageFlags::SAMPLED));
        assert!(desc.usage.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT));
    }
}
