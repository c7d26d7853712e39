//! Full-screen compute effects.
//!
//! The background pass fills the draw image with one of several compute
//! effects before geometry is drawn. Effects share a pipeline layout: set 0
//! holds the draw image as a storage image, and [`ComputePushConstants`]
//! carries the effect parameters.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use ember_rhi::RhiResult;
use ember_rhi::command::{COMPUTE_WORKGROUP_SIZE, CommandBuffer, dispatch_groups};
use ember_rhi::device::Device;
use ember_rhi::pipeline::{Pipeline, PipelineLayout, push_constant_range};
use ember_rhi::shader::{Shader, ShaderStage};
use glam::Vec4;
use tracing::{debug, info};

use crate::gpu_types::ComputePushConstants;

/// One compute pipeline plus the parameters it is dispatched with.
pub struct ComputeEffect {
    pub name: String,
    pub pipeline: Pipeline,
    pub data: ComputePushConstants,
}

/// Layout for compute passes: one storage-image set plus push constants.
pub fn compute_layout(
    device: Arc<Device>,
    set_layout: vk::DescriptorSetLayout,
) -> RhiResult<PipelineLayout> {
    let push_ranges = [push_constant_range(
        vk::ShaderStageFlags::COMPUTE,
        ComputePushConstants::SIZE,
    )];
    PipelineLayout::new(device, &[set_layout], &push_ranges)
}

/// Loads `path` as a compute shader and builds its pipeline against `layout`.
pub fn load_compute_pipeline(
    device: &Arc<Device>,
    path: &Path,
    layout: &PipelineLayout,
) -> RhiResult<Pipeline> {
    let shader = Shader::from_spirv_file(device.clone(), path, ShaderStage::Compute)?;
    Pipeline::create_compute(device.clone(), &shader, layout)
}

/// Records a dispatch covering `extent` in [`COMPUTE_WORKGROUP_SIZE`] tiles.
pub fn dispatch_effect(
    cmd: &CommandBuffer,
    pipeline: &Pipeline,
    layout: &PipelineLayout,
    set: vk::DescriptorSet,
    data: &ComputePushConstants,
    extent: vk::Extent2D,
) {
    cmd.bind_pipeline(vk::PipelineBindPoint::COMPUTE, pipeline.handle());
    cmd.bind_descriptor_sets(vk::PipelineBindPoint::COMPUTE, layout.handle(), 0, &[set]);
    cmd.push_constants(layout.handle(), vk::ShaderStageFlags::COMPUTE, data);
    let (x, y) = dispatch_groups(extent, COMPUTE_WORKGROUP_SIZE);
    cmd.dispatch(x, y, 1);
}

/// The selectable background effects.
pub struct BackgroundEffects {
    effects: Vec<ComputeEffect>,
    current: usize,
    layout: PipelineLayout,
}

impl BackgroundEffects {
    /// Builds the gradient and sky effects from `shader_dir`.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `shader_dir` - Directory holding `gradient.comp.spv` and `sky.comp.spv`
    /// * `image_layout` - Layout of the set holding the draw image
    /// * `top`/`bottom` - Gradient colors
    pub fn new(
        device: &Arc<Device>,
        shader_dir: &Path,
        image_layout: vk::DescriptorSetLayout,
        top: Vec4,
        bottom: Vec4,
    ) -> RhiResult<Self> {
        let layout = compute_layout(device.clone(), image_layout)?;

        let gradient = ComputeEffect {
            name: "gradient".to_string(),
            pipeline: load_compute_pipeline(device, &shader_dir.join("gradient.comp.spv"), &layout)?,
            data: ComputePushConstants {
                data1: top,
                data2: bottom,
                ..Default::default()
            },
        };
        let sky = ComputeEffect {
            name: "sky".to_string(),
            pipeline: load_compute_pipeline(device, &shader_dir.join("sky.comp.spv"), &layout)?,
            data: ComputePushConstants {
                data1: Vec4::new(0.1, 0.2, 0.4, 0.97),
                ..Default::default()
            },
        };

        info!("Background effects ready: gradient, sky");
        Ok(Self {
            effects: vec![gradient, sky],
            current: 0,
            layout,
        })
    }

    pub fn current(&self) -> &ComputeEffect {
        &self.effects[self.current]
    }

    pub fn current_mut(&mut self) -> &mut ComputeEffect {
        &mut self.effects[self.current]
    }

    /// Selects effect `index`, wrapping around the list.
    pub fn select(&mut self, index: usize) {
        self.current = index % self.effects.len();
        debug!("Background effect: {}", self.effects[self.current].name);
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Fills the draw image (in `GENERAL` layout) with the current effect.
    pub fn record(&self, cmd: &CommandBuffer, image_set: vk::DescriptorSet, extent: vk::Extent2D) {
        let effect = self.current();
        dispatch_effect(cmd, &effect.pipeline, &self.layout, image_set, &effect.data, extent);
    }
}
