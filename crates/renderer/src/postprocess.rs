//! Ping-pong postprocess chain.
//!
//! Two storage images take turns as input and output. Set 0 reads the draw
//! image and writes the postprocess image; set 1 does the reverse. Pass `i`
//! binds set `i % 2`, so after an odd number of passes the result sits in the
//! postprocess image and is copied back, because the swapchain blit always
//! reads the draw image.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use ember_rhi::RhiResult;
use ember_rhi::command::CommandBuffer;
use ember_rhi::descriptor::{DescriptorAllocatorGrowable, DescriptorWriter};
use ember_rhi::device::Device;
use ember_rhi::image::{AllocatedImage, copy_image_to_image, transition_image};
use ember_rhi::pipeline::{Pipeline, PipelineLayout};
use tracing::info;

use crate::compute::{compute_layout, dispatch_effect, load_compute_pipeline};
use crate::gpu_types::ComputePushConstants;

/// Image holding the output of the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainImage {
    Draw,
    Postprocess,
}

/// Descriptor set used by pass `pass`.
#[inline]
pub fn set_for_pass(pass: usize) -> usize {
    pass % 2
}

/// A named postprocess compute pass.
pub struct PostprocessPass {
    pub name: String,
    pub pipeline: Pipeline,
    pub data: ComputePushConstants,
}

/// The ordered chain of passes and the two sets they alternate between.
pub struct PostprocessChain {
    passes: Vec<PostprocessPass>,
    sets: [vk::DescriptorSet; 2],
    layout: PipelineLayout,
    device: Arc<Device>,
}

impl PostprocessChain {
    /// Image holding the result after `pass_count` passes.
    pub fn final_image(pass_count: usize) -> ChainImage {
        if pass_count % 2 == 1 {
            ChainImage::Postprocess
        } else {
            ChainImage::Draw
        }
    }

    /// Loads one compute pipeline per entry of `pass_names` from
    /// `shader_dir`, in order.
    ///
    /// # Arguments
    ///
    /// * `set_layout` - Two storage-image bindings: 0 input, 1 output
    /// * `allocator` - Long-lived allocator for the two sets
    pub fn new(
        device: &Arc<Device>,
        shader_dir: &Path,
        pass_names: &[String],
        set_layout: vk::DescriptorSetLayout,
        allocator: &mut DescriptorAllocatorGrowable,
    ) -> RhiResult<Self> {
        let layout = compute_layout(device.clone(), set_layout)?;
        let sets = [allocator.allocate(set_layout)?, allocator.allocate(set_layout)?];

        let passes = pass_names
            .iter()
            .map(|name| {
                let pipeline = load_compute_pipeline(device, &shader_dir.join(name), &layout)?;
                Ok(PostprocessPass {
                    name: name.clone(),
                    pipeline,
                    data: ComputePushConstants::default(),
                })
            })
            .collect::<RhiResult<Vec<_>>>()?;

        if !passes.is_empty() {
            info!("Postprocess chain: {:?}", pass_names);
        }

        Ok(Self {
            passes,
            sets,
            layout,
            device: device.clone(),
        })
    }

    /// Points both sets at the current draw and postprocess images. Called at
    /// startup and after every resize.
    pub fn bind_images(&self, draw: vk::ImageView, postprocess: vk::ImageView) {
        let pairs = [(draw, postprocess), (postprocess, draw)];
        for (set, (input, output)) in self.sets.iter().zip(pairs) {
            let mut writer = DescriptorWriter::new();
            writer.write_image(
                0,
                input,
                vk::Sampler::null(),
                vk::ImageLayout::GENERAL,
                vk::DescriptorType::STORAGE_IMAGE,
            );
            writer.write_image(
                1,
                output,
                vk::Sampler::null(),
                vk::ImageLayout::GENERAL,
                vk::DescriptorType::STORAGE_IMAGE,
            );
            writer.update_set(&self.device, *set);
        }
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Runs every pass. Both images must be in `GENERAL`; the draw image is
    /// left in `GENERAL` holding the result.
    pub fn record(
        &self,
        cmd: &CommandBuffer,
        draw: &AllocatedImage,
        postprocess: &AllocatedImage,
        extent: vk::Extent2D,
    ) {
        for (i, pass) in self.passes.iter().enumerate() {
            let set = self.sets[set_for_pass(i)];
            dispatch_effect(cmd, &pass.pipeline, &self.layout, set, &pass.data, extent);
            // The next pass reads what this one wrote.
            for image in [draw, postprocess] {
                transition_image(
                    &self.device,
                    cmd.handle(),
                    image.handle(),
                    vk::ImageLayout::GENERAL,
                    vk::ImageLayout::GENERAL,
                );
            }
        }

        if Self::final_image(self.passes.len()) == ChainImage::Postprocess {
            let device = &self.device;
            transition_image(
                device,
                cmd.handle(),
                postprocess.handle(),
                vk::ImageLayout::GENERAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            );
            transition_image(
                device,
                cmd.handle(),
                draw.handle(),
                vk::ImageLayout::GENERAL,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );
            copy_image_to_image(
                device,
                cmd.handle(),
                postprocess.handle(),
                draw.handle(),
                extent,
                extent,
            );
            transition_image(
                device,
                cmd.handle(),
                draw.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::GENERAL,
            );
        }
    }
}
