//! Built-in textures and samplers.
//!
//! Materials fall back to these whenever a texture slot is empty, and the
//! checkerboard stands in for images that failed to load.

use std::sync::Arc;

use ash::vk;
use ember_resources::ImageData;
use ember_resources::defaults::{BLACK, FLAT_NORMAL, WHITE};
use ember_rhi::RhiResult;
use ember_rhi::device::Device;
use ember_rhi::image::AllocatedImage;
use ember_rhi::immediate::ImmediateSubmit;
use ember_rhi::sampler::{Sampler, SamplerDesc};
use tracing::info;

use crate::upload::upload_image;

/// Engine-wide fallback images and samplers.
pub struct DefaultResources {
    pub white: AllocatedImage,
    pub black: AllocatedImage,
    pub normal: AllocatedImage,
    pub checkerboard: AllocatedImage,
    pub linear: Sampler,
    pub nearest: Sampler,
    /// Clamps to an opaque white border so lookups outside the shadow map
    /// read as lit.
    pub shadow: Sampler,
}

impl DefaultResources {
    pub fn new(device: &Arc<Device>, immediate: &ImmediateSubmit) -> RhiResult<Self> {
        let format = vk::Format::R8G8B8A8_UNORM;
        let white = upload_image(device, immediate, &ImageData::solid(WHITE), format, false, "default white")?;
        let black = upload_image(device, immediate, &ImageData::solid(BLACK), format, false, "default black")?;
        let normal = upload_image(
            device,
            immediate,
            &ImageData::solid(FLAT_NORMAL),
            format,
            false,
            "default normal",
        )?;
        let checkerboard = upload_image(
            device,
            immediate,
            &ImageData::checkerboard(),
            format,
            false,
            "error checkerboard",
        )?;

        let linear = Sampler::new(
            device.clone(),
            &SamplerDesc::new(vk::Filter::LINEAR, vk::SamplerAddressMode::REPEAT),
        )?;
        let nearest = Sampler::new(
            device.clone(),
            &SamplerDesc::new(vk::Filter::NEAREST, vk::SamplerAddressMode::REPEAT),
        )?;
        let shadow = Sampler::new(
            device.clone(),
            &SamplerDesc::new(vk::Filter::LINEAR, vk::SamplerAddressMode::CLAMP_TO_BORDER),
        )?;

        info!("Default textures and samplers created");

        Ok(Self {
            white,
            black,
            normal,
            checkerboard,
            linear,
            nearest,
            shadow,
        })
    }
}
