//! Texture samplers.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Sampler creation parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub mipmap_mode: vk::SamplerMipmapMode,
    pub address_mode: vk::SamplerAddressMode,
    pub border_color: vk::BorderColor,
}

impl SamplerDesc {
    /// Same filter for magnification and minification.
    pub fn new(filter: vk::Filter, address_mode: vk::SamplerAddressMode) -> Self {
        let mipmap_mode = match filter {
            vk::Filter::NEAREST => vk::SamplerMipmapMode::NEAREST,
            _ => vk::SamplerMipmapMode::LINEAR,
        };
        Self {
            mag_filter: filter,
            min_filter: filter,
            mipmap_mode,
            address_mode,
            border_color: vk::BorderColor::FLOAT_OPAQUE_WHITE,
        }
    }
}

/// Sampler with automatic cleanup.
pub struct Sampler {
    device: Arc<Device>,
    sampler: vk::Sampler,
}

impl Sampler {
    pub fn new(device: Arc<Device>, desc: &SamplerDesc) -> RhiResult<Self> {
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(desc.mag_filter)
            .min_filter(desc.min_filter)
            .mipmap_mode(desc.mipmap_mode)
            .address_mode_u(desc.address_mode)
            .address_mode_v(desc.address_mode)
            .address_mode_w(desc.address_mode)
            .border_color(desc.border_color)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE);

        let sampler = unsafe { device.handle().create_sampler(&create_info, None)? };
        debug!(
            "Created sampler: {:?}/{:?} {:?}",
            desc.mag_filter, desc.min_filter, desc.address_mode
        );
        Ok(Self { device, sampler })
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_sampler(self.sampler, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_uses_nearest_mipmaps() {
        let desc = SamplerDesc::new(vk::Filter::NEAREST, vk::SamplerAddressMode::REPEAT);
        assert_eq!(desc.mipmap_mode, vk::SamplerMipmapMode::NEAREST);
        assert_eq!(desc.min_filter, vk::Filter::NEAREST);
    }

    #[test]
    fn test_clamp_to_border_defaults_white() {
        let desc = SamplerDesc::new(
            vk::Filter::LINEAR,
            vk::SamplerAddressMode::CLAMP_TO_BORDER,
        );
        assert_eq!(desc.border_color, vk::BorderColor::FLOAT_OPAQUE_WHITE);
        assert_eq!(desc.mipmap_mode, vk::SamplerMipmapMode::LINEAR);
    }
}
