//! Device-local images and image command helpers.
//!
//! # Overview
//!
//! - [`AllocatedImage`] owns a `VkImage`, its default view, optional per-layer
//!   views and the gpu-allocator memory behind them
//! - [`transition_image`] records a full-resource layout transition
//! - [`copy_image_to_image`] blits between two images of any size
//! - [`generate_mipmaps`] fills the mip chain of a freshly uploaded texture
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use ember_rhi::device::Device;
//! use ember_rhi::image::{AllocatedImage, ImageDesc};
//!
//! # fn example(device: Arc<Device>) -> ember_rhi::RhiResult<()> {
//! let depth = AllocatedImage::new(
//!     device,
//!     &ImageDesc::new(
//!         vk::Extent3D { width: 1280, height: 720, depth: 1 },
//!         vk::Format::D32_SFLOAT,
//!         vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
//!     ),
//!     "depth",
//! )?;
//! assert_eq!(depth.format(), vk::Format::D32_SFLOAT);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Number of mip levels for a full chain down to 1×1.
#[inline]
pub fn mip_levels(width: u32, height: u32) -> u32 {
    width.max(height).max(1).ilog2() + 1
}

/// Aspect implied by a format.
#[inline]
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Aspect a transition barrier targets, chosen from the destination layout.
#[inline]
pub fn aspect_for_layout(new_layout: vk::ImageLayout) -> vk::ImageAspectFlags {
    match new_layout {
        vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
        | vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL => vk::ImageAspectFlags::DEPTH,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Image creation parameters.
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    pub extent: vk::Extent3D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub mip_levels: u32,
    pub array_layers: u32,
}

impl ImageDesc {
    pub fn new(extent: vk::Extent3D, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self {
            extent,
            format,
            usage,
            mip_levels: 1,
            array_layers: 1,
        }
    }

    /// Requests a full mip chain.
    pub fn mipmapped(mut self) -> Self {
        self.mip_levels = mip_levels(self.extent.width, self.extent.height);
        self
    }

    pub fn layers(mut self, count: u32) -> Self {
        self.array_layers = count.max(1);
        self
    }
}

/// GPU-only image with a default view covering all mips and layers.
pub struct AllocatedImage {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    layer_views: Vec<vk::ImageView>,
    allocation: Option<Allocation>,
    desc: ImageDesc,
    name: String,
}

impl AllocatedImage {
    /// # Errors
    /// Returns an error for a zero extent, or if image creation, allocation or
    /// view creation fails.
    pub fn new(device: Arc<Device>, desc: &ImageDesc, name: &str) -> RhiResult<Self> {
        if desc.extent.width == 0 || desc.extent.height == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "Image '{}' dimensions must be greater than 0",
                name
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(desc.extent)
            .mip_levels(desc.mip_levels)
            .array_layers(desc.array_layers)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = {
            let mut allocator = device.allocator().lock().unwrap();
            allocator.allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
        };
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e.into());
            }
        };

        unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }

        let view_type = if desc.array_layers > 1 {
            vk::ImageViewType::TYPE_2D_ARRAY
        } else {
            vk::ImageViewType::TYPE_2D
        };
        let view = create_view(&device, image, desc, view_type, 0, desc.array_layers)?;

        debug!(
            "Created image '{}': {}x{} {:?} ({} mips, {} layers)",
            name,
            desc.extent.width,
            desc.extent.height,
            desc.format,
            desc.mip_levels,
            desc.array_layers
        );

        Ok(Self {
            device,
            image,
            view,
            layer_views: Vec::new(),
            allocation: Some(allocation),
            desc: *desc,
            name: name.to_string(),
        })
    }

    /// Creates one single-layer 2D view per array layer, for rendering into
    /// individual layers.
    pub fn create_layer_views(&mut self) -> RhiResult<()> {
        for layer in self.layer_views.len() as u32..self.desc.array_layers {
            let view = create_view(
                &self.device,
                self.image,
                &self.desc,
                vk::ImageViewType::TYPE_2D,
                layer,
                1,
            )?;
            self.layer_views.push(view);
        }
        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// View of a single layer; requires [`create_layer_views`](Self::create_layer_views).
    #[inline]
    pub fn layer_view(&self, layer: u32) -> Option<vk::ImageView> {
        self.layer_views.get(layer as usize).copied()
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent3D {
        self.desc.extent
    }

    #[inline]
    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.desc.extent.width,
            height: self.desc.extent.height,
        }
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.desc.mip_levels
    }
}

impl Drop for AllocatedImage {
    fn drop(&mut self) {
        unsafe {
            for view in self.layer_views.drain(..) {
                self.device.handle().destroy_image_view(view, None);
            }
            self.device.handle().destroy_image_view(self.view, None);
            self.device.handle().destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            let mut allocator = self.device.allocator().lock().unwrap();
            if let Err(e) = allocator.free(allocation) {
                error!("Failed to free image '{}': {:?}", self.name, e);
            }
        }

        debug!("Destroyed image '{}'", self.name);
    }
}

fn create_view(
    device: &Device,
    image: vk::Image,
    desc: &ImageDesc,
    view_type: vk::ImageViewType,
    base_layer: u32,
    layer_count: u32,
) -> RhiResult<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(view_type)
        .format(desc.format)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect_for_format(desc.format))
                .base_mip_level(0)
                .level_count(desc.mip_levels)
                .base_array_layer(base_layer)
                .layer_count(layer_count),
        );
    let view = unsafe { device.handle().create_image_view(&view_info, None)? };
    Ok(view)
}

/// Records a layout transition over every mip level and layer of `image`.
///
/// The barrier is deliberately coarse (all commands to all commands); the
/// aspect is DEPTH when moving into a depth layout, COLOR otherwise.
pub fn transition_image(
    device: &Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    current_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let barrier = vk::ImageMemoryBarrier2::default()
        .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
        .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .dst_access_mask(vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ)
        .old_layout(current_layout)
        .new_layout(new_layout)
        .image(image)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect_for_layout(new_layout))
                .base_mip_level(0)
                .level_count(vk::REMAINING_MIP_LEVELS)
                .base_array_layer(0)
                .layer_count(vk::REMAINING_ARRAY_LAYERS),
        );

    let barriers = [barrier];
    let dependency = vk::DependencyInfo::default().image_memory_barriers(&barriers);
    unsafe { device.handle().cmd_pipeline_barrier2(cmd, &dependency) };
}

fn blit_corner(extent: vk::Extent2D) -> vk::Offset3D {
    vk::Offset3D {
        x: extent.width as i32,
        y: extent.height as i32,
        z: 1,
    }
}

fn color_layer(mip_level: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .mip_level(mip_level)
        .base_array_layer(0)
        .layer_count(1)
}

/// Blits `source` (TRANSFER_SRC) into `destination` (TRANSFER_DST), scaling
/// with linear filtering.
pub fn copy_image_to_image(
    device: &Device,
    cmd: vk::CommandBuffer,
    source: vk::Image,
    destination: vk::Image,
    src_size: vk::Extent2D,
    dst_size: vk::Extent2D,
) {
    let region = vk::ImageBlit2::default()
        .src_offsets([vk::Offset3D::default(), blit_corner(src_size)])
        .dst_offsets([vk::Offset3D::default(), blit_corner(dst_size)])
        .src_subresource(color_layer(0))
        .dst_subresource(color_layer(0));
    let regions = [region];

    let blit_info = vk::BlitImageInfo2::default()
        .src_image(source)
        .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
        .dst_image(destination)
        .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .filter(vk::Filter::LINEAR)
        .regions(&regions);

    unsafe { device.handle().cmd_blit_image2(cmd, &blit_info) };
}

/// Extent of mip `level`, never below 1×1.
#[inline]
pub fn mip_extent(size: vk::Extent2D, level: u32) -> vk::Extent2D {
    vk::Extent2D {
        width: (size.width >> level).max(1),
        height: (size.height >> level).max(1),
    }
}

fn mip_barrier(
    image: vk::Image,
    level: u32,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src: (vk::PipelineStageFlags2, vk::AccessFlags2),
    dst: (vk::PipelineStageFlags2, vk::AccessFlags2),
) -> vk::ImageMemoryBarrier2<'static> {
    vk::ImageMemoryBarrier2::default()
        .src_stage_mask(src.0)
        .src_access_mask(src.1)
        .dst_stage_mask(dst.0)
        .dst_access_mask(dst.1)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .image(image)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .base_mip_level(level)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        )
}

/// Downsamples mip 0 through the whole chain and leaves every level in
/// `SHADER_READ_ONLY_OPTIMAL`. All levels must start in `TRANSFER_DST_OPTIMAL`.
pub fn generate_mipmaps(device: &Device, cmd: vk::CommandBuffer, image: vk::Image, size: vk::Extent2D) {
    let levels = mip_levels(size.width, size.height);
    let transfer_write = (vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE);
    let transfer_read = (vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_READ);
    let shader_read = (
        vk::PipelineStageFlags2::FRAGMENT_SHADER,
        vk::AccessFlags2::SHADER_READ,
    );

    let barrier = |b: vk::ImageMemoryBarrier2<'static>| {
        let barriers = [b];
        let dependency = vk::DependencyInfo::default().image_memory_barriers(&barriers);
        unsafe { device.handle().cmd_pipeline_barrier2(cmd, &dependency) };
    };

    for level in 0..levels - 1 {
        barrier(mip_barrier(
            image,
            level,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            transfer_write,
            transfer_read,
        ));

        let region = vk::ImageBlit2::default()
            .src_offsets([vk::Offset3D::default(), blit_corner(mip_extent(size, level))])
            .dst_offsets([
                vk::Offset3D::default(),
                blit_corner(mip_extent(size, level + 1)),
            ])
            .src_subresource(color_layer(level))
            .dst_subresource(color_layer(level + 1));
        let regions = [region];
        let blit_info = vk::BlitImageInfo2::default()
            .src_image(image)
            .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .dst_image(image)
            .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .filter(vk::Filter::LINEAR)
            .regions(&regions);
        unsafe { device.handle().cmd_blit_image2(cmd, &blit_info) };

        barrier(mip_barrier(
            image,
            level,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            transfer_read,
            shader_read,
        ));
    }

    barrier(mip_barrier(
        image,
        levels - 1,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        transfer_write,
        shader_read,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_levels() {
        assert_eq!(mip_levels(1, 1), 1);
        assert_eq!(mip_levels(2, 1), 2);
        assert_eq!(mip_levels(16, 16), 5);
        assert_eq!(mip_levels(1024, 512), 11);
        assert_eq!(mip_levels(1000, 3), 10);
    }

    #[test]
    fn test_mip_extent_clamps_to_one() {
        let size = vk::Extent2D {
            width: 64,
            height: 4,
        };
        assert_eq!(mip_extent(size, 1), vk::Extent2D { width: 32, height: 2 });
        assert_eq!(mip_extent(size, 3), vk::Extent2D { width: 8, height: 1 });
        assert_eq!(mip_extent(size, 6), vk::Extent2D { width: 1, height: 1 });
    }

    #[test]
    fn test_aspect_for_layout() {
        assert_eq!(
            aspect_for_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            aspect_for_layout(vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            aspect_for_layout(vk::ImageLayout::GENERAL),
            vk::ImageAspectFlags::COLOR
        );
        assert_eq!(
            aspect_for_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            vk::ImageAspectFlags::COLOR
        );
    }

    #[test]
    fn test_aspect_for_format() {
        assert_eq!(
            aspect_for_format(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            aspect_for_format(vk::Format::R16G16B16A16_SFLOAT),
            vk::ImageAspectFlags::COLOR
        );
    }

    #[test]
    fn test_image_desc_builders() {
        let extent = vk::Extent3D {
            width: 256,
            height: 128,
            depth: 1,
        };
        let desc = ImageDesc::new(extent, vk::Format::R8G8B8A8_SRGB, vk::ImageUsageFlags::SAMPLED)
            .mipmapped()
            .layers(0);
        assert_eq!(desc.mip_levels, 9);
        assert_eq!(desc.array_layers, 1);
    }

    #[test]
    fn test_image_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AllocatedImage>();
    }
}
