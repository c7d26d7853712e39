//! Blocking uploads of meshes and textures.
//!
//! Data is written into a host-visible staging buffer and copied on the GPU
//! inside an [`ImmediateSubmit`]. The staging buffer is dropped once the
//! submission has completed.

use std::sync::Arc;

use ash::vk;
use ember_resources::{ImageData, Vertex};
use ember_rhi::buffer::{Buffer, BufferUsage};
use ember_rhi::device::Device;
use ember_rhi::image::{AllocatedImage, ImageDesc, generate_mipmaps, transition_image};
use ember_rhi::immediate::ImmediateSubmit;
use ember_rhi::{RhiError, RhiResult};
use gpu_allocator::MemoryLocation;
use tracing::debug;

use crate::mesh::{GpuMeshBuffers, MeshLayout};

/// Uploads `vertices` followed by `indices` into one device-local buffer.
///
/// # Errors
///
/// Returns an error for an empty mesh, or if buffer creation or the copy
/// submission fails.
pub fn upload_mesh(
    device: &Arc<Device>,
    immediate: &ImmediateSubmit,
    indices: &[u32],
    vertices: &[Vertex],
    name: &str,
) -> RhiResult<GpuMeshBuffers> {
    let layout = MeshLayout::new(vertices.len(), indices.len());
    if layout.vertex_bytes == 0 || layout.index_bytes == 0 {
        return Err(RhiError::InvalidHandle(format!(
            "Mesh '{}' has no vertices or indices",
            name
        )));
    }

    let buffer = Buffer::with_flags(
        device.clone(),
        layout.total_bytes(),
        vk::BufferUsageFlags::VERTEX_BUFFER
            | vk::BufferUsageFlags::INDEX_BUFFER
            | vk::BufferUsageFlags::STORAGE_BUFFER
            | vk::BufferUsageFlags::TRANSFER_DST,
        MemoryLocation::GpuOnly,
        name,
    )?;

    let staging = Buffer::new(
        device.clone(),
        BufferUsage::Staging,
        layout.total_bytes(),
        "mesh staging",
    )?;
    staging.write_data(0, bytemuck::cast_slice(vertices))?;
    staging.write_data(layout.index_offset(), bytemuck::cast_slice(indices))?;

    immediate.submit(|cmd| {
        cmd.copy_buffer(staging.handle(), buffer.handle(), 0, 0, layout.total_bytes());
    })?;

    debug!(
        "Uploaded mesh '{}': {} vertices, {} indices",
        name,
        vertices.len(),
        indices.len()
    );

    Ok(GpuMeshBuffers {
        vertex_address: buffer.device_address(),
        index_offset: layout.index_offset(),
        buffer,
    })
}

/// Creates a sampled image from RGBA8 pixels and fills it.
///
/// With `mipmapped` the whole chain is generated by blits; either way the
/// image ends up in `SHADER_READ_ONLY_OPTIMAL`.
pub fn upload_image(
    device: &Arc<Device>,
    immediate: &ImmediateSubmit,
    data: &ImageData,
    format: vk::Format,
    mipmapped: bool,
    name: &str,
) -> RhiResult<AllocatedImage> {
    let extent = vk::Extent3D {
        width: data.width,
        height: data.height,
        depth: 1,
    };
    let mut desc = ImageDesc::new(
        extent,
        format,
        vk::ImageUsageFlags::SAMPLED
            | vk::ImageUsageFlags::TRANSFER_DST
            | vk::ImageUsageFlags::TRANSFER_SRC,
    );
    if mipmapped {
        desc = desc.mipmapped();
    }
    let image = AllocatedImage::new(device.clone(), &desc, name)?;

    let staging = Buffer::new(
        device.clone(),
        BufferUsage::Staging,
        data.byte_size() as vk::DeviceSize,
        "image staging",
    )?;
    staging.write_data(0, &data.pixels)?;

    immediate.submit(|cmd| {
        transition_image(
            device,
            cmd.handle(),
            image.handle(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        cmd.copy_buffer_to_image(staging.handle(), image.handle(), extent);

        if mipmapped {
            generate_mipmaps(device, cmd.handle(), image.handle(), image.extent_2d());
        } else {
            transition_image(
                device,
                cmd.handle(),
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        }
    })?;

    Ok(image)
}
