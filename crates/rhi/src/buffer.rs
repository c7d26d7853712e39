//! GPU buffers backed by gpu-allocator.
//!
//! Every buffer is created with `SHADER_DEVICE_ADDRESS` so shaders can fetch
//! vertices through a raw pointer pushed as a constant. Host-visible buffers
//! stay persistently mapped and can be written with [`Buffer::write_data`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ember_rhi::device::Device;
//! use ember_rhi::buffer::{Buffer, BufferUsage};
//!
//! # fn example(device: Arc<Device>) -> ember_rhi::RhiResult<()> {
//! let constants = [1.0f32, 1.0, 1.0, 1.0];
//! let ubo = Buffer::new(device, BufferUsage::Uniform, 16, "material constants")?;
//! ubo.write_pod(0, &constants)?;
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

/// Common buffer configurations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Combined vertex+index storage for a mesh, device local.
    Mesh,
    /// Uniform data rewritten by the CPU.
    Uniform,
    /// Upload source for copies into device-local memory.
    Staging,
}

impl BufferUsage {
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Mesh => {
                vk::BufferUsageFlags::VERTEX_BUFFER
                    | vk::BufferUsageFlags::INDEX_BUFFER
                    | vk::BufferUsageFlags::STORAGE_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    pub fn memory_location(self) -> MemoryLocation {
        match self {
            BufferUsage::Mesh => MemoryLocation::GpuOnly,
            BufferUsage::Uniform | BufferUsage::Staging => MemoryLocation::CpuToGpu,
        }
    }
}

/// Buffer plus its allocation; freed on drop.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    address: vk::DeviceAddress,
    name: String,
}

impl Buffer {
    /// Creates a buffer with one of the preset configurations.
    pub fn new(
        device: Arc<Device>,
        usage: BufferUsage,
        size: vk::DeviceSize,
        name: &str,
    ) -> RhiResult<Self> {
        Self::with_flags(device, size, usage.to_vk_usage(), usage.memory_location(), name)
    }

    /// Creates a buffer with explicit usage flags and memory residency.
    ///
    /// # Errors
    /// Returns an error for a zero size, or if creation, allocation or binding
    /// fails.
    pub fn with_flags(
        device: Arc<Device>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "Buffer '{}' must have a non-zero size",
                name
            )));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = {
            let mut allocator = device.allocator().lock().unwrap();
            allocator.allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
        };
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };

        unsafe {
            device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?;
        }

        let address_info = vk::BufferDeviceAddressInfo::default().buffer(buffer);
        let address = unsafe { device.handle().get_buffer_device_address(&address_info) };

        debug!("Created buffer '{}': {} bytes ({:?})", name, size, location);

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            address,
            name: name.to_string(),
        })
    }

    /// Copies `data` into mapped memory at `offset`.
    ///
    /// # Errors
    /// Fails if the write runs past the end or the buffer is not host visible.
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let end = offset + data.len() as vk::DeviceSize;
        if end > self.size {
            return Err(RhiError::InvalidHandle(format!(
                "Write to '{}' exceeds buffer size: {} > {}",
                self.name, end, self.size
            )));
        }

        let mapped = self
            .allocation
            .as_ref()
            .and_then(|a| a.mapped_ptr())
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!("Buffer '{}' is not host visible", self.name))
            })?;

        unsafe {
            let dst = mapped.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        Ok(())
    }

    /// Writes a plain-old-data value or slice.
    pub fn write_pod<T: bytemuck::Pod>(&self, offset: vk::DeviceSize, value: &T) -> RhiResult<()> {
        self.write_data(offset, bytemuck::bytes_of(value))
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// GPU virtual address of the start of the buffer.
    #[inline]
    pub fn device_address(&self) -> vk::DeviceAddress {
        self.address
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }
        if let Some(allocation) = self.allocation.take() {
            let mut allocator = self.device.allocator().lock().unwrap();
            if let Err(e) = allocator.free(allocation) {
                error!("Failed to free buffer '{}': {:?}", self.name, e);
            }
        }
        debug!("Destroyed buffer '{}'", self.name);
    }
}
