//! Bindless texture array.
//!
//! All sampled textures live in one large `COMBINED_IMAGE_SAMPLER` array at
//! set 1, binding 0. Materials refer to textures by slot index. Slots 0 and 1
//! always hold the white and flat-normal defaults.
//!
//! Slot numbers are handed out by [`SlotRegistry`], which reuses released
//! slots before growing the high-water mark.

use std::sync::Arc;

use ash::vk;
use ember_rhi::descriptor::{DescriptorLayoutBuilder, DescriptorPool, DescriptorSetLayout, DescriptorWriter};
use ember_rhi::device::Device;
use ember_rhi::{RhiError, RhiResult};
use tracing::{debug, info};

/// Size of the texture array.
pub const MAX_BINDLESS_TEXTURES: u32 = 4096;
/// Slot of the 1x1 white texture.
pub const WHITE_SLOT: u32 = 0;
/// Slot of the 1x1 flat normal texture.
pub const NORMAL_SLOT: u32 = 1;
/// First slot available to loaded textures.
pub const FIRST_FREE_SLOT: u32 = 2;

/// Slot bookkeeping for the bindless array.
#[derive(Debug, Clone)]
pub struct SlotRegistry {
    capacity: u32,
    next: u32,
    free: Vec<u32>,
}

impl SlotRegistry {
    /// Registry over `capacity` slots with the first `reserved` already taken.
    pub fn new(capacity: u32, reserved: u32) -> Self {
        Self {
            capacity,
            next: reserved.min(capacity),
            free: Vec::new(),
        }
    }

    /// Hands out a free slot, preferring released ones.
    ///
    /// # Errors
    /// [`RhiError::BindlessExhausted`] when every slot is in use.
    pub fn acquire(&mut self) -> RhiResult<u32> {
        if let Some(slot) = self.free.pop() {
            return Ok(slot);
        }
        if self.next >= self.capacity {
            return Err(RhiError::BindlessExhausted(self.capacity));
        }
        let slot = self.next;
        self.next += 1;
        Ok(slot)
    }

    /// Returns `slot` to the pool. Releasing a slot twice or one that was
    /// never handed out is ignored.
    pub fn release(&mut self, slot: u32) {
        if slot >= self.next || self.free.contains(&slot) {
            return;
        }
        self.free.push(slot);
    }

    /// Number of slots currently handed out, reserved ones included.
    pub fn in_use(&self) -> u32 {
        self.next - self.free.len() as u32
    }

    /// Highest slot ever handed out plus one.
    pub fn high_water_mark(&self) -> u32 {
        self.next
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

/// Descriptor set holding the bindless texture array.
pub struct BindlessTextures {
    set: vk::DescriptorSet,
    layout: DescriptorSetLayout,
    _pool: DescriptorPool,
    slots: SlotRegistry,
    device: Arc<Device>,
}

impl BindlessTextures {
    /// Creates the layout, an update-after-bind pool and the single set.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let binding_flags = vk::DescriptorBindingFlags::PARTIALLY_BOUND
            | vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT
            | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND;

        let layout = DescriptorLayoutBuilder::new()
            .add_binding_array(
                0,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                MAX_BINDLESS_TEXTURES,
                binding_flags,
            )
            .build(
                device.clone(),
                vk::ShaderStageFlags::FRAGMENT | vk::ShaderStageFlags::COMPUTE,
                vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL,
            )?;

        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: MAX_BINDLESS_TEXTURES,
        }];
        let pool = DescriptorPool::new(
            device.clone(),
            1,
            &pool_sizes,
            vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND,
        )?;
        let set = pool.allocate_variable(layout.handle(), MAX_BINDLESS_TEXTURES)?;

        info!("Bindless texture array ready: {} slots", MAX_BINDLESS_TEXTURES);

        Ok(Self {
            set,
            layout,
            _pool: pool,
            slots: SlotRegistry::new(MAX_BINDLESS_TEXTURES, FIRST_FREE_SLOT),
            device,
        })
    }

    /// Writes `view`/`sampler` into the next free slot and returns it.
    ///
    /// # Errors
    /// [`RhiError::BindlessExhausted`] when the array is full.
    pub fn register(&mut self, view: vk::ImageView, sampler: vk::Sampler) -> RhiResult<u32> {
        let slot = self.slots.acquire()?;
        self.write(slot, view, sampler);
        debug!("Bindless slot {} registered", slot);
        Ok(slot)
    }

    /// Overwrites a specific slot. Used for the reserved defaults.
    pub fn write(&self, slot: u32, view: vk::ImageView, sampler: vk::Sampler) {
        let mut writer = DescriptorWriter::new();
        writer.write_image_element(
            0,
            slot,
            view,
            sampler,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        );
        writer.update_set(&self.device, self.set);
    }

    /// Frees `slot` for reuse. The caller must make sure no in-flight frame
    /// still samples it.
    pub fn release(&mut self, slot: u32) {
        if slot >= FIRST_FREE_SLOT {
            self.slots.release(slot);
        }
    }

    #[inline]
    pub fn set(&self) -> vk::DescriptorSet {
        self.set
    }

    #[inline]
    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout.handle()
    }

    pub fn slots(&self) -> &SlotRegistry {
        &self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_slots_are_skipped() {
        let mut slots = SlotRegistry::new(MAX_BINDLESS_TEXTURES, FIRST_FREE_SLOT);
        assert_eq!(slots.acquire().unwrap(), 2);
        assert_eq!(slots.acquire().unwrap(), 3);
        assert_eq!(slots.in_use(), 4);
    }

    #[test]
    fn test_released_slot_is_reused_first() {
        let mut slots = SlotRegistry::new(16, 2);
        let a = slots.acquire().unwrap();
        let b = slots.acquire().unwrap();
        slots.release(a);
        assert_eq!(slots.acquire().unwrap(), a);
        assert_eq!(slots.acquire().unwrap(), b + 1);
        assert_eq!(slots.high_water_mark(), 5);
    }

    #[test]
    fn test_exhaustion_is_an_error() {
        let mut slots = SlotRegistry::new(4, 2);
        slots.acquire().unwrap();
        slots.acquire().unwrap();
        assert!(matches!(
            slots.acquire(),
            Err(RhiError::BindlessExhausted(4))
        ));

        slots.release(3);
        assert_eq!(slots.acquire().unwrap(), 3);
    }

    #[test]
    fn test_bogus_release_is_ignored() {
        let mut slots = SlotRegistry::new(8, 2);
        let a = slots.acquire().unwrap();
        slots.release(7);
        slots.release(a);
        slots.release(a);
        assert_eq!(slots.in_use(), 2);
        assert_eq!(slots.acquire().unwrap(), a);
        assert_eq!(slots.acquire().unwrap(), 3);
    }

    #[test]
    fn test_long_running_churn_never_exhausts() {
        let mut slots = SlotRegistry::new(8, 2);
        for _ in 0..10_000 {
            let slot = slots.acquire().unwrap();
            slots.release(slot);
        }
        assert_eq!(slots.high_water_mark(), 3);
    }
}
