//! Per-frame resources.
//!
//! Each frame slot owns everything that may still be in use by the GPU while
//! the CPU records the next frame: a command buffer, a descriptor allocator
//! for transient sets, a deletion queue and its synchronization objects.

use std::sync::Arc;

use ash::vk;
use ember_rhi::RhiResult;
use ember_rhi::command::{CommandBuffer, CommandPool};
use ember_rhi::deletion_queue::DeletionQueue;
use ember_rhi::descriptor::{DescriptorAllocatorGrowable, PoolSizeRatio};
use ember_rhi::device::Device;
use ember_rhi::sync::FrameSync;

/// Number of frames the CPU may record ahead of the GPU.
pub const FRAME_OVERLAP: usize = 2;

/// Initial set capacity of each frame's descriptor allocator.
const FRAME_DESCRIPTOR_SETS: u32 = 1000;

/// Per-frame pool ratios: scene uniforms, shadow map sampler, storage images
/// for compute passes.
const FRAME_POOL_RATIOS: [PoolSizeRatio; 4] = [
    PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 3.0),
    PoolSizeRatio::new(vk::DescriptorType::STORAGE_BUFFER, 3.0),
    PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 3.0),
    PoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4.0),
];

/// Slot used by frame number `frame_number`.
#[inline]
pub fn frame_slot(frame_number: u64) -> usize {
    (frame_number % FRAME_OVERLAP as u64) as usize
}

/// Resources of one frame slot.
///
/// # Synchronization Flow
///
/// ```text
/// 1. Wait on render_fence (CPU waits for the previous use of this slot)
/// 2. Flush deletion_queue, reset descriptor pools
/// 3. Acquire swapchain image (signals swapchain_semaphore)
/// 4. Record commands into cmd
/// 5. Submit cmd:
///    - Wait on swapchain_semaphore
///    - Signal render_semaphore
///    - Signal render_fence
/// 6. Present (waits on render_semaphore)
/// ```
pub struct FrameData {
    // Field order is drop order: queued resources first, the pool last.
    pub deletion_queue: DeletionQueue,
    pub descriptors: DescriptorAllocatorGrowable,
    pub cmd: CommandBuffer,
    pub sync: FrameSync,
    pool: CommandPool,
}

impl FrameData {
    /// # Errors
    ///
    /// Returns an error if any resource creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let pool = CommandPool::new(device.clone(), device.graphics_family())?;
        let cmd = CommandBuffer::new(device.clone(), &pool)?;
        let descriptors =
            DescriptorAllocatorGrowable::new(device.clone(), FRAME_DESCRIPTOR_SETS, &FRAME_POOL_RATIOS)?;
        let sync = FrameSync::new(device)?;

        Ok(Self {
            deletion_queue: DeletionQueue::new(),
            descriptors,
            cmd,
            sync,
            pool,
        })
    }

    #[inline]
    pub fn command_pool(&self) -> &CommandPool {
        &self.pool
    }
}

/// A fixed ring of [`FRAME_OVERLAP`] slots selected by a running frame number.
pub struct FrameRing<T> {
    slots: Vec<T>,
    frame_number: u64,
}

impl<T> FrameRing<T> {
    /// Builds every slot with `make`.
    pub fn new<E>(mut make: impl FnMut(usize) -> Result<T, E>) -> Result<Self, E> {
        let slots = (0..FRAME_OVERLAP).map(&mut make).collect::<Result<Vec<_>, E>>()?;
        Ok(Self {
            slots,
            frame_number: 0,
        })
    }

    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    #[inline]
    pub fn slot_index(&self) -> usize {
        frame_slot(self.frame_number)
    }

    #[inline]
    pub fn current(&self) -> &T {
        &self.slots[self.slot_index()]
    }

    #[inline]
    pub fn current_mut(&mut self) -> &mut T {
        let index = self.slot_index();
        &mut self.slots[index]
    }

    /// Moves on to the next frame.
    #[inline]
    pub fn advance(&mut self) {
        self.frame_number += 1;
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_slot_rotation() {
        let slots: Vec<usize> = (0..5).map(frame_slot).collect();
        assert_eq!(slots, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_ring_advances_through_slots() {
        let mut ring = FrameRing::new(|i| Ok::<_, ()>(i * 10)).unwrap();
        assert_eq!(*ring.current(), 0);
        ring.advance();
        assert_eq!(*ring.current(), 10);
        ring.advance();
        assert_eq!(*ring.current(), 0);
        assert_eq!(ring.frame_number(), 2);
    }

    #[test]
    fn test_slot_is_reused_only_after_overlap_frames() {
        // Each slot remembers the frame it last served. When it comes around
        // again, exactly FRAME_OVERLAP frames must have been started since.
        let mut ring = FrameRing::new(|_| Ok::<Option<u64>, ()>(None)).unwrap();
        for _ in 0..(FRAME_OVERLAP * 4 + 1) {
            let frame = ring.frame_number();
            if let Some(previous) = *ring.current() {
                assert_eq!(frame - previous, FRAME_OVERLAP as u64);
            }
            *ring.current_mut() = Some(frame);
            ring.advance();
        }
    }

    #[test]
    fn test_ring_construction_error_propagates() {
        let ring = FrameRing::new(|i| if i == 1 { Err("boom") } else { Ok(i) });
        assert!(ring.is_err());
    }

    #[test]
    fn test_command_and_sync_parts_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CommandBuffer>();
        assert_send::<FrameSync>();
    }
}
