//! Synchronization primitives.
//!
//! - [`Semaphore`] orders GPU work (image acquired → render → present)
//! - [`Fence`] lets the CPU wait for a submission to finish
//! - [`FrameSync`] is the trio a frame slot needs
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ember_rhi::device::Device;
//! use ember_rhi::sync::{FENCE_TIMEOUT_NS, Fence};
//!
//! # fn example(device: Arc<Device>) -> ember_rhi::RhiResult<()> {
//! let fence = Fence::new(device, true)?;
//! fence.wait(FENCE_TIMEOUT_NS)?;
//! fence.reset()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// One second, the bound on every per-frame fence wait and image acquire.
pub const FENCE_TIMEOUT_NS: u64 = 1_000_000_000;

/// Binary semaphore with automatic cleanup.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }

    /// Submit info that waits on or signals this semaphore at `stage`.
    #[inline]
    pub fn submit_info(&self, stage: vk::PipelineStageFlags2) -> vk::SemaphoreSubmitInfo<'static> {
        vk::SemaphoreSubmitInfo::default()
            .semaphore(self.semaphore)
            .stage_mask(stage)
            .device_index(0)
            .value(1)
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence with automatic cleanup.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence, optionally already signaled so the first wait returns
    /// immediately.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };
        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Waits until the fence is signaled.
    ///
    /// # Errors
    /// [`RhiError::Timeout`] if `timeout_ns` elapses first.
    pub fn wait(&self, timeout_ns: u64) -> RhiResult<()> {
        let fences = [self.fence];
        match unsafe { self.device.handle().wait_for_fences(&fences, true, timeout_ns) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(RhiError::Timeout("fence")),
            Err(e) => Err(e.into()),
        }
    }

    pub fn reset(&self) -> RhiResult<()> {
        let fences = [self.fence];
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization objects owned by one frame slot.
pub struct FrameSync {
    /// Signaled by the presentation engine when the acquired image is ready.
    pub swapchain_semaphore: Semaphore,
    /// Signaled when the frame's commands finish; present waits on it.
    pub render_semaphore: Semaphore,
    /// Signaled when the frame's submission completes; created signaled.
    pub render_fence: Fence,
}

impl FrameSync {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let sync = Self {
            swapchain_semaphore: Semaphore::new(device.clone())?,
            render_semaphore: Semaphore::new(device.clone())?,
            render_fence: Fence::new(device, true)?,
        };
        debug!("Created frame synchronization primitives");
        Ok(sync)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_timeout_is_one_second() {
        assert_eq!(FENCE_TIMEOUT_NS, 1_000_000_000);
    }

    #[test]
    fn test_sync_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
        assert_send_sync::<FrameSync>();
    }
}
