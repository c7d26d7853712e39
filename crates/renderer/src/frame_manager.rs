//! Frame loop synchronization.
//!
//! [`FrameManager`] owns the [`FRAME_OVERLAP`] frame slots and walks the
//! current one through the per-frame protocol:
//!
//! 1. [`wait_for_frame`](FrameManager::wait_for_frame) blocks on the slot's
//!    fence, then reclaims its transient resources
//! 2. [`acquire_next_image`](FrameManager::acquire_next_image) picks the
//!    swapchain image; `None` means the surface is stale and the frame is
//!    abandoned before anything is submitted
//! 3. [`begin_frame`](FrameManager::begin_frame) resets the fence and starts
//!    the command buffer
//! 4. [`submit`](FrameManager::submit) and [`present`](FrameManager::present)
//! 5. [`next_frame`](FrameManager::next_frame)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ember_rhi::device::Device;
//! use ember_rhi::swapchain::Swapchain;
//! use ember_renderer::frame_manager::FrameManager;
//!
//! # fn example(device: Arc<Device>, swapchain: &Swapchain) -> Result<(), ember_rhi::RhiError> {
//! let mut frames = FrameManager::new(device.clone())?;
//!
//! frames.wait_for_frame()?;
//! let Some(image_index) = frames.acquire_next_image(swapchain)? else {
//!     // Stale surface: recreate the swapchain and try again next iteration.
//!     return Ok(());
//! };
//! frames.begin_frame()?;
//! // Record passes into frames.current().cmd ...
//! frames.submit()?;
//! let stale = frames.present(swapchain, device.graphics_queue(), image_index)?;
//! frames.next_frame();
//! # let _ = stale;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use ember_rhi::RhiResult;
use ember_rhi::device::Device;
use ember_rhi::swapchain::Swapchain;
use ember_rhi::sync::FENCE_TIMEOUT_NS;
use tracing::{info, trace};

use crate::frame::{FRAME_OVERLAP, FrameData, FrameRing};

/// Per-frame resources and the acquire/submit/present cycle.
///
/// # Thread Safety
///
/// Not thread-safe. Only the render thread touches it, and only the current
/// slot is ever mutated.
pub struct FrameManager {
    frames: FrameRing<FrameData>,
    device: Arc<Device>,
}

impl FrameManager {
    /// Creates [`FRAME_OVERLAP`] frame slots.
    ///
    /// # Errors
    ///
    /// Returns an error if any resource creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let frames = FrameRing::new(|_| FrameData::new(device.clone()))?;
        info!("Frame manager created with {} frames in flight", FRAME_OVERLAP);
        Ok(Self { frames, device })
    }

    #[inline]
    pub fn current(&self) -> &FrameData {
        self.frames.current()
    }

    #[inline]
    pub fn current_mut(&mut self) -> &mut FrameData {
        self.frames.current_mut()
    }

    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frames.frame_number()
    }

    /// Waits until the GPU is done with the current slot, then flushes its
    /// deletion queue and resets its descriptor pools.
    ///
    /// # Errors
    ///
    /// A fence wait longer than [`FENCE_TIMEOUT_NS`] is returned as
    /// [`RhiError::Timeout`](ember_rhi::RhiError::Timeout) and is fatal.
    pub fn wait_for_frame(&mut self) -> RhiResult<()> {
        let frame = self.frames.current_mut();
        frame.sync.render_fence.wait(FENCE_TIMEOUT_NS)?;

        frame.deletion_queue.flush();
        frame.descriptors.clear_pools()?;
        trace!("Frame {} slot reclaimed", self.frames.frame_number());
        Ok(())
    }

    /// Acquires the next swapchain image, signaling the slot's swapchain
    /// semaphore.
    ///
    /// Returns `None` when the swapchain is out of date.
    pub fn acquire_next_image(&self, swapchain: &Swapchain) -> RhiResult<Option<u32>> {
        swapchain.acquire_next_image(
            self.current().sync.swapchain_semaphore.handle(),
            FENCE_TIMEOUT_NS,
        )
    }

    /// Resets the fence and starts recording the slot's command buffer.
    ///
    /// The fence is only reset once an image was acquired, so an abandoned
    /// frame leaves it signaled.
    pub fn begin_frame(&self) -> RhiResult<()> {
        let frame = self.current();
        frame.sync.render_fence.reset()?;
        frame.cmd.reset()?;
        frame.cmd.begin()
    }

    /// Ends the command buffer and submits it to the graphics queue.
    ///
    /// Waits on the swapchain semaphore at color output, signals the render
    /// semaphore when all graphics work is done and the fence on completion.
    pub fn submit(&self) -> RhiResult<()> {
        let frame = self.current();
        frame.cmd.end()?;

        let cmd_infos = [frame.cmd.submit_info()];
        let wait_infos = [frame
            .sync
            .swapchain_semaphore
            .submit_info(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)];
        let signal_infos = [frame
            .sync
            .render_semaphore
            .submit_info(vk::PipelineStageFlags2::ALL_GRAPHICS)];

        let submit = vk::SubmitInfo2::default()
            .wait_semaphore_infos(&wait_infos)
            .signal_semaphore_infos(&signal_infos)
            .command_buffer_infos(&cmd_infos);

        self.device
            .submit2(&[submit], frame.sync.render_fence.handle())
    }

    /// Presents `image_index` once rendering is done.
    ///
    /// Returns `true` if the swapchain should be recreated.
    pub fn present(
        &self,
        swapchain: &Swapchain,
        queue: vk::Queue,
        image_index: u32,
    ) -> RhiResult<bool> {
        swapchain.present(
            queue,
            image_index,
            self.current().sync.render_semaphore.handle(),
        )
    }

    #[inline]
    pub fn next_frame(&mut self) {
        self.frames.advance();
    }

    /// Flushes every slot's deletion queue. Only valid once the device is
    /// idle.
    pub fn flush_all(&mut self) {
        for frame in self.frames.iter_mut() {
            frame.deletion_queue.flush();
        }
    }
}
