//! Blocking one-off GPU submissions.
//!
//! Uploads (mesh buffers, texture pixels, mip generation) are recorded into a
//! dedicated command buffer and submitted straight away; the call returns once
//! the GPU has finished.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ember_rhi::device::Device;
//! use ember_rhi::immediate::ImmediateSubmit;
//!
//! # fn example(device: Arc<Device>, src: ash::vk::Buffer, dst: ash::vk::Buffer) -> ember_rhi::RhiResult<()> {
//! let immediate = ImmediateSubmit::new(device)?;
//! immediate.submit(|cmd| cmd.copy_buffer(src, dst, 0, 0, 256))?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;

use crate::command::{CommandBuffer, CommandPool};
use crate::device::Device;
use crate::error::RhiResult;
use crate::sync::Fence;

/// Upload timeout. Large textures with full mip chains can take a while.
const IMMEDIATE_TIMEOUT_NS: u64 = 9_999_999_999;

/// Command buffer, pool and fence reserved for blocking submissions.
pub struct ImmediateSubmit {
    // Field order: the buffer must go before the pool it came from.
    cmd: CommandBuffer,
    _pool: CommandPool,
    fence: Fence,
    device: Arc<Device>,
}

impl ImmediateSubmit {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let pool = CommandPool::new(device.clone(), device.graphics_family())?;
        let cmd = CommandBuffer::new(device.clone(), &pool)?;
        let fence = Fence::new(device.clone(), true)?;
        Ok(Self {
            cmd,
            _pool: pool,
            fence,
            device,
        })
    }

    /// Records `record` into the immediate command buffer, submits it to the
    /// graphics queue and waits for completion.
    ///
    /// # Errors
    ///
    /// Returns an error if recording, submission or the fence wait fails.
    pub fn submit<F>(&self, record: F) -> RhiResult<()>
    where
        F: FnOnce(&CommandBuffer),
    {
        self.fence.reset()?;
        self.cmd.reset()?;

        self.cmd.begin()?;
        record(&self.cmd);
        self.cmd.end()?;

        let cmd_infos = [self.cmd.submit_info()];
        let submit = vk::SubmitInfo2::default().command_buffer_infos(&cmd_infos);
        self.device.submit2(&[submit], self.fence.handle())?;

        self.fence.wait(IMMEDIATE_TIMEOUT_NS)
    }
}
