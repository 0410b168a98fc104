use fence_scheduler::{FenceError, FenceHandle, FenceScheduler};
use wgpu::CommandBuffer;

use crate::device::WgpuFenceDevice;

/// Scheduler driving a wgpu queue.
pub type WgpuFenceScheduler = FenceScheduler<WgpuFenceDevice>;

/// Caller-driven submission in one step.
pub trait SubmitExt {
    /// Acquire a fence, submit `command_buffers` armed with it and bind the
    /// staged cleanup to the resulting batch.
    ///
    /// # Errors
    /// Returns [`FenceError::DeviceLost`] after loss, or [`FenceError::Device`]
    /// if the submission fails validation. The fence goes back to the pool and
    /// staged cleanup stays staged.
    fn submit_and_enqueue<I>(&mut self, command_buffers: I) -> Result<FenceHandle, FenceError>
    where
        I: IntoIterator<Item = CommandBuffer>;
}

impl SubmitExt for WgpuFenceScheduler {
    fn submit_and_enqueue<I>(&mut self, command_buffers: I) -> Result<FenceHandle, FenceError>
    where
        I: IntoIterator<Item = CommandBuffer>,
    {
        let fence = self.acquire_fence()?;
        let submitted = self
            .native_fence(&fence)
            .ok_or_else(|| FenceError::device("acquired fence has no native object"))
            .and_then(|native| self.device().submit(native, command_buffers));
        if let Err(err) = submitted {
            self.release_fence(fence);
            return Err(err);
        }
        Ok(self.enqueue_fence(fence))
    }
}
