//! `FenceDevice` implementation on top of a wgpu device and queue.
//!
//! wgpu has no host-visible fence object, so a fence here is a flag flipped by
//! `Queue::on_submitted_work_done` for the submission it was armed on. Waiting
//! polls the device until the flag flips, the budget runs out, or the device
//! lost callback fires.

use core::iter;
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::{Result as AnyResult, anyhow};
use fence_scheduler::{FenceDevice, FenceError, FenceStatus};
use tracing::info_span;
use wgpu::{
    Backends, CommandBuffer, Device, DeviceDescriptor, Features, Instance, InstanceDescriptor,
    Limits, MemoryHints, PollType, PowerPreference, Queue, RequestAdapterOptions, Trace,
};

use crate::error::submit_with_validation;

/// Settings for [`WgpuFenceDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WgpuFenceConfig {
    /// Sleep between device polls during a bounded wait.
    pub poll_interval: Duration,
    /// Label for the device created by [`WgpuFenceDevice::request_headless`].
    pub label: &'static str,
}

impl Default for WgpuFenceConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
            label: "fence-scheduler-device",
        }
    }
}

/// Completion flag for one wgpu submission.
#[derive(Debug, Default)]
pub struct WgpuFence {
    signaled: Arc<AtomicBool>,
}

impl WgpuFence {
    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }
}

/// wgpu device and queue driving a [`fence_scheduler::FenceScheduler`].
pub struct WgpuFenceDevice {
    device: Arc<Device>,
    queue: Queue,
    lost: Arc<AtomicBool>,
    config: WgpuFenceConfig,
}

impl WgpuFenceDevice {
    /// Wrap an existing device and queue.
    pub fn new(device: Arc<Device>, queue: Queue, config: WgpuFenceConfig) -> Self {
        let lost = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            log::error!(target: "wgpu_fence", "Device lost ({reason:?}): {message}");
            flag.store(true, Ordering::Release);
        });
        Self {
            device,
            queue,
            lost,
            config,
        }
    }

    /// Bring up a device without a surface.
    ///
    /// # Errors
    /// Returns an error if adapter or device initialization fails.
    pub async fn request_headless(config: WgpuFenceConfig) -> AnyResult<Self> {
        let instance = Instance::new(&InstanceDescriptor {
            backends: Backends::DX12 | Backends::VULKAN | Backends::METAL | Backends::GL,
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| anyhow!("Failed to find a suitable GPU adapter: {err}"))?;
        let device_descriptor = DeviceDescriptor {
            label: Some(config.label),
            required_features: Features::empty(),
            required_limits: Limits::downlevel_defaults(),
            memory_hints: MemoryHints::default(),
            trace: Trace::default(),
        };
        let (device, queue) = adapter
            .request_device(&device_descriptor)
            .await
            .map_err(|err| anyhow!("Failed to create GPU device: {err}"))?;
        device.on_uncaptured_error(Box::new(|error| {
            log::error!(target: "wgpu_fence", "Uncaptured WGPU error: {error:?}");
        }));
        Ok(Self::new(Arc::new(device), queue, config))
    }

    /// Submit caller-recorded work and arm `fence` on it.
    ///
    /// # Errors
    /// Returns [`FenceError::DeviceLost`] after loss, or [`FenceError::Device`]
    /// if validation rejects the submission.
    pub fn submit<I>(&self, fence: &WgpuFence, command_buffers: I) -> Result<(), FenceError>
    where
        I: IntoIterator<Item = CommandBuffer>,
    {
        if self.is_lost() {
            return Err(FenceError::DeviceLost);
        }
        submit_with_validation(&self.device, &self.queue, command_buffers)?;
        self.arm(fence);
        Ok(())
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub const fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    fn arm(&self, fence: &WgpuFence) {
        let flag = Arc::clone(&fence.signaled);
        self.queue
            .on_submitted_work_done(move || flag.store(true, Ordering::Release));
    }
}

impl FenceDevice for WgpuFenceDevice {
    type Fence = WgpuFence;

    fn create_fence(&self) -> Result<WgpuFence, FenceError> {
        if self.is_lost() {
            return Err(FenceError::DeviceLost);
        }
        Ok(WgpuFence::default())
    }

    fn reset_fence(&self, fence: &WgpuFence) -> Result<(), FenceError> {
        fence.signaled.store(false, Ordering::Release);
        Ok(())
    }

    fn destroy_fence(&self, fence: WgpuFence) {
        drop(fence);
    }

    fn submit_marker(&self, fence: &WgpuFence) -> Result<(), FenceError> {
        self.submit(fence, iter::empty())
    }

    fn wait_for_fence(&self, fence: &WgpuFence, timeout: Option<Duration>) -> FenceStatus {
        let _span = info_span!("wgpu_fence.wait_for_fence").entered();
        let deadline = timeout.and_then(|budget| Instant::now().checked_add(budget));
        loop {
            let poll_type = if deadline.is_some() {
                PollType::Poll
            } else {
                PollType::Wait
            };
            if let Err(err) = self.device.poll(poll_type) {
                log::warn!(target: "wgpu_fence", "Device poll failed: {err}");
            }
            if self.is_lost() {
                return FenceStatus::DeviceLost;
            }
            if fence.is_signaled() {
                return FenceStatus::Signaled;
            }
            let pause = match deadline {
                Some(at) => {
                    let left = at.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return FenceStatus::TimedOut;
                    }
                    left.min(self.config.poll_interval)
                }
                None => self.config.poll_interval,
            };
            thread::sleep(pause);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_fence_is_unsignaled() {
        let fence = WgpuFence::default();
        assert!(!fence.is_signaled());
    }

    #[test]
    fn default_config_polls_every_millisecond() {
        let config = WgpuFenceConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(1));
        assert_eq!(config.label, "fence-scheduler-device");
    }
}
