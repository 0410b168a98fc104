//! Interface to the device/queue that actually owns native fences.
//!
//! The scheduler never talks to a GPU API directly. Everything it needs from
//! the device goes through [`FenceDevice`], which keeps the core usable with
//! wgpu, a raw Vulkan queue, or the software device in [`crate::sim`].

use core::time::Duration;
use std::time::Instant;

use crate::error::FenceError;

/// A wait budget shared by every fence visited in one call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline(Option<Instant>);

impl Deadline {
    /// `None` (or a timeout too large to represent) never expires.
    pub(crate) fn after(timeout: Option<Duration>) -> Self {
        Self(timeout.and_then(|budget| Instant::now().checked_add(budget)))
    }

    /// Time left, saturating at zero. `None` means unbounded.
    pub(crate) fn remaining(self) -> Option<Duration> {
        self.0
            .map(|at| at.saturating_duration_since(Instant::now()))
    }
}

/// Outcome of waiting on a native fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// The work guarded by the fence finished.
    Signaled,
    /// The wait budget ran out before the fence signaled.
    TimedOut,
    /// The device was lost while (or before) waiting.
    DeviceLost,
}

/// Native fence primitives provided by the device/queue collaborator.
///
/// All methods take `&self`; implementations that track state use interior
/// mutability so callers can reach the device through the scheduler while
/// submitting their own work.
pub trait FenceDevice {
    /// Native synchronization object, signaled once when submitted work completes.
    type Fence;

    /// Create a new unsignaled fence.
    ///
    /// # Errors
    /// Returns [`FenceError::Device`] if native creation fails, or
    /// [`FenceError::DeviceLost`] if the device is already gone.
    fn create_fence(&self) -> Result<Self::Fence, FenceError>;

    /// Return a signaled fence to the unsignaled state.
    ///
    /// # Errors
    /// Returns [`FenceError::Device`] if the native reset fails.
    fn reset_fence(&self, fence: &Self::Fence) -> Result<(), FenceError>;

    /// Release the native object.
    fn destroy_fence(&self, fence: Self::Fence);

    /// Submit an empty batch of work that signals `fence` once everything
    /// submitted before it has finished.
    ///
    /// # Errors
    /// Returns [`FenceError::Device`] if the submission is rejected.
    fn submit_marker(&self, fence: &Self::Fence) -> Result<(), FenceError>;

    /// Block until `fence` signals, `timeout` elapses, or the device is lost.
    ///
    /// `None` blocks indefinitely; `Some(Duration::ZERO)` only queries.
    fn wait_for_fence(&self, fence: &Self::Fence, timeout: Option<Duration>) -> FenceStatus;
}
