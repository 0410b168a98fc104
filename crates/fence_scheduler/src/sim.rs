//! Software device with controllable fences.
//!
//! `SimulatedDevice` stands in for a real queue in headless runs and tests.
//! In the default mode every submission completes instantly; in manual mode
//! fences only signal when a [`SimController`] says so, which may happen from
//! another thread while the owner is blocked in a wait.

use core::time::Duration;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::device::{Deadline, FenceDevice, FenceStatus};
use crate::error::FenceError;

/// Native fence of the simulated device.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SimFence {
    id: u64,
}

impl SimFence {
    pub const fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Default)]
struct FenceState {
    /// Submission sequence number, set once the fence is attached to work.
    submitted: Option<u64>,
    signaled: bool,
}

#[derive(Debug, Default)]
struct SimState {
    fences: HashMap<u64, FenceState>,
    next_fence_id: u64,
    next_submission: u64,
    auto_signal: bool,
    lost: bool,
    fail_create: bool,
    fail_submit: bool,
    created: usize,
    destroyed: usize,
    markers: usize,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<SimState>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-process device whose fences are driven by the host.
#[derive(Debug)]
pub struct SimulatedDevice {
    shared: Arc<Shared>,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDevice {
    /// Device whose submissions complete immediately.
    pub fn new() -> Self {
        let device = Self::manual();
        device.shared.lock().auto_signal = true;
        device
    }

    /// Device whose fences only signal through [`SimController`].
    pub fn manual() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
        }
    }

    /// Handle for driving this device from tests or another thread.
    pub fn controller(&self) -> SimController {
        SimController {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Attach `fence` to a caller-driven submission.
    ///
    /// # Errors
    /// Returns [`FenceError::DeviceLost`] after loss, or [`FenceError::Device`]
    /// when submission failures are being injected.
    pub fn submit(&self, fence: &SimFence) -> Result<(), FenceError> {
        let mut state = self.shared.lock();
        if state.lost {
            return Err(FenceError::DeviceLost);
        }
        if state.fail_submit {
            return Err(FenceError::device("simulated submission failure"));
        }
        let submission = state.next_submission;
        state.next_submission += 1;
        let auto_signal = state.auto_signal;
        let entry = state.fences.entry(fence.id).or_default();
        entry.submitted = Some(submission);
        entry.signaled = auto_signal;
        drop(state);
        self.shared.changed.notify_all();
        Ok(())
    }
}

impl FenceDevice for SimulatedDevice {
    type Fence = SimFence;

    fn create_fence(&self) -> Result<SimFence, FenceError> {
        let mut state = self.shared.lock();
        if state.lost {
            return Err(FenceError::DeviceLost);
        }
        if state.fail_create {
            return Err(FenceError::device("simulated fence creation failure"));
        }
        let id = state.next_fence_id;
        state.next_fence_id += 1;
        state.created += 1;
        state.fences.insert(id, FenceState::default());
        Ok(SimFence { id })
    }

    fn reset_fence(&self, fence: &SimFence) -> Result<(), FenceError> {
        let mut state = self.shared.lock();
        let entry = state
            .fences
            .get_mut(&fence.id)
            .ok_or_else(|| FenceError::device(format!("unknown fence {}", fence.id)))?;
        *entry = FenceState::default();
        Ok(())
    }

    fn destroy_fence(&self, fence: SimFence) {
        let mut state = self.shared.lock();
        if state.fences.remove(&fence.id).is_some() {
            state.destroyed += 1;
        }
    }

    fn submit_marker(&self, fence: &SimFence) -> Result<(), FenceError> {
        self.submit(fence)?;
        self.shared.lock().markers += 1;
        Ok(())
    }

    fn wait_for_fence(&self, fence: &SimFence, timeout: Option<Duration>) -> FenceStatus {
        let deadline = Deadline::after(timeout);
        let mut state = self.shared.lock();
        loop {
            // Work that finished before the loss keeps its signal.
            if state.fences.get(&fence.id).is_some_and(|entry| entry.signaled) {
                return FenceStatus::Signaled;
            }
            if state.lost {
                return FenceStatus::DeviceLost;
            }
            state = match deadline.remaining() {
                None => self
                    .shared
                    .changed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(left) if left.is_zero() => return FenceStatus::TimedOut,
                Some(left) => {
                    self.shared
                        .changed
                        .wait_timeout(state, left)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }
}

/// Host-side control over a [`SimulatedDevice`]. Cheap to clone and `Send`.
#[derive(Debug, Clone)]
pub struct SimController {
    shared: Arc<Shared>,
}

impl SimController {
    /// Signal every submitted fence.
    pub fn signal_all(&self) {
        let mut state = self.shared.lock();
        for entry in state.fences.values_mut() {
            if entry.submitted.is_some() {
                entry.signaled = true;
            }
        }
        drop(state);
        self.shared.changed.notify_all();
    }

    /// Signal the earliest submitted fence that has not signaled yet.
    /// Returns `false` if nothing was outstanding.
    pub fn signal_oldest(&self) -> bool {
        let mut state = self.shared.lock();
        let oldest = state
            .fences
            .values_mut()
            .filter(|entry| !entry.signaled)
            .filter_map(|entry| {
                let seq = entry.submitted?;
                Some((seq, entry))
            })
            .min_by_key(|(seq, _)| *seq);
        let Some((_, entry)) = oldest else {
            return false;
        };
        entry.signaled = true;
        drop(state);
        self.shared.changed.notify_all();
        true
    }

    /// Signal a specific fence, submitted or not.
    pub fn signal(&self, fence_id: u64) {
        if let Some(entry) = self.shared.lock().fences.get_mut(&fence_id) {
            entry.signaled = true;
        }
        self.shared.changed.notify_all();
    }

    /// Mark the device lost. Every current and future wait on a fence that
    /// has not signaled yet reports loss.
    pub fn lose_device(&self) {
        self.shared.lock().lost = true;
        self.shared.changed.notify_all();
    }

    /// Make subsequent fence creation fail.
    pub fn set_fail_create(&self, fail: bool) {
        self.shared.lock().fail_create = fail;
    }

    /// Make subsequent submissions fail.
    pub fn set_fail_submit(&self, fail: bool) {
        self.shared.lock().fail_submit = fail;
    }

    /// Fences created so far.
    pub fn created_fences(&self) -> usize {
        self.shared.lock().created
    }

    /// Fences created and not yet destroyed.
    pub fn live_fences(&self) -> usize {
        let state = self.shared.lock();
        state.created - state.destroyed
    }

    /// Marker submissions made through [`FenceDevice::submit_marker`].
    pub fn marker_submissions(&self) -> usize {
        self.shared.lock().markers
    }
}
