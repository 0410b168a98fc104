//! Public face of the scheduler.
//!
//! `FenceScheduler` composes the fence pool, the pending-batch queue and the
//! staging list. It is meant to live on the thread that owns the device queue:
//! the shared staging list is `Rc`-based, so the scheduler is neither `Send`
//! nor `Sync` and cross-thread use does not compile.

use core::time::Duration;

use tracing::info_span;

use crate::config::SchedulerConfig;
use crate::device::FenceDevice;
use crate::error::FenceError;
use crate::handle::{FenceHandle, FenceId};
use crate::pool::FencePool;
use crate::queue::PendingQueue;
use crate::staging::{CleanupQueue, CleanupTask};

/// Fence-gated deferred cleanup for one device queue.
pub struct FenceScheduler<D: FenceDevice> {
    device: D,
    pool: FencePool<D>,
    pending: PendingQueue,
    staging: CleanupQueue,
}

impl<D: FenceDevice> FenceScheduler<D> {
    /// Create a scheduler with an empty fence pool.
    pub fn new(device: D) -> Self {
        Self {
            device,
            pool: FencePool::new(None),
            pending: PendingQueue::new(),
            staging: CleanupQueue::new(),
        }
    }

    /// Create a scheduler and pre-warm its fence pool.
    ///
    /// # Errors
    /// Returns the device error if any of the initial fences cannot be created.
    pub fn with_config(device: D, config: SchedulerConfig) -> Result<Self, FenceError> {
        let mut scheduler = Self {
            pool: FencePool::new(config.max_idle_fences),
            ..Self::new(device)
        };
        scheduler
            .pool
            .prewarm(&scheduler.device, config.initial_fences)?;
        Ok(scheduler)
    }

    /// Get an unsignaled fence for a caller-driven submission.
    ///
    /// Attach it to work via [`Self::native_fence`], then hand it back with
    /// [`Self::enqueue_fence`].
    ///
    /// # Errors
    /// Returns [`FenceError::DeviceLost`] after device loss, or the device
    /// error if native creation fails.
    pub fn acquire_fence(&mut self) -> Result<FenceId, FenceError> {
        self.pool.acquire(&self.device)
    }

    /// Hand back an acquired fence that was never submitted.
    ///
    /// Takes the fence by value: once released it cannot also be enqueued.
    pub fn release_fence(&mut self, fence: FenceId) {
        self.pool.release(&self.device, fence);
    }

    /// Bind everything staged so far to `fence`, which the caller has already
    /// submitted, and return the new batch's handle. The batch takes ownership
    /// of the fence until it retires.
    pub fn enqueue_fence(&mut self, fence: FenceId) -> FenceHandle {
        let tasks = self.staging.take_all();
        self.pending.push_batch(fence, tasks)
    }

    /// Submit a marker fence on the caller's behalf and bind the staged
    /// cleanup to it.
    ///
    /// # Errors
    /// Returns the pool's error if no fence can be acquired, or the device
    /// error if the marker submission fails. The staging list is left intact.
    pub fn generate_cleanup_fence(&mut self) -> Result<FenceHandle, FenceError> {
        let fence = self.acquire_fence()?;
        let submitted = self
            .pool
            .get(&fence)
            .ok_or_else(|| FenceError::device("acquired fence has no native object"))
            .and_then(|native| self.device.submit_marker(native));
        if let Err(err) = submitted {
            self.release_fence(fence);
            return Err(err);
        }
        Ok(self.enqueue_fence(fence))
    }

    /// Defer `task` until the work submitted so far has completed.
    pub fn enqueue_cleanup_task_for_submitted_work(&self, task: CleanupTask) {
        self.staging.append(task);
    }

    /// Keep `resource` alive until the work submitted so far has completed.
    pub fn enqueue_resource_release<T: 'static>(&self, resource: T) {
        self.staging.release_after_submitted_work(resource);
    }

    /// Handle onto the staging list that cleanup tasks may capture.
    pub fn cleanup_queue(&self) -> CleanupQueue {
        self.staging.clone()
    }

    /// Block until `handle`'s batch and every older batch have run.
    ///
    /// `timeout` bounds the whole call; `None` waits indefinitely. Returns
    /// `Ok(false)` on timeout, leaving the unreached batches queued.
    ///
    /// # Errors
    /// Returns [`FenceError::InvalidHandle`] for a default or unissued handle,
    /// and [`FenceError::DeviceLost`] if loss was detected. In the latter case
    /// every batch up to `handle` has run with `device_lost = true`.
    pub fn wait(
        &mut self,
        handle: FenceHandle,
        timeout: Option<Duration>,
    ) -> Result<bool, FenceError> {
        self.check_handle(handle)?;
        let _span = info_span!("fence_scheduler.wait", generation = handle.generation()).entered();
        self.pending
            .process_up_to(&self.device, &mut self.pool, handle.generation(), timeout)
    }

    /// Whether `handle`'s batch has already run. Never blocks.
    ///
    /// # Errors
    /// Returns [`FenceError::InvalidHandle`] for a default or unissued handle.
    pub fn has_passed(&self, handle: FenceHandle) -> Result<bool, FenceError> {
        self.check_handle(handle)?;
        Ok(self.pending.peek(handle.generation()))
    }

    /// Run every batch whose fence has already signaled. Never blocks.
    ///
    /// # Errors
    /// Returns [`FenceError::DeviceLost`] if a fence query reports loss.
    pub fn process_completed(&mut self) -> Result<usize, FenceError> {
        let _span = info_span!("fence_scheduler.process_completed").entered();
        self.pending.process_completed(&self.device, &mut self.pool)
    }

    /// Drain everything and release all native fences.
    ///
    /// Staged tasks get a final boundary; if none can be made they run with
    /// `device_lost = true` after every pending batch. Every registered task
    /// runs exactly once.
    ///
    /// Tasks staged by other tasks during the final drain are never bound to a
    /// fence. They run after all submitted work has drained, with
    /// `device_lost = false` unless loss was observed, and may keep staging
    /// more work until the list stays empty.
    ///
    /// # Errors
    /// Returns [`FenceError::DeviceLost`] if loss was observed while draining,
    /// or the device error that prevented the final boundary.
    pub fn shutdown(mut self) -> Result<(), FenceError> {
        let _span = info_span!("fence_scheduler.shutdown").entered();
        let mut outcome = Ok(());
        if !self.staging.is_empty() {
            if let Err(err) = self.generate_cleanup_fence() {
                log::warn!(target: "fence_scheduler", "No final cleanup fence ({err}); staged tasks will run as lost");
                outcome = Err(err);
            }
        }
        let last = self.pending.last_issued();
        if last != 0 {
            let drained = self
                .pending
                .process_up_to(&self.device, &mut self.pool, last, None);
            if let Err(err) = drained {
                outcome = Err(err);
            }
        }
        // Left over: the final boundary failed, or tasks staged more work while draining.
        let device_lost = outcome.is_err();
        while !self.staging.is_empty() {
            for task in self.staging.take_all() {
                task(device_lost);
            }
        }
        self.pool.destroy_all(&self.device);
        outcome
    }

    /// The device collaborator, for caller-driven submissions.
    pub const fn device(&self) -> &D {
        &self.device
    }

    /// Borrow the native object behind an acquired fence.
    pub fn native_fence(&self, fence: &FenceId) -> Option<&D::Fence> {
        self.pool.get(fence)
    }

    /// Handle of the most recent boundary, if any.
    pub fn last_issued(&self) -> Option<FenceHandle> {
        let generation = self.pending.last_issued();
        (generation != 0).then_some(FenceHandle::from_generation(generation))
    }

    pub const fn is_device_lost(&self) -> bool {
        self.pool.is_lost()
    }

    /// Batches still waiting on their fences.
    pub fn pending_batches(&self) -> usize {
        self.pending.len()
    }

    /// Cleanup tasks not yet bound to a fence.
    pub fn staged_tasks(&self) -> usize {
        self.staging.len()
    }

    /// Fences parked in the pool.
    pub fn idle_fences(&self) -> usize {
        self.pool.idle_count()
    }

    fn check_handle(&self, handle: FenceHandle) -> Result<(), FenceError> {
        if !handle.is_valid() || handle.generation() > self.pending.last_issued() {
            return Err(FenceError::InvalidHandle(handle));
        }
        Ok(())
    }
}
