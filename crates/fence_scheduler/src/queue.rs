//! Pending-batch queue.
//!
//! Batches are kept in generation order and always retired from the front, so
//! cleanup registered earlier finishes (or is failed by device loss) before
//! cleanup registered later, even when a later fence signals first.

use core::time::Duration;
use std::collections::VecDeque;

use crate::device::{Deadline, FenceDevice, FenceStatus};
use crate::error::FenceError;
use crate::handle::{FenceHandle, FenceId};
use crate::pool::FencePool;
use crate::staging::CleanupTask;

/// A native fence plus the cleanup work bound to it.
struct PendingBatch {
    generation: u64,
    fence: FenceId,
    tasks: Vec<CleanupTask>,
}

impl PendingBatch {
    fn run(self, device_lost: bool) -> FenceId {
        log::debug!(
            target: "fence_scheduler",
            "Running {} cleanup task(s) for generation {} (device_lost={device_lost})",
            self.tasks.len(),
            self.generation
        );
        for task in self.tasks {
            task(device_lost);
        }
        self.fence
    }
}

/// Ordered sequence of fence-bound batches plus the highest-passed watermark.
#[derive(Default)]
pub struct PendingQueue {
    batches: VecDeque<PendingBatch>,
    /// Generation of the most recently pushed batch. 0 before the first push.
    last_issued: u64,
    /// Every batch with a generation at or below this has run.
    passed: u64,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch guarded by `fence` and return its handle.
    pub fn push_batch(&mut self, fence: FenceId, tasks: Vec<CleanupTask>) -> FenceHandle {
        self.last_issued += 1;
        let generation = self.last_issued;
        log::debug!(
            target: "fence_scheduler",
            "Enqueued generation {generation} on fence {} with {} task(s)",
            fence.index(),
            tasks.len()
        );
        self.batches.push_back(PendingBatch {
            generation,
            fence,
            tasks,
        });
        FenceHandle::from_generation(generation)
    }

    /// `true` iff the batch with `generation` has already run. Never blocks.
    pub fn peek(&self, generation: u64) -> bool {
        generation != 0 && generation <= self.passed
    }

    /// Run every batch up to and including `target`, oldest first.
    ///
    /// `timeout` bounds the whole call, not each fence. Returns `Ok(false)`
    /// if the budget ran out; batches that already ran stay retired and the
    /// rest of the queue is untouched.
    ///
    /// # Errors
    /// Returns [`FenceError::DeviceLost`] if loss was observed (now or
    /// earlier). Every batch up to `target` has then run with
    /// `device_lost = true` and its fence was destroyed.
    pub fn process_up_to<D: FenceDevice>(
        &mut self,
        device: &D,
        pool: &mut FencePool<D>,
        target: u64,
        timeout: Option<Duration>,
    ) -> Result<bool, FenceError> {
        if self.peek(target) {
            return Ok(true);
        }
        let deadline = Deadline::after(timeout);
        let mut device_lost = pool.is_lost();
        while self
            .batches
            .front()
            .is_some_and(|front| front.generation <= target)
        {
            if !device_lost {
                match self.wait_front(device, pool, deadline) {
                    FenceStatus::Signaled => {}
                    FenceStatus::TimedOut => return Ok(false),
                    FenceStatus::DeviceLost => {
                        log::warn!(
                            target: "fence_scheduler",
                            "Device lost while waiting for generation {}; force-completing up to {target}",
                            self.passed + 1
                        );
                        device_lost = true;
                        pool.invalidate();
                    }
                }
            }
            self.retire_front(device, pool, device_lost);
        }
        if device_lost {
            return Err(FenceError::DeviceLost);
        }
        Ok(self.peek(target))
    }

    /// Run batches whose fences have already signaled, without blocking.
    ///
    /// # Errors
    /// Returns [`FenceError::DeviceLost`] if a query reports loss. The batch
    /// that reported it runs with `device_lost = true`; later batches stay
    /// queued until a wait targets them.
    pub fn process_completed<D: FenceDevice>(
        &mut self,
        device: &D,
        pool: &mut FencePool<D>,
    ) -> Result<usize, FenceError> {
        let mut retired = 0;
        while !self.batches.is_empty() {
            match self.wait_front(device, pool, Deadline::after(Some(Duration::ZERO))) {
                FenceStatus::Signaled => {
                    self.retire_front(device, pool, false);
                    retired += 1;
                }
                FenceStatus::TimedOut => break,
                FenceStatus::DeviceLost => {
                    pool.invalidate();
                    self.retire_front(device, pool, true);
                    return Err(FenceError::DeviceLost);
                }
            }
        }
        Ok(retired)
    }

    fn wait_front<D: FenceDevice>(
        &self,
        device: &D,
        pool: &FencePool<D>,
        deadline: Deadline,
    ) -> FenceStatus {
        let Some(fence) = self
            .batches
            .front()
            .and_then(|front| pool.get(&front.fence))
        else {
            // A batch owns a live slot until it retires; a missing one means loss.
            return FenceStatus::DeviceLost;
        };
        device.wait_for_fence(fence, deadline.remaining())
    }

    fn retire_front<D: FenceDevice>(
        &mut self,
        device: &D,
        pool: &mut FencePool<D>,
        device_lost: bool,
    ) {
        let Some(batch) = self.batches.pop_front() else {
            return;
        };
        let generation = batch.generation;
        let fence = batch.run(device_lost);
        if device_lost {
            pool.retire(device, fence);
        } else {
            pool.release(device, fence);
        }
        self.passed = generation;
    }

    /// Highest generation handed out so far.
    pub const fn last_issued(&self) -> u64 {
        self.last_issued
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use core::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::sim::SimulatedDevice;

    type Log = Rc<RefCell<Vec<(u32, bool)>>>;

    fn recording(log: &Log, index: u32) -> CleanupTask {
        let log = Rc::clone(log);
        Box::new(move |device_lost| log.borrow_mut().push((index, device_lost)))
    }

    fn submitted_fence(device: &SimulatedDevice, pool: &mut FencePool<SimulatedDevice>) -> FenceId {
        let id = pool.acquire(device).unwrap();
        device.submit(pool.get(&id).unwrap()).unwrap();
        id
    }

    #[test]
    fn generations_are_strictly_increasing() {
        let device = SimulatedDevice::new();
        let mut pool = FencePool::new(None);
        let mut queue = PendingQueue::new();
        let mut previous = FenceHandle::default();
        for _ in 0..4 {
            let fence = submitted_fence(&device, &mut pool);
            let handle = queue.push_batch(fence, Vec::new());
            assert_eq!(handle.generation(), previous.generation() + 1);
            previous = handle;
        }
        assert_eq!(queue.last_issued(), 4);
    }

    #[test]
    fn later_fence_waits_for_earlier_batch() {
        let device = SimulatedDevice::manual();
        let controller = device.controller();
        let mut pool = FencePool::new(None);
        let mut queue = PendingQueue::new();
        let log = Log::default();

        let first_fence = submitted_fence(&device, &mut pool);
        let first_native = pool.get(&first_fence).unwrap().id();
        let first = queue.push_batch(first_fence, vec![recording(&log, 0)]);
        let second_fence = submitted_fence(&device, &mut pool);
        let second_native = pool.get(&second_fence).unwrap().id();
        let second = queue.push_batch(second_fence, vec![recording(&log, 1)]);

        // Only the later fence is ready; nothing may run out of order.
        controller.signal(second_native);
        assert_eq!(queue.process_completed(&device, &mut pool), Ok(0));
        assert!(log.borrow().is_empty());

        controller.signal(first_native);
        assert_eq!(
            queue.process_up_to(&device, &mut pool, second.generation(), Some(Duration::ZERO)),
            Ok(true)
        );
        assert_eq!(*log.borrow(), vec![(0, false), (1, false)]);
        assert!(queue.peek(first.generation()));
        assert!(queue.is_empty());
        assert_eq!(pool.idle_count(), 2);
    }

    #[test]
    fn timeout_leaves_queue_untouched() {
        let device = SimulatedDevice::manual();
        let mut pool = FencePool::new(None);
        let mut queue = PendingQueue::new();
        let log = Log::default();
        let fence = submitted_fence(&device, &mut pool);
        let handle = queue.push_batch(fence, vec![recording(&log, 0)]);

        let reached = queue.process_up_to(
            &device,
            &mut pool,
            handle.generation(),
            Some(Duration::from_millis(5)),
        );
        assert_eq!(reached, Ok(false));
        assert_eq!(queue.len(), 1);
        assert!(!queue.peek(handle.generation()));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn device_loss_force_completes_up_to_target() {
        let device = SimulatedDevice::manual();
        let controller = device.controller();
        let mut pool = FencePool::new(None);
        let mut queue = PendingQueue::new();
        let log = Log::default();

        let mut handles = Vec::new();
        for index in 0..3 {
            let fence = submitted_fence(&device, &mut pool);
            handles.push(queue.push_batch(fence, vec![recording(&log, index)]));
        }
        controller.lose_device();

        let result = queue.process_up_to(&device, &mut pool, handles[1].generation(), None);
        assert_eq!(result, Err(FenceError::DeviceLost));
        assert_eq!(*log.borrow(), vec![(0, true), (1, true)]);
        assert_eq!(queue.len(), 1);
        assert!(pool.is_lost());
        assert!(queue.peek(handles[1].generation()));
        assert_eq!(controller.live_fences(), 1);

        // Already retired: cheap watermark hit, nothing reruns.
        assert_eq!(
            queue.process_up_to(&device, &mut pool, handles[0].generation(), None),
            Ok(true)
        );
        assert_eq!(
            queue.process_up_to(&device, &mut pool, handles[2].generation(), None),
            Err(FenceError::DeviceLost)
        );
        assert_eq!(*log.borrow(), vec![(0, true), (1, true), (2, true)]);
        assert_eq!(controller.live_fences(), 0);
    }

    #[test]
    fn unknown_generation_is_not_passed() {
        let queue = PendingQueue::new();
        assert!(!queue.peek(0));
        assert!(!queue.peek(1));
    }
}
