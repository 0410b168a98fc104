//! Fence pool: a slab of native fences with free-list recycling.
//!
//! Native fences never leave the slab. Owners hold a [`FenceId`] and borrow
//! the native object through [`FencePool::get`] when they need to submit or
//! wait on it.

use crate::device::FenceDevice;
use crate::error::FenceError;
use crate::handle::FenceId;

/// Slab of native fences owned by one device context.
pub struct FencePool<D: FenceDevice> {
    /// Slot storage. `None` marks a vacated slot available for reuse.
    slots: Vec<Option<D::Fence>>,
    /// Slots of reset fences ready to hand out. Only the pool names these,
    /// so a `FenceId` exists for a slot only while someone has acquired it.
    idle: Vec<u32>,
    /// Empty slots left behind by destroyed fences.
    vacant: Vec<u32>,
    /// Cap on `idle`; surplus fences are destroyed on release.
    max_idle: Option<usize>,
    /// Set once the device is lost; the pool refuses further acquisitions.
    lost: bool,
}

impl<D: FenceDevice> FencePool<D> {
    pub const fn new(max_idle: Option<usize>) -> Self {
        Self {
            slots: Vec::new(),
            idle: Vec::new(),
            vacant: Vec::new(),
            max_idle,
            lost: false,
        }
    }

    /// Create `count` fences up front and park them on the free list.
    ///
    /// # Errors
    /// Propagates the first native creation failure.
    pub fn prewarm(&mut self, device: &D, count: usize) -> Result<(), FenceError> {
        for _ in 0..count {
            let index = self.create(device)?;
            self.idle.push(index);
        }
        Ok(())
    }

    /// Hand out an unsignaled fence, reusing an idle one when possible.
    ///
    /// # Errors
    /// Returns [`FenceError::DeviceLost`] once the pool has been invalidated,
    /// or the device's error if native creation fails.
    pub fn acquire(&mut self, device: &D) -> Result<FenceId, FenceError> {
        if self.lost {
            return Err(FenceError::DeviceLost);
        }
        let index = match self.idle.pop() {
            Some(index) => index,
            None => self.create(device)?,
        };
        Ok(FenceId(index))
    }

    /// Reset a completed fence and return it to the free list.
    ///
    /// A fence that fails to reset is destroyed instead of pooled. Consumes
    /// `id`, so the same slot cannot be released twice.
    pub fn release(&mut self, device: &D, id: FenceId) {
        let index = id.0;
        if self.lost || self.max_idle.is_some_and(|max| self.idle.len() >= max) {
            self.retire_slot(device, index);
            return;
        }
        let Some(fence) = self.slot(index) else {
            return;
        };
        match device.reset_fence(fence) {
            Ok(()) => self.idle.push(index),
            Err(err) => {
                log::error!(target: "fence_scheduler", "Failed to reset fence {index}: {err}");
                self.retire_slot(device, index);
            }
        }
    }

    /// Destroy the fence behind `id` without pooling it.
    pub fn retire(&mut self, device: &D, id: FenceId) {
        self.retire_slot(device, id.0);
    }

    /// Mark the pool unusable. Idle fences stay parked until `destroy_all`;
    /// fences released from now on are destroyed instead.
    pub const fn invalidate(&mut self) {
        self.lost = true;
    }

    /// Destroy every fence still held by the slab, idle or not.
    pub fn destroy_all(&mut self, device: &D) {
        self.idle.clear();
        self.vacant.clear();
        for fence in self.slots.drain(..).flatten() {
            device.destroy_fence(fence);
        }
    }

    /// Borrow the native fence behind `id`.
    pub fn get(&self, id: &FenceId) -> Option<&D::Fence> {
        self.slot(id.0)
    }

    pub const fn is_lost(&self) -> bool {
        self.lost
    }

    /// Fences parked on the free list.
    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    fn slot(&self, index: u32) -> Option<&D::Fence> {
        self.slots.get(index as usize).and_then(Option::as_ref)
    }

    fn retire_slot(&mut self, device: &D, index: u32) {
        let Some(fence) = self
            .slots
            .get_mut(index as usize)
            .and_then(Option::take)
        else {
            return;
        };
        device.destroy_fence(fence);
        self.vacant.push(index);
    }

    fn create(&mut self, device: &D) -> Result<u32, FenceError> {
        let fence = device.create_fence()?;
        let index = if let Some(index) = self.vacant.pop() {
            if let Some(slot) = self.slots.get_mut(index as usize) {
                *slot = Some(fence);
            }
            index
        } else {
            let index = u32::try_from(self.slots.len())
                .map_err(|_| FenceError::device("fence slab exhausted"))?;
            self.slots.push(Some(fence));
            index
        };
        log::debug!(target: "fence_scheduler", "Created fence in slot {index}");
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use super::*;
    use crate::FenceStatus;
    use crate::sim::SimulatedDevice;

    #[test]
    fn acquire_creates_then_reuses() {
        let device = SimulatedDevice::new();
        let controller = device.controller();
        let mut pool = FencePool::new(None);

        let first = pool.acquire(&device).unwrap();
        let first_index = first.index();
        assert_eq!(controller.created_fences(), 1);
        pool.release(&device, first);
        assert_eq!(pool.idle_count(), 1);

        let second = pool.acquire(&device).unwrap();
        assert_eq!(second.index(), first_index);
        assert_eq!(controller.created_fences(), 1);
    }

    #[test]
    fn released_fence_is_reset() {
        let device = SimulatedDevice::new();
        let mut pool = FencePool::new(None);
        let id = pool.acquire(&device).unwrap();
        device.submit_marker(pool.get(&id).unwrap()).unwrap();
        pool.release(&device, id);

        let again = pool.acquire(&device).unwrap();
        let status = device.wait_for_fence(pool.get(&again).unwrap(), Some(Duration::ZERO));
        assert_eq!(status, FenceStatus::TimedOut);
    }

    #[test]
    fn creation_failure_propagates() {
        let device = SimulatedDevice::new();
        device.controller().set_fail_create(true);
        let mut pool = FencePool::new(None);
        assert!(matches!(pool.acquire(&device), Err(FenceError::Device(_))));
    }

    #[test]
    fn retired_slots_are_reused() {
        let device = SimulatedDevice::new();
        let controller = device.controller();
        let mut pool = FencePool::new(None);
        let id = pool.acquire(&device).unwrap();
        let index = id.index();
        pool.retire(&device, id);
        assert!(pool.slot(index).is_none());
        assert_eq!(controller.live_fences(), 0);

        let reused = pool.acquire(&device).unwrap();
        assert_eq!(reused.index(), index);
        assert!(pool.get(&reused).is_some());
    }

    #[test]
    fn idle_cap_destroys_surplus() {
        let device = SimulatedDevice::new();
        let controller = device.controller();
        let mut pool = FencePool::new(Some(1));
        let first = pool.acquire(&device).unwrap();
        let second = pool.acquire(&device).unwrap();
        pool.release(&device, first);
        pool.release(&device, second);
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(controller.live_fences(), 1);
    }

    #[test]
    fn invalidated_pool_refuses_acquire() {
        let device = SimulatedDevice::new();
        let controller = device.controller();
        let mut pool = FencePool::new(None);
        pool.prewarm(&device, 3).unwrap();
        pool.invalidate();
        assert_eq!(pool.acquire(&device), Err(FenceError::DeviceLost));
        assert_eq!(pool.idle_count(), 3);

        pool.destroy_all(&device);
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(controller.live_fences(), 0);
    }

    #[test]
    fn outstanding_fences_never_share_a_slot() {
        let device = SimulatedDevice::new();
        let mut pool = FencePool::new(None);
        let first = pool.acquire(&device).unwrap();
        let second = pool.acquire(&device).unwrap();
        assert_ne!(first.index(), second.index());

        // Only released slots come back, and each comes back once.
        let released = second.index();
        pool.release(&device, second);
        let third = pool.acquire(&device).unwrap();
        assert_eq!(third.index(), released);
        let fourth = pool.acquire(&device).unwrap();
        assert_ne!(fourth.index(), first.index());
        assert_ne!(fourth.index(), third.index());
        assert_eq!(pool.idle_count(), 0);
    }
}
