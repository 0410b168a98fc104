//! Staging list for cleanup work that is not yet bound to a fence.

use core::cell::RefCell;
use core::fmt::{Debug, Formatter, Result as FmtResult};
use std::rc::Rc;

/// Host work deferred until submitted GPU work completes.
///
/// The argument is `device_lost`: `true` when the batch was force-completed
/// because the device was lost rather than because its fence signaled.
pub type CleanupTask = Box<dyn FnOnce(bool)>;

/// Cloneable handle onto the staging list.
///
/// Every clone appends to the same list. Cleanup tasks may capture a clone and
/// queue further cleanup while the scheduler is draining; that work lands here
/// and is bound to the next boundary.
#[derive(Clone, Default)]
pub struct CleanupQueue {
    tasks: Rc<RefCell<Vec<CleanupTask>>>,
}

impl CleanupQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `task` behind everything already staged.
    pub fn append(&self, task: CleanupTask) {
        self.tasks.borrow_mut().push(task);
    }

    /// Queue a closure.
    pub fn push<F>(&self, task: F)
    where
        F: FnOnce(bool) + 'static,
    {
        self.append(Box::new(task));
    }

    /// Keep `resource` alive until the submitted work completes, then drop it.
    pub fn release_after_submitted_work<T: 'static>(&self, resource: T) {
        self.push(move |_device_lost| drop(resource));
    }

    /// Take the staged tasks in order, leaving the list empty.
    pub(crate) fn take_all(&self) -> Vec<CleanupTask> {
        self.tasks.take()
    }

    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }
}

impl Debug for CleanupQueue {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        formatter
            .debug_struct("CleanupQueue")
            .field("staged", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use super::*;

    #[test]
    fn take_all_preserves_order_and_clears() {
        let queue = CleanupQueue::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for index in 0..3 {
            let order = Rc::clone(&order);
            queue.push(move |_| order.borrow_mut().push(index));
        }
        assert_eq!(queue.len(), 3);

        let tasks = queue.take_all();
        assert!(queue.is_empty());
        for task in tasks {
            task(false);
        }
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn clones_share_the_list() {
        let queue = CleanupQueue::new();
        let other = queue.clone();
        other.push(|_| {});
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn task_can_stage_more_work() {
        let queue = CleanupQueue::new();
        let inner = queue.clone();
        queue.push(move |_| inner.push(|_| {}));

        for task in queue.take_all() {
            task(false);
        }
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn released_resource_lives_until_cleanup() {
        struct Tracked(Rc<Cell<bool>>);
        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.set(true);
            }
        }

        let dropped = Rc::new(Cell::new(false));
        let queue = CleanupQueue::new();
        queue.release_after_submitted_work(Tracked(Rc::clone(&dropped)));
        assert!(!dropped.get());
        for task in queue.take_all() {
            task(false);
        }
        assert!(dropped.get());
    }
}
