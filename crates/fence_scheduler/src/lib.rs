//! Fence-gated deferred cleanup for a GPU submission queue.
//!
//! Host-side cleanup (freeing buffers, releasing descriptor sets, notifying
//! callers) is staged with [`FenceScheduler::enqueue_cleanup_task_for_submitted_work`]
//! and bound to the next fence boundary, created either from a fence the
//! caller submitted ([`FenceScheduler::enqueue_fence`]) or from a marker the
//! scheduler submits itself ([`FenceScheduler::generate_cleanup_fence`]).
//! [`FenceScheduler::wait`] retires batches strictly in submission order and
//! recycles their fences; device loss fails every outstanding batch up to the
//! target with `device_lost = true` instead of dropping it.
#![allow(
    clippy::missing_docs_in_private_items,
    clippy::missing_inline_in_public_items,
    clippy::std_instead_of_core,
    reason = "Internal helpers are documented where the invariant is not obvious from the name"
)]

mod config;
mod device;
mod error;
mod handle;
mod pool;
mod queue;
mod scheduler;
pub mod sim;
mod staging;

pub use config::SchedulerConfig;
pub use device::{FenceDevice, FenceStatus};
pub use error::FenceError;
pub use handle::{FenceHandle, FenceId};
pub use scheduler::FenceScheduler;
pub use staging::{CleanupQueue, CleanupTask};
