//! Deferred destruction of wgpu resources.
//!
//! Resources queued here stay alive until the work submitted before the next
//! fence boundary has finished, then get an explicit `destroy()`. On device
//! loss they are only dropped.

use fence_scheduler::CleanupQueue;
use wgpu::{Buffer, Texture};

/// Destroy GPU resources once the work that uses them is done.
pub trait DeferredDestroyExt {
    fn destroy_buffer_after_submitted_work(&self, buffer: Buffer);
    fn destroy_texture_after_submitted_work(&self, texture: Texture);
}

impl DeferredDestroyExt for CleanupQueue {
    fn destroy_buffer_after_submitted_work(&self, buffer: Buffer) {
        self.push(move |device_lost| {
            if !device_lost {
                buffer.destroy();
            }
        });
    }

    fn destroy_texture_after_submitted_work(&self, texture: Texture) {
        self.push(move |device_lost| {
            if !device_lost {
                texture.destroy();
            }
        });
    }
}
