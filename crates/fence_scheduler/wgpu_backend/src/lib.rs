//! wgpu backend for the fence scheduler.
//! Provides the `FenceDevice` implementation over a wgpu device/queue plus
//! helpers for caller-driven submissions and deferred resource destruction.
#![allow(
    clippy::missing_docs_in_private_items,
    clippy::missing_inline_in_public_items,
    clippy::std_instead_of_core,
    clippy::missing_trait_methods,
    reason = "GPU backend code follows WGPU naming"
)]

mod deferred;
mod device;
mod error;
mod submit;

pub use deferred::DeferredDestroyExt;
pub use device::{WgpuFence, WgpuFenceConfig, WgpuFenceDevice};
pub use error::submit_with_validation;
pub use submit::{SubmitExt, WgpuFenceScheduler};
