use fence_scheduler::FenceError;
use log::{debug, error};
use pollster::block_on;
use wgpu::{CommandBuffer, Device, ErrorFilter, Queue};

/// Submit command buffers inside a validation error scope and map any error
/// into a [`FenceError::Device`].
///
/// # Errors
/// Returns an error if WGPU validation fails during command buffer submission.
pub fn submit_with_validation<I>(
    device: &Device,
    queue: &Queue,
    submissions: I,
) -> Result<(), FenceError>
where
    I: IntoIterator<Item = CommandBuffer>,
{
    device.push_error_scope(ErrorFilter::Validation);
    queue.submit(submissions);
    let res = block_on(device.pop_error_scope());
    if let Some(err) = res {
        error!(target: "wgpu_fence", "WGPU error (scoped submit): {err:?}");
        return Err(FenceError::device(format!(
            "wgpu scoped error on submit: {err:?}"
        )));
    }
    debug!(target: "wgpu_fence", "submit_with_validation: success");
    Ok(())
}
