use core::fmt::{Display, Formatter, Result as FmtResult};
use std::error::Error;

use crate::handle::FenceHandle;

/// Errors surfaced by the fence scheduler and its device collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FenceError {
    /// Native object creation, reset or submission failed.
    Device(String),
    /// The device was lost. Outstanding cleanup ran with `device_lost = true`.
    DeviceLost,
    /// The handle was default-constructed or never issued by this scheduler.
    InvalidHandle(FenceHandle),
}

impl FenceError {
    /// Build a [`FenceError::Device`] from anything printable.
    pub fn device(msg: impl Display) -> Self {
        Self::Device(msg.to_string())
    }
}

impl Display for FenceError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Device(msg) => write!(formatter, "Device error: {msg}"),
            Self::DeviceLost => write!(formatter, "Device lost"),
            Self::InvalidHandle(handle) => {
                write!(formatter, "Invalid fence handle: {handle:?}")
            }
        }
    }
}

impl Error for FenceError {}
