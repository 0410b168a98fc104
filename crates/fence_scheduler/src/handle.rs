//! Value handles handed out by the scheduler.

/// Slot index of a native fence inside the fence pool.
///
/// A `FenceId` is a move-only token: it exists only while a fence is out of
/// the pool, held either by the caller between `acquire_fence` and
/// `enqueue_fence`/`release_fence` or by the pending batch it guards. Both of
/// those consume it, so one slot can never be queued or pooled twice.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct FenceId(pub(crate) u32);

impl FenceId {
    /// Raw slot index, mostly useful for logging.
    pub const fn index(&self) -> u32 {
        self.0
    }
}

/// Identifies a fence-bound batch by its generation.
///
/// Generations start at 1 and grow by one per boundary. The default handle
/// (generation 0) is invalid and never passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FenceHandle {
    generation: u64,
}

impl FenceHandle {
    pub(crate) const fn from_generation(generation: u64) -> Self {
        Self { generation }
    }

    pub const fn generation(self) -> u64 {
        self.generation
    }

    pub const fn is_valid(self) -> bool {
        self.generation != 0
    }
}
