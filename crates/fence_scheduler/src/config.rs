/// Tuning knobs for a [`crate::FenceScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerConfig {
    /// Fences created up front so the first submissions skip native creation.
    pub initial_fences: usize,
    /// Upper bound on idle fences kept for reuse. Surplus fences are destroyed
    /// on release. `None` keeps every fence.
    pub max_idle_fences: Option<usize>,
}
