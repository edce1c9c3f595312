//! Small shared types used across the crate.

/// Default number of worker slots pulling from the ready queue.
pub const DEFAULT_MAX_CONCURRENCY: usize = 3;

/// Default upper bound for a single subtask deadline, in milliseconds.
pub const DEFAULT_MAX_SUBTASK_TIMEOUT_MS: u64 = 120_000;

/// Caller-facing knobs for one task run.
///
/// Unrecognised concerns deliberately have no home here; everything else is
/// wired through the `Engine` builder instead.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Maximum number of subtasks allowed to run concurrently.
    ///
    /// `1` degrades to strictly sequential execution in topological order.
    pub max_concurrency: usize,

    /// Hard cap on any single subtask deadline, in milliseconds.
    ///
    /// The per-subtask deadline is sized from complexity and backend tier and
    /// then clamped to this value.
    pub max_subtask_timeout_ms: u64,

    /// Prefer cheap backends when routing.
    ///
    /// When `false`, routing prefers the most capable surviving backend
    /// instead of the cheapest one.
    pub prefer_low_cost: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_subtask_timeout_ms: DEFAULT_MAX_SUBTASK_TIMEOUT_MS,
            prefer_low_cost: true,
        }
    }
}

impl RunOptions {
    /// Clamp nonsensical values instead of failing the run.
    ///
    /// A zero concurrency or timeout would deadlock the scheduler, so both
    /// are raised to their minimum useful value.
    pub fn sanitised(mut self) -> Self {
        if self.max_concurrency == 0 {
            self.max_concurrency = 1;
        }
        if self.max_subtask_timeout_ms == 0 {
            self.max_subtask_timeout_ms = DEFAULT_MAX_SUBTASK_TIMEOUT_MS;
        }
        self
    }
}
