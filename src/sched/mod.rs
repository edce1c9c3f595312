// src/sched/mod.rs

//! Per-run scheduling state.
//!
//! - [`record`] holds the per-subtask execution record and failure causes.
//! - [`scheduler`] is the pure state machine deciding which subtasks are
//!   ready, and how failures propagate to dependents. It knows nothing about
//!   async execution; the engine runtime drives it with completion events.

pub mod record;
pub mod scheduler;

pub use record::{ExecutionRecord, FailureCause, SubtaskState, SubtaskStatus};
pub use scheduler::{BlockedSubtask, Scheduler, SchedulerStep};
