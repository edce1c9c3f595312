// src/progress.rs

//! Fire-and-forget progress notifications.
//!
//! The engine reports per-subtask lifecycle through an optional
//! [`ProgressSink`]. Calls are advisory only: the engine never waits on a sink
//! and scheduling is unaffected by anything the sink does. Implementations
//! must return quickly; anything slow (UI updates, network) belongs behind an
//! internal queue.

/// Observer for subtask lifecycle. All methods default to no-ops so an
/// implementation only overrides what it cares about.
pub trait ProgressSink: Send + Sync {
    /// A subtask was handed to its backend. `percent` is overall run
    /// completion at that moment, 0..=100.
    fn on_progress(&self, _subtask_id: &str, _percent: u8) {}

    /// A subtask finished successfully with the given output.
    fn on_complete(&self, _subtask_id: &str, _output: &str) {}

    /// A subtask reached Failed, including subtasks never dispatched because
    /// a dependency failed.
    fn on_fail(&self, _subtask_id: &str, _reason: &str) {}
}
