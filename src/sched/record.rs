// src/sched/record.rs

//! Execution records and failure causes.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dag::subtask::SubtaskId;
use crate::exec::backend::BackendErrorKind;

/// Per-run state of a subtask (scheduler internal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtaskState {
    /// Waiting on at least one dependency.
    Pending,
    /// All dependencies Succeeded; queued for a worker slot.
    Ready,
    /// Dispatched to a backend and currently in flight.
    Running,
    Succeeded,
    Failed,
}

impl SubtaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SubtaskState::Succeeded | SubtaskState::Failed)
    }
}

/// Record-facing status. `Ready` is a scheduling detail, so records collapse
/// it into `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl From<SubtaskState> for SubtaskStatus {
    fn from(state: SubtaskState) -> Self {
        match state {
            SubtaskState::Pending | SubtaskState::Ready => SubtaskStatus::Pending,
            SubtaskState::Running => SubtaskStatus::Running,
            SubtaskState::Succeeded => SubtaskStatus::Succeeded,
            SubtaskState::Failed => SubtaskStatus::Failed,
        }
    }
}

/// Why a subtask ended up `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureCause {
    /// The backend call exceeded its deadline. Timeouts are never retried.
    Timeout { deadline_ms: u64 },
    /// The backend kept rate-limiting across the whole attempt budget.
    RateLimitExhausted { attempts: u32 },
    /// The backend reported a non-retryable error.
    Backend {
        #[serde(rename = "error_kind")]
        kind: BackendErrorKind,
        message: String,
    },
    /// A dependency failed, so this subtask was never dispatched.
    BlockedByDependency { dependency: SubtaskId },
    /// The run was cancelled while this subtask was in flight.
    Cancelled,
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureCause::Timeout { deadline_ms } => {
                write!(f, "timed out after {deadline_ms}ms")
            }
            FailureCause::RateLimitExhausted { attempts } => {
                write!(f, "rate limited on all {attempts} attempts")
            }
            FailureCause::Backend { kind, message } => {
                write!(f, "backend error ({kind}): {message}")
            }
            FailureCause::BlockedByDependency { dependency } => {
                write!(f, "blocked by failed dependency '{dependency}'")
            }
            FailureCause::Cancelled => write!(f, "cancelled before completion"),
        }
    }
}

/// Per-subtask execution record.
///
/// Created lazily when the subtask is dispatched (or when it is blocked by a
/// failed dependency), owned exclusively by the runtime loop, and finalized
/// exactly once. After finalization it is read-only.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub subtask_id: SubtaskId,
    pub status: SubtaskStatus,

    /// Backend the subtask was dispatched to; `None` for subtasks that never
    /// reached a backend (blocked by a failed dependency).
    pub backend_id: Option<String>,

    /// Whether the routing decision was a best-effort fallback.
    pub best_effort_backend: bool,

    pub output: Option<String>,
    pub error: Option<FailureCause>,

    /// Backend invocations made for this subtask (retries included).
    pub attempts: u32,

    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionRecord {
    /// Record for a subtask handed to a worker slot just now.
    pub fn dispatched(subtask_id: SubtaskId, backend_id: String, best_effort: bool) -> Self {
        Self {
            subtask_id,
            status: SubtaskStatus::Running,
            backend_id: Some(backend_id),
            best_effort_backend: best_effort,
            output: None,
            error: None,
            attempts: 0,
            started_at: Some(Utc::now()),
            finished_at: None,
        }
    }

    /// Record for a subtask failed without dispatch because a dependency
    /// failed.
    pub fn blocked(subtask_id: SubtaskId, dependency: SubtaskId) -> Self {
        Self {
            subtask_id,
            status: SubtaskStatus::Failed,
            backend_id: None,
            best_effort_backend: false,
            output: None,
            error: Some(FailureCause::BlockedByDependency { dependency }),
            attempts: 0,
            started_at: None,
            finished_at: Some(Utc::now()),
        }
    }

    pub fn finalize_success(&mut self, output: String, attempts: u32) {
        self.status = SubtaskStatus::Succeeded;
        self.output = Some(output);
        self.attempts = attempts;
        self.finished_at = Some(Utc::now());
    }

    pub fn finalize_failure(&mut self, cause: FailureCause, attempts: u32) {
        self.status = SubtaskStatus::Failed;
        self.error = Some(cause);
        self.attempts = attempts;
        self.finished_at = Some(Utc::now());
    }

    pub fn succeeded(&self) -> bool {
        self.status == SubtaskStatus::Succeeded
    }

    pub fn failed(&self) -> bool {
        self.status == SubtaskStatus::Failed
    }
}
