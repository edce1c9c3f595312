// src/exec/backend.rs

//! Pluggable execution backend abstraction.
//!
//! The scheduler talks to a `Backend` instead of any concrete provider
//! client, so provider identity never leaks into scheduling logic.
//!
//! - [`CommandBackend`](super::command::CommandBackend) is the shipped
//!   production implementation (a subprocess bridge).
//! - Tests provide scripted implementations that, for example, always
//!   rate-limit or record invocation order.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use crate::dag::subtask::SubtaskId;

/// Classified backend failures. The kind decides the retry policy: only
/// `RateLimited` is ever retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorKind {
    RateLimited,
    NotFound,
    Timeout,
    ServerError,
    Unknown,
}

impl std::fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BackendErrorKind::RateLimited => "rate_limited",
            BackendErrorKind::NotFound => "not_found",
            BackendErrorKind::Timeout => "timeout",
            BackendErrorKind::ServerError => "server_error",
            BackendErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One failed invocation.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// One prompt dispatch.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub subtask_id: SubtaskId,
    pub prompt: String,
    /// Per-attempt deadline. The worker enforces it as well; it is handed to
    /// the backend so implementations can limit themselves (e.g. pass it to
    /// an HTTP client or a child process).
    pub deadline: Duration,
}

/// A successful invocation.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub text: String,
    /// Work units actually consumed, when the backend reports usage.
    pub usage: Option<u32>,
}

/// Trait abstracting an execution capability that turns a prompt into text.
pub trait Backend: Send + Sync {
    /// Stable id, matching the catalog descriptor this backend was
    /// registered under.
    fn id(&self) -> &str;

    /// Execute one prompt.
    ///
    /// `cancel` flips to `true` when the overall run is cancelled;
    /// implementations should abort promptly. The worker additionally races
    /// this future against the deadline and the cancel flag, so honouring
    /// `cancel` here only improves shutdown latency.
    fn invoke(
        &self,
        request: BackendRequest,
        cancel: watch::Receiver<bool>,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<BackendResponse, BackendError>> + Send + '_>>;
}
