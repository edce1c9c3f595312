// src/exec/worker.rs

//! Per-subtask attempt loop.
//!
//! One worker owns one dispatched subtask from first attempt to terminal
//! outcome. Policy:
//! - a deadline overrun fails the subtask immediately (retrying a timeout
//!   would compound latency)
//! - a rate-limit signal arms the shared gate and retries, up to
//!   [`MAX_ATTEMPTS`](crate::exec::backoff::MAX_ATTEMPTS)
//! - any other backend error fails the subtask immediately
//! - cancellation wins every race

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::exec::backend::{Backend, BackendErrorKind, BackendRequest};
use crate::exec::backoff::{MAX_ATTEMPTS, RateGate};
use crate::sched::record::FailureCause;

/// Terminal result of one subtask's worker.
#[derive(Debug, Clone)]
pub enum WorkerOutcome {
    Succeeded {
        text: String,
        usage: Option<u32>,
        attempts: u32,
    },
    Failed {
        cause: FailureCause,
        attempts: u32,
    },
}

/// Run one subtask against its assigned backend until a terminal outcome.
pub async fn run_subtask(
    backend: Arc<dyn Backend>,
    gate: Arc<RateGate>,
    request: BackendRequest,
    mut cancel: watch::Receiver<bool>,
) -> WorkerOutcome {
    let subtask_id = request.subtask_id.clone();
    let deadline = request.deadline;
    let deadline_ms = deadline.as_millis() as u64;
    let mut attempts = 0u32;

    while attempts < MAX_ATTEMPTS {
        attempts += 1;

        if !gate.wait_ready(backend.id(), &mut cancel).await || *cancel.borrow() {
            return WorkerOutcome::Failed {
                cause: FailureCause::Cancelled,
                attempts,
            };
        }

        debug!(
            subtask = %subtask_id,
            backend = %backend.id(),
            attempt = attempts,
            deadline_ms,
            "invoking backend"
        );

        let call = backend.invoke(request.clone(), cancel.clone());
        let result = tokio::select! {
            res = timeout(deadline, call) => res,
            _ = cancel.changed() => {
                return WorkerOutcome::Failed {
                    cause: FailureCause::Cancelled,
                    attempts,
                };
            }
        };

        match result {
            Err(_elapsed) => {
                warn!(
                    subtask = %subtask_id,
                    backend = %backend.id(),
                    deadline_ms,
                    "backend call exceeded its deadline"
                );
                return WorkerOutcome::Failed {
                    cause: FailureCause::Timeout { deadline_ms },
                    attempts,
                };
            }
            Ok(Ok(response)) => {
                gate.note_success(backend.id()).await;
                return WorkerOutcome::Succeeded {
                    text: response.text,
                    usage: response.usage,
                    attempts,
                };
            }
            Ok(Err(err)) => match err.kind {
                BackendErrorKind::RateLimited => {
                    warn!(
                        subtask = %subtask_id,
                        backend = %backend.id(),
                        attempt = attempts,
                        "backend rate limited"
                    );
                    gate.note_rate_limited(backend.id()).await;
                }
                BackendErrorKind::Timeout => {
                    // The backend noticed the overrun itself; same policy as
                    // a local deadline overrun.
                    return WorkerOutcome::Failed {
                        cause: FailureCause::Timeout { deadline_ms },
                        attempts,
                    };
                }
                _ => {
                    warn!(
                        subtask = %subtask_id,
                        backend = %backend.id(),
                        error = %err,
                        "backend call failed"
                    );
                    return WorkerOutcome::Failed {
                        cause: FailureCause::Backend {
                            kind: err.kind,
                            message: err.message,
                        },
                        attempts,
                    };
                }
            },
        }
    }

    WorkerOutcome::Failed {
        cause: FailureCause::RateLimitExhausted {
            attempts: MAX_ATTEMPTS,
        },
        attempts: MAX_ATTEMPTS,
    }
}
