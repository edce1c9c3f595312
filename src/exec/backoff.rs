// src/exec/backoff.rs

//! Centralised per-backend rate-limit backoff.
//!
//! Every retry call site shares one [`RateGate`]. The gate keeps one backoff
//! window per backend id, so concurrent workers hitting the same
//! rate-limited backend wait out the same window instead of hammering it
//! from several slots at once.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tracing::{debug, info};

/// First backoff window after a rate-limit signal.
pub const BASE_DELAY: Duration = Duration::from_secs(1);

/// Backoff windows double up to this cap.
pub const MAX_DELAY: Duration = Duration::from_secs(8);

/// Invocation attempts per subtask while the backend keeps rate-limiting.
pub const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy)]
struct BackoffState {
    /// Window to apply on the next rate-limit signal.
    next_delay: Duration,
    /// Workers must not dispatch to this backend before this instant.
    blocked_until: Option<Instant>,
}

impl Default for BackoffState {
    fn default() -> Self {
        Self {
            next_delay: BASE_DELAY,
            blocked_until: None,
        }
    }
}

/// Shared backoff windows, one per backend id.
///
/// The lock is only held to read or update the map, never across a sleep.
#[derive(Default)]
pub struct RateGate {
    states: Mutex<HashMap<String, BackoffState>>,
}

impl RateGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until the backend's current backoff window (if any) has passed.
    ///
    /// Returns `false` if the run was cancelled while waiting.
    pub async fn wait_ready(&self, backend_id: &str, cancel: &mut watch::Receiver<bool>) -> bool {
        let blocked_until = {
            let states = self.states.lock().await;
            states
                .get(backend_id)
                .and_then(|s| s.blocked_until)
                .filter(|until| *until > Instant::now())
        };

        let Some(until) = blocked_until else {
            return true;
        };

        debug!(
            backend = %backend_id,
            wait_ms = until.saturating_duration_since(Instant::now()).as_millis() as u64,
            "backend in backoff window; waiting"
        );

        tokio::select! {
            _ = tokio::time::sleep_until(until) => true,
            changed = cancel.changed() => {
                // A closed channel means the run is tearing down anyway.
                !(changed.is_ok() && *cancel.borrow())
            }
        }
    }

    /// Record a rate-limit signal: arm the backend's window and double the
    /// next one, up to [`MAX_DELAY`].
    pub async fn note_rate_limited(&self, backend_id: &str) {
        let mut states = self.states.lock().await;
        let state = states.entry(backend_id.to_string()).or_default();

        let window = state.next_delay;
        state.blocked_until = Some(Instant::now() + window);
        state.next_delay = (window * 2).min(MAX_DELAY);

        info!(
            backend = %backend_id,
            window_ms = window.as_millis() as u64,
            "backend rate limited; pausing dispatches to it"
        );
    }

    /// Reset the backend's backoff after a successful call.
    pub async fn note_success(&self, backend_id: &str) {
        let mut states = self.states.lock().await;
        if states.remove(backend_id).is_some() {
            debug!(backend = %backend_id, "backoff window cleared after success");
        }
    }

    /// Current window applied on the next rate-limit signal, for diagnostics.
    pub async fn next_delay(&self, backend_id: &str) -> Duration {
        let states = self.states.lock().await;
        states
            .get(backend_id)
            .map(|s| s.next_delay)
            .unwrap_or(BASE_DELAY)
    }
}
