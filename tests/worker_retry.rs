// tests/worker_retry.rs
//
// Drives the per-subtask attempt loop directly against a scripted backend.
// Every test runs on paused virtual time, so backoff windows and deadlines
// elapse instantly.

use std::sync::Arc;
use std::time::Duration;

use codeloom::exec::backend::{BackendErrorKind, BackendRequest};
use codeloom::exec::backoff::{BASE_DELAY, MAX_ATTEMPTS, MAX_DELAY, RateGate};
use codeloom::exec::worker::{WorkerOutcome, run_subtask};
use codeloom::sched::record::FailureCause;
use codeloom_test_utils::fake_backend::FakeBackend;
use codeloom_test_utils::init_tracing;
use tokio::sync::watch;
use tokio::time::Instant;

fn request(subtask_id: &str, deadline: Duration) -> BackendRequest {
    BackendRequest {
        subtask_id: subtask_id.to_string(),
        prompt: format!("write {subtask_id}"),
        deadline,
    }
}

#[tokio::test(start_paused = true)]
async fn backoff_windows_double_per_backend_up_to_the_cap() {
    init_tracing();
    let gate = RateGate::new();

    assert_eq!(gate.next_delay("m").await, BASE_DELAY);
    gate.note_rate_limited("m").await;
    assert_eq!(gate.next_delay("m").await, Duration::from_secs(2));
    gate.note_rate_limited("m").await;
    assert_eq!(gate.next_delay("m").await, Duration::from_secs(4));
    gate.note_rate_limited("m").await;
    assert_eq!(gate.next_delay("m").await, MAX_DELAY);
    gate.note_rate_limited("m").await;
    assert_eq!(gate.next_delay("m").await, MAX_DELAY);

    // The gate is keyed per backend and resets after a success.
    assert_eq!(gate.next_delay("other").await, BASE_DELAY);
    gate.note_success("m").await;
    assert_eq!(gate.next_delay("m").await, BASE_DELAY);
}

#[tokio::test(start_paused = true)]
async fn armed_window_delays_the_next_dispatch() {
    init_tracing();
    let gate = RateGate::new();
    let (_cancel_tx, mut cancel_rx) = watch::channel(false);

    gate.note_rate_limited("m").await;
    let start = Instant::now();
    assert!(gate.wait_ready("m", &mut cancel_rx).await);
    assert!(start.elapsed() >= BASE_DELAY);

    // Other backends pass through immediately.
    let start = Instant::now();
    assert!(gate.wait_ready("other", &mut cancel_rx).await);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn deadline_overrun_fails_without_retry() {
    init_tracing();
    let backend = Arc::new(FakeBackend::new("m"));
    backend.hang("stuck");
    let gate = Arc::new(RateGate::new());
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let outcome = run_subtask(
        backend.clone(),
        gate,
        request("stuck", Duration::from_millis(50)),
        cancel_rx,
    )
    .await;

    match outcome {
        WorkerOutcome::Failed { cause, attempts } => {
            assert_eq!(cause, FailureCause::Timeout { deadline_ms: 50 });
            assert_eq!(attempts, 1);
        }
        other => panic!("expected a timeout failure, got {other:?}"),
    }
    assert_eq!(backend.call_count("stuck"), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_rate_limits_retry_inside_the_budget() {
    init_tracing();
    let backend = Arc::new(FakeBackend::new("m"));
    backend.rate_limited_times("flaky", 2, "settled after backoff");
    let gate = Arc::new(RateGate::new());
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let start = Instant::now();
    let outcome = run_subtask(
        backend.clone(),
        gate,
        request("flaky", Duration::from_secs(30)),
        cancel_rx,
    )
    .await;

    match outcome {
        WorkerOutcome::Succeeded { text, attempts, .. } => {
            assert_eq!(text, "settled after backoff");
            assert_eq!(attempts, 3);
        }
        other => panic!("expected success after retries, got {other:?}"),
    }
    assert_eq!(backend.call_count("flaky"), 3);
    // Two windows elapsed between the three attempts: 1s then 2s.
    assert!(start.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn persistent_rate_limiting_exhausts_the_attempt_budget() {
    init_tracing();
    let backend = Arc::new(FakeBackend::new("m"));
    backend.fail("jammed", BackendErrorKind::RateLimited, "try later");
    let gate = Arc::new(RateGate::new());
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let outcome = run_subtask(
        backend.clone(),
        gate,
        request("jammed", Duration::from_secs(30)),
        cancel_rx,
    )
    .await;

    match outcome {
        WorkerOutcome::Failed { cause, attempts } => {
            assert_eq!(
                cause,
                FailureCause::RateLimitExhausted {
                    attempts: MAX_ATTEMPTS
                }
            );
            assert_eq!(attempts, MAX_ATTEMPTS);
        }
        other => panic!("expected rate-limit exhaustion, got {other:?}"),
    }
    assert_eq!(backend.call_count("jammed"), MAX_ATTEMPTS as usize);
}

#[tokio::test(start_paused = true)]
async fn server_errors_fail_immediately_without_retry() {
    init_tracing();
    let backend = Arc::new(FakeBackend::new("m"));
    backend.fail("broken", BackendErrorKind::ServerError, "boom");
    let gate = Arc::new(RateGate::new());
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let outcome = run_subtask(
        backend.clone(),
        gate,
        request("broken", Duration::from_secs(30)),
        cancel_rx,
    )
    .await;

    match outcome {
        WorkerOutcome::Failed { cause, attempts } => {
            assert_eq!(
                cause,
                FailureCause::Backend {
                    kind: BackendErrorKind::ServerError,
                    message: "boom".to_string(),
                }
            );
            assert_eq!(attempts, 1);
        }
        other => panic!("expected a backend failure, got {other:?}"),
    }
    assert_eq!(backend.call_count("broken"), 1);
}

#[tokio::test(start_paused = true)]
async fn backend_reported_timeout_follows_deadline_policy() {
    init_tracing();
    let backend = Arc::new(FakeBackend::new("m"));
    backend.fail("late", BackendErrorKind::Timeout, "took too long upstream");
    let gate = Arc::new(RateGate::new());
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let outcome = run_subtask(
        backend.clone(),
        gate,
        request("late", Duration::from_secs(2)),
        cancel_rx,
    )
    .await;

    match outcome {
        WorkerOutcome::Failed { cause, attempts } => {
            assert_eq!(cause, FailureCause::Timeout { deadline_ms: 2_000 });
            assert_eq!(attempts, 1);
        }
        other => panic!("expected a timeout failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_a_backoff_wait() {
    init_tracing();
    let backend = Arc::new(FakeBackend::new("m"));
    backend.fail("jammed", BackendErrorKind::RateLimited, "try later");
    let gate = Arc::new(RateGate::new());
    let (cancel_tx, cancel_rx) = watch::channel(false);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = cancel_tx.send(true);
    });

    let outcome = run_subtask(
        backend.clone(),
        gate,
        request("jammed", Duration::from_secs(30)),
        cancel_rx,
    )
    .await;

    match outcome {
        WorkerOutcome::Failed { cause, attempts } => {
            assert_eq!(cause, FailureCause::Cancelled);
            assert_eq!(attempts, 2);
        }
        other => panic!("expected a cancellation, got {other:?}"),
    }
    // The first attempt went out; the second never left the backoff gate.
    assert_eq!(backend.call_count("jammed"), 1);
}
