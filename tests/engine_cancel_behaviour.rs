use std::sync::Arc;
use std::time::Duration;

use codeloom::dag::subtask::ModelTier;
use codeloom::engine::Engine;
use codeloom::errors::CodeloomError;
use codeloom::sched::record::FailureCause;
use codeloom_test_utils::builders::{descriptor, draft};
use codeloom_test_utils::fake_backend::FakeBackend;
use codeloom_test_utils::{init_tracing, with_timeout};
use tokio::sync::watch;

#[tokio::test]
async fn cancel_preserves_finished_work_and_stops_the_rest() {
    init_tracing();

    let backend = Arc::new(FakeBackend::new("fake"));
    backend.ok("quick", "quick part done early");
    backend.hang("stuck");

    let engine = Engine::builder()
        .backend(descriptor("fake", ModelTier::Medium), backend.clone())
        .build()
        .unwrap();

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = cancel_tx.send(true);
    });

    let drafts = vec![draft("quick", &[]), draft("stuck", &[])];
    let err = with_timeout(engine.run_plan_with_cancel(drafts, "two halves", cancel_rx))
        .await
        .unwrap_err();

    let report = match &err {
        CodeloomError::Cancelled(report) => report,
        other => panic!("expected Cancelled, got {other:?}"),
    };

    // The finished subtask survives the cancellation.
    let quick = &report.records["quick"];
    assert!(quick.succeeded());
    assert_eq!(quick.output.as_deref(), Some("quick part done early"));

    let stuck = &report.records["stuck"];
    assert!(stuck.failed());
    assert_eq!(stuck.error, Some(FailureCause::Cancelled));
}

#[tokio::test]
async fn already_cancelled_run_dispatches_nothing() {
    init_tracing();

    let backend = Arc::new(FakeBackend::new("fake"));

    let engine = Engine::builder()
        .backend(descriptor("fake", ModelTier::Medium), backend.clone())
        .build()
        .unwrap();

    let (cancel_tx, cancel_rx) = watch::channel(true);

    let drafts = vec![draft("a", &[]), draft("b", &["a"])];
    let err = with_timeout(engine.run_plan_with_cancel(drafts, "never starts", cancel_rx))
        .await
        .unwrap_err();
    drop(cancel_tx);

    assert!(matches!(err, CodeloomError::Cancelled(_)));
    assert!(backend.calls().is_empty());

    let report = match &err {
        CodeloomError::Cancelled(report) => report,
        other => panic!("expected Cancelled, got {other:?}"),
    };
    assert!(report.final_artifact.contains("automatic integration failed"));
    assert!(report.final_artifact.contains("<never dispatched>"));
}
