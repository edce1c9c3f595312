// tests/engine_rate_limit.rs

use std::sync::Arc;

use codeloom::dag::subtask::ModelTier;
use codeloom::engine::Engine;
use codeloom::errors::CodeloomError;
use codeloom::exec::backend::BackendErrorKind;
use codeloom::exec::backoff::MAX_ATTEMPTS;
use codeloom::sched::record::FailureCause;
use codeloom_test_utils::builders::{descriptor, draft};
use codeloom_test_utils::fake_backend::{FakeBackend, Reply};
use codeloom_test_utils::init_tracing;

#[tokio::test(start_paused = true)]
async fn persistent_rate_limit_fails_subtask_and_blocks_dependent() {
    init_tracing();

    let backend = Arc::new(FakeBackend::new("fake"));
    backend.fail("x", BackendErrorKind::RateLimited, "quota exceeded");

    let engine = Engine::builder()
        .backend(descriptor("fake", ModelTier::Medium), backend.clone())
        .build()
        .unwrap();

    let drafts = vec![draft("x", &[]), draft("y", &["x"])];
    let err = engine
        .run_plan(drafts, "two dependent steps")
        .await
        .unwrap_err();

    // Both subtasks failed, so the run as a whole fails, report attached.
    let report = match &err {
        CodeloomError::AllSubtasksFailed(report) => report,
        other => panic!("expected AllSubtasksFailed, got {other:?}"),
    };

    // x burned the whole retry budget, backoff windows in between.
    assert_eq!(backend.call_count("x"), MAX_ATTEMPTS as usize);
    let x = &report.records["x"];
    assert!(x.failed());
    assert_eq!(
        x.error,
        Some(FailureCause::RateLimitExhausted {
            attempts: MAX_ATTEMPTS
        })
    );

    // y was never dispatched at all.
    assert_eq!(backend.call_count("y"), 0);
    let y = &report.records["y"];
    assert!(y.failed());
    assert_eq!(y.backend_id, None);
    assert_eq!(
        y.error,
        Some(FailureCause::BlockedByDependency {
            dependency: "x".to_string()
        })
    );

    assert!(report.final_artifact.contains("automatic integration failed"));
}

#[tokio::test(start_paused = true)]
async fn rate_limited_branch_does_not_take_down_unrelated_work() {
    init_tracing();

    let backend = Arc::new(FakeBackend::new("fake"));
    backend.fail("x", BackendErrorKind::RateLimited, "quota exceeded");
    backend.ok("z", "independent branch output");

    let engine = Engine::builder()
        .backend(descriptor("fake", ModelTier::Medium), backend.clone())
        .build()
        .unwrap();

    let drafts = vec![draft("x", &[]), draft("y", &["x"]), draft("z", &[])];
    let report = engine
        .run_plan(drafts, "partial failure still yields results")
        .await
        .unwrap();

    assert!(report.records["x"].failed());
    assert!(report.records["y"].failed());
    assert!(report.records["z"].succeeded());
    assert_eq!(report.final_artifact, "independent branch output");
    assert!(!report.synthesis.degraded);
}

#[tokio::test(start_paused = true)]
async fn transient_rate_limit_recovers_within_the_attempt_budget() {
    init_tracing();

    let backend = Arc::new(FakeBackend::new("fake"));
    backend.script(
        "flaky",
        Reply::RateLimitedTimes {
            times: 2,
            then: "recovered on the third attempt".to_string(),
        },
    );

    let engine = Engine::builder()
        .backend(descriptor("fake", ModelTier::Medium), backend.clone())
        .build()
        .unwrap();

    let drafts = vec![draft("flaky", &[])];
    let report = engine
        .run_plan(drafts, "one stubborn subtask")
        .await
        .unwrap();

    assert_eq!(backend.call_count("flaky"), 3);
    let record = &report.records["flaky"];
    assert!(record.succeeded());
    assert_eq!(record.attempts, 3);
    assert_eq!(report.final_artifact, "recovered on the third attempt");
}
