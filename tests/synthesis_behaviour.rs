use std::collections::BTreeMap;

use codeloom::dag::resolve::resolve;
use codeloom::dag::subtask::SubtaskKind;
use codeloom::sched::record::{ExecutionRecord, FailureCause};
use codeloom::synth::synthesize;
use codeloom_test_utils::builders::{draft, DraftBuilder};
use codeloom_test_utils::init_tracing;

fn success_record(id: &str, output: &str) -> ExecutionRecord {
    let mut record = ExecutionRecord::dispatched(id.to_string(), "fake".to_string(), false);
    record.finalize_success(output.to_string(), 1);
    record
}

fn failure_record(id: &str) -> ExecutionRecord {
    let mut record = ExecutionRecord::dispatched(id.to_string(), "fake".to_string(), false);
    record.finalize_failure(
        FailureCause::Backend {
            kind: codeloom::exec::backend::BackendErrorKind::ServerError,
            message: "boom".to_string(),
        },
        1,
    );
    record
}

#[test]
fn single_subtask_output_passes_through_unmodified() {
    init_tracing();

    let (graph, _) = resolve(vec![draft("only", &[])]);
    let mut records = BTreeMap::new();
    // Deliberately odd formatting; passthrough must not touch it.
    records.insert(
        "only".to_string(),
        success_record("only", "  x  \n\n\ttrailing tab\t"),
    );

    let outcome = synthesize(&graph, &records);
    assert_eq!(outcome.artifact, "  x  \n\n\ttrailing tab\t");
    assert!(!outcome.summary.degraded);
    assert_eq!(outcome.summary.terminal_branches, vec!["only".to_string()]);
}

#[test]
fn failed_validation_falls_back_to_labeled_concatenation() {
    init_tracing();

    // The top of the chain claims to produce a class, but neither output
    // carries anything class-shaped, so the merge check must reject it.
    let drafts = vec![
        draft("base", &[]),
        DraftBuilder::new("top", "wrap it all up")
            .depends_on("base")
            .kind(SubtaskKind::Class)
            .build(),
    ];
    let (graph, _) = resolve(drafts);

    let mut records = BTreeMap::new();
    records.insert(
        "base".to_string(),
        success_record("base", "plain prose body one"),
    );
    records.insert(
        "top".to_string(),
        success_record("top", "plain prose body two"),
    );

    let outcome = synthesize(&graph, &records);

    assert!(outcome.summary.degraded);
    assert_eq!(outcome.summary.fallback_groups, vec!["top".to_string()]);

    // Every original output is still present, labeled by description.
    assert!(outcome.artifact.contains("---- unmerged: subtask base ----"));
    assert!(outcome.artifact.contains("plain prose body one"));
    assert!(outcome.artifact.contains("---- unmerged: wrap it all up ----"));
    assert!(outcome.artifact.contains("plain prose body two"));
}

#[test]
fn multiple_terminal_branches_are_concatenated_with_separators() {
    init_tracing();

    let (graph, _) = resolve(vec![draft("left", &[]), draft("right", &[])]);

    let mut records = BTreeMap::new();
    records.insert(
        "left".to_string(),
        success_record("left", "left branch payload"),
    );
    records.insert(
        "right".to_string(),
        success_record("right", "right branch payload"),
    );

    let outcome = synthesize(&graph, &records);

    assert_eq!(
        outcome.summary.terminal_branches,
        vec!["left".to_string(), "right".to_string()]
    );
    assert!(outcome.artifact.contains("======== branch: left ========"));
    assert!(outcome.artifact.contains("left branch payload"));
    assert!(outcome.artifact.contains("======== branch: right ========"));
    assert!(outcome.artifact.contains("right branch payload"));
}

#[test]
fn diamond_includes_the_shared_ancestor_once() {
    init_tracing();

    let drafts = vec![
        draft("a", &[]),
        draft("b", &["a"]),
        draft("c", &["a"]),
        draft("d", &["b", "c"]),
    ];
    let (graph, _) = resolve(drafts);

    let mut records = BTreeMap::new();
    records.insert("a".to_string(), success_record("a", "alpha-payload body"));
    records.insert("b".to_string(), success_record("b", "beta-payload body"));
    records.insert("c".to_string(), success_record("c", "gamma-payload body"));
    records.insert("d".to_string(), success_record("d", "delta-payload body"));

    let outcome = synthesize(&graph, &records);

    // The shared ancestor appears exactly once despite two paths to d.
    assert_eq!(outcome.artifact.matches("alpha-payload").count(), 1);
    assert_eq!(outcome.artifact.matches("beta-payload").count(), 1);
    assert_eq!(outcome.artifact.matches("gamma-payload").count(), 1);
    assert_eq!(outcome.artifact.matches("delta-payload").count(), 1);
    assert_eq!(outcome.summary.terminal_branches, vec!["d".to_string()]);
}

#[test]
fn all_failed_still_yields_a_marked_listing() {
    init_tracing();

    let (graph, _) = resolve(vec![draft("w", &[]), draft("v", &["w"])]);

    let mut records = BTreeMap::new();
    records.insert("w".to_string(), failure_record("w"));
    // v never ran: blocked by w.
    records.insert(
        "v".to_string(),
        ExecutionRecord::blocked("v".to_string(), "w".to_string()),
    );

    let outcome = synthesize(&graph, &records);

    assert!(outcome.summary.degraded);
    assert!(outcome
        .artifact
        .starts_with("automatic integration failed: no subtask produced usable output"));
    assert!(outcome.artifact.contains("---- w ----"));
    assert!(outcome.artifact.contains("<failed: backend error (server_error): boom>"));
    assert!(outcome.artifact.contains("---- v ----"));
    assert!(outcome
        .artifact
        .contains("<failed: blocked by failed dependency 'w'>"));
}

#[test]
fn partial_failure_keeps_the_successful_frontier() {
    init_tracing();

    // mid fails, so top never consumes base; base's merged unit becomes the
    // surviving terminal branch.
    let drafts = vec![
        draft("base", &[]),
        draft("mid", &["base"]),
        draft("top", &["mid"]),
    ];
    let (graph, _) = resolve(drafts);

    let mut records = BTreeMap::new();
    records.insert(
        "base".to_string(),
        success_record("base", "base survived fine"),
    );
    records.insert("mid".to_string(), failure_record("mid"));
    records.insert(
        "top".to_string(),
        ExecutionRecord::blocked("top".to_string(), "mid".to_string()),
    );

    let outcome = synthesize(&graph, &records);

    assert_eq!(outcome.artifact, "base survived fine");
    assert_eq!(outcome.summary.terminal_branches, vec!["base".to_string()]);
    assert!(!outcome.summary.degraded);
}
