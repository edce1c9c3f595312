use std::fs;

use codeloom::config::{load_and_validate, load_from_path};
use codeloom::dag::subtask::{ModelTier, SubtaskKind};
use codeloom::errors::CodeloomError;
use codeloom_test_utils::init_tracing;
use tempfile::tempdir;

const GOOD_PLAN: &str = r#"
task = "build a small parser"

[options]
max_concurrency = 2

[backend.local]
cmd = "ollama-bridge"
tier = "small"

[backend.remote]
cmd = "api-bridge"
tier = "remote"
cost_per_unit = 0.02
context_window = 32000
tags = ["function", "class", "module"]

[subtask.grammar]
description = "write the grammar"
complexity = 0.4
kind = "module"

[subtask.codegen]
description = "generate the parser from the grammar"
deps = ["grammar"]
work_units = 400
"#;

fn write_plan(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Codeloom.toml");
    fs::write(&path, contents).unwrap();
    (dir, path)
}

#[test]
fn valid_plan_loads_with_defaults_filled_in() {
    init_tracing();

    let (_dir, path) = write_plan(GOOD_PLAN);
    let plan = load_and_validate(&path).unwrap();

    assert_eq!(plan.task_text(), "build a small parser");
    assert!(plan.has_subtasks());

    let options = plan.run_options();
    assert_eq!(options.max_concurrency, 2);
    assert_eq!(options.max_subtask_timeout_ms, 120_000);
    assert!(options.prefer_low_cost);

    // Sections come out in id order.
    let drafts = plan.drafts();
    assert_eq!(drafts.len(), 2);
    assert_eq!(drafts[0].id, "codegen");
    assert_eq!(drafts[0].dependencies, vec!["grammar".to_string()]);
    assert_eq!(drafts[0].work_units, 400);
    assert_eq!(drafts[1].id, "grammar");
    assert_eq!(drafts[1].kind, SubtaskKind::Module);

    let descriptors = plan.descriptors();
    assert_eq!(descriptors.len(), 2);
    assert_eq!(descriptors[0].id, "local");
    assert_eq!(descriptors[0].tier, ModelTier::Small);
    assert_eq!(descriptors[0].context_window, 8_192);
    // An omitted tag list means capable of everything.
    assert!(descriptors[0].tags.len() >= 8);
    assert_eq!(descriptors[1].id, "remote");
    assert_eq!(descriptors[1].tags, vec!["function", "class", "module"]);

    let commands: Vec<(String, String)> = plan
        .commands()
        .map(|(id, cmd)| (id.to_string(), cmd.to_string()))
        .collect();
    assert!(commands.contains(&("local".to_string(), "ollama-bridge".to_string())));
}

#[test]
fn plan_without_backends_is_rejected() {
    let (_dir, path) = write_plan(
        r#"
task = "no way to run this"

[subtask.one]
description = "the only step"
"#,
    );

    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, CodeloomError::PlanError(_)));
}

#[test]
fn plan_without_task_or_subtasks_is_rejected() {
    let (_dir, path) = write_plan(
        r#"
[backend.local]
cmd = "bridge"
"#,
    );

    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, CodeloomError::PlanError(_)));
}

#[test]
fn unknown_dependency_in_a_plan_is_rejected() {
    let (_dir, path) = write_plan(
        r#"
[backend.local]
cmd = "bridge"

[subtask.a]
description = "first"
deps = ["nowhere"]
"#,
    );

    let err = load_and_validate(&path).unwrap_err();
    match err {
        CodeloomError::PlanError(message) => assert!(message.contains("nowhere")),
        other => panic!("expected PlanError, got {other:?}"),
    }
}

#[test]
fn dependency_cycle_in_a_plan_is_rejected() {
    let (_dir, path) = write_plan(
        r#"
[backend.local]
cmd = "bridge"

[subtask.a]
description = "first"
deps = ["b"]

[subtask.b]
description = "second"
deps = ["a"]
"#,
    );

    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, CodeloomError::PlanError(_)));
}

#[test]
fn out_of_range_complexity_is_rejected() {
    let (_dir, path) = write_plan(
        r#"
[backend.local]
cmd = "bridge"

[subtask.a]
description = "first"
complexity = 1.5
"#,
    );

    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, CodeloomError::PlanError(_)));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("does-not-exist.toml");

    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, CodeloomError::IoError(_)));
}

#[test]
fn broken_toml_is_a_parse_error() {
    let (_dir, path) = write_plan("task = \"unterminated");

    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, CodeloomError::TomlError(_)));
}
