use codeloom::dag::resolve::resolve;
use codeloom::dag::subtask::{ModelTier, Subtask, SubtaskKind};
use codeloom::route::catalog::BackendCatalog;
use codeloom::route::router::{assign, route_graph};
use codeloom_test_utils::builders::{DescriptorBuilder, DraftBuilder};

fn catalog() -> BackendCatalog {
    BackendCatalog::new(vec![
        DescriptorBuilder::new("free-local", ModelTier::Small)
            .tag("function")
            .context_window(8_192)
            .build(),
        DescriptorBuilder::new("cheap", ModelTier::Medium)
            .all_kinds()
            .cost(0.01)
            .context_window(32_000)
            .build(),
        DescriptorBuilder::new("premium", ModelTier::Remote)
            .all_kinds()
            .cost(0.05)
            .context_window(200_000)
            .build(),
    ])
}

fn subtask(id: &str, kind: SubtaskKind, work_units: u32) -> Subtask {
    Subtask {
        id: id.to_string(),
        description: format!("emit {id}"),
        complexity: 0.5,
        estimated_work_units: work_units,
        dependencies: Vec::new(),
        kind,
    }
}

#[test]
fn zero_cost_capable_backend_wins_when_cost_matters() {
    let assignment = assign(&subtask("f", SubtaskKind::Function, 200), &catalog(), true)
        .expect("catalog is not empty");

    assert_eq!(assignment.backend_id, "free-local");
    assert!(!assignment.best_effort);
    assert!(assignment.estimated_cost.abs() < 1e-9);
}

#[test]
fn zero_cost_backend_also_wins_on_price_for_kinds_it_is_not_tagged_for() {
    // free-local is not tagged for classes, but it still survives the context
    // filter and is the cheapest survivor.
    let assignment = assign(&subtask("c", SubtaskKind::Class, 200), &catalog(), true)
        .expect("catalog is not empty");

    assert_eq!(assignment.backend_id, "free-local");
    assert!(!assignment.best_effort);
}

#[test]
fn context_filter_removes_small_windows_before_cost_ranking() {
    // 4000 work units need more context than free-local offers, so the
    // cheapest of the remaining survivors wins.
    let assignment = assign(&subtask("c", SubtaskKind::Class, 4_000), &catalog(), true)
        .expect("catalog is not empty");

    assert_eq!(assignment.backend_id, "cheap");
    assert!(!assignment.best_effort);
    assert!((assignment.estimated_cost - 40.0).abs() < 1e-9);
}

#[test]
fn capability_preference_picks_the_strongest_survivor() {
    let assignment = assign(&subtask("f", SubtaskKind::Function, 200), &catalog(), false)
        .expect("catalog is not empty");

    assert_eq!(assignment.backend_id, "premium");
    assert!(!assignment.best_effort);
    assert!((assignment.estimated_cost - 10.0).abs() < 1e-9);
}

#[test]
fn oversized_subtask_degrades_to_a_best_effort_assignment() {
    // 100k work units exceed every context window in the catalog.
    let assignment = assign(&subtask("huge", SubtaskKind::Module, 100_000), &catalog(), true)
        .expect("catalog is not empty");

    assert_eq!(assignment.backend_id, "premium");
    assert!(assignment.best_effort);
    assert!((assignment.estimated_cost - 5_000.0).abs() < 1e-9);
}

#[test]
fn unavailable_backends_are_skipped_while_any_remain() {
    let catalog = BackendCatalog::new(vec![
        DescriptorBuilder::new("free-local", ModelTier::Small)
            .tag("function")
            .context_window(8_192)
            .build(),
        DescriptorBuilder::new("cheap", ModelTier::Medium)
            .all_kinds()
            .cost(0.01)
            .context_window(32_000)
            .build(),
        DescriptorBuilder::new("premium", ModelTier::Remote)
            .all_kinds()
            .cost(0.05)
            .context_window(200_000)
            .unavailable()
            .build(),
    ]);

    let assignment = assign(&subtask("f", SubtaskKind::Function, 200), &catalog, false)
        .expect("catalog is not empty");

    assert_eq!(assignment.backend_id, "cheap");
    assert!(!assignment.best_effort);
}

#[test]
fn fully_unavailable_catalog_still_routes_somewhere() {
    let catalog = BackendCatalog::new(vec![
        DescriptorBuilder::new("small", ModelTier::Small)
            .all_kinds()
            .unavailable()
            .build(),
        DescriptorBuilder::new("large", ModelTier::Large)
            .all_kinds()
            .cost(0.02)
            .context_window(64_000)
            .unavailable()
            .build(),
    ]);

    let assignment = assign(&subtask("f", SubtaskKind::Function, 200), &catalog, true)
        .expect("catalog still has entries");

    assert_eq!(assignment.backend_id, "large");
    assert!(assignment.best_effort);
}

#[test]
fn empty_catalog_yields_no_assignment() {
    let catalog = BackendCatalog::new(Vec::new());
    assert!(assign(&subtask("f", SubtaskKind::Function, 200), &catalog, true).is_none());
}

#[test]
fn route_graph_covers_every_subtask_and_sums_costs() {
    let (graph, _) = resolve(vec![
        DraftBuilder::new("a", "first piece").work_units(200).build(),
        DraftBuilder::new("b", "second piece")
            .work_units(400)
            .depends_on("a")
            .build(),
    ]);

    let table = route_graph(&graph, &catalog(), false);

    assert_eq!(table.len(), 2);
    assert_eq!(table.get("a").unwrap().backend_id, "premium");
    assert!((table.get("a").unwrap().estimated_cost - 10.0).abs() < 1e-9);
    assert!((table.get("b").unwrap().estimated_cost - 20.0).abs() < 1e-9);
    assert!((table.estimated_cost() - 30.0).abs() < 1e-9);
}
