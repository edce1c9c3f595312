use std::collections::HashMap;
use std::collections::HashSet;

use codeloom::dag::resolve::resolve;
use codeloom::dag::subtask::DraftSubtask;
use codeloom_test_utils::builders::DraftBuilder;
use proptest::prelude::*;

/// Drafts with ids drawn from a small pool so that duplicates, self-loops,
/// unknown references and cycles all occur regularly.
fn messy_drafts_strategy() -> impl Strategy<Value = Vec<DraftSubtask>> {
    let id = prop::sample::select(vec!["a", "b", "c", "d", "e", "f"]);
    let dep = prop::sample::select(vec!["a", "b", "c", "d", "e", "f", "ghost"]);
    proptest::collection::vec((id, proptest::collection::vec(dep, 0..4)), 1..7).prop_map(
        |nodes| {
            nodes
                .into_iter()
                .map(|(id, deps)| {
                    let mut builder = DraftBuilder::new(id, &format!("work on {id}"));
                    for dep in deps {
                        builder = builder.depends_on(dep);
                    }
                    builder.build()
                })
                .collect()
        },
    )
}

proptest! {
    #[test]
    fn resolution_always_yields_a_valid_dag(drafts in messy_drafts_strategy()) {
        let mut expected_ids: Vec<String> = Vec::new();
        for draft in &drafts {
            if !expected_ids.contains(&draft.id) {
                expected_ids.push(draft.id.clone());
            }
        }

        let (graph, report) = resolve(drafts);

        // 1. Every distinct input id survives; duplicates collapse.
        prop_assert_eq!(graph.len(), expected_ids.len());
        for id in &expected_ids {
            prop_assert!(graph.get(id).is_some());
        }

        // 2. The stored order is a true topological order over all nodes.
        let order = graph.topological_order();
        prop_assert_eq!(order.len(), graph.len());
        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        for id in &expected_ids {
            for dep in graph.dependencies_of(id) {
                prop_assert!(position[dep.as_str()] < position[id.as_str()]);
            }
        }

        // 3. Surviving dependencies are known, non-self and de-duplicated.
        let known: HashSet<&str> = expected_ids.iter().map(String::as_str).collect();
        for id in &expected_ids {
            let deps = graph.dependencies_of(id);
            let distinct: HashSet<&str> = deps.iter().map(String::as_str).collect();
            prop_assert_eq!(distinct.len(), deps.len());
            for dep in deps {
                prop_assert!(known.contains(dep.as_str()));
                prop_assert_ne!(dep, id);
            }
        }

        // 4. Repairs always name a surviving subtask as the edge owner.
        for dropped in &report.dropped {
            prop_assert!(known.contains(dropped.from.as_str()));
        }
    }
}

#[test]
fn repeated_dependency_declarations_collapse_to_one_edge() {
    let (graph, report) = resolve(vec![
        DraftBuilder::new("a", "base").build(),
        DraftBuilder::new("b", "uses a twice")
            .depends_on("a")
            .depends_on("a")
            .build(),
    ]);

    assert_eq!(graph.dependencies_of("b"), ["a".to_string()]);
    assert!(report.is_clean());
}

#[test]
fn duplicate_ids_keep_the_first_declaration() {
    let (graph, _) = resolve(vec![
        DraftBuilder::new("x", "first wins").build(),
        DraftBuilder::new("x", "second is ignored").build(),
    ]);

    assert_eq!(graph.len(), 1);
    let survivor = graph.get("x").unwrap();
    assert_eq!(survivor.description, "first wins");
}

#[test]
fn blank_ids_are_assigned_positional_names() {
    let (graph, _) = resolve(vec![
        DraftBuilder::new("named", "has an id").build(),
        DraftBuilder::new("  ", "missing an id").build(),
    ]);

    assert_eq!(graph.len(), 2);
    assert!(graph.get("s2").is_some());
    assert_eq!(graph.get("s2").unwrap().description, "missing an id");
}

#[test]
fn out_of_range_complexity_is_clamped() {
    let (graph, _) = resolve(vec![
        DraftBuilder::new("hot", "too big").complexity(7.5).build(),
        DraftBuilder::new("cold", "negative").complexity(-1.0).build(),
        DraftBuilder::new("odd", "not a number")
            .complexity(f64::NAN)
            .build(),
    ]);

    assert!((graph.get("hot").unwrap().complexity - 1.0).abs() < 1e-9);
    assert!(graph.get("cold").unwrap().complexity.abs() < 1e-9);
    assert!((graph.get("odd").unwrap().complexity - 0.5).abs() < 1e-9);
}
