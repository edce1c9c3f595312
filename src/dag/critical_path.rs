// src/dag/critical_path.rs

//! Critical path analysis over the resolved graph.
//!
//! The critical path is the maximum-weight chain from any source (no
//! dependencies) to any sink (no dependents), with subtask cost defined as
//! its complexity. It is used for scheduling priority hints and reporting
//! only; removing it would not change *which* subtasks run.

use std::collections::HashMap;

use crate::dag::graph::SubtaskGraph;
use crate::dag::subtask::{Subtask, SubtaskId};

/// Cost of one subtask on a path.
fn cost(subtask: &Subtask) -> f64 {
    subtask.complexity
}

/// Result of the longest-path pass.
#[derive(Debug, Clone)]
pub struct PathAnalysis {
    /// Source-to-sink subtask ids along the maximum-weight chain, in
    /// execution order. Empty only for an empty graph.
    pub critical_path: Vec<SubtaskId>,
    /// For every subtask, the weight of the heaviest chain ending at it
    /// (inclusive). Doubles as the scheduler's priority hint: subtasks deeper
    /// into heavy chains dispatch first among equals.
    pub distance_through: HashMap<SubtaskId, f64>,
}

impl PathAnalysis {
    /// Total weight of the critical path.
    pub fn total_cost(&self) -> f64 {
        self.critical_path
            .last()
            .and_then(|id| self.distance_through.get(id))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn priority_of(&self, id: &str) -> f64 {
        self.distance_through.get(id).copied().unwrap_or(0.0)
    }
}

/// Dynamic programming over the topological order.
///
/// For each subtask, the heaviest chain ending at it is its own cost plus the
/// best among its dependencies; a predecessor map records which dependency
/// won so the path can be reconstructed backwards from the best sink.
/// Ties are broken by declaration order (strict comparison keeps the first
/// candidate seen), so results are stable for a given input.
pub fn analyse(graph: &SubtaskGraph) -> PathAnalysis {
    let mut distance: HashMap<SubtaskId, f64> = HashMap::new();
    let mut previous: HashMap<SubtaskId, Option<SubtaskId>> = HashMap::new();

    for id in graph.topological_order() {
        let Some(subtask) = graph.get(id) else {
            continue;
        };

        let mut best_dep: Option<SubtaskId> = None;
        let mut best_distance = 0.0_f64;

        for dep in &subtask.dependencies {
            let dep_distance = distance.get(dep).copied().unwrap_or(0.0);
            if best_dep.is_none() || dep_distance > best_distance {
                best_dep = Some(dep.clone());
                best_distance = dep_distance;
            }
        }

        distance.insert(id.clone(), best_distance + cost(subtask));
        previous.insert(id.clone(), best_dep);
    }

    // The path ends at the heaviest sink; first in input order wins ties.
    let mut end: Option<SubtaskId> = None;
    let mut end_distance = f64::NEG_INFINITY;
    for id in graph.sinks() {
        let d = distance.get(&id).copied().unwrap_or(0.0);
        if end.is_none() || d > end_distance {
            end_distance = d;
            end = Some(id);
        }
    }

    let mut critical_path = Vec::new();
    let mut cursor = end;
    while let Some(id) = cursor {
        cursor = previous.get(&id).cloned().flatten();
        critical_path.push(id);
    }
    critical_path.reverse();

    PathAnalysis {
        critical_path,
        distance_through: distance,
    }
}
