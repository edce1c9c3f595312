// src/dag/graph.rs

//! Resolved, read-only dependency graph over subtasks.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::dag::subtask::{Subtask, SubtaskId};

/// Internal node structure: the subtask plus its immediate dependents.
#[derive(Debug, Clone)]
struct GraphNode {
    subtask: Subtask,
    /// Subtasks that list this one as a dependency.
    dependents: Vec<SubtaskId>,
}

/// The resolved subtask graph.
///
/// Construction goes through [`resolve`](crate::dag::resolve::resolve), which
/// guarantees acyclicity; from then on the graph is read-only. Insertion
/// order is retained so that tie-breaking (critical path, scheduling order)
/// stays deterministic.
#[derive(Debug, Clone)]
pub struct SubtaskGraph {
    nodes: HashMap<SubtaskId, GraphNode>,
    /// Subtask ids in the order they were supplied.
    order: Vec<SubtaskId>,
    /// A topological order computed once at construction.
    topo: Vec<SubtaskId>,
}

impl SubtaskGraph {
    /// Build from subtasks whose dependency lists are already acyclic and
    /// reference only known ids. Called by the resolver after its edge-drop
    /// passes.
    pub(crate) fn from_resolved(subtasks: Vec<Subtask>) -> Self {
        let order: Vec<SubtaskId> = subtasks.iter().map(|s| s.id.clone()).collect();

        let mut nodes: HashMap<SubtaskId, GraphNode> = HashMap::new();
        for subtask in subtasks {
            nodes.insert(
                subtask.id.clone(),
                GraphNode {
                    subtask,
                    dependents: Vec::new(),
                },
            );
        }

        // Second pass: populate dependents based on dependency lists.
        for id in &order {
            let deps = nodes
                .get(id)
                .map(|n| n.subtask.dependencies.clone())
                .unwrap_or_default();

            for dep in deps {
                if let Some(dep_node) = nodes.get_mut(&dep) {
                    dep_node.dependents.push(id.clone());
                }
            }
        }

        let topo = topological_order(&order, &nodes);

        Self { nodes, order, topo }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Subtask ids in input order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    /// Subtasks in input order.
    pub fn subtasks(&self) -> impl Iterator<Item = &Subtask> {
        self.order.iter().filter_map(|id| self.get(id))
    }

    pub fn get(&self, id: &str) -> Option<&Subtask> {
        self.nodes.get(id).map(|n| &n.subtask)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Immediate dependencies of a subtask, in declaration order.
    pub fn dependencies_of(&self, id: &str) -> &[SubtaskId] {
        self.nodes
            .get(id)
            .map(|n| n.subtask.dependencies.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a subtask.
    pub fn dependents_of(&self, id: &str) -> &[SubtaskId] {
        self.nodes
            .get(id)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Subtasks with no dependencies; these seed the ready queue.
    pub fn roots(&self) -> Vec<SubtaskId> {
        self.order
            .iter()
            .filter(|id| self.dependencies_of(id).is_empty())
            .cloned()
            .collect()
    }

    /// Subtasks nothing depends on; synthesis ends at these.
    pub fn sinks(&self) -> Vec<SubtaskId> {
        self.order
            .iter()
            .filter(|id| self.dependents_of(id).is_empty())
            .cloned()
            .collect()
    }

    /// A topological order: every subtask appears after all its dependencies.
    pub fn topological_order(&self) -> &[SubtaskId] {
        &self.topo
    }
}

/// Compute an input-order-stable topological order.
///
/// Kahn's algorithm, taking at each step the earliest-supplied subtask whose
/// dependencies are all placed. Independent subtasks therefore keep their
/// input order, which keeps previews, tie-breaking and branch concatenation
/// deterministic.
fn topological_order(order: &[SubtaskId], nodes: &HashMap<SubtaskId, GraphNode>) -> Vec<SubtaskId> {
    let mut remaining: HashMap<&str, usize> = HashMap::new();
    for id in order {
        let deps = nodes
            .get(id)
            .map(|n| n.subtask.dependencies.len())
            .unwrap_or(0);
        remaining.insert(id.as_str(), deps);
    }

    let mut sorted: Vec<SubtaskId> = Vec::with_capacity(order.len());
    let mut placed: HashSet<&str> = HashSet::new();

    while sorted.len() < order.len() {
        let next = order.iter().find(|id| {
            !placed.contains(id.as_str())
                && remaining.get(id.as_str()).copied().unwrap_or(0) == 0
        });

        let Some(next) = next else {
            // Unreachable for graphs built by the resolver; fall back to
            // input order for whatever is left rather than panicking.
            warn!("topological sort stalled on a resolved graph; using input order");
            for id in order {
                if !placed.contains(id.as_str()) {
                    sorted.push(id.clone());
                }
            }
            break;
        };

        placed.insert(next.as_str());
        sorted.push(next.clone());

        if let Some(node) = nodes.get(next) {
            for dependent in &node.dependents {
                if let Some(count) = remaining.get_mut(dependent.as_str()) {
                    *count = count.saturating_sub(1);
                }
            }
        }
    }

    sorted
}
