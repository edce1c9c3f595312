// src/dag/resolve.rs

//! Draft intake and cycle resolution.
//!
//! Upstream decomposition is generative and may hand us duplicate ids,
//! self-dependencies, references to subtasks that do not exist, or outright
//! cycles. None of that is a caller error: resolution repairs the graph by
//! dropping the offending *edges* (never whole subtasks) and reports what it
//! dropped. In the worst case the result is an edgeless, fully parallel
//! graph; resolution itself never fails.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dag::graph::SubtaskGraph;
use crate::dag::subtask::{DraftSubtask, Subtask, SubtaskId};

/// Why a dependency edge was removed during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// The dependency referenced an id not present in the subtask set.
    UnknownDependency,
    /// The subtask listed itself as a dependency.
    SelfDependency,
    /// The edge closed a cycle and was removed to restore acyclicity.
    CycleBreak,
}

/// One dependency edge removed during resolution: `from` depended on `to`.
#[derive(Debug, Clone, Serialize)]
pub struct DroppedEdge {
    pub from: SubtaskId,
    pub to: SubtaskId,
    pub reason: DropReason,
}

/// Everything resolution changed about the declared dependency relation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolutionReport {
    pub dropped: Vec<DroppedEdge>,
}

impl ResolutionReport {
    pub fn is_clean(&self) -> bool {
        self.dropped.is_empty()
    }
}

/// Resolve draft subtasks into a guaranteed-acyclic [`SubtaskGraph`].
///
/// Passes, in order:
/// 1. normalise drafts (fill missing ids, clamp complexity, de-duplicate ids)
/// 2. drop self-dependencies unconditionally
/// 3. drop dependencies on unknown ids
/// 4. repeatedly find a cycle with an explicit-stack DFS and remove the back
///    edge that closes it, until no cycle remains
///
/// Each step of pass 4 removes exactly one edge from a finite edge set, so
/// termination is guaranteed.
pub fn resolve(drafts: Vec<DraftSubtask>) -> (SubtaskGraph, ResolutionReport) {
    let mut report = ResolutionReport::default();
    let mut subtasks = normalise_drafts(drafts);

    let known: HashSet<SubtaskId> = subtasks.iter().map(|s| s.id.clone()).collect();

    for subtask in &mut subtasks {
        prune_declared_deps(subtask, &known, &mut report);
    }

    // Cycle pass over an id -> deps view of the pruned lists. The view is
    // rebuilt per iteration because each removal invalidates it.
    loop {
        let back_edge = {
            let deps: HashMap<&str, &[SubtaskId]> = subtasks
                .iter()
                .map(|s| (s.id.as_str(), s.dependencies.as_slice()))
                .collect();
            let order: Vec<&str> = subtasks.iter().map(|s| s.id.as_str()).collect();
            find_back_edge(&order, &deps)
        };

        let Some((from, to)) = back_edge else {
            break;
        };

        warn!(from = %from, to = %to, "cycle detected; dropping edge to restore acyclicity");
        if let Some(subtask) = subtasks.iter_mut().find(|s| s.id == from) {
            subtask.dependencies.retain(|d| *d != to);
        }
        report.dropped.push(DroppedEdge {
            from,
            to,
            reason: DropReason::CycleBreak,
        });
    }

    if report.is_clean() {
        debug!(subtasks = subtasks.len(), "dependency relation resolved without repairs");
    } else {
        info!(
            subtasks = subtasks.len(),
            dropped_edges = report.dropped.len(),
            "dependency relation repaired during resolution"
        );
    }

    (SubtaskGraph::from_resolved(subtasks), report)
}

/// Turn drafts into well-formed subtasks without touching the dependency
/// relation between distinct known ids.
fn normalise_drafts(drafts: Vec<DraftSubtask>) -> Vec<Subtask> {
    let mut seen: HashSet<SubtaskId> = HashSet::new();
    let mut subtasks = Vec::with_capacity(drafts.len());

    for (index, draft) in drafts.into_iter().enumerate() {
        let id = if draft.id.trim().is_empty() {
            format!("s{}", index + 1)
        } else {
            draft.id.trim().to_string()
        };

        if !seen.insert(id.clone()) {
            warn!(id = %id, "duplicate subtask id in drafts; keeping the first occurrence");
            continue;
        }

        let description = if draft.description.trim().is_empty() {
            debug!(id = %id, "draft has no description; using its id");
            id.clone()
        } else {
            draft.description.trim().to_string()
        };

        let complexity = if draft.complexity.is_finite() {
            draft.complexity.clamp(0.0, 1.0)
        } else {
            0.5
        };

        subtasks.push(Subtask {
            id,
            description,
            complexity,
            estimated_work_units: draft.work_units.max(1),
            dependencies: draft.dependencies,
            kind: draft.kind,
        });
    }

    subtasks
}

/// Drop self-dependencies and dependencies on unknown ids, de-duplicating
/// repeated entries while keeping declaration order.
fn prune_declared_deps(
    subtask: &mut Subtask,
    known: &HashSet<SubtaskId>,
    report: &mut ResolutionReport,
) {
    let mut kept: Vec<SubtaskId> = Vec::with_capacity(subtask.dependencies.len());

    for dep in subtask.dependencies.drain(..) {
        let dep = dep.trim().to_string();

        if dep == subtask.id {
            warn!(id = %subtask.id, "removing self-dependency");
            report.dropped.push(DroppedEdge {
                from: subtask.id.clone(),
                to: dep,
                reason: DropReason::SelfDependency,
            });
            continue;
        }
        if !known.contains(&dep) {
            warn!(id = %subtask.id, dep = %dep, "dropping dependency on unknown subtask");
            report.dropped.push(DroppedEdge {
                from: subtask.id.clone(),
                to: dep,
                reason: DropReason::UnknownDependency,
            });
            continue;
        }
        if kept.contains(&dep) {
            continue;
        }
        kept.push(dep);
    }

    subtask.dependencies = kept;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitColor {
    /// On the current DFS stack.
    Active,
    /// Fully explored.
    Done,
}

/// One DFS frame: a node and the index of the next dependency to follow.
struct Frame<'a> {
    id: &'a str,
    next_dep: usize,
}

/// Find one back edge (an edge into a node currently on the DFS stack), or
/// `None` if the relation is acyclic.
///
/// The traversal follows dependency edges (node → its dependency) with an
/// explicit frame stack and per-call-local colour state, so pathological
/// inputs cannot blow the call stack and repeated calls cannot interfere
/// with each other.
fn find_back_edge(
    order: &[&str],
    deps: &HashMap<&str, &[SubtaskId]>,
) -> Option<(SubtaskId, SubtaskId)> {
    let mut colors: HashMap<&str, VisitColor> = HashMap::new();

    for &start in order {
        if colors.contains_key(start) {
            continue;
        }

        let mut stack: Vec<Frame> = vec![Frame {
            id: start,
            next_dep: 0,
        }];
        colors.insert(start, VisitColor::Active);

        while let Some(frame) = stack.last_mut() {
            let frame_deps: &[SubtaskId] = deps.get(frame.id).copied().unwrap_or(&[]);

            if frame.next_dep < frame_deps.len() {
                let dep = frame_deps[frame.next_dep].as_str();
                frame.next_dep += 1;

                match colors.get(dep) {
                    Some(VisitColor::Active) => {
                        // This edge closes a cycle.
                        return Some((frame.id.to_string(), dep.to_string()));
                    }
                    Some(VisitColor::Done) => {}
                    None => {
                        colors.insert(dep, VisitColor::Active);
                        stack.push(Frame {
                            id: dep,
                            next_dep: 0,
                        });
                    }
                }
            } else {
                colors.insert(frame.id, VisitColor::Done);
                stack.pop();
            }
        }
    }

    None
}
