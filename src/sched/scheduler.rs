//! Pure scheduling state machine.
//!
//! Tracks every subtask through `Pending → Ready → Running → {Succeeded |
//! Failed}` and answers two questions for the runtime: which subtasks became
//! ready after a completion, and which dependents are now hopeless because an
//! upstream subtask failed. All methods are synchronous and deterministic,
//! which keeps the interesting semantics directly testable without a Tokio
//! runtime.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::dag::graph::SubtaskGraph;
use crate::dag::subtask::SubtaskId;
use crate::sched::record::SubtaskState;

/// A dependent that was failed without dispatch, and the failed dependency
/// that blocked it (the nearest one, for transitive chains).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedSubtask {
    pub id: SubtaskId,
    pub failed_dependency: SubtaskId,
}

/// Structured result of a single scheduler step.
///
/// Useful for tests that drive the state machine by hand and assert exactly
/// what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Subtasks that moved `Pending → Ready` in this step.
    pub newly_ready: Vec<SubtaskId>,
    /// Subtasks failed in this step without dispatch because a dependency
    /// failed (transitively included).
    pub newly_blocked: Vec<BlockedSubtask>,
    /// Whether this step left every subtask in a terminal state.
    pub run_just_finished: bool,
}

/// Per-run states plus the (read-only) adjacency needed to advance them.
pub struct Scheduler {
    states: HashMap<SubtaskId, SubtaskState>,
    deps: HashMap<SubtaskId, Vec<SubtaskId>>,
    dependents: HashMap<SubtaskId, Vec<SubtaskId>>,
    /// Input order, for deterministic iteration.
    order: Vec<SubtaskId>,
}

impl Scheduler {
    pub fn new(graph: &SubtaskGraph) -> Self {
        let order: Vec<SubtaskId> = graph.ids().map(|s| s.to_string()).collect();
        let mut states = HashMap::new();
        let mut deps = HashMap::new();
        let mut dependents = HashMap::new();

        for id in &order {
            states.insert(id.clone(), SubtaskState::Pending);
            deps.insert(id.clone(), graph.dependencies_of(id).to_vec());
            dependents.insert(id.clone(), graph.dependents_of(id).to_vec());
        }

        Self {
            states,
            deps,
            dependents,
            order,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn state(&self, id: &str) -> Option<SubtaskState> {
        self.states.get(id).copied()
    }

    /// All dependencies Succeeded?
    pub fn deps_satisfied(&self, id: &str) -> bool {
        let Some(deps) = self.deps.get(id) else {
            return false;
        };
        deps.iter()
            .all(|dep| self.states.get(dep) == Some(&SubtaskState::Succeeded))
    }

    /// Move every `Pending` subtask whose dependencies are all Succeeded to
    /// `Ready`, returning them in input order.
    ///
    /// Decide first, then mutate, so the borrow of `states` during the
    /// dependency check never overlaps with the update.
    pub fn collect_ready(&mut self) -> Vec<SubtaskId> {
        let candidates: Vec<SubtaskId> = self
            .order
            .iter()
            .filter(|id| {
                self.states.get(id.as_str()) == Some(&SubtaskState::Pending)
                    && self.deps_satisfied(id)
            })
            .cloned()
            .collect();

        for id in &candidates {
            debug!(subtask = %id, "dependencies satisfied; marking Ready");
            self.states.insert(id.clone(), SubtaskState::Ready);
        }

        candidates
    }

    /// Mark a `Ready` subtask as dispatched.
    pub fn mark_running(&mut self, id: &str) {
        match self.states.get(id) {
            Some(SubtaskState::Ready) => {
                self.states.insert(id.to_string(), SubtaskState::Running);
            }
            other => {
                warn!(subtask = %id, state = ?other, "mark_running on a subtask that is not Ready");
            }
        }
    }

    /// Record a successful completion and collect newly ready dependents.
    pub fn record_success(&mut self, id: &str) -> SchedulerStep {
        self.states.insert(id.to_string(), SubtaskState::Succeeded);

        let newly_ready = self.collect_ready();
        SchedulerStep {
            newly_ready,
            newly_blocked: Vec::new(),
            run_just_finished: self.is_complete(),
        }
    }

    /// Record a failure and cascade it: every dependent that can no longer
    /// run is marked `Failed` here, so the runtime never has to dispatch and
    /// then abort them.
    ///
    /// The cascade walks dependents with an explicit stack; each blocked
    /// subtask records its nearest failed dependency as the cause.
    pub fn record_failure(&mut self, id: &str) -> SchedulerStep {
        self.states.insert(id.to_string(), SubtaskState::Failed);

        let mut newly_blocked = Vec::new();
        let mut stack: Vec<(SubtaskId, SubtaskId)> = self
            .dependents
            .get(id)
            .map(|deps| {
                deps.iter()
                    .map(|d| (d.clone(), id.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        while let Some((dependent, failed_dep)) = stack.pop() {
            match self.states.get(&dependent) {
                Some(SubtaskState::Pending) | Some(SubtaskState::Ready) => {
                    debug!(
                        subtask = %dependent,
                        dependency = %failed_dep,
                        "marking dependent Failed due to upstream failure"
                    );
                    self.states.insert(dependent.clone(), SubtaskState::Failed);

                    if let Some(grandchildren) = self.dependents.get(&dependent) {
                        stack.extend(
                            grandchildren
                                .iter()
                                .map(|g| (g.clone(), dependent.clone())),
                        );
                    }
                    newly_blocked.push(BlockedSubtask {
                        id: dependent,
                        failed_dependency: failed_dep,
                    });
                }
                Some(SubtaskState::Running)
                | Some(SubtaskState::Succeeded)
                | Some(SubtaskState::Failed)
                | None => {
                    // Terminal, in flight, or unknown; nothing to cascade.
                }
            }
        }

        SchedulerStep {
            newly_ready: Vec::new(),
            newly_blocked,
            run_just_finished: self.is_complete(),
        }
    }

    /// Whether every subtask has reached a terminal state.
    pub fn is_complete(&self) -> bool {
        !self.states.values().any(|s| !s.is_terminal())
    }

    /// Number of subtasks in a terminal state, for progress reporting.
    pub fn terminal_count(&self) -> usize {
        self.states.values().filter(|s| s.is_terminal()).count()
    }
}
