// src/engine/report.rs

//! Run outcome surfaced to callers.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::dag::resolve::DroppedEdge;
use crate::dag::subtask::SubtaskId;
use crate::sched::record::ExecutionRecord;
use crate::synth::integrator::SynthesisSummary;

/// Everything one run produced.
///
/// Returned on success and carried inside the error when the run fails
/// outright, so partial results are never lost.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    /// The synthesized artifact, or the marked fallback listing when
    /// synthesis had nothing usable to merge.
    pub final_artifact: String,

    /// Per-subtask execution records. Subtasks never dispatched (cancelled
    /// runs) have no entry.
    pub records: BTreeMap<SubtaskId, ExecutionRecord>,

    /// Subtask ids on the highest-cost dependency chain, in execution order.
    pub critical_path: Vec<SubtaskId>,

    /// Summed routing cost estimate, in catalog cost units.
    pub estimated_cost: f64,

    /// Dependency edges dropped while resolving the draft graph.
    pub dropped_edges: Vec<DroppedEdge>,

    pub synthesis: SynthesisSummary,
}

impl TaskReport {
    pub fn succeeded_count(&self) -> usize {
        self.records.values().filter(|r| r.succeeded()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.records.values().filter(|r| r.failed()).count()
    }

    /// At least one subtask produced output.
    pub fn any_succeeded(&self) -> bool {
        self.records.values().any(|r| r.succeeded())
    }

    /// Records that degraded in some way: best-effort routing or failure.
    pub fn degraded_records(&self) -> impl Iterator<Item = &ExecutionRecord> {
        self.records
            .values()
            .filter(|r| r.best_effort_backend || r.failed())
    }
}
