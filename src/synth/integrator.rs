// src/synth/integrator.rs

//! Bottom-up merge of per-subtask outputs into one artifact.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dag::graph::SubtaskGraph;
use crate::dag::subtask::{SubtaskId, SubtaskKind};
use crate::sched::record::ExecutionRecord;
use crate::synth::validate::check_merged;

/// One entry in the working results map: the consolidated output for a
/// subtask together with the base subtasks it already incorporates.
#[derive(Debug, Clone)]
struct MergedUnit {
    parts: Vec<SubtaskId>,
    text: String,
    degraded: bool,
}

/// What synthesis did, for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisSummary {
    /// True when any merge group fell back to marked concatenation, or when
    /// no subtask output survived at all.
    pub degraded: bool,
    /// Subtasks whose merge group failed validation.
    pub fallback_groups: Vec<SubtaskId>,
    /// Terminal subtasks whose merged outputs form the artifact.
    pub terminal_branches: Vec<SubtaskId>,
}

#[derive(Debug, Clone)]
pub struct SynthesisOutcome {
    pub artifact: String,
    pub summary: SynthesisSummary,
}

/// Merge subtask outputs bottom-up along the resolved graph.
///
/// Walks the topological order; each subtask with successful output is folded
/// together with the already-merged outputs of its dependencies, the merged
/// unit replacing the subtask's entry in the working map. Diamond-shaped
/// graphs are handled by tracking which base subtasks a unit already
/// incorporates, so a shared ancestor's output appears once.
///
/// This never fails. A merge that fails validation degrades to a labeled
/// concatenation of its pieces; a run with no successful output at all yields
/// a marked listing of whatever the records hold.
pub fn synthesize(
    graph: &SubtaskGraph,
    records: &BTreeMap<SubtaskId, ExecutionRecord>,
) -> SynthesisOutcome {
    let order = graph.topological_order();

    // Raw outputs of everything that succeeded. The scheduler only marks a
    // subtask Succeeded once its output is recorded.
    let mut raw: HashMap<&str, String> = HashMap::new();
    for id in order {
        if let Some(record) = records.get(id) {
            if record.succeeded() {
                raw.insert(id.as_str(), record.output.clone().unwrap_or_default());
            }
        }
    }

    if raw.is_empty() {
        warn!("no subtask produced usable output; emitting failure listing");
        return SynthesisOutcome {
            artifact: failure_listing(graph, records),
            summary: SynthesisSummary {
                degraded: true,
                fallback_groups: Vec::new(),
                terminal_branches: Vec::new(),
            },
        };
    }

    // A lone subtask's output is passed through untouched, whatever it looks
    // like.
    if graph.len() == 1 {
        let id = order[0].clone();
        let text = raw.remove(id.as_str()).unwrap_or_default();
        return SynthesisOutcome {
            artifact: text,
            summary: SynthesisSummary {
                degraded: false,
                fallback_groups: Vec::new(),
                terminal_branches: vec![id],
            },
        };
    }

    let mut units: HashMap<SubtaskId, MergedUnit> = HashMap::new();
    let mut fallback_groups: Vec<SubtaskId> = Vec::new();

    for id in order {
        if !raw.contains_key(id.as_str()) {
            continue;
        }
        let kind = graph.get(id).map(|s| s.kind).unwrap_or(SubtaskKind::Other);

        // Pieces feeding this merge group, in dependency-declaration order.
        // While every incoming unit is clean, pieces are re-drawn from the
        // base outputs so a diamond's shared ancestor is included once; as
        // soon as a degraded unit is involved its marked text is kept intact.
        let inherited_degraded = graph
            .dependencies_of(id)
            .iter()
            .any(|dep| units.get(dep).is_some_and(|u| u.degraded));

        let mut parts: Vec<SubtaskId> = Vec::new();
        let mut pieces: Vec<(SubtaskId, String)> = Vec::new();

        for dep in graph.dependencies_of(id) {
            let Some(unit) = units.get(dep) else {
                continue;
            };
            if inherited_degraded {
                pieces.push((dep.clone(), unit.text.clone()));
                for part in &unit.parts {
                    if !parts.contains(part) {
                        parts.push(part.clone());
                    }
                }
            } else {
                for part in &unit.parts {
                    if !parts.contains(part) {
                        parts.push(part.clone());
                        if let Some(text) = raw.get(part.as_str()) {
                            pieces.push((part.clone(), text.clone()));
                        }
                    }
                }
            }
        }
        parts.push(id.clone());
        if let Some(text) = raw.get(id.as_str()) {
            pieces.push((id.clone(), text.clone()));
        }

        let candidate = pieces
            .iter()
            .map(|(_, text)| text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let (text, degraded) = match check_merged(kind, &candidate) {
            None => {
                debug!(subtask = %id, parts = parts.len(), "merged group");
                (candidate, inherited_degraded)
            }
            Some(issue) => {
                warn!(
                    subtask = %id,
                    issue = %issue,
                    "merge failed validation; keeping pieces unmerged"
                );
                fallback_groups.push(id.clone());
                (render_unmerged(graph, &pieces), true)
            }
        };

        units.insert(
            id.clone(),
            MergedUnit {
                parts,
                text,
                degraded,
            },
        );
    }

    // Terminal branches: merged units no successful dependent consumed.
    let terminals: Vec<SubtaskId> = order
        .iter()
        .filter(|id| units.contains_key(*id))
        .filter(|id| {
            graph
                .dependents_of(id)
                .iter()
                .all(|dep| !units.contains_key(dep))
        })
        .cloned()
        .collect();

    let artifact = if terminals.len() == 1 {
        units
            .remove(&terminals[0])
            .map(|u| u.text)
            .unwrap_or_default()
    } else {
        info!(
            branches = terminals.len(),
            "multiple terminal branches; concatenating"
        );
        let mut out = String::new();
        for (i, tid) in terminals.iter().enumerate() {
            if i > 0 {
                out.push_str("\n\n");
            }
            out.push_str(&format!("======== branch: {} ========\n", tid));
            if let Some(unit) = units.get(tid) {
                out.push_str(&unit.text);
            }
        }
        out
    };

    SynthesisOutcome {
        artifact,
        summary: SynthesisSummary {
            degraded: !fallback_groups.is_empty(),
            fallback_groups,
            terminal_branches: terminals,
        },
    }
}

/// Marked concatenation used when a merge group fails validation.
fn render_unmerged(graph: &SubtaskGraph, pieces: &[(SubtaskId, String)]) -> String {
    let mut out = String::new();
    for (id, text) in pieces {
        let label = graph
            .get(id)
            .map(|s| s.description.as_str())
            .unwrap_or(id.as_str());
        out.push_str(&format!("---- unmerged: {} ----\n", label));
        out.push_str(text);
        if !text.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

/// Worst-case artifact: nothing succeeded, so list what every subtask left
/// behind instead of returning nothing.
fn failure_listing(graph: &SubtaskGraph, records: &BTreeMap<SubtaskId, ExecutionRecord>) -> String {
    let mut out = String::from("automatic integration failed: no subtask produced usable output\n");
    for id in graph.topological_order() {
        out.push_str(&format!("\n---- {} ----\n", id));
        match records.get(id) {
            Some(record) => {
                if let Some(output) = &record.output {
                    out.push_str(output);
                    if !output.ends_with('\n') {
                        out.push('\n');
                    }
                }
                if let Some(error) = &record.error {
                    out.push_str(&format!("<failed: {}>\n", error));
                }
                if record.output.is_none() && record.error.is_none() {
                    out.push_str("<no output recorded>\n");
                }
            }
            None => out.push_str("<never dispatched>\n"),
        }
    }
    out
}
