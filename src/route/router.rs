// src/route/router.rs

//! Per-subtask backend assignment.
//!
//! Routing is stateless: each subtask is assigned independently against the
//! catalog snapshot, so the order subtasks are routed in never changes the
//! outcome.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::dag::graph::SubtaskGraph;
use crate::dag::subtask::{Subtask, SubtaskId};
use crate::route::catalog::{BackendCatalog, BackendDescriptor};

/// Prompt overhead added on top of the work-unit estimate when checking a
/// backend's context window, in work units.
const PROMPT_OVERHEAD_UNITS: u64 = 512;

/// The routing decision for one subtask.
#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub subtask_id: SubtaskId,
    pub backend_id: String,

    /// True when no backend satisfied the routing filters and the most
    /// capable one was chosen regardless of cost.
    pub best_effort: bool,

    /// `cost_per_unit` × estimated work units for this subtask.
    pub estimated_cost: f64,
}

/// Assignments for a whole graph plus the summed cost estimate.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    assignments: HashMap<SubtaskId, Assignment>,
    total_cost: f64,
}

impl RoutingTable {
    pub fn get(&self, id: &str) -> Option<&Assignment> {
        self.assignments.get(id)
    }

    pub fn estimated_cost(&self) -> f64 {
        self.total_cost
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

/// Estimated request size for a subtask, in work units.
fn required_context(subtask: &Subtask) -> u64 {
    u64::from(subtask.estimated_work_units) * 2 + PROMPT_OVERHEAD_UNITS
}

/// Assign one subtask to a backend.
///
/// Policy, in order:
/// 1. keep available backends whose context window covers the estimated size
/// 2. among survivors, prefer the first zero-cost backend tagged capable for
///    the subtask's kind (or, with `prefer_low_cost` off, the most capable
///    survivor)
/// 3. otherwise the cheapest survivor
/// 4. if nothing survives the filter, fall back to the most capable backend
///    regardless of cost and flag the assignment best-effort
///
/// Ties always go to the earlier catalog entry. Returns `None` only for an
/// empty catalog.
pub fn assign(
    subtask: &Subtask,
    catalog: &BackendCatalog,
    prefer_low_cost: bool,
) -> Option<Assignment> {
    let required = required_context(subtask);

    let survivors: Vec<&BackendDescriptor> = catalog
        .available()
        .filter(|d| u64::from(d.context_window) >= required)
        .collect();

    let chosen = if survivors.is_empty() {
        None
    } else if prefer_low_cost {
        survivors
            .iter()
            .find(|d| d.is_zero_cost() && d.capable_of(subtask.kind))
            .copied()
            .or_else(|| cheapest(&survivors))
    } else {
        most_capable(&survivors)
    };

    if let Some(descriptor) = chosen {
        let assignment = make_assignment(subtask, descriptor, false);
        debug!(
            subtask = %subtask.id,
            backend = %descriptor.id,
            tier = ?descriptor.tier,
            cost = assignment.estimated_cost,
            "routed subtask"
        );
        return Some(assignment);
    }

    // Nothing satisfies the filters: best-effort pick by capability. Prefer
    // available backends, but take an unavailable one over nothing.
    let all_available: Vec<&BackendDescriptor> = catalog.available().collect();
    let all_entries: Vec<&BackendDescriptor> = catalog.iter().collect();
    let fallback = most_capable(&all_available).or_else(|| most_capable(&all_entries))?;

    warn!(
        subtask = %subtask.id,
        backend = %fallback.id,
        required_units = required,
        "no backend satisfies routing filters; best-effort assignment"
    );
    Some(make_assignment(subtask, fallback, true))
}

/// Route every subtask in the graph, in input order.
pub fn route_graph(
    graph: &SubtaskGraph,
    catalog: &BackendCatalog,
    prefer_low_cost: bool,
) -> RoutingTable {
    let mut table = RoutingTable::default();

    for subtask in graph.subtasks() {
        if let Some(assignment) = assign(subtask, catalog, prefer_low_cost) {
            table.total_cost += assignment.estimated_cost;
            table.assignments.insert(subtask.id.clone(), assignment);
        }
    }

    table
}

fn make_assignment(subtask: &Subtask, descriptor: &BackendDescriptor, best_effort: bool) -> Assignment {
    Assignment {
        subtask_id: subtask.id.clone(),
        backend_id: descriptor.id.clone(),
        best_effort,
        estimated_cost: descriptor.cost_per_unit * f64::from(subtask.estimated_work_units),
    }
}

/// Cheapest entry; earlier catalog position wins ties via strict comparison.
fn cheapest<'a>(entries: &[&'a BackendDescriptor]) -> Option<&'a BackendDescriptor> {
    let mut best: Option<&'a BackendDescriptor> = None;
    for &entry in entries {
        match best {
            Some(current) if entry.cost_per_unit >= current.cost_per_unit => {}
            _ => best = Some(entry),
        }
    }
    best
}

/// Most capable entry: highest tier, then largest context window; earlier
/// catalog position wins ties.
fn most_capable<'a>(entries: &[&'a BackendDescriptor]) -> Option<&'a BackendDescriptor> {
    let mut best: Option<&'a BackendDescriptor> = None;
    for &entry in entries {
        let better = match best {
            None => true,
            Some(current) => {
                entry.tier > current.tier
                    || (entry.tier == current.tier && entry.context_window > current.context_window)
            }
        };
        if better {
            best = Some(entry);
        }
    }
    best
}
