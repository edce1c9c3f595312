// src/route/catalog.rs

//! Backend descriptors and the ranked catalog.

use serde::Serialize;

use crate::dag::subtask::{ModelTier, SubtaskKind};

/// Static description of one candidate backend.
///
/// Descriptors carry everything routing needs; the actual execution
/// capability lives behind the [`Backend`](crate::exec::backend::Backend)
/// trait and is looked up by id at dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct BackendDescriptor {
    pub id: String,

    /// Capability tier. Doubles as the deadline latency class: larger tiers
    /// are assumed slower and get proportionally more time.
    pub tier: ModelTier,

    /// Subtask-kind tags this backend is considered capable of.
    pub tags: Vec<String>,

    /// Cost per estimated work unit. Zero marks a local/free backend.
    pub cost_per_unit: f64,

    /// Largest request the backend can take, in work units.
    pub context_window: u32,

    /// Whether routing may pick this backend at all.
    pub available: bool,
}

impl BackendDescriptor {
    pub fn new(id: impl Into<String>, tier: ModelTier) -> Self {
        Self {
            id: id.into(),
            tier,
            tags: Vec::new(),
            cost_per_unit: 0.0,
            context_window: 8_192,
            available: true,
        }
    }

    pub fn is_zero_cost(&self) -> bool {
        self.cost_per_unit == 0.0
    }

    /// Whether this backend is tagged capable for the given subtask kind.
    pub fn capable_of(&self, kind: SubtaskKind) -> bool {
        let tag = kind.capability_tag();
        self.tags.iter().any(|t| t == tag)
    }
}

/// Ranked list of candidate backends.
///
/// Order is preference order: whenever routing has to break a tie, the
/// earlier entry wins. A snapshot (clone) is taken at the start of each task
/// run so mid-run catalog edits cannot skew routing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackendCatalog {
    entries: Vec<BackendDescriptor>,
}

impl BackendCatalog {
    pub fn new(entries: Vec<BackendDescriptor>) -> Self {
        Self { entries }
    }

    pub fn push(&mut self, descriptor: BackendDescriptor) {
        self.entries.push(descriptor);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BackendDescriptor> {
        self.entries.iter()
    }

    /// Entries routing may actually use, in rank order.
    pub fn available(&self) -> impl Iterator<Item = &BackendDescriptor> {
        self.entries.iter().filter(|d| d.available)
    }

    pub fn get(&self, id: &str) -> Option<&BackendDescriptor> {
        self.entries.iter().find(|d| d.id == id)
    }
}
