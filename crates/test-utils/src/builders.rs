#![allow(dead_code)]

use codeloom::dag::subtask::{DraftSubtask, ModelTier, SubtaskKind};
use codeloom::route::catalog::BackendDescriptor;

/// Builder for `DraftSubtask` to simplify test setup.
pub struct DraftBuilder {
    draft: DraftSubtask,
}

impl DraftBuilder {
    pub fn new(id: &str, description: &str) -> Self {
        Self {
            draft: DraftSubtask::new(id, description),
        }
    }

    pub fn depends_on(mut self, dep: &str) -> Self {
        self.draft.dependencies.push(dep.to_string());
        self
    }

    pub fn complexity(mut self, value: f64) -> Self {
        self.draft.complexity = value;
        self
    }

    pub fn work_units(mut self, units: u32) -> Self {
        self.draft.work_units = units;
        self
    }

    pub fn kind(mut self, kind: SubtaskKind) -> Self {
        self.draft.kind = kind;
        self
    }

    pub fn build(self) -> DraftSubtask {
        self.draft
    }
}

/// Shorthand: a draft with the given id and dependencies, default everything
/// else.
pub fn draft(id: &str, deps: &[&str]) -> DraftSubtask {
    let mut builder = DraftBuilder::new(id, &format!("subtask {id}"));
    for dep in deps {
        builder = builder.depends_on(dep);
    }
    builder.build()
}

/// Builder for `BackendDescriptor`.
pub struct DescriptorBuilder {
    descriptor: BackendDescriptor,
}

impl DescriptorBuilder {
    pub fn new(id: &str, tier: ModelTier) -> Self {
        Self {
            descriptor: BackendDescriptor::new(id, tier),
        }
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.descriptor.tags.push(tag.to_string());
        self
    }

    /// Tag the descriptor as capable of every subtask kind.
    pub fn all_kinds(mut self) -> Self {
        for kind in [
            SubtaskKind::Function,
            SubtaskKind::Class,
            SubtaskKind::Method,
            SubtaskKind::Interface,
            SubtaskKind::Type,
            SubtaskKind::Module,
            SubtaskKind::Test,
            SubtaskKind::Other,
        ] {
            self.descriptor.tags.push(kind.capability_tag().to_string());
        }
        self
    }

    pub fn cost(mut self, cost_per_unit: f64) -> Self {
        self.descriptor.cost_per_unit = cost_per_unit;
        self
    }

    pub fn context_window(mut self, units: u32) -> Self {
        self.descriptor.context_window = units;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.descriptor.available = false;
        self
    }

    pub fn build(self) -> BackendDescriptor {
        self.descriptor
    }
}

/// Shorthand: an available, free, all-kinds descriptor.
pub fn descriptor(id: &str, tier: ModelTier) -> BackendDescriptor {
    DescriptorBuilder::new(id, tier).all_kinds().build()
}
