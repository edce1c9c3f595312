// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::dag::subtask::{DraftSubtask, ModelTier, SubtaskKind};
use crate::route::catalog::BackendDescriptor;
use crate::types::{DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_SUBTASK_TIMEOUT_MS, RunOptions};

/// Top-level plan as read from a TOML file.
///
/// A minimal plan only names backends and a task:
///
/// ```toml
/// task = "Build a small expression evaluator"
///
/// [backend.local]
/// cmd = "ollama-bridge --model code-small"
/// tier = "small"
/// ```
///
/// Subtasks are optional; when `[subtask.<id>]` sections are present the
/// plan is executed as written and no decomposition happens:
///
/// ```toml
/// [subtask.lexer]
/// description = "Tokenize the input expression"
/// complexity = 0.4
/// kind = "function"
///
/// [subtask.eval]
/// description = "Evaluate the token stream"
/// complexity = 0.6
/// kind = "function"
/// deps = ["lexer"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawPlanFile {
    /// The overall task description. May be empty when subtasks are given.
    #[serde(default)]
    pub task: String,

    /// Run options from `[options]`.
    #[serde(default)]
    pub options: OptionsSection,

    /// All backends from `[backend.<id>]`, in catalog rank order by id.
    #[serde(default)]
    pub backend: BTreeMap<String, BackendSection>,

    /// Pre-drafted subtasks from `[subtask.<id>]`.
    #[serde(default)]
    pub subtask: BTreeMap<String, SubtaskSection>,
}

/// `[options]` section. Every field falls back to the engine default.
#[derive(Debug, Clone, Deserialize)]
pub struct OptionsSection {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "default_max_subtask_timeout_ms")]
    pub max_subtask_timeout_ms: u64,

    #[serde(default = "default_prefer_low_cost")]
    pub prefer_low_cost: bool,
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_max_subtask_timeout_ms() -> u64 {
    DEFAULT_MAX_SUBTASK_TIMEOUT_MS
}

fn default_prefer_low_cost() -> bool {
    true
}

impl Default for OptionsSection {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_subtask_timeout_ms: default_max_subtask_timeout_ms(),
            prefer_low_cost: default_prefer_low_cost(),
        }
    }
}

/// `[backend.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendSection {
    /// Bridge command to run per invocation. It receives one JSON request
    /// frame on stdin and must answer with one JSON response frame on stdout.
    pub cmd: String,

    /// `"small"`, `"medium"`, `"large"` or `"remote"`.
    #[serde(default = "default_tier")]
    pub tier: ModelTier,

    #[serde(default)]
    pub cost_per_unit: f64,

    /// Largest request this backend takes, in work units.
    #[serde(default = "default_context_window")]
    pub context_window: u32,

    /// Subtask kinds this backend is considered capable of. Omitted means
    /// capable of every kind.
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_tier() -> ModelTier {
    ModelTier::Medium
}

fn default_context_window() -> u32 {
    8_192
}

fn default_available() -> bool {
    true
}

/// `[subtask.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SubtaskSection {
    pub description: String,

    #[serde(default = "default_complexity")]
    pub complexity: f64,

    #[serde(default = "default_work_units")]
    pub work_units: u32,

    /// One of the subtask kinds; unknown strings fall back to `other`.
    #[serde(default)]
    pub kind: Option<String>,

    #[serde(default, alias = "depends_on", alias = "dependencies")]
    pub deps: Vec<String>,
}

fn default_complexity() -> f64 {
    0.5
}

fn default_work_units() -> u32 {
    200
}

/// A validated plan, ready to drive an engine.
#[derive(Debug, Clone)]
pub struct PlanFile {
    task: String,
    options: OptionsSection,
    backend: BTreeMap<String, BackendSection>,
    subtask: BTreeMap<String, SubtaskSection>,
}

impl PlanFile {
    /// Construct without validation. Only `validate` should call this, after
    /// its checks have passed.
    pub(crate) fn new_unchecked(raw: RawPlanFile) -> Self {
        Self {
            task: raw.task,
            options: raw.options,
            backend: raw.backend,
            subtask: raw.subtask,
        }
    }

    pub fn task_text(&self) -> &str {
        &self.task
    }

    pub fn has_subtasks(&self) -> bool {
        !self.subtask.is_empty()
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            max_concurrency: self.options.max_concurrency,
            max_subtask_timeout_ms: self.options.max_subtask_timeout_ms,
            prefer_low_cost: self.options.prefer_low_cost,
        }
        .sanitised()
    }

    /// Subtask sections as drafts, in section-name order.
    pub fn drafts(&self) -> Vec<DraftSubtask> {
        self.subtask
            .iter()
            .map(|(id, section)| {
                let mut draft = DraftSubtask::new(id.clone(), section.description.clone());
                draft.complexity = section.complexity;
                draft.work_units = section.work_units;
                draft.dependencies = section.deps.clone();
                draft.kind = section
                    .kind
                    .as_deref()
                    .map(SubtaskKind::parse_lenient)
                    .unwrap_or_default();
                draft
            })
            .collect()
    }

    /// Catalog descriptors for every backend section.
    pub fn descriptors(&self) -> Vec<BackendDescriptor> {
        self.backend
            .iter()
            .map(|(id, section)| {
                let mut descriptor = BackendDescriptor::new(id.clone(), section.tier);
                descriptor.cost_per_unit = section.cost_per_unit;
                descriptor.context_window = section.context_window;
                descriptor.available = section.available;
                descriptor.tags = if section.tags.is_empty() {
                    all_kind_tags()
                } else {
                    section.tags.clone()
                };
                descriptor
            })
            .collect()
    }

    /// Backend ids with their bridge commands, for wiring implementations.
    pub fn commands(&self) -> impl Iterator<Item = (&str, &str)> {
        self.backend
            .iter()
            .map(|(id, section)| (id.as_str(), section.cmd.as_str()))
    }
}

fn all_kind_tags() -> Vec<String> {
    [
        SubtaskKind::Function,
        SubtaskKind::Class,
        SubtaskKind::Method,
        SubtaskKind::Interface,
        SubtaskKind::Type,
        SubtaskKind::Module,
        SubtaskKind::Test,
        SubtaskKind::Other,
    ]
    .iter()
    .map(|kind| kind.capability_tag().to_string())
    .collect()
}
