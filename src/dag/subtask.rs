// src/dag/subtask.rs

//! Subtask metadata: the unit of decomposed work.

use serde::{Deserialize, Deserializer, Serialize};

/// Public type alias for subtask identifiers throughout the crate.
pub type SubtaskId = String;

/// What shape of code a subtask is expected to produce.
///
/// The kind informs prompt shaping and whether a contextual snippet lookup
/// is worth attempting before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtaskKind {
    Function,
    Class,
    Method,
    Interface,
    Type,
    Module,
    Test,
    Other,
}

impl Default for SubtaskKind {
    fn default() -> Self {
        SubtaskKind::Other
    }
}

impl SubtaskKind {
    /// Whether snippet lookup is attempted for this kind.
    ///
    /// Code-shaped units benefit from seeing related existing code; tests and
    /// unclassified units are dispatched without lookup.
    pub fn wants_snippets(self) -> bool {
        !matches!(self, SubtaskKind::Test | SubtaskKind::Other)
    }

    /// The capability tag a backend must carry to count as "capable" for
    /// subtasks of this kind.
    pub fn capability_tag(self) -> &'static str {
        match self {
            SubtaskKind::Function => "function",
            SubtaskKind::Class => "class",
            SubtaskKind::Method => "method",
            SubtaskKind::Interface => "interface",
            SubtaskKind::Type => "type",
            SubtaskKind::Module => "module",
            SubtaskKind::Test => "test",
            SubtaskKind::Other => "other",
        }
    }

    /// Lenient parse for upstream-generated text; anything unknown maps to
    /// `Other` rather than failing the whole draft list.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "function" | "fn" | "func" => SubtaskKind::Function,
            "class" => SubtaskKind::Class,
            "method" => SubtaskKind::Method,
            "interface" => SubtaskKind::Interface,
            "type" => SubtaskKind::Type,
            "module" => SubtaskKind::Module,
            "test" | "tests" => SubtaskKind::Test,
            _ => SubtaskKind::Other,
        }
    }
}

/// Model tier recommended for a subtask, derived from its complexity.
///
/// Ordering matters: `Remote` is the most capable (and typically slowest /
/// most expensive) tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Small,
    Medium,
    Large,
    Remote,
}

impl ModelTier {
    /// Fixed complexity thresholds: ≤0.3 small, ≤0.6 medium, ≤0.8 large,
    /// else remote.
    pub fn for_complexity(complexity: f64) -> Self {
        if complexity <= 0.3 {
            ModelTier::Small
        } else if complexity <= 0.6 {
            ModelTier::Medium
        } else if complexity <= 0.8 {
            ModelTier::Large
        } else {
            ModelTier::Remote
        }
    }

    /// Rough latency multiplier used when sizing per-subtask deadlines.
    /// Larger tiers get proportionally more time.
    pub fn latency_factor(self) -> f64 {
        match self {
            ModelTier::Small => 1.0,
            ModelTier::Medium => 1.5,
            ModelTier::Large => 2.5,
            ModelTier::Remote => 4.0,
        }
    }
}

/// One resolved unit of decomposed work.
///
/// After graph resolution the dependency list is final: no self entries, no
/// unknown ids, no cycles.
#[derive(Debug, Clone, Serialize)]
pub struct Subtask {
    pub id: SubtaskId,
    /// Natural-language description of the unit (never empty).
    pub description: String,
    /// Complexity in [0,1]; drives backend choice and deadline sizing.
    pub complexity: f64,
    /// Rough output-size/cost proxy (e.g. a token estimate), at least 1.
    pub estimated_work_units: u32,
    /// Declaration-ordered dependencies; context is assembled in this order.
    pub dependencies: Vec<SubtaskId>,
    pub kind: SubtaskKind,
}

impl Subtask {
    /// Tier derived from complexity via the fixed thresholds.
    pub fn recommended_tier(&self) -> ModelTier {
        ModelTier::for_complexity(self.complexity)
    }
}

fn default_complexity() -> f64 {
    0.5
}

fn default_work_units() -> u32 {
    200
}

/// A subtask as produced by a decomposer or plan file, before resolution.
///
/// Drafts are accepted in rough shape: missing ids, out-of-range complexity,
/// unknown kinds, self-dependencies and references to absent subtasks are all
/// repaired or dropped during [`resolve`](crate::dag::resolve::resolve),
/// never treated as hard errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftSubtask {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_complexity")]
    pub complexity: f64,

    #[serde(default = "default_work_units", alias = "estimated_work_units")]
    pub work_units: u32,

    #[serde(default, alias = "depends_on", alias = "deps")]
    pub dependencies: Vec<String>,

    #[serde(default, deserialize_with = "lenient_kind")]
    pub kind: SubtaskKind,
}

impl DraftSubtask {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            complexity: default_complexity(),
            work_units: default_work_units(),
            dependencies: Vec::new(),
            kind: SubtaskKind::Other,
        }
    }
}

fn lenient_kind<'de, D>(deserializer: D) -> Result<SubtaskKind, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .map(|s| SubtaskKind::parse_lenient(&s))
        .unwrap_or_default())
}
