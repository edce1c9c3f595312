//! Sanity checks applied to every merged unit.
//!
//! Deliberately minimal: the checks catch empty or truncated output and
//! obviously kind-mismatched text, not subtle quality problems. A failed check
//! routes the group through the marked-concatenation fallback instead of
//! rejecting it.

use std::fmt;

use crate::dag::subtask::SubtaskKind;

/// Shortest merged text (after trimming) considered plausible.
pub const MIN_MERGED_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationIssue {
    Empty,
    TooShort { len: usize },
    MissingMarker { kind: SubtaskKind },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::Empty => write!(f, "merged output is empty"),
            ValidationIssue::TooShort { len } => {
                write!(f, "merged output is {} chars, below minimum {}", len, MIN_MERGED_LEN)
            }
            ValidationIssue::MissingMarker { kind } => {
                write!(f, "merged output lacks any structural marker for kind '{:?}'", kind)
            }
        }
    }
}

/// Structural markers a merged unit of the given kind is expected to contain
/// somewhere, matched case-insensitively. An empty list disables the check.
fn markers(kind: SubtaskKind) -> &'static [&'static str] {
    match kind {
        SubtaskKind::Function | SubtaskKind::Method => {
            &["fn", "def", "function", "=>", "return", "("]
        }
        SubtaskKind::Class => &["class", "struct", "impl", "object"],
        SubtaskKind::Interface => &["interface", "trait", "protocol"],
        SubtaskKind::Type => &["type", "struct", "enum", "interface", "class"],
        SubtaskKind::Test => &["test", "assert", "expect", "should"],
        SubtaskKind::Module | SubtaskKind::Other => &[],
    }
}

/// Check one merged unit. `None` means the merge is accepted.
pub fn check_merged(kind: SubtaskKind, text: &str) -> Option<ValidationIssue> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(ValidationIssue::Empty);
    }
    if trimmed.len() < MIN_MERGED_LEN {
        return Some(ValidationIssue::TooShort { len: trimmed.len() });
    }

    let expected = markers(kind);
    if !expected.is_empty() {
        let lower = text.to_lowercase();
        if !expected.iter().any(|marker| lower.contains(marker)) {
            return Some(ValidationIssue::MissingMarker { kind });
        }
    }

    None
}
