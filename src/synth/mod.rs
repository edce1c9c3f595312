// src/synth/mod.rs

//! Progressive synthesis of subtask outputs.
//!
//! Walks the resolved graph bottom-up, folding each subtask's output together
//! with its dependencies' already-merged outputs, and concatenates independent
//! terminal branches at the end. Merging is total: validation failures degrade
//! to a clearly marked concatenation, never to an error.

pub mod integrator;
pub mod validate;

pub use integrator::{SynthesisOutcome, SynthesisSummary, synthesize};
pub use validate::{MIN_MERGED_LEN, ValidationIssue, check_merged};
