// src/dag/mod.rs

//! Subtask graph representation and analysis.
//!
//! - [`subtask`] defines the subtask data model (drafts and resolved form).
//! - [`resolve`] turns draft subtasks into a guaranteed-acyclic graph,
//!   dropping offending edges instead of failing.
//! - [`graph`] holds the resolved, read-only dependency graph.
//! - [`critical_path`] computes the highest-cost chain for prioritisation
//!   and reporting.

pub mod critical_path;
pub mod graph;
pub mod resolve;
pub mod subtask;

pub use critical_path::PathAnalysis;
pub use graph::SubtaskGraph;
pub use resolve::{DropReason, DroppedEdge, ResolutionReport};
pub use subtask::{DraftSubtask, ModelTier, Subtask, SubtaskId, SubtaskKind};
