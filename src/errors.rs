// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::engine::report::TaskReport;

#[derive(Error, Debug)]
pub enum CodeloomError {
    #[error("Plan error: {0}")]
    PlanError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Backend not registered: {0}")]
    BackendNotRegistered(String),

    #[error("Backend catalog is empty; register at least one backend")]
    EmptyCatalog,

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Every subtask in the run ended up `Failed`. The report still carries
    /// the per-subtask records and the fallback artifact.
    #[error("All subtasks failed")]
    AllSubtasksFailed(Box<TaskReport>),

    /// The run was cancelled before completion. Succeeded results are
    /// preserved in the report.
    #[error("Task run cancelled")]
    Cancelled(Box<TaskReport>),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CodeloomError {
    /// Partial results attached to run-level failures, if any.
    pub fn partial_report(&self) -> Option<&TaskReport> {
        match self {
            CodeloomError::AllSubtasksFailed(report) => Some(report),
            CodeloomError::Cancelled(report) => Some(report),
            _ => None,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, CodeloomError>;
