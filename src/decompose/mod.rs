// src/decompose/mod.rs

//! Task decomposition.
//!
//! Turning a task description into draft subtasks is delegated to a
//! [`Decomposer`]. The stock implementation, [`BackendDecomposer`], asks a
//! backend for a subtask list and runs the response through the parser chain
//! in [`parse`]. Drafts coming out of here are untrusted: ids may be missing,
//! dependencies may be unknown or cyclic. Resolution cleans all of that up.

pub mod estimate;
pub mod parse;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::dag::subtask::DraftSubtask;
use crate::exec::backend::{Backend, BackendRequest};

pub use estimate::{ComplexityEstimate, ComplexityEstimator, HeuristicEstimator};
pub use parse::{ParseOutcome, parse_draft_list};

/// Deadline for the decomposition call itself.
const DECOMPOSE_DEADLINE: Duration = Duration::from_secs(60);

/// Default cap on how many subtasks the prompt asks for.
const DEFAULT_MAX_SUBTASKS: usize = 12;

/// Splits a task description into draft subtasks.
///
/// Implementations may be non-deterministic and may fail; the engine treats
/// a failure as "no decomposition" and runs the task as a single subtask.
pub trait Decomposer: Send + Sync {
    fn decompose(
        &self,
        task_text: String,
        cancel: watch::Receiver<bool>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DraftSubtask>>> + Send + '_>>;
}

/// Decomposer that prompts a backend for a subtask list.
pub struct BackendDecomposer {
    backend: Arc<dyn Backend>,
    max_subtasks: usize,
}

impl BackendDecomposer {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            max_subtasks: DEFAULT_MAX_SUBTASKS,
        }
    }

    pub fn with_max_subtasks(mut self, max_subtasks: usize) -> Self {
        self.max_subtasks = max_subtasks.max(1);
        self
    }

    async fn decompose_inner(
        &self,
        task_text: String,
        cancel: watch::Receiver<bool>,
    ) -> Result<Vec<DraftSubtask>> {
        let request = BackendRequest {
            subtask_id: "decompose".to_string(),
            prompt: decomposition_prompt(&task_text, self.max_subtasks),
            deadline: DECOMPOSE_DEADLINE,
        };

        info!(backend = %self.backend.id(), "requesting task decomposition");
        let response = self
            .backend
            .invoke(request, cancel)
            .await
            .map_err(|err| anyhow!("decomposition call failed: {}", err))?;

        match parse_draft_list(&response.text) {
            ParseOutcome::Parsed(drafts) => {
                info!(count = drafts.len(), "decomposition parsed");
                Ok(drafts)
            }
            ParseOutcome::Unparseable => {
                debug!(
                    response_len = response.text.len(),
                    "decomposition response not parseable"
                );
                Err(anyhow!("decomposition response was not parseable"))
            }
        }
    }
}

impl Decomposer for BackendDecomposer {
    fn decompose(
        &self,
        task_text: String,
        cancel: watch::Receiver<bool>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DraftSubtask>>> + Send + '_>> {
        Box::pin(async move { self.decompose_inner(task_text, cancel).await })
    }
}

fn decomposition_prompt(task_text: &str, max_subtasks: usize) -> String {
    format!(
        "Split the following coding task into at most {} subtasks.\n\
         Respond with a JSON array; each element is an object with fields:\n\
         \"id\" (short unique string), \"description\" (what to build),\n\
         \"dependencies\" (array of ids that must finish first),\n\
         \"complexity\" (0.0 to 1.0), \"kind\" (one of function, class,\n\
         method, interface, type, module, test, other) and \"work_units\"\n\
         (rough output size estimate, integer).\n\
         Emit only the JSON array.\n\n\
         Task:\n{}\n",
        max_subtasks, task_text
    )
}
