// src/engine/mod.rs

//! Orchestration engine for codeloom.
//!
//! This module ties together:
//! - decomposition (or the single-subtask fallback for trivial tasks)
//! - draft resolution into a DAG
//! - backend routing and critical-path analysis
//! - the bounded-parallel execution loop in [`runtime`]
//! - progressive synthesis of the final artifact
//!
//! An [`Engine`] is a plain value with its collaborators injected through
//! [`EngineBuilder`]; independent engines never share state, so parallel runs
//! (and parallel tests) cannot interfere with each other.

pub mod context;
pub mod report;
pub mod runtime;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::dag::critical_path::analyse;
use crate::dag::resolve::{DroppedEdge, resolve};
use crate::dag::subtask::{DraftSubtask, SubtaskId};
use crate::decompose::{ComplexityEstimate, ComplexityEstimator, Decomposer, HeuristicEstimator};
use crate::errors::{CodeloomError, Result};
use crate::exec::backend::Backend;
use crate::exec::backoff::RateGate;
use crate::progress::ProgressSink;
use crate::route::catalog::{BackendCatalog, BackendDescriptor};
use crate::route::router::{Assignment, route_graph};
use crate::snippets::SnippetLookup;
use crate::synth::synthesize;
use crate::types::RunOptions;

use runtime::ExecutionEnv;

pub use report::TaskReport;

/// Tasks estimated below this overall complexity skip decomposition and run
/// as a single subtask.
const DECOMPOSE_THRESHOLD: f64 = 0.2;

/// The run coordinator. Construct one with [`Engine::builder`].
pub struct Engine {
    catalog: BackendCatalog,
    backends: HashMap<String, Arc<dyn Backend>>,
    decomposer: Option<Arc<dyn Decomposer>>,
    estimator: Arc<dyn ComplexityEstimator>,
    snippets: Option<Arc<dyn SnippetLookup>>,
    progress: Option<Arc<dyn ProgressSink>>,
    options: RunOptions,
    gate: Arc<RateGate>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Decompose and run a free-form task description.
    pub async fn run_task(&self, task_text: &str) -> Result<TaskReport> {
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        self.run_task_with_cancel(task_text, cancel_rx).await
    }

    /// Like [`run_task`](Engine::run_task), stopping early when `cancel`
    /// flips to `true`. In-flight backend calls receive the signal; subtasks
    /// not yet dispatched never start. A cancelled run returns
    /// [`CodeloomError::Cancelled`] carrying the partial report.
    pub async fn run_task_with_cancel(
        &self,
        task_text: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<TaskReport> {
        let estimate = self.estimator.estimate(task_text);
        debug!(overall = estimate.overall, "task complexity estimated");

        let drafts = if estimate.overall < DECOMPOSE_THRESHOLD {
            info!(
                overall = estimate.overall,
                "task below decomposition threshold; running as a single subtask"
            );
            vec![single_draft(task_text, &estimate)]
        } else if let Some(decomposer) = &self.decomposer {
            match decomposer
                .decompose(task_text.to_string(), cancel.clone())
                .await
            {
                Ok(drafts) if !drafts.is_empty() => drafts,
                Ok(_) => {
                    warn!("decomposer returned no subtasks; running as a single subtask");
                    vec![single_draft(task_text, &estimate)]
                }
                Err(err) => {
                    warn!(error = %err, "decomposition failed; running as a single subtask");
                    vec![single_draft(task_text, &estimate)]
                }
            }
        } else {
            debug!("no decomposer wired; running as a single subtask");
            vec![single_draft(task_text, &estimate)]
        };

        self.run_drafts(drafts, task_text, cancel).await
    }

    /// Run an already-drafted subtask list, skipping decomposition.
    pub async fn run_plan(&self, drafts: Vec<DraftSubtask>, task_text: &str) -> Result<TaskReport> {
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        self.run_plan_with_cancel(drafts, task_text, cancel_rx).await
    }

    pub async fn run_plan_with_cancel(
        &self,
        mut drafts: Vec<DraftSubtask>,
        task_text: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<TaskReport> {
        if drafts.is_empty() {
            warn!("plan contains no subtasks; running the task description as one subtask");
            let estimate = self.estimator.estimate(task_text);
            drafts = vec![single_draft(task_text, &estimate)];
        }
        self.run_drafts(drafts, task_text, cancel).await
    }

    /// Resolve and route a draft list without executing anything.
    pub fn preview(&self, drafts: Vec<DraftSubtask>) -> RunPreview {
        let (graph, resolution) = resolve(drafts);
        let routing = route_graph(&graph, &self.catalog, self.options.prefer_low_cost);
        let analysis = analyse(&graph);

        let execution_order: Vec<SubtaskId> = graph.topological_order().to_vec();
        let assignments = execution_order
            .iter()
            .filter_map(|id| routing.get(id).cloned())
            .collect();

        RunPreview {
            subtask_count: graph.len(),
            execution_order,
            assignments,
            critical_path: analysis.critical_path,
            estimated_cost: routing.estimated_cost(),
            dropped_edges: resolution.dropped,
        }
    }

    async fn run_drafts(
        &self,
        drafts: Vec<DraftSubtask>,
        task_text: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<TaskReport> {
        let (graph, resolution) = resolve(drafts);
        let routing = route_graph(&graph, &self.catalog, self.options.prefer_low_cost);
        let analysis = analyse(&graph);

        info!(
            subtasks = graph.len(),
            dropped_edges = resolution.dropped.len(),
            estimated_cost = routing.estimated_cost(),
            "plan resolved"
        );

        let records = runtime::execute(ExecutionEnv {
            graph: &graph,
            routing: &routing,
            analysis: &analysis,
            catalog: &self.catalog,
            backends: &self.backends,
            gate: Arc::clone(&self.gate),
            snippets: self.snippets.clone(),
            progress: self.progress.clone(),
            task_text,
            options: self.options.clone(),
            cancel: cancel.clone(),
        })
        .await;

        let outcome = synthesize(&graph, &records);
        let report = TaskReport {
            final_artifact: outcome.artifact,
            records,
            critical_path: analysis.critical_path,
            estimated_cost: routing.estimated_cost(),
            dropped_edges: resolution.dropped,
            synthesis: outcome.summary,
        };

        if *cancel.borrow() {
            info!("run cancelled; returning partial report");
            return Err(CodeloomError::Cancelled(Box::new(report)));
        }
        if !report.any_succeeded() {
            warn!("every subtask failed");
            return Err(CodeloomError::AllSubtasksFailed(Box::new(report)));
        }
        Ok(report)
    }
}

fn single_draft(task_text: &str, estimate: &ComplexityEstimate) -> DraftSubtask {
    let mut draft = DraftSubtask::new("task", task_text);
    draft.complexity = estimate.overall;
    draft
}

/// What a run would do, for dry runs: the resolved order, assignments and
/// cost, with nothing executed.
#[derive(Debug, Clone, Serialize)]
pub struct RunPreview {
    pub subtask_count: usize,
    pub execution_order: Vec<SubtaskId>,
    pub assignments: Vec<Assignment>,
    pub critical_path: Vec<SubtaskId>,
    pub estimated_cost: f64,
    pub dropped_edges: Vec<DroppedEdge>,
}

/// Builder wiring an [`Engine`]'s collaborators.
///
/// Backends register as descriptor + implementation pairs so the catalog and
/// the dispatch table cannot drift apart. The estimator defaults to
/// [`HeuristicEstimator`]; everything else is optional.
pub struct EngineBuilder {
    catalog: BackendCatalog,
    backends: HashMap<String, Arc<dyn Backend>>,
    decomposer: Option<Arc<dyn Decomposer>>,
    estimator: Arc<dyn ComplexityEstimator>,
    snippets: Option<Arc<dyn SnippetLookup>>,
    progress: Option<Arc<dyn ProgressSink>>,
    options: RunOptions,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            catalog: BackendCatalog::default(),
            backends: HashMap::new(),
            decomposer: None,
            estimator: Arc::new(HeuristicEstimator),
            snippets: None,
            progress: None,
            options: RunOptions::default(),
        }
    }

    pub fn backend(
        mut self,
        descriptor: BackendDescriptor,
        implementation: Arc<dyn Backend>,
    ) -> Self {
        if implementation.id() != descriptor.id {
            warn!(
                descriptor = %descriptor.id,
                implementation = %implementation.id(),
                "backend implementation id differs from its descriptor; using the descriptor id"
            );
        }
        self.backends.insert(descriptor.id.clone(), implementation);
        self.catalog.push(descriptor);
        self
    }

    pub fn decomposer(mut self, decomposer: Arc<dyn Decomposer>) -> Self {
        self.decomposer = Some(decomposer);
        self
    }

    pub fn estimator(mut self, estimator: Arc<dyn ComplexityEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn snippets(mut self, snippets: Arc<dyn SnippetLookup>) -> Self {
        self.snippets = Some(snippets);
        self
    }

    pub fn progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Result<Engine> {
        if self.catalog.is_empty() {
            return Err(CodeloomError::EmptyCatalog);
        }
        for descriptor in self.catalog.iter() {
            if !self.backends.contains_key(&descriptor.id) {
                return Err(CodeloomError::BackendNotRegistered(descriptor.id.clone()));
            }
        }

        Ok(Engine {
            catalog: self.catalog,
            backends: self.backends,
            decomposer: self.decomposer,
            estimator: self.estimator,
            snippets: self.snippets,
            progress: self.progress,
            options: self.options.sanitised(),
            gate: Arc::new(RateGate::new()),
        })
    }
}
