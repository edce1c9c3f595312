// src/engine/runtime.rs

//! Bounded-parallel execution of a resolved graph.
//!
//! The loop owns every [`ExecutionRecord`] and the scheduler state; workers
//! run in spawned tasks and report back over an mpsc channel, so no record is
//! ever touched from two places. Dispatch fills free slots from the ready
//! queue (highest critical-path priority first), each completion re-evaluates
//! dependents, and a failure cascades to its dependents without dispatching
//! them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::dag::critical_path::PathAnalysis;
use crate::dag::graph::SubtaskGraph;
use crate::dag::subtask::{Subtask, SubtaskId};
use crate::exec::backend::{Backend, BackendErrorKind, BackendRequest};
use crate::exec::backoff::RateGate;
use crate::exec::worker::{WorkerOutcome, run_subtask};
use crate::progress::ProgressSink;
use crate::route::catalog::{BackendCatalog, BackendDescriptor};
use crate::route::router::RoutingTable;
use crate::sched::record::{ExecutionRecord, FailureCause};
use crate::sched::scheduler::{Scheduler, SchedulerStep};
use crate::snippets::{Snippet, SnippetLookup};
use crate::types::RunOptions;

use super::context;

/// Floor for any single subtask deadline.
const MIN_DEADLINE_MS: u64 = 5_000;

/// Base deadline for a zero-complexity subtask on the fastest tier.
const BASE_DEADLINE_MS: f64 = 15_000.0;

/// How long a snippet lookup may hold up one dispatch.
const SNIPPET_TIMEOUT: Duration = Duration::from_secs(2);

/// Snippets requested per subtask.
const SNIPPET_LIMIT: usize = 3;

/// Everything `execute` needs, borrowed from the engine for one run.
pub struct ExecutionEnv<'a> {
    pub graph: &'a SubtaskGraph,
    pub routing: &'a RoutingTable,
    pub analysis: &'a PathAnalysis,
    pub catalog: &'a BackendCatalog,
    pub backends: &'a HashMap<String, Arc<dyn Backend>>,
    pub gate: Arc<RateGate>,
    pub snippets: Option<Arc<dyn SnippetLookup>>,
    pub progress: Option<Arc<dyn ProgressSink>>,
    pub task_text: &'a str,
    pub options: RunOptions,
    pub cancel: watch::Receiver<bool>,
}

struct WorkerEvent {
    subtask_id: SubtaskId,
    outcome: WorkerOutcome,
}

/// Run the whole graph to completion (or cancellation) and return the
/// per-subtask records.
pub async fn execute(env: ExecutionEnv<'_>) -> BTreeMap<SubtaskId, ExecutionRecord> {
    let max_concurrency = env.options.max_concurrency.max(1);
    let mut scheduler = Scheduler::new(env.graph);
    let mut records: BTreeMap<SubtaskId, ExecutionRecord> = BTreeMap::new();

    // Workers hold clones of `event_tx`; the loop keeps the original, so
    // `recv` only returns `None` after this function starts unwinding.
    let (event_tx, mut event_rx) = mpsc::channel::<WorkerEvent>(64);

    let mut ready = scheduler.collect_ready();
    sort_by_priority(&mut ready, env.analysis);

    let mut in_flight = 0usize;
    let mut cancel = env.cancel.clone();
    let mut cancel_open = true;

    info!(
        subtasks = scheduler.len(),
        max_concurrency, "starting graph execution"
    );

    loop {
        if scheduler.is_complete() {
            break;
        }

        let cancelled = *cancel.borrow();

        if !cancelled {
            while in_flight < max_concurrency && !ready.is_empty() {
                let id = ready.remove(0);
                scheduler.mark_running(&id);

                let Some(subtask) = env.graph.get(&id) else {
                    continue;
                };

                let (backend_id, best_effort) = match env.routing.get(&id) {
                    Some(assignment) => {
                        (assignment.backend_id.clone(), assignment.best_effort)
                    }
                    None => {
                        warn!(subtask = %id, "no routing assignment; failing subtask");
                        fail_undispatchable(
                            &mut scheduler,
                            &mut records,
                            &env.progress,
                            &id,
                            None,
                            "subtask has no backend assignment".to_string(),
                        );
                        continue;
                    }
                };

                let Some(backend) = env.backends.get(&backend_id) else {
                    warn!(
                        subtask = %id,
                        backend = %backend_id,
                        "assigned backend has no implementation; failing subtask"
                    );
                    fail_undispatchable(
                        &mut scheduler,
                        &mut records,
                        &env.progress,
                        &id,
                        Some(backend_id.clone()),
                        format!("backend '{}' has no implementation", backend_id),
                    );
                    continue;
                };

                let deadline =
                    deadline_for(subtask, env.catalog.get(&backend_id), &env.options);
                let snippets = fetch_snippets(env.snippets.as_ref(), subtask).await;

                let dependencies: Vec<(String, String)> = env
                    .graph
                    .dependencies_of(&id)
                    .iter()
                    .filter_map(|dep| {
                        let output = records.get(dep).and_then(|r| r.output.clone())?;
                        let label = env
                            .graph
                            .get(dep)
                            .map(|s| s.description.clone())
                            .unwrap_or_else(|| dep.clone());
                        Some((label, output))
                    })
                    .collect();

                let prompt =
                    context::build_prompt(env.task_text, subtask, &dependencies, &snippets);

                records.insert(
                    id.clone(),
                    ExecutionRecord::dispatched(id.clone(), backend_id.clone(), best_effort),
                );
                if let Some(sink) = &env.progress {
                    sink.on_progress(&id, completion_percent(&scheduler));
                }

                info!(
                    subtask = %id,
                    backend = %backend_id,
                    best_effort,
                    deadline_ms = deadline.as_millis() as u64,
                    "dispatching subtask"
                );

                let request = BackendRequest {
                    subtask_id: id.clone(),
                    prompt,
                    deadline,
                };
                let backend = Arc::clone(backend);
                let gate = Arc::clone(&env.gate);
                let worker_cancel = cancel.clone();
                let tx = event_tx.clone();
                let subtask_id = id.clone();
                tokio::spawn(async move {
                    let outcome = run_subtask(backend, gate, request, worker_cancel).await;
                    let _ = tx.send(WorkerEvent { subtask_id, outcome }).await;
                });
                in_flight += 1;
            }
        }

        if scheduler.is_complete() {
            break;
        }
        if cancelled && in_flight == 0 {
            info!("cancelled with nothing in flight; remaining subtasks stay undispatched");
            break;
        }
        if in_flight == 0 {
            warn!("no runnable subtasks remain but the run is incomplete; stopping");
            break;
        }

        let event = tokio::select! {
            event = event_rx.recv() => event,
            changed = cancel.changed(), if cancel_open => {
                if changed.is_err() {
                    cancel_open = false;
                } else {
                    info!("cancellation requested; no further subtasks will be dispatched");
                }
                continue;
            }
        };
        let Some(WorkerEvent {
            subtask_id,
            outcome,
        }) = event
        else {
            break;
        };
        in_flight -= 1;

        match outcome {
            WorkerOutcome::Succeeded {
                text,
                usage,
                attempts,
            } => {
                info!(
                    subtask = %subtask_id,
                    attempts,
                    usage = ?usage,
                    "subtask succeeded"
                );
                if let Some(sink) = &env.progress {
                    sink.on_complete(&subtask_id, &text);
                }
                if let Some(record) = records.get_mut(&subtask_id) {
                    record.finalize_success(text, attempts);
                }
                let step = scheduler.record_success(&subtask_id);
                ready.extend(step.newly_ready);
                sort_by_priority(&mut ready, env.analysis);
            }
            WorkerOutcome::Failed { cause, attempts } => {
                warn!(
                    subtask = %subtask_id,
                    cause = %cause,
                    attempts,
                    "subtask failed"
                );
                if let Some(sink) = &env.progress {
                    sink.on_fail(&subtask_id, &cause.to_string());
                }
                if let Some(record) = records.get_mut(&subtask_id) {
                    record.finalize_failure(cause, attempts);
                }
                let step = scheduler.record_failure(&subtask_id);
                apply_blocked(&step, &mut records, &env.progress);
            }
        }
    }

    info!(
        terminal = scheduler.terminal_count(),
        total = scheduler.len(),
        "graph execution finished"
    );
    records
}

/// Fail a subtask that never made it to a worker and cascade to dependents.
fn fail_undispatchable(
    scheduler: &mut Scheduler,
    records: &mut BTreeMap<SubtaskId, ExecutionRecord>,
    progress: &Option<Arc<dyn ProgressSink>>,
    id: &str,
    backend_id: Option<String>,
    message: String,
) {
    let cause = FailureCause::Backend {
        kind: BackendErrorKind::NotFound,
        message,
    };
    if let Some(sink) = progress {
        sink.on_fail(id, &cause.to_string());
    }

    let mut record = ExecutionRecord::dispatched(
        id.to_string(),
        backend_id.clone().unwrap_or_default(),
        false,
    );
    record.backend_id = backend_id;
    record.finalize_failure(cause, 0);
    records.insert(id.to_string(), record);

    let step = scheduler.record_failure(id);
    apply_blocked(&step, records, progress);
}

/// Record every subtask the scheduler just blocked.
fn apply_blocked(
    step: &SchedulerStep,
    records: &mut BTreeMap<SubtaskId, ExecutionRecord>,
    progress: &Option<Arc<dyn ProgressSink>>,
) {
    for blocked in &step.newly_blocked {
        let record =
            ExecutionRecord::blocked(blocked.id.clone(), blocked.failed_dependency.clone());
        if let Some(sink) = progress {
            let reason = record
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default();
            sink.on_fail(&blocked.id, &reason);
        }
        records.insert(blocked.id.clone(), record);
    }
}

/// Highest critical-path priority first; stable, so ties keep queue order.
fn sort_by_priority(ready: &mut [SubtaskId], analysis: &PathAnalysis) {
    ready.sort_by(|a, b| {
        analysis
            .priority_of(b)
            .partial_cmp(&analysis.priority_of(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

fn completion_percent(scheduler: &Scheduler) -> u8 {
    ((scheduler.terminal_count() * 100) / scheduler.len().max(1)) as u8
}

/// Deadline sized from complexity and backend tier, clamped to the run cap.
fn deadline_for(
    subtask: &Subtask,
    descriptor: Option<&BackendDescriptor>,
    options: &RunOptions,
) -> Duration {
    let latency_factor = descriptor
        .map(|d| d.tier.latency_factor())
        .unwrap_or(1.0);
    let sized = BASE_DEADLINE_MS * (1.0 + 2.0 * subtask.complexity) * latency_factor;
    let cap = options.max_subtask_timeout_ms.max(MIN_DEADLINE_MS);
    Duration::from_millis((sized as u64).clamp(MIN_DEADLINE_MS, cap))
}

/// Best-effort snippet retrieval, bounded so it can never stall dispatch.
async fn fetch_snippets(
    lookup: Option<&Arc<dyn SnippetLookup>>,
    subtask: &Subtask,
) -> Vec<Snippet> {
    let Some(lookup) = lookup else {
        return Vec::new();
    };
    if !subtask.kind.wants_snippets() {
        return Vec::new();
    }
    match timeout(
        SNIPPET_TIMEOUT,
        lookup.lookup(subtask.description.clone(), SNIPPET_LIMIT),
    )
    .await
    {
        Ok(snippets) => {
            debug!(subtask = %subtask.id, count = snippets.len(), "snippets attached");
            snippets
        }
        Err(_) => {
            debug!(subtask = %subtask.id, "snippet lookup timed out; continuing without");
            Vec::new()
        }
    }
}
