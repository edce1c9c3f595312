// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod decompose;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod progress;
pub mod route;
pub mod sched;
pub mod snippets;
pub mod synth;
pub mod types;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::PlanFile;
use crate::dag::subtask::DraftSubtask;
use crate::decompose::BackendDecomposer;
use crate::engine::{Engine, RunPreview, TaskReport};
use crate::errors::Result;
use crate::exec::backend::Backend;
use crate::exec::command::CommandBackend;
use crate::route::catalog::BackendDescriptor;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - plan loading
/// - one `CommandBackend` per `[backend.<id>]` section
/// - a decomposer on the most capable backend
/// - the engine
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let plan_path = PathBuf::from(&args.plan);
    let plan = load_and_validate(&plan_path)?;

    let task_text = match &args.task {
        Some(text) => text.clone(),
        None => plan.task_text().to_string(),
    };

    let mut options = plan.run_options();
    if let Some(max_concurrency) = args.max_concurrency {
        options.max_concurrency = max_concurrency;
        options = options.sanitised();
    }

    // One bridge process implementation per backend section.
    let mut implementations: HashMap<String, Arc<dyn Backend>> = HashMap::new();
    for (id, cmd) in plan.commands() {
        implementations.insert(id.to_string(), Arc::new(CommandBackend::new(id, cmd)));
    }

    let descriptors = plan.descriptors();
    let decomposer_backend =
        most_capable_id(&descriptors).and_then(|id| implementations.get(id).cloned());

    let mut builder = Engine::builder().options(options);
    for descriptor in descriptors {
        if let Some(implementation) = implementations.get(&descriptor.id).cloned() {
            builder = builder.backend(descriptor, implementation);
        }
    }
    if let Some(backend) = decomposer_backend {
        builder = builder.decomposer(Arc::new(BackendDecomposer::new(backend)));
    }
    let engine = builder.build()?;

    if args.dry_run {
        let drafts = if plan.has_subtasks() {
            plan.drafts()
        } else {
            vec![DraftSubtask::new("task", task_text.clone())]
        };
        let preview = engine.preview(drafts);
        print_dry_run(&plan_path, &plan, &preview);
        return Ok(());
    }

    // Ctrl-C → cooperative cancellation.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("failed to listen for Ctrl+C: {e}");
            return;
        }
        info!("Ctrl-C received; cancelling run");
        let _ = cancel_tx.send(true);
    });

    let result = if plan.has_subtasks() {
        let drafts = plan.drafts();
        info!(subtasks = drafts.len(), "running plan subtasks");
        engine
            .run_plan_with_cancel(drafts, &task_text, cancel_rx)
            .await
    } else {
        engine.run_task_with_cancel(&task_text, cancel_rx).await
    };

    match result {
        Ok(report) => {
            emit_outputs(&args, &report)?;
            info!(
                succeeded = report.succeeded_count(),
                failed = report.failed_count(),
                estimated_cost = report.estimated_cost,
                "run complete"
            );
            Ok(())
        }
        Err(err) => {
            // Partial results still get written; the error decides the exit
            // code.
            if let Some(report) = err.partial_report() {
                emit_outputs(&args, report)?;
            }
            Err(err)
        }
    }
}

/// Write the artifact (stdout or `--output`) and the optional JSON report.
fn emit_outputs(args: &CliArgs, report: &TaskReport) -> Result<()> {
    match &args.output {
        Some(path) => {
            fs::write(path, &report.final_artifact)?;
            info!(path = %path, "artifact written");
        }
        None => println!("{}", report.final_artifact),
    }

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(report)?;
        fs::write(path, json)?;
        info!(path = %path, "report written");
    }
    Ok(())
}

/// Highest tier wins, then the larger context window; first entry on ties.
fn most_capable_id(descriptors: &[BackendDescriptor]) -> Option<&str> {
    let mut best: Option<&BackendDescriptor> = None;
    for descriptor in descriptors {
        match best {
            None => best = Some(descriptor),
            Some(current) => {
                if (descriptor.tier, descriptor.context_window)
                    > (current.tier, current.context_window)
                {
                    best = Some(descriptor);
                }
            }
        }
    }
    best.map(|d| d.id.as_str())
}

/// Simple dry-run output: print subtasks, assignments and the price tag.
fn print_dry_run(plan_path: &Path, plan: &PlanFile, preview: &RunPreview) {
    println!("codeloom dry-run");
    println!("  plan: {}", plan_path.display());
    let options = plan.run_options();
    println!("  options.max_concurrency = {}", options.max_concurrency);
    println!(
        "  options.max_subtask_timeout_ms = {}",
        options.max_subtask_timeout_ms
    );
    println!("  options.prefer_low_cost = {}", options.prefer_low_cost);
    println!();

    println!("subtasks ({}):", preview.subtask_count);
    for assignment in &preview.assignments {
        print!(
            "  - {} -> {} (cost {:.2})",
            assignment.subtask_id, assignment.backend_id, assignment.estimated_cost
        );
        if assignment.best_effort {
            print!(" [best-effort]");
        }
        println!();
    }

    if !preview.dropped_edges.is_empty() {
        println!();
        println!("dropped dependency edges:");
        for edge in &preview.dropped_edges {
            println!("  - {} -> {} ({:?})", edge.from, edge.to, edge.reason);
        }
    }

    println!();
    println!("execution order: {}", preview.execution_order.join(" -> "));
    println!("critical path: {}", preview.critical_path.join(" -> "));
    println!("estimated cost: {:.2}", preview.estimated_cost);

    debug!("dry-run complete (no execution)");
}
