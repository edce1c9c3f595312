// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{PlanFile, RawPlanFile};
use crate::errors::{CodeloomError, Result};

impl TryFrom<RawPlanFile> for PlanFile {
    type Error = CodeloomError;

    fn try_from(raw: RawPlanFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_plan(&raw)?;
        Ok(PlanFile::new_unchecked(raw))
    }
}

fn validate_raw_plan(plan: &RawPlanFile) -> Result<()> {
    ensure_has_work(plan)?;
    validate_backends(plan)?;
    validate_subtasks(plan)?;
    validate_dag(plan)?;
    Ok(())
}

fn ensure_has_work(plan: &RawPlanFile) -> Result<()> {
    if plan.task.trim().is_empty() && plan.subtask.is_empty() {
        return Err(CodeloomError::PlanError(
            "plan must contain a `task` description or at least one [subtask.<id>] section"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_backends(plan: &RawPlanFile) -> Result<()> {
    if plan.backend.is_empty() {
        return Err(CodeloomError::PlanError(
            "plan must contain at least one [backend.<id>] section".to_string(),
        ));
    }

    for (id, backend) in plan.backend.iter() {
        if backend.cmd.trim().is_empty() {
            return Err(CodeloomError::PlanError(format!(
                "backend '{}' has an empty `cmd`",
                id
            )));
        }
        if backend.context_window == 0 {
            return Err(CodeloomError::PlanError(format!(
                "backend '{}' must have `context_window` >= 1 (got 0)",
                id
            )));
        }
        if !backend.cost_per_unit.is_finite() || backend.cost_per_unit < 0.0 {
            return Err(CodeloomError::PlanError(format!(
                "backend '{}' has invalid `cost_per_unit` {}",
                id, backend.cost_per_unit
            )));
        }
    }
    Ok(())
}

fn validate_subtasks(plan: &RawPlanFile) -> Result<()> {
    for (id, subtask) in plan.subtask.iter() {
        if subtask.description.trim().is_empty() {
            return Err(CodeloomError::PlanError(format!(
                "subtask '{}' has an empty `description`",
                id
            )));
        }
        if !subtask.complexity.is_finite()
            || subtask.complexity < 0.0
            || subtask.complexity > 1.0
        {
            return Err(CodeloomError::PlanError(format!(
                "subtask '{}' has `complexity` {} outside [0, 1]",
                id, subtask.complexity
            )));
        }
        if subtask.work_units == 0 {
            return Err(CodeloomError::PlanError(format!(
                "subtask '{}' must have `work_units` >= 1 (got 0)",
                id
            )));
        }
        for dep in subtask.deps.iter() {
            if !plan.subtask.contains_key(dep) {
                return Err(CodeloomError::PlanError(format!(
                    "subtask '{}' has unknown dependency '{}' in `deps`",
                    id, dep
                )));
            }
            if dep == id {
                return Err(CodeloomError::PlanError(format!(
                    "subtask '{}' cannot depend on itself in `deps`",
                    id
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(plan: &RawPlanFile) -> Result<()> {
    // Edge direction: dep -> subtask. The engine repairs cycles in generated
    // drafts, but a hand-written plan with a cycle is a mistake worth failing
    // loudly on.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for id in plan.subtask.keys() {
        graph.add_node(id.as_str());
    }

    for (id, subtask) in plan.subtask.iter() {
        for dep in subtask.deps.iter() {
            graph.add_edge(dep.as_str(), id.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(CodeloomError::PlanError(format!(
                "cycle detected in subtask dependencies involving '{}'",
                node
            )))
        }
    }
}
