//! Plan admission: one pass collecting everything the planner must fix.
//!
//! Admission never stops at the first problem. Invariant errors, the cycle (if
//! any), every ownership conflict, and the risk assessment are all gathered so
//! a rejected plan comes back with a complete picture.

use serde::Serialize;
use tracing::{debug, info};

use crate::adapter::Adapter;
use crate::core::conflict::{Conflict, detect_conflicts};
use crate::core::plan::{Plan, validate_plan};
use crate::core::risk::{RiskConfig, RiskScore, score_plan};
use crate::core::schedule::{DependencyGraph, compute_waves_from_graph};

/// Everything admission learned about a plan.
#[derive(Debug, Clone, Serialize)]
pub struct AdmissionReport {
    /// Invariant violations from plan validation.
    pub errors: Vec<String>,
    /// Parallel execution waves; empty when a cycle blocks scheduling.
    pub waves: Vec<Vec<String>>,
    /// The detected dependency cycle, closed by repeating its first id.
    pub cycle: Option<Vec<String>>,
    pub conflicts: Vec<Conflict>,
    pub risk: RiskScore,
    /// True when the plan is schedulable and conflict-free. Risk gating is the
    /// caller's decision; a high score alone does not reject.
    pub accepted: bool,
}

/// Validate, schedule, conflict-check, and score a plan.
pub fn admit_plan(
    plan: &Plan,
    risk_config: &RiskConfig,
    adapter: Option<&dyn Adapter>,
) -> AdmissionReport {
    let errors = validate_plan(plan);
    let graph = DependencyGraph::from_plan(plan);

    let (waves, cycle) = match compute_waves_from_graph(&graph) {
        Ok(waves) => (waves, None),
        Err(err) => (Vec::new(), Some(err.cycle)),
    };

    let implied = crate::adapter::implied_resource_map(plan, adapter);
    let conflicts = detect_conflicts(plan, &graph, &implied);
    let risk = score_plan(plan, risk_config);

    let accepted = errors.is_empty() && cycle.is_none() && conflicts.is_empty();
    if accepted {
        info!(
            tasks = plan.tasks.len(),
            waves = waves.len(),
            risk = risk.value,
            "plan admitted"
        );
    } else {
        debug!(
            errors = errors.len(),
            conflicts = conflicts.len(),
            cycle = cycle.is_some(),
            "plan rejected"
        );
    }

    AdmissionReport {
        errors,
        waves,
        cycle,
        conflicts,
        risk,
        accepted,
    }
}
