//! Ownership conflict detection for concurrent writers.
//!
//! Two tasks writing the same file or logical resource must be connected by a
//! dependency path; otherwise their execution order is undefined and the plan
//! is rejected. Detection always runs to completion so the planner receives
//! every conflict in one pass.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::core::plan::Plan;
use crate::core::schedule::DependencyGraph;

/// What kind of target two tasks collided on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    File,
    Resource,
}

/// A detected conflict between unordered writers.
///
/// `tasks` lists every writer of the target, not just the unordered pair, so
/// the caller can pick a minimal ordering fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    /// File path or resource identifier.
    pub target: String,
    /// Ids of all tasks writing the target, in plan order.
    pub tasks: Vec<String>,
}

/// Implied resource identifiers per task id, derived by an adapter from patch
/// intents. Empty when no adapter is available.
pub type ImpliedResources = HashMap<String, Vec<String>>;

/// Detect all file and resource conflicts in a plan.
///
/// Read-write and read-read overlaps are never conflicts; only writers count.
/// Implied resources are unioned into each task's declared resource writes
/// before detection.
pub fn detect_conflicts(
    plan: &Plan,
    graph: &DependencyGraph,
    implied: &ImpliedResources,
) -> Vec<Conflict> {
    let mut conflicts = detect_writers(plan, graph, ConflictKind::File, |task| {
        task.files_write.iter().cloned().collect()
    });
    conflicts.extend(detect_writers(plan, graph, ConflictKind::Resource, |task| {
        let mut targets: Vec<String> = task.resources_write.clone();
        if let Some(extra) = implied.get(&task.id) {
            targets.extend(extra.iter().cloned());
        }
        targets
    }));
    conflicts
}

fn detect_writers(
    plan: &Plan,
    graph: &DependencyGraph,
    kind: ConflictKind,
    targets_of: impl Fn(&crate::core::plan::Task) -> Vec<String>,
) -> Vec<Conflict> {
    // target -> writer ids, preserving first-seen target order for stable output.
    let mut writers: HashMap<String, Vec<String>> = HashMap::new();
    let mut target_order: Vec<String> = Vec::new();

    for task in &plan.tasks {
        let mut seen: HashSet<String> = HashSet::new();
        for target in targets_of(task) {
            // A task writing the same target twice is one writer.
            if !seen.insert(target.clone()) {
                continue;
            }
            let entry = writers.entry(target.clone()).or_insert_with(|| {
                target_order.push(target.clone());
                Vec::new()
            });
            if !entry.contains(&task.id) {
                entry.push(task.id.clone());
            }
        }
    }

    let mut conflicts = Vec::new();
    for target in target_order {
        let ids = &writers[&target];
        if ids.len() > 1 && !all_pairs_ordered(ids, graph) {
            conflicts.push(Conflict {
                kind,
                target,
                tasks: ids.clone(),
            });
        }
    }
    conflicts
}

/// True if every pair of writers is connected by a dependency path in either
/// direction.
fn all_pairs_ordered(ids: &[String], graph: &DependencyGraph) -> bool {
    for (i, a) in ids.iter().enumerate() {
        for b in &ids[i + 1..] {
            if !graph.is_ordered(a, b) {
                return false;
            }
        }
    }
    true
}
