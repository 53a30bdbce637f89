//! Plan and task data model.
//!
//! A [`Plan`] is read-only shared state once admitted: the scheduler, conflict
//! detector, risk scorer, and verification session all borrow it and never
//! mutate it. Runtime state lives in per-task records (see [`crate::core::state`]).

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

/// Kind of verification check declared by a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationKind {
    Test,
    Lint,
    Typecheck,
    Custom,
}

/// A single verification command for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCheck {
    /// Command the worker must run for this check.
    pub command: String,
    #[serde(default = "default_verification_kind")]
    pub kind: VerificationKind,
    /// Whether the check must pass for the task to complete.
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_verification_kind() -> VerificationKind {
    VerificationKind::Custom
}

fn default_true() -> bool {
    true
}

/// A structured patch intent targeting a shared ("hot") file.
///
/// The core never generates code from intents. An adapter collaborator derives
/// the implied resource identifiers, which the conflict detector unions into
/// the issuing task's resource writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchIntent {
    /// Target file for the intent.
    pub file: String,
    /// Action type (`add_router`, `add_middleware`, ...).
    pub action: String,
    /// Action-specific parameters.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// Package dependencies a task declares it needs installed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencySpec {
    pub runtime: Vec<String>,
    pub dev: Vec<String>,
}

/// A unit of work with declared file and resource ownership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    /// Unique task identifier.
    pub id: String,
    pub description: String,
    /// Files this task is allowed to write.
    pub files_write: Vec<String>,
    /// Files this task may read.
    pub files_read: Vec<String>,
    /// Files this task may append to (part of the boundary allow-set).
    pub files_append: Vec<String>,
    /// Logical resources this task claims (routes, DI bindings, config keys).
    pub resources_write: Vec<String>,
    pub resources_read: Vec<String>,
    /// Task ids that must complete before this task.
    pub depends_on: Vec<String>,
    /// Verification checks. Every task must declare at least one.
    pub verification: Vec<VerificationCheck>,
    pub patch_intents: Vec<PatchIntent>,
    /// Package dependencies needed by this task.
    pub deps_required: DependencySpec,
    /// Allow changes exceeding the churn threshold.
    pub allow_large_changes: bool,
}

impl Default for Task {
    fn default() -> Self {
        Self {
            id: String::new(),
            description: String::new(),
            files_write: Vec::new(),
            files_read: Vec::new(),
            files_append: Vec::new(),
            resources_write: Vec::new(),
            resources_read: Vec::new(),
            depends_on: Vec::new(),
            verification: Vec::new(),
            patch_intents: Vec::new(),
            deps_required: DependencySpec::default(),
            allow_large_changes: false,
        }
    }
}

impl Task {
    /// Declared allow-set for boundary validation: `files_write ∪ files_append`.
    pub fn allowed_files(&self) -> HashSet<&str> {
        self.files_write
            .iter()
            .chain(self.files_append.iter())
            .map(String::as_str)
            .collect()
    }

    /// True if any verification check is of kind `test`.
    pub fn has_test_check(&self) -> bool {
        self.verification
            .iter()
            .any(|check| check.kind == VerificationKind::Test)
    }
}

/// An interface contract shared between tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSpec {
    /// Contract name (e.g. `AuthServiceProtocol`).
    pub name: String,
    /// Version identifier pinned when the contract was created.
    pub version: String,
    /// Method signatures the contract exposes.
    #[serde(default)]
    pub methods: Vec<String>,
}

/// A complete execution plan: tasks, dependencies, and shared contracts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Plan {
    /// Original request this plan was produced for.
    pub request: String,
    pub tasks: Vec<Task>,
    pub contracts: Vec<ContractSpec>,
}

impl Plan {
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn contract(&self, name: &str) -> Option<&ContractSpec> {
        self.contracts.iter().find(|contract| contract.name == name)
    }
}

/// Check plan invariants not expressible in the serialization layer:
/// - Task ids are non-empty and unique.
/// - `depends_on` references only ids present in the plan, never itself.
/// - Every task declares at least one verification check.
///
/// Returns a list of stable error messages (empty on success). All problems
/// are collected so the planner can fix the whole plan in one pass.
pub fn validate_plan(plan: &Plan) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let ids: HashSet<&str> = plan.tasks.iter().map(|task| task.id.as_str()).collect();

    for task in &plan.tasks {
        if task.id.is_empty() {
            errors.push("task with empty id".to_string());
            continue;
        }
        if !seen.insert(task.id.as_str()) {
            errors.push(format!("duplicate task id '{}'", task.id));
        }
        for dep in &task.depends_on {
            if dep == &task.id {
                errors.push(format!("task '{}' depends on itself", task.id));
            } else if !ids.contains(dep.as_str()) {
                errors.push(format!(
                    "task '{}' depends on unknown task '{}'",
                    task.id, dep
                ));
            }
        }
        if task.verification.is_empty() {
            errors.push(format!(
                "task '{}' has no verification checks (at least one is required)",
                task.id
            ));
        }
    }

    errors
}
