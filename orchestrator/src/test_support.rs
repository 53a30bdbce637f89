//! Test-only helpers for constructing plans and tasks.

use crate::core::plan::{Plan, Task, VerificationCheck, VerificationKind};

/// Create a deterministic task with one custom verification check.
pub fn task(id: &str, depends_on: &[&str]) -> Task {
    Task {
        id: id.to_string(),
        description: format!("{id} description"),
        depends_on: depends_on.iter().map(|dep| (*dep).to_string()).collect(),
        verification: vec![VerificationCheck {
            command: format!("make check-{id}"),
            kind: VerificationKind::Custom,
            required: true,
        }],
        ..Task::default()
    }
}

/// Create a task whose verification includes a `test`-kind check.
pub fn task_with_test(id: &str) -> Task {
    let mut task = task(id, &[]);
    task.verification.push(VerificationCheck {
        command: format!("pytest tests/test_{id}.py"),
        kind: VerificationKind::Test,
        required: true,
    });
    task
}

/// Wrap tasks in a plan with a fixed request string.
pub fn plan_of(tasks: Vec<Task>) -> Plan {
    Plan {
        request: "test request".to_string(),
        tasks,
        contracts: Vec::new(),
    }
}
