//! Task lifecycle states, plan phases, and the transition table.
//!
//! Transitions are event-driven: each state change is one explicit call made
//! by the verification session or the control loop, never a polling loop.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Executing,
    Completed,
    /// A dependency failed; the task cannot start until iteration resets it.
    Blocked,
    /// Verified and already merged into staging (merge-then-signal is atomic).
    Verified,
    /// Part of trunk after staging promotion.
    Merged,
    Failed,
}

/// Allowed transitions out of each state.
///
/// Cancellation is only legal while `pending` or `executing` and is recorded
/// as `failed` with reason "cancelled"; a `completed` task must proceed
/// through verification.
pub fn allowed_transitions(state: TaskState) -> &'static [TaskState] {
    match state {
        TaskState::Pending => &[TaskState::Executing, TaskState::Blocked, TaskState::Failed],
        TaskState::Blocked => &[TaskState::Pending, TaskState::Executing],
        TaskState::Executing => &[TaskState::Completed, TaskState::Failed],
        TaskState::Completed => &[TaskState::Verified, TaskState::Failed],
        TaskState::Verified => &[TaskState::Merged],
        TaskState::Merged => &[],
        TaskState::Failed => &[TaskState::Pending],
    }
}

/// A contract usage recorded by a task at completion time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractUse {
    pub version: String,
    #[serde(default)]
    pub methods: Vec<String>,
}

/// Runtime record for one task.
///
/// Owned exclusively by the task's own execution until the verification
/// session takes over the merge-or-reject decision; other tasks never touch
/// it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRunRecord {
    pub task_id: String,
    pub state: TaskState,
    /// Why the task failed, when it did (e.g. "timeout", "cancelled",
    /// "environment_mismatch", "boundary_violation").
    pub reason: Option<String>,
    /// Fingerprint of the dependency lockfile the worker ran against.
    pub environment_hash: Option<String>,
    /// Contract name -> recorded usage.
    pub contracts_used: BTreeMap<String, ContractUse>,
}

impl TaskRunRecord {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            state: TaskState::Pending,
            reason: None,
            environment_hash: None,
            contracts_used: BTreeMap::new(),
        }
    }

    /// Apply a transition, enforcing the table. Returns a stable error
    /// message when the transition is illegal.
    pub fn transition(&mut self, next: TaskState) -> Result<(), String> {
        if !allowed_transitions(self.state).contains(&next) {
            return Err(format!(
                "invalid transition {:?} -> {next:?} for task '{}'",
                self.state, self.task_id
            ));
        }
        self.state = next;
        Ok(())
    }

    /// True while cancellation is permitted.
    pub fn can_cancel(&self) -> bool {
        matches!(self.state, TaskState::Pending | TaskState::Executing)
    }
}

/// Phase of the whole plan run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanPhase {
    Executing,
    /// All tasks verified; staging integration check in progress or awaited.
    Integrating,
    /// Staging fast-forwarded into trunk.
    Accepted,
    /// Integration check failed; trunk untouched.
    IntegrationFailed,
    /// Iteration bound exhausted; waiting for a human choice.
    Escalated,
    /// Human chose to abort; trunk restored to the pre-orchestration commit.
    Aborted,
}

impl PlanPhase {
    /// Terminal phases end the run for the control loop.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PlanPhase::Accepted | PlanPhase::Escalated | PlanPhase::Aborted
        )
    }
}

/// The three dispositions a human may choose after escalation. The state
/// machine never auto-selects among them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationChoice {
    /// Artifacts were fixed by hand; resume execution where it stopped.
    ResumeAfterFix,
    /// Throw the plan away and re-enter planning.
    RegeneratePlan,
    /// Stop and restore trunk to its pre-orchestration commit.
    Abort,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The happy path walks pending -> executing -> completed -> verified -> merged.
    #[test]
    fn happy_path_transitions() {
        let mut record = TaskRunRecord::new("a");
        for next in [
            TaskState::Executing,
            TaskState::Completed,
            TaskState::Verified,
            TaskState::Merged,
        ] {
            record.transition(next).expect("transition");
        }
        assert_eq!(record.state, TaskState::Merged);
    }

    /// Merged is terminal.
    #[test]
    fn merged_is_terminal() {
        let mut record = TaskRunRecord::new("a");
        record.state = TaskState::Merged;
        let err = record.transition(TaskState::Pending).expect_err("terminal");
        assert!(err.contains("invalid transition"));
    }

    /// A completed task cannot be cancelled; it must reach verified or failed.
    #[test]
    fn completed_task_cannot_cancel() {
        let mut record = TaskRunRecord::new("a");
        record.state = TaskState::Pending;
        assert!(record.can_cancel());
        record.state = TaskState::Executing;
        assert!(record.can_cancel());
        record.state = TaskState::Completed;
        assert!(!record.can_cancel());
    }

    /// Skipping verification is illegal: completed cannot jump to merged.
    #[test]
    fn completed_cannot_skip_to_merged() {
        let mut record = TaskRunRecord::new("a");
        record.state = TaskState::Completed;
        assert!(record.transition(TaskState::Merged).is_err());
    }

    /// Failed tasks may return to pending on iteration; blocked tasks unblock.
    #[test]
    fn iteration_resets_failed_and_blocked() {
        let mut record = TaskRunRecord::new("a");
        record.state = TaskState::Failed;
        record.transition(TaskState::Pending).expect("retry");

        record.state = TaskState::Blocked;
        record.transition(TaskState::Pending).expect("unblock");
    }

    /// Only accepted, escalated, and aborted end the run.
    #[test]
    fn terminal_phases() {
        assert!(PlanPhase::Accepted.is_terminal());
        assert!(PlanPhase::Escalated.is_terminal());
        assert!(PlanPhase::Aborted.is_terminal());
        assert!(!PlanPhase::Executing.is_terminal());
        assert!(!PlanPhase::IntegrationFailed.is_terminal());
    }
}
