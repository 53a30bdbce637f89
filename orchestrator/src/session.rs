//! Verification and promotion session for an admitted plan.
//!
//! The session owns the per-task run records and the plan phase, and drives
//! the merge pipeline: task branches merge into staging only after the
//! environment, contract, and boundary checks pass, and trunk only ever moves
//! by fast-forward from a staging that passed the full regression.
//!
//! All methods take `&self`; workers for one wave call into the session
//! concurrently. The merge lock serializes staging merges so that merging and
//! marking `verified` happen as one step; observers never see a verified task
//! whose changes are missing from staging.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::boundary::{BoundaryRules, ChangedFile, validate_boundaries};
use crate::core::plan::Plan;
use crate::core::schedule::DependencyGraph;
use crate::core::state::{ContractUse, EscalationChoice, PlanPhase, TaskRunRecord, TaskState};

/// Result of attempting to fast-forward trunk to staging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionOutcome {
    FastForwarded,
    /// Trunk diverged from the orchestration baseline; promotion is refused
    /// rather than merged.
    NotFastForward,
}

/// Side-effecting workspace operations the session needs.
///
/// The git-backed implementation lives in [`crate::io::git`]; tests substitute
/// an in-memory fake.
pub trait Workspace: Sync {
    /// Diff of the task's branch against the staging base, with per-file
    /// added/removed line counts and a whitespace-only flag.
    fn changed_files(&self, task_id: &str) -> Result<Vec<ChangedFile>>;
    /// Diff of staging against trunk, covering the whole merged set.
    fn staging_changed_files(&self) -> Result<Vec<ChangedFile>>;
    /// Merge the task's branch into staging.
    fn merge_into_staging(&self, task_id: &str) -> Result<()>;
    /// Fast-forward trunk to staging, refusing any non-fast-forward move.
    fn fast_forward_trunk(&self) -> Result<PromotionOutcome>;
    /// Reset trunk to the given commit.
    fn restore_trunk(&self, commit: &str) -> Result<()>;
    /// Current trunk commit id.
    fn trunk_head(&self) -> Result<String>;
}

/// Verdict of [`Session::mark_verified`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Checks passed and the task branch is merged into staging.
    Verified,
    /// A check failed; the record is `failed` with the given reason.
    Rejected { reason: String },
}

/// Session tuning, nested under the orchestrator config file.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Execute/verify/integrate rounds before escalating to a human.
    pub max_iterations: u32,
    pub boundary_rules: BoundaryRules,
    /// Expected dependency-environment fingerprint. When set, a task reporting
    /// a different fingerprint fails verification.
    pub environment_hash: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            boundary_rules: BoundaryRules::default(),
            environment_hash: None,
        }
    }
}

pub struct Session<W: Workspace> {
    plan: Plan,
    graph: DependencyGraph,
    config: SessionConfig,
    workspace: W,
    /// Trunk commit captured before any orchestration branch work.
    baseline: String,
    records: Mutex<BTreeMap<String, TaskRunRecord>>,
    phase: Mutex<PlanPhase>,
    iterations: Mutex<u32>,
    /// Serializes staging merges and the verified-state flip.
    merge: Mutex<()>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<W: Workspace> Session<W> {
    /// Start a session over an admitted plan, capturing the trunk baseline.
    pub fn new(plan: Plan, config: SessionConfig, workspace: W) -> Result<Self> {
        let baseline = workspace
            .trunk_head()
            .context("capture trunk baseline")?;
        let graph = DependencyGraph::from_plan(&plan);
        let records = plan
            .tasks
            .iter()
            .map(|task| (task.id.clone(), TaskRunRecord::new(&task.id)))
            .collect();
        info!(baseline = %baseline, tasks = plan.tasks.len(), "session started");
        Ok(Self {
            plan,
            graph,
            config,
            workspace,
            baseline,
            records: Mutex::new(records),
            phase: Mutex::new(PlanPhase::Executing),
            iterations: Mutex::new(0),
            merge: Mutex::new(()),
        })
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn baseline(&self) -> &str {
        &self.baseline
    }

    pub fn phase(&self) -> PlanPhase {
        *lock(&self.phase)
    }

    /// Snapshot of one task's record.
    pub fn record(&self, task_id: &str) -> Option<TaskRunRecord> {
        lock(&self.records).get(task_id).cloned()
    }

    /// Snapshot of all records, in task-id order.
    pub fn records(&self) -> Vec<TaskRunRecord> {
        lock(&self.records).values().cloned().collect()
    }

    pub fn mark_executing(&self, task_id: &str) -> Result<()> {
        self.transition(task_id, TaskState::Executing)
    }

    /// Record completion along with the worker's environment fingerprint and
    /// the contracts it used.
    pub fn mark_completed(
        &self,
        task_id: &str,
        environment_hash: Option<String>,
        contracts_used: BTreeMap<String, ContractUse>,
    ) -> Result<()> {
        let mut records = lock(&self.records);
        let record = records
            .get_mut(task_id)
            .ok_or_else(|| anyhow!("unknown task '{task_id}'"))?;
        record.transition(TaskState::Completed).map_err(|e| anyhow!(e))?;
        record.environment_hash = environment_hash;
        record.contracts_used = contracts_used;
        Ok(())
    }

    /// Fail a task and block its transitively dependent pending tasks.
    pub fn mark_failed(&self, task_id: &str, reason: &str) -> Result<()> {
        let dependents = self.graph.transitive_dependents(task_id);
        let mut records = lock(&self.records);
        let record = records
            .get_mut(task_id)
            .ok_or_else(|| anyhow!("unknown task '{task_id}'"))?;
        record.transition(TaskState::Failed).map_err(|e| anyhow!(e))?;
        record.reason = Some(reason.to_string());
        warn!(task = task_id, reason, "task failed");

        for dependent in dependents {
            if let Some(dep) = records.get_mut(&dependent)
                && dep.state == TaskState::Pending
            {
                dep.transition(TaskState::Blocked).map_err(|e| anyhow!(e))?;
                debug!(task = %dependent, blocked_by = task_id, "task blocked");
            }
        }
        Ok(())
    }

    /// Cancel a task that has not yet completed. Completed work must proceed
    /// through verification and be rejected there if unwanted.
    pub fn cancel(&self, task_id: &str) -> Result<()> {
        {
            let records = lock(&self.records);
            let record = records
                .get(task_id)
                .ok_or_else(|| anyhow!("unknown task '{task_id}'"))?;
            if !record.can_cancel() {
                return Err(anyhow!(
                    "task '{task_id}' is {:?} and can no longer be cancelled",
                    record.state
                ));
            }
        }
        self.mark_failed(task_id, "cancelled")
    }

    /// Verify a completed task and, on success, merge it into staging.
    ///
    /// Environment, contract, and boundary checks run in that order; the first
    /// failing check rejects the task. The merge and the flip to `verified`
    /// happen under the merge lock so they are observed as one step. An I/O
    /// failure during the merge itself is an error, not a verdict, and leaves
    /// the record `completed`.
    #[instrument(skip(self))]
    pub fn mark_verified(&self, task_id: &str) -> Result<VerifyOutcome> {
        let task = self
            .plan
            .task(task_id)
            .ok_or_else(|| anyhow!("unknown task '{task_id}'"))?;
        {
            let records = lock(&self.records);
            let record = records
                .get(task_id)
                .ok_or_else(|| anyhow!("unknown task '{task_id}'"))?;
            if record.state != TaskState::Completed {
                return Err(anyhow!(
                    "task '{task_id}' is {:?}, expected completed",
                    record.state
                ));
            }
        }

        if let Some(reason) = self.environment_mismatch(task_id) {
            self.mark_failed(task_id, &reason)?;
            return Ok(VerifyOutcome::Rejected { reason });
        }
        if let Some(reason) = self.contract_mismatch(task_id) {
            self.mark_failed(task_id, &reason)?;
            return Ok(VerifyOutcome::Rejected { reason });
        }

        let changes = self
            .workspace
            .changed_files(task_id)
            .with_context(|| format!("diff task '{task_id}' against staging"))?;
        let report = validate_boundaries(task, &changes, &self.config.boundary_rules);
        if !report.valid() {
            let detail: Vec<String> = report
                .violations
                .iter()
                .map(|v| v.message.clone())
                .collect();
            let reason = format!("boundary_violation: {}", detail.join("; "));
            self.mark_failed(task_id, &reason)?;
            return Ok(VerifyOutcome::Rejected { reason });
        }

        {
            let _merge = lock(&self.merge);
            self.workspace
                .merge_into_staging(task_id)
                .with_context(|| format!("merge task '{task_id}' into staging"))?;
            let mut records = lock(&self.records);
            let record = records
                .get_mut(task_id)
                .ok_or_else(|| anyhow!("unknown task '{task_id}'"))?;
            record.transition(TaskState::Verified).map_err(|e| anyhow!(e))?;
        }
        info!(task = task_id, "task verified and merged into staging");

        if self.all_verified() {
            *lock(&self.phase) = PlanPhase::Integrating;
        }
        Ok(VerifyOutcome::Verified)
    }

    /// Decide the run after the staging regression: promote trunk on a pass,
    /// or report integration failure with trunk untouched.
    ///
    /// A refused fast-forward (trunk moved underneath the orchestrator) is
    /// recovered internally: the phase stays `integrating` so the control
    /// loop can re-check staging and call this again once the divergence is
    /// resolved. `integration_failed` is reserved for regression and
    /// merged-set boundary failures.
    #[instrument(skip(self))]
    pub fn integrate(&self, regression_passed: bool) -> Result<PlanPhase> {
        if self.phase() != PlanPhase::Integrating {
            return Err(anyhow!(
                "cannot integrate while {:?}, expected integrating",
                self.phase()
            ));
        }
        if !regression_passed {
            warn!("staging regression failed, trunk untouched");
            *lock(&self.phase) = PlanPhase::IntegrationFailed;
            return Ok(PlanPhase::IntegrationFailed);
        }

        let violations = self.merged_set_violations()?;
        if !violations.is_empty() {
            for violation in &violations {
                warn!(file = %violation.file, message = %violation.message, "merged set out of bounds");
            }
            *lock(&self.phase) = PlanPhase::IntegrationFailed;
            return Ok(PlanPhase::IntegrationFailed);
        }

        match self.workspace.fast_forward_trunk()? {
            PromotionOutcome::FastForwarded => {
                let mut records = lock(&self.records);
                for record in records.values_mut() {
                    if record.state == TaskState::Verified {
                        record.transition(TaskState::Merged).map_err(|e| anyhow!(e))?;
                    }
                }
                info!("staging promoted to trunk");
                *lock(&self.phase) = PlanPhase::Accepted;
                Ok(PlanPhase::Accepted)
            }
            PromotionOutcome::NotFastForward => {
                warn!("trunk diverged from baseline, promotion refused until resolved");
                Ok(PlanPhase::Integrating)
            }
        }
    }

    /// Start another execute/verify round after failures, or escalate once
    /// the iteration bound is exhausted.
    pub fn iterate(&self) -> Result<PlanPhase> {
        let mut iterations = lock(&self.iterations);
        *iterations += 1;
        if *iterations >= self.config.max_iterations {
            warn!(iterations = *iterations, "iteration bound reached, escalating");
            *lock(&self.phase) = PlanPhase::Escalated;
            return Ok(PlanPhase::Escalated);
        }

        let mut records = lock(&self.records);
        for record in records.values_mut() {
            if matches!(record.state, TaskState::Failed | TaskState::Blocked) {
                record.transition(TaskState::Pending).map_err(|e| anyhow!(e))?;
                record.reason = None;
            }
        }
        info!(iteration = *iterations, "retrying failed tasks");
        *lock(&self.phase) = PlanPhase::Executing;
        Ok(PlanPhase::Executing)
    }

    /// Apply the human's disposition for an escalated run. The session never
    /// chooses among these itself.
    ///
    /// Regenerating ends the session without touching trunk; the next plan
    /// starts a fresh session.
    pub fn resolve_escalation(&self, choice: EscalationChoice) -> Result<PlanPhase> {
        if self.phase() != PlanPhase::Escalated {
            return Err(anyhow!(
                "cannot resolve escalation while {:?}",
                self.phase()
            ));
        }
        let next = match choice {
            EscalationChoice::ResumeAfterFix => {
                let mut records = lock(&self.records);
                for record in records.values_mut() {
                    if matches!(record.state, TaskState::Failed | TaskState::Blocked) {
                        record.transition(TaskState::Pending).map_err(|e| anyhow!(e))?;
                        record.reason = None;
                    }
                }
                *lock(&self.iterations) = 0;
                PlanPhase::Executing
            }
            EscalationChoice::RegeneratePlan => PlanPhase::Aborted,
            EscalationChoice::Abort => {
                self.workspace
                    .restore_trunk(&self.baseline)
                    .context("restore trunk to baseline")?;
                info!(baseline = %self.baseline, "trunk restored");
                PlanPhase::Aborted
            }
        };
        *lock(&self.phase) = next;
        Ok(next)
    }

    /// Boundary re-check over the whole staging diff before promotion.
    ///
    /// Per-file churn and formatting were already judged per task; here only
    /// the hard rules apply: every changed path must be in some task's
    /// allow-set, match no forbidden pattern, and not be a lockfile.
    fn merged_set_violations(&self) -> Result<Vec<crate::core::boundary::Violation>> {
        let changes: Vec<ChangedFile> = self
            .workspace
            .staging_changed_files()
            .context("diff staging against trunk")?
            .into_iter()
            .map(|change| ChangedFile {
                whitespace_only: false,
                ..change
            })
            .collect();

        let mut union = crate::core::plan::Task {
            id: "merged-set".to_string(),
            allow_large_changes: true,
            ..crate::core::plan::Task::default()
        };
        for task in &self.plan.tasks {
            union.files_write.extend(task.files_write.iter().cloned());
            union.files_append.extend(task.files_append.iter().cloned());
        }
        let report = validate_boundaries(&union, &changes, &self.config.boundary_rules);
        Ok(report.violations)
    }

    fn transition(&self, task_id: &str, next: TaskState) -> Result<()> {
        let mut records = lock(&self.records);
        let record = records
            .get_mut(task_id)
            .ok_or_else(|| anyhow!("unknown task '{task_id}'"))?;
        record.transition(next).map_err(|e| anyhow!(e))
    }

    fn all_verified(&self) -> bool {
        lock(&self.records)
            .values()
            .all(|record| record.state == TaskState::Verified)
    }

    fn environment_mismatch(&self, task_id: &str) -> Option<String> {
        let expected = self.config.environment_hash.as_deref()?;
        let records = lock(&self.records);
        let actual = records.get(task_id)?.environment_hash.clone();
        match actual {
            Some(actual) if actual == expected => None,
            Some(actual) => Some(format!(
                "environment_mismatch: expected {expected}, task ran against {actual}"
            )),
            None => Some(format!(
                "environment_mismatch: expected {expected}, task reported none"
            )),
        }
    }

    fn contract_mismatch(&self, task_id: &str) -> Option<String> {
        let records = lock(&self.records);
        let record = records.get(task_id)?;
        let mut problems = Vec::new();
        for (name, used) in &record.contracts_used {
            let Some(contract) = self.plan.contract(name) else {
                problems.push(format!("unknown contract '{name}'"));
                continue;
            };
            if contract.version != used.version {
                problems.push(format!(
                    "contract '{name}' version {} does not match plan version {}",
                    used.version, contract.version
                ));
            }
            for method in &used.methods {
                if !contract.methods.contains(method) {
                    problems.push(format!(
                        "contract '{name}' has no method '{method}'"
                    ));
                }
            }
        }
        if problems.is_empty() {
            None
        } else {
            Some(format!("contract_mismatch: {}", problems.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::core::plan::ContractSpec;
    use crate::test_support::{plan_of, task, task_with_test};

    /// In-memory workspace double recording merges and restores.
    #[derive(Default)]
    struct FakeWorkspace {
        changed: HashMap<String, Vec<ChangedFile>>,
        staging_changed: Vec<ChangedFile>,
        merged: Mutex<Vec<String>>,
        restored_to: Mutex<Option<String>>,
        refuse_fast_forward: Mutex<bool>,
    }

    impl Workspace for FakeWorkspace {
        fn changed_files(&self, task_id: &str) -> Result<Vec<ChangedFile>> {
            Ok(self.changed.get(task_id).cloned().unwrap_or_default())
        }

        fn staging_changed_files(&self) -> Result<Vec<ChangedFile>> {
            Ok(self.staging_changed.clone())
        }

        fn merge_into_staging(&self, task_id: &str) -> Result<()> {
            lock(&self.merged).push(task_id.to_string());
            Ok(())
        }

        fn fast_forward_trunk(&self) -> Result<PromotionOutcome> {
            if *lock(&self.refuse_fast_forward) {
                Ok(PromotionOutcome::NotFastForward)
            } else {
                Ok(PromotionOutcome::FastForwarded)
            }
        }

        fn restore_trunk(&self, commit: &str) -> Result<()> {
            *lock(&self.restored_to) = Some(commit.to_string());
            Ok(())
        }

        fn trunk_head(&self) -> Result<String> {
            Ok("base0000".to_string())
        }
    }

    fn complete(session: &Session<FakeWorkspace>, id: &str) {
        session.mark_executing(id).expect("executing");
        session
            .mark_completed(id, None, BTreeMap::new())
            .expect("completed");
    }

    /// The full happy path: execute, verify (merging into staging), integrate,
    /// and promote trunk by fast-forward.
    #[test]
    fn happy_path_promotes_trunk() {
        let plan = plan_of(vec![task_with_test("a"), task_with_test("b")]);
        let session =
            Session::new(plan, SessionConfig::default(), FakeWorkspace::default()).expect("new");

        for id in ["a", "b"] {
            complete(&session, id);
            assert_eq!(session.mark_verified(id).expect("verify"), VerifyOutcome::Verified);
        }
        assert_eq!(session.phase(), PlanPhase::Integrating);
        assert_eq!(*lock(&session.workspace.merged), vec!["a", "b"]);

        assert_eq!(session.integrate(true).expect("integrate"), PlanPhase::Accepted);
        for record in session.records() {
            assert_eq!(record.state, TaskState::Merged);
        }
    }

    /// An environment fingerprint mismatch rejects before any merge.
    #[test]
    fn environment_mismatch_rejects_without_merge() {
        let plan = plan_of(vec![task_with_test("a")]);
        let config = SessionConfig {
            environment_hash: Some("aabbccdd".to_string()),
            ..SessionConfig::default()
        };
        let session = Session::new(plan, config, FakeWorkspace::default()).expect("new");

        session.mark_executing("a").expect("executing");
        session
            .mark_completed("a", Some("11223344".to_string()), BTreeMap::new())
            .expect("completed");

        let outcome = session.mark_verified("a").expect("verify");
        let VerifyOutcome::Rejected { reason } = outcome else {
            panic!("expected rejection");
        };
        assert!(reason.starts_with("environment_mismatch"));
        assert!(lock(&session.workspace.merged).is_empty());
        assert_eq!(session.record("a").expect("record").state, TaskState::Failed);
    }

    /// Using a contract at the wrong version or an undeclared method rejects.
    #[test]
    fn contract_mismatch_rejects() {
        let mut plan = plan_of(vec![task_with_test("a")]);
        plan.contracts.push(ContractSpec {
            name: "AuthServiceProtocol".to_string(),
            version: "v1".to_string(),
            methods: vec!["login".to_string()],
        });
        let session =
            Session::new(plan, SessionConfig::default(), FakeWorkspace::default()).expect("new");

        session.mark_executing("a").expect("executing");
        let used = BTreeMap::from([(
            "AuthServiceProtocol".to_string(),
            ContractUse {
                version: "v2".to_string(),
                methods: vec!["logout".to_string()],
            },
        )]);
        session.mark_completed("a", None, used).expect("completed");

        let VerifyOutcome::Rejected { reason } = session.mark_verified("a").expect("verify") else {
            panic!("expected rejection");
        };
        assert!(reason.contains("version v2"));
        assert!(reason.contains("no method 'logout'"));
    }

    /// A diff touching a file outside the allow-set rejects verification.
    #[test]
    fn boundary_violation_rejects() {
        let mut t = task_with_test("a");
        t.files_write = vec!["src/a.py".to_string()];
        let plan = plan_of(vec![t]);
        let mut workspace = FakeWorkspace::default();
        workspace.changed.insert(
            "a".to_string(),
            vec![ChangedFile {
                path: "src/other.py".to_string(),
                added: 5,
                removed: 0,
                whitespace_only: false,
            }],
        );
        let session = Session::new(plan, SessionConfig::default(), workspace).expect("new");

        complete(&session, "a");
        let VerifyOutcome::Rejected { reason } = session.mark_verified("a").expect("verify") else {
            panic!("expected rejection");
        };
        assert!(reason.starts_with("boundary_violation"));
        assert!(lock(&session.workspace.merged).is_empty());
    }

    /// A failure blocks transitively dependent pending tasks.
    #[test]
    fn failure_blocks_transitive_dependents() {
        let plan = plan_of(vec![
            task("a", &[]),
            task("b", &["a"]),
            task("c", &["b"]),
            task("free", &[]),
        ]);
        let session =
            Session::new(plan, SessionConfig::default(), FakeWorkspace::default()).expect("new");

        session.mark_executing("a").expect("executing");
        session.mark_failed("a", "timeout").expect("failed");

        assert_eq!(session.record("b").expect("b").state, TaskState::Blocked);
        assert_eq!(session.record("c").expect("c").state, TaskState::Blocked);
        assert_eq!(session.record("free").expect("free").state, TaskState::Pending);
        assert_eq!(session.record("a").expect("a").reason.as_deref(), Some("timeout"));
    }

    /// Cancellation works while pending or executing, never after completion.
    #[test]
    fn cancel_window_closes_at_completion() {
        let plan = plan_of(vec![task("a", &[]), task("b", &[])]);
        let session =
            Session::new(plan, SessionConfig::default(), FakeWorkspace::default()).expect("new");

        session.mark_executing("a").expect("executing");
        session.cancel("a").expect("cancel");
        assert_eq!(session.record("a").expect("a").reason.as_deref(), Some("cancelled"));

        complete(&session, "b");
        assert!(session.cancel("b").is_err());
    }

    /// A failed staging regression leaves trunk untouched and records verified.
    #[test]
    fn failed_regression_leaves_trunk_untouched() {
        let plan = plan_of(vec![task_with_test("a")]);
        let session =
            Session::new(plan, SessionConfig::default(), FakeWorkspace::default()).expect("new");
        complete(&session, "a");
        session.mark_verified("a").expect("verify");

        assert_eq!(
            session.integrate(false).expect("integrate"),
            PlanPhase::IntegrationFailed
        );
        assert_eq!(session.record("a").expect("a").state, TaskState::Verified);
    }

    /// The pre-promotion re-check catches staging files outside every task's
    /// allow-set, failing integration with trunk untouched.
    #[test]
    fn merged_set_outside_allow_sets_fails_integration() {
        let mut t = task_with_test("a");
        t.files_write = vec!["src/a.py".to_string()];
        let plan = plan_of(vec![t]);
        let workspace = FakeWorkspace {
            staging_changed: vec![
                ChangedFile {
                    path: "src/a.py".to_string(),
                    added: 3,
                    removed: 0,
                    whitespace_only: false,
                },
                ChangedFile {
                    path: "src/stray.py".to_string(),
                    added: 1,
                    removed: 0,
                    whitespace_only: false,
                },
            ],
            ..FakeWorkspace::default()
        };
        let session = Session::new(plan, SessionConfig::default(), workspace).expect("new");
        complete(&session, "a");
        session.mark_verified("a").expect("verify");

        assert_eq!(
            session.integrate(true).expect("integrate"),
            PlanPhase::IntegrationFailed
        );
        assert_eq!(session.record("a").expect("a").state, TaskState::Verified);
    }

    /// Promotion is fail-closed: a diverged trunk refuses the fast-forward
    /// but keeps the session integrating, so a later attempt succeeds once
    /// the divergence is resolved.
    #[test]
    fn diverged_trunk_refuses_promotion_until_resolved() {
        let plan = plan_of(vec![task_with_test("a")]);
        let workspace = FakeWorkspace {
            refuse_fast_forward: Mutex::new(true),
            ..FakeWorkspace::default()
        };
        let session = Session::new(plan, SessionConfig::default(), workspace).expect("new");
        complete(&session, "a");
        session.mark_verified("a").expect("verify");

        assert_eq!(
            session.integrate(true).expect("integrate"),
            PlanPhase::Integrating
        );
        assert_eq!(session.phase(), PlanPhase::Integrating);
        assert_eq!(session.record("a").expect("a").state, TaskState::Verified);

        *lock(&session.workspace.refuse_fast_forward) = false;
        assert_eq!(
            session.integrate(true).expect("integrate"),
            PlanPhase::Accepted
        );
        assert_eq!(session.record("a").expect("a").state, TaskState::Merged);
    }

    /// Iteration retries failed and blocked tasks until the bound, then
    /// escalates instead of looping forever.
    #[test]
    fn iteration_bound_escalates() {
        let plan = plan_of(vec![task("a", &[]), task("b", &["a"])]);
        let config = SessionConfig {
            max_iterations: 2,
            ..SessionConfig::default()
        };
        let session = Session::new(plan, config, FakeWorkspace::default()).expect("new");

        session.mark_executing("a").expect("executing");
        session.mark_failed("a", "timeout").expect("failed");
        assert_eq!(session.iterate().expect("iterate"), PlanPhase::Executing);
        assert_eq!(session.record("a").expect("a").state, TaskState::Pending);
        assert_eq!(session.record("b").expect("b").state, TaskState::Pending);

        session.mark_executing("a").expect("executing");
        session.mark_failed("a", "timeout").expect("failed");
        assert_eq!(session.iterate().expect("iterate"), PlanPhase::Escalated);
    }

    /// Aborting an escalated run restores trunk to the captured baseline.
    #[test]
    fn abort_restores_baseline() {
        let plan = plan_of(vec![task("a", &[])]);
        let config = SessionConfig {
            max_iterations: 1,
            ..SessionConfig::default()
        };
        let session = Session::new(plan, config, FakeWorkspace::default()).expect("new");

        session.mark_executing("a").expect("executing");
        session.mark_failed("a", "timeout").expect("failed");
        session.iterate().expect("iterate");
        assert_eq!(session.phase(), PlanPhase::Escalated);

        assert_eq!(
            session
                .resolve_escalation(EscalationChoice::Abort)
                .expect("resolve"),
            PlanPhase::Aborted
        );
        assert_eq!(
            lock(&session.workspace.restored_to).as_deref(),
            Some("base0000")
        );
    }

    /// Resuming after a manual fix resets the iteration count.
    #[test]
    fn resume_after_fix_resets_iterations() {
        let plan = plan_of(vec![task("a", &[])]);
        let config = SessionConfig {
            max_iterations: 1,
            ..SessionConfig::default()
        };
        let session = Session::new(plan, config, FakeWorkspace::default()).expect("new");

        session.mark_executing("a").expect("executing");
        session.mark_failed("a", "timeout").expect("failed");
        session.iterate().expect("iterate");

        assert_eq!(
            session
                .resolve_escalation(EscalationChoice::ResumeAfterFix)
                .expect("resolve"),
            PlanPhase::Executing
        );
        assert_eq!(session.record("a").expect("a").state, TaskState::Pending);
        assert!(lock(&session.workspace.restored_to).is_none());
    }

    /// Concurrent verification of a wave merges every task exactly once.
    #[test]
    fn concurrent_verification_merges_each_task_once() {
        let ids = ["a", "b", "c", "d"];
        let plan = plan_of(ids.iter().map(|id| task_with_test(id)).collect());
        let session =
            Session::new(plan, SessionConfig::default(), FakeWorkspace::default()).expect("new");
        for id in ids {
            complete(&session, id);
        }

        std::thread::scope(|scope| {
            for id in ids {
                let session = &session;
                scope.spawn(move || {
                    assert_eq!(
                        session.mark_verified(id).expect("verify"),
                        VerifyOutcome::Verified
                    );
                });
            }
        });

        let mut merged = lock(&session.workspace.merged).clone();
        merged.sort();
        assert_eq!(merged, ids);
        assert_eq!(session.phase(), PlanPhase::Integrating);
    }
}
