//! Git adapter for the branch-per-task merge pipeline.
//!
//! The orchestrator enforces its merge discipline (task branch -> staging ->
//! fast-forward trunk) through a small, explicit wrapper around `git`
//! subprocess calls.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::core::boundary::ChangedFile;
use crate::session::{PromotionOutcome, Workspace};

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Return the current branch name (errors on detached HEAD).
    #[instrument(skip_all)]
    pub fn current_branch(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim().to_string();
        if name == "HEAD" {
            warn!("detached HEAD detected");
            return Err(anyhow!("detached HEAD (refuse to run)"));
        }
        Ok(name)
    }

    /// Commit id a branch points at.
    pub fn rev_parse(&self, rev: &str) -> Result<String> {
        let out = self.run_capture(&["rev-parse", rev])?;
        Ok(out.trim().to_string())
    }

    /// Check whether a local branch exists.
    pub fn branch_exists(&self, branch: &str) -> Result<bool> {
        let status = self
            .run(&[
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{branch}"),
            ])?
            .status;
        Ok(status.success())
    }

    /// Create a branch at the given start point without checking it out.
    #[instrument(skip_all, fields(branch))]
    pub fn create_branch(&self, branch: &str, start: &str) -> Result<()> {
        debug!(branch, start, "creating branch");
        self.run_checked(&["branch", branch, start])?;
        Ok(())
    }

    /// Checkout an existing branch.
    #[instrument(skip_all, fields(branch))]
    pub fn checkout_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "checking out branch");
        self.run_checked(&["checkout", branch])?;
        Ok(())
    }

    /// Stage all changes and commit them; Ok(false) when nothing is staged.
    pub fn commit_all(&self, message: &str) -> Result<bool> {
        self.run_checked(&["add", "-A"])?;
        let staged = self.run(&["diff", "--cached", "--name-only"])?;
        if String::from_utf8_lossy(&staged.stdout).trim().is_empty() {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        self.run_checked(&["commit", "-m", message])?;
        Ok(true)
    }

    /// Merge a branch into the current branch with a merge commit.
    pub fn merge(&self, branch: &str, message: &str) -> Result<()> {
        self.run_checked(&["merge", "--no-ff", branch, "-m", message])?;
        Ok(())
    }

    /// Fast-forward the current branch to `branch`, or report divergence.
    pub fn merge_ff_only(&self, branch: &str) -> Result<bool> {
        let output = self.run(&["merge", "--ff-only", branch])?;
        if output.status.success() {
            return Ok(true);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(branch, stderr = %stderr.trim(), "fast-forward refused");
        Ok(false)
    }

    /// Hard-reset the current branch to a commit.
    pub fn reset_hard(&self, commit: &str) -> Result<()> {
        self.run_checked(&["reset", "--hard", commit])?;
        Ok(())
    }

    /// Per-file added/removed line counts between two revisions.
    pub fn diff_numstat(&self, base: &str, head: &str) -> Result<Vec<(String, u64, u64)>> {
        let range = format!("{base}...{head}");
        let out = self.run_capture(&["diff", "--numstat", &range])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_numstat_line(line)?);
        }
        Ok(entries)
    }

    /// True when a whitespace-insensitive diff of the path between the two
    /// revisions is empty.
    pub fn diff_is_whitespace_only(&self, base: &str, head: &str, path: &str) -> Result<bool> {
        let range = format!("{base}...{head}");
        let status = self
            .run(&["diff", "-w", "--quiet", &range, "--", path])?
            .status;
        Ok(status.success())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

/// Parse one `git diff --numstat` line: `added<TAB>removed<TAB>path`.
/// Binary files report `-` for both counts and are treated as zero lines.
fn parse_numstat_line(line: &str) -> Result<(String, u64, u64)> {
    let mut parts = line.splitn(3, '\t');
    let added = parts
        .next()
        .ok_or_else(|| anyhow!("unexpected numstat line: '{line}'"))?;
    let removed = parts
        .next()
        .ok_or_else(|| anyhow!("unexpected numstat line: '{line}'"))?;
    let path = parts
        .next()
        .ok_or_else(|| anyhow!("unexpected numstat line: '{line}'"))?
        .trim()
        .to_string();

    let count = |field: &str| -> Result<u64> {
        if field == "-" {
            return Ok(0);
        }
        field
            .parse()
            .with_context(|| format!("numstat count '{field}' in '{line}'"))
    };
    Ok((path, count(added)?, count(removed)?))
}

/// Git-backed [`Workspace`]: one branch per task, a staging branch for merged
/// work, and a trunk that only moves by fast-forward.
#[derive(Debug, Clone)]
pub struct GitWorkspace {
    git: Git,
    trunk: String,
    staging: String,
}

impl GitWorkspace {
    pub fn new(git: Git, trunk: impl Into<String>, staging: impl Into<String>) -> Self {
        Self {
            git,
            trunk: trunk.into(),
            staging: staging.into(),
        }
    }

    pub fn git(&self) -> &Git {
        &self.git
    }

    pub fn task_branch(task_id: &str) -> String {
        format!("task/{task_id}")
    }

    /// Create the staging branch from trunk (if missing) and a branch per
    /// task, all rooted at the same trunk commit.
    #[instrument(skip_all)]
    pub fn prepare(&self, task_ids: &[String]) -> Result<()> {
        if !self.git.branch_exists(&self.staging)? {
            self.git.create_branch(&self.staging, &self.trunk)?;
        }
        for id in task_ids {
            let branch = Self::task_branch(id);
            if !self.git.branch_exists(&branch)? {
                self.git.create_branch(&branch, &self.staging)?;
            }
        }
        Ok(())
    }
}

impl Workspace for GitWorkspace {
    fn changed_files(&self, task_id: &str) -> Result<Vec<ChangedFile>> {
        let branch = Self::task_branch(task_id);
        let numstat = self.git.diff_numstat(&self.staging, &branch)?;
        let mut changes = Vec::with_capacity(numstat.len());
        for (path, added, removed) in numstat {
            let whitespace_only = self
                .git
                .diff_is_whitespace_only(&self.staging, &branch, &path)?;
            changes.push(ChangedFile {
                path,
                added,
                removed,
                whitespace_only,
            });
        }
        Ok(changes)
    }

    fn staging_changed_files(&self) -> Result<Vec<ChangedFile>> {
        let numstat = self.git.diff_numstat(&self.trunk, &self.staging)?;
        Ok(numstat
            .into_iter()
            .map(|(path, added, removed)| ChangedFile {
                path,
                added,
                removed,
                whitespace_only: false,
            })
            .collect())
    }

    fn merge_into_staging(&self, task_id: &str) -> Result<()> {
        let branch = Self::task_branch(task_id);
        self.git.checkout_branch(&self.staging)?;
        self.git
            .merge(&branch, &format!("merge verified task {task_id}"))
            .with_context(|| format!("merge {branch} into {}", self.staging))
    }

    fn fast_forward_trunk(&self) -> Result<PromotionOutcome> {
        self.git.checkout_branch(&self.trunk)?;
        if self.git.merge_ff_only(&self.staging)? {
            Ok(PromotionOutcome::FastForwarded)
        } else {
            Ok(PromotionOutcome::NotFastForward)
        }
    }

    fn restore_trunk(&self, commit: &str) -> Result<()> {
        self.git.checkout_branch(&self.trunk)?;
        self.git.reset_hard(commit)
    }

    fn trunk_head(&self) -> Result<String> {
        self.git.rev_parse(&self.trunk)
    }
}
