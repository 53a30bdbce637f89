//! Boundary and churn validation for completed tasks.
//!
//! Pure rules over a supplied change set: the workspace collaborator reports
//! which paths actually changed (with line counts and a whitespace-diff
//! probe), and this module decides whether the task stayed inside its
//! declared contract. No rule short-circuits the others; callers get the
//! complete violation list.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::plan::Task;

/// Kind of boundary violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    UnauthorizedFile,
    ForbiddenPattern,
    LockfileViolation,
    ExcessiveChurn,
    FormattingOnly,
}

/// A single boundary violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub file: String,
    pub message: String,
}

/// One actually-changed file, as reported by the workspace collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    /// Path relative to the repository root.
    pub path: String,
    pub added: u64,
    pub removed: u64,
    /// True if a whitespace-insensitive diff against trunk shows no changes.
    pub whitespace_only: bool,
}

/// Boundary rule configuration with enumerated defaults plus overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryRules {
    /// Regexes for paths no task may ever modify.
    pub forbidden_patterns: Vec<String>,
    /// Exact basenames of dependency lockfiles. No override flag exists for
    /// this rule.
    pub lockfile_names: Vec<String>,
    /// Maximum `added + removed` lines per file unless the task sets
    /// `allow_large_changes`.
    pub churn_threshold: u64,
    /// Extensions where whitespace is not semantic; candidates for the
    /// formatting-only check.
    pub formatting_allowlist: Vec<String>,
    /// Extensions where whitespace is semantic; never flagged.
    pub formatting_denylist: Vec<String>,
    /// Basenames where whitespace is semantic.
    pub formatting_denylist_names: Vec<String>,
}

impl Default for BoundaryRules {
    fn default() -> Self {
        Self {
            forbidden_patterns: [
                "node_modules/",
                "__pycache__/",
                r"\.pyc$",
                "vendor/",
                "dist/",
                "build/",
                r"\.generated\.",
                r"\.min\.(js|css)$",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
            lockfile_names: [
                "package-lock.json",
                "pnpm-lock.yaml",
                "yarn.lock",
                "uv.lock",
                "poetry.lock",
                "requirements.lock",
                "Pipfile.lock",
                "Cargo.lock",
                "go.sum",
                "Gemfile.lock",
                "packages.lock.json",
                "composer.lock",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
            churn_threshold: 500,
            formatting_allowlist: [
                ".js", ".ts", ".jsx", ".tsx", ".json", ".md", ".rst", ".css", ".scss", ".less",
                ".html", ".xml", ".java", ".kt", ".go", ".rs", ".c", ".cpp", ".h", ".cs", ".rb",
                ".php",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
            formatting_denylist: [
                ".py", ".yaml", ".yml", ".mk", ".haml", ".pug", ".jade", ".coffee", ".slim",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
            formatting_denylist_names: ["Makefile", "makefile", "GNUmakefile"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

/// Result of boundary validation. Callers must not merge unless `valid()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryReport {
    pub violations: Vec<Violation>,
}

impl BoundaryReport {
    pub fn valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Validate a task's actual changes against its declared contract.
///
/// An unauthorized file is skipped for the remaining checks (it was never
/// part of the contract). Authorized files are checked against every other
/// rule independently; one file can accumulate several violations.
pub fn validate_boundaries(
    task: &Task,
    changes: &[ChangedFile],
    rules: &BoundaryRules,
) -> BoundaryReport {
    let allowed = task.allowed_files();
    let forbidden: Vec<(&String, Regex)> = rules
        .forbidden_patterns
        .iter()
        .filter_map(|p| Regex::new(p).ok().map(|re| (p, re)))
        .collect();

    let mut report = BoundaryReport::default();

    for change in changes {
        if !allowed.contains(change.path.as_str()) {
            report.violations.push(Violation {
                kind: ViolationKind::UnauthorizedFile,
                file: change.path.clone(),
                message: format!(
                    "modified file not in files_write or files_append: {}",
                    change.path
                ),
            });
            continue;
        }

        for (pattern, re) in &forbidden {
            if re.is_match(&change.path) {
                report.violations.push(Violation {
                    kind: ViolationKind::ForbiddenPattern,
                    file: change.path.clone(),
                    message: format!("path matches forbidden pattern {pattern}"),
                });
                break;
            }
        }

        let name = basename(&change.path);
        if rules.lockfile_names.iter().any(|lock| lock == name) {
            report.violations.push(Violation {
                kind: ViolationKind::LockfileViolation,
                file: change.path.clone(),
                message: format!(
                    "lockfile {} may only change through the plan-wide environment setup",
                    change.path
                ),
            });
        }

        let churn = change.added + change.removed;
        if churn > rules.churn_threshold && !task.allow_large_changes {
            report.violations.push(Violation {
                kind: ViolationKind::ExcessiveChurn,
                file: change.path.clone(),
                message: format!(
                    "{churn} lines changed exceeds threshold {} (set allow_large_changes to override)",
                    rules.churn_threshold
                ),
            });
        }

        if change.whitespace_only && formatting_check_applies(&change.path, rules) {
            report.violations.push(Violation {
                kind: ViolationKind::FormattingOnly,
                file: change.path.clone(),
                message: format!(
                    "{} has only whitespace changes (no semantic diff against trunk)",
                    change.path
                ),
            });
        }
    }

    report
}

/// True when the formatting-only rule applies: extension allowlisted and
/// neither extension nor basename is whitespace-sensitive.
fn formatting_check_applies(path: &str, rules: &BoundaryRules) -> bool {
    let name = basename(path);
    let ext = extension(name);

    if rules.formatting_denylist_names.iter().any(|n| n == name) {
        return false;
    }
    match ext {
        Some(ext) => {
            !rules
                .formatting_denylist
                .iter()
                .any(|d| d.eq_ignore_ascii_case(ext))
                && rules
                    .formatting_allowlist
                    .iter()
                    .any(|a| a.eq_ignore_ascii_case(ext))
        }
        None => false,
    }
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn extension(name: &str) -> Option<&str> {
    name.rfind('.').map(|idx| &name[idx..])
}
