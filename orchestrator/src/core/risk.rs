//! Risk scoring for plan approval gates.
//!
//! Pure function over an immutable plan: no I/O, deterministic, idempotent.
//! The factor list records every contributing match with path, pattern, and
//! weight so the score can be reconstructed by hand for the audit trail.

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use crate::core::plan::Plan;

/// A regex pattern marking sensitive paths, with its risk weight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitivePattern {
    pub pattern: String,
    pub weight: u32,
}

/// Risk scoring configuration: sensitive-path weights and the auto-approval
/// threshold. Defaults are enumerated here; config files may override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Scores strictly below this value qualify for auto-approval.
    pub auto_approve_threshold: u32,
    pub sensitive_patterns: Vec<SensitivePattern>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        let patterns = [
            ("auth|security|crypto", 20),
            ("payment|billing|stripe", 25),
            ("prod|production|deploy", 30),
            ("admin|sudo|root", 15),
            (r"\.env|secret|key|token", 25),
            ("migration|schema|database", 15),
        ];
        Self {
            auto_approve_threshold: 25,
            sensitive_patterns: patterns
                .iter()
                .map(|(pattern, weight)| SensitivePattern {
                    pattern: (*pattern).to_string(),
                    weight: *weight,
                })
                .collect(),
        }
    }
}

/// Whether the plan may run without a human gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskDecision {
    AutoApprove,
    RecommendReview,
    RequireReview,
}

/// Risk assessment for a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskScore {
    pub value: u32,
    /// Ordered audit trail: one entry per contributing factor, each carrying
    /// enough detail (path, pattern, weight) to reconstruct the total.
    pub factors: Vec<String>,
    pub decision: RiskDecision,
}

/// Compute the risk score for a plan.
///
/// A path matching several sensitive patterns accumulates every matching
/// weight; severity compounds deliberately and is not deduplicated.
pub fn score_plan(plan: &Plan, config: &RiskConfig) -> RiskScore {
    let mut value: u32 = 0;
    let mut factors: Vec<String> = Vec::new();

    // Invalid patterns are rejected by config validation; skip defensively here.
    let compiled: Vec<(&SensitivePattern, regex::Regex)> = config
        .sensitive_patterns
        .iter()
        .filter_map(|p| {
            RegexBuilder::new(&p.pattern)
                .case_insensitive(true)
                .build()
                .ok()
                .map(|re| (p, re))
        })
        .collect();

    for task in &plan.tasks {
        for path in &task.files_write {
            for (pattern, re) in &compiled {
                if re.is_match(path) {
                    value += pattern.weight;
                    factors.push(format!(
                        "sensitive_path:{path}:{}:+{}",
                        pattern.pattern, pattern.weight
                    ));
                }
            }
        }
    }

    let task_count = plan.tasks.len() as u32;
    if task_count > 5 {
        let added = (task_count - 5) * 5;
        value += added;
        factors.push(format!("many_tasks:{task_count}:+{added}"));
    }

    let file_count = plan
        .tasks
        .iter()
        .map(|task| task.files_write.len())
        .sum::<usize>() as u32;
    if file_count > 10 {
        let added = (file_count - 10) * 3;
        value += added;
        factors.push(format!("many_files:{file_count}:+{added}"));
    }

    let intent_count = plan
        .tasks
        .iter()
        .map(|task| task.patch_intents.len())
        .sum::<usize>() as u32;
    if intent_count > 3 {
        let added = (intent_count - 3) * 5;
        value += added;
        factors.push(format!("many_patch_intents:{intent_count}:+{added}"));
    }

    let new_deps = plan
        .tasks
        .iter()
        .map(|task| task.deps_required.runtime.len())
        .sum::<usize>() as u32;
    if new_deps > 0 {
        let added = new_deps * 3;
        value += added;
        factors.push(format!("new_dependencies:{new_deps}:+{added}"));
    }

    let contract_count = plan.contracts.len() as u32;
    if contract_count > 3 {
        let added = (contract_count - 3) * 5;
        value += added;
        factors.push(format!("many_contracts:{contract_count}:+{added}"));
    }

    if task_count > 0 {
        let with_tests = plan.tasks.iter().filter(|t| t.has_test_check()).count() as u32;
        let ratio = f64::from(with_tests) / f64::from(task_count);
        if ratio < 1.0 {
            let added = (20.0 * (1.0 - ratio)).round() as u32;
            value += added;
            let pct = (ratio * 100.0).round() as u32;
            factors.push(format!("incomplete_test_coverage:{pct}%:+{added}"));
        }
    }

    let decision = if value < config.auto_approve_threshold {
        RiskDecision::AutoApprove
    } else if value <= 50 {
        RiskDecision::RecommendReview
    } else {
        RiskDecision::RequireReview
    };

    RiskScore {
        value,
        factors,
        decision,
    }
}
