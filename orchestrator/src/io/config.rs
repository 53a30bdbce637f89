//! Orchestrator configuration stored as a TOML file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::boundary::BoundaryRules;
use crate::core::risk::RiskConfig;

/// Orchestrator configuration (TOML).
///
/// Intended to be edited by humans; missing fields and sections fall back to
/// the enumerated defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Branch the orchestrator promotes into.
    pub trunk_branch: String,

    /// Branch verified task work merges into before promotion.
    pub staging_branch: String,

    /// Execute/verify/integrate rounds before escalating to a human.
    pub max_iterations: u32,

    pub risk: RiskConfig,

    pub boundary: BoundaryRules,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            trunk_branch: "main".to_string(),
            staging_branch: "orchestrator/staging".to_string(),
            max_iterations: 3,
            risk: RiskConfig::default(),
            boundary: BoundaryRules::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.trunk_branch.trim().is_empty() {
            return Err(anyhow!("trunk_branch must be non-empty"));
        }
        if self.staging_branch.trim().is_empty() {
            return Err(anyhow!("staging_branch must be non-empty"));
        }
        if self.trunk_branch == self.staging_branch {
            return Err(anyhow!("trunk_branch and staging_branch must differ"));
        }
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        for pattern in &self.boundary.forbidden_patterns {
            Regex::new(pattern)
                .with_context(|| format!("invalid boundary pattern '{pattern}'"))?;
        }
        for sensitive in &self.risk.sensitive_patterns {
            Regex::new(&sensitive.pattern)
                .with_context(|| format!("invalid risk pattern '{}'", sensitive.pattern))?;
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `OrchestratorConfig::default()`.
pub fn load_config(path: &Path) -> Result<OrchestratorConfig> {
    if !path.exists() {
        let cfg = OrchestratorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: OrchestratorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &OrchestratorConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
