//! Plan files on disk (TOML).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};

use crate::core::plan::{Plan, validate_plan};

/// Load and validate a plan from a TOML file.
///
/// Invariant violations are reported together in one error, so a broken plan
/// comes back with the complete list.
pub fn load_plan(path: &Path) -> Result<Plan> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let plan: Plan =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    let errors = validate_plan(&plan);
    if !errors.is_empty() {
        return Err(anyhow!(
            "invalid plan {}:\n  {}",
            path.display(),
            errors.join("\n  ")
        ));
    }
    Ok(plan)
}
