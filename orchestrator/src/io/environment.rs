//! Dependency-environment fingerprinting.
//!
//! The plan-wide environment is set up once before any task executes; every
//! worker then runs against the same lockfiles. The fingerprint recorded here
//! is compared against each task's reported hash during verification.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::core::boundary::BoundaryRules;

/// Lockfiles present at the repository root, in the configured name order.
pub fn find_lockfiles(root: &Path, rules: &BoundaryRules) -> Vec<PathBuf> {
    rules
        .lockfile_names
        .iter()
        .map(|name| root.join(name))
        .filter(|path| path.is_file())
        .collect()
}

/// Short fingerprint of the dependency environment: sha256 over every
/// lockfile's name and contents, truncated to 8 hex chars. None when the
/// repository has no lockfiles.
pub fn environment_hash(root: &Path, rules: &BoundaryRules) -> Result<Option<String>> {
    let lockfiles = find_lockfiles(root, rules);
    if lockfiles.is_empty() {
        return Ok(None);
    }

    let mut hasher = Sha256::new();
    for path in &lockfiles {
        let contents =
            fs::read(path).with_context(|| format!("read lockfile {}", path.display()))?;
        if let Some(name) = path.file_name() {
            hasher.update(name.as_encoded_bytes());
        }
        hasher.update(&contents);
    }
    let digest = hex::encode(hasher.finalize());
    Ok(Some(digest[..8].to_string()))
}
