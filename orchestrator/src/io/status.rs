//! Session status persisted as JSON for inspection between commands.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::state::{PlanPhase, TaskRunRecord};
use crate::session::{Session, Workspace};

/// A durable snapshot of a session: plan phase, trunk baseline, and every
/// task record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub phase: PlanPhase,
    /// Trunk commit captured before orchestration started.
    pub baseline: String,
    pub records: Vec<TaskRunRecord>,
}

impl SessionStatus {
    pub fn snapshot<W: Workspace>(session: &Session<W>) -> Self {
        Self {
            phase: session.phase(),
            baseline: session.baseline().to_string(),
            records: session.records(),
        }
    }
}

/// Load a previously written status file.
pub fn load_status(path: &Path) -> Result<SessionStatus> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Atomically write the status file (temp file + rename).
pub fn write_status(path: &Path, status: &SessionStatus) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("status path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut buf = serde_json::to_string_pretty(status).context("serialize status json")?;
    buf.push('\n');
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &buf)
        .with_context(|| format!("write temp status {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace status {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::core::state::{ContractUse, TaskState};

    fn status() -> SessionStatus {
        let mut record = TaskRunRecord::new("a");
        record.state = TaskState::Failed;
        record.reason = Some("environment_mismatch: expected aabbccdd".to_string());
        record.environment_hash = Some("11223344".to_string());
        record.contracts_used = BTreeMap::from([(
            "AuthServiceProtocol".to_string(),
            ContractUse {
                version: "v1".to_string(),
                methods: vec!["login".to_string()],
            },
        )]);
        SessionStatus {
            phase: PlanPhase::IntegrationFailed,
            baseline: "base0000".to_string(),
            records: vec![record, TaskRunRecord::new("b")],
        }
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state").join("status.json");
        let status = status();
        write_status(&path, &status).expect("write");
        let loaded = load_status(&path).expect("load");
        assert_eq!(loaded, status);
    }

    /// States and phases serialize to the stable lowercase names other tools
    /// depend on.
    #[test]
    fn serialized_names_are_stable() {
        let json = serde_json::to_string(&status()).expect("serialize");
        assert!(json.contains("\"integration_failed\""));
        assert!(json.contains("\"failed\""));
        assert!(json.contains("\"pending\""));
    }
}
