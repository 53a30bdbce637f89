//! Stable exit codes for orchestrator CLI commands.

/// Command succeeded; the plan (if any) was admitted.
pub const OK: i32 = 0;
/// Command failed due to an invalid plan file, config, or other error.
pub const INVALID: i32 = 1;
/// The plan was rejected by admission (cycle or ownership conflicts).
pub const REJECTED: i32 = 2;
/// `orchestrator status` found a failed or aborted run.
pub const FAILED: i32 = 3;
/// `orchestrator status` found a run waiting on a human decision.
pub const ESCALATED: i32 = 4;
