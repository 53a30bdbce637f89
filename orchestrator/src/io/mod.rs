//! Side-effecting operations: git, filesystem, configuration.
//!
//! Kept apart from [`crate::core`] so every decision rule stays testable
//! without a repository.

pub mod config;
pub mod environment;
pub mod git;
pub mod plan_file;
pub mod status;
