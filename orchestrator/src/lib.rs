//! Multi-agent task orchestration core.
//!
//! This crate validates and schedules task plans, detects ownership conflicts
//! between concurrent tasks, scores plan risk, enforces change boundaries,
//! and drives the verification-and-promotion state machine over a
//! branch-per-task git workspace. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (scheduling, conflict detection,
//!   risk scoring, boundary rules, state transitions). No I/O, fully testable
//!   in isolation.
//! - **[`io`]**: Side-effecting operations (git, config, plan and status
//!   files). Isolated to enable substitution in tests.
//!
//! Orchestration modules ([`admit`], [`session`], [`adapter`]) coordinate
//! core logic with I/O to implement CLI commands.

pub mod adapter;
pub mod admit;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
