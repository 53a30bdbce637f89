//! Pure, deterministic orchestration logic.
//!
//! Everything here is a function of its inputs: no filesystem, no git, no
//! clocks. The [`crate::io`] layer feeds these functions and acts on their
//! results.

pub mod boundary;
pub mod conflict;
pub mod plan;
pub mod risk;
pub mod schedule;
pub mod state;
