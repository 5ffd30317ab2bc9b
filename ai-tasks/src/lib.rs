//! Sequential task orchestrator for coding agents.
//!
//! Reads a manifest of tasks and drives each one on its own git branch
//! through an exec/verify retry loop, then an actualize step once verify
//! passes. Every agent invocation leaves a markdown log and a commit.
//!
//! - **[`core`]**: Pure logic (naming, placeholder substitution, selection).
//! - **[`io`]**: Side effects (processes, git, config, manifest, log files).
//!
//! [`pipeline`] drives a single task; [`run`] iterates over the manifest.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
