//! Stable exit codes for the `ai-tasks` CLI.

/// Every selected task was verified and actualized, or there was nothing to do.
pub const OK: i32 = 0;
/// A task exhausted its attempts, or the run aborted on an error.
pub const FAILED: i32 = 1;
