//! Pure, deterministic helpers for the task pipeline. No I/O.

pub mod naming;
pub mod selection;
pub mod template;
pub mod types;
