//! Side-effecting adapters: processes, git, filesystem, config.

pub mod agent;
pub mod agent_log;
pub mod config;
pub mod git;
pub mod manifest;
pub mod paths;
pub mod process;
pub mod resolver;
