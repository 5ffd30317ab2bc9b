//! Shared value types for the task pipeline.
//!
//! These types carry no I/O and are cheap to clone. They define the contracts
//! between the orchestrator and the stateless adapters under `io`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status value that marks a manifest task as finished.
pub const DONE_STATUS: &str = "done";

/// One unit of work read from the manifest.
///
/// Immutable for the duration of a run; the actualize agent may rewrite the
/// manifest on disk but the orchestrator never re-reads it mid-run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub file: String,
    #[serde(default = "default_status")]
    pub status: String,
}

fn default_status() -> String {
    "pending".to_string()
}

impl Task {
    pub fn is_done(&self) -> bool {
        self.status.eq_ignore_ascii_case(DONE_STATUS)
    }
}

/// Agent role invoked by the orchestrator.
///
/// `Stop` never spawns a process; it only tags the log written when a task
/// exhausts its attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Exec,
    Verify,
    Actualize,
    Stop,
}

impl AgentRole {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentRole::Exec => "exec",
            AgentRole::Verify => "verify",
            AgentRole::Actualize => "actualize",
            AgentRole::Stop => "stop",
        }
    }

    /// True for roles whose invocations are scoped to a numbered attempt.
    pub fn is_attempt_scoped(self) -> bool {
        matches!(self, AgentRole::Exec | AgentRole::Verify)
    }

    /// Environment variable that overrides this role's command,
    /// e.g. `AI_TASKS_EXEC_CMD`.
    pub fn env_override_var(self) -> String {
        format!("AI_TASKS_{}_CMD", self.as_str().to_ascii_uppercase())
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved executable plus arguments for one agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCommand {
    pub executable: String,
    pub args: Vec<String>,
}

/// Raw outcome of one agent process.
///
/// `exit_code` is already normalized: signal terminations map to
/// [`SIGNAL_EXIT_CODE`] and spawn failures map to `1`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AgentInvocationResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

/// Exit code synthesized when a child was terminated by a signal.
pub const SIGNAL_EXIT_CODE: i32 = 143;

impl AgentInvocationResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Forced failure for an invocation that could not be attempted.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            stdout: String::new(),
            stderr: message.into(),
            timed_out: false,
        }
    }

    /// Stdout and stderr joined by a newline, empty segments omitted.
    pub fn transcript(&self) -> String {
        [self.stdout.as_str(), self.stderr.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Error returned when neither the environment nor the config names a command
/// for a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentNotConfigured {
    pub role: AgentRole,
}

impl fmt::Display for AgentNotConfigured {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} agent is not configured (set {} or [agents.{}] in config)",
            self.role,
            self.role.env_override_var(),
            self.role
        )
    }
}

impl std::error::Error for AgentNotConfigured {}
