//! Agent invocation abstraction.
//!
//! The [`AgentRunner`] trait decouples the pipeline from process spawning.
//! [`ProcessAgentRunner`] resolves a command per role and runs it; tests use
//! scripted runners that return predetermined exit codes.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::template::{Placeholders, substitute_all};
use crate::core::types::{AgentInvocationResult, AgentNotConfigured, AgentRole};
use crate::io::config::RunConfig;
use crate::io::process::{ProcessRequest, run_agent_process};
use crate::io::resolver::resolve_from_env;

/// Parameters for one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub role: AgentRole,
    pub workdir: PathBuf,
    /// Structured input for the agent, merged over the inherited environment.
    pub env: BTreeMap<String, String>,
    pub placeholders: Placeholders,
}

/// Abstraction over agent execution backends.
pub trait AgentRunner {
    /// Run the agent for `request.role`.
    ///
    /// Process failures are reported through the result's exit code. An `Err`
    /// means the invocation could not be attempted at all (see
    /// [`AgentNotConfigured`]).
    fn run(&self, request: &AgentRequest) -> Result<AgentInvocationResult>;
}

/// Runner that spawns the configured (or env-overridden) command.
#[derive(Debug, Clone)]
pub struct ProcessAgentRunner {
    config: RunConfig,
}

impl ProcessAgentRunner {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }
}

impl AgentRunner for ProcessAgentRunner {
    #[instrument(skip_all, fields(role = %request.role))]
    fn run(&self, request: &AgentRequest) -> Result<AgentInvocationResult> {
        let command = resolve_from_env(request.role, &self.config.agents)
            .ok_or(AgentNotConfigured { role: request.role })?;
        let args = substitute_all(&command.args, &request.placeholders);
        info!(executable = %command.executable, ?args, "starting agent");

        let result = run_agent_process(&ProcessRequest {
            program: command.executable,
            args,
            env: request.env.clone(),
            cwd: request.workdir.clone(),
            timeout: self.config.agent_timeout(request.role),
            output_limit_bytes: self.config.output_limit_bytes,
        });
        if !result.success() {
            warn!(exit_code = result.exit_code, timed_out = result.timed_out, "agent failed");
        }
        Ok(result)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::io::config::{AgentCommandConfig, AgentsConfig};

    fn request(role: AgentRole, workdir: PathBuf) -> AgentRequest {
        AgentRequest {
            role,
            workdir,
            env: BTreeMap::from([("TASK_ID".to_string(), "T1".to_string())]),
            placeholders: Placeholders {
                task_path: "/x/t1.md".to_string(),
                attempt: "2".to_string(),
                ..Placeholders::default()
            },
        }
    }

    #[test]
    fn runs_configured_command_with_substituted_args() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = RunConfig {
            agents: AgentsConfig {
                verify: Some(AgentCommandConfig {
                    command: "sh".to_string(),
                    args: vec![
                        "-c".to_string(),
                        "printf '%s %s %s' \"$TASK_ID\" \"$1\" \"$2\"".to_string(),
                        "sh".to_string(),
                        "{{TASK_PATH}}".to_string(),
                        "{{attempt}}".to_string(),
                    ],
                    timeout_secs: Some(10),
                }),
                ..AgentsConfig::default()
            },
            ..RunConfig::default()
        };
        let runner = ProcessAgentRunner::new(config);
        let result = runner
            .run(&request(AgentRole::Verify, temp.path().to_path_buf()))
            .expect("run");
        assert!(result.success());
        assert_eq!(result.stdout, "T1 /x/t1.md 2");
    }

    #[test]
    fn unconfigured_role_is_typed_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = ProcessAgentRunner::new(RunConfig::default());
        let err = runner
            .run(&request(AgentRole::Actualize, temp.path().to_path_buf()))
            .unwrap_err();
        let typed = err
            .downcast_ref::<AgentNotConfigured>()
            .expect("typed error");
        assert_eq!(typed.role, AgentRole::Actualize);
    }
}
