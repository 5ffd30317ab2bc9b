//! Per-role agent command resolution.
//!
//! An `AI_TASKS_<ROLE>_CMD` environment variable wins over the config. Its
//! value is split on whitespace: the first token is the executable.

use tracing::debug;

use crate::core::types::{AgentCommand, AgentRole};
use crate::io::config::AgentsConfig;

/// Resolve the command for `role` from an optional override and the config.
///
/// Returns `None` when no source names a command.
pub fn resolve_command(
    role: AgentRole,
    agents: &AgentsConfig,
    env_override: Option<&str>,
) -> Option<AgentCommand> {
    if let Some(raw) = env_override {
        let mut tokens = raw.split_whitespace().map(str::to_string);
        if let Some(executable) = tokens.next() {
            debug!(%role, %executable, "using environment override");
            return Some(AgentCommand {
                executable,
                args: tokens.collect(),
            });
        }
    }

    let block = agents.block_or_default(role)?;
    let executable = block.command.trim();
    if executable.is_empty() {
        return None;
    }
    Some(AgentCommand {
        executable: executable.to_string(),
        args: block.args.clone(),
    })
}

/// [`resolve_command`] with the override read from the process environment.
pub fn resolve_from_env(role: AgentRole, agents: &AgentsConfig) -> Option<AgentCommand> {
    let value = std::env::var(role.env_override_var()).ok();
    resolve_command(role, agents, value.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::AgentCommandConfig;

    fn block(command: &str, args: &[&str]) -> AgentCommandConfig {
        AgentCommandConfig {
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            timeout_secs: None,
        }
    }

    #[test]
    fn env_override_is_split_on_whitespace() {
        let agents = AgentsConfig {
            exec: Some(block("claude", &["-p"])),
            ..AgentsConfig::default()
        };
        let cmd = resolve_command(AgentRole::Exec, &agents, Some("  codex   exec {{TASK_PATH}} "))
            .expect("resolved");
        assert_eq!(cmd.executable, "codex");
        assert_eq!(cmd.args, vec!["exec", "{{TASK_PATH}}"]);
    }

    #[test]
    fn blank_override_falls_through_to_config() {
        let agents = AgentsConfig {
            verify: Some(block("just", &["verify"])),
            ..AgentsConfig::default()
        };
        let cmd = resolve_command(AgentRole::Verify, &agents, Some("   ")).expect("resolved");
        assert_eq!(cmd.executable, "just");
        assert_eq!(cmd.args, vec!["verify"]);
    }

    #[test]
    fn missing_role_block_falls_back_to_exec_block() {
        let agents = AgentsConfig {
            exec: Some(block("claude", &["-p", "{{TASK_PATH}}"])),
            ..AgentsConfig::default()
        };
        let cmd = resolve_command(AgentRole::Actualize, &agents, None).expect("resolved");
        assert_eq!(cmd.executable, "claude");
    }

    #[test]
    fn unconfigured_role_resolves_to_none() {
        assert_eq!(
            resolve_command(AgentRole::Verify, &AgentsConfig::default(), None),
            None
        );
        let agents = AgentsConfig {
            exec: Some(block("  ", &[])),
            ..AgentsConfig::default()
        };
        assert_eq!(resolve_command(AgentRole::Exec, &agents, None), None);
    }

    #[test]
    fn stop_role_never_resolves() {
        let agents = AgentsConfig {
            exec: Some(block("claude", &[])),
            ..AgentsConfig::default()
        };
        assert_eq!(resolve_command(AgentRole::Stop, &agents, None), None);
    }
}
