//! Run configuration stored in `ai-tasks.toml` at the repository root.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::AgentRole;

/// Default config file name, relative to the repository root.
pub const CONFIG_FILE_NAME: &str = "ai-tasks.toml";
/// Environment variable naming an alternative config file.
pub const CONFIG_PATH_ENV: &str = "AI_TASKS_CONFIG";

/// Run configuration (TOML).
///
/// Missing fields default to the values in [`RunConfig::default`]. Relative
/// paths are resolved against the repository root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunConfig {
    pub manifest_path: PathBuf,
    pub tasks_dir: PathBuf,
    pub logs_dir: PathBuf,

    /// Exec/verify cycles allowed per task before the run stops.
    pub max_attempts: u32,

    /// Branch name pattern with `{{id}}` and `{{slug}}` placeholders.
    pub branch_template: String,
    pub base_branch: String,
    pub remote: String,

    /// Include agent logs in pipeline commits.
    pub commit_logs: bool,
    /// Record a commit even when a step changed nothing.
    pub empty_commit_if_no_changes: bool,

    /// Per-invocation timeout for agents without their own; `0` disables it.
    pub agent_timeout_secs: u64,

    /// Captured stdout/stderr beyond this many bytes per stream is dropped.
    pub output_limit_bytes: usize,

    pub agents: AgentsConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            manifest_path: PathBuf::from("tasks/manifest.json"),
            tasks_dir: PathBuf::from("tasks"),
            logs_dir: PathBuf::from("tasks/logs"),
            max_attempts: 3,
            branch_template: "ai-tasks/{{id}}-{{slug}}".to_string(),
            base_branch: "main".to_string(),
            remote: "origin".to_string(),
            commit_logs: true,
            empty_commit_if_no_changes: false,
            agent_timeout_secs: 30 * 60,
            output_limit_bytes: 1_000_000,
            agents: AgentsConfig::default(),
        }
    }
}

/// Per-role command blocks (`[agents.exec]`, `[agents.verify]`, `[agents.actualize]`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentsConfig {
    pub exec: Option<AgentCommandConfig>,
    pub verify: Option<AgentCommandConfig>,
    pub actualize: Option<AgentCommandConfig>,
}

impl AgentsConfig {
    /// The block configured for exactly this role.
    pub fn block(&self, role: AgentRole) -> Option<&AgentCommandConfig> {
        match role {
            AgentRole::Exec => self.exec.as_ref(),
            AgentRole::Verify => self.verify.as_ref(),
            AgentRole::Actualize => self.actualize.as_ref(),
            AgentRole::Stop => None,
        }
    }

    /// The block for `role`, falling back to the exec block.
    pub fn block_or_default(&self, role: AgentRole) -> Option<&AgentCommandConfig> {
        if role == AgentRole::Stop {
            return None;
        }
        self.block(role).or(self.exec.as_ref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentCommandConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Overrides `agent_timeout_secs` for this role; `0` disables the timeout.
    pub timeout_secs: Option<u64>,
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be > 0"));
        }
        if self.branch_template.trim().is_empty() {
            return Err(anyhow!("branch_template must not be empty"));
        }
        if self.base_branch.trim().is_empty() {
            return Err(anyhow!("base_branch must not be empty"));
        }
        if self.remote.trim().is_empty() {
            return Err(anyhow!("remote must not be empty"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    /// Effective timeout for `role`, `None` when disabled.
    pub fn agent_timeout(&self, role: AgentRole) -> Option<Duration> {
        let secs = self
            .agents
            .block_or_default(role)
            .and_then(|block| block.timeout_secs)
            .unwrap_or(self.agent_timeout_secs);
        (secs > 0).then(|| Duration::from_secs(secs))
    }
}

/// Where the config was looked up and whether its absence is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLocation {
    pub path: PathBuf,
    pub required: bool,
}

/// Resolve the config location: explicit flag, then `env_override`, then the
/// default file under `root`.
pub fn locate_config(
    root: &Path,
    explicit: Option<&Path>,
    env_override: Option<&str>,
) -> ConfigLocation {
    let chosen = explicit
        .map(Path::to_path_buf)
        .or_else(|| env_override.filter(|v| !v.trim().is_empty()).map(PathBuf::from));
    match chosen {
        Some(path) => ConfigLocation {
            path: if path.is_absolute() {
                path
            } else {
                root.join(path)
            },
            required: true,
        },
        None => ConfigLocation {
            path: root.join(CONFIG_FILE_NAME),
            required: false,
        },
    }
}

/// Load config from `location`.
///
/// An optional file that is missing yields `RunConfig::default()`.
pub fn load_config(location: &ConfigLocation) -> Result<RunConfig> {
    let path = &location.path;
    if !path.exists() {
        if location.required {
            return Err(anyhow!("config file {} not found", path.display()));
        }
        debug!(path = %path.display(), "no config file, using defaults");
        let cfg = RunConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    debug!(path = %path.display(), "config loaded");
    Ok(cfg)
}
