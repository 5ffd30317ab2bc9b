//! Per-task pipeline: branch setup, exec/verify attempts, actualize.
//!
//! ```text
//! BranchEnsuring -> Attempting(n) -> Verified  -> Actualizing -> Done
//!                        |   ^
//!                        +---+ verify failed, n < max_attempts
//!                        +-> Exhausted -> stop log -> Done (run must halt)
//! ```
//!
//! Every agent invocation writes exactly one log and is followed by a commit,
//! so git history is the checkpoint if the process is interrupted.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use tracing::{info, instrument, warn};

use crate::core::naming::{branch_name, task_name};
use crate::core::template::Placeholders;
use crate::core::types::{AgentInvocationResult, AgentRole, Task};
use crate::io::agent::{AgentRequest, AgentRunner};
use crate::io::agent_log::{LogHeader, build_filename, with_metadata_header, write_log};
use crate::io::config::RunConfig;
use crate::io::git::Git;
use crate::io::paths::RunPaths;

/// How a task left the attempt loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Verify passed on attempt `attempts`.
    Verified { attempts: u32 },
    /// Verify failed on every permitted attempt.
    Exhausted { attempts: u32 },
}

/// Summary of one processed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub task_id: String,
    pub branch: String,
    pub outcome: TaskOutcome,
    /// Logs in the order they were written.
    pub logs: Vec<PathBuf>,
    /// Commits actually created (skipped empty commits are not counted).
    pub commits: u32,
}

/// Shared collaborators for processing tasks within one run.
pub struct Pipeline<'a, A: AgentRunner> {
    pub config: &'a RunConfig,
    pub paths: &'a RunPaths,
    pub git: &'a Git,
    pub agents: &'a A,
    /// Push the task branch after the terminal commit.
    pub push: bool,
}

/// Mutable per-task bookkeeping.
struct TaskState {
    branch: String,
    logs: Vec<PathBuf>,
    commits: u32,
}

impl<A: AgentRunner> Pipeline<'_, A> {
    /// Drive one task from branch setup to its terminal commit.
    ///
    /// An exhausted task is reported, not returned as an error; halting the
    /// run is the caller's decision.
    #[instrument(skip_all, fields(task = %task.id))]
    pub fn process_task(&self, task: &Task) -> Result<TaskReport> {
        let branch = branch_name(&self.config.branch_template, task)?;
        self.git
            .ensure_branch(&branch, &self.config.base_branch)
            .with_context(|| format!("prepare branch {branch} for task {}", task.id))?;
        println!("[{}] on branch {branch}", task.id);

        let mut state = TaskState {
            branch,
            logs: Vec::new(),
            commits: 0,
        };

        let max_attempts = self.config.max_attempts;
        let mut verified_on = None;
        for attempt in 1..=max_attempts {
            let exec = self.invoke(task, &mut state, AgentRole::Exec, Some(attempt))?;
            println!(
                "[{}] attempt {attempt}/{max_attempts}: exec exit {}",
                task.id, exec.exit_code
            );
            self.commit_step(&mut state, &format!("[{}] attempt {attempt}: exec", task.id))?;

            let verify = self.invoke(task, &mut state, AgentRole::Verify, Some(attempt))?;
            println!(
                "[{}] attempt {attempt}/{max_attempts}: verify exit {}",
                task.id, verify.exit_code
            );
            self.commit_step(
                &mut state,
                &format!("[{}] attempt {attempt}: verify", task.id),
            )?;

            if verify.success() {
                verified_on = Some(attempt);
                break;
            }
        }

        let outcome = match verified_on {
            Some(attempts) => {
                info!(attempts, "task verified");
                self.actualize(task, &mut state)?;
                TaskOutcome::Verified { attempts }
            }
            None => {
                warn!(attempts = max_attempts, "task exhausted its attempts");
                self.stop(task, &mut state)?;
                TaskOutcome::Exhausted {
                    attempts: max_attempts,
                }
            }
        };

        if self.push {
            self.git
                .push(&self.config.remote, &state.branch)
                .with_context(|| format!("push {}", state.branch))?;
        }

        Ok(TaskReport {
            task_id: task.id.clone(),
            branch: state.branch,
            outcome,
            logs: state.logs,
            commits: state.commits,
        })
    }

    fn actualize(&self, task: &Task, state: &mut TaskState) -> Result<()> {
        let result = self.invoke(task, state, AgentRole::Actualize, None)?;
        println!("[{}] actualize exit {}", task.id, result.exit_code);
        if !result.success() {
            warn!(exit_code = result.exit_code, "actualize agent failed");
        }
        self.commit_step(state, &format!("[{}] actualize", task.id))
    }

    fn stop(&self, task: &Task, state: &mut TaskState) -> Result<()> {
        let started_at = Utc::now();
        let body = format!(
            "# Task {} stopped\n\n- reason: verify did not pass within {} attempts\n- at: {}\n",
            task.id,
            self.config.max_attempts,
            started_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let filename = build_filename(&task_name(task), AgentRole::Stop, None, Some(started_at));
        let header = LogHeader {
            task_id: task.id.clone(),
            attempt: None,
            agent: AgentRole::Stop,
            started_at,
        };
        let path = write_log(
            &self.paths.logs_dir,
            &filename,
            &with_metadata_header(&body, &header),
        )?;
        state.logs.push(path);
        println!(
            "[{}] stopped after {} attempts",
            task.id, self.config.max_attempts
        );
        self.commit_step(state, &format!("[{}] stop", task.id))
    }

    /// Run one agent, persist its transcript, and return the result.
    ///
    /// For exec/verify an invocation that cannot be attempted becomes an
    /// exit-code-1 result so the attempt loop stays uniform. For actualize it
    /// is returned as an error.
    fn invoke(
        &self,
        task: &Task,
        state: &mut TaskState,
        role: AgentRole,
        attempt: Option<u32>,
    ) -> Result<AgentInvocationResult> {
        let started_at = Utc::now();
        let filename = build_filename(&task_name(task), role, attempt, Some(started_at));
        let log_path = self.paths.logs_dir.join(&filename);

        let request = AgentRequest {
            role,
            workdir: self.paths.root.clone(),
            env: self.agent_env(task, &state.branch, role, attempt, &log_path),
            placeholders: Placeholders {
                task_path: self.paths.task_path(task).display().to_string(),
                attempt: attempt.map(|n| n.to_string()).unwrap_or_default(),
                manifest_path: self.paths.manifest_path.display().to_string(),
                branch_name: state.branch.clone(),
            },
        };

        let result = match self.agents.run(&request) {
            Ok(result) => result,
            Err(err) if role.is_attempt_scoped() => {
                let message = format!("{err:#}");
                warn!(%role, err = %message, "agent could not be started");
                AgentInvocationResult::failed(message)
            }
            Err(err) => {
                return Err(err).with_context(|| format!("{role} agent for task {}", task.id));
            }
        };

        let header = LogHeader {
            task_id: task.id.clone(),
            attempt,
            agent: role,
            started_at,
        };
        let content = with_metadata_header(&result.transcript(), &header);
        let written = write_log(&self.paths.logs_dir, &filename, &content)?;
        state.logs.push(written);
        Ok(result)
    }

    /// Environment handed to an agent: its only structured input.
    fn agent_env(
        &self,
        task: &Task,
        branch: &str,
        role: AgentRole,
        attempt: Option<u32>,
        log_path: &Path,
    ) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("TASK_ID".to_string(), task.id.clone());
        env.insert("TASK_FILE".to_string(), task.file.clone());
        env.insert(
            "TASK_PATH".to_string(),
            self.paths.task_path(task).display().to_string(),
        );
        env.insert(
            "REPO_ROOT".to_string(),
            self.paths.root.display().to_string(),
        );
        env.insert(
            "ATTEMPT".to_string(),
            attempt.map(|n| n.to_string()).unwrap_or_default(),
        );
        env.insert("LOG_PATH".to_string(), log_path.display().to_string());
        if role == AgentRole::Actualize {
            env.insert(
                "MANIFEST_PATH".to_string(),
                self.paths.manifest_path.display().to_string(),
            );
            env.insert("BRANCH_NAME".to_string(), branch.to_string());
        }
        env
    }

    fn commit_step(&self, state: &mut TaskState, message: &str) -> Result<()> {
        let except = if self.config.commit_logs {
            None
        } else {
            self.paths.logs_dir_pathspec()
        };
        let committed = self
            .git
            .commit(
                message,
                self.config.empty_commit_if_no_changes,
                except.as_deref(),
            )
            .with_context(|| format!("commit '{message}'"))?;
        if committed {
            state.commits += 1;
        }
        Ok(())
    }
}
