//! Multi-task run: load config and manifest, then process tasks in order.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::core::naming::branch_name;
use crate::core::selection::{TaskFilter, select_tasks};
use crate::core::types::Task;
use crate::io::agent::AgentRunner;
use crate::io::config::{CONFIG_PATH_ENV, RunConfig, load_config, locate_config};
use crate::io::git::Git;
use crate::io::manifest::load_manifest;
use crate::io::paths::{RunPaths, find_repo_root};
use crate::pipeline::{Pipeline, TaskOutcome, TaskReport};

/// Loaded, read-only state for one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub config: RunConfig,
    pub paths: RunPaths,
}

impl RunContext {
    /// Locate the repository root from `start` and load its config.
    ///
    /// `explicit_config` wins over the `AI_TASKS_CONFIG` environment variable.
    pub fn load(start: &Path, explicit_config: Option<&Path>) -> Result<Self> {
        let root = find_repo_root(start);
        let env_config = std::env::var(CONFIG_PATH_ENV).ok();
        let location = locate_config(&root, explicit_config, env_config.as_deref());
        let config = load_config(&location)?;
        debug!(root = %root.display(), config = %location.path.display(), "run context loaded");
        Ok(Self::new(root, config))
    }

    pub fn new(root: impl Into<PathBuf>, config: RunConfig) -> Self {
        let paths = RunPaths::new(root, &config);
        Self { config, paths }
    }
}

/// A task scheduled for this run together with its branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTask {
    pub task: Task,
    pub branch: String,
}

/// Operator switches for a run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub filter: TaskFilter,
    /// Pull the base branch before the first task.
    pub pull: bool,
    /// Push each task branch after its terminal commit.
    pub push: bool,
}

/// Reason why `run_tasks` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStop {
    /// No task matched the manifest and filters.
    NothingToDo,
    /// Every selected task verified and was actualized.
    Complete,
    /// A task exhausted its attempts; later tasks were not attempted.
    Exhausted { task_id: String, attempts: u32 },
}

/// Summary of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub reports: Vec<TaskReport>,
    pub stop: RunStop,
}

/// Load the manifest and compute the tasks (and branches) this run would process.
pub fn plan_run(ctx: &RunContext, filter: &TaskFilter) -> Result<Vec<PlannedTask>> {
    let tasks = load_manifest(&ctx.paths.manifest_path)?;
    select_tasks(&tasks, filter)?
        .into_iter()
        .map(|task| {
            let branch = branch_name(&ctx.config.branch_template, &task)?;
            Ok(PlannedTask { task, branch })
        })
        .collect()
}

/// Process the planned tasks strictly in order, one at a time.
///
/// Stops at the first exhausted task. Any other error (git, log writes, an
/// unconfigured actualize agent) aborts the run and is returned.
pub fn run_tasks<A: AgentRunner, F: FnMut(&TaskReport)>(
    ctx: &RunContext,
    agents: &A,
    options: &RunOptions,
    mut on_task: F,
) -> Result<RunOutcome> {
    let planned = plan_run(ctx, &options.filter)?;
    if planned.is_empty() {
        info!("no tasks to process");
        return Ok(RunOutcome {
            reports: Vec::new(),
            stop: RunStop::NothingToDo,
        });
    }

    let git = Git::new(&ctx.paths.root);
    if options.pull {
        pull_base(&git, &ctx.config);
    }
    if git.has_changes().context("check working tree")? {
        warn!("working tree has uncommitted changes; they will be included in the first commit");
    }

    let pipeline = Pipeline {
        config: &ctx.config,
        paths: &ctx.paths,
        git: &git,
        agents,
        push: options.push,
    };

    let mut reports = Vec::new();
    for PlannedTask { task, .. } in &planned {
        info!(task = %task.id, "processing task");
        let report = pipeline
            .process_task(task)
            .with_context(|| format!("task {}", task.id))?;
        on_task(&report);
        let outcome = report.outcome;
        reports.push(report);

        if let TaskOutcome::Exhausted { attempts } = outcome {
            return Ok(RunOutcome {
                reports,
                stop: RunStop::Exhausted {
                    task_id: task.id.clone(),
                    attempts,
                },
            });
        }
    }

    Ok(RunOutcome {
        reports,
        stop: RunStop::Complete,
    })
}

/// Pull the base branch; failure is a warning because staleness is recoverable.
fn pull_base(git: &Git, config: &RunConfig) {
    if let Err(err) = git.pull(&config.remote, &config.base_branch) {
        warn!(
            remote = %config.remote,
            branch = %config.base_branch,
            err = %format!("{err:#}"),
            "pull failed, continuing"
        );
        println!(
            "warning: pull {} {} failed, continuing with local state",
            config.remote, config.base_branch
        );
    }
}
