//! Task orchestrator CLI.
//!
//! Walks `tasks/manifest.json` in order and, for each pending task, runs the
//! exec and verify agents on a dedicated branch until verify passes or the
//! attempt budget is spent.

use std::path::PathBuf;

use ai_tasks::core::selection::{TaskFilter, parse_id_list};
use ai_tasks::exit_codes;
use ai_tasks::io::agent::ProcessAgentRunner;
use ai_tasks::logging;
use ai_tasks::pipeline::TaskOutcome;
use ai_tasks::run::{RunContext, RunOptions, RunStop, plan_run, run_tasks};
use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "ai-tasks",
    version,
    about = "Run coding agents over a task manifest with exec/verify retries"
)]
struct Cli {
    /// Print the tasks and branches that would be processed, then exit.
    #[arg(long)]
    dry_run: bool,
    /// Config file (default: $AI_TASKS_CONFIG, then <repo>/ai-tasks.toml).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Comma-separated task ids to process.
    #[arg(long, value_name = "IDS")]
    tasks: Option<String>,
    /// Start at this task id.
    #[arg(long, value_name = "ID")]
    from: Option<String>,
    /// Skip pulling the base branch before the first task.
    #[arg(long)]
    no_pull: bool,
    /// Skip pushing task branches.
    #[arg(long)]
    no_push: bool,
}

impl Cli {
    fn filter(&self) -> TaskFilter {
        TaskFilter {
            only: self.tasks.as_deref().map(parse_id_list),
            start_from: self.from.clone(),
        }
    }
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FAILED);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("read current directory")?;
    let explicit_config = cli
        .config
        .as_deref()
        .map(std::path::absolute)
        .transpose()
        .context("resolve --config path")?;
    let ctx = RunContext::load(&cwd, explicit_config.as_deref())?;
    let filter = cli.filter();

    if cli.dry_run {
        for planned in plan_run(&ctx, &filter)? {
            println!("{}\t{}", planned.task.id, planned.branch);
        }
        return Ok(exit_codes::OK);
    }

    let agents = ProcessAgentRunner::new(ctx.config.clone());
    let options = RunOptions {
        filter,
        pull: !cli.no_pull,
        push: !cli.no_push,
    };
    let outcome = run_tasks(&ctx, &agents, &options, |report| match report.outcome {
        TaskOutcome::Verified { attempts } => println!(
            "[{}] done in {attempts} attempt(s), {} commit(s) on {}",
            report.task_id, report.commits, report.branch
        ),
        TaskOutcome::Exhausted { attempts } => println!(
            "[{}] failed after {attempts} attempt(s), see {}",
            report.task_id,
            ctx.paths.logs_dir.display()
        ),
    })?;

    match outcome.stop {
        RunStop::NothingToDo => {
            println!("no pending tasks");
            Ok(exit_codes::OK)
        }
        RunStop::Complete => {
            println!("{} task(s) completed", outcome.reports.len());
            Ok(exit_codes::OK)
        }
        RunStop::Exhausted { task_id, attempts } => {
            eprintln!("task {task_id} did not pass verification after {attempts} attempt(s)");
            Ok(exit_codes::FAILED)
        }
    }
}
