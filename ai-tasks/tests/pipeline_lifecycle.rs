//! Run-level tests for complete task lifecycles.
//!
//! These drive `run_tasks` against a throwaway git repository to verify the
//! observable contract: which logs exist, how many commits land, and where
//! the run stops.

use std::fs;
use std::path::Path;

use ai_tasks::core::selection::TaskFilter;
use ai_tasks::core::types::{AgentRole, Task};
use ai_tasks::io::agent::ProcessAgentRunner;
use ai_tasks::io::config::{AgentCommandConfig, AgentsConfig, RunConfig};
use ai_tasks::io::git::Git;
use ai_tasks::pipeline::TaskOutcome;
use ai_tasks::run::{RunContext, RunOptions, RunStop, run_tasks};
use ai_tasks::test_support::{BareRemote, ScriptedAgentRunner, ScriptedCall, TestRepo};

fn task(id: &str, file: &str) -> Task {
    Task {
        id: id.to_string(),
        file: file.to_string(),
        status: "pending".to_string(),
    }
}

fn context(repo: &TestRepo, config: RunConfig) -> RunContext {
    RunContext::new(repo.path(), config)
}

/// Log file names under `logs_dir` ending with `suffix`.
fn logs_ending_with(logs_dir: &Path, suffix: &str) -> Vec<String> {
    let Ok(entries) = fs::read_dir(logs_dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|entry| entry.expect("dir entry").file_name().to_string_lossy().to_string())
        .filter(|name| name.ends_with(suffix))
        .collect();
    names.sort();
    names
}

/// Verify fails on attempt 1 and passes on attempt 2 with a budget of 2.
///
/// Expected: 2 exec logs, 2 verify logs, 1 actualize log and 5 new commits
/// on the task branch.
#[test]
fn retry_then_verify_passes() {
    let repo = TestRepo::new().expect("repo");
    repo.seed_tasks(&[task("TASK-017", "TASK-017-add-login.md")])
        .expect("seed");
    let seeded = repo.commit_count();
    let ctx = context(
        &repo,
        RunConfig {
            max_attempts: 2,
            ..RunConfig::default()
        },
    );
    let agents = ScriptedAgentRunner::new(vec![
        ScriptedCall::exit(AgentRole::Exec, 0).touching("src/login.rs"),
        ScriptedCall::exit(AgentRole::Verify, 1),
        ScriptedCall::exit(AgentRole::Exec, 0).touching("src/login_fix.rs"),
        ScriptedCall::exit(AgentRole::Verify, 0),
        ScriptedCall::exit(AgentRole::Actualize, 0).touching("tasks/manifest.json"),
    ]);

    let outcome = run_tasks(&ctx, &agents, &RunOptions::default(), |_| {}).expect("run");

    assert_eq!(outcome.stop, RunStop::Complete);
    assert_eq!(outcome.reports.len(), 1);
    let report = &outcome.reports[0];
    assert_eq!(report.outcome, TaskOutcome::Verified { attempts: 2 });
    assert_eq!(report.branch, "ai-tasks/TASK-017-add-login");
    assert_eq!(report.logs.len(), 5);

    let logs_dir = &ctx.paths.logs_dir;
    assert_eq!(logs_ending_with(logs_dir, "-exec-log.md").len(), 2);
    assert_eq!(logs_ending_with(logs_dir, "-verify-log.md").len(), 2);
    assert_eq!(logs_ending_with(logs_dir, "-actualize-log.md").len(), 1);
    assert!(logs_ending_with(logs_dir, "-stop-log.md").is_empty());
    assert_eq!(
        logs_ending_with(logs_dir, "-attempt-2-verify-log.md").len(),
        1
    );

    assert_eq!(repo.current_branch(), "ai-tasks/TASK-017-add-login");
    assert_eq!(repo.commit_count(), seeded + 5);
    assert_eq!(
        repo.commit_subjects()[..5],
        [
            "[TASK-017] actualize",
            "[TASK-017] attempt 2: verify",
            "[TASK-017] attempt 2: exec",
            "[TASK-017] attempt 1: verify",
            "[TASK-017] attempt 1: exec",
        ]
    );
    agents.assert_drained().expect("drained");
}

/// Verify never passes: stop log is written and later tasks are untouched.
#[test]
fn exhaustion_writes_stop_log_and_halts_run() {
    let repo = TestRepo::new().expect("repo");
    repo.seed_tasks(&[task("T1", "t1-first.md"), task("T2", "t2-second.md")])
        .expect("seed");
    let ctx = context(
        &repo,
        RunConfig {
            max_attempts: 3,
            ..RunConfig::default()
        },
    );
    let mut script = Vec::new();
    for _ in 0..3 {
        script.push(ScriptedCall::exit(AgentRole::Exec, 0));
        script.push(ScriptedCall::exit(AgentRole::Verify, 2));
    }
    let agents = ScriptedAgentRunner::new(script);

    let outcome = run_tasks(&ctx, &agents, &RunOptions::default(), |_| {}).expect("run");

    assert_eq!(
        outcome.stop,
        RunStop::Exhausted {
            task_id: "T1".to_string(),
            attempts: 3
        }
    );
    assert_eq!(agents.count(AgentRole::Exec), 3);
    assert_eq!(agents.count(AgentRole::Verify), 3);
    assert_eq!(agents.count(AgentRole::Actualize), 0);

    let logs_dir = &ctx.paths.logs_dir;
    assert_eq!(logs_ending_with(logs_dir, "-exec-log.md").len(), 3);
    assert_eq!(logs_ending_with(logs_dir, "-verify-log.md").len(), 3);
    let stop_logs = logs_ending_with(logs_dir, "-stop-log.md");
    assert_eq!(stop_logs.len(), 1);
    let stop = fs::read_to_string(logs_dir.join(&stop_logs[0])).expect("read stop log");
    assert!(stop.contains("agent: stop"));
    assert!(stop.contains("within 3 attempts"));
    assert!(logs_ending_with(logs_dir, "-actualize-log.md").is_empty());

    assert_eq!(repo.commit_subjects()[0], "[T1] stop");
    assert_eq!(repo.current_branch(), "ai-tasks/T1-first");
}

/// Verify passes immediately: no second attempt is made.
#[test]
fn early_success_skips_remaining_attempts() {
    let repo = TestRepo::new().expect("repo");
    repo.seed_tasks(&[task("T1", "t1.md"), task("T2", "t2.md")])
        .expect("seed");
    let ctx = context(
        &repo,
        RunConfig {
            max_attempts: 5,
            ..RunConfig::default()
        },
    );
    let agents = ScriptedAgentRunner::new(vec![
        ScriptedCall::exit(AgentRole::Exec, 0),
        ScriptedCall::exit(AgentRole::Verify, 0),
        ScriptedCall::exit(AgentRole::Actualize, 0),
    ]);
    let options = RunOptions {
        filter: TaskFilter {
            only: Some(vec!["T2".to_string()]),
            start_from: None,
        },
        ..RunOptions::default()
    };

    let outcome = run_tasks(&ctx, &agents, &options, |_| {}).expect("run");

    assert_eq!(outcome.stop, RunStop::Complete);
    assert_eq!(outcome.reports.len(), 1);
    assert_eq!(outcome.reports[0].task_id, "T2");
    assert_eq!(
        outcome.reports[0].outcome,
        TaskOutcome::Verified { attempts: 1 }
    );
    assert_eq!(agents.count(AgentRole::Exec), 1);
    assert!(logs_ending_with(&ctx.paths.logs_dir, "-attempt-2-exec-log.md").is_empty());
    agents.assert_drained().expect("drained");
}

/// The initial pull refreshes the base branch, so new task branches start from
/// upstream even when the operator was left on an earlier task branch.
#[test]
fn initial_pull_refreshes_base_not_the_checked_out_branch() {
    let repo = TestRepo::new().expect("repo");
    repo.seed_tasks(&[task("T1", "t1.md"), task("T2", "t2.md")])
        .expect("seed");
    let remote = BareRemote::attach(&repo, "origin").expect("remote");
    Git::new(repo.path())
        .ensure_branch("ai-tasks/T1-t1", "main")
        .expect("earlier task branch");
    let earlier_head = repo.head_sha();
    remote.advance("main", "upstream.txt").expect("advance remote");

    let ctx = context(
        &repo,
        RunConfig {
            max_attempts: 1,
            ..RunConfig::default()
        },
    );
    let agents = ScriptedAgentRunner::new(vec![
        ScriptedCall::exit(AgentRole::Exec, 0),
        ScriptedCall::exit(AgentRole::Verify, 0),
        ScriptedCall::exit(AgentRole::Actualize, 0),
    ]);
    let options = RunOptions {
        filter: TaskFilter {
            only: Some(vec!["T2".to_string()]),
            start_from: None,
        },
        pull: true,
        push: false,
    };

    let outcome = run_tasks(&ctx, &agents, &options, |_| {}).expect("run");

    assert_eq!(outcome.stop, RunStop::Complete);
    let upstream = "upstream.txt".to_string();
    assert!(repo.files_on("main").contains(&upstream));
    assert!(repo.files_on("ai-tasks/T2-t2").contains(&upstream));
    assert!(!repo.files_on("ai-tasks/T1-t1").contains(&upstream));
    assert_eq!(repo.sha_of("ai-tasks/T1-t1"), earlier_head);
}

/// Task branches reach the remote after actualize and after a stop.
#[test]
fn push_publishes_verified_and_exhausted_branches() {
    let repo = TestRepo::new().expect("repo");
    repo.seed_tasks(&[task("T1", "t1.md"), task("T2", "t2.md")])
        .expect("seed");
    let remote = BareRemote::attach(&repo, "origin").expect("remote");
    let ctx = context(
        &repo,
        RunConfig {
            max_attempts: 1,
            ..RunConfig::default()
        },
    );
    let agents = ScriptedAgentRunner::new(vec![
        ScriptedCall::exit(AgentRole::Exec, 0),
        ScriptedCall::exit(AgentRole::Verify, 0),
        ScriptedCall::exit(AgentRole::Actualize, 0),
        ScriptedCall::exit(AgentRole::Exec, 0),
        ScriptedCall::exit(AgentRole::Verify, 1),
    ]);
    let options = RunOptions {
        push: true,
        ..RunOptions::default()
    };

    let outcome = run_tasks(&ctx, &agents, &options, |_| {}).expect("run");

    assert_eq!(
        outcome.stop,
        RunStop::Exhausted {
            task_id: "T2".to_string(),
            attempts: 1
        }
    );
    assert_eq!(
        remote.branches().expect("remote branches"),
        vec!["ai-tasks/T1-t1", "ai-tasks/T2-t2", "main"]
    );
    assert_eq!(
        remote.sha_of("ai-tasks/T1-t1").expect("T1 tip"),
        repo.sha_of("ai-tasks/T1-t1")
    );
    assert_eq!(remote.sha_of("ai-tasks/T2-t2").expect("T2 tip"), repo.head_sha());
    assert_eq!(repo.commit_subjects()[0], "[T2] stop");
    agents.assert_drained().expect("drained");
}

/// Real processes: agents are shell commands reading the environment contract.
#[cfg(unix)]
#[test]
fn process_agents_receive_environment_and_placeholders() {
    let repo = TestRepo::new().expect("repo");
    repo.seed_tasks(&[task("T1", "t1.md")]).expect("seed");

    let sh = |script: &str, extra: &[&str]| AgentCommandConfig {
        command: "sh".to_string(),
        args: [&["-c", script, "sh"][..], extra]
            .concat()
            .into_iter()
            .map(str::to_string)
            .collect(),
        timeout_secs: Some(30),
    };
    let config = RunConfig {
        max_attempts: 2,
        agents: AgentsConfig {
            exec: Some(sh(
                "echo \"$TASK_ID attempt $ATTEMPT\" > \"$REPO_ROOT/out-$1.txt\"",
                &["{{ATTEMPT}}"],
            )),
            verify: Some(sh("test -f \"$REPO_ROOT/out-2.txt\"", &[])),
            actualize: Some(sh(
                "printf '%s %s' \"$BRANCH_NAME\" \"$1\"",
                &["{{MANIFEST_PATH}}"],
            )),
        },
        ..RunConfig::default()
    };
    let ctx = context(&repo, config);
    let agents = ProcessAgentRunner::new(ctx.config.clone());

    let outcome = run_tasks(&ctx, &agents, &RunOptions::default(), |_| {}).expect("run");

    assert_eq!(outcome.stop, RunStop::Complete);
    let report = &outcome.reports[0];
    assert_eq!(report.outcome, TaskOutcome::Verified { attempts: 2 });
    assert_eq!(
        fs::read_to_string(repo.path().join("out-2.txt")).expect("exec output"),
        "T1 attempt 2\n"
    );
    let tracked = repo.tracked_files();
    assert!(tracked.contains(&"out-1.txt".to_string()));
    assert!(tracked.contains(&"out-2.txt".to_string()));

    let actualize_log = report.logs.last().expect("actualize log");
    let content = fs::read_to_string(actualize_log).expect("read actualize log");
    assert!(content.contains("agent: actualize"));
    assert!(content.contains("ai-tasks/T1-t1 "));
    assert!(content.contains("tasks/manifest.json"));
}
