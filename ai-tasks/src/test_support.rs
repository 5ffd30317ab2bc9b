//! Test-only helpers: throwaway git repositories, bare remotes and scripted agents.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::types::{AgentInvocationResult, AgentNotConfigured, AgentRole, Task};
use crate::io::agent::{AgentRequest, AgentRunner};

/// A git repository in a temp dir with one commit on `main`.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("tempdir")?;
        let repo = Self { dir };
        repo.git(&["init", "-q"])?;
        repo.git(&["config", "user.email", "test@example.com"])?;
        repo.git(&["config", "user.name", "test"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        repo.git(&["config", "pull.rebase", "false"])?;
        fs::write(repo.path().join("README.md"), "hi\n").context("write README")?;
        repo.git(&["add", "README.md"])?;
        repo.git(&["commit", "-q", "-m", "chore: init"])?;
        repo.git(&["branch", "-M", "main"])?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `tasks/manifest.json` and one task document per task, then commit.
    pub fn seed_tasks(&self, tasks: &[Task]) -> Result<()> {
        let tasks_dir = self.path().join("tasks");
        fs::create_dir_all(&tasks_dir).context("create tasks dir")?;
        for task in tasks {
            fs::write(tasks_dir.join(&task.file), format!("# {}\n", task.id))
                .with_context(|| format!("write {}", task.file))?;
        }
        let mut manifest = serde_json::to_string_pretty(tasks)?;
        manifest.push('\n');
        fs::write(tasks_dir.join("manifest.json"), manifest).context("write manifest")?;
        self.git(&["add", "-A"])?;
        self.git(&["commit", "-q", "-m", "chore: seed tasks"])?;
        Ok(())
    }

    pub fn head_sha(&self) -> String {
        self.sha_of("HEAD")
    }

    pub fn sha_of(&self, rev: &str) -> String {
        self.capture(&["rev-parse", rev])
    }

    pub fn current_branch(&self) -> String {
        self.capture(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    /// Number of commits reachable from HEAD.
    pub fn commit_count(&self) -> u32 {
        self.capture(&["rev-list", "--count", "HEAD"])
            .parse()
            .unwrap_or_default()
    }

    /// Subjects of commits reachable from HEAD, newest first.
    pub fn commit_subjects(&self) -> Vec<String> {
        self.capture(&["log", "--format=%s"])
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Files changed by the HEAD commit.
    pub fn files_in_head(&self) -> Vec<String> {
        self.capture(&["show", "--name-only", "--format=", "HEAD"])
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Files tracked at HEAD.
    pub fn tracked_files(&self) -> Vec<String> {
        self.files_on("HEAD")
    }

    /// Files tracked at the tip of `rev`.
    pub fn files_on(&self, rev: &str) -> Vec<String> {
        self.capture(&["ls-tree", "-r", "--name-only", rev])
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Local branch names, sorted.
    pub fn branches(&self) -> Vec<String> {
        self.capture(&["branch", "--format=%(refname:short)"])
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn capture(&self, args: &[&str]) -> String {
        match self.git(args) {
            Ok(out) => out.trim().to_string(),
            Err(err) => panic!("{err:#}"),
        }
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        git_in(self.path(), args)
    }
}

/// A bare repository registered as a remote of a [`TestRepo`].
pub struct BareRemote {
    dir: TempDir,
}

impl BareRemote {
    /// Create a bare repo, add it to `repo` as `name`, and push `main` to it.
    pub fn attach(repo: &TestRepo, name: &str) -> Result<Self> {
        let dir = tempfile::tempdir().context("tempdir")?;
        git_in(dir.path(), &["init", "-q", "--bare"])?;
        git_in(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/main"])?;
        let url = dir.path().to_string_lossy().to_string();
        repo.git(&["remote", "add", name, &url])?;
        repo.git(&["push", "-q", name, "main"])?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Branch names present on the remote, sorted.
    pub fn branches(&self) -> Result<Vec<String>> {
        let out = git_in(self.path(), &["branch", "--format=%(refname:short)"])?;
        Ok(out.lines().map(str::to_string).collect())
    }

    /// Commit id at the tip of the remote `branch`.
    pub fn sha_of(&self, branch: &str) -> Result<String> {
        let out = git_in(self.path(), &["rev-parse", &format!("refs/heads/{branch}")])?;
        Ok(out.trim().to_string())
    }

    /// Commit `file` to `branch` from a separate clone, as another contributor would.
    pub fn advance(&self, branch: &str, file: &str) -> Result<()> {
        let clone = tempfile::tempdir().context("tempdir")?;
        let url = self.path().to_string_lossy().to_string();
        let clone_path = clone.path().to_string_lossy().to_string();
        git_in(self.path(), &["clone", "-q", "-b", branch, &url, &clone_path])?;
        git_in(clone.path(), &["config", "user.email", "upstream@example.com"])?;
        git_in(clone.path(), &["config", "user.name", "upstream"])?;
        git_in(clone.path(), &["config", "commit.gpgsign", "false"])?;
        fs::write(clone.path().join(file), "upstream\n").with_context(|| format!("write {file}"))?;
        git_in(clone.path(), &["add", file])?;
        git_in(clone.path(), &["commit", "-q", "-m", "upstream change"])?;
        git_in(clone.path(), &["push", "-q", "origin", branch])?;
        Ok(())
    }
}

fn git_in(dir: &Path, args: &[&str]) -> Result<String> {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !out.status.success() {
        return Err(anyhow!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&out.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&out.stdout).to_string())
}

/// One expected agent invocation and its scripted response.
#[derive(Debug, Clone)]
pub struct ScriptedCall {
    pub role: AgentRole,
    /// `None` simulates an unconfigured agent.
    pub exit_code: Option<i32>,
    /// Repository-relative file the agent "writes" before returning.
    pub touch: Option<String>,
}

impl ScriptedCall {
    pub fn exit(role: AgentRole, exit_code: i32) -> Self {
        Self {
            role,
            exit_code: Some(exit_code),
            touch: None,
        }
    }

    pub fn not_configured(role: AgentRole) -> Self {
        Self {
            role,
            exit_code: None,
            touch: None,
        }
    }

    pub fn touching(mut self, path: &str) -> Self {
        self.touch = Some(path.to_string());
        self
    }
}

/// Invocation observed by [`ScriptedAgentRunner`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub role: AgentRole,
    pub env: BTreeMap<String, String>,
}

/// Agent runner that replays a fixed queue of responses in order.
pub struct ScriptedAgentRunner {
    queue: RefCell<VecDeque<ScriptedCall>>,
    calls: RefCell<Vec<RecordedCall>>,
}

impl ScriptedAgentRunner {
    pub fn new(script: Vec<ScriptedCall>) -> Self {
        Self {
            queue: RefCell::new(script.into()),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, role: AgentRole) -> usize {
        self.calls.borrow().iter().filter(|c| c.role == role).count()
    }

    pub fn assert_drained(&self) -> Result<()> {
        let remaining = self.queue.borrow().len();
        if remaining > 0 {
            return Err(anyhow!("{remaining} scripted agent calls were not consumed"));
        }
        Ok(())
    }
}

impl AgentRunner for ScriptedAgentRunner {
    fn run(&self, request: &AgentRequest) -> Result<AgentInvocationResult> {
        self.calls.borrow_mut().push(RecordedCall {
            role: request.role,
            env: request.env.clone(),
        });
        let next = self
            .queue
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("unexpected {} invocation", request.role))?;
        if next.role != request.role {
            return Err(anyhow!(
                "expected {} invocation, got {}",
                next.role,
                request.role
            ));
        }
        if let Some(rel) = &next.touch {
            let path = request.workdir.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, format!("{} {}\n", request.role, rel))?;
        }
        match next.exit_code {
            Some(exit_code) => Ok(AgentInvocationResult {
                exit_code,
                stdout: format!("{} output", request.role),
                stderr: String::new(),
                timed_out: false,
            }),
            None => Err(AgentNotConfigured { role: request.role }.into()),
        }
    }
}
