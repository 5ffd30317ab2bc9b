//! Git adapter for the task pipeline.
//!
//! Every operation is one synchronous `git` subprocess call in the working
//! directory. The orchestrator never builds git command lines itself.

use std::path::PathBuf;
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Return the current branch name (errors on detached HEAD).
    #[instrument(skip_all)]
    pub fn current_branch(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim().to_string();
        if name == "HEAD" {
            warn!("detached HEAD detected");
            return Err(anyhow!("detached HEAD (refuse to run)"));
        }
        debug!(branch = %name, "current branch");
        Ok(name)
    }

    /// Check whether a local branch exists.
    ///
    /// Any failure of the probe itself counts as "does not exist".
    pub fn branch_exists(&self, branch: &str) -> bool {
        let refname = format!("refs/heads/{branch}");
        match self.run(&["show-ref", "--verify", "--quiet", &refname]) {
            Ok(out) => out.status.success(),
            Err(err) => {
                debug!(branch, err = %err, "branch probe failed, treating as missing");
                false
            }
        }
    }

    /// Make `target` the checked-out branch, creating it from `base` if needed.
    ///
    /// No-op when already on `target`.
    #[instrument(skip_all, fields(branch = target, base))]
    pub fn ensure_branch(&self, target: &str, base: &str) -> Result<()> {
        if self.current_branch()? == target {
            debug!(branch = target, "already on branch");
            return Ok(());
        }
        if self.branch_exists(target) {
            self.checkout_branch(target)
                .with_context(|| format!("checkout existing branch {target}"))?;
        } else {
            info!(branch = target, base, "creating branch");
            self.run_checked(&["checkout", "-b", target, base])
                .with_context(|| format!("create branch {target} from {base}"))?;
        }
        Ok(())
    }

    /// Checkout an existing branch.
    #[instrument(skip_all, fields(branch))]
    pub fn checkout_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "checking out branch");
        self.run_checked(&["checkout", branch])?;
        Ok(())
    }

    /// Paths with uncommitted modifications, untracked files included.
    pub fn changed_paths(&self) -> Result<Vec<String>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        Ok(out
            .lines()
            .filter_map(|line| line.get(3..))
            .map(|path| match path.split_once(" -> ") {
                Some((_, renamed)) => renamed.to_string(),
                None => path.to_string(),
            })
            .collect())
    }

    /// True if the working tree has any uncommitted modification.
    pub fn has_changes(&self) -> Result<bool> {
        Ok(!self.changed_paths()?.is_empty())
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run_checked(&["diff", "--cached", "--name-only"])?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    /// Unstage `path`, ignoring failure.
    ///
    /// The path may never have been staged (or may not exist), so a failing
    /// `git reset` is expected and only logged. Returns whether it succeeded.
    pub fn try_unstage(&self, path: &str) -> bool {
        match self.run_checked(&["reset", "-q", "HEAD", "--", path]) {
            Ok(_) => true,
            Err(err) => {
                debug!(path, err = %err, "unstage failed, ignoring");
                false
            }
        }
    }

    /// Stage everything, optionally leave `except_path` unstaged, then commit.
    ///
    /// Returns `Ok(false)` without committing when nothing is staged and
    /// `allow_empty` is false.
    #[instrument(skip_all, fields(allow_empty, except_path))]
    pub fn commit(
        &self,
        message: &str,
        allow_empty: bool,
        except_path: Option<&str>,
    ) -> Result<bool> {
        self.add_all()?;
        if let Some(path) = except_path {
            self.try_unstage(path);
        }
        if !allow_empty && !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        let mut args = vec!["commit", "-m", message];
        if allow_empty {
            args.push("--allow-empty");
        }
        self.run_checked(&args)?;
        debug!(message, "committed");
        Ok(true)
    }

    #[instrument(skip_all, fields(remote, branch))]
    pub fn push(&self, remote: &str, branch: &str) -> Result<()> {
        info!(remote, branch, "pushing branch");
        self.run_checked(&["push", "-u", remote, branch])?;
        Ok(())
    }

    /// Update the local `branch` from `remote`, leaving other branches untouched.
    ///
    /// When `branch` is checked out this is a `git pull`. Otherwise the branch
    /// is fast-forwarded in place with `git fetch remote branch:branch`, which
    /// fails rather than merging when the histories diverged.
    #[instrument(skip_all, fields(remote, branch))]
    pub fn pull(&self, remote: &str, branch: &str) -> Result<()> {
        if self.current_branch()? == branch {
            self.run_checked(&["pull", remote, branch])?;
        } else {
            debug!(branch, "not checked out, fast-forwarding via fetch");
            let refspec = format!("{branch}:{branch}");
            self.run_checked(&["fetch", remote, &refspec])?;
        }
        Ok(())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}
