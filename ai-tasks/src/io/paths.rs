//! Repository root discovery and canonical run paths.

use std::path::{Path, PathBuf};

use crate::core::types::Task;
use crate::io::config::RunConfig;

/// Nearest ancestor of `start` (inclusive) containing a `.git` entry.
///
/// Falls back to `start` when no repository is found.
pub fn find_repo_root(start: &Path) -> PathBuf {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .unwrap_or(start)
        .to_path_buf()
}

/// Absolute locations used during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub root: PathBuf,
    pub manifest_path: PathBuf,
    pub tasks_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl RunPaths {
    pub fn new(root: impl Into<PathBuf>, cfg: &RunConfig) -> Self {
        let root = root.into();
        Self {
            manifest_path: root.join(&cfg.manifest_path),
            tasks_dir: root.join(&cfg.tasks_dir),
            logs_dir: root.join(&cfg.logs_dir),
            root,
        }
    }

    pub fn task_path(&self, task: &Task) -> PathBuf {
        self.tasks_dir.join(&task.file)
    }

    /// Logs directory relative to the root, as git expects for pathspecs.
    ///
    /// `None` when the logs live outside the repository.
    pub fn logs_dir_pathspec(&self) -> Option<String> {
        let rel = self.logs_dir.strip_prefix(&self.root).ok()?;
        let spec = rel.to_string_lossy().replace('\\', "/");
        (!spec.is_empty()).then_some(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn finds_nearest_git_ancestor() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        fs::create_dir_all(root.join(".git")).expect("mkdir .git");
        let nested = root.join("a/b");
        fs::create_dir_all(&nested).expect("mkdir nested");

        assert_eq!(find_repo_root(&nested), root.to_path_buf());
    }

    #[test]
    fn paths_resolve_against_root() {
        let cfg = RunConfig::default();
        let paths = RunPaths::new("/repo", &cfg);
        assert_eq!(paths.manifest_path, PathBuf::from("/repo/tasks/manifest.json"));
        assert_eq!(paths.logs_dir_pathspec().as_deref(), Some("tasks/logs"));

        let task = Task {
            id: "T1".to_string(),
            file: "t1.md".to_string(),
            status: "pending".to_string(),
        };
        assert_eq!(paths.task_path(&task), PathBuf::from("/repo/tasks/t1.md"));
    }

    #[test]
    fn logs_outside_root_have_no_pathspec() {
        let cfg = RunConfig {
            logs_dir: PathBuf::from("/var/log/ai-tasks"),
            ..RunConfig::default()
        };
        let paths = RunPaths::new("/repo", &cfg);
        assert_eq!(paths.logs_dir, PathBuf::from("/var/log/ai-tasks"));
        assert_eq!(paths.logs_dir_pathspec(), None);
    }
}
