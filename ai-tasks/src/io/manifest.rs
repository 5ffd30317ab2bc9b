//! Read-only access to the task manifest.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use tracing::debug;

use crate::core::types::Task;

/// Accepted manifest layouts: a bare array or `{ "tasks": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ManifestFile {
    List(Vec<Task>),
    Wrapped { tasks: Vec<Task> },
}

/// Load tasks in manifest order.
pub fn load_manifest(path: &Path) -> Result<Vec<Task>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read manifest {}", path.display()))?;
    let parsed: ManifestFile = serde_json::from_str(&contents)
        .with_context(|| format!("parse manifest {}", path.display()))?;
    let tasks = match parsed {
        ManifestFile::List(tasks) => tasks,
        ManifestFile::Wrapped { tasks } => tasks,
    };

    let mut seen = BTreeSet::new();
    for task in &tasks {
        if task.id.trim().is_empty() {
            return Err(anyhow!("manifest {} has a task with an empty id", path.display()));
        }
        if !seen.insert(task.id.as_str()) {
            return Err(anyhow!(
                "manifest {} has duplicate task id '{}'",
                path.display(),
                task.id
            ));
        }
    }

    debug!(path = %path.display(), count = tasks.len(), "manifest loaded");
    Ok(tasks)
}
