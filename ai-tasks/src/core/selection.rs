//! Pure task selection: pending filter, id allowlist and start cursor.

use anyhow::{Result, anyhow};

use crate::core::types::Task;

/// Operator-supplied filters for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Keep only these ids (manifest order is preserved).
    pub only: Option<Vec<String>>,
    /// Start processing at this id within the filtered list.
    pub start_from: Option<String>,
}

/// Parse a comma-separated id list, ignoring blanks.
pub fn parse_id_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// Select the tasks to process, in manifest order.
///
/// Finished tasks are skipped. Allowlisted ids missing from the manifest and a
/// `start_from` id outside the filtered list are errors.
pub fn select_tasks(tasks: &[Task], filter: &TaskFilter) -> Result<Vec<Task>> {
    if let Some(only) = &filter.only {
        let unknown: Vec<&str> = only
            .iter()
            .filter(|id| !tasks.iter().any(|task| &task.id == *id))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(anyhow!("unknown task ids: {}", unknown.join(", ")));
        }
    }

    let mut selected: Vec<Task> = tasks
        .iter()
        .filter(|task| !task.is_done())
        .filter(|task| match &filter.only {
            Some(only) => only.iter().any(|id| id == &task.id),
            None => true,
        })
        .cloned()
        .collect();

    if let Some(start) = &filter.start_from {
        let pos = selected
            .iter()
            .position(|task| &task.id == start)
            .ok_or_else(|| anyhow!("start task '{start}' is not among the selected tasks"))?;
        selected.drain(..pos);
    }

    Ok(selected)
}
