//! Deterministic task names, slugs and branch names.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, context};

use crate::core::types::Task;

/// Canonical task name: the file stem of `task.file`.
///
/// Falls back to the task id when the file has no usable stem.
pub fn task_name(task: &Task) -> String {
    Path::new(&task.file)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| task.id.clone())
}

/// Lowercase ASCII slug with runs of other characters collapsed to `-`.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Slug for the task's branch, with a leading copy of the id removed.
pub fn task_slug(task: &Task) -> String {
    let slug = slugify(&task_name(task));
    let id_slug = slugify(&task.id);
    match slug.strip_prefix(&id_slug) {
        Some(rest) if rest.starts_with('-') => rest.trim_start_matches('-').to_string(),
        _ => slug,
    }
}

/// Render the branch template (`{{id}}`, `{{slug}}`) for a task.
pub fn branch_name(template: &str, task: &Task) -> Result<String> {
    let env = Environment::new();
    let rendered = env
        .render_str(
            template,
            context! {
                id => task.id.as_str(),
                slug => task_slug(task),
            },
        )
        .with_context(|| format!("render branch template '{template}'"))?;
    let name = rendered.trim().to_string();
    if name.is_empty() {
        return Err(anyhow!(
            "branch template '{template}' rendered an empty name for task {}",
            task.id
        ));
    }
    Ok(name)
}
