//! Per-invocation placeholder substitution for agent arguments.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Values substituted into `{{TASK_PATH}}`, `{{ATTEMPT}}`, `{{MANIFEST_PATH}}`
/// and `{{BRANCH_NAME}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placeholders {
    pub task_path: String,
    pub attempt: String,
    pub manifest_path: String,
    pub branch_name: String,
}

impl Placeholders {
    fn lookup(&self, name: &str) -> Option<&str> {
        match name.to_ascii_uppercase().as_str() {
            "TASK_PATH" => Some(&self.task_path),
            "ATTEMPT" => Some(&self.attempt),
            "MANIFEST_PATH" => Some(&self.manifest_path),
            "BRANCH_NAME" => Some(&self.branch_name),
            _ => None,
        }
    }
}

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\{\{(TASK_PATH|ATTEMPT|MANIFEST_PATH|BRANCH_NAME)\}\}")
        .expect("placeholder regex is valid")
});

/// Replace every known placeholder occurrence (case-insensitive) in `arg`.
pub fn substitute(arg: &str, values: &Placeholders) -> String {
    PLACEHOLDER_RE
        .replace_all(arg, |caps: &Captures<'_>| {
            values.lookup(&caps[1]).unwrap_or(&caps[0]).to_string()
        })
        .into_owned()
}

/// Apply [`substitute`] to each argument.
pub fn substitute_all(args: &[String], values: &Placeholders) -> Vec<String> {
    args.iter().map(|arg| substitute(arg, values)).collect()
}
