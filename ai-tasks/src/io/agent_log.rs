//! Markdown transcripts for agent invocations.
//!
//! Each invocation produces one file named
//! `{task}-{date}-[attempt-{N}-]{agent}-log.md`. The attempt segment appears
//! only for exec/verify. These files are the durable record of a run; tracing
//! output is not.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

use crate::core::types::AgentRole;

/// Metadata block written at the top of every log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogHeader {
    pub task_id: String,
    pub attempt: Option<u32>,
    pub agent: AgentRole,
    pub started_at: DateTime<Utc>,
}

/// Filesystem-safe timestamp truncated to seconds, e.g. `2026-10-16T09-05-07`.
pub fn filename_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H-%M-%S").to_string()
}

/// Build the log file name. Pure given `date`; `None` uses the current time.
pub fn build_filename(
    task_name: &str,
    agent: AgentRole,
    attempt: Option<u32>,
    date: Option<DateTime<Utc>>,
) -> String {
    let date = filename_timestamp(date.unwrap_or_else(Utc::now));
    match attempt.filter(|_| agent.is_attempt_scoped()) {
        Some(n) => format!("{task_name}-{date}-attempt-{n}-{agent}-log.md"),
        None => format!("{task_name}-{date}-{agent}-log.md"),
    }
}

/// Prefix `content` with the fixed-order metadata block and a blank line.
pub fn with_metadata_header(content: &str, header: &LogHeader) -> String {
    let attempt = header
        .attempt
        .map(|n| n.to_string())
        .unwrap_or_default();
    let mut out = String::new();
    out.push_str("---\n");
    out.push_str(&format!("taskId: {}\n", header.task_id));
    out.push_str(&format!("attempt: {attempt}\n"));
    out.push_str(&format!("agent: {}\n", header.agent));
    out.push_str(&format!(
        "startedAt: {}\n",
        header.started_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    out.push_str("---\n\n");
    out.push_str(content);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Highest numeric suffix tried before giving up on a free log name.
const MAX_NAME_SUFFIX: u32 = 100;

/// Write `content` to a new file in `logs_dir`, creating directories as needed.
///
/// Existing files are never overwritten: when `filename` is taken, the first
/// free `{stem}-{n}.md` (n >= 2) is used instead. Returns the absolute path
/// of the written file.
pub fn write_log(logs_dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    fs::create_dir_all(logs_dir)
        .with_context(|| format!("create logs dir {}", logs_dir.display()))?;
    let dir = std::path::absolute(logs_dir)
        .with_context(|| format!("resolve logs dir {}", logs_dir.display()))?;

    for n in 1..=MAX_NAME_SUFFIX {
        let path = dir.join(candidate_name(filename, n));
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                debug!(path = %path.display(), "log name taken, trying next suffix");
                continue;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("create log {}", path.display()));
            }
        };
        file.write_all(content.as_bytes())
            .with_context(|| format!("write log {}", path.display()))?;
        debug!(path = %path.display(), "agent log written");
        return Ok(path);
    }
    Err(anyhow!(
        "no free log name for {filename} in {} after {MAX_NAME_SUFFIX} tries",
        dir.display()
    ))
}

/// `filename` for `n == 1`, otherwise `{stem}-{n}.{ext}`.
fn candidate_name(filename: &str, n: u32) -> String {
    if n == 1 {
        return filename.to_string();
    }
    match filename.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}-{n}.{ext}"),
        None => format!("{filename}-{n}"),
    }
}
