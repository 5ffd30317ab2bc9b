//! Child process execution with timeouts and bounded output capture.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::types::{AgentInvocationResult, SIGNAL_EXIT_CODE};

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    fn truncated_notice(stream: &str, truncated: usize) -> String {
        if truncated > 0 {
            format!("\n[{stream} truncated {truncated} bytes]\n")
        } else {
            String::new()
        }
    }
}

/// One external command to run to completion.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub program: String,
    pub args: Vec<String>,
    /// Merged over the inherited process environment; these win on collision.
    pub env: BTreeMap<String, String>,
    pub cwd: PathBuf,
    /// `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub output_limit_bytes: usize,
}

/// How long reader threads may keep draining pipes after a timeout kill.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Run a command with stdin closed, capturing stdout/stderr without risking
/// pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
/// On Unix the child leads its own process group. When `timeout` elapses the whole group is
/// killed, `timed_out` is set, and output collection waits at most [`DRAIN_GRACE`].
#[instrument(skip_all, fields(program = %request.program, timeout_secs = request.timeout.map(|t| t.as_secs())))]
pub fn run_command_with_timeout(request: &ProcessRequest) -> Result<CommandOutput> {
    let mut cmd = Command::new(&request.program);
    cmd.args(&request.args)
        .envs(&request.env)
        .current_dir(&request.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).with_context(|| format!("spawn {}", request.program));
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let limit = request.output_limit_bytes;
    let stdout_rx = spawn_reader(stdout, limit);
    let stderr_rx = spawn_reader(stderr, limit);

    let mut timed_out = false;
    let status = match request.timeout {
        None => child.wait().context("wait for command")?,
        Some(timeout) => match child.wait_timeout(timeout).context("wait for command")? {
            Some(status) => status,
            None => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "command timed out, killing"
                );
                timed_out = true;
                kill_process_tree(&mut child);
                child.wait().context("wait command after kill")?
            }
        },
    };

    let grace = timed_out.then_some(DRAIN_GRACE);
    let (stdout, stdout_truncated) = collect_output(&stdout_rx, grace).context("read stdout")?;
    let (stderr, stderr_truncated) = collect_output(&stderr_rx, grace).context("read stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// Run an agent process and fold every outcome into a reportable result.
///
/// Spawn failures and wait errors become `exit_code = 1` with the error text in
/// stderr; a timeout appends a `killed by timeout` note to stderr.
pub fn run_agent_process(request: &ProcessRequest) -> AgentInvocationResult {
    match run_command_with_timeout(request) {
        Ok(output) => into_invocation_result(output, request.timeout),
        Err(err) => AgentInvocationResult::failed(format!("{err:#}")),
    }
}

fn into_invocation_result(
    output: CommandOutput,
    timeout: Option<Duration>,
) -> AgentInvocationResult {
    let mut stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    stdout.push_str(&CommandOutput::truncated_notice(
        "stdout",
        output.stdout_truncated,
    ));
    let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    stderr.push_str(&CommandOutput::truncated_notice(
        "stderr",
        output.stderr_truncated,
    ));
    if output.timed_out {
        let secs = timeout.map(|t| t.as_secs()).unwrap_or_default();
        if !stderr.is_empty() && !stderr.ends_with('\n') {
            stderr.push('\n');
        }
        stderr.push_str(&format!("[killed by timeout after {secs}s]"));
    }

    let mut exit_code = normalize_exit_code(output.status);
    if output.timed_out && exit_code == 0 {
        exit_code = SIGNAL_EXIT_CODE;
    }

    AgentInvocationResult {
        exit_code,
        stdout,
        stderr,
        timed_out: output.timed_out,
    }
}

/// Reported exit code, or [`SIGNAL_EXIT_CODE`] when the child died from a signal.
pub fn normalize_exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(SIGNAL_EXIT_CODE)
}

/// Kill the child and, on Unix, every process in its group.
///
/// Failures are logged; the caller still reaps the child.
fn kill_process_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        match killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL) {
            Ok(()) => return,
            Err(err) => warn!(err = %err, "failed to kill process group, killing child only"),
        }
    }
    if let Err(err) = child.kill() {
        warn!(err = %err, "failed to kill command");
    }
}

type StreamResult = Result<(Vec<u8>, usize)>;

fn spawn_reader<R: Read + Send + 'static>(reader: R, limit: usize) -> Receiver<StreamResult> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        // The receiver is gone only if collection already gave up.
        let _ = tx.send(read_stream_limited(reader, limit));
    });
    rx
}

/// Wait for a reader thread's result, at most `grace` when set.
///
/// A reader still blocked after `grace` (a descendant escaped the process
/// group and holds the pipe) yields empty output instead of hanging the run.
fn collect_output(rx: &Receiver<StreamResult>, grace: Option<Duration>) -> StreamResult {
    let Some(grace) = grace else {
        return rx
            .recv()
            .map_err(|_| anyhow!("output reader thread panicked"))?;
    };
    match rx.recv_timeout(grace) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            warn!(grace_secs = grace.as_secs(), "pipe still open after kill, dropping output");
            Ok((Vec::new(), 0))
        }
        Err(RecvTimeoutError::Disconnected) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
