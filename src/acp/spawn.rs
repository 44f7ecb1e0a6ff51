//! Agent subprocess spawning and termination.
//!
//! The agent is started in its own process group: it forks a worker child
//! that holds the per-session file lock, and killing only the parent would
//! leave that child running. Group-wide signalling is therefore the only
//! reliable way to tear a worker down.
//!
//! Termination is two-stage: SIGTERM to the group, a bounded grace period,
//! then SIGKILL to the group. `kill_on_drop(true)` remains set as a backstop
//! for abnormal unwinds.

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{AppError, Result};

/// Grace period between SIGTERM and SIGKILL.
pub const KILL_GRACE: Duration = Duration::from_secs(5);

/// Environment variables inherited by the spawned agent process.
///
/// Everything else is stripped via `env_clear()` so the bot token and other
/// gateway secrets never reach the agent.
pub const ALLOWED_ENV_VARS: &[&str] = &["PATH", "HOME", "USER", "LANG", "TERM", "RUST_LOG"];

/// How to launch the agent binary.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Agent binary name or path.
    pub program: String,
    /// Arguments passed before any protocol traffic.
    pub args: Vec<String>,
    /// Directory the process starts in.
    pub cwd: PathBuf,
}

/// A spawned agent process, minus the stdio handles the driver takes over.
#[derive(Debug)]
pub struct AgentProcess {
    /// Child handle; kept alive so `kill_on_drop` works.
    pub child: Child,
    /// Process id recorded at spawn time, used for group signalling after
    /// the child handle has been reaped.
    pub pid: Option<u32>,
    /// Task forwarding agent stderr to the log sink.
    pub stderr_task: JoinHandle<()>,
}

/// Spawn the agent subprocess with piped stdio in a fresh process group.
///
/// Returns the process handle together with its stdin and stdout.
///
/// # Errors
///
/// Returns `AppError::Spawn` if the OS spawn fails or a stdio handle cannot
/// be captured.
pub fn spawn_agent(config: &SpawnConfig) -> Result<(AgentProcess, ChildStdin, ChildStdout)> {
    let mut cmd = Command::new(&config.program);
    cmd.args(&config.args);

    cmd.env_clear();
    for &key in ALLOWED_ENV_VARS {
        if let Ok(val) = std::env::var(key) {
            cmd.env(key, val);
        }
    }

    cmd.current_dir(&config.cwd)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);

    // New process group so terminate_group can signal the agent and the
    // session-lock-holding worker child it forks.
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Spawn(format!("failed to spawn '{}': {err}", config.program)))?;

    let pid = child.id();
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture agent stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture agent stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture agent stderr".into()))?;

    let stderr_task = spawn_stderr_pump(config.program.clone(), pid, stderr);

    debug!(program = %config.program, pid, "agent process spawned");

    Ok((
        AgentProcess {
            child,
            pid,
            stderr_task,
        },
        stdin,
        stdout,
    ))
}

/// Forward agent stderr to the log sink line by line.
///
/// Emitted at `warn` so the lines survive the default log filter — stderr
/// is diagnostics the agent chose to surface and must never be discarded.
/// Stderr EOF does not by itself mean the process died, so the pump simply
/// exits when the stream closes.
fn spawn_stderr_pump(
    program: String,
    pid: Option<u32>,
    stderr: tokio::process::ChildStderr,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        warn!(agent = %program, pid, "agent stderr: {trimmed}");
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }
    })
}

/// Check whether a process with `pid` is alive (signal-0 probe).
#[must_use]
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        let Ok(pid_i32) = i32::try_from(pid) else {
            return false;
        };
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid_i32), None).is_ok()
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

/// Terminate the agent's whole process group: SIGTERM, wait up to
/// [`KILL_GRACE`], then SIGKILL.
pub async fn terminate_group(child: &mut Child, pid: Option<u32>) {
    signal_group(pid, false);

    match tokio::time::timeout(KILL_GRACE, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(pid, ?status, "agent process exited after SIGTERM");
        }
        Ok(Err(err)) => {
            warn!(pid, %err, "error waiting for agent process");
        }
        Err(_) => {
            warn!(pid, "agent did not exit within grace period, killing group");
            signal_group(pid, true);
            if let Err(err) = child.kill().await {
                warn!(pid, %err, "failed to force-kill agent process");
            }
        }
    }
}

/// Send SIGTERM (or SIGKILL) to the process group rooted at `pid`.
fn signal_group(pid: Option<u32>, force: bool) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = pid else { return };
        let Ok(pid_i32) = i32::try_from(pid) else {
            return;
        };
        let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
        // Negative pid addresses the whole group.
        let _ = kill(Pid::from_raw(-pid_i32), signal);
    }
    #[cfg(not(unix))]
    {
        let _ = (pid, force);
    }
}
