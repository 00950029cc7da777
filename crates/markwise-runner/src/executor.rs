//! Child process lifecycle: spawn, feed stdin, capture capped output,
//! enforce the wall-clock limit, kill and reap.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use markwise_core::traits::{outputs_match, CaseOutcome, CaseVerdict, TestCase};

use crate::sandbox::Sandbox;

/// How long to wait for pipe readers after the group has been killed.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Raw result of one child process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal or timed out.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    /// Output was cut at the byte cap.
    pub truncated: bool,
    pub duration_ms: u64,
}

/// Read a pipe to EOF, keeping at most `cap` bytes. The rest is drained so
/// the child never blocks on a full pipe.
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, cap: usize) -> (Vec<u8>, bool) {
    let mut kept = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = cap.saturating_sub(kept.len());
                if n > room {
                    truncated = true;
                }
                kept.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
    (kept, truncated)
}

/// Wait for a pipe reader until `deadline`. `None` means the pipe was still
/// open, i.e. some process in the group kept it alive.
async fn drain(
    handle: &mut JoinHandle<(Vec<u8>, bool)>,
    deadline: Instant,
) -> Option<(Vec<u8>, bool)> {
    match tokio::time::timeout_at(deadline, handle).await {
        Ok(joined) => Some(joined.unwrap_or_default()),
        Err(_) => None,
    }
}

fn lossy((bytes, truncated): (Vec<u8>, bool)) -> (String, bool) {
    (String::from_utf8_lossy(&bytes).into_owned(), truncated)
}

/// SIGKILL every process in the child's group, including anything it spawned.
#[cfg(unix)]
fn kill_group(pgid: Option<u32>) {
    let Some(pgid) = pgid.and_then(|p| libc::pid_t::try_from(p).ok()) else {
        return;
    };
    // SAFETY: killpg only sends a signal. The group was created for this
    // child by `process_group(0)`, and its id is not recycled while any
    // member is alive.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc == 0 {
        debug!(pgid, "killed sandbox process group");
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: Option<u32>) {}

/// Run `program` with `args` inside the sandbox, writing `input` to stdin.
///
/// The child leads its own process group. Everything in that group is killed
/// when the wall-clock limit elapses, when the run finishes, and (for the
/// direct child) when this future is dropped. A descendant that keeps the
/// output pipes open past the limit counts as a timeout.
pub async fn run_process(
    sandbox: &Sandbox,
    program: &str,
    args: &[&str],
    input: &str,
) -> Result<ProcessOutput> {
    let cap = sandbox.config().max_output_bytes;
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(sandbox.work_dir())
        .env_clear()
        .envs(sandbox.build_env())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let start = Instant::now();
    let deadline = start + sandbox.timeout();
    let timeout_ms = sandbox.timeout().as_millis() as u64;
    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn '{program}'"))?;
    let pgid = child.id();

    let stdout = child.stdout.take().context("child stdout was not captured")?;
    let stderr = child.stderr.take().context("child stderr was not captured")?;
    let mut stdout_task = tokio::spawn(read_capped(stdout, cap));
    let mut stderr_task = tokio::spawn(read_capped(stderr, cap));

    if let Some(mut stdin) = child.stdin.take() {
        let bytes = input.as_bytes().to_vec();
        tokio::spawn(async move {
            // A child that exits without reading stdin closes the pipe early.
            let _ = stdin.write_all(&bytes).await;
        });
    }

    let (mut exit_code, mut timed_out) = match tokio::time::timeout_at(deadline, child.wait()).await
    {
        Ok(status) => {
            let status = status.context("failed to wait for child process")?;
            (status.code(), false)
        }
        Err(_) => {
            warn!(timeout_ms, "sandboxed process timed out, killing");
            kill_group(pgid);
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill timed-out process");
            }
            (None, true)
        }
    };

    let drain_deadline = if timed_out {
        Instant::now() + DRAIN_GRACE
    } else {
        deadline
    };
    let (mut out, mut err) = tokio::join!(
        drain(&mut stdout_task, drain_deadline),
        drain(&mut stderr_task, drain_deadline)
    );
    if !timed_out && (out.is_none() || err.is_none()) {
        warn!(timeout_ms, "a descendant held the output open past the limit, killing");
        timed_out = true;
        exit_code = None;
        kill_group(pgid);
        let grace = Instant::now() + DRAIN_GRACE;
        if out.is_none() {
            out = drain(&mut stdout_task, grace).await;
        }
        if err.is_none() {
            err = drain(&mut stderr_task, grace).await;
        }
    }
    // Sweep anything that detached from the pipes but is still running.
    kill_group(pgid);
    stdout_task.abort();
    stderr_task.abort();

    let (stdout, out_truncated) = lossy(out.unwrap_or_default());
    let (stderr, err_truncated) = lossy(err.unwrap_or_default());
    let duration_ms = start.elapsed().as_millis() as u64;
    debug!(?exit_code, timed_out, duration_ms, "sandboxed process finished");

    Ok(ProcessOutput {
        stdout,
        stderr,
        exit_code,
        timed_out,
        truncated: out_truncated || err_truncated,
        duration_ms,
    })
}

/// Turn a process result into a per-case verdict.
pub fn judge(case: &TestCase, output: ProcessOutput) -> CaseOutcome {
    let verdict = if output.timed_out {
        CaseVerdict::TimedOut
    } else if output.exit_code != Some(0) {
        CaseVerdict::Crashed
    } else {
        match &case.expected {
            None => CaseVerdict::Passed,
            Some(expected) if outputs_match(&output.stdout, expected) => CaseVerdict::Passed,
            Some(_) => CaseVerdict::Failed,
        }
    };
    CaseOutcome {
        verdict,
        stdout: output.stdout,
        stderr: output.stderr,
        exit_code: output.exit_code,
        duration_ms: output.duration_ms,
    }
}
