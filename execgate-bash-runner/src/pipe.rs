//! Pipe-based spawning with timeout, process-group teardown, and bounded
//! capture.
//!
//! [`run_bounded`] is the single entry point used by the execution engine:
//! the child starts in its own session, stdin is `/dev/null`, stdout and
//! stderr are drained concurrently, and on timeout the whole group receives
//! `SIGTERM`, then `SIGKILL` once the grace period lapses.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::capture::{BoundedBuffer, SharedBuffer, capture_into, shared_buffer};
use crate::process_group::{self, DEFAULT_GRACEFUL_TIMEOUT_MS, KillSignal, ProcessGroupGuard};

/// How long readers may keep draining after the group is gone. Pipes held
/// open by a process outside the group must not stall the caller.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Failure to start or supervise a child. A child that runs and exits
/// non-zero is not an error.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("missing program for spawn")]
    MissingProgram,

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("spawned `{program}` but the child has no pid")]
    MissingPid { program: String },

    #[error("failed waiting on `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl SpawnError {
    /// True when the program could not be found or executed at all.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Spawn { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
            ),
            _ => false,
        }
    }
}

/// Options for a bounded, time-limited run.
#[derive(Debug, Clone)]
pub struct PipeSpawnOptions {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// When set, the child environment is cleared and replaced.
    pub env: Option<HashMap<String, String>>,
    pub timeout: Duration,
    /// Per-stream capture limit.
    pub max_output_bytes: usize,
    pub grace_period: Duration,
}

impl PipeSpawnOptions {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: None,
            timeout: Duration::from_secs(10),
            max_output_bytes: 1024 * 1024,
            grace_period: Duration::from_millis(DEFAULT_GRACEFUL_TIMEOUT_MS),
        }
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_output_bytes(mut self, limit: usize) -> Self {
        self.max_output_bytes = limit;
        self
    }

    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }
}

/// How the child's lifetime ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited on its own with a status code.
    Exited(i32),
    /// Killed by a signal it did not receive from us.
    Signaled(i32),
    /// Torn down by us after the timeout elapsed.
    TimedOut,
}

/// Everything observed from one run.
#[derive(Debug, Clone)]
pub struct BoundedOutput {
    pub stdout: BoundedBuffer,
    pub stderr: BoundedBuffer,
    pub termination: Termination,
    pub duration: Duration,
    /// Group id the child led; already empty once this value exists.
    pub process_group_id: Option<u32>,
}

impl BoundedOutput {
    pub fn exit_code(&self) -> Option<i32> {
        match self.termination {
            Termination::Exited(code) => Some(code),
            Termination::Signaled(_) | Termination::TimedOut => None,
        }
    }

    pub fn timed_out(&self) -> bool {
        self.termination == Termination::TimedOut
    }

    pub fn truncated(&self) -> bool {
        self.stdout.is_truncated() || self.stderr.is_truncated()
    }
}

/// Spawn `opts.program`, wait for it under `opts.timeout`, and collect its
/// output.
///
/// If the returned future is dropped mid-run the process group is still
/// killed (drop guard plus `kill_on_drop`).
pub async fn run_bounded(opts: PipeSpawnOptions) -> Result<BoundedOutput, SpawnError> {
    if opts.program.is_empty() {
        return Err(SpawnError::MissingProgram);
    }

    let started = Instant::now();
    let mut command = build_command(&opts);
    let mut child = command.spawn().map_err(|source| SpawnError::Spawn {
        program: opts.program.clone(),
        source,
    })?;
    let pid = child.id().ok_or_else(|| SpawnError::MissingPid {
        program: opts.program.clone(),
    })?;

    // setsid in pre_exec makes the child its own group leader.
    let mut guard = ProcessGroupGuard::new(pid);
    tracing::debug!(program = %opts.program, pid, "spawned child");

    let stdout_task = spawn_reader(child.stdout.take(), opts.max_output_bytes);
    let stderr_task = spawn_reader(child.stderr.take(), opts.max_output_bytes);

    let termination = match tokio::time::timeout(opts.timeout, child.wait()).await {
        Ok(Ok(status)) => {
            // Sweep up anything the child left running in its group.
            if let Err(err) = process_group::kill_process_group(pid) {
                tracing::debug!(pid, error = %err, "post-exit group sweep failed");
            }
            termination_from_status(status)
        }
        Ok(Err(source)) => {
            return Err(SpawnError::Wait {
                program: opts.program.clone(),
                source,
            });
        }
        Err(_) => {
            tracing::debug!(
                program = %opts.program,
                pid,
                timeout_ms = opts.timeout.as_millis(),
                "timeout elapsed, terminating process group"
            );
            terminate_group(&mut child, pid, opts.grace_period).await;
            Termination::TimedOut
        }
    };
    guard.disarm();

    let mut stdout = join_reader(stdout_task, opts.max_output_bytes).await;
    let mut stderr = join_reader(stderr_task, opts.max_output_bytes).await;
    if termination == Termination::TimedOut {
        stdout.mark_truncated();
        stderr.mark_truncated();
    }

    Ok(BoundedOutput {
        stdout,
        stderr,
        termination,
        duration: started.elapsed(),
        process_group_id: Some(pid),
    })
}

fn build_command(opts: &PipeSpawnOptions) -> Command {
    let mut command = Command::new(&opts.program);
    command
        .args(&opts.args)
        .current_dir(&opts.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(env) = &opts.env {
        command.env_clear();
        command.envs(env);
    }

    #[cfg(target_os = "linux")]
    let parent_pid = unsafe { libc::getpid() };

    #[cfg(unix)]
    unsafe {
        command.pre_exec(move || {
            process_group::detach_from_tty()?;
            #[cfg(target_os = "linux")]
            process_group::set_parent_death_signal(parent_pid)?;
            Ok(())
        });
    }

    command
}

/// A stream being drained in the background into a buffer the caller can
/// still read if the task has to be abandoned.
struct StreamReader {
    buffer: SharedBuffer,
    task: JoinHandle<()>,
}

fn spawn_reader<R>(stream: Option<R>, limit: usize) -> Option<StreamReader>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    stream.map(|reader| {
        let buffer = shared_buffer(limit);
        let sink = Arc::clone(&buffer);
        let task = tokio::spawn(async move { capture_into(reader, &sink).await });
        StreamReader { buffer, task }
    })
}

async fn join_reader(reader: Option<StreamReader>, limit: usize) -> BoundedBuffer {
    let Some(StreamReader { buffer, mut task }) = reader else {
        return BoundedBuffer::new(limit);
    };
    match tokio::time::timeout(DRAIN_TIMEOUT, &mut task).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::debug!(error = %err, "output reader task failed");
            buffer.lock().mark_truncated();
        }
        Err(_) => {
            // Someone outside the group still holds the pipe.
            task.abort();
            let _ = task.await;
            buffer.lock().mark_truncated();
        }
    }
    std::mem::take(&mut *buffer.lock())
}

/// SIGTERM the group, give it `grace` to exit, then SIGKILL and reap.
async fn terminate_group(child: &mut Child, pgid: u32, grace: Duration) {
    if let Err(err) = process_group::signal_process_group(pgid, KillSignal::Term) {
        tracing::warn!(pgid, error = %err, "failed to send SIGTERM to process group");
    }

    let exited_gracefully = matches!(tokio::time::timeout(grace, child.wait()).await, Ok(Ok(_)));

    if let Err(err) = process_group::kill_process_group(pgid) {
        tracing::warn!(pgid, error = %err, "failed to send SIGKILL to process group");
    }
    if !exited_gracefully {
        #[cfg(not(unix))]
        if let Err(err) = child.start_kill() {
            tracing::warn!(error = %err, "failed to kill child");
        }
        if let Err(err) = child.wait().await {
            tracing::warn!(pgid, error = %err, "failed to reap timed-out child");
        }
    }
}

fn termination_from_status(status: ExitStatus) -> Termination {
    if let Some(code) = status.code() {
        return Termination::Exited(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Termination::Signaled(signal);
        }
    }
    Termination::Exited(-1)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> PipeSpawnOptions {
        PipeSpawnOptions::new("/bin/sh", ".").args(["-c", script])
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() -> anyhow::Result<()> {
        let output = run_bounded(sh("echo hello; echo oops >&2; exit 3")).await?;
        assert_eq!(output.exit_code(), Some(3));
        assert_eq!(output.stdout.to_string_lossy(), "hello\n");
        assert_eq!(output.stderr.to_string_lossy(), "oops\n");
        assert!(!output.truncated());
        Ok(())
    }

    #[tokio::test]
    async fn output_limit_flags_truncation() -> anyhow::Result<()> {
        let output = run_bounded(sh("yes x | head -c 4096").max_output_bytes(16)).await?;
        assert_eq!(output.exit_code(), Some(0));
        assert_eq!(output.stdout.len(), 16);
        assert!(output.truncated());
        Ok(())
    }

    #[tokio::test]
    async fn missing_program_reports_not_found() {
        let err = run_bounded(PipeSpawnOptions::new("/definitely/not/here", "."))
            .await
            .err();
        assert!(matches!(err, Some(ref e) if e.is_not_found()), "got {err:?}");
    }

    #[tokio::test]
    async fn empty_program_is_rejected() {
        let err = run_bounded(PipeSpawnOptions::new("", ".")).await.err();
        assert!(matches!(err, Some(SpawnError::MissingProgram)));
    }

    #[tokio::test]
    async fn env_is_replaced_when_given() -> anyhow::Result<()> {
        let env = HashMap::from([
            ("PATH".to_string(), "/usr/bin:/bin".to_string()),
            ("EXECGATE_MARKER".to_string(), "42".to_string()),
        ]);
        let output = run_bounded(sh("echo \"$EXECGATE_MARKER:${HOME:-unset}\"").env(env)).await?;
        assert_eq!(output.stdout.to_string_lossy(), "42:unset\n");
        Ok(())
    }
}
