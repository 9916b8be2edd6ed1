//! Structured outcome of one `execute` call.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use execgate_bash_runner::{BoundedOutput, SpawnError, Termination};
use serde::{Deserialize, Serialize};

use crate::exec_policy::ApprovalDecision;
use crate::sandboxing::{SandboxMechanism, SandboxPolicy, WrappedInvocation};

/// Exit status reported when a direct command could not be spawned.
pub const EXIT_COMMAND_NOT_FOUND: i32 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Ran and exited 0.
    Completed,
    /// Ran and exited non-zero or was killed by a signal.
    ExecutionFailure,
    /// Exceeded its timeout and was torn down.
    TimedOut,
    /// Refused at the approval gate; nothing ran.
    Denied,
    /// The requested isolation could not be provided; nothing ran.
    SandboxUnavailable,
    /// The command text could not be parsed; nothing ran.
    MalformedCommand,
}

impl ExecutionOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::ExecutionFailure => "execution_failure",
            Self::TimedOut => "timed_out",
            Self::Denied => "denied",
            Self::SandboxUnavailable => "sandbox_unavailable",
            Self::MalformedCommand => "malformed_command",
        }
    }

    /// True when a process was actually started.
    pub fn ran(self) -> bool {
        matches!(self, Self::Completed | Self::ExecutionFailure | Self::TimedOut)
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the execution engine observed, before it becomes a result.
#[derive(Debug)]
pub enum ExecutionRun {
    Finished {
        output: BoundedOutput,
        timeout: Duration,
    },
    /// The sandbox wrapper could not start or set up isolation.
    LaunchFailed { reason: String },
    /// A direct (unwrapped) command could not be spawned.
    SpawnFailed { error: SpawnError },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub command: String,
    pub cwd: PathBuf,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    pub policy: Option<SandboxPolicy>,
    pub sandbox: Option<SandboxMechanism>,
    pub truncated: bool,
    pub approval: Option<ApprovalDecision>,
    /// Why the caller asked for the command; reused when it is escalated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
    pub detail: Option<String>,
    pub outcome: ExecutionOutcome,
}

impl ExecutionResult {
    fn refused(command: impl Into<String>, outcome: ExecutionOutcome, detail: String) -> Self {
        Self {
            command: command.into(),
            cwd: PathBuf::new(),
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
            policy: None,
            sandbox: None,
            truncated: false,
            approval: None,
            justification: None,
            detail: Some(detail),
            outcome,
        }
    }

    pub fn denied(command: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::refused(command, ExecutionOutcome::Denied, detail.into())
    }

    pub fn malformed(command: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::refused(command, ExecutionOutcome::MalformedCommand, detail.into())
    }

    pub fn sandbox_unavailable(command: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::refused(command, ExecutionOutcome::SandboxUnavailable, detail.into())
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn with_approval(mut self, approval: ApprovalDecision) -> Self {
        self.approval = Some(approval);
        self
    }

    pub fn with_justification(mut self, justification: Option<String>) -> Self {
        self.justification = justification;
        self
    }

    /// Map an engine run onto a result.
    pub fn from_run(
        command: impl Into<String>,
        wrapped: &WrappedInvocation,
        run: ExecutionRun,
    ) -> Self {
        let command = command.into();
        match run {
            ExecutionRun::LaunchFailed { reason } => {
                let mechanism = wrapped
                    .mechanism
                    .as_ref()
                    .map_or_else(|| "sandbox".to_owned(), ToString::to_string);
                Self::sandbox_unavailable(command, format!("{mechanism} failed to start: {reason}"))
                    .with_cwd(wrapped.cwd.clone())
            }
            ExecutionRun::SpawnFailed { error } => {
                let stderr = if error.is_not_found() {
                    format!("{}: command not found", wrapped.program)
                } else {
                    format!("{}: {error}", wrapped.program)
                };
                Self {
                    command,
                    cwd: wrapped.cwd.clone(),
                    exit_code: Some(EXIT_COMMAND_NOT_FOUND),
                    stdout: String::new(),
                    stderr,
                    duration: Duration::ZERO,
                    policy: Some(wrapped.policy.clone()),
                    sandbox: wrapped.mechanism.clone(),
                    truncated: false,
                    approval: None,
                    justification: None,
                    detail: Some(error.to_string()),
                    outcome: ExecutionOutcome::ExecutionFailure,
                }
            }
            ExecutionRun::Finished { output, timeout } => {
                let (outcome, exit_code, detail) = match output.termination {
                    Termination::Exited(0) => (ExecutionOutcome::Completed, Some(0), None),
                    Termination::Exited(code) => (
                        ExecutionOutcome::ExecutionFailure,
                        Some(code),
                        Some(format!("exited with status {code}")),
                    ),
                    Termination::Signaled(signal) => (
                        ExecutionOutcome::ExecutionFailure,
                        Some(128 + signal),
                        Some(format!("terminated by signal {signal}")),
                    ),
                    Termination::TimedOut => (
                        ExecutionOutcome::TimedOut,
                        None,
                        Some(format!("timed out after {} ms", timeout.as_millis())),
                    ),
                };
                Self {
                    command,
                    cwd: wrapped.cwd.clone(),
                    exit_code,
                    stdout: output.stdout.to_string_lossy(),
                    stderr: output.stderr.to_string_lossy(),
                    duration: output.duration,
                    policy: Some(wrapped.policy.clone()),
                    sandbox: wrapped.mechanism.clone(),
                    truncated: output.truncated(),
                    approval: None,
                    justification: None,
                    detail,
                    outcome,
                }
            }
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == ExecutionOutcome::Completed
    }

    pub fn was_sandboxed(&self) -> bool {
        self.sandbox.is_some()
    }

    pub fn was_approved(&self) -> bool {
        self.approval.is_some_and(ApprovalDecision::allows_execution)
    }

    /// Text handed back to the model.
    pub fn to_model_output(&self) -> String {
        let detail = self.detail.as_deref().unwrap_or_default();
        match self.outcome {
            ExecutionOutcome::Denied => format!("command denied: {detail}"),
            ExecutionOutcome::SandboxUnavailable => format!("sandbox unavailable: {detail}"),
            ExecutionOutcome::MalformedCommand => format!("malformed command: {detail}"),
            ExecutionOutcome::Completed
            | ExecutionOutcome::ExecutionFailure
            | ExecutionOutcome::TimedOut => {
                let mut text = self.stdout.clone();
                if !self.stderr.is_empty() {
                    text.push_str("\nSTDERR:\n");
                    text.push_str(&self.stderr);
                }
                if self.outcome == ExecutionOutcome::TimedOut {
                    text.push_str(&format!("\ncommand {detail}"));
                }
                if self.truncated && self.outcome != ExecutionOutcome::TimedOut {
                    text.push_str("\n[output truncated]");
                }
                text
            }
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
