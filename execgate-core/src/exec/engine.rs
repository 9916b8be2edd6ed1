//! Runs wrapped invocations with bounded output and process-group cleanup.

use std::time::Duration;

use execgate_bash_runner::{PipeSpawnOptions, run_bounded};
use execgate_config::ExecutionConfig;

use super::result::ExecutionRun;
use crate::sandboxing::{SandboxManager, WrappedInvocation};

#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    config: ExecutionConfig,
    sandbox: SandboxManager,
}

impl ExecutionEngine {
    pub fn new(config: ExecutionConfig, sandbox: SandboxManager) -> Self {
        Self { config, sandbox }
    }

    pub fn default_timeout(&self) -> Duration {
        self.config.default_timeout()
    }

    /// Spawn `wrapped` and wait for it, at most `timeout` (or the configured
    /// default). Never retries; the caller decides what a failure means.
    pub async fn run(
        &self,
        wrapped: &WrappedInvocation,
        timeout: Option<Duration>,
    ) -> ExecutionRun {
        let timeout = timeout.unwrap_or_else(|| self.config.default_timeout());
        let options = PipeSpawnOptions::new(wrapped.program.clone(), wrapped.cwd.clone())
            .args(wrapped.args.iter().cloned())
            .timeout(timeout)
            .max_output_bytes(self.config.max_output_bytes)
            .grace_period(self.config.kill_grace_period());

        tracing::info!(
            command = %wrapped.display_command(),
            cwd = %wrapped.cwd.display(),
            policy = %wrapped.policy,
            sandboxed = wrapped.is_sandboxed(),
            timeout_ms = timeout.as_millis() as u64,
            "executing command"
        );

        match run_bounded(options).await {
            Ok(output) => {
                if wrapped.is_sandboxed() && self.sandbox.is_launch_failure(wrapped, &output) {
                    let stderr = output.stderr.to_string_lossy();
                    let reason = stderr.lines().next().unwrap_or_default().to_owned();
                    tracing::warn!(%reason, "sandbox wrapper failed to launch");
                    return ExecutionRun::LaunchFailed { reason };
                }
                tracing::info!(
                    termination = ?output.termination,
                    duration_ms = output.duration.as_millis() as u64,
                    truncated = output.truncated(),
                    "command finished"
                );
                ExecutionRun::Finished { output, timeout }
            }
            Err(error) if wrapped.is_sandboxed() => {
                tracing::warn!(
                    %error,
                    program = %wrapped.program,
                    "sandbox wrapper could not be spawned"
                );
                ExecutionRun::LaunchFailed {
                    reason: error.to_string(),
                }
            }
            Err(error) => {
                tracing::warn!(%error, program = %wrapped.program, "command could not be spawned");
                ExecutionRun::SpawnFailed { error }
            }
        }
    }
}
