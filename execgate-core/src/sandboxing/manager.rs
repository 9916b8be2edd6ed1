//! Sandbox manager for transforming invocations into sandboxed ones.

use execgate_bash_runner::BoundedOutput;

use super::exec_env::{CommandInvocation, WrappedInvocation};
use super::platform::PlatformCapabilities;
use super::policy::SandboxPolicy;
use super::profiles::SandboxRegistry;
use super::SandboxError;

/// Applies a [`SandboxPolicy`] to an invocation using the first mechanism
/// the platform offers. Never falls back to unsandboxed execution.
#[derive(Debug, Clone, Default)]
pub struct SandboxManager {
    registry: SandboxRegistry,
}

impl SandboxManager {
    pub fn new(registry: SandboxRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SandboxRegistry {
        &self.registry
    }

    /// Wrap `invocation` so it runs under `policy`.
    ///
    /// The result depends only on the arguments: the same tier and
    /// capabilities always produce an equal [`WrappedInvocation`].
    pub fn transform(
        &self,
        invocation: CommandInvocation,
        policy: &SandboxPolicy,
        capabilities: &PlatformCapabilities,
    ) -> Result<WrappedInvocation, SandboxError> {
        if !policy.is_restricted() {
            tracing::debug!(
                program = %invocation.program,
                "full access requested, running unwrapped"
            );
            return Ok(WrappedInvocation::direct(invocation, policy.clone()));
        }

        let writable_roots = policy.writable_roots(&invocation.cwd)?;
        if !invocation.cwd.is_absolute() {
            return Err(SandboxError::InvalidPolicy(format!(
                "working directory must be absolute: {}",
                invocation.cwd.display()
            )));
        }

        for mechanism in &capabilities.mechanisms {
            let Some(generator) = self.registry.get(mechanism.kind()) else {
                tracing::debug!(%mechanism, "no profile generator registered, skipping");
                continue;
            };
            let args = generator.wrap(&invocation, policy, &writable_roots)?;
            tracing::debug!(
                %mechanism,
                policy = %policy,
                roots = ?writable_roots,
                "sandbox selected"
            );
            return Ok(WrappedInvocation {
                program: mechanism.executable().to_string_lossy().into_owned(),
                args,
                cwd: invocation.cwd.clone(),
                policy: policy.clone(),
                mechanism: Some(mechanism.clone()),
                inner: invocation,
            });
        }

        tracing::warn!(
            policy = %policy,
            platform = %capabilities.platform,
            "no sandbox mechanism available"
        );
        Err(SandboxError::Unavailable {
            policy: policy.mode(),
            platform: capabilities.platform.clone(),
            missing: capabilities.missing_mechanism(),
        })
    }

    /// True when a finished run failed inside the sandbox wrapper itself.
    ///
    /// Any stdout means the child ran, so only silent runs are considered.
    pub fn is_launch_failure(&self, wrapped: &WrappedInvocation, output: &BoundedOutput) -> bool {
        if !output.stdout.is_empty() {
            return false;
        }
        let stderr = output.stderr.to_string_lossy();
        wrapped
            .mechanism
            .as_ref()
            .and_then(|mechanism| self.registry.get(mechanism.kind()))
            .is_some_and(|generator| generator.is_launch_failure(output.exit_code(), &stderr))
    }
}
