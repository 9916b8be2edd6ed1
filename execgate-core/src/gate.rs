//! Gate orchestration: parse, classify, approve, sandbox, execute.

use std::path::Path;
use std::sync::Arc;

use execgate_config::{ExecGateConfig, SandboxMode};
use tokio_util::sync::CancellationToken;

use crate::command_safety::{CommandSignature, SafetyClassifier, parse_command};
use crate::error::GateError;
use crate::exec::{ExecutionEngine, ExecutionOutcome, ExecutionResult};
use crate::exec_policy::{ApprovalGatekeeper, ApprovalPrompt, GateInput, StaticPrompt};
use crate::sandboxing::{
    CommandInvocation, PlatformCapabilities, SandboxManager, SandboxPolicy, SandboxRegistry,
};
use crate::session::{SessionMemory, SessionRegistry};

struct GateShared {
    config: ExecGateConfig,
    classifier: SafetyClassifier,
    gatekeeper: ApprovalGatekeeper,
    sandbox: SandboxManager,
    capabilities: PlatformCapabilities,
    engine: ExecutionEngine,
}

/// Builder for [`ExecGate`].
///
/// Without an explicit prompt every command that needs approval is denied.
pub struct ExecGateBuilder {
    config: ExecGateConfig,
    prompt: Option<Arc<dyn ApprovalPrompt>>,
    capabilities: Option<PlatformCapabilities>,
    registry: Option<SandboxRegistry>,
}

impl ExecGateBuilder {
    pub fn prompt(mut self, prompt: Arc<dyn ApprovalPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Override host detection, e.g. with [`PlatformCapabilities::none`].
    pub fn capabilities(mut self, capabilities: PlatformCapabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    pub fn registry(mut self, registry: SandboxRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Result<ExecGate, GateError> {
        self.config.validate()?;
        let classifier = SafetyClassifier::new(&self.config.safety)?;
        let prompt = self
            .prompt
            .unwrap_or_else(|| Arc::new(StaticPrompt::deny()));
        let gatekeeper = ApprovalGatekeeper::new(self.config.approval.clone(), prompt);
        let sandbox = SandboxManager::new(self.registry.unwrap_or_default());
        let capabilities = self
            .capabilities
            .unwrap_or_else(PlatformCapabilities::detect);
        let engine = ExecutionEngine::new(self.config.execution.clone(), sandbox.clone());

        tracing::debug!(
            approval_mode = %self.config.approval.mode,
            default_policy = %self.config.sandbox.default_mode,
            mechanisms = capabilities.mechanisms.len(),
            "exec gate ready"
        );

        Ok(ExecGate {
            shared: Arc::new(GateShared {
                config: self.config,
                classifier,
                gatekeeper,
                sandbox,
                capabilities,
                engine,
            }),
            sessions: SessionRegistry::new(),
        })
    }
}

/// Entry point: owns the shared policy machinery and the session registry.
pub struct ExecGate {
    shared: Arc<GateShared>,
    sessions: SessionRegistry,
}

impl ExecGate {
    pub fn new(config: ExecGateConfig) -> Result<Self, GateError> {
        Self::builder(config).build()
    }

    pub fn builder(config: ExecGateConfig) -> ExecGateBuilder {
        ExecGateBuilder {
            config,
            prompt: None,
            capabilities: None,
            registry: None,
        }
    }

    /// Session for `id`, created on first use.
    pub fn session(&self, id: &str) -> Arc<ExecSession> {
        self.sessions
            .get_or_insert_with(id, || ExecSession::new(id, Arc::clone(&self.shared)))
    }

    /// Drop a session and everything it remembered.
    pub fn end_session(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.ids()
    }

    pub fn config(&self) -> &ExecGateConfig {
        &self.shared.config
    }

    pub fn capabilities(&self) -> &PlatformCapabilities {
        &self.shared.capabilities
    }

    pub fn classifier(&self) -> &SafetyClassifier {
        &self.shared.classifier
    }
}

/// One caller's stream of commands. Requests are handled one at a time, in
/// the order they were issued.
pub struct ExecSession {
    id: String,
    shared: Arc<GateShared>,
    memory: SessionMemory,
    turn: tokio::sync::Mutex<()>,
}

impl ExecSession {
    fn new(id: &str, shared: Arc<GateShared>) -> Self {
        Self {
            id: id.to_owned(),
            shared,
            memory: SessionMemory::new(),
            turn: tokio::sync::Mutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn memory(&self) -> &SessionMemory {
        &self.memory
    }

    /// Forget session approvals and failure streaks.
    pub fn reset(&self) {
        tracing::debug!(session = %self.id, "session memory reset");
        self.memory.reset();
    }

    /// Run `command_text` in `cwd`. `requested_policy` of `None` uses the
    /// configured default; an explicit `DangerFullAccess` is treated as an
    /// escalation and always asks.
    pub async fn execute(
        &self,
        command_text: &str,
        cwd: impl AsRef<Path>,
        justification: Option<String>,
        requested_policy: Option<SandboxMode>,
    ) -> ExecutionResult {
        self.execute_with_cancel(
            command_text,
            cwd,
            justification,
            requested_policy,
            &CancellationToken::new(),
        )
        .await
    }

    /// Like [`Self::execute`]; cancelling `cancel` while the approval prompt
    /// is pending resolves the request as denied.
    pub async fn execute_with_cancel(
        &self,
        command_text: &str,
        cwd: impl AsRef<Path>,
        justification: Option<String>,
        requested_policy: Option<SandboxMode>,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let _turn = self.turn.lock().await;
        self.run_locked(
            command_text,
            cwd.as_ref(),
            justification,
            requested_policy,
            None,
            cancel,
        )
        .await
    }

    /// Ask to re-run a `SandboxUnavailable` result with `danger_full_access`.
    ///
    /// Any other result is returned unchanged.
    pub async fn escalate(
        &self,
        result: &ExecutionResult,
        justification: Option<String>,
    ) -> ExecutionResult {
        if result.outcome != ExecutionOutcome::SandboxUnavailable {
            tracing::debug!(
                outcome = %result.outcome,
                "only sandbox_unavailable results escalate"
            );
            return result.clone();
        }

        let reason = format!(
            "sandbox unavailable: {}",
            result.detail.as_deref().unwrap_or("no isolation mechanism")
        );
        let justification = justification.or_else(|| result.justification.clone());
        let _turn = self.turn.lock().await;
        self.run_locked(
            &result.command,
            &result.cwd,
            justification,
            Some(SandboxMode::DangerFullAccess),
            Some(reason),
            &CancellationToken::new(),
        )
        .await
    }

    async fn run_locked(
        &self,
        command_text: &str,
        cwd: &Path,
        justification: Option<String>,
        requested_policy: Option<SandboxMode>,
        retry_reason: Option<String>,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let noted = justification.clone();
        self.evaluate_and_run(
            command_text,
            cwd,
            justification,
            requested_policy,
            retry_reason,
            cancel,
        )
        .await
        .with_justification(noted)
    }

    async fn evaluate_and_run(
        &self,
        command_text: &str,
        cwd: &Path,
        justification: Option<String>,
        requested_policy: Option<SandboxMode>,
        retry_reason: Option<String>,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let shared = &self.shared;

        let request = match parse_command(command_text, cwd, justification) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(
                    session = %self.id,
                    command = command_text,
                    error = %err,
                    "malformed command"
                );
                return ExecutionResult::malformed(command_text, err.to_string()).with_cwd(cwd);
            }
        };
        let verdict = shared.classifier.classify(&request);
        let signature = CommandSignature::from_request(&request);

        let mode = requested_policy.unwrap_or(shared.config.sandbox.default_mode);
        let policy = SandboxPolicy::from_mode(mode, &shared.config.sandbox);
        let escalation = mode == SandboxMode::DangerFullAccess;

        tracing::debug!(
            session = %self.id,
            command = %request.raw,
            %verdict,
            %signature,
            policy = %policy,
            escalation,
            "evaluating command"
        );

        let evaluation = shared
            .gatekeeper
            .evaluate(
                GateInput {
                    request: &request,
                    verdict,
                    signature: &signature,
                    escalation,
                    retry_reason,
                },
                &self.memory,
                cancel,
            )
            .await;
        tracing::debug!(session = %self.id, trail = %evaluation.trail, "approval resolved");

        if evaluation.is_denied() {
            let detail = if escalation {
                "escalation to danger_full_access was declined".to_owned()
            } else {
                format!(
                    "approval denied for {verdict} command under {} mode",
                    shared.gatekeeper.mode()
                )
            };
            return ExecutionResult::denied(command_text, detail)
                .with_cwd(cwd)
                .with_approval(evaluation.decision);
        }

        let invocation = CommandInvocation::from_request(&request);
        let wrapped = match shared
            .sandbox
            .transform(invocation, &policy, &shared.capabilities)
        {
            Ok(wrapped) => wrapped,
            Err(err) => {
                tracing::warn!(
                    session = %self.id,
                    command = command_text,
                    error = %err,
                    "sandbox unavailable"
                );
                return ExecutionResult::sandbox_unavailable(command_text, err.to_string())
                    .with_cwd(cwd)
                    .with_approval(evaluation.decision);
            }
        };

        let run = shared.engine.run(&wrapped, None).await;
        let result = ExecutionResult::from_run(command_text, &wrapped, run)
            .with_approval(evaluation.decision);

        match result.outcome {
            ExecutionOutcome::Completed => self.memory.note_success(&signature),
            ExecutionOutcome::ExecutionFailure | ExecutionOutcome::TimedOut => {
                self.memory.note_failure(&signature)
            }
            _ => {}
        }
        result
    }
}
