//! Decides whether a classified command may run.

use std::fmt;
use std::sync::Arc;

use execgate_config::{ApprovalConfig, ApprovalMode};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::approval::{ApprovalDecision, ApprovalRequest};
use super::prompt::ApprovalPrompt;
use crate::command_safety::{CommandRequest, CommandSignature, SafetyVerdict};
use crate::session::SessionMemory;

/// States a single evaluation passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Init,
    Classified,
    AutoApproved,
    AwaitingApproval,
    Denied,
    Resolved,
}

/// Ordered record of the states an evaluation visited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GateTrail(Vec<GateState>);

impl GateTrail {
    fn push(&mut self, state: GateState) {
        tracing::debug!(?state, "gate transition");
        self.0.push(state);
    }

    pub fn states(&self) -> &[GateState] {
        &self.0
    }

    pub fn visited(&self, state: GateState) -> bool {
        self.0.contains(&state)
    }
}

impl fmt::Display for GateTrail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, state) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{state:?}")?;
        }
        Ok(())
    }
}

/// What the gate knows about the command being evaluated.
#[derive(Debug, Clone)]
pub struct GateInput<'a> {
    pub request: &'a CommandRequest,
    pub verdict: SafetyVerdict,
    pub signature: &'a CommandSignature,
    /// Use the escalation bar: always ask, never remember.
    pub escalation: bool,
    pub retry_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateEvaluation {
    pub decision: ApprovalDecision,
    pub prompted: bool,
    pub trail: GateTrail,
}

impl GateEvaluation {
    pub fn is_denied(&self) -> bool {
        self.decision == ApprovalDecision::Denied
    }
}

enum Route {
    Auto(ApprovalDecision, &'static str),
    Prompt(Option<String>),
}

/// Applies the configured approval mode, consulting session memory and the
/// prompt collaborator.
#[derive(Clone)]
pub struct ApprovalGatekeeper {
    config: ApprovalConfig,
    prompt: Arc<dyn ApprovalPrompt>,
}

impl fmt::Debug for ApprovalGatekeeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovalGatekeeper")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ApprovalGatekeeper {
    pub fn new(config: ApprovalConfig, prompt: Arc<dyn ApprovalPrompt>) -> Self {
        Self { config, prompt }
    }

    pub fn mode(&self) -> ApprovalMode {
        self.config.mode
    }

    pub async fn evaluate(
        &self,
        input: GateInput<'_>,
        memory: &SessionMemory,
        cancel: &CancellationToken,
    ) -> GateEvaluation {
        let mut trail = GateTrail::default();
        trail.push(GateState::Init);
        trail.push(GateState::Classified);

        let failure_gated = !input.escalation
            && self.config.mode == ApprovalMode::OnFailure
            && memory
                .failure_gate(input.signature, self.config.on_failure_reprompt)
                .is_some();

        match self.route(&input, memory) {
            Route::Auto(decision, reason) => {
                tracing::debug!(
                    command = %input.request.raw,
                    verdict = %input.verdict,
                    mode = %self.config.mode,
                    reason,
                    "auto-approved"
                );
                trail.push(GateState::AutoApproved);
                trail.push(GateState::Resolved);
                GateEvaluation {
                    decision,
                    prompted: false,
                    trail,
                }
            }
            Route::Prompt(reason) => {
                trail.push(GateState::AwaitingApproval);
                let decision = self.ask(&input, reason, cancel).await;
                let decision = self.settle(&input, decision, memory, failure_gated);
                if decision == ApprovalDecision::Denied {
                    tracing::warn!(command = %input.request.raw, "command denied");
                    trail.push(GateState::Denied);
                }
                trail.push(GateState::Resolved);
                GateEvaluation {
                    decision,
                    prompted: true,
                    trail,
                }
            }
        }
    }

    fn route(&self, input: &GateInput<'_>, memory: &SessionMemory) -> Route {
        if input.escalation {
            return Route::Prompt(input.retry_reason.clone());
        }

        // Known-dangerous commands are approved one run at a time.
        let rememberable = input.verdict != SafetyVerdict::KnownDangerous;
        let session_approved = || rememberable && memory.is_approved_for_session(input.signature);
        match self.config.mode {
            ApprovalMode::Never => Route::Prompt(input.retry_reason.clone()),
            ApprovalMode::OnRequest => {
                if input.verdict == SafetyVerdict::KnownSafe {
                    Route::Auto(ApprovalDecision::Approved, "known safe")
                } else if session_approved() {
                    Route::Auto(ApprovalDecision::ApprovedForSession, "approved for session")
                } else {
                    Route::Prompt(input.retry_reason.clone())
                }
            }
            ApprovalMode::OnFailure => {
                if let Some(failures) =
                    memory.failure_gate(input.signature, self.config.on_failure_reprompt)
                {
                    let noun = if failures == 1 { "run" } else { "runs" };
                    Route::Prompt(Some(format!(
                        "the previous {failures} {noun} of this command failed"
                    )))
                } else if input.verdict != SafetyVerdict::KnownDangerous {
                    Route::Auto(ApprovalDecision::Approved, "on_failure runs first")
                } else if session_approved() {
                    Route::Auto(ApprovalDecision::ApprovedForSession, "approved for session")
                } else {
                    Route::Prompt(input.retry_reason.clone())
                }
            }
            ApprovalMode::UnlessTrusted => {
                if session_approved() {
                    Route::Auto(ApprovalDecision::ApprovedForSession, "approved for session")
                } else {
                    Route::Prompt(input.retry_reason.clone())
                }
            }
        }
    }

    async fn ask(
        &self,
        input: &GateInput<'_>,
        reason: Option<String>,
        cancel: &CancellationToken,
    ) -> ApprovalDecision {
        let mut request = ApprovalRequest::new(
            input.request.raw.clone(),
            input.request.cwd.clone(),
            input.verdict,
        )
        .with_justification(input.request.justification.clone());
        if let Some(reason) = reason {
            request = request.with_retry_reason(reason);
        }
        if input.escalation {
            request = request.escalated();
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!(command = %request.command_text, "approval wait cancelled");
                ApprovalDecision::Denied
            }
            result = self.prompt.request_approval(&request) => match result {
                Ok(decision) => decision,
                Err(err) => {
                    tracing::warn!(
                        command = %request.command_text,
                        error = %err,
                        "approval prompt failed, treating as denied"
                    );
                    ApprovalDecision::Denied
                }
            },
        }
    }

    /// Apply escalation and session-memory rules to a prompt answer.
    fn settle(
        &self,
        input: &GateInput<'_>,
        decision: ApprovalDecision,
        memory: &SessionMemory,
        failure_gated: bool,
    ) -> ApprovalDecision {
        let dangerous = input.verdict == SafetyVerdict::KnownDangerous;
        let decision = match decision {
            ApprovalDecision::ApprovedForSession if input.escalation => {
                tracing::debug!("session approval downgraded to one-shot for escalation");
                ApprovalDecision::Approved
            }
            ApprovalDecision::ApprovedForSession if dangerous => {
                tracing::debug!("session approval downgraded to one-shot for dangerous command");
                ApprovalDecision::Approved
            }
            ApprovalDecision::ApprovedForSession if !self.config.session_approvals => {
                ApprovalDecision::Approved
            }
            ApprovalDecision::ApprovedForSession => {
                memory.record(input.signature.clone(), ApprovalDecision::ApprovedForSession);
                ApprovalDecision::ApprovedForSession
            }
            other => other,
        };

        if failure_gated && decision.allows_execution() {
            memory.acknowledge_retry(input.signature);
        }
        decision
    }
}
