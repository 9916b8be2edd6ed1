//! Approval decision and request types.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::command_safety::SafetyVerdict;

/// Answer from the approval collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    /// Run this command once.
    Approved,
    /// Do not run.
    Denied,
    /// Run, and auto-approve identical signatures for the rest of the session.
    ApprovedForSession,
}

impl ApprovalDecision {
    pub fn allows_execution(self) -> bool {
        !matches!(self, Self::Denied)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::ApprovedForSession => "approved_for_session",
        }
    }
}

impl fmt::Display for ApprovalDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a prompt needs to ask the question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub command_text: String,
    pub cwd: PathBuf,
    pub justification: Option<String>,
    pub verdict: SafetyVerdict,
    /// Why this is being asked again (prior failure, missing sandbox).
    pub retry_reason: Option<String>,
    /// The command would run with `danger_full_access`.
    pub escalation: bool,
}

impl ApprovalRequest {
    pub fn new(
        command_text: impl Into<String>,
        cwd: impl Into<PathBuf>,
        verdict: SafetyVerdict,
    ) -> Self {
        Self {
            command_text: command_text.into(),
            cwd: cwd.into(),
            justification: None,
            verdict,
            retry_reason: None,
            escalation: false,
        }
    }

    pub fn with_justification(mut self, justification: Option<String>) -> Self {
        self.justification = justification;
        self
    }

    pub fn with_retry_reason(mut self, reason: impl Into<String>) -> Self {
        self.retry_reason = Some(reason.into());
        self
    }

    pub fn escalated(mut self) -> Self {
        self.escalation = true;
        self
    }
}
