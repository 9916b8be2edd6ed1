//! The approval collaborator seam.

use async_trait::async_trait;

use super::approval::{ApprovalDecision, ApprovalRequest};

/// Asks someone (a human, a policy service, a test script) whether a command
/// may run. The gate treats an `Err` as [`ApprovalDecision::Denied`].
#[async_trait]
pub trait ApprovalPrompt: Send + Sync {
    async fn request_approval(&self, request: &ApprovalRequest) -> anyhow::Result<ApprovalDecision>;
}

/// Returns the same decision for every request.
#[derive(Debug, Clone, Copy)]
pub struct StaticPrompt {
    decision: ApprovalDecision,
}

impl StaticPrompt {
    pub const fn new(decision: ApprovalDecision) -> Self {
        Self { decision }
    }

    pub const fn approve() -> Self {
        Self::new(ApprovalDecision::Approved)
    }

    pub const fn deny() -> Self {
        Self::new(ApprovalDecision::Denied)
    }

    pub const fn approve_for_session() -> Self {
        Self::new(ApprovalDecision::ApprovedForSession)
    }
}

impl Default for StaticPrompt {
    fn default() -> Self {
        Self::deny()
    }
}

#[async_trait]
impl ApprovalPrompt for StaticPrompt {
    async fn request_approval(
        &self,
        request: &ApprovalRequest,
    ) -> anyhow::Result<ApprovalDecision> {
        tracing::debug!(
            command = %request.command_text,
            decision = %self.decision,
            "static approval"
        );
        Ok(self.decision)
    }
}
