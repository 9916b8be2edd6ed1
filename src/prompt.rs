//! Interactive approval on the controlling terminal.

use std::io::{self, IsTerminal};

use anyhow::{Context, Result};
use async_trait::async_trait;
use dialoguer::Select;
use execgate_core::{ApprovalDecision, ApprovalPrompt, ApprovalRequest, SafetyVerdict};

const APPROVE_ONCE: &str = "Approve once";
const APPROVE_SESSION: &str = "Approve for this session";
const DENY: &str = "Deny (esc)";

/// Asks on stderr with a `dialoguer` selection. Denies when no terminal is
/// attached or the prompt is interrupted.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl TerminalPrompt {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ApprovalPrompt for TerminalPrompt {
    async fn request_approval(&self, request: &ApprovalRequest) -> Result<ApprovalDecision> {
        if !(io::stdin().is_terminal() && io::stderr().is_terminal()) {
            tracing::warn!(
                command = %request.command_text,
                "approval required but no terminal is attached, denying"
            );
            return Ok(ApprovalDecision::Denied);
        }

        let request = request.clone();
        tokio::task::spawn_blocking(move || ask_on_terminal(&request))
            .await
            .context("approval prompt task failed")?
    }
}

fn ask_on_terminal(request: &ApprovalRequest) -> Result<ApprovalDecision> {
    eprintln!();
    if request.escalation {
        eprintln!("The command needs to run WITHOUT a sandbox (danger_full_access).");
    }
    eprintln!("Command:   {}", request.command_text);
    eprintln!("Directory: {}", request.cwd.display());
    eprintln!("Safety:    {}", request.verdict);
    if let Some(justification) = &request.justification {
        eprintln!("Reason:    {justification}");
    }
    if let Some(retry_reason) = &request.retry_reason {
        eprintln!("Note:      {retry_reason}");
    }

    // Escalations and dangerous commands are one-shot, so there is nothing to remember.
    let one_shot = request.escalation || request.verdict == SafetyVerdict::KnownDangerous;
    let options: Vec<(&str, ApprovalDecision)> = if one_shot {
        vec![
            (APPROVE_ONCE, ApprovalDecision::Approved),
            (DENY, ApprovalDecision::Denied),
        ]
    } else {
        vec![
            (APPROVE_ONCE, ApprovalDecision::Approved),
            (APPROVE_SESSION, ApprovalDecision::ApprovedForSession),
            (DENY, ApprovalDecision::Denied),
        ]
    };
    let labels: Vec<&str> = options.iter().map(|(label, _)| *label).collect();
    let deny_index = labels.len() - 1;

    let selection = Select::new()
        .with_prompt("Allow this command to run?")
        .items(&labels)
        .default(deny_index)
        .interact_opt();

    let decision = match selection {
        Ok(Some(index)) => options
            .get(index)
            .map_or(ApprovalDecision::Denied, |(_, decision)| *decision),
        Ok(None) => ApprovalDecision::Denied,
        Err(err) => {
            tracing::warn!(error = %err, "approval prompt interrupted, denying");
            ApprovalDecision::Denied
        }
    };
    Ok(decision)
}
