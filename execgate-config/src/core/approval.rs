use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// When an interactive decision is required before a command runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Nothing auto-runs; every command prompts.
    Never,
    /// Known-safe commands run; everything else prompts.
    #[default]
    OnRequest,
    /// Run first; gate re-execution after a failure.
    OnFailure,
    /// Only session-approved signatures run without a prompt.
    UnlessTrusted,
}

impl ApprovalMode {
    pub const ALL: [Self; 4] = [
        Self::Never,
        Self::OnRequest,
        Self::OnFailure,
        Self::UnlessTrusted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::OnRequest => "on_request",
            Self::OnFailure => "on_failure",
            Self::UnlessTrusted => "unless_trusted",
        }
    }
}

impl fmt::Display for ApprovalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown approval mode `{value}` \
                     (expected never, on_request, on_failure, unless_trusted)"
                )
            })
    }
}

/// How often `on_failure` re-prompts while a command keeps failing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFailureReprompt {
    /// Prompt once for the first retry after a failure; later retries in the
    /// same failure streak run unprompted.
    #[default]
    FirstRetry,
    /// Prompt before every retry while the last run failed.
    EveryRetry,
}

/// Approval gatekeeper configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ApprovalConfig {
    /// Default approval mode
    #[serde(default)]
    pub mode: ApprovalMode,

    /// Re-prompt behavior for `on_failure`
    #[serde(default)]
    pub on_failure_reprompt: OnFailureReprompt,

    /// Remember "approve for session" decisions
    #[serde(default = "default_true")]
    pub session_approvals: bool,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            mode: ApprovalMode::default(),
            on_failure_reprompt: OnFailureReprompt::default(),
            session_approvals: default_true(),
        }
    }
}

const fn default_true() -> bool {
    true
}
