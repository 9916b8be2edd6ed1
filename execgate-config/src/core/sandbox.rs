//! Sandbox configuration
//!
//! Only filesystem write scope is restricted; network policy is left to the
//! host.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Isolation tier applied to a spawned command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxMode {
    /// Reads anywhere, writes nowhere.
    ReadOnly,
    /// Reads anywhere, writes inside the working directory subtree.
    #[default]
    WorkspaceWrite,
    /// No restrictions. Never valid as a configured default.
    DangerFullAccess,
}

impl SandboxMode {
    pub const ALL: [Self; 3] = [Self::ReadOnly, Self::WorkspaceWrite, Self::DangerFullAccess];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "read_only",
            Self::WorkspaceWrite => "workspace_write",
            Self::DangerFullAccess => "danger_full_access",
        }
    }

    pub fn is_restricted(self) -> bool {
        !matches!(self, Self::DangerFullAccess)
    }
}

impl fmt::Display for SandboxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SandboxMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown sandbox mode `{value}` \
                     (expected read_only, workspace_write, danger_full_access)"
                )
            })
    }
}

/// Sandbox configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SandboxConfig {
    /// Tier used when the caller does not ask for one
    #[serde(default)]
    pub default_mode: SandboxMode,

    /// Extra directories writable under `workspace_write`, in addition to
    /// the command's working directory
    #[serde(default)]
    pub writable_roots: Vec<PathBuf>,
}
