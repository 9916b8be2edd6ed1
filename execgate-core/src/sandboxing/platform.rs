//! Detection of the isolation mechanisms present on the host.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const SEATBELT_EXECUTABLE: &str = "/usr/bin/sandbox-exec";
const BUBBLEWRAP_PROGRAM: &str = "bwrap";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MechanismKind {
    /// macOS `sandbox-exec`
    Seatbelt,
    /// Linux `bwrap`
    Bubblewrap,
}

impl MechanismKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Seatbelt => "seatbelt",
            Self::Bubblewrap => "bubblewrap",
        }
    }

    /// What an operator has to install to get this mechanism.
    pub fn requirement(self) -> &'static str {
        match self {
            Self::Seatbelt => "seatbelt (/usr/bin/sandbox-exec)",
            Self::Bubblewrap => "bubblewrap (`bwrap` on PATH)",
        }
    }
}

impl fmt::Display for MechanismKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An available mechanism and the executable that provides it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SandboxMechanism {
    Seatbelt { executable: PathBuf },
    Bubblewrap { executable: PathBuf },
}

impl SandboxMechanism {
    pub fn kind(&self) -> MechanismKind {
        match self {
            Self::Seatbelt { .. } => MechanismKind::Seatbelt,
            Self::Bubblewrap { .. } => MechanismKind::Bubblewrap,
        }
    }

    pub fn executable(&self) -> &Path {
        match self {
            Self::Seatbelt { executable } | Self::Bubblewrap { executable } => executable,
        }
    }
}

impl fmt::Display for SandboxMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind(), self.executable().display())
    }
}

/// Mechanisms usable on this host, in preference order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformCapabilities {
    pub platform: String,
    pub mechanisms: Vec<SandboxMechanism>,
}

impl PlatformCapabilities {
    /// Detect what the host offers.
    pub fn detect() -> Self {
        let mut mechanisms = Vec::new();

        if cfg!(target_os = "macos") {
            let seatbelt = Path::new(SEATBELT_EXECUTABLE);
            if seatbelt.is_file() {
                mechanisms.push(SandboxMechanism::Seatbelt {
                    executable: seatbelt.to_path_buf(),
                });
            }
        }

        if cfg!(target_os = "linux") {
            match which::which(BUBBLEWRAP_PROGRAM) {
                Ok(executable) => mechanisms.push(SandboxMechanism::Bubblewrap { executable }),
                Err(err) => tracing::debug!(error = %err, "bwrap not found on PATH"),
            }
        }

        let capabilities = Self {
            platform: std::env::consts::OS.to_owned(),
            mechanisms,
        };
        tracing::debug!(
            platform = %capabilities.platform,
            mechanisms = ?capabilities.mechanisms,
            "detected sandbox capabilities"
        );
        capabilities
    }

    /// This host, with no usable mechanism.
    pub fn none() -> Self {
        Self {
            platform: std::env::consts::OS.to_owned(),
            mechanisms: Vec::new(),
        }
    }

    pub fn with_mechanisms(platform: impl Into<String>, mechanisms: Vec<SandboxMechanism>) -> Self {
        Self {
            platform: platform.into(),
            mechanisms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mechanisms.is_empty()
    }

    /// Mechanism this platform would normally use.
    pub fn expected_mechanism(&self) -> Option<MechanismKind> {
        match self.platform.as_str() {
            "macos" => Some(MechanismKind::Seatbelt),
            "linux" => Some(MechanismKind::Bubblewrap),
            _ => None,
        }
    }

    /// Human-readable name of what is missing, for unavailability reports.
    pub fn missing_mechanism(&self) -> String {
        self.expected_mechanism()
            .map(|kind| kind.requirement().to_owned())
            .unwrap_or_else(|| format!("a supported sandbox mechanism for {}", self.platform))
    }
}
