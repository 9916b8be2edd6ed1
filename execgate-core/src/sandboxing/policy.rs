//! Sandbox policy tiers.

use std::fmt;
use std::path::{Path, PathBuf};

use execgate_config::{SandboxConfig, SandboxMode};
use path_clean::PathClean;
use serde::{Deserialize, Serialize};

use super::SandboxError;

/// Isolation tier applied to a spawned command.
///
/// Reads are never restricted. The tiers differ only in where the command
/// may write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SandboxPolicy {
    /// No writes except `/dev/null`.
    ReadOnly,

    /// Writes inside the working directory and the listed roots.
    WorkspaceWrite {
        #[serde(default)]
        writable_roots: Vec<PathBuf>,
    },

    /// No restrictions. Only reachable by explicit request or escalation.
    DangerFullAccess,
}

impl SandboxPolicy {
    pub fn read_only() -> Self {
        Self::ReadOnly
    }

    pub fn workspace_write(writable_roots: Vec<PathBuf>) -> Self {
        Self::WorkspaceWrite { writable_roots }
    }

    pub fn full_access() -> Self {
        Self::DangerFullAccess
    }

    /// Build the policy for `mode`, taking extra roots from config.
    pub fn from_mode(mode: SandboxMode, config: &SandboxConfig) -> Self {
        match mode {
            SandboxMode::ReadOnly => Self::ReadOnly,
            SandboxMode::WorkspaceWrite => Self::WorkspaceWrite {
                writable_roots: config.writable_roots.clone(),
            },
            SandboxMode::DangerFullAccess => Self::DangerFullAccess,
        }
    }

    pub fn mode(&self) -> SandboxMode {
        match self {
            Self::ReadOnly => SandboxMode::ReadOnly,
            Self::WorkspaceWrite { .. } => SandboxMode::WorkspaceWrite,
            Self::DangerFullAccess => SandboxMode::DangerFullAccess,
        }
    }

    pub fn is_restricted(&self) -> bool {
        !matches!(self, Self::DangerFullAccess)
    }

    /// Directories the command may write to when run from `cwd`.
    ///
    /// Paths are cleaned, sorted and deduplicated. Relative roots resolve
    /// against `cwd`.
    pub fn writable_roots(&self, cwd: &Path) -> Result<Vec<PathBuf>, SandboxError> {
        let Self::WorkspaceWrite { writable_roots } = self else {
            return Ok(Vec::new());
        };
        if !cwd.is_absolute() {
            return Err(SandboxError::InvalidPolicy(format!(
                "working directory must be absolute: {}",
                cwd.display()
            )));
        }

        let mut roots: Vec<PathBuf> = std::iter::once(cwd.to_path_buf())
            .chain(writable_roots.iter().map(|root| cwd.join(root)))
            .map(|root| root.clean())
            .collect();
        roots.sort();
        roots.dedup();
        Ok(roots)
    }

    pub fn to_json(&self) -> Result<String, SandboxError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl fmt::Display for SandboxPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mode().as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn serializes_with_type_tag() {
        let policy = SandboxPolicy::workspace_write(vec![PathBuf::from("/tmp/cache")]);
        let json = policy.to_json().expect("serialize");
        assert_eq!(
            json,
            r#"{"type":"workspace_write","writable_roots":["/tmp/cache"]}"#
        );
        assert_eq!(
            SandboxPolicy::read_only().to_json().expect("serialize"),
            r#"{"type":"read_only"}"#
        );
    }

    #[test]
    fn workspace_roots_include_cwd_and_are_normalized() {
        let policy = SandboxPolicy::workspace_write(vec![
            PathBuf::from("/var/tmp/../tmp/x/"),
            PathBuf::from("build"),
            PathBuf::from("/work/project"),
        ]);
        let roots = policy
            .writable_roots(Path::new("/work/project"))
            .expect("roots");
        assert_eq!(
            roots,
            vec![
                PathBuf::from("/var/tmp/x"),
                PathBuf::from("/work/project"),
                PathBuf::from("/work/project/build"),
            ]
        );
    }

    #[test]
    fn read_only_and_full_access_have_no_roots() {
        let cwd = Path::new("/work");
        assert!(SandboxPolicy::ReadOnly.writable_roots(cwd).expect("roots").is_empty());
        assert!(
            SandboxPolicy::DangerFullAccess
                .writable_roots(cwd)
                .expect("roots")
                .is_empty()
        );
    }

    #[test]
    fn relative_cwd_is_rejected() {
        let policy = SandboxPolicy::workspace_write(Vec::new());
        assert!(matches!(
            policy.writable_roots(Path::new("relative")),
            Err(SandboxError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn from_mode_uses_configured_roots() {
        let config = SandboxConfig {
            writable_roots: vec![PathBuf::from("/opt/cache")],
            ..SandboxConfig::default()
        };
        assert_eq!(
            SandboxPolicy::from_mode(SandboxMode::WorkspaceWrite, &config),
            SandboxPolicy::workspace_write(vec![PathBuf::from("/opt/cache")])
        );
        assert_eq!(
            SandboxPolicy::from_mode(SandboxMode::ReadOnly, &config).mode(),
            SandboxMode::ReadOnly
        );
    }
}
