use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::ConfigManager;

use crate::core::{ApprovalConfig, ExecutionConfig, SafetyConfig, SandboxConfig, SandboxMode};
use crate::error::ConfigError;

/// Top-level execgate configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExecGateConfig {
    #[serde(default)]
    pub approval: ApprovalConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub safety: SafetyConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,
}

impl ExecGateConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|source| ConfigError::Parse { path: None, source })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        ConfigManager::load_from_file(path).map(ConfigManager::into_config)
    }

    /// Per-user config file (or `EXECGATE_CONFIG`), else built-in defaults.
    pub fn load_default() -> Result<Self, ConfigError> {
        ConfigManager::load().map(ConfigManager::into_config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject configurations the gate must never run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sandbox.default_mode == SandboxMode::DangerFullAccess {
            return Err(ConfigError::Invalid(
                "sandbox.default_mode cannot be danger_full_access; \
                 request it explicitly per command"
                    .to_owned(),
            ));
        }
        if self.execution.default_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "execution.default_timeout_ms must be greater than zero".to_owned(),
            ));
        }
        if self.execution.max_output_bytes == 0 {
            return Err(ConfigError::Invalid(
                "execution.max_output_bytes must be greater than zero".to_owned(),
            ));
        }
        if let Some(entry) = self
            .safety
            .known_safe_commands
            .iter()
            .chain(&self.safety.dangerous_commands)
            .find(|entry| entry.trim().is_empty())
        {
            return Err(ConfigError::Invalid(format!(
                "command lists may not contain blank entries (found {entry:?})"
            )));
        }
        for pattern in &self.safety.dangerous_patterns {
            if pattern.is_empty() {
                return Err(ConfigError::Invalid(
                    "safety.dangerous_patterns may not contain empty patterns".to_owned(),
                ));
            }
            Regex::new(pattern).map_err(|err| {
                ConfigError::Invalid(format!("invalid dangerous pattern `{pattern}`: {err}"))
            })?;
        }
        Ok(())
    }
}
