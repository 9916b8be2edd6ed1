use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::paths;
use crate::error::ConfigError;
use crate::loader::config::ExecGateConfig;

/// Loads, validates and persists the execgate configuration file.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: ExecGateConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration from the default location.
    ///
    /// `EXECGATE_CONFIG` overrides the per-user path. A missing per-user file
    /// yields the built-in defaults; a missing override file is an error.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(config_path) = std::env::var(paths::CONFIG_PATH_ENV) {
            let trimmed = config_path.trim();
            if !trimmed.is_empty() {
                return Self::load_from_file(trimmed);
            }
        }

        match Self::default_config_path() {
            Some(path) if path.exists() => Self::load_from_file(path),
            _ => {
                tracing::debug!("no config file found, using built-in defaults");
                Ok(Self {
                    config: ExecGateConfig::default(),
                    config_path: None,
                })
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ExecGateConfig =
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: Some(path.to_path_buf()),
                source,
            })?;
        config.validate()?;

        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    /// `<config dir>/execgate/config.toml`, when the platform has a config dir.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(paths::CONFIG_DIR_NAME).join(paths::CONFIG_FILE_NAME))
    }

    pub fn config(&self) -> &ExecGateConfig {
        &self.config
    }

    pub fn into_config(self) -> ExecGateConfig {
        self.config
    }

    /// Path the configuration was read from, if any.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn save_config_to_path(
        path: impl AsRef<Path>,
        config: &ExecGateConfig,
    ) -> Result<(), ConfigError> {
        let path = path.as_ref();
        config.validate()?;
        let content = config.to_toml_string()?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
