use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use execgate_config::ExecGateConfig;

pub mod args;
mod classify;
mod config;
mod run;
mod sandbox;

pub use classify::handle_classify_command;
pub use config::handle_config_command;
pub use run::{RunCommandOptions, handle_run_command};
pub use sandbox::handle_sandbox_command;

/// `--config` when given, otherwise `$EXECGATE_CONFIG` or the user config
/// file, falling back to built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<ExecGateConfig> {
    match path {
        Some(path) => ExecGateConfig::load_from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(ExecGateConfig::load_default()?),
    }
}

/// `cwd` made absolute against the process working directory.
pub(crate) fn resolve_cwd(cwd: Option<PathBuf>) -> Result<PathBuf> {
    let current = std::env::current_dir().context("failed to read current directory")?;
    Ok(match cwd {
        Some(cwd) if cwd.is_absolute() => cwd,
        Some(cwd) => current.join(cwd),
        None => current,
    })
}
