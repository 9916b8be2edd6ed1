use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use execgate_config::{ConfigManager, ExecGateConfig};

/// Print the effective configuration, or with `path` where it came from.
pub fn handle_config_command(
    config: &ExecGateConfig,
    explicit: Option<&Path>,
    path: bool,
) -> Result<ExitCode> {
    if path {
        let resolved = match explicit {
            Some(explicit) => Some(explicit.to_path_buf()),
            None => ConfigManager::load()?.config_path().map(Path::to_path_buf),
        };
        match resolved {
            Some(resolved) => println!("{}", resolved.display()),
            None => {
                let expected = ConfigManager::default_config_path()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "<no config directory>".to_owned());
                println!("built-in defaults (no file at {expected})");
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    let rendered = config
        .to_toml_string()
        .context("failed to render configuration")?;
    print!("{rendered}");
    Ok(ExitCode::SUCCESS)
}
