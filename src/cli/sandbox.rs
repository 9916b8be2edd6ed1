use std::process::ExitCode;

use anyhow::{Context, Result};
use execgate_core::PlatformCapabilities;

pub fn handle_sandbox_command(json: bool) -> Result<ExitCode> {
    let capabilities = PlatformCapabilities::detect();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&capabilities)
                .context("failed to serialize sandbox capabilities")?
        );
        return Ok(ExitCode::SUCCESS);
    }

    println!("platform: {}", capabilities.platform);
    if capabilities.is_empty() {
        println!("sandbox:  none available");
        println!(
            "          restricted policies will fail; install {}",
            capabilities.missing_mechanism()
        );
    } else {
        for mechanism in &capabilities.mechanisms {
            println!("sandbox:  {mechanism}");
        }
    }
    Ok(ExitCode::SUCCESS)
}
