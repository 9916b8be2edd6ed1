use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use execgate_config::ExecGateConfig;
use execgate_core::{CommandSignature, SafetyClassifier, parse_command};
use serde_json::json;

use super::resolve_cwd;

const EXIT_MALFORMED: u8 = 2;

/// Print the verdict and approval signature for `command` without running it.
pub fn handle_classify_command(
    config: &ExecGateConfig,
    command: &str,
    cwd: Option<PathBuf>,
    json: bool,
) -> Result<ExitCode> {
    let cwd = resolve_cwd(cwd)?;
    let classifier =
        SafetyClassifier::new(&config.safety).context("failed to build safety classifier")?;

    let request = match parse_command(command, &cwd, None) {
        Ok(request) => request,
        Err(err) => {
            if json {
                println!(
                    "{}",
                    json!({ "command": command, "error": err.to_string() })
                );
            } else {
                eprintln!("execgate: malformed command: {err}");
            }
            return Ok(ExitCode::from(EXIT_MALFORMED));
        }
    };

    let verdict = classifier.classify(&request);
    let signature = CommandSignature::from_request(&request);

    if json {
        let report = json!({
            "command": command,
            "verdict": verdict,
            "signature": signature.to_string(),
            "segments": request.segments.len(),
            "requires_shell": request.requires_shell(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to serialize classification")?
        );
    } else {
        println!("verdict:   {verdict}");
        println!("signature: {signature}");
        if request.requires_shell() {
            println!("shell:     runs via /bin/sh -c");
        }
    }
    Ok(ExitCode::SUCCESS)
}
