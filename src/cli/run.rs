use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use execgate_config::{ApprovalMode, ExecGateConfig, SandboxMode};
use execgate_core::{
    ApprovalPrompt, ExecGate, ExecutionOutcome, ExecutionResult, StaticPrompt,
};

use super::args::{AssumeDecision, RunArgs};
use super::resolve_cwd;
use crate::prompt::TerminalPrompt;

const CLI_SESSION_ID: &str = "cli";

const EXIT_MALFORMED: u8 = 2;
const EXIT_TIMED_OUT: u8 = 124;
const EXIT_SANDBOX_UNAVAILABLE: u8 = 125;
const EXIT_DENIED: u8 = 126;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Debug, Clone)]
pub struct RunCommandOptions {
    pub command: String,
    pub cwd: Option<PathBuf>,
    pub policy: Option<SandboxMode>,
    pub timeout_ms: Option<u64>,
    pub approval_mode: Option<ApprovalMode>,
    pub justification: Option<String>,
    pub assume: Option<AssumeDecision>,
    pub json: bool,
}

impl From<RunArgs> for RunCommandOptions {
    fn from(args: RunArgs) -> Self {
        let command = match args.command.as_slice() {
            [single] => single.clone(),
            words => shell_words::join(words),
        };
        Self {
            command,
            cwd: args.cwd,
            policy: args.policy,
            timeout_ms: args.timeout_ms,
            approval_mode: args.approval_mode,
            justification: args.justification,
            assume: args.assume,
            json: args.json,
        }
    }
}

pub async fn handle_run_command(
    mut config: ExecGateConfig,
    options: RunCommandOptions,
) -> Result<ExitCode> {
    if let Some(timeout_ms) = options.timeout_ms {
        config.execution.default_timeout_ms = timeout_ms;
    }
    if let Some(mode) = options.approval_mode {
        config.approval.mode = mode;
    }
    let cwd = resolve_cwd(options.cwd.clone())?;

    let prompt: Arc<dyn ApprovalPrompt> = match options.assume {
        Some(assume) => Arc::new(StaticPrompt::new(assume.into())),
        None => Arc::new(TerminalPrompt::new()),
    };
    let gate = ExecGate::builder(config)
        .prompt(prompt)
        .build()
        .context("failed to initialize exec gate")?;
    let session = gate.session(CLI_SESSION_ID);

    let run = async {
        let result = session
            .execute(
                &options.command,
                &cwd,
                options.justification.clone(),
                options.policy,
            )
            .await;
        if result.outcome != ExecutionOutcome::SandboxUnavailable {
            return result;
        }

        tracing::warn!(
            detail = result.detail.as_deref().unwrap_or_default(),
            "sandbox unavailable, asking to escalate"
        );
        let escalated = session
            .escalate(&result, options.justification.clone())
            .await;
        // A declined escalation reports the original failure.
        if escalated.outcome == ExecutionOutcome::Denied {
            result
        } else {
            escalated
        }
    };

    // Dropping the run on Ctrl-C tears down the child's process group.
    let result = tokio::select! {
        result = run => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!(command = %options.command, "interrupted");
            return Ok(ExitCode::from(EXIT_INTERRUPTED));
        }
    };

    print_result(&result, options.json)?;
    Ok(ExitCode::from(exit_status_for(&result)))
}

fn print_result(result: &ExecutionResult, json: bool) -> Result<()> {
    if json {
        let rendered =
            serde_json::to_string_pretty(result).context("failed to serialize execution result")?;
        println!("{rendered}");
        return Ok(());
    }

    let text = result.to_model_output();
    if result.outcome.ran() {
        print!("{text}");
        if !text.is_empty() && !text.ends_with('\n') {
            println!();
        }
    } else {
        eprintln!("execgate: {text}");
    }
    Ok(())
}

fn exit_status_for(result: &ExecutionResult) -> u8 {
    match result.outcome {
        ExecutionOutcome::Completed => 0,
        ExecutionOutcome::ExecutionFailure => result
            .exit_code
            .and_then(|code| u8::try_from(code).ok())
            .unwrap_or(1),
        ExecutionOutcome::TimedOut => EXIT_TIMED_OUT,
        ExecutionOutcome::Denied => EXIT_DENIED,
        ExecutionOutcome::SandboxUnavailable => EXIT_SANDBOX_UNAVAILABLE,
        ExecutionOutcome::MalformedCommand => EXIT_MALFORMED,
    }
}
