#![cfg(unix)]

mod support;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use execgate_config::{ApprovalMode, ExecGateConfig, OnFailureReprompt};
use execgate_core::{ApprovalDecision, ExecutionOutcome, SafetyVerdict};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use support::{PendingPrompt, ScriptedPrompt, SelectivePrompt, runnable_gate};

fn config_with(mode: ApprovalMode) -> ExecGateConfig {
    let mut config = ExecGateConfig::default();
    config.approval.mode = mode;
    config
}

#[tokio::test]
async fn known_safe_commands_skip_the_prompt_under_on_request() -> Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("notes.txt"), "hello")?;
    let prompt = ScriptedPrompt::new([]);
    let gate = runnable_gate(config_with(ApprovalMode::OnRequest), prompt.clone())?;

    let result = gate.session("agent").execute("ls", dir.path(), None, None).await;

    assert_eq!(result.outcome, ExecutionOutcome::Completed);
    assert_eq!(result.exit_code, Some(0));
    assert!(result.stdout.contains("notes.txt"));
    assert_eq!(result.approval, Some(ApprovalDecision::Approved));
    assert!(result.was_sandboxed());
    assert_eq!(prompt.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn dangerous_commands_run_only_once_approved() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let victim = dir.path().join("victim.txt");
    std::fs::write(&victim, "keep me")?;
    let prompt = ScriptedPrompt::new([ApprovalDecision::Denied, ApprovalDecision::Approved]);
    let gate = runnable_gate(config_with(ApprovalMode::OnRequest), prompt.clone())?;
    let session = gate.session("agent");

    let denied = session
        .execute("rm victim.txt", dir.path(), Some("cleanup".into()), None)
        .await;
    assert_eq!(denied.outcome, ExecutionOutcome::Denied);
    assert_eq!(denied.exit_code, None);
    assert!(victim.exists(), "a denied command must not touch the filesystem");
    assert!(denied.to_model_output().starts_with("command denied: "));

    let approved = session
        .execute("rm victim.txt", dir.path(), Some("cleanup".into()), None)
        .await;
    assert_eq!(approved.outcome, ExecutionOutcome::Completed);
    assert!(!victim.exists());

    let requests = prompt.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].verdict, SafetyVerdict::KnownDangerous);
    assert_eq!(requests[0].justification.as_deref(), Some("cleanup"));
    assert!(!requests[0].escalation);
    Ok(())
}

#[tokio::test]
async fn never_mode_prompts_even_for_known_safe_commands() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let prompt = ScriptedPrompt::new([]);
    let gate = runnable_gate(config_with(ApprovalMode::Never), prompt.clone())?;
    let session = gate.session("agent");

    let touched = session
        .execute("touch created.txt", dir.path(), None, None)
        .await;
    assert_eq!(touched.outcome, ExecutionOutcome::Denied);
    assert!(!dir.path().join("created.txt").exists());

    let listed = session.execute("ls", dir.path(), None, None).await;
    assert_eq!(listed.outcome, ExecutionOutcome::Denied);
    assert_eq!(prompt.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn session_approval_round_trip_under_unless_trusted() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let prompt = ScriptedPrompt::new([
        ApprovalDecision::ApprovedForSession,
        ApprovalDecision::Denied,
        ApprovalDecision::Approved,
    ]);
    let gate = runnable_gate(config_with(ApprovalMode::UnlessTrusted), prompt.clone())?;
    let session = gate.session("agent");

    let first = session.execute("ls -l", dir.path(), None, None).await;
    assert_eq!(first.outcome, ExecutionOutcome::Completed);
    assert_eq!(first.approval, Some(ApprovalDecision::ApprovedForSession));

    // Same signature: positional arguments do not matter.
    let again = session.execute("ls -l .", dir.path(), None, None).await;
    assert_eq!(again.outcome, ExecutionOutcome::Completed);
    assert_eq!(prompt.calls(), 1);

    // Different flags are a different signature.
    let other = session.execute("ls -la", dir.path(), None, None).await;
    assert_eq!(other.outcome, ExecutionOutcome::Denied);
    assert_eq!(prompt.calls(), 2);

    // Another session shares nothing.
    let fresh = gate.session("other").execute("ls -l", dir.path(), None, None).await;
    assert_eq!(fresh.approval, Some(ApprovalDecision::Approved));
    assert_eq!(prompt.calls(), 3);

    session.reset();
    let after_reset = session.execute("ls -l", dir.path(), None, None).await;
    assert_eq!(after_reset.outcome, ExecutionOutcome::Denied);
    assert_eq!(prompt.calls(), 4);
    Ok(())
}

#[tokio::test]
async fn session_approval_does_not_cover_command_substitutions() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let prompt =
        ScriptedPrompt::new([ApprovalDecision::ApprovedForSession, ApprovalDecision::Denied]);
    let gate = runnable_gate(config_with(ApprovalMode::UnlessTrusted), prompt.clone())?;
    let session = gate.session("agent");

    let hi = session.execute("echo hi", dir.path(), None, None).await;
    assert_eq!(hi.approval, Some(ApprovalDecision::ApprovedForSession));

    let smuggled = session
        .execute("echo \"$(touch pwned)\"", dir.path(), None, None)
        .await;
    assert_eq!(smuggled.outcome, ExecutionOutcome::Denied);
    assert!(!dir.path().join("pwned").exists());
    assert_eq!(prompt.calls(), 2);

    let bye = session.execute("echo bye", dir.path(), None, None).await;
    assert_eq!(bye.stdout, "bye\n");
    assert_eq!(prompt.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn session_approval_of_a_shell_script_covers_only_that_script() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let victim = dir.path().join("victim.txt");
    std::fs::write(&victim, "keep me")?;
    let prompt = ScriptedPrompt::new([
        ApprovalDecision::ApprovedForSession,
        ApprovalDecision::Denied,
        ApprovalDecision::Denied,
    ]);
    let gate = runnable_gate(config_with(ApprovalMode::OnRequest), prompt.clone())?;
    let session = gate.session("agent");

    let first = session.execute("sh -c 'touch one.txt'", dir.path(), None, None).await;
    assert_eq!(first.outcome, ExecutionOutcome::Completed);
    let second = session.execute("sh -c 'touch two.txt'", dir.path(), None, None).await;
    assert_eq!(second.outcome, ExecutionOutcome::Completed);
    assert_eq!(prompt.calls(), 1);

    let mkdir = session.execute("sh -c 'mkdir made'", dir.path(), None, None).await;
    assert_eq!(mkdir.outcome, ExecutionOutcome::Denied);
    assert!(!dir.path().join("made").exists());

    let rm = session.execute("sh -c 'rm victim.txt'", dir.path(), None, None).await;
    assert_eq!(rm.outcome, ExecutionOutcome::Denied);
    assert!(victim.exists());
    assert_eq!(prompt.calls(), 3);
    Ok(())
}

#[tokio::test]
async fn dangerous_commands_are_approved_one_run_at_a_time() -> Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("a.txt"), "a")?;
    std::fs::write(dir.path().join("b.txt"), "b")?;
    let prompt = ScriptedPrompt::new([ApprovalDecision::ApprovedForSession]);
    let gate = runnable_gate(config_with(ApprovalMode::OnRequest), prompt.clone())?;
    let session = gate.session("agent");

    let first = session.execute("rm a.txt", dir.path(), None, None).await;
    assert_eq!(first.outcome, ExecutionOutcome::Completed);
    assert_eq!(first.approval, Some(ApprovalDecision::Approved));

    let second = session.execute("rm b.txt", dir.path(), None, None).await;
    assert_eq!(second.outcome, ExecutionOutcome::Denied);
    assert!(dir.path().join("b.txt").exists());
    assert_eq!(prompt.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn recursive_delete_of_a_system_path_is_denied_under_never() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let victim = dir.path().join("victim");
    std::fs::create_dir(&victim)?;
    let prompt = ScriptedPrompt::new([ApprovalDecision::Denied]);
    let gate = runnable_gate(config_with(ApprovalMode::Never), prompt.clone())?;

    let result = gate
        .session("agent")
        .execute("rm -rf /usr/local/share/execgate-scratch victim", dir.path(), None, None)
        .await;

    assert_eq!(result.outcome, ExecutionOutcome::Denied);
    assert_eq!(result.approval, Some(ApprovalDecision::Denied));
    assert_eq!(result.exit_code, None);
    assert!(result.stdout.is_empty());
    assert!(victim.exists(), "a denied command must not run");
    let requests = prompt.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].verdict, SafetyVerdict::KnownDangerous);
    Ok(())
}

#[tokio::test]
async fn on_failure_asks_once_per_failure_streak() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let prompt = ScriptedPrompt::new([ApprovalDecision::Approved]);
    let gate = runnable_gate(config_with(ApprovalMode::OnFailure), prompt.clone())?;
    let session = gate.session("agent");

    let first = session.execute("ls missing", dir.path(), None, None).await;
    assert_eq!(first.outcome, ExecutionOutcome::ExecutionFailure);
    assert_eq!(prompt.calls(), 0, "on_failure runs the first attempt unprompted");

    let retry = session.execute("ls missing", dir.path(), None, None).await;
    assert_eq!(retry.outcome, ExecutionOutcome::ExecutionFailure);
    assert_eq!(prompt.calls(), 1);
    let reason = prompt.requests()[0].retry_reason.clone().unwrap_or_default();
    assert!(reason.contains("failed"), "unexpected retry reason: {reason}");

    let third = session.execute("ls missing", dir.path(), None, None).await;
    assert_eq!(third.outcome, ExecutionOutcome::ExecutionFailure);
    assert_eq!(prompt.calls(), 1, "first_retry only asks once per streak");

    std::fs::create_dir(dir.path().join("missing"))?;
    let fixed = session.execute("ls missing", dir.path(), None, None).await;
    assert_eq!(fixed.outcome, ExecutionOutcome::Completed);
    assert_eq!(prompt.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn on_failure_every_retry_keeps_asking() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = config_with(ApprovalMode::OnFailure);
    config.approval.on_failure_reprompt = OnFailureReprompt::EveryRetry;
    let prompt = ScriptedPrompt::new([ApprovalDecision::Approved, ApprovalDecision::Denied]);
    let gate = runnable_gate(config, prompt.clone())?;
    let session = gate.session("agent");

    session.execute("ls missing", dir.path(), None, None).await;
    let retry = session.execute("ls missing", dir.path(), None, None).await;
    assert_eq!(retry.outcome, ExecutionOutcome::ExecutionFailure);

    let third = session.execute("ls missing", dir.path(), None, None).await;
    assert_eq!(third.outcome, ExecutionOutcome::Denied);
    assert_eq!(prompt.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn denied_retry_keeps_the_failure_gate_closed() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let prompt = ScriptedPrompt::new([ApprovalDecision::Denied]);
    let gate = runnable_gate(config_with(ApprovalMode::OnFailure), prompt.clone())?;
    let session = gate.session("agent");

    session.execute("ls missing", dir.path(), None, None).await;
    let denied = session.execute("ls missing", dir.path(), None, None).await;
    assert_eq!(denied.outcome, ExecutionOutcome::Denied);

    let asked_again = session.execute("ls missing", dir.path(), None, None).await;
    assert_eq!(asked_again.outcome, ExecutionOutcome::Denied);
    assert_eq!(prompt.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn cancelling_a_pending_prompt_denies() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let gate = runnable_gate(config_with(ApprovalMode::Never), Arc::new(PendingPrompt))?;
    let session = gate.session("agent");
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        session.execute_with_cancel("touch late.txt", dir.path(), None, None, &cancel),
    )
    .await?;

    assert_eq!(result.outcome, ExecutionOutcome::Denied);
    assert_eq!(result.approval, Some(ApprovalDecision::Denied));
    assert!(!dir.path().join("late.txt").exists());
    Ok(())
}

#[tokio::test]
async fn one_session_handles_requests_in_issue_order() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let prompt = ScriptedPrompt::slow(
        [ApprovalDecision::Approved, ApprovalDecision::Approved],
        Duration::from_millis(100),
    );
    let gate = runnable_gate(config_with(ApprovalMode::Never), prompt.clone())?;
    let session = gate.session("agent");

    let (first, second) = tokio::join!(
        session.execute("echo first", dir.path(), None, None),
        session.execute("echo second", dir.path(), None, None),
    );

    assert_eq!(first.stdout, "first\n");
    assert_eq!(second.stdout, "second\n");
    let order: Vec<String> = prompt
        .requests()
        .into_iter()
        .map(|request| request.command_text)
        .collect();
    assert_eq!(order, vec!["echo first", "echo second"]);
    assert_eq!(prompt.max_in_flight(), 1);
    Ok(())
}

#[tokio::test]
async fn a_pending_prompt_does_not_block_other_sessions() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let prompt = SelectivePrompt::holding("blocked.txt");
    let gate = runnable_gate(config_with(ApprovalMode::Never), prompt.clone())?;
    let cancel = CancellationToken::new();

    let waiting = {
        let session = gate.session("first");
        let cwd = dir.path().to_path_buf();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            session
                .execute_with_cancel("touch blocked.txt", &cwd, None, None, &cancel)
                .await
        })
    };
    while prompt.requests().is_empty() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let other = tokio::time::timeout(
        Duration::from_secs(5),
        gate.session("second").execute("echo from-second", dir.path(), None, None),
    )
    .await?;
    assert_eq!(other.outcome, ExecutionOutcome::Completed);
    assert_eq!(other.stdout, "from-second\n");
    assert!(!waiting.is_finished());

    cancel.cancel();
    let blocked = tokio::time::timeout(Duration::from_secs(5), waiting).await??;
    assert_eq!(blocked.outcome, ExecutionOutcome::Denied);
    assert!(!dir.path().join("blocked.txt").exists());
    Ok(())
}
