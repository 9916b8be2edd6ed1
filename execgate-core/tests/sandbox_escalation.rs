#![cfg(unix)]

mod support;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use execgate_bash_runner::process_group_is_alive;
use execgate_config::{ExecGateConfig, SandboxMode};
use execgate_core::sandboxing::CommandInvocation;
use execgate_core::{
    ApprovalDecision, ExecutionOutcome, PlatformCapabilities, SandboxManager, SandboxMechanism,
    SandboxPolicy, StaticPrompt,
};
use pretty_assertions::assert_eq;

use support::{ScriptedPrompt, bare_gate};

#[test]
fn transform_is_deterministic_per_policy_and_host() {
    let manager = SandboxManager::default();
    let caps = PlatformCapabilities::with_mechanisms(
        "linux",
        vec![SandboxMechanism::Bubblewrap {
            executable: PathBuf::from("/usr/bin/bwrap"),
        }],
    );
    let invocation =
        CommandInvocation::new("cargo", "/work/project").with_args(["build", "--release"]);

    for policy in [
        SandboxPolicy::read_only(),
        SandboxPolicy::workspace_write(vec![PathBuf::from("target/../cache")]),
        SandboxPolicy::full_access(),
    ] {
        let first = manager.transform(invocation.clone(), &policy, &caps);
        let second = manager.transform(invocation.clone(), &policy, &caps);
        assert_eq!(first.is_ok(), second.is_ok());
        if let (Ok(first), Ok(second)) = (first, second) {
            assert_eq!(first, second, "transform must be stable for {policy}");
            assert_eq!(first.inner, invocation);
            assert_eq!(first.is_sandboxed(), policy.is_restricted());
        }
    }
}

#[test]
fn workspace_write_binds_cwd_and_cleaned_roots() -> Result<()> {
    let manager = SandboxManager::default();
    let caps = PlatformCapabilities::with_mechanisms(
        "linux",
        vec![SandboxMechanism::Bubblewrap {
            executable: PathBuf::from("/usr/bin/bwrap"),
        }],
    );
    let policy = SandboxPolicy::workspace_write(vec![PathBuf::from("target/../cache")]);
    let wrapped = manager.transform(
        CommandInvocation::new("touch", "/work/project").with_args(["out"]),
        &policy,
        &caps,
    )?;

    assert_eq!(wrapped.program, "/usr/bin/bwrap");
    let joined = wrapped.args.join(" ");
    assert!(joined.contains("--bind /work/project /work/project"));
    assert!(joined.contains("--bind /work/project/cache /work/project/cache"));
    assert!(joined.ends_with("-- touch out"));
    Ok(())
}

#[tokio::test]
async fn missing_mechanism_fails_closed_then_escalates_on_approval() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let prompt = ScriptedPrompt::new([ApprovalDecision::ApprovedForSession]);
    let gate = bare_gate(ExecGateConfig::default(), prompt.clone())?;
    let session = gate.session("agent");

    let unavailable = session.execute("echo hi", dir.path(), None, None).await;
    assert_eq!(unavailable.outcome, ExecutionOutcome::SandboxUnavailable);
    assert!(unavailable.stdout.is_empty());
    assert_eq!(unavailable.exit_code, None);
    assert!(
        unavailable
            .detail
            .as_deref()
            .is_some_and(|detail| detail.contains("no sandbox mechanism available"))
    );
    assert_eq!(prompt.calls(), 0, "known-safe echo never prompts under on_request");

    let escalated = session.escalate(&unavailable, Some("needs to run".into())).await;
    assert_eq!(escalated.outcome, ExecutionOutcome::Completed);
    assert_eq!(escalated.stdout, "hi\n");
    assert_eq!(escalated.policy, Some(SandboxPolicy::full_access()));
    assert!(!escalated.was_sandboxed());
    assert_eq!(
        escalated.approval,
        Some(ApprovalDecision::Approved),
        "escalations are never remembered for the session"
    );

    let requests = prompt.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].escalation);
    assert!(
        requests[0]
            .retry_reason
            .as_deref()
            .is_some_and(|reason| reason.starts_with("sandbox unavailable"))
    );

    // Asked again every time; the queue is now empty so this one is refused.
    let refused = session.escalate(&unavailable, None).await;
    assert_eq!(refused.outcome, ExecutionOutcome::Denied);
    assert_eq!(
        refused.detail.as_deref(),
        Some("escalation to danger_full_access was declined")
    );
    assert_eq!(prompt.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn escalation_reuses_the_original_justification() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let prompt = ScriptedPrompt::new([ApprovalDecision::Approved, ApprovalDecision::Denied]);
    let gate = bare_gate(ExecGateConfig::default(), prompt.clone())?;
    let session = gate.session("agent");

    let unavailable = session
        .execute("echo hi", dir.path(), Some("render the docs".into()), None)
        .await;
    assert_eq!(unavailable.outcome, ExecutionOutcome::SandboxUnavailable);
    assert_eq!(unavailable.justification.as_deref(), Some("render the docs"));

    let escalated = session.escalate(&unavailable, None).await;
    assert_eq!(escalated.outcome, ExecutionOutcome::Completed);
    assert_eq!(escalated.justification.as_deref(), Some("render the docs"));

    session.escalate(&unavailable, Some("retry with reason".into())).await;
    let requests = prompt.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].justification.as_deref(), Some("render the docs"));
    assert_eq!(requests[1].justification.as_deref(), Some("retry with reason"));
    Ok(())
}

#[tokio::test]
async fn timeout_tears_down_the_whole_process_group() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = ExecGateConfig::default();
    config.execution.default_timeout_ms = 1_000;
    config.execution.kill_grace_period_ms = 200;
    let gate = bare_gate(config, Arc::new(StaticPrompt::approve()))?;

    let started = Instant::now();
    let result = gate
        .session("agent")
        .execute(
            "echo $$ > pid.txt; sleep 10 & sleep 10",
            dir.path(),
            None,
            Some(SandboxMode::DangerFullAccess),
        )
        .await;

    assert_eq!(result.outcome, ExecutionOutcome::TimedOut);
    assert_eq!(result.exit_code, None);
    assert_eq!(result.detail.as_deref(), Some("timed out after 1000 ms"));
    assert!(started.elapsed() < Duration::from_secs(5));

    let pid: u32 = std::fs::read_to_string(dir.path().join("pid.txt"))?
        .trim()
        .parse()?;
    let deadline = Instant::now() + Duration::from_secs(2);
    while process_group_is_alive(pid) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!process_group_is_alive(pid), "no orphan may outlive the timeout");
    Ok(())
}

#[tokio::test]
async fn missing_programs_report_command_not_found() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let gate = bare_gate(ExecGateConfig::default(), Arc::new(StaticPrompt::approve()))?;

    let result = gate
        .session("agent")
        .execute(
            "definitely-not-a-real-program --flag",
            dir.path(),
            None,
            Some(SandboxMode::DangerFullAccess),
        )
        .await;

    assert_eq!(result.outcome, ExecutionOutcome::ExecutionFailure);
    assert_eq!(result.exit_code, Some(127));
    assert_eq!(
        result.stderr,
        "definitely-not-a-real-program: command not found"
    );
    Ok(())
}
