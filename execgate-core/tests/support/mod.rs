//! Shared helpers for the gate integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use execgate_config::ExecGateConfig;
use execgate_core::sandboxing::{CommandInvocation, ProfileGenerator};
use execgate_core::{
    ApprovalDecision, ApprovalPrompt, ApprovalRequest, ExecGate, MechanismKind,
    PlatformCapabilities, SandboxError, SandboxMechanism, SandboxPolicy, SandboxRegistry,
};
use parking_lot::Mutex;

/// Answers from a queue, records every request, and tracks how many
/// prompts were in flight at once. An exhausted queue denies.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<ApprovalDecision>>,
    seen: Mutex<Vec<ApprovalRequest>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedPrompt {
    pub fn new(answers: impl IntoIterator<Item = ApprovalDecision>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into_iter().collect()),
            ..Self::default()
        })
    }

    pub fn slow(answers: impl IntoIterator<Item = ApprovalDecision>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into_iter().collect()),
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn requests(&self) -> Vec<ApprovalRequest> {
        self.seen.lock().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApprovalPrompt for ScriptedPrompt {
    async fn request_approval(&self, request: &ApprovalRequest) -> Result<ApprovalDecision> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.seen.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let answer = self
            .answers
            .lock()
            .pop_front()
            .unwrap_or(ApprovalDecision::Denied);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(answer)
    }
}

/// Never answers.
#[derive(Debug, Default)]
pub struct PendingPrompt;

#[async_trait]
impl ApprovalPrompt for PendingPrompt {
    async fn request_approval(&self, _request: &ApprovalRequest) -> Result<ApprovalDecision> {
        std::future::pending().await
    }
}

/// Leaves requests whose command contains `hold` unanswered and approves
/// everything else once.
#[derive(Debug)]
pub struct SelectivePrompt {
    hold: String,
    seen: Mutex<Vec<ApprovalRequest>>,
}

impl SelectivePrompt {
    pub fn holding(hold: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            hold: hold.into(),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ApprovalRequest> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl ApprovalPrompt for SelectivePrompt {
    async fn request_approval(&self, request: &ApprovalRequest) -> Result<ApprovalDecision> {
        self.seen.lock().push(request.clone());
        if request.command_text.contains(&self.hold) {
            std::future::pending::<()>().await;
        }
        Ok(ApprovalDecision::Approved)
    }
}

/// Stands in for bubblewrap so restricted policies run on any unix host:
/// the "wrapper" is `env`, which just execs the inner command.
#[derive(Debug, Default)]
pub struct PassthroughProfile;

impl ProfileGenerator for PassthroughProfile {
    fn kind(&self) -> MechanismKind {
        MechanismKind::Bubblewrap
    }

    fn wrap(
        &self,
        invocation: &CommandInvocation,
        _policy: &SandboxPolicy,
        _writable_roots: &[PathBuf],
    ) -> Result<Vec<String>, SandboxError> {
        let mut args = vec![invocation.program.clone()];
        args.extend(invocation.args.iter().cloned());
        Ok(args)
    }

    fn is_launch_failure(&self, _exit_code: Option<i32>, _stderr: &str) -> bool {
        false
    }
}

pub fn passthrough_capabilities() -> PlatformCapabilities {
    PlatformCapabilities::with_mechanisms(
        "linux",
        vec![SandboxMechanism::Bubblewrap {
            executable: PathBuf::from("/usr/bin/env"),
        }],
    )
}

pub fn passthrough_registry() -> SandboxRegistry {
    let mut registry = SandboxRegistry::empty();
    registry.register(Arc::new(PassthroughProfile));
    registry
}

/// Gate whose restricted policies run through [`PassthroughProfile`].
pub fn runnable_gate(config: ExecGateConfig, prompt: Arc<dyn ApprovalPrompt>) -> Result<ExecGate> {
    Ok(ExecGate::builder(config)
        .prompt(prompt)
        .capabilities(passthrough_capabilities())
        .registry(passthrough_registry())
        .build()?)
}

/// Gate on a host with no isolation mechanism at all.
pub fn bare_gate(config: ExecGateConfig, prompt: Arc<dyn ApprovalPrompt>) -> Result<ExecGate> {
    Ok(ExecGate::builder(config)
        .prompt(prompt)
        .capabilities(PlatformCapabilities::none())
        .build()?)
}
