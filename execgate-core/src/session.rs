//! Per-session approval memory.
//!
//! Nothing here touches disk; a session's memory lives exactly as long as the
//! session does.

use std::collections::HashMap;
use std::sync::Arc;

use execgate_config::OnFailureReprompt;
use parking_lot::Mutex;

use crate::command_safety::CommandSignature;
use crate::exec_policy::ApprovalDecision;
use crate::gate::ExecSession;

#[derive(Debug, Default)]
struct FailureStreak {
    failures: u32,
    // a retry was approved since the streak started
    acknowledged: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    approvals: HashMap<CommandSignature, ApprovalDecision>,
    failures: HashMap<CommandSignature, FailureStreak>,
}

/// Remembered decisions and on_failure streaks, keyed by signature.
#[derive(Debug, Default)]
pub struct SessionMemory {
    state: Mutex<MemoryState>,
}

impl SessionMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, signature: CommandSignature, decision: ApprovalDecision) {
        tracing::debug!(%signature, %decision, "recording session decision");
        self.state.lock().approvals.insert(signature, decision);
    }

    pub fn lookup(&self, signature: &CommandSignature) -> Option<ApprovalDecision> {
        self.state.lock().approvals.get(signature).copied()
    }

    pub fn is_approved_for_session(&self, signature: &CommandSignature) -> bool {
        self.lookup(signature) == Some(ApprovalDecision::ApprovedForSession)
    }

    /// Forget all decisions and failure streaks.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.approvals.clear();
        state.failures.clear();
    }

    pub fn note_failure(&self, signature: &CommandSignature) {
        let mut state = self.state.lock();
        let streak = state.failures.entry(signature.clone()).or_default();
        streak.failures += 1;
    }

    pub fn note_success(&self, signature: &CommandSignature) {
        self.state.lock().failures.remove(signature);
    }

    /// The retry was approved; under `first_retry` later retries in the same
    /// streak run without asking.
    pub fn acknowledge_retry(&self, signature: &CommandSignature) {
        if let Some(streak) = self.state.lock().failures.get_mut(signature) {
            streak.acknowledged = true;
        }
    }

    /// Number of consecutive failures when the next run of `signature` must
    /// be re-approved, `None` when it may proceed.
    pub fn failure_gate(
        &self,
        signature: &CommandSignature,
        reprompt: OnFailureReprompt,
    ) -> Option<u32> {
        let state = self.state.lock();
        let streak = state.failures.get(signature)?;
        match reprompt {
            OnFailureReprompt::EveryRetry => Some(streak.failures),
            OnFailureReprompt::FirstRetry if !streak.acknowledged => Some(streak.failures),
            OnFailureReprompt::FirstRetry => None,
        }
    }
}

/// Sessions by id. Each id maps to exactly one [`ExecSession`].
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<ExecSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_insert_with(
        &self,
        id: &str,
        create: impl FnOnce() -> ExecSession,
    ) -> Arc<ExecSession> {
        let mut sessions = self.sessions.lock();
        if let Some(existing) = sessions.get(id) {
            return Arc::clone(existing);
        }
        let session = Arc::new(create());
        sessions.insert(id.to_owned(), Arc::clone(&session));
        session
    }

    pub fn get(&self, id: &str) -> Option<Arc<ExecSession>> {
        self.sessions.lock().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<ExecSession>> {
        self.sessions.lock().remove(id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.sessions.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_safety::parse_command;

    fn signature(raw: &str) -> CommandSignature {
        CommandSignature::from_request(&parse_command(raw, "/", None).expect("parse"))
    }

    #[test]
    fn record_and_lookup_by_signature() {
        let memory = SessionMemory::new();
        memory.record(signature("cargo test -q"), ApprovalDecision::ApprovedForSession);

        assert!(memory.is_approved_for_session(&signature("cargo build -q")));
        assert!(!memory.is_approved_for_session(&signature("cargo test")));
        assert_eq!(memory.lookup(&signature("make")), None);
    }

    #[test]
    fn reset_clears_everything() {
        let memory = SessionMemory::new();
        let sig = signature("make");
        memory.record(sig.clone(), ApprovalDecision::ApprovedForSession);
        memory.note_failure(&sig);
        memory.reset();
        assert_eq!(memory.lookup(&sig), None);
        assert_eq!(memory.failure_gate(&sig, OnFailureReprompt::EveryRetry), None);
    }

    #[test]
    fn first_retry_gates_once_per_streak() {
        let memory = SessionMemory::new();
        let sig = signature("make test");
        assert_eq!(memory.failure_gate(&sig, OnFailureReprompt::FirstRetry), None);

        memory.note_failure(&sig);
        assert_eq!(memory.failure_gate(&sig, OnFailureReprompt::FirstRetry), Some(1));
        // a denied retry leaves the gate closed
        assert_eq!(memory.failure_gate(&sig, OnFailureReprompt::FirstRetry), Some(1));

        memory.acknowledge_retry(&sig);
        memory.note_failure(&sig);
        assert_eq!(memory.failure_gate(&sig, OnFailureReprompt::FirstRetry), None);
        assert_eq!(memory.failure_gate(&sig, OnFailureReprompt::EveryRetry), Some(2));

        memory.note_success(&sig);
        assert_eq!(memory.failure_gate(&sig, OnFailureReprompt::EveryRetry), None);
    }
}
