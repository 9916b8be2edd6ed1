//! Approval gating
//!
//! Every command passes through [`ApprovalGatekeeper::evaluate`] before it is
//! spawned. The gatekeeper weighs the approval mode against the session's
//! remembered decisions and asks the [`ApprovalPrompt`] collaborator when a
//! human decision is required.

mod approval;
mod gatekeeper;
mod prompt;

pub use approval::{ApprovalDecision, ApprovalRequest};
pub use gatekeeper::{ApprovalGatekeeper, GateEvaluation, GateInput, GateState, GateTrail};
pub use prompt::{ApprovalPrompt, StaticPrompt};
