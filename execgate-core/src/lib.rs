//! # execgate-core - sandboxed, approval-gated command execution
//!
//! `execgate-core` sits between an automated caller (typically an LLM agent)
//! and the shell. Every command goes through the same pipeline:
//!
//! - **Parse**: `command_safety` lexes the text into a `CommandRequest`,
//!   rejecting syntax it cannot reason about.
//! - **Classify**: the `SafetyClassifier` assigns `KnownSafe`, `Unknown` or
//!   `KnownDangerous` from configurable command lists and token patterns.
//! - **Approve**: `exec_policy` applies the approval mode, consults the
//!   session's memory and asks an `ApprovalPrompt` when needed.
//! - **Sandbox**: `sandboxing` wraps the command in seatbelt or bubblewrap
//!   for the requested tier, failing closed when no mechanism exists.
//! - **Execute**: `exec` spawns it with bounded output, a timeout and
//!   process-group cleanup, and reports an `ExecutionResult`.
//!
//! ## Quickstart
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use execgate_core::{ExecGate, StaticPrompt};
//! use execgate_config::ExecGateConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let gate = ExecGate::builder(ExecGateConfig::load_default()?)
//!         .prompt(Arc::new(StaticPrompt::approve()))
//!         .build()?;
//!
//!     let result = gate
//!         .session("agent-1")
//!         .execute("ls -la", "/tmp", None, None)
//!         .await;
//!     println!("{}", result.to_model_output());
//!     Ok(())
//! }
//! ```

pub mod command_safety;
pub mod error;
pub mod exec;
pub mod exec_policy;
pub mod gate;
pub mod sandboxing;
pub mod session;

pub use command_safety::{
    CommandRequest, CommandSignature, ParseError, SafetyClassifier, SafetyVerdict, parse_command,
};
pub use error::GateError;
pub use exec::{ExecutionEngine, ExecutionOutcome, ExecutionResult};
pub use exec_policy::{
    ApprovalDecision, ApprovalGatekeeper, ApprovalPrompt, ApprovalRequest, StaticPrompt,
};
pub use gate::{ExecGate, ExecGateBuilder, ExecSession};
pub use sandboxing::{
    MechanismKind, PlatformCapabilities, SandboxError, SandboxManager, SandboxMechanism,
    SandboxPolicy, SandboxRegistry,
};
pub use session::{SessionMemory, SessionRegistry};
