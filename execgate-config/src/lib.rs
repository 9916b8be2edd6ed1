//! Configuration types and loader for execgate.
//!
//! The configuration is a single TOML document with four optional tables:
//! `[approval]`, `[sandbox]`, `[safety]` and `[execution]`. Missing tables and
//! keys fall back to the built-in defaults in [`constants::defaults`].
//!
//! ```toml
//! [approval]
//! mode = "on_request"
//! session_approvals = true
//!
//! [sandbox]
//! default_mode = "workspace_write"
//! writable_roots = ["/tmp"]
//! ```

pub mod constants;
pub mod core;
pub mod error;
pub mod loader;

pub use crate::core::{
    ApprovalConfig, ApprovalMode, ExecutionConfig, OnFailureReprompt, SafetyConfig, SandboxConfig,
    SandboxMode,
};
pub use error::ConfigError;
pub use loader::{ConfigManager, ExecGateConfig};
