pub mod approval;
pub mod execution;
pub mod safety;
pub mod sandbox;

pub use approval::{ApprovalConfig, ApprovalMode, OnFailureReprompt};
pub use execution::ExecutionConfig;
pub use safety::SafetyConfig;
pub use sandbox::{SandboxConfig, SandboxMode};
