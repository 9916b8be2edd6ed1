//! Sandbox policy engine
//!
//! Maps a [`SandboxPolicy`] tier onto whatever isolation mechanism the host
//! provides (seatbelt on macOS, bubblewrap on Linux). When no mechanism is
//! available for a restricted tier the transform fails with
//! [`SandboxError::Unavailable`]; it never silently runs the command
//! unsandboxed.

mod exec_env;
mod manager;
mod platform;
mod policy;
mod profiles;

use execgate_config::SandboxMode;

pub use exec_env::{CommandInvocation, SHELL_PROGRAM, WrappedInvocation};
pub use manager::SandboxManager;
pub use platform::{MechanismKind, PlatformCapabilities, SandboxMechanism};
pub use policy::SandboxPolicy;
pub use profiles::{BubblewrapProfile, ProfileGenerator, SandboxRegistry, SeatbeltProfile};

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("no sandbox mechanism available for {policy} on {platform}; install {missing}")]
    Unavailable {
        policy: SandboxMode,
        platform: String,
        missing: String,
    },

    #[error("invalid sandbox policy: {0}")]
    InvalidPolicy(String),

    #[error("failed to serialize sandbox policy: {0}")]
    Serialization(#[from] serde_json::Error),
}
