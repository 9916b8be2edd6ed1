//! Process plumbing for execgate.
//!
//! Spawns a single command in its own session and process group, enforces a
//! wall-clock timeout by tearing down the whole group, and captures stdout
//! and stderr into size-bounded buffers. Policy decisions (what may run, and
//! under which sandbox) live in `execgate-core`; this crate only runs what it
//! is handed.

pub mod capture;
pub mod pipe;
pub mod process_group;

pub use capture::BoundedBuffer;
pub use pipe::{BoundedOutput, PipeSpawnOptions, SpawnError, Termination, run_bounded};
pub use process_group::{
    DEFAULT_GRACEFUL_TIMEOUT_MS, KillSignal, ProcessGroupGuard, kill_process_group,
    process_group_is_alive,
};
