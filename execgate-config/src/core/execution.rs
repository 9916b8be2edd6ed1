use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::defaults;

/// Execution limits
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Wall-clock limit when the caller gives none (milliseconds)
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Per-stream capture limit for stdout and stderr (bytes)
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// Time between SIGTERM and SIGKILL when a command times out (milliseconds)
    #[serde(default = "default_kill_grace_period_ms")]
    pub kill_grace_period_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            max_output_bytes: default_max_output_bytes(),
            kill_grace_period_ms: default_kill_grace_period_ms(),
        }
    }
}

impl ExecutionConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn kill_grace_period(&self) -> Duration {
        Duration::from_millis(self.kill_grace_period_ms)
    }
}

const fn default_timeout_ms() -> u64 {
    defaults::DEFAULT_TIMEOUT_MS
}

const fn default_max_output_bytes() -> usize {
    defaults::DEFAULT_MAX_OUTPUT_BYTES
}

const fn default_kill_grace_period_ms() -> u64 {
    defaults::DEFAULT_KILL_GRACE_PERIOD_MS
}
