use execgate_config::ConfigError;

/// Fatal misconfiguration detected while building an [`crate::ExecGate`].
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("invalid dangerous pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}
