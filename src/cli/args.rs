use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use execgate_config::{ApprovalMode, SandboxMode};
use execgate_core::ApprovalDecision;

#[derive(Debug, Parser)]
#[command(name = "execgate")]
#[command(about = "Run shell commands behind an approval gate and an OS sandbox")]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to $EXECGATE_CONFIG, then the user config dir)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log gate decisions and sandbox selection to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Classify, approve, sandbox and run a command
    Run(RunArgs),

    /// Parse and classify a command without running it
    Classify {
        /// Command text, as a single shell string
        command: String,

        /// Working directory used for parsing
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the sandbox mechanisms available on this host
    Sandbox {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Print the config file location instead
        #[arg(long)]
        path: bool,
    },
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Command to run; several words are joined with shell quoting
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Working directory (defaults to the current directory)
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Sandbox policy: read_only, workspace_write or danger_full_access
    #[arg(long)]
    pub policy: Option<SandboxMode>,

    /// Wall-clock timeout in milliseconds
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Approval mode: never, on_request, on_failure or unless_trusted
    #[arg(long)]
    pub approval_mode: Option<ApprovalMode>,

    /// Why the command is needed, shown in the approval prompt
    #[arg(long)]
    pub justification: Option<String>,

    /// Answer every approval prompt without asking
    #[arg(long, value_enum)]
    pub assume: Option<AssumeDecision>,

    /// Print the full result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AssumeDecision {
    Approve,
    Deny,
    Session,
}

impl From<AssumeDecision> for ApprovalDecision {
    fn from(value: AssumeDecision) -> Self {
        match value {
            AssumeDecision::Approve => Self::Approved,
            AssumeDecision::Deny => Self::Denied,
            AssumeDecision::Session => Self::ApprovedForSession,
        }
    }
}
