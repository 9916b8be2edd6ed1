//! Command invocation types, before and after sandbox wrapping.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::platform::SandboxMechanism;
use super::policy::SandboxPolicy;
use crate::command_safety::CommandRequest;

/// Shell used for requests that need operators, redirections or expansion.
pub const SHELL_PROGRAM: &str = "/bin/sh";

/// The unwrapped program and arguments a request resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl CommandInvocation {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Direct argv when possible, `/bin/sh -c <raw>` otherwise.
    pub fn from_request(request: &CommandRequest) -> Self {
        if request.requires_shell() {
            return Self::new(SHELL_PROGRAM, &request.cwd)
                .with_args(["-c", request.raw.as_str()]);
        }
        let argv = request.argv();
        let (program, args) = argv
            .split_first()
            .map_or(("", &[][..]), |(program, rest)| (program.as_str(), rest));
        Self::new(program, &request.cwd).with_args(args.iter().cloned())
    }
}

/// What the execution engine actually spawns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub policy: SandboxPolicy,
    /// Wrapper the command runs under; `None` for direct execution.
    pub mechanism: Option<SandboxMechanism>,
    /// The command as it would run without a wrapper.
    pub inner: CommandInvocation,
}

impl WrappedInvocation {
    pub fn direct(invocation: CommandInvocation, policy: SandboxPolicy) -> Self {
        Self {
            program: invocation.program.clone(),
            args: invocation.args.clone(),
            cwd: invocation.cwd.clone(),
            policy,
            mechanism: None,
            inner: invocation,
        }
    }

    pub fn is_sandboxed(&self) -> bool {
        self.mechanism.is_some()
    }

    /// Rendered command line, for logs.
    pub fn display_command(&self) -> String {
        let words =
            std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        shell_words::join(words)
    }
}
