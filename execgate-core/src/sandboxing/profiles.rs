//! Per-mechanism wrapper generators.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::SandboxError;
use super::exec_env::CommandInvocation;
use super::platform::MechanismKind;
use super::policy::SandboxPolicy;

/// Renders the wrapper arguments for one mechanism.
pub trait ProfileGenerator: Send + Sync + fmt::Debug {
    fn kind(&self) -> MechanismKind;

    /// Arguments for the mechanism executable that run `invocation` under
    /// `policy`. `writable_roots` is already normalized.
    fn wrap(
        &self,
        invocation: &CommandInvocation,
        policy: &SandboxPolicy,
        writable_roots: &[PathBuf],
    ) -> Result<Vec<String>, SandboxError>;

    /// True when a non-zero run was the wrapper failing to start, not the
    /// wrapped command failing.
    fn is_launch_failure(&self, exit_code: Option<i32>, stderr: &str) -> bool;
}

/// A wrapper that fails during setup never runs the child, so its stderr
/// holds nothing but its own diagnostics.
fn only_wrapper_lines(stderr: &str, prefix: &str, child_error: &str) -> bool {
    let mut lines = stderr.lines().filter(|line| !line.trim().is_empty()).peekable();
    lines.peek().is_some()
        && lines.all(|line| line.starts_with(prefix) && !line.contains(child_error))
}

fn path_arg(path: &Path) -> Result<String, SandboxError> {
    path.to_str().map(str::to_owned).ok_or_else(|| {
        SandboxError::InvalidPolicy(format!("path is not valid UTF-8: {}", path.display()))
    })
}

/// macOS `sandbox-exec -p <profile>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeatbeltProfile;

impl SeatbeltProfile {
    pub fn render_profile(writable_roots: &[PathBuf]) -> Result<String, SandboxError> {
        let mut profile = String::from("(version 1)\n(deny default)\n");
        profile.push_str("(allow process-exec)\n(allow process-fork)\n");
        profile.push_str("(allow signal (target same-sandbox))\n");
        profile.push_str("(allow sysctl-read)\n(allow mach-lookup)\n");
        profile.push_str("(allow network*)\n");
        profile.push_str("(allow file-read*)\n");
        profile.push_str("(allow file-write* (literal \"/dev/null\"))\n");
        for root in writable_roots {
            let root = path_arg(root)?;
            if root.contains(['"', '\\']) {
                return Err(SandboxError::InvalidPolicy(format!(
                    "writable root cannot be expressed in a seatbelt profile: {root}"
                )));
            }
            profile.push_str(&format!("(allow file-write* (subpath \"{root}\"))\n"));
        }
        Ok(profile)
    }
}

impl ProfileGenerator for SeatbeltProfile {
    fn kind(&self) -> MechanismKind {
        MechanismKind::Seatbelt
    }

    fn wrap(
        &self,
        invocation: &CommandInvocation,
        _policy: &SandboxPolicy,
        writable_roots: &[PathBuf],
    ) -> Result<Vec<String>, SandboxError> {
        let mut args = vec!["-p".to_owned(), Self::render_profile(writable_roots)?];
        args.push(invocation.program.clone());
        args.extend(invocation.args.iter().cloned());
        Ok(args)
    }

    fn is_launch_failure(&self, exit_code: Option<i32>, stderr: &str) -> bool {
        exit_code.is_some_and(|code| code != 0)
            && only_wrapper_lines(stderr, "sandbox-exec:", "execvp")
    }
}

/// Linux `bwrap` with a read-only root and bind-mounted writable roots.
#[derive(Debug, Clone, Copy, Default)]
pub struct BubblewrapProfile;

impl ProfileGenerator for BubblewrapProfile {
    fn kind(&self) -> MechanismKind {
        MechanismKind::Bubblewrap
    }

    fn wrap(
        &self,
        invocation: &CommandInvocation,
        _policy: &SandboxPolicy,
        writable_roots: &[PathBuf],
    ) -> Result<Vec<String>, SandboxError> {
        let mut args: Vec<String> = [
            "--die-with-parent",
            "--new-session",
            "--unshare-pid",
            "--ro-bind",
            "/",
            "/",
            "--dev",
            "/dev",
        ]
        .into_iter()
        .map(str::to_owned)
        .collect();

        for root in writable_roots {
            let root = path_arg(root)?;
            args.push("--bind".to_owned());
            args.push(root.clone());
            args.push(root);
        }

        args.extend(["--proc".to_owned(), "/proc".to_owned()]);
        args.push("--chdir".to_owned());
        args.push(path_arg(&invocation.cwd)?);
        args.push("--".to_owned());
        args.push(invocation.program.clone());
        args.extend(invocation.args.iter().cloned());
        Ok(args)
    }

    fn is_launch_failure(&self, exit_code: Option<i32>, stderr: &str) -> bool {
        // bwrap reports its own setup errors as `bwrap: ...` with status 1;
        // `execvp` errors mean the wrapped program is missing
        exit_code == Some(1) && only_wrapper_lines(stderr, "bwrap: ", "bwrap: execvp")
    }
}

/// Generators keyed by mechanism.
#[derive(Debug, Clone)]
pub struct SandboxRegistry {
    generators: HashMap<MechanismKind, Arc<dyn ProfileGenerator>>,
}

impl SandboxRegistry {
    pub fn empty() -> Self {
        Self {
            generators: HashMap::new(),
        }
    }

    /// Seatbelt and bubblewrap generators.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(SeatbeltProfile));
        registry.register(Arc::new(BubblewrapProfile));
        registry
    }

    /// Replaces any generator already registered for the same kind.
    pub fn register(&mut self, generator: Arc<dyn ProfileGenerator>) {
        self.generators.insert(generator.kind(), generator);
    }

    pub fn get(&self, kind: MechanismKind) -> Option<&Arc<dyn ProfileGenerator>> {
        self.generators.get(&kind)
    }
}

impl Default for SandboxRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
