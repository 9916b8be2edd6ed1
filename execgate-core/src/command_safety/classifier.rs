use std::collections::HashSet;
use std::fmt;

use execgate_config::SafetyConfig;
use regex::RegexSet;
use serde::{Deserialize, Serialize};

use super::parser::{CommandRequest, CommandSegment, parse_command};
use crate::error::GateError;

/// Static risk assessment of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyVerdict {
    KnownSafe,
    Unknown,
    KnownDangerous,
}

impl SafetyVerdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KnownSafe => "known_safe",
            Self::Unknown => "unknown",
            Self::KnownDangerous => "known_dangerous",
        }
    }
}

impl fmt::Display for SafetyVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const PRIVILEGE_WRAPPERS: &[&str] = &["sudo", "doas"];
const SHELL_WRAPPERS: &[&str] = &["sh", "bash", "zsh", "dash"];

/// Nested `sh -c` scripts deeper than this are treated as dangerous.
pub(super) const MAX_NESTED_SCRIPTS: usize = 4;

/// Classifies parsed commands against the configured command lists and
/// dangerous-token patterns. Classification is pure; the same request
/// always yields the same verdict.
#[derive(Debug, Clone)]
pub struct SafetyClassifier {
    known_safe: HashSet<String>,
    dangerous: HashSet<String>,
    patterns: RegexSet,
}

impl SafetyClassifier {
    pub fn new(config: &SafetyConfig) -> Result<Self, GateError> {
        for pattern in &config.dangerous_patterns {
            regex::Regex::new(pattern).map_err(|source| GateError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
        }
        let patterns = RegexSet::new(&config.dangerous_patterns).map_err(|source| {
            GateError::InvalidPattern {
                pattern: config.dangerous_patterns.join(" | "),
                source,
            }
        })?;

        Ok(Self {
            known_safe: config.known_safe_commands.iter().cloned().collect(),
            dangerous: config.dangerous_commands.iter().cloned().collect(),
            patterns,
        })
    }

    pub fn classify(&self, request: &CommandRequest) -> SafetyVerdict {
        self.classify_depth(request, 0)
    }

    fn classify_depth(&self, request: &CommandRequest, depth: usize) -> SafetyVerdict {
        if let Some(token) = request
            .scan_tokens()
            .into_iter()
            .find(|token| self.patterns.is_match(token))
        {
            tracing::debug!(%token, "dangerous pattern matched");
            return SafetyVerdict::KnownDangerous;
        }

        if request
            .segments
            .iter()
            .any(|segment| self.segment_is_dangerous(segment))
        {
            return SafetyVerdict::KnownDangerous;
        }

        // `sh -c '<script>'` is judged by its script as well
        let mut nested = SafetyVerdict::KnownSafe;
        for segment in &request.segments {
            let Some(script) = nested_script(segment) else {
                continue;
            };
            if depth >= MAX_NESTED_SCRIPTS {
                return SafetyVerdict::KnownDangerous;
            }
            match parse_command(script, &request.cwd, None) {
                Ok(inner) => match self.classify_depth(&inner, depth + 1) {
                    SafetyVerdict::KnownDangerous => return SafetyVerdict::KnownDangerous,
                    SafetyVerdict::Unknown => nested = SafetyVerdict::Unknown,
                    SafetyVerdict::KnownSafe => {}
                },
                Err(_) => nested = SafetyVerdict::Unknown,
            }
        }

        let all_known_safe = request
            .segments
            .iter()
            .all(|segment| self.known_safe.contains(basename(segment.program())));
        if all_known_safe && nested == SafetyVerdict::KnownSafe {
            SafetyVerdict::KnownSafe
        } else {
            SafetyVerdict::Unknown
        }
    }

    fn segment_is_dangerous(&self, segment: &CommandSegment) -> bool {
        let mut argv = segment.argv.as_slice();
        loop {
            let Some(program) = argv.first() else {
                return false;
            };
            let name = basename(program);
            if self.dangerous.contains(name) {
                return true;
            }
            if !PRIVILEGE_WRAPPERS.contains(&name) {
                return false;
            }
            argv = unwrap_privileged(&argv[1..]);
        }
    }
}

/// Skip the option block of `sudo`/`doas` to reach the wrapped command.
fn unwrap_privileged(args: &[String]) -> &[String] {
    let mut idx = 0;
    while let Some(arg) = args.get(idx) {
        match arg.as_str() {
            "--" => return &args[idx + 1..],
            "-u" | "-g" | "-C" | "-D" | "-h" | "-p" | "-r" | "-t" | "-U" => idx += 2,
            flag if flag.starts_with('-') => idx += 1,
            _ => break,
        }
    }
    args.get(idx..).unwrap_or_default()
}

pub(super) fn nested_script(segment: &CommandSegment) -> Option<&str> {
    let program = basename(segment.program());
    if !SHELL_WRAPPERS.contains(&program) {
        return None;
    }
    let mut args = segment.argv.iter().skip(1);
    while let Some(arg) = args.next() {
        if arg.starts_with('-') && !arg.starts_with("--") && arg.contains('c') {
            return args.next().map(String::as_str);
        }
        if !arg.starts_with('-') {
            return None;
        }
    }
    None
}

pub(crate) fn basename(program: &str) -> &str {
    program.rsplit('/').next().unwrap_or(program)
}
