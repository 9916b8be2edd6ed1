use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::classifier::{MAX_NESTED_SCRIPTS, basename, nested_script};
use super::parser::{CommandRequest, CommandSegment, Operator, parse_command};

/// Normalized identity of one simple command: program basename plus its flags.
///
/// `embedded` holds code the segment runs beyond its own program: the
/// signature of a `sh -c` script, and every word carrying a command
/// substitution, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentSignature {
    pub program: String,
    pub flags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub embedded: BTreeSet<String>,
}

impl SegmentSignature {
    fn from_segment(segment: &CommandSegment, depth: usize) -> Self {
        let mut embedded: BTreeSet<String> = segment
            .argv
            .iter()
            .chain(segment.env.iter().map(|(_, value)| value))
            .filter(|word| word.contains("$(") || word.contains('`'))
            .cloned()
            .collect();
        if let Some(script) = nested_script(segment) {
            let inner = match parse_command(script, "/", None) {
                Ok(inner) if depth < MAX_NESTED_SCRIPTS => {
                    CommandSignature::at_depth(&inner, depth + 1).to_string()
                }
                _ => script.to_owned(),
            };
            embedded.insert(inner);
        }


        let mut flags = BTreeSet::new();
        for arg in segment.argv.iter().skip(1) {
            if arg == "--" {
                break;
            }
            if arg == "-" || !arg.starts_with('-') {
                continue;
            }
            if let Some(long) = arg.strip_prefix("--") {
                let name = long.split_once('=').map_or(long, |(name, _)| name);
                flags.insert(format!("--{name}"));
            } else if arg[1..].chars().all(|c| c.is_ascii_alphabetic()) {
                flags.extend(arg[1..].chars().map(|c| format!("-{c}")));
            } else {
                flags.insert(arg.clone());
            }
        }
        Self {
            program: basename(segment.program()).to_owned(),
            flags,
            embedded,
        }
    }
}

impl fmt::Display for SegmentSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for flag in &self.flags {
            write!(f, " {flag}")?;
        }
        for entry in &self.embedded {
            write!(f, " [{entry}]")?;
        }
        Ok(())
    }
}

/// Key under which session approvals and failure streaks are stored.
///
/// Two commands share a signature when they run the same programs, joined by
/// the same operators, with the same set of flags. Literal arguments and
/// redirection targets do not participate, so `ls -la src` and `ls -al docs`
/// are the same command for approval purposes. Arguments that run code do
/// participate: `sh -c` scripts and words containing `$(...)` or backticks
/// are part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandSignature {
    pub segments: Vec<SegmentSignature>,
    pub operators: Vec<Operator>,
}

impl CommandSignature {
    pub fn from_request(request: &CommandRequest) -> Self {
        Self::at_depth(request, 0)
    }

    fn at_depth(request: &CommandRequest, depth: usize) -> Self {
        Self {
            segments: request
                .segments
                .iter()
                .map(|segment| SegmentSignature::from_segment(segment, depth))
                .collect(),
            operators: request.operators.clone(),
        }
    }
}

impl fmt::Display for CommandSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, segment) in self.segments.iter().enumerate() {
            if idx > 0 {
                let op = self
                    .operators
                    .get(idx - 1)
                    .copied()
                    .unwrap_or(Operator::Sequence);
                write!(f, " {op} ")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}
