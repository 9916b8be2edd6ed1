//! Command parsing and static safety classification
//!
//! Commands arrive as raw shell text. [`parse_command`] turns them into a
//! [`CommandRequest`], [`SafetyClassifier`] assigns a [`SafetyVerdict`], and
//! [`CommandSignature`] gives the normalized key used by session memory.

mod classifier;
mod parser;
mod signature;

pub use classifier::{SafetyClassifier, SafetyVerdict};
pub use parser::{
    CommandRequest, CommandSegment, Operator, ParseError, Redirection, RedirectionKind,
    parse_command,
};
pub use signature::{CommandSignature, SegmentSignature};
