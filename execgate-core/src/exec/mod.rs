//! Command execution and structured results.

mod engine;
mod result;

pub use engine::ExecutionEngine;
pub use result::{EXIT_COMMAND_NOT_FOUND, ExecutionOutcome, ExecutionResult, ExecutionRun};
