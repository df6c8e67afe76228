//! Process execution for the pare tool servers.
//!
//! Runs an already validated command as a direct child process with a timeout, bounded
//! output capture and process-group cleanup, then hands back a structured result.

mod capture;
pub mod command_executor;
pub mod request;
pub mod sanitizer;

pub use command_executor::{CommandRunner, ProcessExecutor, DEFAULT_DRAIN_GRACE, DEFAULT_KILL_GRACE};
pub use request::{
    ExecutionRequest, ExecutionResult, TimeoutClass, DEFAULT_MAX_OUTPUT_BYTES, SPAWN_FAILED_EXIT_CODE,
};
pub use sanitizer::{strip_ansi, OutputSanitizer, REDACTED};
