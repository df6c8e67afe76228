use super::print_json;
use anyhow::Result;
use pare_executor::ProcessExecutor;
use pare_tools::{CallRequest, Dispatcher, ToolRegistry};
use std::sync::Arc;
use tracing::info;

/// Exit status when the tool ran and reported success.
pub const EXIT_OK: i32 = 0;
/// The tool ran and failed (non-zero exit, timeout, spawn failure).
pub const EXIT_TOOL_FAILED: i32 = 1;
/// The call was refused before anything ran.
pub const EXIT_REFUSED: i32 = 2;

pub async fn run(registry: Arc<ToolRegistry>, server: &str, tool: &str, request: CallRequest) -> Result<i32> {
    let dispatcher = Dispatcher::new(registry, Arc::new(ProcessExecutor::new()));

    match dispatcher.dispatch(server, tool, request).await {
        Ok(outcome) => {
            let success = outcome.result["success"].as_bool().unwrap_or(false);
            info!(server, tool, success, chosen = ?outcome.compaction.chosen, "Call finished");
            print_json(&outcome)?;
            Ok(if success { EXIT_OK } else { EXIT_TOOL_FAILED })
        }
        Err(e) => {
            print_json(&e.to_report())?;
            Ok(EXIT_REFUSED)
        }
    }
}
