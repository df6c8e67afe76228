use crate::catalog::ToolSpec;
use crate::compaction::{self, CompactMode, CompactionChoice, Reducer};
use crate::error::CallError;
use crate::registry::ToolRegistry;
use pare_executor::{
    strip_ansi, CommandRunner, ExecutionRequest, ExecutionResult, OutputSanitizer,
    DEFAULT_MAX_OUTPUT_BYTES,
};
use pare_policy::{CommandValidator, PolicyViolation, RootConfinement, ServerConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Per-call input as sent by the transport layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CallRequest {
    /// Executable to run instead of the tool's default. Still subject to the allowlist.
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub compact: CompactMode,
}

/// Generic result shape before any tool-specific parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub success: bool,
    pub exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    /// Milliseconds.
    pub duration: u64,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSummary {
    pub success: bool,
    pub exit_code: i32,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl CommandResponse {
    /// Strip ANSI escapes from both streams; on failure, also redact paths in stderr.
    pub fn from_result(result: &ExecutionResult, sanitizer: &OutputSanitizer, warnings: Vec<String>) -> Self {
        let stdout = strip_ansi(result.stdout()).into_owned();
        let mut stderr = strip_ansi(result.stderr()).into_owned();
        if !result.success() {
            stderr = sanitizer.sanitize(&stderr);
        }
        Self {
            success: result.success(),
            exit_code: result.exit_code(),
            stdout: Some(stdout).filter(|s| !s.is_empty()),
            stderr: Some(stderr).filter(|s| !s.is_empty()),
            duration: result.duration_ms(),
            timed_out: result.timed_out(),
            warnings,
        }
    }
}

impl Reducer for CommandResponse {
    type Full = CommandResponse;
    type Compact = CommandSummary;

    fn to_full(&self) -> CommandResponse {
        self.clone()
    }

    fn to_compact(&self) -> CommandSummary {
        CommandSummary {
            success: self.success,
            exit_code: self.exit_code,
            timed_out: self.timed_out,
            stderr: if self.success { None } else { self.stderr.clone() },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOutcome {
    pub server: String,
    pub tool: String,
    pub compaction: CompactionChoice,
    pub result: Value,
}

/// Runs one call through the whole pipeline: registry gate, policy checks, execution,
/// sanitization and compaction.
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    runner: Arc<dyn CommandRunner>,
    max_output_bytes: usize,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            registry,
            runner,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    pub fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub async fn dispatch(&self, server: &str, tool: &str, request: CallRequest) -> Result<CallOutcome, CallError> {
        self.dispatch_with(server, tool, request, |response| response).await
    }

    /// Like [`Dispatcher::dispatch`], with `parse` turning the generic response into a
    /// tool-specific result before compaction.
    pub async fn dispatch_with<R, F>(
        &self,
        server: &str,
        tool: &str,
        request: CallRequest,
        parse: F,
    ) -> Result<CallOutcome, CallError>
    where
        R: Reducer,
        F: FnOnce(CommandResponse) -> R,
    {
        let mode = request.compact;
        let response = self.execute(server, tool, &request).await?;
        let compacted = compaction::compact(&parse(response), mode)?;
        Ok(CallOutcome {
            server: server.to_string(),
            tool: tool.to_string(),
            compaction: compacted.choice,
            result: compacted.value,
        })
    }

    /// Everything up to, and including, running the process.
    pub async fn execute(&self, server: &str, tool: &str, request: &CallRequest) -> Result<CommandResponse, CallError> {
        let Some((spec, config)) = self.registry.get(server, tool) else {
            warn!(server, tool, "Call to unknown or disabled tool");
            return Err(CallError::ToolNotFound {
                server: server.to_string(),
                tool: tool.to_string(),
            });
        };
        if request.timeout_ms == Some(0) {
            return Err(CallError::InvalidRequest("timeoutMs must be positive".into()));
        }

        let sanitizer = OutputSanitizer::for_server(&config);
        let execution = self
            .prepare(spec, &config, request)
            .map_err(|violation| policy_error(&violation, &sanitizer))?;
        let warnings = execution.command().warnings().to_vec();

        info!(server, tool, "Dispatching");
        let result = self.runner.run(&execution).await;
        Ok(CommandResponse::from_result(&result, &sanitizer, warnings))
    }

    fn prepare(
        &self,
        spec: &ToolSpec,
        config: &ServerConfig,
        request: &CallRequest,
    ) -> Result<ExecutionRequest, PolicyViolation> {
        let program = request.command.as_deref().unwrap_or(spec.program);
        let command = request.args.iter().enumerate().try_fold(
            CommandValidator::new(&config.policy)
                .command(program)?
                .args(spec.args.iter().copied()),
            |cmd, (idx, value)| cmd.user_arg(&format!("args[{idx}]"), value),
        )?;

        let guard = RootConfinement::new(&config.policy);
        let restricted = !config.policy.allowed_roots.is_unrestricted();
        let cwd = match &request.cwd {
            Some(dir) => Some(guard.check_dir(dir)?),
            None if restricted => {
                let here = std::env::current_dir().map_err(|e| {
                    PolicyViolation::PathOutsideAllowedRoots(format!("<current directory>: {e}"))
                })?;
                Some(guard.check_dir(here)?)
            }
            None => None,
        };

        if restricted {
            let base = cwd.clone().unwrap_or_default();
            let paths = request.args.iter().enumerate().filter(|(idx, _)| spec.path_args.is_path(*idx));
            for (_, value) in paths {
                let path = Path::new(value);
                if path.is_absolute() {
                    guard.check_path(path)?;
                } else {
                    guard.check_path(base.join(path))?;
                }
            }
        }

        let timeout = request
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| spec.timeout.duration());
        let mut execution = ExecutionRequest::new(command)
            .timeout(timeout)
            .max_output_bytes(self.max_output_bytes);
        if let Some(dir) = cwd {
            execution = execution.cwd(dir);
        }
        Ok(execution)
    }
}

fn policy_error(violation: &PolicyViolation, sanitizer: &OutputSanitizer) -> CallError {
    let report = violation.to_report();
    CallError::Policy {
        kind: report.kind,
        message: sanitizer.sanitize(&report.message),
    }
}
