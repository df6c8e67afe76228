use pare_policy::ValidatedCommand;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default cap on captured bytes per stream.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Exit code reported when the process could not be started at all.
pub const SPAWN_FAILED_EXIT_CODE: i32 = -1;

/// Typical runtimes of wrapped CLIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutClass {
    /// status/list/show style commands
    Quick,
    /// installs, linters
    Standard,
    /// test runners, builds
    Long,
}

impl TimeoutClass {
    pub fn duration(self) -> Duration {
        match self {
            TimeoutClass::Quick => Duration::from_secs(30),
            TimeoutClass::Standard => Duration::from_secs(120),
            TimeoutClass::Long => Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    command: ValidatedCommand,
    cwd: Option<PathBuf>,
    timeout: Duration,
    max_output_bytes: usize,
    envs: BTreeMap<String, String>,
}

impl ExecutionRequest {
    pub fn new(command: ValidatedCommand) -> Self {
        Self {
            command,
            cwd: None,
            timeout: TimeoutClass::Quick.duration(),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            envs: BTreeMap::new(),
        }
    }

    /// Working directory. Callers pass a path already checked by `RootConfinement`.
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout_ms(self, ms: u64) -> Self {
        self.timeout(Duration::from_millis(ms))
    }

    pub fn max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.insert(key.into(), value.into());
        self
    }

    pub fn command(&self) -> &ValidatedCommand {
        &self.command
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn timeout_duration(&self) -> Duration {
        self.timeout
    }

    pub fn output_limit(&self) -> usize {
        self.max_output_bytes
    }

    pub fn envs(&self) -> &BTreeMap<String, String> {
        &self.envs
    }
}

/// Outcome of one process run. Built once by the executor; read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    exit_code: i32,
    stdout: String,
    stderr: String,
    duration_ms: u64,
    timed_out: bool,
    stdout_truncated: bool,
    stderr_truncated: bool,
    spawn_failed: bool,
}

pub(crate) struct Streams {
    pub stdout: String,
    pub stdout_truncated: bool,
    pub stderr: String,
    pub stderr_truncated: bool,
}

impl ExecutionResult {
    /// A result for a process run by some other [`CommandRunner`](crate::CommandRunner).
    pub fn new(
        exit_code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        duration: Duration,
        timed_out: bool,
    ) -> Self {
        let streams = Streams {
            stdout: stdout.into(),
            stdout_truncated: false,
            stderr: stderr.into(),
            stderr_truncated: false,
        };
        Self::finished(exit_code, streams, duration, timed_out)
    }

    pub(crate) fn finished(exit_code: i32, streams: Streams, duration: Duration, timed_out: bool) -> Self {
        Self {
            exit_code,
            stdout: streams.stdout,
            stderr: streams.stderr,
            duration_ms: duration.as_millis() as u64,
            timed_out,
            stdout_truncated: streams.stdout_truncated,
            stderr_truncated: streams.stderr_truncated,
            spawn_failed: false,
        }
    }

    pub(crate) fn from_spawn_error(program: &str, error: &std::io::Error, duration: Duration) -> Self {
        let reason = match error.kind() {
            std::io::ErrorKind::NotFound => format!("Command not found: {program}"),
            std::io::ErrorKind::PermissionDenied => format!("Command not executable: {program}"),
            _ => format!("Failed to start {program}: {error}"),
        };
        Self {
            exit_code: SPAWN_FAILED_EXIT_CODE,
            stdout: String::new(),
            stderr: reason,
            duration_ms: duration.as_millis() as u64,
            timed_out: false,
            stdout_truncated: false,
            stderr_truncated: false,
            spawn_failed: true,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out && !self.spawn_failed
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    pub fn stdout_truncated(&self) -> bool {
        self.stdout_truncated
    }

    pub fn stderr_truncated(&self) -> bool {
        self.stderr_truncated
    }

    pub fn spawn_failed(&self) -> bool {
        self.spawn_failed
    }

    pub fn summary(&self) -> String {
        if self.timed_out {
            format!("Timeout after {}ms", self.duration_ms)
        } else if self.spawn_failed {
            format!("Spawn failed: {}", self.stderr)
        } else if self.success() {
            format!("Success ({}ms, {} bytes output)", self.duration_ms, self.stdout.len())
        } else {
            format!(
                "Failed (exit code: {}, {}ms, {} bytes output)",
                self.exit_code,
                self.duration_ms,
                self.stdout.len() + self.stderr.len()
            )
        }
    }
}
