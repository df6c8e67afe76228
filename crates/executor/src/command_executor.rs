use crate::capture::{self, SharedBuffer};
use crate::request::{ExecutionRequest, ExecutionResult, Streams, SPAWN_FAILED_EXIT_CODE};
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// How long a process gets between SIGTERM and SIGKILL.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

/// How long readers may keep draining pipes after the process itself has exited.
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Seam between the call pipeline and the OS, so the pipeline can be tested with a mock.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, request: &ExecutionRequest) -> ExecutionResult;
}

/// Runs validated requests as direct child processes (never through a shell).
///
/// Each call owns its child handle and buffers; the executor itself holds only durations and
/// can be shared freely between concurrent calls.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    kill_grace: Duration,
    drain_grace: Duration,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self {
            kill_grace: DEFAULT_KILL_GRACE,
            drain_grace: DEFAULT_DRAIN_GRACE,
        }
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    pub fn kill_grace(&self) -> Duration {
        self.kill_grace
    }

    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        let program = request.command().program();
        let argv = request.command().argv();
        info!(
            command = program,
            args = argv.len(),
            timeout_ms = request.timeout_duration().as_millis() as u64,
            "Executing"
        );

        let mut cmd = Command::new(program);
        cmd.args(argv)
            .envs(request.envs())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = request.working_dir() {
            cmd.current_dir(dir);
        }

        // New session, so the child leads a process group we can signal as a whole.
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let start = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(command = program, error = %e, "Spawn failed");
                return ExecutionResult::from_spawn_error(program, &e, start.elapsed());
            }
        };
        let pid = child.id();
        let mut guard = GroupGuard::new(pid);

        let limit = request.output_limit();
        let (stdout_buf, stdout_task) = capture::spawn_reader(child.stdout.take(), limit);
        let (stderr_buf, stderr_task) = capture::spawn_reader(child.stderr.take(), limit);

        let mut wait_error = None;
        let (status, timed_out) = match timeout(request.timeout_duration(), child.wait()).await {
            Ok(Ok(status)) => (Some(status), false),
            Ok(Err(e)) => {
                error!(command = program, error = %e, "Waiting for process failed, killing process group");
                let status = self.kill_and_reap(&mut child, pid).await;
                wait_error = Some(e);
                (status, false)
            }
            Err(_) => {
                warn!(
                    command = program,
                    timeout_ms = request.timeout_duration().as_millis() as u64,
                    "Command timed out, terminating process group"
                );
                (self.terminate(&mut child, pid).await, true)
            }
        };
        let duration = start.elapsed();

        let mut streams = self
            .collect(pid, (stdout_buf, stdout_task), (stderr_buf, stderr_task))
            .await;
        guard.disarm();

        let exit_code = status.map(exit_code_of).unwrap_or(WAIT_FAILED_EXIT_CODE);
        if let Some(e) = wait_error {
            append_wait_error(&mut streams.stderr, program, &e);
        }

        let result = ExecutionResult::finished(exit_code, streams, duration, timed_out);
        info!(command = program, summary = %result.summary(), "Command finished");
        result
    }

    /// SIGTERM the group and give it the grace period. Whatever is left of the group after
    /// that gets SIGKILL, even if the leader itself already exited. Returns once the leader is
    /// reaped and the group is empty.
    async fn terminate(&self, child: &mut Child, pid: Option<u32>) -> Option<ExitStatus> {
        let deadline = Instant::now() + self.kill_grace;
        signal_group(child, pid, Termination::Graceful);

        let status = match timeout(self.kill_grace, child.wait()).await {
            Ok(Ok(status)) => status,
            _ => {
                warn!(?pid, grace_ms = self.kill_grace.as_millis() as u64, "Process ignored SIGTERM, killing");
                return self.kill_and_reap(child, pid).await;
            }
        };

        let rest = deadline.saturating_duration_since(Instant::now());
        if wait_group_empty(pid, rest).await {
            debug!(?pid, "Process group exited after SIGTERM");
            return Some(status);
        }
        warn!(?pid, "Process group members outlived the leader, killing");
        signal_group(child, pid, Termination::Forced);
        self.confirm_group_gone(pid).await;
        Some(status)
    }

    /// SIGKILL the group, reap the leader, then wait for the group to disappear.
    async fn kill_and_reap(&self, child: &mut Child, pid: Option<u32>) -> Option<ExitStatus> {
        signal_group(child, pid, Termination::Forced);
        let status = match timeout(self.kill_grace, child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                error!(?pid, error = %e, "Failed to reap killed process");
                None
            }
            Err(_) => {
                error!(?pid, "Killed process was not reaped in time");
                None
            }
        };
        self.confirm_group_gone(pid).await;
        status
    }

    async fn confirm_group_gone(&self, pid: Option<u32>) {
        if !wait_group_empty(pid, self.kill_grace).await {
            // Usually zombies nobody has reaped yet.
            error!(?pid, "Process group still present after SIGKILL");
        }
    }

    /// Wait briefly for the readers to hit EOF. Descendants that still hold the pipes after
    /// that are killed along with the rest of the group.
    async fn collect(
        &self,
        pid: Option<u32>,
        stdout: (SharedBuffer, JoinHandle<()>),
        stderr: (SharedBuffer, JoinHandle<()>),
    ) -> Streams {
        let (stdout_buf, mut stdout_task) = stdout;
        let (stderr_buf, mut stderr_task) = stderr;

        let drained = timeout(self.drain_grace, async {
            let _ = (&mut stdout_task).await;
            let _ = (&mut stderr_task).await;
        })
        .await;

        if drained.is_err() {
            warn!(?pid, "Output pipes still open after exit, killing leftover process group");
            #[cfg(unix)]
            kill_group(pid, libc::SIGKILL);
            let settled = timeout(self.drain_grace, async {
                let _ = (&mut stdout_task).await;
                let _ = (&mut stderr_task).await;
            })
            .await;
            if settled.is_err() {
                stdout_task.abort();
                stderr_task.abort();
            }
        }

        let (stdout, stdout_truncated) = capture::take(&stdout_buf);
        let (stderr, stderr_truncated) = capture::take(&stderr_buf);
        Streams {
            stdout,
            stdout_truncated,
            stderr,
            stderr_truncated,
        }
    }
}

#[async_trait]
impl CommandRunner for ProcessExecutor {
    async fn run(&self, request: &ExecutionRequest) -> ExecutionResult {
        self.execute(request).await
    }
}

/// Exit code reported when the process could not be waited on and no status was recovered.
const WAIT_FAILED_EXIT_CODE: i32 = 1;

const GROUP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Kills the process group if the call is abandoned (its future dropped) before it finishes.
struct GroupGuard {
    pid: Option<u32>,
    armed: bool,
}

impl GroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pid, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(pid = ?self.pid, "Execution abandoned, killing process group");
        #[cfg(unix)]
        kill_group(self.pid, libc::SIGKILL);
    }
}

/// Poll until no process is left in the group, for at most `within`.
async fn wait_group_empty(pid: Option<u32>, within: Duration) -> bool {
    let poll = async {
        while group_alive(pid) {
            tokio::time::sleep(GROUP_POLL_INTERVAL).await;
        }
    };
    timeout(within, poll).await.is_ok()
}

#[cfg(unix)]
fn group_alive(pid: Option<u32>) -> bool {
    let Some(pid) = pid else {
        return false;
    };
    // SAFETY: signal 0 only checks for existence.
    if unsafe { libc::killpg(pid as libc::pid_t, 0) } == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
}

#[cfg(not(unix))]
fn group_alive(_pid: Option<u32>) -> bool {
    false
}

#[derive(Debug, Clone, Copy)]
enum Termination {
    Graceful,
    Forced,
}

fn append_wait_error(stderr: &mut String, program: &str, error: &std::io::Error) {
    if !stderr.is_empty() && !stderr.ends_with('\n') {
        stderr.push('\n');
    }
    stderr.push_str(&format!("Failed to wait for {program}: {error}"));
}

#[cfg(unix)]
fn signal_group(_child: &mut Child, pid: Option<u32>, how: Termination) {
    let signal = match how {
        Termination::Graceful => libc::SIGTERM,
        Termination::Forced => libc::SIGKILL,
    };
    kill_group(pid, signal);
}

#[cfg(not(unix))]
fn signal_group(child: &mut Child, _pid: Option<u32>, _how: Termination) {
    // No process groups to signal; terminate the child directly.
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "start_kill failed");
    }
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>, signal: libc::c_int) {
    let Some(pid) = pid else {
        return;
    };
    // SAFETY: killpg has no memory-safety preconditions. The child called setsid, so its pid
    // is also its process group id.
    let rc = unsafe { libc::killpg(pid as libc::pid_t, signal) };
    if rc == -1 {
        debug!(pid, signal, error = %std::io::Error::last_os_error(), "killpg failed");
    }
}

fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    SPAWN_FAILED_EXIT_CODE
}
