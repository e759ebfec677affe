//! Isolated subprocess execution with a hard wall-clock cutoff.
//!
//! External tools (the url-to-md converter, the browser renderer, the local
//! LLM runner) can hang or leave renderer children behind. Every child is
//! started in its own process group; when the cutoff expires the whole group
//! receives SIGTERM, then SIGKILL after a short grace period, so no
//! descendant survives the call.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use digest_core::process::{IsolatedCommand, run_isolated};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let output = run_isolated(
//!     IsolatedCommand::new("url-to-md", Duration::from_secs(35))
//!         .arg("https://example.com/story"),
//! )
//! .await?;
//! println!("{}", output.stdout);
//! # Ok(())
//! # }
//! ```

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

/// Delay between SIGTERM and SIGKILL once the cutoff expires.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

/// Errors from running an isolated subprocess.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The program is not installed or not on `PATH`.
    #[error("{program} binary not found")]
    NotFound {
        /// Program that could not be found.
        program: String,
    },

    /// The program exists but could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the child failed.
    #[error("failed waiting on {program}: {source}")]
    Wait {
        /// Program being waited on.
        program: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The wall-clock cutoff expired and the process group was killed.
    #[error("{program} timed out after {}s", timeout.as_secs())]
    TimedOut {
        /// Program that was killed.
        program: String,
        /// Cutoff that expired.
        timeout: Duration,
    },
}

/// Description of a subprocess to run in isolation.
#[derive(Debug, Clone)]
pub struct IsolatedCommand {
    program: String,
    args: Vec<String>,
    stdin: Option<String>,
    timeout: Duration,
    kill_grace: Duration,
}

impl IsolatedCommand {
    /// Creates a command with the given wall-clock cutoff.
    #[must_use]
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            timeout,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Text written to the child's stdin, which is then closed.
    #[must_use]
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Overrides the SIGTERM to SIGKILL grace period.
    #[must_use]
    pub fn kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Returns the program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the wall-clock cutoff.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Captured result of a finished subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
    /// Captured stdout (lossy UTF-8).
    pub stdout: String,
    /// Captured stderr (lossy UTF-8).
    pub stderr: String,
}

impl ProcessOutput {
    /// Returns true when the process exited with status 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs a command in its own process group, killing the group on timeout.
///
/// A non-zero exit is not an error here; callers inspect [`ProcessOutput`].
///
/// # Errors
///
/// Returns [`ProcessError::NotFound`] when the program is missing,
/// [`ProcessError::TimedOut`] when the cutoff expires, and
/// [`ProcessError::Spawn`] / [`ProcessError::Wait`] for other IO failures.
#[instrument(skip(command), fields(program = %command.program, timeout_secs = command.timeout.as_secs()))]
pub async fn run_isolated(command: IsolatedCommand) -> Result<ProcessOutput, ProcessError> {
    let IsolatedCommand {
        program,
        args,
        stdin,
        timeout,
        kill_grace,
    } = command;

    let mut cmd = Command::new(&program);
    cmd.args(&args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|source| {
        if source.kind() == ErrorKind::NotFound {
            ProcessError::NotFound {
                program: program.clone(),
            }
        } else {
            ProcessError::Spawn {
                program: program.clone(),
                source,
            }
        }
    })?;
    debug!(pid = child.id(), "spawned isolated process");

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        tokio::spawn(async move {
            if let Err(error) = pipe.write_all(input.as_bytes()).await {
                debug!(error = %error, "child closed stdin early");
            }
            drop(pipe);
        });
    }

    let stdout_task = spawn_reader(child.stdout.take());
    let stderr_task = spawn_reader(child.stderr.take());

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => Ok(ProcessOutput {
            code: status.code(),
            stdout: collect(stdout_task).await,
            stderr: collect(stderr_task).await,
        }),
        Ok(Err(source)) => Err(ProcessError::Wait { program, source }),
        Err(_) => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "cutoff expired; terminating process group"
            );
            terminate_group(&mut child, kill_grace).await;
            stdout_task.abort();
            stderr_task.abort();
            Err(ProcessError::TimedOut { program, timeout })
        }
    }
}

fn spawn_reader<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe
            && let Err(error) = pipe.read_to_end(&mut buf).await
        {
            debug!(error = %error, "error reading child output");
        }
        buf
    })
}

async fn collect(task: JoinHandle<Vec<u8>>) -> String {
    task.await
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// SIGTERM the group, wait out the grace period, then SIGKILL it.
async fn terminate_group(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    if let Some(pid) = child.id().and_then(|pid| libc::pid_t::try_from(pid).ok()) {
        // SAFETY: killpg only sends a signal; pid is the group leader we spawned.
        unsafe {
            libc::killpg(pid, libc::SIGTERM);
        }
        if tokio::time::timeout(grace, child.wait()).await.is_ok() {
            // Leader is gone; make sure stragglers in the group are too.
            unsafe {
                libc::killpg(pid, libc::SIGKILL);
            }
            return;
        }
        unsafe {
            libc::killpg(pid, libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    let _ = grace;

    if let Err(error) = child.kill().await {
        debug!(error = %error, "child already exited");
    }
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[tokio::test]
    async fn test_run_isolated_captures_stdout_and_code() {
        let output = run_isolated(
            IsolatedCommand::new("sh", Duration::from_secs(5)).args(["-c", "echo hi; exit 3"]),
        )
        .await
        .unwrap();
        assert_eq!(output.stdout.trim(), "hi");
        assert_eq!(output.code, Some(3));
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_run_isolated_feeds_stdin() {
        let output = run_isolated(
            IsolatedCommand::new("cat", Duration::from_secs(5)).stdin("prompt text"),
        )
        .await
        .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "prompt text");
    }

    #[tokio::test]
    async fn test_run_isolated_missing_binary() {
        let result = run_isolated(IsolatedCommand::new(
            "definitely-not-a-real-binary-xyz",
            Duration::from_secs(5),
        ))
        .await;
        let err = result.unwrap_err();
        assert!(matches!(err, ProcessError::NotFound { .. }));
        assert_eq!(
            err.to_string(),
            "definitely-not-a-real-binary-xyz binary not found"
        );
    }

    #[tokio::test]
    async fn test_run_isolated_kills_group_on_timeout() {
        let started = Instant::now();
        let result = run_isolated(
            IsolatedCommand::new("sh", Duration::from_millis(300))
                .args(["-c", "sleep 30 & sleep 30"])
                .kill_grace(Duration::from_millis(100)),
        )
        .await;
        assert!(matches!(result, Err(ProcessError::TimedOut { .. })));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
