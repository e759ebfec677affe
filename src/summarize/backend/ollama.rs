//! Ollama: a local model invoked through its CLI.
//!
//! The prompt goes to `ollama run <model>` on stdin. A hung daemon is
//! detected by the wall-clock cutoff; the backend then runs its restart
//! steps (kill the server so the supervisor relaunches it, else a service
//! manager restart) and tries exactly once more.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, instrument, warn};

use super::{BackendOutcome, LlmBackend, ResponseFormat};
use crate::process::{IsolatedCommand, ProcessError, run_isolated};

/// Default model tag.
pub const DEFAULT_MODEL: &str = "qwen3:latest";

/// Default wall-clock cutoff per call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// One command in the daemon recovery sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartStep {
    /// Program to run.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Cutoff for this step.
    pub timeout: Duration,
    /// Exit codes that count as a successful restart.
    pub ok_codes: Vec<i32>,
}

impl RestartStep {
    /// Creates a step.
    #[must_use]
    pub fn new(program: &str, args: &[&str], timeout: Duration, ok_codes: &[i32]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(ToString::to_string).collect(),
            timeout,
            ok_codes: ok_codes.to_vec(),
        }
    }

    /// Kill `ollama serve` (exit 1 means nothing was running), then
    /// `brew services restart ollama`.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("pkill", &["-f", "ollama serve"], Duration::from_secs(5), &[0, 1]),
            Self::new(
                "brew",
                &["services", "restart", "ollama"],
                Duration::from_secs(10),
                &[0],
            ),
        ]
    }
}

/// Invocation settings.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// CLI binary.
    pub program: String,
    /// Model tag.
    pub model: String,
    /// Cutoff per call.
    pub timeout: Duration,
    /// Recovery sequence after a timeout; the first step that succeeds wins.
    pub restart_steps: Vec<RestartStep>,
}

impl OllamaConfig {
    /// Config using the `ollama` binary and the default restart steps.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            program: "ollama".to_string(),
            model: model.into(),
            timeout: DEFAULT_TIMEOUT,
            restart_steps: RestartStep::defaults(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL)
    }
}

/// Secondary backend running a local model per call.
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    config: OllamaConfig,
}

enum CallError {
    TimedOut,
    Fatal(String),
    Failed(String),
}

impl OllamaBackend {
    /// Creates the backend.
    #[must_use]
    pub fn new(config: OllamaConfig) -> Self {
        Self { config }
    }

    async fn run_once(&self, prompt: &str) -> Result<String, CallError> {
        let command = IsolatedCommand::new(self.config.program.clone(), self.config.timeout)
            .args(["run", self.config.model.as_str()])
            .stdin(prompt);
        match run_isolated(command).await {
            Ok(output) if output.success() => Ok(output.stdout.trim().to_string()),
            Ok(output) => {
                let stderr = output.stderr.trim();
                Err(CallError::Failed(if stderr.is_empty() {
                    "unknown ollama error".to_string()
                } else {
                    stderr.to_string()
                }))
            }
            Err(ProcessError::TimedOut { .. }) => Err(CallError::TimedOut),
            Err(ProcessError::NotFound { program }) => {
                Err(CallError::Fatal(format!("{program} binary not found")))
            }
            Err(other) => Err(CallError::Failed(other.to_string())),
        }
    }

    /// Runs the restart steps in order; returns true once one succeeds.
    #[instrument(skip(self))]
    async fn attempt_restart(&self) -> bool {
        for step in &self.config.restart_steps {
            let command =
                IsolatedCommand::new(step.program.clone(), step.timeout).args(step.args.clone());
            match run_isolated(command).await {
                Ok(output) if output.code.is_some_and(|c| step.ok_codes.contains(&c)) => {
                    info!(program = %step.program, "restart step succeeded");
                    return true;
                }
                Ok(output) => {
                    debug!(program = %step.program, code = ?output.code, "restart step failed");
                }
                Err(error) => debug!(program = %step.program, error = %error, "restart step failed"),
            }
        }
        false
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    fn display_name(&self) -> &str {
        "Ollama"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, prompt: &str, _format: ResponseFormat) -> BackendOutcome {
        for attempt in 1..=2 {
            match self.run_once(prompt).await {
                Ok(text) => return BackendOutcome::Success(text),
                Err(CallError::Fatal(message)) => return BackendOutcome::FatalFailure(message),
                Err(CallError::Failed(message)) => {
                    return BackendOutcome::RecoverableFailure(message);
                }
                Err(CallError::TimedOut) if attempt == 1 => {
                    error!(
                        timeout_secs = self.config.timeout.as_secs(),
                        "ollama unresponsive; attempting restart"
                    );
                    if !self.attempt_restart().await {
                        warn!("no restart step succeeded");
                    }
                    info!("retrying after restart attempt");
                }
                Err(CallError::TimedOut) => {}
            }
        }
        BackendOutcome::RecoverableFailure(format!(
            "Ollama unresponsive (timed out after {}s); restart failed or still unresponsive",
            self.config.timeout.as_secs()
        ))
    }
}
