//! Local `url-to-md` converter run as an isolated subprocess.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument};

use super::error::StrategyError;
use super::{FetchConfig, FetchStrategy, FetchedContent, StrategyKind};
use crate::process::{IsolatedCommand, ProcessError, run_isolated};

/// Default converter binary.
pub const URL_TO_MD_PROGRAM: &str = "url-to-md";

/// Default wait passed to the converter.
const URL_TO_MD_TIMEOUT: Duration = Duration::from_secs(30);

/// Extra wall time before the converter is killed.
const KILL_MARGIN: Duration = Duration::from_secs(5);

const INCLUDE_TAGS: [&str; 5] = ["p", "h2", "h3", "h4", "img"];
const REMOVE_TAGS: [&str; 5] = ["nav", "header", "footer", "aside", "script"];

/// Converter failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("url-to-md failed for {url}: {message}")]
pub struct UrlToMdError {
    /// Page requested.
    pub url: String,
    /// What went wrong.
    pub message: String,
}

impl UrlToMdError {
    fn new(url: &str, message: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            message: message.into(),
        }
    }
}

/// Markdown provider backed by the `url-to-md` CLI.
#[derive(Debug, Clone)]
pub struct UrlToMdProvider {
    program: String,
    timeout: Duration,
}

impl Default for UrlToMdProvider {
    fn default() -> Self {
        Self::new(URL_TO_MD_PROGRAM)
    }
}

impl UrlToMdProvider {
    /// Provider running `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: URL_TO_MD_TIMEOUT,
        }
    }

    /// Overrides the page wait.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, url: &str) -> IsolatedCommand {
        IsolatedCommand::new(self.program.clone(), self.timeout + KILL_MARGIN)
            .args([url, "--wait", &self.timeout.as_secs().to_string()])
            .arg("--include-tags")
            .args(INCLUDE_TAGS)
            .arg("--remove-tags")
            .args(REMOVE_TAGS)
            .arg("--clean-content")
    }

    /// Converts `url` to Markdown.
    ///
    /// # Errors
    ///
    /// Returns [`UrlToMdError`] when the binary is missing, times out, exits
    /// non-zero, or prints nothing.
    #[instrument(skip(self))]
    pub async fn fetch_markdown(&self, url: &str) -> Result<String, UrlToMdError> {
        let output = run_isolated(self.command(url)).await.map_err(|e| match e {
            ProcessError::NotFound { .. } => UrlToMdError::new(url, "url-to-md binary not found"),
            ProcessError::TimedOut { timeout, .. } => {
                UrlToMdError::new(url, format!("timeout after {}s", timeout.as_secs()))
            }
            other => UrlToMdError::new(url, other.to_string()),
        })?;

        if !output.success() {
            let stderr = output.stderr.trim();
            let message = if stderr.is_empty() {
                format!("exit code {}", output.code.unwrap_or(-1))
            } else {
                stderr.to_string()
            };
            return Err(UrlToMdError::new(url, message));
        }

        if output.stdout.trim().is_empty() {
            return Err(UrlToMdError::new(url, "no content returned"));
        }
        debug!(chars = output.stdout.len(), "url-to-md returned markdown");
        Ok(output.stdout)
    }
}

#[async_trait]
impl FetchStrategy for UrlToMdProvider {
    fn kind(&self) -> StrategyKind {
        StrategyKind::UrlToMd
    }

    fn applies(&self, _url: &str) -> bool {
        true
    }

    async fn attempt(
        &self,
        url: &str,
        _cfg: &FetchConfig,
    ) -> Result<FetchedContent, StrategyError> {
        self.fetch_markdown(url)
            .await
            .map(FetchedContent::markdown)
            .map_err(|e| StrategyError::failed(e.message))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_message() {
        let provider = UrlToMdProvider::new("url-to-md-not-installed-xyz");
        let err = provider.fetch_markdown("https://example.com/a").await.unwrap_err();
        assert_eq!(err.message, "url-to-md binary not found");
        assert_eq!(
            err.to_string(),
            "url-to-md failed for https://example.com/a: url-to-md binary not found"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_without_stderr_reports_code() {
        // `false` ignores its arguments and exits 1.
        let provider = UrlToMdProvider::new("false");
        let err = provider.fetch_markdown("https://example.com/a").await.unwrap_err();
        assert_eq!(err.message, "exit code 1");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_empty_stdout_is_an_error() {
        let provider = UrlToMdProvider::new("true");
        let err = provider.fetch_markdown("https://example.com/a").await.unwrap_err();
        assert_eq!(err.message, "no content returned");
    }

    #[test]
    fn test_command_arguments() {
        let command = UrlToMdProvider::default().command("https://example.com/a");
        assert_eq!(command.program(), "url-to-md");
        assert_eq!(command.timeout(), Duration::from_secs(35));
    }
}
