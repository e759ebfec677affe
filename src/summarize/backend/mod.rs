//! LLM backends and the selection chain over them.
//!
//! Backends report a typed [`BackendOutcome`] instead of an error so the
//! retry-vs-fallback-vs-give-up decision is made by [`BackendSelector`] from
//! data, not control flow:
//!
//! | Outcome | Pinned mode | Auto mode |
//! |---------|-------------|-----------|
//! | `Success` | accept | accept |
//! | `RecoverableFailure` | fail | try the secondary backend, if any |
//! | `FatalFailure` | fail | fail |

mod lmstudio;
mod ollama;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

pub use lmstudio::{LmStudioBackend, LmStudioConfig};
pub use ollama::{OllamaBackend, OllamaConfig, RestartStep};

use super::SummarizerError;

/// Result of one completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendOutcome {
    /// Model text.
    Success(String),
    /// The call failed; another backend may still succeed.
    RecoverableFailure(String),
    /// Misconfiguration; no fallback should be attempted.
    FatalFailure(String),
}

/// Output shape requested from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Free text (used for article classification).
    Text,
    /// JSON constrained to the summary schema, where supported.
    SummarySchema,
}

/// A model that turns a prompt into text.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Stable identifier (`lmstudio`, `ollama`).
    fn name(&self) -> &str;

    /// Human-readable name for messages.
    fn display_name(&self) -> &str {
        self.name()
    }

    /// Model identifier.
    fn model(&self) -> &str;

    /// Sends `prompt` and returns the model text.
    async fn complete(&self, prompt: &str, format: ResponseFormat) -> BackendOutcome;
}

/// Successful completion with provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendReply {
    /// Model text.
    pub text: String,
    /// Backend identifier.
    pub backend: String,
    /// Model identifier.
    pub model: String,
}

/// Chooses which backend serves a request.
pub struct BackendSelector {
    primary: Arc<dyn LlmBackend>,
    secondary: Option<Arc<dyn LlmBackend>>,
}

impl std::fmt::Debug for BackendSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSelector")
            .field("primary", &self.primary.name())
            .field("secondary", &self.secondary.as_ref().map(|b| b.name().to_string()))
            .finish()
    }
}

impl BackendSelector {
    /// Uses only `backend`; failures are never retried on another backend.
    #[must_use]
    pub fn pinned(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            primary: backend,
            secondary: None,
        }
    }

    /// Uses `primary`, falling back to `secondary` on recoverable failures.
    #[must_use]
    pub fn auto(primary: Arc<dyn LlmBackend>, secondary: Option<Arc<dyn LlmBackend>>) -> Self {
        Self { primary, secondary }
    }

    /// The backend tried first.
    #[must_use]
    pub fn primary(&self) -> &Arc<dyn LlmBackend> {
        &self.primary
    }

    /// The fallback backend, if any.
    #[must_use]
    pub fn secondary(&self) -> Option<&Arc<dyn LlmBackend>> {
        self.secondary.as_ref()
    }

    /// Runs `prompt` through the chain.
    ///
    /// # Errors
    ///
    /// Returns [`SummarizerError::Backend`] when the chain stops at one
    /// backend, and [`SummarizerError::BothFailed`] when the fallback fails too.
    #[instrument(skip(self, prompt), fields(primary = self.primary.name(), prompt_chars = prompt.len()))]
    pub async fn complete(&self, prompt: &str, url: &str) -> Result<BackendReply, SummarizerError> {
        let primary_error = match self.primary.complete(prompt, ResponseFormat::SummarySchema).await {
            BackendOutcome::Success(text) => return Ok(reply(self.primary.as_ref(), text)),
            BackendOutcome::FatalFailure(message) => {
                return Err(SummarizerError::backend(self.primary.name(), message));
            }
            BackendOutcome::RecoverableFailure(message) => message,
        };

        let Some(secondary) = &self.secondary else {
            return Err(SummarizerError::backend(self.primary.name(), primary_error));
        };

        warn!(
            error = %primary_error,
            fallback = secondary.name(),
            "primary backend failed; falling back"
        );
        match secondary.complete(prompt, ResponseFormat::SummarySchema).await {
            BackendOutcome::Success(text) => {
                info!(backend = secondary.name(), "fallback backend succeeded");
                Ok(reply(secondary.as_ref(), text))
            }
            BackendOutcome::RecoverableFailure(message) | BackendOutcome::FatalFailure(message) => {
                warn!(error = %message, backend = secondary.name(), "fallback backend failed");
                Err(SummarizerError::BothFailed {
                    primary: self.primary.display_name().to_string(),
                    secondary: secondary.display_name().to_string(),
                    url: url.to_string(),
                    primary_error,
                    secondary_error: message,
                })
            }
        }
    }
}

fn reply(backend: &dyn LlmBackend, text: String) -> BackendReply {
    BackendReply {
        text,
        backend: backend.name().to_string(),
        model: backend.model().to_string(),
    }
}
