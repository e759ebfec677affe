//! Summarizer error type.

use thiserror::Error;

/// Backend or validation exhaustion while summarizing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SummarizerError {
    /// No backend is configured; fatal for the whole run.
    #[error(
        "No LLM backend configured. Set LMSTUDIO_BASE_URL and LMSTUDIO_MODEL, or enable Ollama"
    )]
    NotConfigured,

    /// A backend failed and no fallback applied.
    #[error("{message}")]
    Backend {
        /// Backend that failed.
        backend: String,
        /// Failure message from the backend.
        message: String,
    },

    /// Primary and fallback backends both failed.
    #[error(
        "Both {primary} and {secondary} failed for {url} ({primary_error}; {secondary_error})"
    )]
    BothFailed {
        /// Primary backend display name.
        primary: String,
        /// Fallback backend display name.
        secondary: String,
        /// Article URL.
        url: String,
        /// Primary failure message.
        primary_error: String,
        /// Fallback failure message.
        secondary_error: String,
    },

    /// The model output contained nothing bullet-like.
    #[error("No summary bullets returned by {backend}")]
    NoBullets {
        /// Backend that produced the output.
        backend: String,
    },

    /// Every attempt failed validation.
    #[error("Summary validation failed after {attempts} attempts: {message}")]
    ValidationExhausted {
        /// Attempts made.
        attempts: u32,
        /// Last validation message.
        message: String,
    },
}

impl SummarizerError {
    /// Creates a backend error.
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// True when the error should abort the whole run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NotConfigured)
    }
}
