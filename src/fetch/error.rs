//! Error types for the fetch cascade.

use thiserror::Error;

/// The cascade was exhausted for a URL.
///
/// Carries the last concrete failure reason. When several escalation
/// strategies failed, the reason names each of them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to fetch {url}: {reason}")]
pub struct FetchError {
    /// URL that could not be fetched.
    pub url: String,
    /// Last concrete failure reason.
    pub reason: String,
}

impl FetchError {
    /// Creates a fetch error.
    pub fn new(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Returns the reason without the `Failed to fetch <url>:` prefix.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Failure of a single strategy attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    /// The site refused plain access (403/429/503 or a binary content type).
    /// The cascade escalates to the next strategy.
    #[error("{reason}")]
    Blocked {
        /// What blocked the request.
        reason: String,
    },

    /// The strategy failed for this URL.
    #[error("{reason}")]
    Failed {
        /// Why the strategy failed.
        reason: String,
    },
}

impl StrategyError {
    /// Creates a blocked (escalatable) error.
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self::Blocked {
            reason: reason.into(),
        }
    }

    /// Creates a failed error.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Returns the failure reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::Blocked { reason } | Self::Failed { reason } => reason,
        }
    }

    /// Returns true when the cascade should escalate.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }
}

/// An HTTP client could not be constructed.
#[derive(Debug, Error)]
#[error("failed to build HTTP client: {0}")]
pub struct ClientBuildError(#[from] pub reqwest::Error);
