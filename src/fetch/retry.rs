//! Retry logic with exponential backoff for direct HTTP fetches.
//!
//! # Overview
//!
//! A failed HTTP attempt is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - timeouts, connection errors, most 5xx
//! - [`FailureType::Permanent`] - client errors that no retry will fix
//! - [`FailureType::Blocked`] - the site refuses plain clients; escalate
//!
//! [`RetryPolicy`] then decides whether to retry and how long to wait.
//! Delays double per attempt with no jitter: `base, 2*base, 4*base, ...`.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use digest_core::fetch::{FailureType, RetryDecision, RetryPolicy, classify_http_status};
//!
//! let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(30));
//! assert_eq!(classify_http_status(403), FailureType::Blocked);
//!
//! match policy.should_retry(classify_http_status(500), 1) {
//!     RetryDecision::Retry { delay, attempt } => assert_eq!((delay.as_secs(), attempt), (1, 2)),
//!     RetryDecision::DoNotRetry { .. } => unreachable!(),
//! }
//! ```

use std::time::Duration;

use tracing::{debug, instrument};

/// Default base delay for exponential backoff.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Default maximum delay cap.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Classification of an HTTP failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    Transient,

    /// Failure that won't succeed regardless of retries.
    Permanent,

    /// The server rejects non-browser clients (403, 429, 503) or serves a
    /// binary document. Not retried; the cascade escalates instead.
    Blocked,
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Retry limits and backoff shape.
///
/// `delay(attempt) = min(base_delay * 2^(attempt - 1), max_delay)`
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Delay after the first failed attempt.
    base_delay: Duration,

    /// Maximum delay cap.
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: super::DEFAULT_MAX_RETRIES + 1,
            base_delay: DEFAULT_BACKOFF_BASE,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy. `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Policy allowing `max_retries` retries after the first attempt.
    #[must_use]
    pub fn from_retries(max_retries: u32, base_delay: Duration) -> Self {
        Self::new(max_retries.saturating_add(1), base_delay, DEFAULT_MAX_DELAY)
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides whether to retry after `attempt` (1-indexed) failed.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        match failure_type {
            FailureType::Permanent => {
                return RetryDecision::DoNotRetry {
                    reason: "permanent failure - retry would not help".to_string(),
                };
            }
            FailureType::Blocked => {
                return RetryDecision::DoNotRetry {
                    reason: "blocked - escalating instead of retrying".to_string(),
                };
            }
            FailureType::Transient => {}
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.calculate_delay(attempt);
        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1_u32 << exponent)
            .min(self.max_delay)
    }
}

/// Classifies an HTTP status code into a failure type.
///
/// | Status | Type |
/// |--------|------|
/// | 403 | Blocked |
/// | 429 | Blocked |
/// | 503 | Blocked |
/// | 408 | Transient |
/// | other 4xx | Permanent |
/// | other 5xx | Transient |
#[allow(clippy::match_same_arms)]
#[must_use]
pub fn classify_http_status(status: u16) -> FailureType {
    match status {
        403 => FailureType::Blocked, // Forbidden: bot defense
        429 => FailureType::Blocked, // Too Many Requests
        503 => FailureType::Blocked, // Service Unavailable: challenge pages
        408 => FailureType::Transient,

        status if (400..500).contains(&status) => FailureType::Permanent,
        status if (500..600).contains(&status) => FailureType::Transient,

        _ => FailureType::Permanent,
    }
}

/// True for content types the HTML pipeline cannot use (PDF, EPUB, archives).
#[must_use]
pub fn is_binary_content_type(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ["pdf", "epub", "zip"].iter().any(|kind| ct.contains(kind))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==================== RetryPolicy Tests ====================

    #[test]
    fn test_retry_policy_default_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_retry_policy_max_attempts_minimum_is_one() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_from_retries_counts_initial_attempt() {
        assert_eq!(RetryPolicy::from_retries(0, Duration::ZERO).max_attempts(), 1);
        assert_eq!(RetryPolicy::from_retries(2, Duration::ZERO).max_attempts(), 3);
    }

    // ==================== Delay Calculation Tests ====================

    #[test]
    fn test_delay_doubles_per_attempt() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(32));
        assert_eq!(policy.calculate_delay(1), Duration::from_secs(1));
        assert_eq!(policy.calculate_delay(2), Duration::from_secs(2));
        assert_eq!(policy.calculate_delay(3), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_respects_max_delay() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(policy.calculate_delay(6), Duration::from_secs(5));
    }

    // ==================== Status Classification Tests ====================

    #[test]
    fn test_classify_block_statuses() {
        for status in [403, 429, 503] {
            assert_eq!(classify_http_status(status), FailureType::Blocked, "{status}");
        }
    }

    #[test]
    fn test_classify_permanent_statuses() {
        for status in [400, 401, 404, 410, 451] {
            assert_eq!(classify_http_status(status), FailureType::Permanent, "{status}");
        }
    }

    #[test]
    fn test_classify_transient_statuses() {
        for status in [408, 500, 502, 504] {
            assert_eq!(classify_http_status(status), FailureType::Transient, "{status}");
        }
    }

    #[test]
    fn test_binary_content_types() {
        assert!(is_binary_content_type("application/pdf"));
        assert!(is_binary_content_type("application/epub+zip"));
        assert!(is_binary_content_type("application/ZIP"));
        assert!(!is_binary_content_type("text/html; charset=utf-8"));
    }

    // ==================== Should Retry Decision Tests ====================

    #[test]
    fn test_should_retry_permanent_does_not_retry() {
        let policy = RetryPolicy::default();
        let decision = policy.should_retry(FailureType::Permanent, 1);
        if let RetryDecision::DoNotRetry { reason } = decision {
            assert!(reason.contains("permanent"));
        } else {
            panic!("expected DoNotRetry");
        }
    }

    #[test]
    fn test_should_retry_blocked_does_not_retry() {
        let policy = RetryPolicy::default();
        let decision = policy.should_retry(FailureType::Blocked, 1);
        assert!(matches!(decision, RetryDecision::DoNotRetry { .. }));
    }

    #[test]
    fn test_should_retry_respects_max_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_secs(1));

        assert!(matches!(
            policy.should_retry(FailureType::Transient, 1),
            RetryDecision::Retry { attempt: 2, .. }
        ));
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 2),
            RetryDecision::Retry { attempt: 3, .. }
        ));

        let decision = policy.should_retry(FailureType::Transient, 3);
        if let RetryDecision::DoNotRetry { reason } = decision {
            assert!(reason.contains("exhausted"));
        } else {
            panic!("expected DoNotRetry");
        }
    }
}
