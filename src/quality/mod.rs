//! Content-quality classification for extracted article text.
//!
//! A single pure heuristic decides whether text is a real article or one of
//! the well-known failure shapes: a bot-defense interstitial, a paywall
//! teaser, a page of UI chrome, or a bare references section. The same
//! [`classify`] function backs the extractor's acceptance gate and the
//! pipeline's retry-versus-accept decision, so both agree on every input.
//!
//! # Priority
//!
//! Checks run in a fixed order and the first match wins:
//! 1. Bot-challenge indicators (2 or more)
//! 2. Paywall indicators (2 or more)
//! 3. UI-chrome indicators (2 or more)
//! 4. References-only (more than 10 non-empty lines, over 70% numbered citations)
//!
//! # Example
//!
//! ```
//! use digest_core::quality::classify;
//!
//! let verdict = classify("Just a moment... Checking your browser. Ray ID: 1234");
//! assert!(verdict.is_failure());
//! assert_eq!(verdict.reason(), Some("blocked by bot-defense challenge"));
//! ```

use std::sync::LazyLock;

use regex::Regex;

/// Reason reported for bot-defense interstitials.
pub const REASON_BOT_CHALLENGE: &str = "blocked by bot-defense challenge";

/// Reason reported for paywalled teasers.
pub const REASON_PAYWALL: &str = "content behind paywall";

/// Reason reported for navigation/login chrome.
pub const REASON_UI_CHROME: &str = "UI elements, not article";

/// Reason reported for pages that are only a citation list.
pub const REASON_REFERENCES_ONLY: &str = "references-only section, not article";

/// Reason reported for empty input.
pub const REASON_EMPTY: &str = "empty content";

/// Matched case-insensitively.
const BOT_CHALLENGE_INDICATORS: &[&str] = &[
    "just a moment",
    "checking your browser",
    "cloudflare",
    "ray id",
    "enable javascript",
    "challenge passed",
];

/// Matched case-insensitively.
const PAYWALL_INDICATORS: &[&str] = &[
    "get access",
    "purchase this article",
    "get institutional access",
    "full access to this article",
    "subscription options",
    "already a subscriber",
    "purchase options",
];

/// Matched case-sensitively; words like "register" appear in prose.
const UI_INDICATORS: &[&str] = &[
    "Please choose",
    "Sign in",
    "Register",
    "Subscribe",
    "Select your specialty",
    "I'm not a medical professional",
    "Log in to continue",
    "Create account",
    "Why publish in",
    "Click below to find out",
    "Sponsored by",
];

const MIN_INDICATOR_HITS: usize = 2;
const REFERENCES_MIN_LINES: usize = 10;
const REFERENCES_MIN_RATIO: f64 = 0.7;

static REFERENCE_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\d+\.\s+[A-Z][a-z]+,?\s+[A-Z]").ok());

/// Outcome of a quality check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualityVerdict {
    /// Text looks like a real article.
    Ok,
    /// Text matches a known failure shape.
    Failure {
        /// Human-readable reason, stable across calls.
        reason: &'static str,
    },
}

impl QualityVerdict {
    /// Returns true when the text was rejected.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    /// Returns the rejection reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Self::Ok => None,
            Self::Failure { reason } => Some(reason),
        }
    }
}

/// Classifies article text, returning the first matching failure shape.
///
/// Pure and idempotent: identical input always yields an identical verdict.
#[must_use]
pub fn classify(text: &str) -> QualityVerdict {
    if text.trim().is_empty() {
        return QualityVerdict::Failure {
            reason: REASON_EMPTY,
        };
    }

    let lowered = text.to_lowercase();

    if count_hits(&lowered, BOT_CHALLENGE_INDICATORS) >= MIN_INDICATOR_HITS {
        return QualityVerdict::Failure {
            reason: REASON_BOT_CHALLENGE,
        };
    }
    if count_hits(&lowered, PAYWALL_INDICATORS) >= MIN_INDICATOR_HITS {
        return QualityVerdict::Failure {
            reason: REASON_PAYWALL,
        };
    }
    if count_hits(text, UI_INDICATORS) >= MIN_INDICATOR_HITS {
        return QualityVerdict::Failure {
            reason: REASON_UI_CHROME,
        };
    }
    if is_references_only(text) {
        return QualityVerdict::Failure {
            reason: REASON_REFERENCES_ONLY,
        };
    }

    QualityVerdict::Ok
}

/// Counts how many distinct indicators occur in `haystack`.
fn count_hits(haystack: &str, indicators: &[&str]) -> usize {
    indicators
        .iter()
        .filter(|indicator| haystack.contains(*indicator))
        .count()
}

#[allow(clippy::cast_precision_loss)]
fn is_references_only(text: &str) -> bool {
    let Some(pattern) = REFERENCE_LINE.as_ref() else {
        return false;
    };

    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if lines.len() <= REFERENCES_MIN_LINES {
        return false;
    }

    let citations = lines.iter().filter(|line| pattern.is_match(line)).count();
    citations as f64 / lines.len() as f64 > REFERENCES_MIN_RATIO
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn article_body() -> String {
        "Researchers reported a new treatment that reduced relapse rates in a \
         large randomized trial. The findings were presented at the annual meeting."
            .to_string()
    }

    // ==================== Ok Verdict Tests ====================

    #[test]
    fn test_classify_plain_article_is_ok() {
        assert_eq!(classify(&article_body()), QualityVerdict::Ok);
    }

    #[test]
    fn test_classify_single_indicator_is_ok() {
        let text = format!("{} Sign in to comment.", article_body());
        assert_eq!(classify(&text), QualityVerdict::Ok);
    }

    #[test]
    fn test_classify_empty_is_failure() {
        let verdict = classify("   \n  ");
        assert_eq!(verdict.reason(), Some(REASON_EMPTY));
    }

    // ==================== Failure Shape Tests ====================

    #[test]
    fn test_classify_bot_challenge_case_insensitive() {
        let verdict = classify("JUST A MOMENT... Please ENABLE JAVASCRIPT and cookies.");
        assert_eq!(verdict.reason(), Some(REASON_BOT_CHALLENGE));
    }

    #[test]
    fn test_classify_paywall() {
        let verdict = classify("Purchase this article. Already a subscriber? Log in.");
        assert_eq!(verdict.reason(), Some(REASON_PAYWALL));
    }

    #[test]
    fn test_classify_ui_chrome_is_case_sensitive() {
        let chrome = "Please choose your region. Select your specialty. Sign in";
        assert_eq!(classify(chrome).reason(), Some(REASON_UI_CHROME));

        let prose = "patients who register early and subscribe to updates";
        assert_eq!(classify(prose), QualityVerdict::Ok);
    }

    #[test]
    fn test_classify_references_only() {
        let refs: Vec<String> = (1..=12)
            .map(|i| format!("{i}. Smith, J. et al. Journal of Things. 2020;{i}:1-10."))
            .collect();
        let verdict = classify(&refs.join("\n"));
        assert_eq!(verdict.reason(), Some(REASON_REFERENCES_ONLY));
    }

    #[test]
    fn test_classify_references_need_more_than_ten_lines() {
        let refs: Vec<String> = (1..=10)
            .map(|i| format!("{i}. Smith, J. et al. Journal of Things."))
            .collect();
        assert_eq!(classify(&refs.join("\n")), QualityVerdict::Ok);
    }

    #[test]
    fn test_classify_references_below_ratio_is_ok() {
        let mut lines: Vec<String> = (1..=8)
            .map(|i| format!("{i}. Smith, J. et al. Journal of Things."))
            .collect();
        lines.extend((0..6).map(|_| article_body()));
        assert_eq!(classify(&lines.join("\n")), QualityVerdict::Ok);
    }

    // ==================== Priority Tests ====================

    #[test]
    fn test_classify_bot_challenge_wins_over_paywall() {
        let text = "Just a moment. Cloudflare. Get access. Subscription options.";
        assert_eq!(classify(text).reason(), Some(REASON_BOT_CHALLENGE));
    }

    #[test]
    fn test_classify_paywall_wins_over_ui() {
        let text = "Get access. Purchase options. Sign in. Register.";
        assert_eq!(classify(text).reason(), Some(REASON_PAYWALL));
    }

    #[test]
    fn test_classify_is_idempotent() {
        let text = "Sign in. Register. Create account.";
        let first = classify(text);
        for _ in 0..5 {
            assert_eq!(classify(text), first);
        }
    }
}
