//! Structured LLM summaries with validation, retry and backend fallback.
//!
//! # Overview
//!
//! [`Summarizer::summarize`] runs a bounded state machine per article:
//!
//! 1. Classify the article type with a short auxiliary call ([`ArticleType`]);
//!    any failure falls back to [`ArticleType::News`]
//! 2. Build the type-specific prompt ([`prompt::build_prompt`])
//! 3. Call the backend chain ([`backend::BackendSelector`])
//! 4. Parse JSON first, then text ([`parse::parse_output`])
//! 5. Validate ([`validate::validate`]); on rejection, repeat steps 3-5 once
//!
//! Bracketed tags in bullets are normalized to a fixed emoji vocabulary
//! ([`tags::normalize_tags`]) as part of parsing.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use digest_core::summarize::{Summarizer, SummarizerOptions};
//! use digest_core::summarize::backend::{BackendSelector, LmStudioBackend, LmStudioConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let lmstudio = LmStudioBackend::new(LmStudioConfig::new("http://localhost:1234", "qwen3"))?;
//! let summarizer = Summarizer::new(
//!     BackendSelector::auto(Arc::new(lmstudio), None),
//!     SummarizerOptions::default(),
//! );
//! let result = summarizer
//!     .summarize("Title", "https://example.com/a", "Article body ...")
//!     .await?;
//! for bullet in &result.bullets {
//!     println!("{bullet}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
mod error;
pub mod parse;
pub mod prompt;
pub mod tags;
pub mod validate;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use backend::{BackendOutcome, BackendSelector, ResponseFormat};
pub use error::SummarizerError;
use parse::{ParsedOutput, parse_actionability, parse_output};
use validate::{Accepted, validate};

/// Total CALL/PARSE/VALIDATE rounds per article.
pub const MAX_ATTEMPTS: u32 = 2;

/// Default prompt content budget in characters.
pub const DEFAULT_MAX_CONTENT_CHARS: usize = 24_000;

/// Article category used to pick a prompt template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArticleType {
    /// Peer-reviewed study, trial result, preprint.
    Research,
    /// General reporting.
    News,
    /// Commentary, editorial, interview.
    Opinion,
    /// Company or institutional announcement.
    PressRelease,
}

impl ArticleType {
    /// All types, in prompt order.
    pub const ALL: [Self; 4] = [Self::Research, Self::News, Self::Opinion, Self::PressRelease];

    /// Uppercase identifier the classifier answers with.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Research => "RESEARCH",
            Self::News => "NEWS",
            Self::Opinion => "OPINION",
            Self::PressRelease => "PRESS_RELEASE",
        }
    }

    /// Parses a classifier reply such as `"research"` or `"Press release."`.
    #[must_use]
    pub fn parse(reply: &str) -> Option<Self> {
        let normalized = reply
            .trim()
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_ascii_uppercase()
            .replace([' ', '-'], "_");
        Self::ALL.into_iter().find(|t| t.as_str() == normalized)
    }
}

impl fmt::Display for ArticleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One summary line, optionally labeled (`**LABEL**: text`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bullet {
    /// Label without the surrounding `**`, e.g. `TACTICAL WIN [🚀]`.
    pub label: Option<String>,
    /// Bullet body.
    pub text: String,
}

impl Bullet {
    /// Labeled bullet.
    #[must_use]
    pub fn labeled(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            text: text.into(),
        }
    }

    /// Unlabeled bullet.
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            label: None,
            text: text.into(),
        }
    }
}

impl fmt::Display for Bullet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "**{label}**: {}", self.text),
            None => f.write_str(&self.text),
        }
    }
}

/// Accepted summary. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryResult {
    /// Parsed bullets in output order.
    pub bullets: Vec<Bullet>,
    /// Actionability indicator (`emoji label`), when the model gave one.
    pub actionability: Option<String>,
    /// Model that produced the summary.
    pub model: String,
    /// Backend that produced the summary.
    pub backend: String,
    /// Attempt on which validation passed (1 or 2).
    pub attempts: u32,
    /// Classified article type.
    pub article_type: ArticleType,
    /// True when accepted as prose rather than labeled bullets.
    pub prose: bool,
}

/// Summarizer knobs.
#[derive(Debug, Clone)]
pub struct SummarizerOptions {
    /// Article content budget for the prompt.
    pub max_content_chars: usize,
}

impl Default for SummarizerOptions {
    fn default() -> Self {
        Self {
            max_content_chars: DEFAULT_MAX_CONTENT_CHARS,
        }
    }
}

/// Article summarizer over a backend chain.
#[derive(Debug)]
pub struct Summarizer {
    selector: BackendSelector,
    options: SummarizerOptions,
}

impl Summarizer {
    /// Creates a summarizer.
    #[must_use]
    pub fn new(selector: BackendSelector, options: SummarizerOptions) -> Self {
        Self { selector, options }
    }

    /// The backend chain in use.
    #[must_use]
    pub fn selector(&self) -> &BackendSelector {
        &self.selector
    }

    /// Buckets `content` into an [`ArticleType`]. Never fails.
    pub async fn classify_type(&self, content: &str) -> ArticleType {
        let prompt = prompt::classification_prompt(content);
        match self
            .selector
            .primary()
            .complete(&prompt, ResponseFormat::Text)
            .await
        {
            BackendOutcome::Success(reply) => ArticleType::parse(&reply).unwrap_or_else(|| {
                warn!(reply = %reply.trim(), "unrecognized article type; using NEWS");
                ArticleType::News
            }),
            BackendOutcome::RecoverableFailure(message) | BackendOutcome::FatalFailure(message) => {
                warn!(error = %message, "article classification failed; using NEWS");
                ArticleType::News
            }
        }
    }

    /// Summarizes one article.
    ///
    /// # Errors
    ///
    /// Returns [`SummarizerError`] when the backends fail, when no bullets can
    /// be parsed, or when both attempts fail validation.
    #[instrument(skip(self, title, content), fields(chars = content.len()))]
    pub async fn summarize(
        &self,
        title: &str,
        url: &str,
        content: &str,
    ) -> Result<SummaryResult, SummarizerError> {
        let article_type = self.classify_type(content).await;
        info!(article_type = %article_type, "classified article");

        let prompt =
            prompt::build_prompt(title, content, article_type, self.options.max_content_chars);

        let mut last_error = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            let reply = self.selector.complete(&prompt, url).await?;
            debug!(
                backend = %reply.backend,
                attempt,
                chars = reply.text.len(),
                "raw model output received"
            );

            let parsed = parse_output(&reply.text);
            if parsed.bullets().is_empty() {
                return Err(SummarizerError::NoBullets {
                    backend: reply.backend,
                });
            }

            match validate(&parsed, &reply.text) {
                Ok(accepted) => {
                    info!(backend = %reply.backend, attempt, "summary accepted");
                    let actionability = parse_actionability(&reply.text);
                    return Ok(SummaryResult {
                        bullets: into_bullets(parsed),
                        actionability,
                        model: reply.model,
                        backend: reply.backend,
                        attempts: attempt,
                        article_type,
                        prose: matches!(accepted, Accepted::Prose { .. }),
                    });
                }
                Err(message) => {
                    if attempt < MAX_ATTEMPTS {
                        warn!(error = %message, attempt, "summary rejected; retrying");
                    } else {
                        warn!(error = %message, attempt, "summary rejected; attempts exhausted");
                    }
                    last_error = message;
                }
            }
        }

        Err(SummarizerError::ValidationExhausted {
            attempts: MAX_ATTEMPTS,
            message: last_error,
        })
    }
}

fn into_bullets(parsed: ParsedOutput) -> Vec<Bullet> {
    match parsed {
        ParsedOutput::Structured(bullets) | ParsedOutput::Prose { sentences: bullets, .. } => {
            bullets
        }
        ParsedOutput::Unparseable => Vec::new(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::backend::LlmBackend;
    use super::*;

    const VALID: &str = "- **KEY FINDING**: Bullet one\n\
                         - **TACTICAL WIN [Production]**: Bullet two\n\
                         - **MARKET SIGNAL [Adoption]**: Bullet three\n\
                         - **CONCERN**: Bullet four";

    /// Answers classification prompts with `RESEARCH` and summary prompts
    /// from a script.
    struct Scripted {
        replies: Mutex<Vec<BackendOutcome>>,
        summary_calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(replies: Vec<BackendOutcome>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                summary_calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmBackend for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "test-model"
        }

        async fn complete(&self, _prompt: &str, format: ResponseFormat) -> BackendOutcome {
            if format == ResponseFormat::Text {
                return BackendOutcome::Success("RESEARCH".to_string());
            }
            *self.summary_calls.lock().unwrap() += 1;
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                BackendOutcome::RecoverableFailure("script exhausted".to_string())
            } else {
                replies.remove(0)
            }
        }
    }

    fn summarizer(backend: Arc<Scripted>) -> Summarizer {
        Summarizer::new(BackendSelector::pinned(backend), SummarizerOptions::default())
    }

    // ==================== ArticleType Tests ====================

    #[test]
    fn test_article_type_parse() {
        assert_eq!(ArticleType::parse("RESEARCH"), Some(ArticleType::Research));
        assert_eq!(ArticleType::parse(" opinion.\n"), Some(ArticleType::Opinion));
        assert_eq!(ArticleType::parse("Press release"), Some(ArticleType::PressRelease));
        assert_eq!(ArticleType::parse("blog"), None);
    }

    #[test]
    fn test_bullet_display() {
        assert_eq!(
            Bullet::labeled("KEY FINDING", "Survival improved").to_string(),
            "**KEY FINDING**: Survival improved"
        );
        assert_eq!(Bullet::plain("plain").to_string(), "plain");
    }

    // ==================== Summarize Tests ====================

    #[tokio::test]
    async fn test_valid_output_accepted_first_attempt() {
        let backend = Scripted::new(vec![BackendOutcome::Success(VALID.to_string())]);
        let result = summarizer(backend)
            .summarize("T", "https://a.example", "body")
            .await
            .unwrap();
        assert_eq!(result.attempts, 1);
        assert_eq!(result.bullets.len(), 4);
        assert_eq!(result.bullets[0].to_string(), "**KEY FINDING**: Bullet one");
        assert_eq!(result.article_type, ArticleType::Research);
        assert_eq!(result.model, "test-model");
        assert!(!result.prose);
    }

    #[tokio::test]
    async fn test_invalid_then_valid_accepts_on_second_attempt() {
        let backend = Scripted::new(vec![
            BackendOutcome::Success("- one\n- two".to_string()),
            BackendOutcome::Success(VALID.to_string()),
        ]);
        let result = summarizer(Arc::clone(&backend))
            .summarize("T", "https://a.example", "body")
            .await
            .unwrap();
        assert_eq!(result.attempts, 2);
        assert_eq!(*backend.summary_calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_two_invalid_outputs_exhaust() {
        let backend = Scripted::new(vec![
            BackendOutcome::Success("- one\n- two".to_string()),
            BackendOutcome::Success("- one\n- two".to_string()),
        ]);
        let err = summarizer(backend)
            .summarize("T", "https://a.example", "body")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Summary validation failed after 2 attempts: Expected 3-4 bullets, got 2, \
             and output not valid prose (11 chars)"
        );
    }

    #[tokio::test]
    async fn test_empty_output_reports_no_bullets() {
        let backend = Scripted::new(vec![BackendOutcome::Success("   ".to_string())]);
        let err = summarizer(backend)
            .summarize("T", "https://a.example", "body")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No summary bullets returned by scripted");
    }

    #[tokio::test]
    async fn test_classification_failure_defaults_to_news() {
        struct Failing;

        #[async_trait]
        impl LlmBackend for Failing {
            fn name(&self) -> &str {
                "failing"
            }
            fn model(&self) -> &str {
                "m"
            }
            async fn complete(&self, _prompt: &str, _format: ResponseFormat) -> BackendOutcome {
                BackendOutcome::RecoverableFailure("down".to_string())
            }
        }

        let summarizer = Summarizer::new(
            BackendSelector::pinned(Arc::new(Failing)),
            SummarizerOptions::default(),
        );
        assert_eq!(summarizer.classify_type("text").await, ArticleType::News);
    }
}
