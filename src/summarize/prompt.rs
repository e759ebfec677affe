//! Prompt templates, content truncation and the JSON response schema.

use serde_json::{Value, json};

use super::ArticleType;

/// Characters of article text sent to the type classifier.
pub const CLASSIFY_CHARS: usize = 2000;

/// Marker appended when content is cut to fit the context window.
pub const TRUNCATION_MARKER: &str = "\n\n[Content truncated to fit context window]";

const CLASSIFY_TEMPLATE: &str = "Classify the article below into exactly one category.\n\
Answer with one word only: RESEARCH, NEWS, OPINION or PRESS_RELEASE.\n\n\
RESEARCH: a study, trial, preprint or journal paper reporting results.\n\
NEWS: reporting on events, deals, approvals or people.\n\
OPINION: commentary, editorial, perspective or interview.\n\
PRESS_RELEASE: an announcement written by the organization itself.\n\n\
Article:\n";

const OUTPUT_FORMAT: &str = "Write exactly four bullets, one per label, in this order:\n\
- **KEY FINDING**: the single most important fact, with numbers where given.\n\
- **TACTICAL WIN [🚀 SHIP NOW | 🗺️ ROADMAP | 👀 WATCH]**: what a product team could act on.\n\
- **MARKET SIGNAL [🔴 URGENT | 🟡 NOTABLE | ⚫ CONTEXT]**: what this says about the market.\n\
- **CONCERN**: the main limitation, risk or open question.\n\
Pick one tag per bracket. Keep each bullet to one or two sentences.\n\
Finish with **ACTIONABILITY**: followed by an emoji and a short label.";

const RESEARCH_FOCUS: &str = "This is a research article. Focus on study design, population, \
effect sizes and statistical strength. Flag small samples, surrogate endpoints and missing \
controls as concerns.";

const NEWS_FOCUS: &str = "This is a news article. Focus on what happened, who is involved and \
what changes as a result. Separate reported facts from speculation.";

const OPINION_FOCUS: &str = "This is an opinion piece. Summarize the author's central argument \
and the evidence offered for it. Note where claims go beyond the evidence.";

const PRESS_RELEASE_FOCUS: &str = "This is a press release. Extract the concrete announcement \
and any verifiable numbers. Treat promotional claims with skepticism.";

/// Template for `article_type`: type-specific focus followed by the output format.
#[must_use]
pub fn template(article_type: ArticleType) -> String {
    let focus = match article_type {
        ArticleType::Research => RESEARCH_FOCUS,
        ArticleType::News => NEWS_FOCUS,
        ArticleType::Opinion => OPINION_FOCUS,
        ArticleType::PressRelease => PRESS_RELEASE_FOCUS,
    };
    format!("{focus}\n\n{OUTPUT_FORMAT}")
}

/// Classification prompt over the first [`CLASSIFY_CHARS`] characters.
#[must_use]
pub fn classification_prompt(content: &str) -> String {
    let head: String = content.chars().take(CLASSIFY_CHARS).collect();
    format!("{CLASSIFY_TEMPLATE}{head}")
}

/// Truncates `content` to `max_chars`, preferring a sentence boundary.
///
/// A `". "` boundary in the last 20% of the allowance is used when present;
/// otherwise the cut is hard. The truncation marker is appended either way.
#[must_use]
pub fn truncate_content(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }

    let cut = content
        .char_indices()
        .nth(max_chars)
        .map_or(content.len(), |(i, _)| i);
    let truncated = &content[..cut];

    let min_len = content
        .char_indices()
        .nth(max_chars * 4 / 5)
        .map_or(cut, |(i, _)| i);
    let kept = match truncated.rfind(". ") {
        Some(pos) if pos >= min_len => &truncated[..=pos],
        _ => truncated,
    };
    format!("{kept}{TRUNCATION_MARKER}")
}

/// Full summary prompt.
#[must_use]
pub fn build_prompt(
    title: &str,
    content: &str,
    article_type: ArticleType,
    max_content_chars: usize,
) -> String {
    let content = truncate_content(content, max_content_chars);
    let template = template(article_type);
    format!("Title: {title}\n\nArticle content:\n{content}\n\n{template}")
}

/// OpenAI-style `response_format` constraining output to four labeled
/// bullets plus an actionability tag.
#[must_use]
pub fn summary_response_format() -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "article_summary",
            "strict": true,
            "schema": {
                "type": "object",
                "properties": {
                    "bullets": {
                        "type": "array",
                        "minItems": 4,
                        "maxItems": 4,
                        "items": {
                            "type": "object",
                            "properties": {
                                "label": { "type": "string" },
                                "text": { "type": "string" }
                            },
                            "required": ["label", "text"],
                            "additionalProperties": false
                        }
                    },
                    "actionability": {
                        "type": "object",
                        "properties": {
                            "emoji": { "type": "string" },
                            "label": { "type": "string" }
                        },
                        "required": ["emoji", "label"],
                        "additionalProperties": false
                    }
                },
                "required": ["bullets", "actionability"],
                "additionalProperties": false
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_content_untouched() {
        assert_eq!(truncate_content("short text", 100), "short text");
    }

    #[test]
    fn test_truncation_prefers_sentence_boundary() {
        let content = format!("{}. {}", "a".repeat(85), "b".repeat(50));
        let out = truncate_content(&content, 100);
        assert!(out.starts_with(&"a".repeat(85)));
        assert!(out.ends_with(&format!(".{TRUNCATION_MARKER}")));
        assert!(!out.contains('b'));
    }

    #[test]
    fn test_truncation_hard_cut_without_late_boundary() {
        let content = format!("{}. {}", "a".repeat(10), "b".repeat(200));
        let out = truncate_content(&content, 100);
        assert_eq!(out.len(), 100 + TRUNCATION_MARKER.len());
    }

    #[test]
    fn test_build_prompt_layout() {
        let prompt = build_prompt("My Title", "Body text.", ArticleType::News, 1000);
        assert!(prompt.starts_with("Title: My Title\n\nArticle content:\nBody text.\n\n"));
        assert!(prompt.contains("news article"));
        assert!(prompt.contains("**KEY FINDING**"));
    }

    #[test]
    fn test_classification_prompt_limits_content() {
        let prompt = classification_prompt(&"x".repeat(5000));
        assert_eq!(prompt.matches('x').count() - CLASSIFY_TEMPLATE.matches('x').count(), 2000);
    }

    #[test]
    fn test_response_format_requires_bullets() {
        let format = summary_response_format();
        assert_eq!(format["type"], "json_schema");
        assert_eq!(
            format["json_schema"]["schema"]["properties"]["bullets"]["maxItems"],
            4
        );
    }
}
