//! HTML to Markdown extraction for article pages.
//!
//! # Overview
//!
//! [`extract`] turns raw page HTML into canonical Markdown:
//!
//! 1. The HTML is sanitized ([`sanitize_html`]) so control bytes cannot
//!    trip the parser.
//! 2. The primary, recall-favoring extractor picks the highest-scoring
//!    content container and converts it.
//! 3. Its output is accepted only when it has at least
//!    [`MIN_PRIMARY_WORDS`] words and passes [`crate::quality::classify`].
//!    Otherwise the readability-based fallback runs once, unconditionally.
//! 4. Line-oriented cruft (DOI lines, citation-service links, bare URLs) is
//!    removed by [`strip_cruft`].
//!
//! Markdown that arrives already converted (from the remote providers) goes
//! through [`markdown::clean_markdown`] and [`strip_cruft`] instead.

mod cruft;
mod fallback;
pub mod markdown;
mod primary;

use std::borrow::Cow;

use tracing::debug;

use crate::quality;

pub use cruft::strip_cruft;

/// Minimum word count for the primary extractor's output to be accepted.
pub const MIN_PRIMARY_WORDS: usize = 100;

/// Tags never carried into the Markdown output.
pub(crate) const NOISE_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "aside", "form", "noscript", "iframe", "svg",
];

/// Which extractor produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorKind {
    /// Container-scoring extractor.
    Primary,
    /// Readability heuristic with tag stripping.
    Fallback,
}

/// Markdown produced from an HTML page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Cruft-stripped Markdown.
    pub markdown: String,
    /// Extractor that produced the Markdown.
    pub extractor: ExtractorKind,
}

/// Removes NUL and control bytes other than tab, CR and LF.
///
/// Returns the input unchanged (borrowed) when nothing needs removing.
#[must_use]
pub fn sanitize_html(html: &str) -> Cow<'_, str> {
    let is_bad = |c: char| c.is_control() && !matches!(c, '\t' | '\r' | '\n');
    if html.chars().any(is_bad) {
        Cow::Owned(html.chars().filter(|c| !is_bad(*c)).collect())
    } else {
        Cow::Borrowed(html)
    }
}

/// Counts whitespace-separated words.
#[must_use]
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Extracts article Markdown from page HTML.
///
/// The fallback is attempted at most once and is never re-gated, so this
/// always returns something (possibly empty) for the caller to judge.
#[must_use]
pub fn extract(html: &str, url: &str) -> Extraction {
    let html = sanitize_html(html);

    if let Some(markdown) = primary::extract_main(&html) {
        let markdown = strip_cruft(&markdown);
        let words = word_count(&markdown);
        let verdict = quality::classify(&markdown);
        if words >= MIN_PRIMARY_WORDS && !verdict.is_failure() {
            return Extraction {
                markdown,
                extractor: ExtractorKind::Primary,
            };
        }
        debug!(
            url = %url,
            words,
            reason = verdict.reason().unwrap_or("too short"),
            "primary extraction rejected; using fallback"
        );
    }

    Extraction {
        markdown: strip_cruft(&fallback::extract_readable(&html, url)),
        extractor: ExtractorKind::Fallback,
    }
}

/// Converts an HTML fragment to Markdown with the shared conversion options.
pub(crate) fn html_to_markdown(html: &str) -> Option<String> {
    let options = htmd::options::Options {
        heading_style: htmd::options::HeadingStyle::Atx,
        code_block_style: htmd::options::CodeBlockStyle::Fenced,
        link_style: htmd::options::LinkStyle::Inlined,
        ..Default::default()
    };
    let converter = htmd::HtmlToMarkdown::builder()
        .options(options)
        .skip_tags(NOISE_TAGS.to_vec())
        .build();
    converter.convert(html).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn paragraph(seed: &str) -> String {
        format!(
            "<p>{seed} researchers describe how the new therapy changed outcomes for patients \
             across several hospitals, with clinicians noting fewer complications and shorter \
             stays than in previous years of observation.</p>"
        )
    }

    fn article_page() -> String {
        let body: String = ["Alpha", "Beta", "Gamma", "Delta", "Epsilon"]
            .iter()
            .map(|s| paragraph(s))
            .collect();
        format!(
            "<html><head><title>T</title><script>var x = 1;</script></head><body>\
             <nav><a href=\"/\">Home</a> <a href=\"/news\">News</a></nav>\
             <article><h1>Therapy Results</h1>{body}\
             <p>https://doi.org/10.1000/xyz123</p></article>\
             <footer>Copyright</footer></body></html>"
        )
    }

    // ==================== Sanitize Tests ====================

    #[test]
    fn test_sanitize_strips_nul_and_controls() {
        let dirty = "<p>a\u{0}b\u{7}c\td\r\ne</p>";
        assert_eq!(sanitize_html(dirty), "<p>abc\td\r\ne</p>");
    }

    #[test]
    fn test_sanitize_borrows_clean_input() {
        assert!(matches!(sanitize_html("<p>fine</p>"), Cow::Borrowed(_)));
    }

    // ==================== Extract Tests ====================

    #[test]
    fn test_extract_uses_primary_for_rich_article() {
        let result = extract(&article_page(), "https://example.com/a");
        assert_eq!(result.extractor, ExtractorKind::Primary);
        assert!(result.markdown.contains("# Therapy Results"));
        assert!(result.markdown.contains("Alpha researchers"));
        assert!(!result.markdown.contains("var x"));
        assert!(!result.markdown.contains("Copyright"));
    }

    #[test]
    fn test_extract_output_has_no_doi_lines() {
        let result = extract(&article_page(), "https://example.com/a");
        assert!(!result.markdown.contains("doi.org"));
    }

    #[test]
    fn test_extract_short_page_uses_fallback() {
        let html = "<html><body><article><p>Too short to accept.</p></article></body></html>";
        let result = extract(html, "https://example.com/short");
        assert_eq!(result.extractor, ExtractorKind::Fallback);
    }

    #[test]
    fn test_extract_challenge_page_uses_fallback() {
        let filler = "word ".repeat(120);
        let html = format!(
            "<html><body><main><p>Just a moment... Checking your browser. {filler}</p></main></body></html>"
        );
        let result = extract(&html, "https://example.com/cf");
        assert_eq!(result.extractor, ExtractorKind::Fallback);
    }

    #[test]
    fn test_extract_survives_control_bytes() {
        let html = article_page().replace("Alpha", "Al\u{0}pha");
        let result = extract(&html, "https://example.com/a");
        assert!(result.markdown.contains("Alpha researchers"));
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("one two\nthree\t four"), 4);
        assert_eq!(word_count("   "), 0);
    }
}
