//! Line-oriented cruft stripper for extracted Markdown.
//!
//! Removes citation scaffolding that survives HTML to Markdown conversion:
//! bare DOI lines, citation-service link rows, angle-bracketed URLs, and
//! rows made only of links. The result never contains a line matching any
//! of these patterns and stripping is idempotent.

use std::sync::LazyLock;

use regex::Regex;

static DOI_ONLY: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:[-*]\s+)?(?:doi:\s*|https?://(?:dx\.)?doi\.org/)10\.\d{4,9}/\S+\s*$",
    )
    .ok()
});

static DOI_LINK_ONLY: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:[-*]\s+)?\[[^\]]*\]\(https?://(?:dx\.)?doi\.org/[^)]*\)\s*$").ok()
});

static CITATION_LINKS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:[-*]\s+)?(?:\[(?:google scholar|crossref|pubmed|pubmed central|cas|web of science|view article|search in google scholar|cite this article|article)\]\([^)]*\)[\s,|·]*)+$",
    )
    .ok()
});

static CITATION_LABELS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:(?:google scholar|crossref|pubmed|view article|search in google scholar|cite this article)[\s,|·]*)+$",
    )
    .ok()
});

static ANGLE_URL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*<https?://[^>\s]+>\s*$").ok());

static LINK_ROW: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*]\s+)?(?:\[[^\]]*\]\([^)]*\)[\s,|·]*){2,}$").ok()
});

fn patterns() -> impl Iterator<Item = &'static Regex> {
    [
        &DOI_ONLY,
        &DOI_LINK_ONLY,
        &CITATION_LINKS,
        &CITATION_LABELS,
        &ANGLE_URL,
        &LINK_ROW,
    ]
    .into_iter()
    .filter_map(|lazy| lazy.as_ref())
}

/// Returns true when `line` is citation cruft.
#[must_use]
pub fn is_cruft_line(line: &str) -> bool {
    patterns().any(|pattern| pattern.is_match(line))
}

/// Removes cruft lines and collapses the blank runs they leave behind.
#[must_use]
pub fn strip_cruft(markdown: &str) -> String {
    let kept: Vec<&str> = markdown
        .lines()
        .filter(|line| !is_cruft_line(line))
        .collect();
    super::primary::collapse_blank_runs(&kept.join("\n"))
}
