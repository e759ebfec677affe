//! Cleanup and sanity checks for Markdown returned by remote providers.
//!
//! Providers hand back whole-page Markdown, including contact blocks and
//! "More ..." link sections. [`clean_markdown`] drops those blocks (each
//! block runs until the next blank line) and reports the removed lines so the
//! fetch log can show what was cut.

use std::sync::LazyLock;

use regex::Regex;

/// Markdown shorter than this draws a "short" warning.
const SHORT_MARKDOWN_CHARS: usize = 100;

/// Fewer newlines than this draws a "no paragraphs" warning.
const MIN_NEWLINES: usize = 3;

static SECTION_STARTS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Telephone / contact bullet
        r"^\s*\*\s+\[\+?\d",
        // "## More ..." headings
        r"(?i)^\s*##\s+more\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Removes navigation and contact sections from provider Markdown.
///
/// Returns the cleaned Markdown and every removed line, trimmed. Blank-line
/// runs are collapsed to one and leading/trailing blank lines are dropped.
#[must_use]
pub fn clean_markdown(markdown: &str) -> (String, Vec<String>) {
    let mut cleaned: Vec<&str> = Vec::new();
    let mut removed: Vec<String> = Vec::new();
    let mut skipping = false;

    for line in markdown.lines() {
        let stripped = line.trim();
        if stripped.is_empty() {
            skipping = false;
            cleaned.push("");
            continue;
        }
        if SECTION_STARTS.iter().any(|p| p.is_match(line)) {
            removed.push(stripped.to_string());
            skipping = true;
            continue;
        }
        if skipping {
            removed.push(stripped.to_string());
            continue;
        }
        cleaned.push(line.trim_end());
    }

    let mut normalized: Vec<&str> = Vec::with_capacity(cleaned.len());
    let mut blank_streak = 0;
    for line in cleaned {
        if line.trim().is_empty() {
            blank_streak += 1;
        } else {
            blank_streak = 0;
        }
        if blank_streak < 2 {
            normalized.push(line);
        }
    }
    let start = normalized
        .iter()
        .position(|l| !l.trim().is_empty())
        .unwrap_or(normalized.len());
    let end = normalized
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .map_or(start, |i| i + 1);

    (normalized[start..end].join("\n"), removed)
}

/// Returns warnings describing likely quality problems in provider Markdown.
#[must_use]
pub fn validate_markdown(markdown: &str) -> Vec<String> {
    let stripped = markdown.trim();
    let mut warnings = Vec::new();
    if stripped.is_empty() {
        warnings.push("empty".to_string());
    }
    let chars = stripped.chars().count();
    if chars < SHORT_MARKDOWN_CHARS {
        warnings.push(format!("short ({chars} chars)"));
    }
    if stripped.matches('\n').count() < MIN_NEWLINES {
        warnings.push("no paragraphs".to_string());
    }
    warnings
}
