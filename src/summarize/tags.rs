//! Canonicalizes free-form bracketed tags to the emoji vocabulary.
//!
//! Models write `[🚀 SHIP NOW]`, `[ship now]` or `[SHIP NOW]`; all become
//! `[🚀]`. Placeholder tags copied from the prompt are replaced with a
//! neutral default.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

/// Tag name to emoji, tactical tags first, then market-signal tags.
pub const TAG_EMOJI: [(&str, &str); 6] = [
    ("SHIP NOW", "🚀"),
    ("ROADMAP", "🗺️"),
    ("WATCH", "👀"),
    ("URGENT", "🔴"),
    ("NOTABLE", "🟡"),
    ("CONTEXT", "⚫"),
];

const PLACEHOLDERS: [(&str, &str); 3] = [
    ("[action-tag]", "[🗺️]"),
    ("[urgency-tag]", "[🟡]"),
    ("[TAG]", "[🟡]"),
];

static TAG_PATTERNS: LazyLock<Vec<(Regex, String)>> = LazyLock::new(|| {
    TAG_EMOJI
        .iter()
        .filter_map(|(tag, emoji)| {
            let pattern = format!(r"(?i)\[(?:[^\]]*\s+)?{}\]", regex::escape(tag));
            Regex::new(&pattern).ok().map(|re| (re, format!("[{emoji}]")))
        })
        .collect()
});

/// Rewrites every known tag in `text` to its emoji-only form.
#[must_use]
pub fn normalize_tags(text: &str) -> String {
    let mut result = text.to_string();
    for (pattern, replacement) in TAG_PATTERNS.iter() {
        if pattern.is_match(&result) {
            result = pattern
                .replace_all(&result, replacement.as_str())
                .into_owned();
        }
    }
    for (placeholder, default) in PLACEHOLDERS {
        if result.contains(placeholder) {
            warn!(placeholder, replacement = default, "model emitted placeholder tag");
            result = result.replace(placeholder, default);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_tags_become_emoji() {
        assert_eq!(normalize_tags("TACTICAL WIN [SHIP NOW]"), "TACTICAL WIN [🚀]");
        assert_eq!(normalize_tags("MARKET SIGNAL [notable]"), "MARKET SIGNAL [🟡]");
    }

    #[test]
    fn test_emoji_plus_text_tags_collapse() {
        assert_eq!(normalize_tags("[🚀 SHIP NOW] ship it"), "[🚀] ship it");
        assert_eq!(normalize_tags("[🔴 Urgent]"), "[🔴]");
    }

    #[test]
    fn test_placeholders_get_defaults() {
        assert_eq!(normalize_tags("WIN [action-tag]"), "WIN [🗺️]");
        assert_eq!(normalize_tags("SIGNAL [urgency-tag]"), "SIGNAL [🟡]");
        assert_eq!(normalize_tags("X [TAG]"), "X [🟡]");
    }

    #[test]
    fn test_unrelated_brackets_untouched() {
        assert_eq!(normalize_tags("[Production] rollout"), "[Production] rollout");
    }
}
