//! Model output parsing: JSON first, then line-oriented text.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use super::Bullet;
use super::tags::normalize_tags;

/// Sentence-split output keeps at most this many sentences.
const MAX_SENTENCES: usize = 4;

static LABELED: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\*\*([^*]+?)\*\*\s*:\s*(.*)$").ok());

static ACTIONABILITY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\*\*ACTIONABILITY\*\*:\s*([^\n]+)").ok());

/// Result of parsing one model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedOutput {
    /// JSON bullets, or explicit bullet / numbered-list lines.
    Structured(Vec<Bullet>),
    /// No bullet markers; the reply is prose, split into sentences.
    Prose {
        /// Raw reply, trimmed.
        text: String,
        /// First sentences, decimal-safe.
        sentences: Vec<Bullet>,
    },
    /// Nothing usable.
    Unparseable,
}

impl ParsedOutput {
    /// Bullets for validation: structured bullets or prose sentences.
    #[must_use]
    pub fn bullets(&self) -> &[Bullet] {
        match self {
            Self::Structured(bullets) | Self::Prose { sentences: bullets, .. } => bullets,
            Self::Unparseable => &[],
        }
    }
}

#[derive(Deserialize)]
struct JsonSummary {
    bullets: Option<Vec<JsonBullet>>,
    actionability: Option<JsonActionability>,
}

#[derive(Deserialize)]
struct JsonBullet {
    label: String,
    text: String,
}

#[derive(Deserialize)]
struct JsonActionability {
    emoji: String,
    label: String,
}

/// Strips a surrounding Markdown code fence, if any.
fn unfence(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map_or(trimmed, str::trim)
}

fn parse_json(raw: &str) -> Option<JsonSummary> {
    serde_json::from_str(unfence(raw)).ok()
}

/// Parses a model reply.
#[must_use]
pub fn parse_output(raw: &str) -> ParsedOutput {
    if let Some(bullets) = parse_json(raw).and_then(|summary| summary.bullets) {
        let bullets: Vec<Bullet> = bullets
            .into_iter()
            .map(|b| Bullet::labeled(normalize_tags(b.label.trim()), normalize_tags(b.text.trim())))
            .collect();
        return if bullets.is_empty() {
            ParsedOutput::Unparseable
        } else {
            ParsedOutput::Structured(bullets)
        };
    }

    let marked = marker_lines(raw);
    if !marked.is_empty() {
        return ParsedOutput::Structured(marked.iter().map(|line| to_bullet(line)).collect());
    }

    let text = raw.trim();
    if text.is_empty() {
        return ParsedOutput::Unparseable;
    }
    let sentences = sentence_split(text)
        .into_iter()
        .take(MAX_SENTENCES)
        .map(|s| to_bullet(&s))
        .collect();
    ParsedOutput::Prose {
        text: text.to_string(),
        sentences,
    }
}

/// Returns the `emoji label` actionability indicator, if the reply has one.
#[must_use]
pub fn parse_actionability(raw: &str) -> Option<String> {
    if let Some(act) = parse_json(raw).and_then(|summary| summary.actionability) {
        return Some(format!("{} {}", act.emoji.trim(), act.label.trim()));
    }
    ACTIONABILITY
        .as_ref()?
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Lines starting with `- `, `* `, `• ` or `N. ` / `N) `, markers removed.
fn marker_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter_map(strip_marker)
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("**ACTIONABILITY**"))
        .map(ToString::to_string)
        .collect()
}

fn strip_marker(line: &str) -> Option<&str> {
    for marker in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(rest);
        }
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let rest = &line[digits..];
    rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") "))
}

fn to_bullet(line: &str) -> Bullet {
    let line = normalize_tags(line);
    if let Some(caps) = LABELED.as_ref().and_then(|re| re.captures(&line)) {
        let label = caps.get(1).map_or("", |m| m.as_str()).trim();
        let text = caps.get(2).map_or("", |m| m.as_str()).trim();
        return Bullet::labeled(label, text);
    }
    Bullet::plain(line)
}

/// Splits on `.`, `!` and `?` without breaking decimals like `0.74` or `(p<0.05)`.
#[must_use]
pub fn sentence_split(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut buffer = String::new();

    for (i, &c) in chars.iter().enumerate() {
        buffer.push(c);
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let prev = i.checked_sub(1).and_then(|j| chars.get(j)).copied();
        let next = chars.get(i + 1).copied();
        if prev.is_some_and(|p| p.is_ascii_digit())
            && next.is_some_and(|n| n.is_ascii_digit() || n == ')')
        {
            continue;
        }
        let sentence = buffer.trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        buffer.clear();
    }
    let rest = buffer.trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==================== JSON Tests ====================

    #[test]
    fn test_json_bullets_are_labeled() {
        let raw = r#"{"bullets":[{"label":"KEY FINDING","text":"A"},{"label":"TACTICAL WIN [SHIP NOW]","text":"B"}],
                     "actionability":{"emoji":"🚀","label":"Act now"}}"#;
        let parsed = parse_output(raw);
        let bullets = parsed.bullets();
        assert!(matches!(parsed, ParsedOutput::Structured(_)));
        assert_eq!(bullets[0].to_string(), "**KEY FINDING**: A");
        assert_eq!(bullets[1].label.as_deref(), Some("TACTICAL WIN [🚀]"));
        assert_eq!(parse_actionability(raw).as_deref(), Some("🚀 Act now"));
    }

    #[test]
    fn test_fenced_json_is_accepted() {
        let raw = "```json\n{\"bullets\":[{\"label\":\"CONCERN\",\"text\":\"x\"}]}\n```";
        assert_eq!(parse_output(raw).bullets().len(), 1);
    }

    #[test]
    fn test_json_without_bullets_falls_back_to_text() {
        let parsed = parse_output(r#"{"summary": "nope"}"#);
        assert!(matches!(parsed, ParsedOutput::Prose { .. }));
    }

    // ==================== Text Tests ====================

    #[test]
    fn test_marker_lines() {
        let raw = "Intro line\n- **KEY FINDING**: one\n* two\n• three\n1. four\n2) five\n**ACTIONABILITY**: 👀 Watch";
        let parsed = parse_output(raw);
        let texts: Vec<String> = parsed.bullets().iter().map(ToString::to_string).collect();
        assert_eq!(texts, vec!["**KEY FINDING**: one", "two", "three", "four", "five"]);
        assert_eq!(parse_actionability(raw).as_deref(), Some("👀 Watch"));
    }

    #[test]
    fn test_prose_split_into_labeled_sentences() {
        let raw = "**KEY FINDING**: One. **TACTICAL WIN [tag]**: Two. \
                   **MARKET SIGNAL [tag]**: Three. **CONCERN**: Four.";
        let parsed = parse_output(raw);
        let bullets = parsed.bullets();
        assert_eq!(bullets.len(), 4);
        assert_eq!(bullets[0].label.as_deref(), Some("KEY FINDING"));
        assert_eq!(bullets[3].to_string(), "**CONCERN**: Four.");
    }

    #[test]
    fn test_sentence_split_keeps_decimals() {
        let sentences = sentence_split("AUC was 0.74 overall. Hazard ratio 1.2 (p<0.05). Done");
        assert_eq!(
            sentences,
            vec!["AUC was 0.74 overall.", "Hazard ratio 1.2 (p<0.05).", "Done"]
        );
    }

    #[test]
    fn test_sentence_split_keeps_decimal_before_paren() {
        let sentences = sentence_split("Value (3.) stays. Next.");
        assert_eq!(sentences, vec!["Value (3.) stays.", "Next."]);
    }

    #[test]
    fn test_prose_keeps_first_four_sentences() {
        let parsed = parse_output("A. B. C. D. E. F.");
        assert_eq!(parsed.bullets().len(), 4);
    }

    #[test]
    fn test_empty_output_unparseable() {
        assert_eq!(parse_output("  \n "), ParsedOutput::Unparseable);
        assert!(parse_actionability("no tag here").is_none());
    }
}
