//! Acceptance rules for parsed summaries.
//!
//! A reply is accepted when it has 3-4 bullets whose concatenated text
//! contains every required label, or when the whole reply is prose of
//! 100-2000 characters. Label presence is a substring check over the joined
//! bullets, so the order of labels does not matter.

use tracing::debug;

use super::parse::ParsedOutput;

/// Labels that must all appear in structured output.
pub const REQUIRED_LABELS: [&str; 4] = [
    "**KEY FINDING**",
    "**TACTICAL WIN",
    "**MARKET SIGNAL",
    "**CONCERN**",
];

/// Accepted bullet count range.
const MIN_BULLETS: usize = 3;
const MAX_BULLETS: usize = 4;

/// Accepted prose length range, in characters.
const MIN_PROSE_CHARS: usize = 100;
const MAX_PROSE_CHARS: usize = 2000;

/// Why a reply was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepted {
    /// 3-4 bullets with every required label.
    Structured,
    /// Coherent prose within the length bounds.
    Prose {
        /// Trimmed reply length.
        chars: usize,
    },
}

/// Validates a parsed reply against the acceptance rules.
///
/// # Errors
///
/// Returns the rejection message used for retry logging and the final error.
pub fn validate(parsed: &ParsedOutput, raw: &str) -> Result<Accepted, String> {
    let bullets = parsed.bullets();
    let count = bullets.len();

    let mut missing: Vec<&str> = Vec::new();
    if (MIN_BULLETS..=MAX_BULLETS).contains(&count) {
        let joined = bullets
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        missing = REQUIRED_LABELS
            .iter()
            .copied()
            .filter(|label| !joined.contains(label))
            .collect();
        debug!(count, missing = ?missing, "checked bullet labels");
        if missing.is_empty() {
            return Ok(Accepted::Structured);
        }
    }

    let chars = raw.trim().chars().count();
    if (MIN_PROSE_CHARS..=MAX_PROSE_CHARS).contains(&chars) {
        debug!(chars, "accepting prose");
        return Ok(Accepted::Prose { chars });
    }

    Err(if count < MIN_BULLETS {
        format!("Expected 3-4 bullets, got {count}, and output not valid prose ({chars} chars)")
    } else if count > MAX_BULLETS {
        format!("Expected 3-4 bullets, got {count}")
    } else {
        format!(
            "Expected 3-4 bullets with required labels, got {count} bullets with missing labels: {}",
            missing.join(", ")
        )
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::parse::parse_output;
    use super::*;

    fn check(raw: &str) -> Result<Accepted, String> {
        validate(&parse_output(raw), raw)
    }

    #[test]
    fn test_four_labeled_bullets_any_order() {
        let raw = "- **CONCERN**: d\n- **MARKET SIGNAL [🟡]**: c\n- **KEY FINDING**: a\n- **TACTICAL WIN [🚀]**: b";
        assert_eq!(check(raw).unwrap(), Accepted::Structured);
    }

    #[test]
    fn test_three_bullets_may_carry_all_labels() {
        let raw = "- **KEY FINDING**: a\n- **TACTICAL WIN [🚀]**: b\n- **MARKET SIGNAL [⚫]**: c and **CONCERN**: d";
        assert_eq!(check(raw).unwrap(), Accepted::Structured);
    }

    #[test]
    fn test_missing_labels_short_output_rejected() {
        let raw = "- **KEY FINDING**: a\n- b\n- c\n- d";
        assert_eq!(
            check(raw).unwrap_err(),
            "Expected 3-4 bullets with required labels, got 4 bullets with missing labels: \
             **TACTICAL WIN, **MARKET SIGNAL, **CONCERN**"
        );
    }

    #[test]
    fn test_too_many_bullets_rejected() {
        let raw = "- a\n- b\n- c\n- d\n- e";
        assert_eq!(check(raw).unwrap_err(), "Expected 3-4 bullets, got 5");
    }

    #[test]
    fn test_prose_in_bounds_accepted() {
        let raw = "The trial enrolled 400 patients and met its primary endpoint with a clear \
                   survival benefit. Safety was consistent with earlier studies overall";
        assert!(matches!(check(raw).unwrap(), Accepted::Prose { .. }));
    }

    #[test]
    fn test_long_unstructured_output_rejected() {
        let raw = "word ".repeat(500);
        let err = check(&raw).unwrap_err();
        assert!(err.starts_with("Expected 3-4 bullets, got 1, and output not valid prose"));
    }
}
