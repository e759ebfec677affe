//! Readability-based fallback extractor.

use std::io::Cursor;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use super::html_to_markdown;
use super::primary::collapse_blank_runs;

static BODY: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse("body").ok());

/// Placeholder base for pages fetched without a parseable URL.
const PLACEHOLDER_BASE: &str = "http://localhost/";

/// Runs the readability heuristic, converts its output and strips tags.
///
/// Falls back to the plain text of `<body>` when readability fails, so the
/// result is always a (possibly empty) string.
pub(super) fn extract_readable(html: &str, url: &str) -> String {
    let base = Url::parse(url)
        .or_else(|_| Url::parse(PLACEHOLDER_BASE))
        .ok();

    if let Some(base) = base {
        let mut cursor = Cursor::new(html.as_bytes());
        match readability::extractor::extract(&mut cursor, &base) {
            Ok(product) => {
                if let Some(markdown) = html_to_markdown(&product.content) {
                    let markdown = collapse_blank_runs(&markdown);
                    if !markdown.trim().is_empty() {
                        return markdown;
                    }
                }
                if !product.text.trim().is_empty() {
                    return collapse_blank_runs(&product.text);
                }
            }
            Err(error) => debug!(url = %url, error = %error, "readability extraction failed"),
        }
    }

    body_text(html)
}

fn body_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let Some(body) = BODY.as_ref().and_then(|sel| document.select(sel).next()) else {
        return String::new();
    };
    let lines: Vec<&str> = body
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    lines.join("\n")
}
