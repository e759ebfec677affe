//! Container-scoring main-content extractor.
//!
//! Scores every `article`, `main`, `section` and `div` by text volume,
//! penalizing link-heavy blocks and skipping containers whose class or id
//! names page furniture. The winner is converted to Markdown whole, which
//! favors recall over precision.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::html_to_markdown;

const ARTICLE_BONUS: i64 = 500;
const MAIN_BONUS: i64 = 300;
const LINK_HEAVY_PENALTY: i64 = 500;

/// Class/id tokens that mark a container as page furniture.
const BOILERPLATE_TOKENS: &[&str] = &[
    "nav",
    "navbar",
    "menu",
    "sidebar",
    "footer",
    "header",
    "banner",
    "cookie",
    "consent",
    "ads",
    "advert",
    "promo",
    "subscribe",
    "newsletter",
    "related",
    "share",
    "comments",
];

static CANDIDATES: LazyLock<Option<Selector>> =
    LazyLock::new(|| Selector::parse("article, main, section, div").ok());
static LINKS: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse("a").ok());
static BODY: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse("body").ok());

/// Returns Markdown for the best content container, or `None` when the
/// page yields nothing convertible.
pub(super) fn extract_main(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let best = best_container(&document);

    let fragment = match best {
        Some(element) => element.html(),
        None => {
            let body = BODY.as_ref()?;
            document.select(body).next()?.html()
        }
    };

    let markdown = html_to_markdown(&fragment)?;
    let markdown = collapse_blank_runs(&markdown);
    if markdown.trim().is_empty() {
        None
    } else {
        Some(markdown)
    }
}

fn best_container(document: &Html) -> Option<ElementRef<'_>> {
    let candidates = CANDIDATES.as_ref()?;
    document
        .select(candidates)
        .filter(|element| !is_boilerplate(element))
        .map(|element| (score(&element), element))
        .filter(|(score, _)| *score > 0)
        .max_by_key(|(score, _)| *score)
        .map(|(_, element)| element)
}

#[allow(clippy::cast_possible_wrap)]
fn score(element: &ElementRef<'_>) -> i64 {
    let text_chars: usize = element.text().map(|t| t.trim().len()).sum();
    let link_chars: usize = LINKS.as_ref().map_or(0, |links| {
        element
            .select(links)
            .flat_map(|a| a.text())
            .map(|t| t.trim().len())
            .sum()
    });

    let mut score = text_chars as i64 - 2 * link_chars as i64;
    match element.value().name() {
        "article" => score += ARTICLE_BONUS,
        "main" => score += MAIN_BONUS,
        _ => {}
    }
    if text_chars > 0 && link_chars * 2 > text_chars {
        score -= LINK_HEAVY_PENALTY;
    }
    score
}

fn is_boilerplate(element: &ElementRef<'_>) -> bool {
    let value = element.value();
    [value.attr("class"), value.id()]
        .into_iter()
        .flatten()
        .flat_map(|attr| attr.split(|c: char| !c.is_ascii_alphanumeric()))
        .any(|token| {
            let token = token.to_ascii_lowercase();
            BOILERPLATE_TOKENS.contains(&token.as_str())
        })
}

/// Trims trailing whitespace per line and keeps at most one blank line in a row.
pub(super) fn collapse_blank_runs(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut previous_blank = true;
    for line in text.lines().map(str::trim_end) {
        let blank = line.trim().is_empty();
        if blank && previous_blank {
            continue;
        }
        out.push(if blank { "" } else { line });
        previous_blank = blank;
    }
    while out.last().is_some_and(|line| line.is_empty()) {
        out.pop();
    }
    out.join("\n")
}
