//! Assembly of the article list from `--links`, positional URLs and/or stdin.

use std::io::{self, IsTerminal, Read};
use std::path::Path;

use anyhow::{Context, Result};
use digest_core::Article;
use tracing::{debug, warn};

/// Reads a `--links` file: a JSON array of `{title, url, publisher, snippet}`.
pub(crate) fn read_links_file(path: &Path) -> Result<Vec<Article>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read links file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("links file {} is not a JSON array of articles", path.display()))
}

/// Parses one URL per line; blank lines and `#` comments are skipped, and
/// anything that is not an http(s) URL is logged and dropped.
pub(crate) fn parse_url_lines(text: &str) -> Vec<Article> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match url::Url::parse(line) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Some(Article::from_url(line)),
            _ => {
                warn!(input = %line, "Skipped unrecognized input");
                None
            }
        })
        .collect()
}

/// Collects articles from the links file, then positional URLs, then piped stdin.
pub(crate) fn collect_articles(links: Option<&Path>, urls: &[String]) -> Result<Vec<Article>> {
    let mut articles = match links {
        Some(path) => read_links_file(path)?,
        None => Vec::new(),
    };
    articles.extend(parse_url_lines(&urls.join("\n")));

    if links.is_none() && urls.is_empty() && !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        articles.extend(parse_url_lines(&buffer));
    }
    debug!(count = articles.len(), "collected articles");
    Ok(articles)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_lines_skips_comments_and_junk() {
        let articles = parse_url_lines(
            "https://a.com/1\n\n# note\nnot a url\nftp://x.org/f\n  https://b.com/2  \n",
        );
        let urls: Vec<_> = articles.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.com/1", "https://b.com/2"]);
        assert_eq!(articles[0].title, "https://a.com/1");
    }

    #[test]
    fn test_read_links_file_fills_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("links.json");
        std::fs::write(
            &path,
            r#"[{"title": "T", "url": "https://a.com/x", "publisher": "P"}]"#,
        )
        .unwrap();
        let articles = read_links_file(&path).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].publisher, "P");
        assert_eq!(articles[0].snippet, "");
    }

    #[test]
    fn test_read_links_file_rejects_object() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("links.json");
        std::fs::write(&path, r#"{"url": "https://a.com"}"#).unwrap();
        let err = read_links_file(&path).unwrap_err();
        assert!(err.to_string().contains("is not a JSON array"));
    }
}
