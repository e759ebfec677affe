//! URL rewrites from binary document links to their HTML article pages.

use url::Url;

/// Rewrites a PDF or EPUB link to the likely HTML sibling.
///
/// Strips a trailing `.pdf` from the path, or removes an `epub` path
/// segment (`/doi/epub/10.1/x` becomes `/doi/10.1/x`). Returns `None`
/// when neither pattern applies or the URL does not parse.
#[must_use]
pub fn rewrite_to_html_sibling(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    let path = parsed.path().to_string();

    let rewritten = if path.to_ascii_lowercase().ends_with(".pdf") {
        path[..path.len() - ".pdf".len()].to_string()
    } else {
        let segments: Vec<&str> = path.split('/').collect();
        if !segments.iter().any(|s| s.eq_ignore_ascii_case("epub")) {
            return None;
        }
        segments
            .into_iter()
            .filter(|s| !s.eq_ignore_ascii_case("epub"))
            .collect::<Vec<_>>()
            .join("/")
    };

    if rewritten.is_empty() || rewritten == path {
        return None;
    }
    parsed.set_path(&rewritten);
    Some(parsed.to_string())
}
