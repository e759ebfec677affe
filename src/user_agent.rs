//! Shared browser identity for HTTP fetches and headless rendering.
//!
//! Article sites routinely refuse non-browser agents, so both the plain HTTP
//! strategy and the Chromium renderer present the same desktop Safari identity.

/// Desktop Safari User-Agent used for article fetches.
pub(crate) const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15";

/// Accept header matching what the browser would send for a navigation.
pub(crate) const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8";

/// Default User-Agent for API traffic (LLM backends, Markdown providers).
#[must_use]
pub(crate) fn default_api_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("article-digest/{version}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_user_agent_looks_like_safari() {
        assert!(BROWSER_USER_AGENT.starts_with("Mozilla/5.0"));
        assert!(BROWSER_USER_AGENT.contains("Safari/"));
    }

    #[test]
    fn test_api_user_agent_contains_crate_version() {
        let ua = default_api_user_agent();
        assert_eq!(
            Some(env!("CARGO_PKG_VERSION")),
            ua.strip_prefix("article-digest/"),
            "API UA must contain crate version"
        );
    }
}
