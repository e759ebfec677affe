//! Direct HTTP strategy with per-domain headers and backoff retry.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::{debug, instrument, warn};

use super::error::{ClientBuildError, StrategyError};
use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_http_status, is_binary_content_type};
use super::{FetchConfig, FetchStrategy, FetchedContent, StrategyKind, host_matches, host_of};
use crate::user_agent::{BROWSER_ACCEPT, BROWSER_USER_AGENT};

/// Connect timeout for article requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Error bodies are truncated to this many characters in failure reasons.
const ERROR_BODY_CHARS: usize = 200;

/// Extra request headers keyed by domain.
///
/// A domain entry applies to the exact host and to its subdomains, so an
/// entry for `ascopubs.org` also covers `dailynews.ascopubs.org`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainHeaders {
    by_domain: HashMap<String, BTreeMap<String, String>>,
}

impl DomainHeaders {
    /// Builds from a domain to header-map table.
    #[must_use]
    pub fn from_map(map: HashMap<String, BTreeMap<String, String>>) -> Self {
        let by_domain = map
            .into_iter()
            .map(|(domain, headers)| (domain.trim().to_ascii_lowercase(), headers))
            .collect();
        Self { by_domain }
    }

    /// Parses `{"domain": {"Header": "value"}}` JSON.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when the text is not that shape.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json).map(Self::from_map)
    }

    /// Adds entries from `other`, overriding headers with the same name.
    pub fn merge(&mut self, other: Self) {
        for (domain, headers) in other.by_domain {
            self.by_domain.entry(domain).or_default().extend(headers);
        }
    }

    /// True when no domain has extra headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_domain.is_empty()
    }

    /// Headers that apply to `url`.
    #[must_use]
    pub fn for_url(&self, url: &str) -> Vec<(String, String)> {
        let Some(host) = host_of(url) else {
            return Vec::new();
        };
        let mut matched: Vec<(&String, &BTreeMap<String, String>)> = self
            .by_domain
            .iter()
            .filter(|(domain, _)| host_matches(&host, domain))
            .collect();
        // Shorter (broader) domains first so the most specific entry wins.
        matched.sort_by_key(|(domain, _)| domain.len());

        let mut merged = BTreeMap::new();
        for (_, headers) in matched {
            merged.extend(headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged.into_iter().collect()
    }
}

/// Direct HTTP GET presenting a desktop browser identity.
#[derive(Debug, Clone)]
pub struct HttpStrategy {
    client: Client,
    headers: DomainHeaders,
    backoff_base: Duration,
}

struct AttemptFailure {
    failure: FailureType,
    reason: String,
}

impl HttpStrategy {
    /// Creates the strategy with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`ClientBuildError`] if the TLS backend cannot initialize.
    pub fn new(headers: DomainHeaders, backoff_base: Duration) -> Result<Self, ClientBuildError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(BROWSER_USER_AGENT)
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            headers,
            backoff_base,
        })
    }

    async fn get_once(&self, url: &str, timeout: Duration) -> Result<String, AttemptFailure> {
        let mut request = self
            .client
            .get(url)
            .timeout(timeout)
            .header(ACCEPT, BROWSER_ACCEPT);
        for (name, value) in self.headers.for_url(url) {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AttemptFailure {
                    failure: FailureType::Transient,
                    reason: format!("timeout after {}s", timeout.as_secs()),
                }
            } else if e.is_builder() {
                AttemptFailure {
                    failure: FailureType::Permanent,
                    reason: format!("invalid request: {e}"),
                }
            } else {
                AttemptFailure {
                    failure: FailureType::Transient,
                    reason: format!("request error: {e}"),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(ERROR_BODY_CHARS).collect();
            return Err(AttemptFailure {
                failure: classify_http_status(status.as_u16()),
                reason: format!("HTTP {}: {}", status.as_u16(), snippet.trim()),
            });
        }

        if let Some(content_type) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            && is_binary_content_type(content_type)
        {
            return Err(AttemptFailure {
                failure: FailureType::Blocked,
                reason: format!("unsupported content type {content_type}"),
            });
        }

        response.text().await.map_err(|e| AttemptFailure {
            failure: FailureType::Transient,
            reason: format!("failed to read body: {e}"),
        })
    }
}

#[async_trait]
impl FetchStrategy for HttpStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Http
    }

    fn applies(&self, _url: &str) -> bool {
        true
    }

    #[instrument(skip(self, cfg), fields(max_retries = cfg.max_retries))]
    async fn attempt(
        &self,
        url: &str,
        cfg: &FetchConfig,
    ) -> Result<FetchedContent, StrategyError> {
        let policy = RetryPolicy::from_retries(cfg.max_retries, self.backoff_base);
        let mut attempt = 1;
        loop {
            match self.get_once(url, cfg.timeout).await {
                Ok(body) => {
                    debug!(attempt, bytes = body.len(), "http fetch succeeded");
                    return Ok(FetchedContent::html(body));
                }
                Err(AttemptFailure { failure, reason }) => {
                    if failure == FailureType::Blocked {
                        debug!(reason = %reason, "blocked; escalating");
                        return Err(StrategyError::blocked(reason));
                    }
                    match policy.should_retry(failure, attempt) {
                        RetryDecision::Retry {
                            delay,
                            attempt: next,
                        } => {
                            warn!(
                                attempt,
                                delay_ms = delay.as_millis(),
                                reason = %reason,
                                "http attempt failed; retrying"
                            );
                            tokio::time::sleep(delay).await;
                            attempt = next;
                        }
                        RetryDecision::DoNotRetry { .. } if failure == FailureType::Permanent => {
                            return Err(StrategyError::failed(reason));
                        }
                        RetryDecision::DoNotRetry { .. } => {
                            return Err(StrategyError::failed(format!(
                                "exhausted retries (last error: {reason})"
                            )));
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn headers() -> DomainHeaders {
        DomainHeaders::from_json(
            r#"{
                "ascopubs.org": {"Referer": "https://ascopubs.org/", "X-Level": "base"},
                "dailynews.ascopubs.org": {"X-Level": "sub"}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_domain_headers_match_subdomains() {
        let h = headers().for_url("https://ascopubs.org/doi/1");
        assert!(h.contains(&("Referer".to_string(), "https://ascopubs.org/".to_string())));

        let sub = headers().for_url("https://dailynews.ascopubs.org/x");
        assert!(sub.contains(&("X-Level".to_string(), "sub".to_string())));
        assert!(sub.iter().any(|(k, _)| k == "Referer"));
    }

    #[test]
    fn test_domain_headers_ignore_other_hosts() {
        assert!(headers().for_url("https://example.com/").is_empty());
        assert!(headers().for_url("not a url").is_empty());
    }

    #[test]
    fn test_domain_headers_merge_overrides() {
        let mut base = headers();
        base.merge(DomainHeaders::from_json(r#"{"ascopubs.org": {"X-Level": "env"}}"#).unwrap());
        let h = base.for_url("https://ascopubs.org/");
        assert!(h.contains(&("X-Level".to_string(), "env".to_string())));
    }

    #[test]
    fn test_domain_headers_rejects_bad_json() {
        assert!(DomainHeaders::from_json("[1, 2]").is_err());
    }

    #[test]
    fn test_http_strategy_applies_everywhere() {
        let strategy = HttpStrategy::new(DomainHeaders::default(), Duration::ZERO).unwrap();
        assert!(strategy.applies("https://anything.example/"));
        assert_eq!(strategy.kind(), StrategyKind::Http);
    }
}
