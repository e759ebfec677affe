//! Jina AI reader: a remote service that returns pages as Markdown.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, instrument};

use super::error::{ClientBuildError, StrategyError};
use super::{FetchConfig, FetchStrategy, FetchedContent, StrategyKind};
use crate::user_agent::default_api_user_agent;

/// Public reader endpoint.
pub const JINA_DEFAULT_BASE_URL: &str = "https://r.jina.ai";

/// Default request timeout.
const JINA_TIMEOUT: Duration = Duration::from_secs(30);

const ERROR_BODY_CHARS: usize = 200;

/// Jina request failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Jina AI failed for {url}: {message}")]
pub struct JinaError {
    /// Page requested.
    pub url: String,
    /// What went wrong.
    pub message: String,
}

impl JinaError {
    fn new(url: &str, message: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            message: message.into(),
        }
    }
}

/// Markdown provider backed by the Jina reader API.
#[derive(Debug, Clone)]
pub struct JinaProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl JinaProvider {
    /// Creates a provider; requests fail fast when `api_key` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientBuildError`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, ClientBuildError> {
        let client = Client::builder()
            .user_agent(default_api_user_agent())
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            timeout: JINA_TIMEOUT,
        })
    }

    /// Overrides the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetches `url` as Markdown.
    ///
    /// # Errors
    ///
    /// Returns [`JinaError`] for a missing key, timeout, non-2xx status or
    /// an empty body.
    #[instrument(skip(self))]
    pub async fn fetch_markdown(&self, url: &str) -> Result<String, JinaError> {
        let Some(key) = self.api_key.as_deref() else {
            return Err(JinaError::new(url, "JINA_API_KEY not configured"));
        };

        let response = self
            .client
            .get(format!("{}/{url}", self.base_url))
            .bearer_auth(key)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    JinaError::new(url, format!("timeout after {}s", self.timeout.as_secs()))
                } else {
                    JinaError::new(url, format!("request error: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| JinaError::new(url, format!("failed to read body: {e}")))?;
        if !status.is_success() {
            let snippet: String = body.chars().take(ERROR_BODY_CHARS).collect();
            return Err(JinaError::new(
                url,
                format!("HTTP {}: {}", status.as_u16(), snippet.trim()),
            ));
        }
        if body.trim().is_empty() {
            return Err(JinaError::new(url, "empty response"));
        }
        debug!(chars = body.len(), "jina returned markdown");
        Ok(body)
    }
}

#[async_trait]
impl FetchStrategy for JinaProvider {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Jina
    }

    fn applies(&self, _url: &str) -> bool {
        true
    }

    async fn attempt(
        &self,
        url: &str,
        _cfg: &FetchConfig,
    ) -> Result<FetchedContent, StrategyError> {
        self.fetch_markdown(url)
            .await
            .map(FetchedContent::markdown)
            .map_err(|e| StrategyError::failed(e.message))
    }
}
