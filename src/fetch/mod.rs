//! Article fetching through a ranked cascade of strategies.
//!
//! # Overview
//!
//! [`Fetcher::fetch`] drives one URL through the cascade:
//!
//! 1. [`FetchCache`] lookup (HTML namespace, then Markdown namespace)
//! 2. Optional stub manifest (test fixtures, offline runs)
//! 3. [`HttpStrategy`]: direct GET with per-domain headers and backoff retry
//! 4. On a block (403/429/503 or a binary content type): one rewrite to an
//!    HTML sibling URL, then the escalation chain in order:
//!    [`HeadlessStrategy`] for allow-listed domains, then the Markdown
//!    providers [`UrlToMdProvider`] and [`JinaProvider`]
//!
//! Every stage implements [`FetchStrategy`], a uniform
//! `attempt(url, cfg) -> Result<FetchedContent, StrategyError>` interface
//! with an `applies(url)` predicate, so the cascade is a plain ordered list.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use digest_core::fetch::{FetchCache, FetchConfig, Fetcher, HttpStrategy, DomainHeaders};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let http = HttpStrategy::new(DomainHeaders::default(), std::time::Duration::from_secs(1))?;
//! let fetcher = Fetcher::new(Arc::new(FetchCache::new()), Arc::new(http), Vec::new());
//! let outcome = fetcher.fetch("https://example.com/story", &FetchConfig::default()).await?;
//! println!("{} via {}", outcome.content.len(), outcome.strategy_label());
//! # Ok(())
//! # }
//! ```

mod cache;
mod error;
mod headless;
mod http;
mod jina;
mod orchestrator;
mod retry;
mod rewrite;
mod stub;
mod url_to_md;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use cache::{CacheNamespace, FetchCache};
pub use error::{ClientBuildError, FetchError, StrategyError};
pub use headless::{
    HEADLESS_TIMEOUT_FLOOR, HeadlessRenderer, HeadlessStrategy, IsolatedBrowserRenderer,
};
pub use http::{DomainHeaders, HttpStrategy};
pub use jina::{JINA_DEFAULT_BASE_URL, JinaError, JinaProvider};
pub use orchestrator::Fetcher;
pub use retry::{FailureType, RetryDecision, RetryPolicy, classify_http_status};
pub use rewrite::rewrite_to_html_sibling;
pub use stub::{StubError, StubManifest};
pub use url_to_md::{URL_TO_MD_PROGRAM, UrlToMdError, UrlToMdProvider};

/// Default per-request timeout for direct HTTP.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of retries after the first HTTP attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Format of fetched content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    /// Raw page HTML, still needing extraction.
    Html,
    /// Markdown already converted by a remote provider.
    Markdown,
}

impl ContentFormat {
    /// Short lowercase name for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Markdown => "markdown",
        }
    }
}

/// Strategy that produced a [`FetchOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Direct HTTP GET.
    Http,
    /// Headless browser rendering.
    Headless,
    /// Local `url-to-md` converter.
    UrlToMd,
    /// Jina AI reader service.
    Jina,
    /// Stub manifest fixture.
    Stub,
}

impl StrategyKind {
    /// Stable name used in logs, tallies and reports.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Headless => "headless",
            Self::UrlToMd => "url-to-md",
            Self::Jina => "jina",
            Self::Stub => "stub",
        }
    }

    /// Format this strategy returns.
    #[must_use]
    pub fn format(self) -> ContentFormat {
        match self {
            Self::Http | Self::Headless | Self::Stub => ContentFormat::Html,
            Self::UrlToMd | Self::Jina => ContentFormat::Markdown,
        }
    }
}

/// Result of one successful fetch. Created once per URL per run and cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// HTML or cleaned Markdown.
    pub content: String,
    /// Strategy that produced the content.
    pub strategy: StrategyKind,
    /// True when served from the in-memory cache.
    pub from_cache: bool,
    /// Content format.
    pub format: ContentFormat,
    /// Wall time spent fetching; zero for cache hits.
    pub duration: Duration,
    /// Lines removed by Markdown section cleanup.
    pub removed_sections: Vec<String>,
}

impl FetchOutcome {
    /// Strategy name, suffixed with `-cache` for cache hits.
    #[must_use]
    pub fn strategy_label(&self) -> String {
        if self.from_cache {
            format!("{}-cache", self.strategy.name())
        } else {
            self.strategy.name().to_string()
        }
    }

    pub(crate) fn as_cache_hit(&self) -> Self {
        Self {
            from_cache: true,
            duration: Duration::ZERO,
            ..self.clone()
        }
    }
}

/// Raw content returned by a single strategy attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedContent {
    /// Response body or rendered DOM or provider Markdown.
    pub content: String,
    /// Format of `content`.
    pub format: ContentFormat,
}

impl FetchedContent {
    /// HTML content.
    #[must_use]
    pub fn html(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            format: ContentFormat::Html,
        }
    }

    /// Markdown content.
    #[must_use]
    pub fn markdown(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            format: ContentFormat::Markdown,
        }
    }
}

/// Per-call fetch settings.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Per-request timeout for direct HTTP.
    pub timeout: Duration,
    /// Retries after the first HTTP attempt.
    pub max_retries: u32,
    /// Read from and write to the cache.
    pub allow_cache: bool,
    /// Optional URL-to-file fixture manifest.
    pub stub_manifest: Option<PathBuf>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            allow_cache: true,
            stub_manifest: None,
        }
    }
}

/// A single fetch mechanism in the cascade.
///
/// Uses `async_trait` so strategies can be stored as `Arc<dyn FetchStrategy>`.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Which strategy this is.
    fn kind(&self) -> StrategyKind;

    /// Returns true if this strategy should be tried for `url`.
    fn applies(&self, url: &str) -> bool;

    /// Attempts to fetch `url`.
    async fn attempt(&self, url: &str, cfg: &FetchConfig)
    -> Result<FetchedContent, StrategyError>;
}

/// Returns the lowercase host of `url`, if it parses.
pub(crate) fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
}

/// True when `host` equals `domain` or is a subdomain of it.
pub(crate) fn host_matches(host: &str, domain: &str) -> bool {
    let domain = domain.trim().to_ascii_lowercase();
    host == domain || host.ends_with(&format!(".{domain}"))
}
