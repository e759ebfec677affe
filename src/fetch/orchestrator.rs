//! Drives one URL through cache, stubs, direct HTTP and the escalation chain.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use super::cache::{CacheNamespace, FetchCache};
use super::error::{FetchError, StrategyError};
use super::rewrite::rewrite_to_html_sibling;
use super::stub::{StubError, StubManifest};
use super::{ContentFormat, FetchConfig, FetchOutcome, FetchStrategy, FetchedContent, StrategyKind};
use crate::extract::markdown::clean_markdown;
use crate::extract::strip_cruft;

/// Fetch orchestrator.
///
/// Holds the injected run cache, the primary HTTP strategy and the ordered
/// escalation chain. Cheap to share behind an `Arc` across fetch workers.
pub struct Fetcher {
    cache: Arc<FetchCache>,
    primary: Arc<dyn FetchStrategy>,
    escalation: Vec<Arc<dyn FetchStrategy>>,
    stubs: Mutex<HashMap<PathBuf, Arc<StubManifest>>>,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("primary", &self.primary.kind())
            .field(
                "escalation",
                &self.escalation.iter().map(|s| s.kind()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    /// Creates an orchestrator.
    ///
    /// `escalation` is tried in order after the primary strategy reports a
    /// block; each entry is skipped when its `applies` predicate is false.
    #[must_use]
    pub fn new(
        cache: Arc<FetchCache>,
        primary: Arc<dyn FetchStrategy>,
        escalation: Vec<Arc<dyn FetchStrategy>>,
    ) -> Self {
        Self {
            cache,
            primary,
            escalation,
            stubs: Mutex::new(HashMap::new()),
        }
    }

    /// The run cache shared with this orchestrator.
    #[must_use]
    pub fn cache(&self) -> &Arc<FetchCache> {
        &self.cache
    }

    /// Fetches `url` through the full cascade.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] once every applicable strategy has failed,
    /// carrying the last concrete failure reason of each.
    #[instrument(skip(self, cfg), fields(allow_cache = cfg.allow_cache))]
    pub async fn fetch(&self, url: &str, cfg: &FetchConfig) -> Result<FetchOutcome, FetchError> {
        if cfg.allow_cache
            && let Some(hit) = self
                .cache
                .get(CacheNamespace::Html, url)
                .or_else(|| self.cache.get(CacheNamespace::Markdown, url))
        {
            debug!(strategy = hit.strategy.name(), "cache hit");
            return Ok(hit.as_cache_hit());
        }

        let started = Instant::now();

        if let Some(manifest) = &cfg.stub_manifest {
            let stubbed = self
                .stub_lookup(manifest, url)
                .map_err(|e| FetchError::new(url, e.to_string()))?;
            if let Some(html) = stubbed {
                let content = FetchedContent::html(html);
                return Ok(self.finish(url, StrategyKind::Stub, content, started, cfg));
            }
        }

        let blocked_reason = match self.primary.attempt(url, cfg).await {
            Ok(content) => return Ok(self.finish(url, self.primary.kind(), content, started, cfg)),
            Err(StrategyError::Failed { reason }) => return Err(FetchError::new(url, reason)),
            Err(StrategyError::Blocked { reason }) => reason,
        };
        info!(reason = %blocked_reason, "direct fetch blocked; escalating");

        if let Some(sibling) = rewrite_to_html_sibling(url) {
            match self.primary.attempt(&sibling, cfg).await {
                Ok(content) => {
                    info!(sibling = %sibling, "html sibling fetched");
                    return Ok(self.finish(url, self.primary.kind(), content, started, cfg));
                }
                Err(e) => debug!(sibling = %sibling, reason = %e, "html sibling failed"),
            }
        }

        let applicable: Vec<&Arc<dyn FetchStrategy>> =
            self.escalation.iter().filter(|s| s.applies(url)).collect();
        if applicable.is_empty() {
            return Err(FetchError::new(url, blocked_reason));
        }
        self.run_chain(url, cfg, started, &applicable).await
    }

    /// Fetches `url` with only the Markdown providers.
    ///
    /// Used to retry articles whose HTML extraction came out thin or failed
    /// the quality check.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when every Markdown provider fails.
    #[instrument(skip(self, cfg))]
    pub async fn fetch_markdown_fallback(
        &self,
        url: &str,
        cfg: &FetchConfig,
    ) -> Result<FetchOutcome, FetchError> {
        if cfg.allow_cache
            && let Some(hit) = self.cache.get(CacheNamespace::Markdown, url)
        {
            return Ok(hit.as_cache_hit());
        }

        let providers: Vec<&Arc<dyn FetchStrategy>> = self
            .escalation
            .iter()
            .filter(|s| s.kind().format() == ContentFormat::Markdown && s.applies(url))
            .collect();
        if providers.is_empty() {
            return Err(FetchError::new(url, "no markdown provider configured"));
        }
        self.run_chain(url, cfg, Instant::now(), &providers).await
    }

    async fn run_chain(
        &self,
        url: &str,
        cfg: &FetchConfig,
        started: Instant,
        chain: &[&Arc<dyn FetchStrategy>],
    ) -> Result<FetchOutcome, FetchError> {
        let mut browser_failures = Vec::new();
        let mut markdown_failures = Vec::new();

        for strategy in chain {
            let kind = strategy.kind();
            match strategy.attempt(url, cfg).await {
                Ok(content) => return Ok(self.finish(url, kind, content, started, cfg)),
                Err(e) => {
                    warn!(strategy = kind.name(), reason = %e, "strategy failed");
                    let entry = format!("{}: {}", kind.name(), e.reason());
                    match kind.format() {
                        ContentFormat::Html => browser_failures.push(entry),
                        ContentFormat::Markdown => markdown_failures.push(entry),
                    }
                }
            }
        }

        Err(FetchError::new(
            url,
            compose_failure(&browser_failures, &markdown_failures),
        ))
    }

    fn finish(
        &self,
        url: &str,
        strategy: StrategyKind,
        content: FetchedContent,
        started: Instant,
        cfg: &FetchConfig,
    ) -> FetchOutcome {
        let format = content.format;
        let (content, removed_sections) = match format {
            ContentFormat::Html => (content.content, Vec::new()),
            ContentFormat::Markdown => {
                let (cleaned, removed) = clean_markdown(&content.content);
                (strip_cruft(&cleaned), removed)
            }
        };

        let outcome = FetchOutcome {
            content,
            strategy,
            from_cache: false,
            format,
            duration: started.elapsed(),
            removed_sections,
        };
        if cfg.allow_cache {
            self.cache.insert(url, outcome.clone());
        }
        outcome
    }

    fn stub_lookup(&self, manifest: &Path, url: &str) -> Result<Option<String>, StubError> {
        let key = manifest
            .canonicalize()
            .unwrap_or_else(|_| manifest.to_path_buf());
        let loaded = {
            let stubs = self.stubs.lock().unwrap_or_else(PoisonError::into_inner);
            stubs.get(&key).cloned()
        };
        let stubs = match loaded {
            Some(stubs) => stubs,
            None => {
                let stubs = Arc::new(StubManifest::load(manifest)?);
                self.stubs
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(key, Arc::clone(&stubs));
                stubs
            }
        };
        stubs.lookup(url)
    }
}

fn compose_failure(browser: &[String], markdown: &[String]) -> String {
    let mut parts = Vec::new();
    if !browser.is_empty() {
        parts.push(browser.join("; "));
    }
    if !markdown.is_empty() {
        parts.push(format!("markdown fallback failed ({})", markdown.join("; ")));
    }
    parts.join("; ")
}
