//! Two-phase article processing: parallel fetch/extract, then sequential
//! summarization.
//!
//! # Overview
//!
//! [`Pipeline::fetch_all`] fetches and extracts every article with a bounded
//! worker pool. Each worker:
//!
//! 1. Fetches through the [`Fetcher`] cascade and records the strategy in
//!    the [`StrategyTally`]
//! 2. Extracts HTML to Markdown (Markdown results are only validated)
//! 3. Strips cruft and checks word count and quality
//! 4. Retries thin or rejected HTML extractions once through the Markdown
//!    providers, with the cache disabled
//!
//! Results are re-sorted to input order. [`Pipeline::complete`] then
//! summarizes the survivors one at a time, in order, since the local model
//! server cannot take concurrent requests. A failed article is recorded as
//! `(url, reason)` and never aborts the batch.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use digest_core::fetch::{FetchCache, FetchConfig, Fetcher, HttpStrategy, DomainHeaders};
//! use digest_core::pipeline::{Article, Pipeline, PipelineOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let http = HttpStrategy::new(DomainHeaders::default(), std::time::Duration::from_secs(1))?;
//! let fetcher = Arc::new(Fetcher::new(Arc::new(FetchCache::new()), Arc::new(http), Vec::new()));
//! let pipeline = Pipeline::new(fetcher, FetchConfig::default(), PipelineOptions::default());
//! let report = pipeline
//!     .run(vec![Article::from_url("https://example.com/story")], None)
//!     .await?;
//! println!("{} failures", report.failures.len());
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

use crate::extract::markdown::validate_markdown;
use crate::extract::{extract, strip_cruft, word_count};
use crate::fetch::{ContentFormat, FetchConfig, FetchOutcome, Fetcher};
use crate::quality::classify;
use crate::summarize::{Summarizer, SummarizerError, SummaryResult};

/// Default fetch worker count.
pub const DEFAULT_MAX_WORKERS: usize = 5;

/// Articles under this many words are rejected.
pub const DEFAULT_MIN_WORDS: usize = 100;

/// Articles under this many words are accepted with a warning.
pub const DEFAULT_WARN_WORDS: usize = 200;

/// One link to process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    /// Headline.
    #[serde(default)]
    pub title: String,
    /// Article URL.
    pub url: String,
    /// Publishing outlet.
    #[serde(default)]
    pub publisher: String,
    /// Teaser text from the link source.
    #[serde(default)]
    pub snippet: String,
}

impl Article {
    /// Article known only by URL; the URL doubles as the title.
    #[must_use]
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            title: url.clone(),
            url,
            ..Self::default()
        }
    }
}

/// Article that survived phase 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedArticle {
    /// Position in the input list.
    pub index: usize,
    /// Source link.
    #[serde(flatten)]
    pub article: Article,
    /// Cruft-stripped Markdown.
    pub content: String,
    /// Strategy label that produced the final content.
    pub strategy: String,
    /// Format the content was fetched in.
    pub format: ContentFormat,
    /// Words in `content`.
    pub word_count: usize,
    /// Fetched HTML, when the content was extracted from a page.
    #[serde(skip)]
    pub source_html: Option<String>,
}

/// A URL that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Article URL.
    pub url: String,
    /// Failure reason, without the URL.
    pub reason: String,
}

/// Accepted summary together with its source link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleSummary {
    /// Source link.
    #[serde(flatten)]
    pub article: Article,
    /// Summary.
    #[serde(flatten)]
    pub summary: SummaryResult,
}

/// Per-strategy fetch counts, shared by the fetch workers.
#[derive(Debug, Default)]
pub struct StrategyTally {
    counts: Mutex<BTreeMap<String, usize>>,
}

impl StrategyTally {
    /// Empty tally.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one fetch under `label`.
    pub fn record(&self, label: &str) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        *counts.entry(label.to_string()).or_insert(0) += 1;
    }

    /// Copy of the current counts, sorted by label.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, usize> {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `label=count` pairs joined by `, `.
    #[must_use]
    pub fn summary_line(&self) -> String {
        self.snapshot()
            .iter()
            .map(|(label, count)| format!("{label}={count}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Phase 1 result, in input order.
#[derive(Debug, Clone, Default)]
pub struct FetchPhase {
    /// Articles ready to summarize.
    pub extracted: Vec<ExtractedArticle>,
    /// Failures with their input index.
    pub failures: Vec<(usize, Failure)>,
}

/// Final run report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Accepted summaries in input order.
    pub summaries: Vec<ArticleSummary>,
    /// Failed URLs in input order.
    pub failures: Vec<Failure>,
    /// Fetches per strategy label.
    pub fetch_summary: BTreeMap<String, usize>,
}

/// Pipeline knobs.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Concurrent fetch workers.
    pub max_workers: usize,
    /// Minimum accepted word count.
    pub min_words: usize,
    /// Word count below which a warning is logged.
    pub warn_words: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            min_words: DEFAULT_MIN_WORDS,
            warn_words: DEFAULT_WARN_WORDS,
        }
    }
}

/// Batch driver over a shared [`Fetcher`].
#[derive(Debug)]
pub struct Pipeline {
    fetcher: Arc<Fetcher>,
    fetch_config: FetchConfig,
    options: PipelineOptions,
    tally: Arc<StrategyTally>,
    fetched: Arc<AtomicUsize>,
}

impl Pipeline {
    /// Creates a pipeline; a zero worker count is treated as one.
    #[must_use]
    pub fn new(fetcher: Arc<Fetcher>, fetch_config: FetchConfig, options: PipelineOptions) -> Self {
        Self {
            fetcher,
            fetch_config,
            options: PipelineOptions {
                max_workers: options.max_workers.max(1),
                ..options
            },
            tally: Arc::new(StrategyTally::new()),
            fetched: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Strategy tally for this pipeline.
    #[must_use]
    pub fn tally(&self) -> &Arc<StrategyTally> {
        &self.tally
    }

    /// Counter of articles finished in phase 1, for progress display.
    #[must_use]
    pub fn fetched_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.fetched)
    }

    /// Phase 1: fetches and extracts every article in parallel.
    #[instrument(skip(self, articles), fields(count = articles.len(), workers = self.options.max_workers))]
    pub async fn fetch_all(&self, articles: &[Article]) -> FetchPhase {
        let semaphore = Arc::new(Semaphore::new(self.options.max_workers));
        let mut handles = Vec::with_capacity(articles.len());

        info!("starting fetch phase");
        for (index, article) in articles.iter().cloned().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let fetcher = Arc::clone(&self.fetcher);
            let cfg = self.fetch_config.clone();
            let options = self.options;
            let tally = Arc::clone(&self.tally);
            let fetched = Arc::clone(&self.fetched);
            let url = article.url.clone();

            let handle = tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return Err("worker pool closed".to_string());
                };
                let result =
                    fetch_and_extract(&fetcher, &cfg, options, &tally, index, article).await;
                fetched.fetch_add(1, Ordering::SeqCst);
                result
            });
            handles.push((index, url, handle));
        }

        let mut phase = FetchPhase::default();
        for (index, url, handle) in handles {
            match handle.await {
                Ok(Ok(extracted)) => phase.extracted.push(extracted),
                Ok(Err(reason)) => phase.failures.push((index, Failure { url, reason })),
                Err(e) => {
                    error!(url = %url, error = %e, "fetch task panicked");
                    phase.failures.push((
                        index,
                        Failure {
                            url,
                            reason: format!("unexpected error: {e}"),
                        },
                    ));
                }
            }
        }
        phase.extracted.sort_by_key(|a| a.index);
        phase.failures.sort_by_key(|(index, _)| *index);

        info!(summary = %self.tally.summary_line(), "fetch summary");
        info!(
            extracted = phase.extracted.len(),
            failed = phase.failures.len(),
            "fetch phase complete"
        );
        phase
    }

    /// Phase 2: summarizes articles one at a time, in order.
    ///
    /// Per-article failures are returned with their input index.
    ///
    /// # Errors
    ///
    /// Returns [`SummarizerError`] only for errors fatal to the whole run.
    #[instrument(skip_all, fields(count = extracted.len()))]
    pub async fn summarize_all(
        &self,
        extracted: &[ExtractedArticle],
        summarizer: &Summarizer,
    ) -> Result<(Vec<ArticleSummary>, Vec<(usize, Failure)>), SummarizerError> {
        let mut summaries = Vec::new();
        let mut failures = Vec::new();
        for item in extracted {
            let article = &item.article;
            match summarizer
                .summarize(&article.title, &article.url, &item.content)
                .await
            {
                Ok(summary) => {
                    info!(title = %article.title, backend = %summary.backend, "summarized");
                    summaries.push(ArticleSummary {
                        article: article.clone(),
                        summary,
                    });
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!(url = %article.url, error = %e, "summarize failed");
                    failures.push((
                        item.index,
                        Failure {
                            url: article.url.clone(),
                            reason: format!("summarize failed: {e}"),
                        },
                    ));
                }
            }
        }
        Ok((summaries, failures))
    }

    /// Runs phase 2 over a phase 1 result and builds the report.
    ///
    /// With no summarizer the report carries no summaries (fetch-only runs).
    ///
    /// # Errors
    ///
    /// Returns [`SummarizerError`] only for errors fatal to the whole run.
    pub async fn complete(
        &self,
        phase: FetchPhase,
        summarizer: Option<&Summarizer>,
    ) -> Result<Report, SummarizerError> {
        let FetchPhase {
            extracted,
            mut failures,
        } = phase;

        let mut summaries = Vec::new();
        if let Some(summarizer) = summarizer {
            let (done, failed) = self.summarize_all(&extracted, summarizer).await?;
            summaries = done;
            failures.extend(failed);
        }
        failures.sort_by_key(|(index, _)| *index);

        Ok(Report {
            summaries,
            failures: failures.into_iter().map(|(_, f)| f).collect(),
            fetch_summary: self.tally.snapshot(),
        })
    }

    /// Runs both phases.
    ///
    /// # Errors
    ///
    /// Returns [`SummarizerError`] only for errors fatal to the whole run.
    pub async fn run(
        &self,
        articles: Vec<Article>,
        summarizer: Option<&Summarizer>,
    ) -> Result<Report, SummarizerError> {
        let phase = self.fetch_all(&articles).await;
        self.complete(phase, summarizer).await
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn log_fetch(url: &str, outcome: &FetchOutcome, label: &str) {
    info!(
        url = %url,
        strategy = label,
        format = outcome.format.as_str(),
        duration_ms = millis(outcome.duration),
        removed_sections = outcome.removed_sections.len(),
        "fetch complete"
    );
}

/// Why an extraction should go through the Markdown providers, if at all.
fn retry_reason(words: usize, content: &str, min_words: usize) -> Option<String> {
    if words < min_words {
        return Some(format!("insufficient content ({words} words)"));
    }
    classify(content).reason().map(ToString::to_string)
}

#[instrument(skip(fetcher, cfg, options, tally, article), fields(url = %article.url))]
async fn fetch_and_extract(
    fetcher: &Fetcher,
    cfg: &FetchConfig,
    options: PipelineOptions,
    tally: &StrategyTally,
    index: usize,
    article: Article,
) -> Result<ExtractedArticle, String> {
    let url = article.url.as_str();
    let outcome = fetcher.fetch(url, cfg).await.map_err(|e| {
        error!(reason = %e.reason(), "fetch failed");
        e.reason().to_string()
    })?;

    let mut label = outcome.strategy_label();
    log_fetch(url, &outcome, &label);
    tally.record(&label);

    let (content, source_html) = match outcome.format {
        ContentFormat::Html => {
            let extraction = extract(&outcome.content, url);
            debug!(extractor = ?extraction.extractor, "extracted page");
            (extraction.markdown, Some(outcome.content.clone()))
        }
        ContentFormat::Markdown => {
            let warnings = validate_markdown(&outcome.content);
            if !warnings.is_empty() {
                warn!(warnings = %warnings.join(", "), "markdown validation");
            }
            (outcome.content.clone(), None)
        }
    };
    let mut content = strip_cruft(&content);
    let mut format = outcome.format;
    let mut source_html = source_html;
    let mut words = word_count(&content);

    let should_retry = outcome.format == ContentFormat::Html;
    let retried = match retry_reason(words, &content, options.min_words) {
        Some(reason) if should_retry => {
            warn!(reason = %reason, "thin extraction; trying markdown fallback");
            let retry_cfg = FetchConfig {
                allow_cache: false,
                ..cfg.clone()
            };
            let fallback = fetcher
                .fetch_markdown_fallback(url, &retry_cfg)
                .await
                .map_err(|e| {
                    let failure = format!("{reason}; markdown fallback failed: {}", e.reason());
                    error!(reason = %failure, "retry failed");
                    failure
                })?;
            label = fallback.strategy_label();
            tally.record(&label);
            info!(
                strategy = %label,
                duration_ms = millis(fallback.duration),
                "fetch retry complete"
            );
            content = strip_cruft(&fallback.content);
            format = fallback.format;
            source_html = None;
            words = word_count(&content);
            true
        }
        _ => false,
    };

    let suffix = if retried { " (after fallback)" } else { "" };
    if words < options.min_words {
        let reason = format!("only {words} words extracted{suffix}");
        error!(reason = %reason, "insufficient content");
        return Err(reason);
    }
    if let Some(reason) = classify(&content).reason() {
        error!(reason, suffix, "quality check failed");
        return Err(reason.to_string());
    }
    if words < options.warn_words {
        warn!(words, "short content; summary quality may be poor");
    }

    Ok(ExtractedArticle {
        index,
        article,
        content,
        strategy: label,
        format,
        word_count: words,
        source_html,
    })
}
