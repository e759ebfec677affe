//! In-memory fetch cache with separate HTML and Markdown namespaces.
//!
//! The cache lives for one run: it is created by the caller, injected into
//! the [`super::Fetcher`], shared across fetch workers, and cleared with
//! [`FetchCache::clear`] before the next run. There is no TTL or eviction.
//! HTML and Markdown results are kept apart so a hit never returns content
//! in a format the caller did not expect.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::{ContentFormat, FetchOutcome};

/// Cache namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheNamespace {
    /// HTML from direct HTTP, headless rendering or stubs.
    Html,
    /// Cleaned Markdown from remote providers.
    Markdown,
}

impl From<ContentFormat> for CacheNamespace {
    fn from(format: ContentFormat) -> Self {
        match format {
            ContentFormat::Html => Self::Html,
            ContentFormat::Markdown => Self::Markdown,
        }
    }
}

/// URL-keyed cache of fetch outcomes.
#[derive(Debug, Default)]
pub struct FetchCache {
    html: Mutex<HashMap<String, FetchOutcome>>,
    markdown: Mutex<HashMap<String, FetchOutcome>>,
}

impl FetchCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn namespace(&self, namespace: CacheNamespace) -> &Mutex<HashMap<String, FetchOutcome>> {
        match namespace {
            CacheNamespace::Html => &self.html,
            CacheNamespace::Markdown => &self.markdown,
        }
    }

    /// Returns the cached outcome for `url` in `namespace`.
    #[must_use]
    pub fn get(&self, namespace: CacheNamespace, url: &str) -> Option<FetchOutcome> {
        self.namespace(namespace)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
    }

    /// Stores `outcome` for `url` in the namespace matching its format.
    pub fn insert(&self, url: &str, outcome: FetchOutcome) {
        self.namespace(outcome.format.into())
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), outcome);
    }

    /// Number of entries in `namespace`.
    #[must_use]
    pub fn len(&self, namespace: CacheNamespace) -> usize {
        self.namespace(namespace)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True when both namespaces are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len(CacheNamespace::Html) == 0 && self.len(CacheNamespace::Markdown) == 0
    }

    /// Drops every entry in both namespaces.
    pub fn clear(&self) {
        for namespace in [CacheNamespace::Html, CacheNamespace::Markdown] {
            self.namespace(namespace)
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
    }
}
