//! Article Digest Core Library
//!
//! This library fetches article content from arbitrary URLs despite anti-bot
//! defenses, paywalls and rendering quirks, extracts it to Markdown, and
//! produces a structured LLM summary under bounded retry and fallback rules.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`quality`] - Heuristic classifier for paywall, bot-challenge and UI-chrome text
//! - [`extract`] - HTML to Markdown extraction and cruft stripping
//! - [`fetch`] - Strategy cascade (HTTP, headless browser, Markdown providers) with cache
//! - [`process`] - Isolated subprocess execution with process-group kill
//! - [`render`] - Headless Chromium page rendering
//! - [`summarize`] - LLM backend selection, output parsing and validation
//! - [`pipeline`] - Parallel fetch/extract phase followed by sequential summarization
//! - [`corpus`] - Optional on-disk snapshot of extracted articles
//! - [`config`] - Layered settings (defaults, TOML file, environment)

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod corpus;
pub mod extract;
pub mod fetch;
pub mod pipeline;
pub mod process;
pub mod quality;
pub mod render;
pub mod summarize;
mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, Settings};
pub use corpus::{CorpusError, iter_corpus, load_corpus, save_corpus};
pub use extract::{extract, strip_cruft};
pub use fetch::{
    ContentFormat, FetchCache, FetchConfig, FetchError, FetchOutcome, Fetcher, StrategyKind,
};
pub use pipeline::{Article, ExtractedArticle, Pipeline, Report};
pub use quality::{QualityVerdict, classify};
pub use summarize::{Summarizer, SummarizerError, SummaryResult};
