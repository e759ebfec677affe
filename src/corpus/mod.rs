//! On-disk snapshot of extracted articles.
//!
//! A corpus lets phase 2 be re-run (for prompt or model comparisons)
//! without fetching again. Layout:
//!
//! ```text
//! <dir>/
//! ├── metadata.json           {source, timestamp, article_count, corpus_hash}
//! ├── articles.json           article list, pretty JSON with trailing newline
//! ├── article-000.content.md  extracted Markdown
//! └── article-000.source.html fetched HTML (empty when fetched as Markdown)
//! ```
//!
//! `corpus_hash` is the SHA-256 of `articles.json`, checked on load.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::fetch::ContentFormat;
use crate::pipeline::{Article, ExtractedArticle};

const METADATA_FILE: &str = "metadata.json";
const ARTICLES_FILE: &str = "articles.json";

/// Errors reading or writing a corpus.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// A required file is absent.
    #[error("missing {file} in {}", dir.display())]
    Missing {
        /// File name.
        file: &'static str,
        /// Corpus directory.
        dir: PathBuf,
    },

    /// `articles.json` does not match the stored hash.
    #[error("corpus integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch {
        /// Hash from `metadata.json`.
        expected: String,
        /// Hash of the file on disk.
        actual: String,
    },

    /// Filesystem failure.
    #[error("corpus IO error at {}: {source}", path.display())]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Malformed JSON.
    #[error("invalid corpus JSON in {}: {source}", path.display())]
    Json {
        /// File being parsed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl CorpusError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Contents of `metadata.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusMetadata {
    /// Where the links came from (input file or `args`).
    pub source: String,
    /// RFC 3339 UTC save time.
    pub timestamp: String,
    /// Entries in `articles.json`.
    pub article_count: usize,
    /// SHA-256 hex digest of `articles.json`.
    pub corpus_hash: String,
}

/// One entry of `articles.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusEntry {
    /// Position in the original input.
    pub index: usize,
    /// Source link.
    #[serde(flatten)]
    pub article: Article,
    /// Strategy label that produced the content.
    pub strategy: String,
    /// Fetch format.
    pub format: ContentFormat,
    /// Content file name, relative to the corpus directory.
    pub content_path: String,
    /// HTML file name, relative to the corpus directory.
    pub source_path: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn write(path: &Path, contents: &str) -> Result<(), CorpusError> {
    fs::write(path, contents).map_err(|e| CorpusError::io(path, e))
}

fn read(dir: &Path, file: &'static str) -> Result<String, CorpusError> {
    let path = dir.join(file);
    if !path.exists() {
        return Err(CorpusError::Missing {
            file,
            dir: dir.to_path_buf(),
        });
    }
    fs::read_to_string(&path).map_err(|e| CorpusError::io(&path, e))
}

/// Writes `articles` to `dir`, creating it if needed.
///
/// # Errors
///
/// Returns [`CorpusError`] on any IO or serialization failure.
#[instrument(skip(articles), fields(dir = %dir.display(), count = articles.len()))]
pub fn save_corpus(
    dir: &Path,
    source: &str,
    articles: &[ExtractedArticle],
) -> Result<CorpusMetadata, CorpusError> {
    fs::create_dir_all(dir).map_err(|e| CorpusError::io(dir, e))?;

    let mut entries = Vec::with_capacity(articles.len());
    for (position, item) in articles.iter().enumerate() {
        let content_path = format!("article-{position:03}.content.md");
        let source_path = format!("article-{position:03}.source.html");
        write(&dir.join(&content_path), &item.content)?;
        write(
            &dir.join(&source_path),
            item.source_html.as_deref().unwrap_or_default(),
        )?;
        entries.push(CorpusEntry {
            index: item.index,
            article: item.article.clone(),
            strategy: item.strategy.clone(),
            format: item.format,
            content_path,
            source_path,
        });
    }

    let articles_path = dir.join(ARTICLES_FILE);
    let mut articles_json =
        serde_json::to_string_pretty(&entries).map_err(|e| CorpusError::json(&articles_path, e))?;
    articles_json.push('\n');
    write(&articles_path, &articles_json)?;

    let metadata = CorpusMetadata {
        source: source.to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false),
        article_count: entries.len(),
        corpus_hash: sha256_hex(articles_json.as_bytes()),
    };
    let metadata_path = dir.join(METADATA_FILE);
    let mut metadata_json = serde_json::to_string_pretty(&metadata)
        .map_err(|e| CorpusError::json(&metadata_path, e))?;
    metadata_json.push('\n');
    write(&metadata_path, &metadata_json)?;

    info!(hash = %metadata.corpus_hash, "corpus saved");
    Ok(metadata)
}

/// Reads the metadata and verifies `articles.json` against its hash.
///
/// # Errors
///
/// Returns [`CorpusError::Missing`] for absent files and
/// [`CorpusError::IntegrityMismatch`] when the hash does not match.
pub fn verify_corpus(dir: &Path) -> Result<CorpusMetadata, CorpusError> {
    let metadata_json = read(dir, METADATA_FILE)?;
    let metadata: CorpusMetadata = serde_json::from_str(&metadata_json)
        .map_err(|e| CorpusError::json(&dir.join(METADATA_FILE), e))?;
    let articles_json = read(dir, ARTICLES_FILE)?;
    let actual = sha256_hex(articles_json.as_bytes());
    if actual != metadata.corpus_hash {
        return Err(CorpusError::IntegrityMismatch {
            expected: metadata.corpus_hash,
            actual,
        });
    }
    Ok(metadata)
}

/// Verifies and loads every article whose content file is present.
///
/// # Errors
///
/// Returns [`CorpusError`] when verification fails or a file is unreadable.
#[instrument(fields(dir = %dir.display()))]
pub fn load_corpus(dir: &Path) -> Result<(CorpusMetadata, Vec<ExtractedArticle>), CorpusError> {
    let metadata = verify_corpus(dir)?;
    let articles = iter_corpus(dir)?.collect::<Result<Vec<_>, _>>()?;
    info!(count = articles.len(), source = %metadata.source, "corpus loaded");
    Ok((metadata, articles))
}

/// Lazily yields corpus articles without hash verification.
///
/// Entries whose content file is missing are skipped with a warning.
///
/// # Errors
///
/// Returns [`CorpusError`] if `articles.json` is missing or malformed.
pub fn iter_corpus(dir: &Path) -> Result<CorpusIter, CorpusError> {
    let articles_json = read(dir, ARTICLES_FILE)?;
    let entries: Vec<CorpusEntry> = serde_json::from_str(&articles_json)
        .map_err(|e| CorpusError::json(&dir.join(ARTICLES_FILE), e))?;
    Ok(CorpusIter {
        dir: dir.to_path_buf(),
        entries: entries.into_iter().enumerate(),
    })
}

/// Iterator returned by [`iter_corpus`].
#[derive(Debug)]
pub struct CorpusIter {
    dir: PathBuf,
    entries: std::iter::Enumerate<std::vec::IntoIter<CorpusEntry>>,
}

impl Iterator for CorpusIter {
    type Item = Result<ExtractedArticle, CorpusError>;

    fn next(&mut self) -> Option<Self::Item> {
        for (position, entry) in self.entries.by_ref() {
            let content_path = self.dir.join(&entry.content_path);
            let content = match fs::read_to_string(&content_path) {
                Ok(content) => content,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    warn!(
                        position,
                        path = %content_path.display(),
                        "skipping article: missing content file"
                    );
                    continue;
                }
                Err(e) => return Some(Err(CorpusError::io(&content_path, e))),
            };
            let source_html = fs::read_to_string(self.dir.join(&entry.source_path))
                .ok()
                .filter(|html| !html.is_empty());
            return Some(Ok(ExtractedArticle {
                index: entry.index,
                word_count: crate::extract::word_count(&content),
                article: entry.article,
                content,
                strategy: entry.strategy,
                format: entry.format,
                source_html,
            }));
        }
        None
    }
}
