//! Stub manifest: serve fixture files instead of hitting the network.
//!
//! The manifest is a JSON object mapping URL to file path. Relative paths
//! resolve against the manifest's directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Manifest or fixture problems.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StubError {
    /// Manifest file does not exist or cannot be read.
    #[error("stub manifest {} not found", path.display())]
    ManifestNotFound {
        /// Manifest path.
        path: PathBuf,
    },

    /// Manifest is not a JSON object of strings.
    #[error("stub manifest {} is not valid JSON", path.display())]
    InvalidManifest {
        /// Manifest path.
        path: PathBuf,
    },

    /// Manifest points at a missing file.
    #[error("stub file {} not found", path.display())]
    FileNotFound {
        /// Fixture path.
        path: PathBuf,
    },
}

/// Loaded URL to fixture mapping.
#[derive(Debug, Clone)]
pub struct StubManifest {
    dir: PathBuf,
    entries: HashMap<String, String>,
}

impl StubManifest {
    /// Reads and parses the manifest at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StubError::ManifestNotFound`] or [`StubError::InvalidManifest`].
    pub fn load(path: &Path) -> Result<Self, StubError> {
        let text = std::fs::read_to_string(path).map_err(|_| StubError::ManifestNotFound {
            path: path.to_path_buf(),
        })?;
        let entries: HashMap<String, String> =
            serde_json::from_str(&text).map_err(|_| StubError::InvalidManifest {
                path: path.to_path_buf(),
            })?;
        let dir = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Ok(Self { dir, entries })
    }

    /// Number of URLs in the manifest.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the manifest maps no URLs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the fixture content for `url`, or `None` if it is not stubbed.
    ///
    /// # Errors
    ///
    /// Returns [`StubError::FileNotFound`] when the mapped file is missing.
    pub fn lookup(&self, url: &str) -> Result<Option<String>, StubError> {
        let Some(target) = self.entries.get(url).filter(|t| !t.is_empty()) else {
            return Ok(None);
        };
        let target = Path::new(target);
        let path = if target.is_absolute() {
            target.to_path_buf()
        } else {
            self.dir.join(target)
        };
        std::fs::read_to_string(&path)
            .map(Some)
            .map_err(|_| StubError::FileNotFound { path })
    }
}
