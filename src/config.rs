//! Layered settings: defaults, then an optional TOML file, then environment.
//!
//! # Overview
//!
//! [`Settings::load`] resolves the file path (`--config`, else
//! `$XDG_CONFIG_HOME/article-digest/config.toml`, else
//! `~/.config/article-digest/config.toml`), applies the partial
//! [`FileConfig`] over the defaults, then the environment overrides. A
//! missing default file is not an error; a missing explicit one is.
//!
//! ```toml
//! [fetch]
//! timeout_secs = 15
//! headless_domains = ["www.jacc.org"]
//!
//! [fetch.headers."www.example.com"]
//! Referer = "https://www.google.com/"
//!
//! [llm]
//! backend = "auto"
//! lmstudio_base_url = "http://localhost:1234"
//! lmstudio_model = "qwen3-30b"
//!
//! [pipeline]
//! max_workers = 5
//! ```
//!
//! Settings also build the runtime objects: [`Settings::build_fetcher`] and
//! [`Settings::build_selector`].

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::fetch::{
    ClientBuildError, DomainHeaders, FetchCache, FetchConfig, FetchStrategy, Fetcher,
    HeadlessStrategy, HttpStrategy, IsolatedBrowserRenderer, JINA_DEFAULT_BASE_URL, JinaProvider,
    URL_TO_MD_PROGRAM, UrlToMdProvider,
};
use crate::pipeline::{DEFAULT_MAX_WORKERS, DEFAULT_MIN_WORDS, DEFAULT_WARN_WORDS, PipelineOptions};
use crate::summarize::backend::{
    BackendSelector, LlmBackend, LmStudioBackend, LmStudioConfig, OllamaBackend, OllamaConfig,
};
use crate::summarize::{DEFAULT_MAX_CONTENT_CHARS, SummarizerError, SummarizerOptions};

/// Directory name under the config root.
const APP_DIR: &str = "article-digest";

/// Config file name.
const CONFIG_FILE: &str = "config.toml";

/// Domains rendered in a browser when plain HTTP is blocked.
pub const DEFAULT_HEADLESS_DOMAINS: &[&str] = &[
    "dailynews.ascopubs.org",
    "ascopubs.org",
    "www.urotoday.com",
    "ashpublications.org",
    "www.jacc.org",
    "www.medrxiv.org",
    "pmc.ncbi.nlm.nih.gov",
    "obgyn.onlinelibrary.wiley.com",
    "www.sciencedirect.com",
    "www.news10.com",
];

/// Domains whose bot defenses only trip under headless automation.
pub const DEFAULT_HEADED_DOMAINS: &[&str] = &["www.news10.com"];

/// Errors loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`FileConfig`].
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },

    /// An environment override could not be parsed.
    #[error("invalid {name}: {message}")]
    Env {
        /// Variable name.
        name: &'static str,
        /// What was wrong.
        message: String,
    },

    /// A setting is out of range.
    #[error("invalid {field}: {message}")]
    Invalid {
        /// Setting name.
        field: &'static str,
        /// What was wrong.
        message: String,
    },

    /// `llm.backend` names no known backend.
    #[error("unknown LLM backend '{name}': expected auto, lmstudio or ollama")]
    UnknownBackend {
        /// Configured value.
        name: String,
    },

    /// An HTTP client could not be built.
    #[error(transparent)]
    Client(#[from] ClientBuildError),

    /// The current executable could not be located for the browser renderer.
    #[error("cannot locate own executable for the renderer: {0}")]
    Executable(#[source] std::io::Error),
}

// ==================== File Config ====================

/// Partial settings as written in the TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// `[fetch]` table.
    pub fetch: FetchFileConfig,
    /// `[llm]` table.
    pub llm: LlmFileConfig,
    /// `[pipeline]` table.
    pub pipeline: PipelineFileConfig,
}

/// `[fetch]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchFileConfig {
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub backoff_base_ms: Option<u64>,
    pub headless_timeout_secs: Option<u64>,
    pub headless_domains: Option<Vec<String>>,
    pub headed_domains: Option<Vec<String>>,
    pub stub_manifest: Option<PathBuf>,
    pub url_to_md_bin: Option<String>,
    pub jina_base_url: Option<String>,
    pub headers: Option<HashMap<String, BTreeMap<String, String>>>,
}

/// `[llm]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmFileConfig {
    pub backend: Option<String>,
    pub lmstudio_base_url: Option<String>,
    pub lmstudio_model: Option<String>,
    pub lmstudio_timeout_secs: Option<u64>,
    pub lmstudio_health_timeout_secs: Option<u64>,
    pub lms_cli: Option<String>,
    pub ollama_enabled: Option<bool>,
    pub ollama_model: Option<String>,
    pub ollama_timeout_secs: Option<u64>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub max_content_chars: Option<usize>,
}

/// `[pipeline]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineFileConfig {
    pub max_workers: Option<usize>,
    pub min_words: Option<usize>,
    pub warn_words: Option<usize>,
}

impl FileConfig {
    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] naming `path` on invalid input.
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads and parses `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }
}

/// Default config path from `XDG_CONFIG_HOME`, else `HOME`.
#[must_use]
pub fn default_config_path(env: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    let non_empty = |name: &str| env(name).filter(|v| !v.trim().is_empty());
    if let Some(xdg) = non_empty("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg).join(APP_DIR).join(CONFIG_FILE));
    }
    non_empty("HOME").map(|home| {
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILE)
    })
}

// ==================== Settings ====================

/// Which backends summarize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendChoice {
    /// LM Studio, falling back to Ollama when enabled.
    Auto,
    /// LM Studio only.
    LmStudio,
    /// Ollama only.
    Ollama,
}

impl BackendChoice {
    /// Parses `auto`, `lmstudio` or `ollama` (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownBackend`] for anything else.
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "lmstudio" => Ok(Self::LmStudio),
            "ollama" => Ok(Self::Ollama),
            _ => Err(ConfigError::UnknownBackend {
                name: name.to_string(),
            }),
        }
    }
}

/// Fetch settings.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub headless_timeout: Duration,
    pub headless_domains: Vec<String>,
    pub headed_domains: Vec<String>,
    pub stub_manifest: Option<PathBuf>,
    pub url_to_md_bin: String,
    pub jina_base_url: String,
    pub jina_api_key: Option<String>,
    pub headers: DomainHeaders,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: crate::fetch::DEFAULT_TIMEOUT,
            max_retries: crate::fetch::DEFAULT_MAX_RETRIES,
            backoff_base: Duration::from_millis(1000),
            headless_timeout: crate::fetch::HEADLESS_TIMEOUT_FLOOR,
            headless_domains: to_strings(DEFAULT_HEADLESS_DOMAINS),
            headed_domains: to_strings(DEFAULT_HEADED_DOMAINS),
            stub_manifest: None,
            url_to_md_bin: URL_TO_MD_PROGRAM.to_string(),
            jina_base_url: JINA_DEFAULT_BASE_URL.to_string(),
            jina_api_key: None,
            headers: DomainHeaders::default(),
        }
    }
}

/// LLM settings.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub backend: String,
    pub lmstudio_base_url: Option<String>,
    pub lmstudio_model: Option<String>,
    pub lmstudio_timeout: Duration,
    pub lmstudio_health_timeout: Duration,
    pub lms_cli: String,
    pub ollama_enabled: bool,
    pub ollama_model: String,
    pub ollama_timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_content_chars: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            backend: "auto".to_string(),
            lmstudio_base_url: None,
            lmstudio_model: None,
            lmstudio_timeout: Duration::from_secs(300),
            lmstudio_health_timeout: Duration::from_secs(5),
            lms_cli: "lms".to_string(),
            ollama_enabled: false,
            ollama_model: "qwen3:latest".to_string(),
            ollama_timeout: Duration::from_secs(600),
            temperature: 0.1,
            max_tokens: 8192,
            max_content_chars: DEFAULT_MAX_CONTENT_CHARS,
        }
    }
}

/// Fully resolved settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Fetch cascade.
    pub fetch: FetchSettings,
    /// Summarization backends.
    pub llm: LlmSettings,
    /// Worker pool and content thresholds.
    pub pipeline: PipelineOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fetch: FetchSettings::default(),
            llm: LlmSettings::default(),
            pipeline: PipelineOptions {
                max_workers: DEFAULT_MAX_WORKERS,
                min_words: DEFAULT_MIN_WORDS,
                warn_words: DEFAULT_WARN_WORDS,
            },
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl Settings {
    /// Loads defaults, the config file and the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for unreadable or invalid files, bad
    /// environment values, or settings that fail [`Settings::validate`].
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let env = |name: &str| std::env::var(name).ok();
        let file = match explicit_path {
            Some(path) => Some(FileConfig::read(path)?),
            None => match default_config_path(env) {
                Some(path) if path.exists() => Some(FileConfig::read(&path)?),
                Some(path) => {
                    debug!(path = %path.display(), "no config file");
                    None
                }
                None => None,
            },
        };
        Self::from_sources(file.as_ref(), env)
    }

    /// Applies `file` and then `env` over the defaults, then validates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for bad environment values or invalid settings.
    pub fn from_sources(
        file: Option<&FileConfig>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        if let Some(file) = file {
            settings.apply_file(file);
        }
        settings.apply_env(env)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Overrides defaults with every value present in `file`.
    pub fn apply_file(&mut self, file: &FileConfig) {
        let fetch = &file.fetch;
        let f = &mut self.fetch;
        if let Some(secs) = fetch.timeout_secs {
            f.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = fetch.max_retries {
            f.max_retries = retries;
        }
        if let Some(ms) = fetch.backoff_base_ms {
            f.backoff_base = Duration::from_millis(ms);
        }
        if let Some(secs) = fetch.headless_timeout_secs {
            f.headless_timeout = Duration::from_secs(secs);
        }
        if let Some(domains) = &fetch.headless_domains {
            f.headless_domains.clone_from(domains);
        }
        if let Some(domains) = &fetch.headed_domains {
            f.headed_domains.clone_from(domains);
        }
        if let Some(path) = &fetch.stub_manifest {
            f.stub_manifest = Some(path.clone());
        }
        if let Some(bin) = &fetch.url_to_md_bin {
            f.url_to_md_bin.clone_from(bin);
        }
        if let Some(url) = &fetch.jina_base_url {
            f.jina_base_url.clone_from(url);
        }
        if let Some(headers) = &fetch.headers {
            f.headers.merge(DomainHeaders::from_map(headers.clone()));
        }

        let llm = &file.llm;
        let l = &mut self.llm;
        if let Some(backend) = &llm.backend {
            l.backend.clone_from(backend);
        }
        if let Some(url) = &llm.lmstudio_base_url {
            l.lmstudio_base_url = Some(url.clone());
        }
        if let Some(model) = &llm.lmstudio_model {
            l.lmstudio_model = Some(model.clone());
        }
        if let Some(secs) = llm.lmstudio_timeout_secs {
            l.lmstudio_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = llm.lmstudio_health_timeout_secs {
            l.lmstudio_health_timeout = Duration::from_secs(secs);
        }
        if let Some(cli) = &llm.lms_cli {
            l.lms_cli.clone_from(cli);
        }
        if let Some(enabled) = llm.ollama_enabled {
            l.ollama_enabled = enabled;
        }
        if let Some(model) = &llm.ollama_model {
            l.ollama_model.clone_from(model);
        }
        if let Some(secs) = llm.ollama_timeout_secs {
            l.ollama_timeout = Duration::from_secs(secs);
        }
        if let Some(temperature) = llm.temperature {
            l.temperature = temperature;
        }
        if let Some(tokens) = llm.max_tokens {
            l.max_tokens = tokens;
        }
        if let Some(chars) = llm.max_content_chars {
            l.max_content_chars = chars;
        }

        let pipeline = &file.pipeline;
        if let Some(workers) = pipeline.max_workers {
            self.pipeline.max_workers = workers;
        }
        if let Some(words) = pipeline.min_words {
            self.pipeline.min_words = words;
        }
        if let Some(words) = pipeline.warn_words {
            self.pipeline.warn_words = words;
        }
    }

    /// Applies environment overrides; blank values are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] when `ARTICLE_HTTP_HEADERS_JSON` is not
    /// a JSON object of header maps.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let get = |name: &str| env(name).filter(|v| !v.trim().is_empty());

        if let Some(json) = get("ARTICLE_HTTP_HEADERS_JSON") {
            let headers = DomainHeaders::from_json(&json).map_err(|e| ConfigError::Env {
                name: "ARTICLE_HTTP_HEADERS_JSON",
                message: e.to_string(),
            })?;
            self.fetch.headers.merge(headers);
        }
        if let Some(key) = get("JINA_API_KEY") {
            self.fetch.jina_api_key = Some(key);
        }
        if let Some(url) = get("LMSTUDIO_BASE_URL") {
            self.llm.lmstudio_base_url = Some(url);
        }
        if let Some(model) = get("LMSTUDIO_MODEL") {
            self.llm.lmstudio_model = Some(model);
        }
        if let Some(enabled) = get("OLLAMA_ENABLED") {
            self.llm.ollama_enabled = parse_bool(&enabled);
        }
        if let Some(model) = get("OLLAMA_MODEL") {
            self.llm.ollama_model = model;
        }
        Ok(())
    }

    /// Rejects settings no run could use.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero worker count or timeout
    /// or a headless timeout under the 60s floor, and
    /// [`ConfigError::UnknownBackend`] for an unknown backend name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.max_workers == 0 {
            return Err(ConfigError::Invalid {
                field: "pipeline.max_workers",
                message: "must be at least 1".to_string(),
            });
        }
        if self.fetch.timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "fetch.timeout_secs",
                message: "must be greater than 0".to_string(),
            });
        }
        if self.fetch.headless_timeout < crate::fetch::HEADLESS_TIMEOUT_FLOOR {
            return Err(ConfigError::Invalid {
                field: "fetch.headless_timeout_secs",
                message: format!(
                    "must be at least {}",
                    crate::fetch::HEADLESS_TIMEOUT_FLOOR.as_secs()
                ),
            });
        }
        if self.llm.lmstudio_timeout.is_zero() || self.llm.ollama_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "llm timeout",
                message: "must be greater than 0".to_string(),
            });
        }
        BackendChoice::parse(&self.llm.backend)?;
        Ok(())
    }

    /// Parsed backend choice.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownBackend`] for an unknown name.
    pub fn backend_choice(&self) -> Result<BackendChoice, ConfigError> {
        BackendChoice::parse(&self.llm.backend)
    }

    /// Per-call fetch settings.
    #[must_use]
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            timeout: self.fetch.timeout,
            max_retries: self.fetch.max_retries,
            allow_cache: true,
            stub_manifest: self.fetch.stub_manifest.clone(),
        }
    }

    /// Summarizer knobs.
    #[must_use]
    pub fn summarizer_options(&self) -> SummarizerOptions {
        SummarizerOptions {
            max_content_chars: self.llm.max_content_chars,
        }
    }

    /// Builds the fetch orchestrator: HTTP, then headless, url-to-md and Jina.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a client cannot be built or the renderer
    /// executable cannot be located.
    pub fn build_fetcher(&self, cache: Arc<FetchCache>) -> Result<Fetcher, ConfigError> {
        let f = &self.fetch;
        let http = HttpStrategy::new(f.headers.clone(), f.backoff_base)?;
        let renderer = IsolatedBrowserRenderer::current_exe().map_err(ConfigError::Executable)?;
        let headless = HeadlessStrategy::new(
            Arc::new(renderer),
            f.headless_domains.clone(),
            f.headed_domains.clone(),
        )
        .with_timeout_floor(f.headless_timeout);
        let url_to_md = UrlToMdProvider::new(f.url_to_md_bin.clone());
        let jina = JinaProvider::new(f.jina_base_url.clone(), f.jina_api_key.clone())?;

        let escalation: Vec<Arc<dyn FetchStrategy>> =
            vec![Arc::new(headless), Arc::new(url_to_md), Arc::new(jina)];
        Ok(Fetcher::new(cache, Arc::new(http), escalation))
    }

    fn lmstudio(&self) -> Result<Option<LmStudioBackend>, SummarizerError> {
        let (Some(base_url), Some(model)) = (&self.llm.lmstudio_base_url, &self.llm.lmstudio_model)
        else {
            return Ok(None);
        };
        let mut config = LmStudioConfig::new(base_url.clone(), model.clone());
        config.timeout = self.llm.lmstudio_timeout;
        config.health_timeout = self.llm.lmstudio_health_timeout;
        config.lms_cli.clone_from(&self.llm.lms_cli);
        config.temperature = self.llm.temperature;
        config.max_tokens = self.llm.max_tokens;
        LmStudioBackend::new(config)
            .map(Some)
            .map_err(|e| SummarizerError::backend("lmstudio", e.to_string()))
    }

    fn ollama(&self) -> OllamaBackend {
        let mut config = OllamaConfig::new(self.llm.ollama_model.clone());
        config.timeout = self.llm.ollama_timeout;
        OllamaBackend::new(config)
    }

    /// Builds the backend chain for the configured choice.
    ///
    /// - `lmstudio`: LM Studio pinned.
    /// - `ollama`: Ollama pinned.
    /// - `auto`: LM Studio with Ollama fallback when enabled, or Ollama
    ///   alone when only Ollama is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`SummarizerError::NotConfigured`] when the choice has no
    /// usable backend.
    pub fn build_selector(&self) -> Result<BackendSelector, SummarizerError> {
        let choice = self
            .backend_choice()
            .map_err(|_| SummarizerError::NotConfigured)?;
        let selector = match choice {
            BackendChoice::LmStudio => {
                let lmstudio = self.lmstudio()?.ok_or(SummarizerError::NotConfigured)?;
                BackendSelector::pinned(Arc::new(lmstudio))
            }
            BackendChoice::Ollama => BackendSelector::pinned(Arc::new(self.ollama())),
            BackendChoice::Auto => match self.lmstudio()? {
                Some(lmstudio) => {
                    let fallback = self
                        .llm
                        .ollama_enabled
                        .then(|| Arc::new(self.ollama()) as Arc<dyn LlmBackend>);
                    BackendSelector::auto(Arc::new(lmstudio), fallback)
                }
                None if self.llm.ollama_enabled => BackendSelector::pinned(Arc::new(self.ollama())),
                None => return Err(SummarizerError::NotConfigured),
            },
        };
        info!(?selector, "summarization backends ready");
        Ok(selector)
    }
}
