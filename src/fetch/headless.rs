//! Headless browser strategy for allow-listed, challenge-protected domains.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, instrument};

use super::error::StrategyError;
use super::{FetchConfig, FetchStrategy, FetchedContent, StrategyKind, host_matches, host_of};
use crate::process::{IsolatedCommand, ProcessError, run_isolated};
use crate::render::RenderError;

/// Minimum time a headless render is given, whatever the HTTP timeout.
pub const HEADLESS_TIMEOUT_FLOOR: Duration = Duration::from_secs(60);

/// Extra wall time before the render process group is killed.
const RENDER_KILL_MARGIN: Duration = Duration::from_secs(10);

/// Renders a page and returns its DOM HTML.
#[async_trait]
pub trait HeadlessRenderer: Send + Sync {
    /// Renders `url` within `timeout`, without a window when `headless`.
    async fn render(&self, url: &str, timeout: Duration, headless: bool)
    -> Result<String, RenderError>;
}

/// Runs the renderer in a child process of the current binary.
///
/// The child is the hidden `render` subcommand; it prints the DOM to stdout.
/// It runs in its own process group so a hung browser is killed with all
/// of its helpers once the cutoff expires.
#[derive(Debug, Clone)]
pub struct IsolatedBrowserRenderer {
    program: PathBuf,
}

impl IsolatedBrowserRenderer {
    /// Renderer that re-invokes `program render <url>`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Renderer that re-invokes the running executable.
    ///
    /// # Errors
    ///
    /// Returns the IO error when the executable path cannot be determined.
    pub fn current_exe() -> std::io::Result<Self> {
        std::env::current_exe().map(Self::new)
    }
}

#[async_trait]
impl HeadlessRenderer for IsolatedBrowserRenderer {
    async fn render(
        &self,
        url: &str,
        timeout: Duration,
        headless: bool,
    ) -> Result<String, RenderError> {
        let mut command = IsolatedCommand::new(
            self.program.to_string_lossy(),
            timeout + RENDER_KILL_MARGIN,
        )
        .args(["render", url, "--timeout", &timeout.as_secs().to_string()]);
        if !headless {
            command = command.arg("--headed");
        }

        let output = run_isolated(command).await.map_err(|e| match e {
            ProcessError::TimedOut { timeout, .. } => {
                RenderError::new(url, format!("timed out after {}s", timeout.as_secs()))
            }
            other => RenderError::new(url, other.to_string()),
        })?;

        if !output.success() {
            let reason = output
                .stderr
                .lines()
                .rev()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map_or_else(
                    || format!("renderer exited with code {:?}", output.code),
                    ToString::to_string,
                );
            return Err(RenderError::new(url, reason));
        }
        Ok(output.stdout)
    }
}

/// Escalation strategy that renders allow-listed domains in a browser.
///
/// Renders are serialized: a single browser at a time keeps memory bounded
/// and avoids tripping rate limits on the protected sites.
pub struct HeadlessStrategy {
    renderer: Arc<dyn HeadlessRenderer>,
    domains: Vec<String>,
    headed_domains: Vec<String>,
    timeout_floor: Duration,
    lock: Mutex<()>,
}

impl HeadlessStrategy {
    /// Strategy for `domains`, running headed for `headed_domains`.
    #[must_use]
    pub fn new(
        renderer: Arc<dyn HeadlessRenderer>,
        domains: Vec<String>,
        headed_domains: Vec<String>,
    ) -> Self {
        Self {
            renderer,
            domains,
            headed_domains,
            timeout_floor: HEADLESS_TIMEOUT_FLOOR,
            lock: Mutex::new(()),
        }
    }

    /// Raises the minimum render timeout; values under
    /// [`HEADLESS_TIMEOUT_FLOOR`] are held at it.
    #[must_use]
    pub fn with_timeout_floor(mut self, floor: Duration) -> Self {
        self.timeout_floor = floor.max(HEADLESS_TIMEOUT_FLOOR);
        self
    }

    fn matches(list: &[String], url: &str) -> bool {
        host_of(url).is_some_and(|host| list.iter().any(|d| host_matches(&host, d)))
    }
}

impl std::fmt::Debug for HeadlessStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessStrategy")
            .field("domains", &self.domains)
            .field("headed_domains", &self.headed_domains)
            .field("timeout_floor", &self.timeout_floor)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl FetchStrategy for HeadlessStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Headless
    }

    fn applies(&self, url: &str) -> bool {
        Self::matches(&self.domains, url)
    }

    #[instrument(skip(self, cfg))]
    async fn attempt(
        &self,
        url: &str,
        cfg: &FetchConfig,
    ) -> Result<FetchedContent, StrategyError> {
        let timeout = cfg.timeout.max(self.timeout_floor);
        let headless = !Self::matches(&self.headed_domains, url);

        let _guard = self.lock.lock().await;
        info!(timeout_secs = timeout.as_secs(), headless, "rendering in browser");
        let html = self
            .renderer
            .render(url, timeout, headless)
            .await
            .map_err(|e| StrategyError::failed(e.reason))?;

        if html.trim().is_empty() {
            return Err(StrategyError::failed("rendered page was empty"));
        }
        Ok(FetchedContent::html(html))
    }
}
