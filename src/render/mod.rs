//! Headless Chromium rendering for JavaScript- and challenge-gated pages.
//!
//! [`render_page`] launches a fresh browser, navigates, waits for the load to
//! finish and for any bot-defense interstitial to clear, lets the page settle,
//! and returns the full DOM as HTML.
//!
//! The library never calls this in-process during a fetch. The fetch cascade
//! runs it through the binary's hidden `render` subcommand inside an isolated
//! process group (see [`crate::fetch::IsolatedBrowserRenderer`]), so a hung
//! browser and all of its renderer children can be killed together.

use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::handler::viewport::Viewport;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::user_agent::BROWSER_USER_AGENT;

/// Delay after the challenge clears, for late scripts to populate the DOM.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(2);

const VIEWPORT_WIDTH: u32 = 1280;
const VIEWPORT_HEIGHT: u32 = 720;
const CHALLENGE_POLL: Duration = Duration::from_millis(500);

/// Evaluates to true while a bot-defense interstitial is on screen.
const CHALLENGE_PROBE_JS: &str = r#"(() => {
  const title = (document.title || '').toLowerCase();
  if (title.includes('just a moment') || title.includes('attention required')) return true;
  return !!document.querySelector(
    '#challenge-form, #challenge-running, #cf-challenge-running, #challenge-stage, ' +
    '.cf-browser-verification, iframe[src*="challenges.cloudflare.com"]'
  );
})()"#;

/// Failure to render a page.
#[derive(Debug, Error)]
#[error("headless render failed for {url}: {reason}")]
pub struct RenderError {
    /// Page being rendered.
    pub url: String,
    /// What went wrong.
    pub reason: String,
}

impl RenderError {
    /// Creates a render error.
    pub fn new(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

/// Rendering knobs.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Overall budget for launch, navigation and challenge wait.
    pub timeout: Duration,
    /// Run without a visible window.
    pub headless: bool,
    /// Extra wait once the page is ready.
    pub settle: Duration,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            headless: true,
            settle: DEFAULT_SETTLE,
        }
    }
}

/// Renders `url` in Chromium and returns the resulting DOM HTML.
///
/// # Errors
///
/// Returns [`RenderError`] when the browser cannot launch, navigation fails,
/// or the overall timeout expires.
#[instrument(skip(options), fields(timeout_secs = options.timeout.as_secs(), headless = options.headless))]
pub async fn render_page(url: &str, options: &RenderOptions) -> Result<String, RenderError> {
    let mut builder = BrowserConfig::builder()
        .viewport(Some(Viewport {
            width: VIEWPORT_WIDTH,
            height: VIEWPORT_HEIGHT,
            ..Default::default()
        }))
        .window_size(VIEWPORT_WIDTH, VIEWPORT_HEIGHT)
        .request_timeout(options.timeout)
        .args([
            "--disable-blink-features=AutomationControlled".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--no-first-run".to_string(),
            format!("--user-agent={BROWSER_USER_AGENT}"),
        ]);
    if !options.headless {
        builder = builder.with_head();
    }
    let config = builder
        .build()
        .map_err(|e| RenderError::new(url, format!("browser config error: {e}")))?;

    let (mut browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| RenderError::new(url, format!("failed to launch browser: {e}")))?;
    let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

    let result = tokio::time::timeout(options.timeout, load(&browser, url, options)).await;

    if let Err(error) = browser.close().await {
        debug!(error = %error, "browser close failed");
    }
    handler_task.abort();

    match result {
        Ok(html) => html,
        Err(_) => Err(RenderError::new(
            url,
            format!("timed out after {}s", options.timeout.as_secs()),
        )),
    }
}

async fn load(browser: &Browser, url: &str, options: &RenderOptions) -> Result<String, RenderError> {
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| RenderError::new(url, format!("failed to create page: {e}")))?;

    page.set_user_agent(BROWSER_USER_AGENT)
        .await
        .map_err(|e| RenderError::new(url, format!("failed to set user agent: {e}")))?;

    page.goto(url)
        .await
        .map_err(|e| RenderError::new(url, format!("navigation failed: {e}")))?;
    page.wait_for_navigation()
        .await
        .map_err(|e| RenderError::new(url, format!("load did not complete: {e}")))?;

    let started = Instant::now();
    let mut waited = false;
    loop {
        let challenged = page
            .evaluate(CHALLENGE_PROBE_JS)
            .await
            .ok()
            .and_then(|value| value.into_value::<bool>().ok())
            .unwrap_or(false);
        if !challenged {
            break;
        }
        if started.elapsed() >= options.timeout {
            warn!(url = %url, "bot-defense challenge never cleared");
            break;
        }
        waited = true;
        tokio::time::sleep(CHALLENGE_POLL).await;
    }
    if waited {
        info!(url = %url, waited_ms = started.elapsed().as_millis(), "challenge wait finished");
    }

    tokio::time::sleep(options.settle).await;

    page.content()
        .await
        .map_err(|e| RenderError::new(url, format!("failed to read page content: {e}")))
}
