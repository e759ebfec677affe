//! LM Studio: an OpenAI-compatible chat endpoint on the local network.
//!
//! Before each request the backend probes `/v1/models`. A missing model is
//! loaded with `lms load --yes <model>` and the probe is repeated once.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::{BackendOutcome, LlmBackend, ResponseFormat};
use crate::fetch::ClientBuildError;
use crate::process::{IsolatedCommand, ProcessError, run_isolated};
use crate::summarize::prompt::summary_response_format;
use crate::user_agent::default_api_user_agent;

/// Default chat request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default `/v1/models` probe timeout.
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Cutoff for `lms load`.
const LOAD_TIMEOUT: Duration = Duration::from_secs(90);

/// Pause between a successful `lms load` and the confirming probe.
const LOAD_SETTLE: Duration = Duration::from_secs(2);

const ERROR_BODY_CHARS: usize = 200;

/// Connection and sampling settings.
#[derive(Debug, Clone)]
pub struct LmStudioConfig {
    /// Server root, e.g. `http://localhost:1234`.
    pub base_url: String,
    /// Model identifier as listed by `/v1/models`.
    pub model: String,
    /// Chat request timeout.
    pub timeout: Duration,
    /// Model probe timeout.
    pub health_timeout: Duration,
    /// `lms` CLI used to load a missing model.
    pub lms_cli: String,
    /// Delay before re-probing after a load.
    pub load_settle: Duration,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token limit.
    pub max_tokens: u32,
}

impl LmStudioConfig {
    /// Config with default timeouts and sampling.
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            timeout: DEFAULT_TIMEOUT,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
            lms_cli: "lms".to_string(),
            load_settle: LOAD_SETTLE,
            temperature: 0.1,
            max_tokens: 8192,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

/// Why the model could not be made available.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SetupFailure {
    /// The configured model does not exist.
    UnknownModel(String),
    /// Anything else; another backend may still work.
    Other(String),
}

/// Primary backend speaking the OpenAI chat-completions protocol.
#[derive(Debug, Clone)]
pub struct LmStudioBackend {
    client: Client,
    config: LmStudioConfig,
}

impl LmStudioBackend {
    /// Creates the backend.
    ///
    /// # Errors
    ///
    /// Returns [`ClientBuildError`] if the HTTP client cannot be built.
    pub fn new(config: LmStudioConfig) -> Result<Self, ClientBuildError> {
        let client = Client::builder()
            .user_agent(default_api_user_agent())
            .build()?;
        Ok(Self { client, config })
    }

    /// Returns the config in use.
    #[must_use]
    pub fn config(&self) -> &LmStudioConfig {
        &self.config
    }

    /// Model ids currently served; empty when the server is unreachable.
    pub async fn loaded_models(&self) -> Vec<String> {
        let response = self
            .client
            .get(format!("{}/v1/models", self.config.base_url))
            .timeout(self.config.health_timeout)
            .send()
            .await;
        match response {
            Ok(resp) if resp.status().is_success() => match resp.json::<ModelList>().await {
                Ok(list) => list.data.into_iter().map(|m| m.id).collect(),
                Err(error) => {
                    warn!(error = %error, "unreadable model list");
                    Vec::new()
                }
            },
            Ok(resp) => {
                warn!(status = resp.status().as_u16(), "model probe returned non-success");
                Vec::new()
            }
            Err(error) => {
                warn!(error = %error, "model probe failed");
                Vec::new()
            }
        }
    }

    /// Returns true when the server answers the model probe.
    pub async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/v1/models", self.config.base_url))
            .timeout(self.config.health_timeout)
            .send()
            .await
            .is_ok_and(|resp| resp.status().is_success())
    }

    /// Makes sure the configured model is served, loading it when needed.
    #[instrument(skip(self), fields(model = %self.config.model))]
    async fn ensure_model(&self) -> Result<(), SetupFailure> {
        let model = &self.config.model;
        if self.loaded_models().await.iter().any(|id| id == model) {
            debug!("model already available");
            return Ok(());
        }

        info!("model not in available list; loading");
        let command = IsolatedCommand::new(self.config.lms_cli.clone(), LOAD_TIMEOUT)
            .args(["load", "--yes", model.as_str()]);
        let output = match run_isolated(command).await {
            Ok(output) => output,
            Err(ProcessError::NotFound { .. }) => {
                return Err(SetupFailure::Other(
                    "'lms' CLI not found - install LM Studio CLI".to_string(),
                ));
            }
            Err(ProcessError::TimedOut { .. }) => {
                return Err(SetupFailure::Other(format!(
                    "Loading '{model}' timed out (>{}s)",
                    LOAD_TIMEOUT.as_secs()
                )));
            }
            Err(error) => return Err(SetupFailure::Other(format!("Load error: {error}"))),
        };

        if !output.success() {
            let stderr = output.stderr.trim();
            let lower = stderr.to_lowercase();
            if lower.contains("not found") || lower.contains("no model") {
                return Err(SetupFailure::UnknownModel(format!(
                    "Model '{model}' not found - check LMSTUDIO_MODEL"
                )));
            }
            let snippet: String = stderr.chars().take(ERROR_BODY_CHARS).collect();
            return Err(SetupFailure::Other(format!("Load failed: {snippet}")));
        }

        tokio::time::sleep(self.config.load_settle).await;
        let loaded = self.loaded_models().await;
        if loaded.iter().any(|id| id == model) {
            info!("model loaded");
            Ok(())
        } else {
            Err(SetupFailure::Other(format!(
                "Load succeeded but model not in list: {loaded:?}"
            )))
        }
    }

    async fn chat(&self, prompt: &str, format: ResponseFormat) -> Result<String, String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            response_format: (format == ResponseFormat::SummarySchema)
                .then(summary_response_format),
        };
        debug!(
            prompt_chars = prompt.len(),
            est_tokens = prompt.len() / 4,
            timeout_secs = self.config.timeout.as_secs(),
            "sending chat request"
        );

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.config.base_url))
            .json(&request)
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    format!("LM Studio timed out after {}s", self.config.timeout.as_secs())
                } else {
                    format!("LM Studio connection error: {e}")
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(ERROR_BODY_CHARS).collect();
            return Err(format!(
                "LM Studio HTTP {}: {}",
                status.as_u16(),
                snippet.replace('\n', " ")
            ));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                format!("LM Studio timed out after {}s", self.config.timeout.as_secs())
            } else {
                "LM Studio returned invalid JSON response".to_string()
            }
        })?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| "LM Studio returned empty response".to_string())?;
        debug!(chars = content.len(), "received model output");
        Ok(content)
    }
}

#[async_trait]
impl LlmBackend for LmStudioBackend {
    fn name(&self) -> &str {
        "lmstudio"
    }

    fn display_name(&self) -> &str {
        "LM Studio"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, prompt: &str, format: ResponseFormat) -> BackendOutcome {
        match self.ensure_model().await {
            Ok(()) => {}
            Err(SetupFailure::UnknownModel(message)) => {
                return BackendOutcome::FatalFailure(format!("Model setup failed: {message}"));
            }
            Err(SetupFailure::Other(message)) => {
                return BackendOutcome::RecoverableFailure(format!(
                    "Model setup failed: {message}"
                ));
            }
        }
        match self.chat(prompt, format).await {
            Ok(text) => BackendOutcome::Success(text),
            Err(message) => BackendOutcome::RecoverableFailure(message),
        }
    }
}
