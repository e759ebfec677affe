//! Integration tests for summarization against a mock LM Studio server.

use std::sync::Arc;

use digest_core::summarize::backend::{BackendSelector, LmStudioBackend, LmStudioConfig};
use digest_core::summarize::{ArticleType, SummarizerOptions};
use digest_core::{Summarizer, SummarizerError};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chat_reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }]
    }))
}

fn summary_json() -> String {
    json!({
        "bullets": [
            { "label": "KEY FINDING", "text": "Drug X cut relapse by 30%." },
            { "label": "TACTICAL WIN [🚀]", "text": "Label expansion is likely." },
            { "label": "MARKET SIGNAL [🟡]", "text": "Competitors will respond." },
            { "label": "CONCERN", "text": "Small trial." }
        ],
        "actionability": { "emoji": "🟢", "label": "Act now" }
    })
    .to_string()
}

async fn mount_models(server: &MockServer, ids: &[&str]) {
    let data: Vec<_> = ids.iter().map(|id| json!({ "id": id })).collect();
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": data })))
        .mount(server)
        .await;
}

fn summarizer(server: &MockServer, lms_cli: &str) -> Summarizer {
    let mut config = LmStudioConfig::new(server.uri(), "qwen3");
    config.lms_cli = lms_cli.to_string();
    let backend = LmStudioBackend::new(config).unwrap();
    Summarizer::new(
        BackendSelector::pinned(Arc::new(backend)),
        SummarizerOptions::default(),
    )
}

#[tokio::test]
async fn test_structured_summary_accepted() {
    let server = MockServer::start().await;
    mount_models(&server, &["qwen3"]).await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("json_schema"))
        .respond_with(chat_reply(&summary_json()))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(chat_reply("RESEARCH"))
        .mount(&server)
        .await;

    let summary = summarizer(&server, "lms")
        .summarize("Trial", "https://a.example/trial", "Drug X trial content.")
        .await
        .unwrap();

    assert_eq!(summary.backend, "lmstudio");
    assert_eq!(summary.model, "qwen3");
    assert_eq!(summary.attempts, 1);
    assert_eq!(summary.article_type, ArticleType::Research);
    assert_eq!(summary.bullets.len(), 4);
    assert_eq!(summary.actionability.as_deref(), Some("🟢 Act now"));
    assert!(!summary.prose);
}

#[tokio::test]
async fn test_invalid_output_retried_once_then_rejected() {
    let server = MockServer::start().await;
    mount_models(&server, &["qwen3"]).await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("json_schema"))
        .respond_with(chat_reply("- one\n- two\n- three\n- four\n- five"))
        .expect(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(chat_reply("NEWS"))
        .mount(&server)
        .await;

    let err = summarizer(&server, "lms")
        .summarize("T", "https://a.example/x", "content")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SummarizerError::ValidationExhausted {
            attempts: 2,
            message: "Expected 3-4 bullets, got 5".to_string(),
        }
    );
}

#[tokio::test]
async fn test_http_error_is_reported() {
    let server = MockServer::start().await;
    mount_models(&server, &["qwen3"]).await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
        .mount(&server)
        .await;

    let err = summarizer(&server, "lms")
        .summarize("T", "https://a.example/x", "content")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "LM Studio HTTP 500: model crashed");
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn test_missing_model_without_cli_fails_setup() {
    let server = MockServer::start().await;
    mount_models(&server, &["other-model"]).await;

    let err = summarizer(&server, "/nonexistent/lms-cli")
        .summarize("T", "https://a.example/x", "content")
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Model setup failed: 'lms' CLI not found - install LM Studio CLI"
    );
}
