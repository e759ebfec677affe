//! End-to-end pipeline tests: stubbed fetches, corpus snapshot, mock LLM.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use digest_core::fetch::{DomainHeaders, FetchStrategy, HttpStrategy};
use digest_core::pipeline::{FetchPhase, PipelineOptions};
use digest_core::summarize::SummarizerOptions;
use digest_core::summarize::backend::{BackendSelector, LmStudioBackend, LmStudioConfig};
use digest_core::{
    Article, CorpusError, FetchCache, FetchConfig, Fetcher, Pipeline, Summarizer, iter_corpus,
    load_corpus, save_corpus,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn article_html(topic: &str, words: usize) -> String {
    let body = (0..words)
        .map(|i| format!("{topic}{i}"))
        .collect::<Vec<_>>()
        .join(" ");
    format!("<html><body><article><h1>{topic}</h1><p>{body}</p></article></body></html>")
}

/// Writes a stub manifest covering `pages` and returns its path.
fn stub_manifest(dir: &Path, pages: &[(&str, String)]) -> std::path::PathBuf {
    let mut map = serde_json::Map::new();
    for (i, (url, html)) in pages.iter().enumerate() {
        let file = format!("page{i}.html");
        std::fs::write(dir.join(&file), html).unwrap();
        map.insert((*url).to_string(), json!(file));
    }
    let manifest = dir.join("stubs.json");
    std::fs::write(&manifest, serde_json::Value::Object(map).to_string()).unwrap();
    manifest
}

fn pipeline(manifest: std::path::PathBuf) -> Pipeline {
    let http = HttpStrategy::new(DomainHeaders::default(), Duration::ZERO).unwrap();
    let fetcher = Fetcher::new(
        Arc::new(FetchCache::new()),
        Arc::new(http) as Arc<dyn FetchStrategy>,
        Vec::new(),
    );
    let cfg = FetchConfig {
        stub_manifest: Some(manifest),
        max_retries: 0,
        ..FetchConfig::default()
    };
    Pipeline::new(Arc::new(fetcher), cfg, PipelineOptions::default())
}

async fn fetched_phase(dir: &Path, server: &MockServer) -> (Vec<Article>, FetchPhase) {
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
        .mount(server)
        .await;

    let manifest = stub_manifest(
        dir,
        &[
            ("https://news.example/a", article_html("alpha", 250)),
            ("https://news.example/thin", article_html("beta", 20)),
            ("https://news.example/c", article_html("gamma", 250)),
        ],
    );
    let articles = vec![
        Article::from_url("https://news.example/a"),
        Article::from_url(format!("{}/gone", server.uri())),
        Article::from_url("https://news.example/thin"),
        Article::from_url("https://news.example/c"),
    ];
    let phase = pipeline(manifest).fetch_all(&articles).await;
    (articles, phase)
}

#[tokio::test]
async fn test_fetch_phase_keeps_input_order() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let (articles, phase) = fetched_phase(dir.path(), &server).await;

    let kept: Vec<usize> = phase.extracted.iter().map(|a| a.index).collect();
    assert_eq!(kept, vec![0, 3]);
    assert!(phase.extracted.iter().all(|a| a.strategy == "stub"));
    assert!(phase.extracted[0].content.contains("alpha0"));

    let failed: Vec<(usize, &str)> = phase
        .failures
        .iter()
        .map(|(i, f)| (*i, f.url.as_str()))
        .collect();
    assert_eq!(
        failed,
        vec![(1, articles[1].url.as_str()), (2, "https://news.example/thin")]
    );
    assert_eq!(phase.failures[0].1.reason, "HTTP 404: not here");
}

#[tokio::test]
async fn test_corpus_snapshot_survives_reload_and_detects_tampering() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let (_, phase) = fetched_phase(dir.path(), &server).await;

    let corpus = dir.path().join("corpus");
    let metadata = save_corpus(&corpus, "links.json", &phase.extracted).unwrap();
    assert_eq!(metadata.article_count, 2);
    assert_eq!(metadata.corpus_hash.len(), 64);
    assert!(corpus.join("article-000.source.html").exists());

    let (loaded_meta, loaded) = load_corpus(&corpus).unwrap();
    assert_eq!(loaded_meta, metadata);
    let urls: Vec<&str> = loaded.iter().map(|a| a.article.url.as_str()).collect();
    assert_eq!(urls, vec!["https://news.example/a", "https://news.example/c"]);
    assert_eq!(loaded[1].content, phase.extracted[1].content);

    std::fs::remove_file(corpus.join("article-001.content.md")).unwrap();
    let streamed: Vec<_> = iter_corpus(&corpus).unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(streamed.len(), 1);

    let articles_json = corpus.join("articles.json");
    let mut text = std::fs::read_to_string(&articles_json).unwrap();
    text.push(' ');
    std::fs::write(&articles_json, text).unwrap();
    let err = load_corpus(&corpus).unwrap_err();
    assert!(matches!(err, CorpusError::IntegrityMismatch { .. }));
    assert!(err.to_string().starts_with("corpus integrity check failed: expected "));
}

#[tokio::test]
async fn test_full_run_produces_report() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [{"id": "qwen3"}]})))
        .mount(&server)
        .await;
    let summary = json!({
        "bullets": [
            { "label": "KEY FINDING", "text": "one" },
            { "label": "TACTICAL WIN [🚀]", "text": "two" },
            { "label": "MARKET SIGNAL [🟡]", "text": "three" },
            { "label": "CONCERN", "text": "four" }
        ],
        "actionability": { "emoji": "🟡", "label": "Watch" }
    })
    .to_string();
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("json_schema"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"choices": [{"message": {"content": summary}}]}),
        ))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"choices": [{"message": {"content": "NEWS"}}]})),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (articles, phase) = fetched_phase(dir.path(), &server).await;
    let manifest = dir.path().join("stubs.json");
    let pipeline = pipeline(manifest);

    let backend = LmStudioBackend::new(LmStudioConfig::new(server.uri(), "qwen3")).unwrap();
    let summarizer = Summarizer::new(
        BackendSelector::pinned(Arc::new(backend)),
        SummarizerOptions::default(),
    );
    let report = pipeline.complete(phase, Some(&summarizer)).await.unwrap();

    let summarized: Vec<&str> = report
        .summaries
        .iter()
        .map(|s| s.article.url.as_str())
        .collect();
    assert_eq!(summarized, vec!["https://news.example/a", "https://news.example/c"]);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.failures[0].url, articles[1].url);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["summaries"][0]["backend"], "lmstudio");
    assert_eq!(json["summaries"][0]["actionability"], "🟡 Watch");
}
