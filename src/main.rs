//! CLI entry point for the article-digest tool.

use std::io::{self, IsTerminal, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use digest_core::pipeline::FetchPhase;
use digest_core::render::{DEFAULT_SETTLE, RenderOptions, render_page};
use digest_core::{FetchCache, Pipeline, Report, Settings, Summarizer, load_corpus, save_corpus};
use tracing::{debug, info, warn};

mod app;
mod cli;

use app::input_processor::collect_articles;
use app::progress_manager::spawn_progress_ui;
use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    if let Some(Command::Render {
        url,
        timeout,
        headed,
    }) = &args.command
    {
        return run_render(url, *timeout, *headed).await;
    }

    run_digest(&args).await
}

/// Hidden `render` subcommand: prints the rendered DOM to stdout.
async fn run_render(url: &str, timeout_secs: u64, headed: bool) -> Result<()> {
    let options = RenderOptions {
        timeout: Duration::from_secs(timeout_secs),
        headless: !headed,
        settle: DEFAULT_SETTLE,
    };
    let html = render_page(url, &options).await?;
    let mut stdout = io::stdout().lock();
    stdout.write_all(html.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = Settings::load(args.config.as_deref()).context("failed to load settings")?;
    if let Some(backend) = args.backend {
        settings.llm.backend = backend.as_str().to_string();
    }
    if let Some(workers) = args.max_workers {
        settings.pipeline.max_workers = usize::from(workers);
    }
    if let Some(secs) = args.timeout {
        settings.fetch.timeout = Duration::from_secs(secs);
    }
    if let Some(path) = &args.stub_manifest {
        settings.fetch.stub_manifest = Some(path.clone());
    }
    settings.validate()?;
    Ok(settings)
}

async fn run_digest(args: &Args) -> Result<()> {
    info!("article-digest starting");
    let settings = load_settings(args)?;

    // Fail before any fetching when summaries were requested but cannot be made.
    let summarizer = if args.fetch_only {
        None
    } else {
        let selector = settings
            .build_selector()
            .context("cannot summarize; use --fetch-only to skip summaries")?;
        Some(Summarizer::new(selector, settings.summarizer_options()))
    };

    let fetcher = Arc::new(settings.build_fetcher(Arc::new(FetchCache::new()))?);
    let pipeline = Pipeline::new(fetcher, settings.fetch_config(), settings.pipeline);

    let phase = if let Some(dir) = &args.corpus_load {
        let (metadata, extracted) = load_corpus(dir)
            .with_context(|| format!("failed to load corpus from {}", dir.display()))?;
        info!(
            source = %metadata.source,
            timestamp = %metadata.timestamp,
            articles = extracted.len(),
            "Loaded corpus"
        );
        FetchPhase {
            extracted,
            failures: Vec::new(),
        }
    } else {
        let articles = collect_articles(args.links.as_deref(), &args.urls)?;
        if articles.is_empty() {
            info!("No input provided. Pass --links <file>, URLs as arguments, or pipe URLs via stdin.");
            return Ok(());
        }

        let use_spinner = !args.quiet && io::stderr().is_terminal();
        let (handle, stop) = spawn_progress_ui(use_spinner, pipeline.fetched_counter(), articles.len());
        let phase = pipeline.fetch_all(&articles).await;
        stop.store(true, Ordering::SeqCst);
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        if let Some(dir) = &args.corpus_save {
            let source = args
                .links
                .as_deref()
                .map_or_else(|| "args".to_string(), |p| p.display().to_string());
            let metadata = save_corpus(dir, &source, &phase.extracted)
                .with_context(|| format!("failed to save corpus to {}", dir.display()))?;
            info!(
                dir = %dir.display(),
                articles = metadata.article_count,
                hash = %metadata.corpus_hash,
                "Saved corpus"
            );
        }
        phase
    };

    let report = pipeline.complete(phase, summarizer.as_ref()).await?;
    info!(
        summaries = report.summaries.len(),
        failures = report.failures.len(),
        fetch_summary = %pipeline.tally().summary_line(),
        "Digest complete"
    );
    for failure in &report.failures {
        warn!(url = %failure.url, reason = %failure.reason, "Article failed");
    }

    write_report(&report, args.output.as_deref())
}

fn write_report(report: &Report, output: Option<&Path>) -> Result<()> {
    let mut json = serde_json::to_string_pretty(report)?;
    json.push('\n');
    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(json.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}
