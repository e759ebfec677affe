//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Fetch articles from a list of links and summarize them with a local LLM.
///
/// Links come from a JSON file (`--links`), positional URLs, or one URL per
/// line on stdin. The JSON report goes to stdout unless `--output` is given.
#[derive(Parser, Debug)]
#[command(name = "article-digest")]
#[command(author, version, about)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/article-digest/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// JSON file holding an array of {title, url, publisher, snippet}
    #[arg(long, value_name = "FILE")]
    pub links: Option<PathBuf>,

    /// Article URLs to process
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,

    /// Write the JSON report here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Stop after fetching and extracting; no summaries
    #[arg(long)]
    pub fetch_only: bool,

    /// Save the fetched corpus to this directory
    #[arg(long, value_name = "DIR")]
    pub corpus_save: Option<PathBuf>,

    /// Skip fetching and summarize a saved corpus
    #[arg(long, value_name = "DIR", conflicts_with_all = ["links", "urls", "corpus_save"])]
    pub corpus_load: Option<PathBuf>,

    /// Summarization backend
    #[arg(short, long, value_enum)]
    pub backend: Option<BackendArg>,

    /// Concurrent fetch workers (1-100)
    #[arg(short = 'w', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub max_workers: Option<u8>,

    /// Per-request HTTP timeout in seconds (1-300)
    #[arg(short, long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..=300))]
    pub timeout: Option<u64>,

    /// JSON manifest mapping URLs to local files, consulted before the network
    #[arg(long, value_name = "FILE")]
    pub stub_manifest: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Backend names accepted by `--backend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    Auto,
    Lmstudio,
    Ollama,
}

impl BackendArg {
    /// Name as understood by the settings layer.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Lmstudio => "lmstudio",
            Self::Ollama => "ollama",
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render one page in Chromium and print its HTML
    #[command(hide = true)]
    Render {
        /// Page URL
        url: String,

        /// Navigation timeout in seconds
        #[arg(long, default_value_t = 60)]
        timeout: u64,

        /// Show the browser window
        #[arg(long)]
        headed: bool,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["article-digest"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(args.urls.is_empty());
        assert!(!args.fetch_only);
        assert!(args.backend.is_none());
        assert!(args.command.is_none());
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["article-digest", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);

        let args = Args::try_parse_from(["article-digest", "--verbose", "--verbose"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let args = Args::try_parse_from(["article-digest", "-q"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["article-digest", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        assert!(!err.to_string().contains("render"), "render is hidden");
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let err = Args::try_parse_from(["article-digest", "--invalid-flag"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    // ==================== Input Tests ====================

    #[test]
    fn test_cli_positional_urls() {
        let args = Args::try_parse_from([
            "article-digest",
            "https://a.com/1",
            "https://b.com/2",
            "--fetch-only",
        ])
        .unwrap();
        assert_eq!(args.urls, vec!["https://a.com/1", "https://b.com/2"]);
        assert!(args.fetch_only);
    }

    #[test]
    fn test_cli_links_and_output() {
        let args = Args::try_parse_from([
            "article-digest",
            "--links",
            "links.json",
            "-o",
            "report.json",
        ])
        .unwrap();
        assert_eq!(args.links, Some(PathBuf::from("links.json")));
        assert_eq!(args.output, Some(PathBuf::from("report.json")));
    }

    #[test]
    fn test_cli_corpus_load_conflicts_with_links() {
        let err = Args::try_parse_from([
            "article-digest",
            "--corpus-load",
            "snap",
            "--links",
            "links.json",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    // ==================== Tuning Tests ====================

    #[test]
    fn test_cli_backend_values() {
        let args = Args::try_parse_from(["article-digest", "--backend", "ollama"]).unwrap();
        assert_eq!(args.backend, Some(BackendArg::Ollama));
        assert_eq!(BackendArg::Lmstudio.as_str(), "lmstudio");

        let err = Args::try_parse_from(["article-digest", "--backend", "gpt"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }

    #[test]
    fn test_cli_max_workers_range() {
        let args = Args::try_parse_from(["article-digest", "-w", "8"]).unwrap();
        assert_eq!(args.max_workers, Some(8));

        let err = Args::try_parse_from(["article-digest", "-w", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_timeout_over_max_rejected() {
        let err = Args::try_parse_from(["article-digest", "--timeout", "301"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    // ==================== Render Tests ====================

    #[test]
    fn test_cli_render_subcommand() {
        let args = Args::try_parse_from([
            "article-digest",
            "render",
            "https://a.com/x",
            "--timeout",
            "70",
            "--headed",
        ])
        .unwrap();
        let Some(Command::Render {
            url,
            timeout,
            headed,
        }) = args.command
        else {
            panic!("expected render subcommand");
        };
        assert_eq!(url, "https://a.com/x");
        assert_eq!(timeout, 70);
        assert!(headed);
    }
}
