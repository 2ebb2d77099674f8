//! Command-line interface definitions for News Ingest.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Connection settings can also come from environment variables so that
//! credentials never need to live in the source file or the command line.

use crate::ingest::DedupKey;
use crate::scrapers::LogoPolicy;
use clap::Parser;

/// Command-line arguments for the News Ingest application.
///
/// # Examples
///
/// ```sh
/// # Scrape every configured source into a local SQLite file
/// news_ingest -s sources.config.json -d sqlite://news.db
///
/// # Faster, politer, with retries
/// news_ingest -s sources.yaml --article-concurrency 8 --host-interval-ms 250 --retries 3
///
/// # See what would be inserted without writing
/// news_ingest -s sources.yaml --dry-run -j ./reports
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Source descriptor file (JSON, or YAML with a .yaml/.yml extension)
    #[arg(short, long, default_value = "sources.config.json")]
    pub sources: String,

    /// Database to ingest into
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite://news.db")]
    pub database_url: String,

    /// Number of sources scraped at the same time
    #[arg(long, default_value_t = 1)]
    pub source_concurrency: usize,

    /// Number of article pages fetched at the same time per source
    #[arg(long, default_value_t = 1)]
    pub article_concurrency: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Retries for timeouts, transport errors, 429 and 5xx responses
    #[arg(long, default_value_t = 0)]
    pub retries: usize,

    /// Initial backoff between retries, doubled on each attempt
    #[arg(long, default_value_t = 500)]
    pub retry_base_delay_ms: u64,

    /// Minimum interval between requests to the same host (0 disables)
    #[arg(long, default_value_t = 0)]
    pub host_interval_ms: u64,

    /// User-Agent header sent with every request
    #[arg(long, default_value = concat!("news_ingest/", env!("CARGO_PKG_VERSION")))]
    pub user_agent: String,

    /// Key used to recognise articles that are already stored
    #[arg(long, value_enum, default_value_t = DedupKey::Title)]
    pub dedup_key: DedupKey,

    /// Which listing thumbnail becomes the source logo
    #[arg(long, value_enum, default_value_t = LogoPolicy::Last)]
    pub logo_policy: LogoPolicy,

    /// Keep source ids stable across runs by looking them up by name
    #[arg(long)]
    pub stable_source_ids: bool,

    /// Scrape and plan, but write nothing to the database
    #[arg(long)]
    pub dry_run: bool,

    /// Output directory for the JSON run report
    #[arg(short, long)]
    pub json_output_dir: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["news_ingest", "--database-url", "sqlite::memory:"]);

        assert_eq!(cli.sources, "sources.config.json");
        assert_eq!(cli.database_url, "sqlite::memory:");
        assert_eq!(cli.source_concurrency, 1);
        assert_eq!(cli.article_concurrency, 1);
        assert_eq!(cli.retries, 0);
        assert_eq!(cli.dedup_key, DedupKey::Title);
        assert_eq!(cli.logo_policy, LogoPolicy::Last);
        assert!(!cli.stable_source_ids);
        assert!(!cli.dry_run);
        assert!(cli.json_output_dir.is_none());
        assert!(cli.user_agent.starts_with("news_ingest/"));
    }

    #[test]
    fn test_cli_short_flags_and_enums() {
        let cli = Cli::parse_from([
            "news_ingest",
            "-s",
            "/etc/news/sources.yaml",
            "-d",
            "sqlite:///tmp/news.db",
            "-j",
            "/tmp/reports",
            "--dedup-key",
            "url",
            "--logo-policy",
            "first",
            "--stable-source-ids",
        ]);

        assert_eq!(cli.sources, "/etc/news/sources.yaml");
        assert_eq!(cli.database_url, "sqlite:///tmp/news.db");
        assert_eq!(cli.json_output_dir.as_deref(), Some("/tmp/reports"));
        assert_eq!(cli.dedup_key, DedupKey::Url);
        assert_eq!(cli.logo_policy, LogoPolicy::First);
        assert!(cli.stable_source_ids);
    }
}
