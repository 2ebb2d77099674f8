//! # News Ingest
//!
//! Scrapes news articles from any source that can be described by a set of
//! CSS selectors and appends the ones not seen before to a database.
//!
//! ## Usage
//!
//! ```sh
//! news_ingest -s sources.config.json -d sqlite://news.db
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Configuration**: Load source descriptors, skipping invalid ones
//! 2. **Scraping**: Index each listing page and fetch every linked article
//! 3. **Normalization**: Parse dates, substituting a sentinel when unknown
//! 4. **Ingestion**: Snapshot stored keys, filter, append sources then articles
//! 5. **Output**: Optionally write a JSON run report

use chrono::Local;
use clap::Parser;
use itertools::Itertools;
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod error;
mod extract;
mod fetch;
mod ingest;
mod models;
mod normalize;
mod outputs;
mod scrapers;
mod store;
mod utils;

use cli::Cli;
use error::IngestError;
use fetch::{HttpFetcher, RetryFetch, ThrottledFetch};
use ingest::{IngestSummary, Snapshot};
use models::{ArticleRecord, RunReport, SourceRecord, SourceSummary};
use outputs::json;
use scrapers::{ScrapeOptions, ScrapedSource};
use store::{SqliteStore, Store};
use utils::ensure_writable_dir;

/// Split scraped sources into source rows and normalized article rows.
fn normalize_all(scraped: Vec<ScrapedSource>) -> (Vec<SourceRecord>, Vec<ArticleRecord>) {
    let mut sources: Vec<SourceRecord> = Vec::with_capacity(scraped.len());
    let mut articles: Vec<ArticleRecord> = Vec::new();
    for source in scraped {
        articles.extend(source.articles.iter().map(normalize::normalize));
        sources.push(source.record);
    }
    (sources, articles)
}

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let local_date = Local::now().date_naive().to_string();
    let local_time = Local::now().time().format("%H:%M:%S").to_string();
    info!("news_ingest starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    // Early check: ensure JSON output dir is writable
    if let Some(dir) = args.json_output_dir.as_deref() {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(path = %dir, error = %e, "JSON output directory is not writable");
            return Err(e);
        }
    }

    // ---- Load sources ----
    let mut descriptors = Vec::new();
    for entry in config::load_sources(Path::new(&args.sources)).await? {
        match entry {
            Ok(descriptor) => descriptors.push(descriptor),
            Err(e) => {
                let err = IngestError::from(e);
                warn!(error = %err, "Skipping invalid source");
            }
        }
    }
    for name in descriptors.iter().map(|d| &d.name).duplicates() {
        warn!(%name, "Source name configured more than once");
    }
    info!(count = descriptors.len(), "Sources ready to scrape");

    // ---- Scrape ----
    let http = HttpFetcher::new(Duration::from_secs(args.timeout_secs), &args.user_agent)?;
    let fetcher = RetryFetch::new(
        ThrottledFetch::new(http, Duration::from_millis(args.host_interval_ms)),
        args.retries,
        Duration::from_millis(args.retry_base_delay_ms),
    );
    let options = ScrapeOptions {
        source_concurrency: args.source_concurrency,
        article_concurrency: args.article_concurrency,
        logo_policy: args.logo_policy,
    };
    let scraped = scrapers::fetch_sources(&fetcher, &descriptors, &options).await;

    let summaries: Vec<SourceSummary> = scraped
        .iter()
        .map(|s| SourceSummary {
            source_id: s.record.source_id,
            name: s.record.name.clone(),
            articles_found: s.articles.len(),
            logo: s.record.logo.clone(),
        })
        .collect();

    // ---- Normalize ----
    let (mut sources, mut articles) = normalize_all(scraped);
    let unknown_dates = articles
        .iter()
        .filter(|a| a.date_published == normalize::UNKNOWN_DATE)
        .count();
    info!(
        sources = sources.len(),
        articles = articles.len(),
        unknown_dates,
        "Normalized records"
    );

    // ---- Ingest ----
    let store = if args.dry_run {
        match SqliteStore::open_existing(&args.database_url).await {
            Ok(store) => store,
            Err(e) => {
                info!(error = %e, "No existing article store; planning against an empty one");
                SqliteStore::connect("sqlite::memory:").await?
            }
        }
    } else {
        SqliteStore::connect(&args.database_url).await?
    };
    if args.stable_source_ids {
        let known = store.source_ids().await?;
        let max_id = store.max_source_id().await?;
        (sources, articles) = ingest::reconcile_source_ids(sources, articles, &known, max_id);
        info!(known = known.len(), "Reconciled source ids with stored names");
    }

    let summary = if args.dry_run {
        let snapshot = Snapshot::capture(&store).await?;
        let plan = ingest::plan(sources, articles, &snapshot, args.dedup_key);
        for source in &plan.sources {
            info!(name = %source.name, source_id = source.source_id, "Would insert source");
        }
        for article in &plan.articles {
            info!(url = %article.url, title = ?article.title, "Would insert article");
        }
        IngestSummary::from(&plan)
    } else {
        match ingest::ingest(&store, sources, articles, args.dedup_key).await {
            Ok(summary) => summary,
            Err(e) => {
                error!(error = %e, "Ingestion failed");
                return Err(e.into());
            }
        }
    };
    store.pool().close().await;

    // ---- Report ----
    if let Some(dir) = args.json_output_dir.as_deref() {
        let report = RunReport {
            local_date,
            local_time,
            dry_run: args.dry_run,
            sources: summaries,
            inserted_sources: summary.inserted_sources,
            inserted_articles: summary.inserted_articles,
            skipped_sources: summary.skipped_sources,
            skipped_articles: summary.skipped_articles,
        };
        if let Err(e) = json::write_report(&report, dir).await {
            error!(error = %e, "Failed to write run report");
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        dry_run = args.dry_run,
        inserted_sources = summary.inserted_sources,
        inserted_articles = summary.inserted_articles,
        "Execution complete"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::PageFetcher;
    use crate::ingest::DedupKey;
    use crate::store::MemoryStore;

    const SOURCES: &str = r#"[
        {
            "name": "Daily",
            "base_url": "https://daily.example",
            "listing_url": "https://daily.example/latest",
            "listing_selectors": { "container": "li.story", "link": "a", "thumbnail": "img" },
            "article_selectors": {
                "title": "h1", "content": "article", "author": ".author",
                "date_published": "time[itemprop=datePublished]",
                "date_edited": "time[itemprop=dateModified]",
                "thumbnail": "article img"
            }
        },
        {
            "name": "Daily",
            "base_url": "https://mirror.example",
            "listing_url": "https://mirror.example/latest",
            "listing_selectors": { "container": "li.story", "link": "a" },
            "article_selectors": {
                "title": "h1", "content": "article", "author": ".author",
                "date_published": "time", "date_edited": "time", "thumbnail": "img"
            }
        }
    ]"#;

    fn fetcher() -> PageFetcher {
        PageFetcher::new()
            .with_page(
                "https://daily.example/latest",
                r#"<ul>
                    <li class="story"><a href="/s/1">One</a><img src="/logo-1.png"></li>
                    <li class="story"><a href="/s/2">Two</a></li>
                </ul>"#,
            )
            .with_page(
                "https://daily.example/s/1",
                r#"<h1>Rates rise</h1><span class="author">Ann Lee</span>
                   <time itemprop="datePublished">2024-06-01T08:00:00Z</time>
                   <time itemprop="dateModified">yesterday-ish</time>
                   <article><p>Body.</p><img src="/pics/1.jpg"></article>"#,
            )
    }

    #[tokio::test]
    async fn test_pipeline_end_to_end_and_rerun_is_idempotent() {
        let descriptors: Vec<_> = config::parse_sources(SOURCES, false)
            .unwrap()
            .into_iter()
            .map(|s| s.unwrap())
            .collect();
        let store = MemoryStore::new();

        let scraped =
            scrapers::fetch_sources(&fetcher(), &descriptors, &ScrapeOptions::default()).await;
        let (sources, articles) = normalize_all(scraped);

        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].logo, "https://daily.example/logo-1.png");
        assert_eq!(sources[1].source_id, 2);
        assert_eq!(sources[1].logo, "");
        assert_eq!(articles.len(), 2);

        let first = &articles[0];
        assert_eq!(first.title.as_deref(), Some("Rates rise"));
        assert_eq!(first.author.as_deref(), Some("Ann Lee"));
        assert_eq!(first.thumbnail, "https://daily.example/pics/1.jpg");
        assert_eq!(first.date_published.to_string(), "2024-06-01 08:00:00");
        assert_eq!(first.date_edited, normalize::UNKNOWN_DATE);

        let second = &articles[1];
        assert_eq!(second.url, "https://daily.example/s/2");
        assert_eq!(second.title, None);
        assert_eq!(second.source_id, 1);
        assert_eq!(second.date_published, normalize::UNKNOWN_DATE);

        let summary = ingest::ingest(&store, sources.clone(), articles.clone(), DedupKey::Title)
            .await
            .unwrap();
        assert_eq!(summary.inserted_sources, 2);
        assert_eq!(summary.inserted_articles, 2);

        let rerun = ingest::ingest(&store, sources, articles, DedupKey::Title)
            .await
            .unwrap();
        assert_eq!(rerun.inserted_sources, 0);
        assert_eq!(rerun.inserted_articles, 0);
    }

    #[tokio::test]
    async fn test_duplicate_source_name_filtered_on_later_run() {
        let descriptors: Vec<_> = config::parse_sources(SOURCES, false)
            .unwrap()
            .into_iter()
            .map(|s| s.unwrap())
            .collect();
        let store = MemoryStore::new();
        store
            .append_sources(&[SourceRecord {
                source_id: 1,
                name: "Daily".into(),
                base_url: "https://daily.example".into(),
                listing_url: "https://daily.example/latest".into(),
                logo: String::new(),
            }])
            .await
            .unwrap();

        let scraped =
            scrapers::fetch_sources(&fetcher(), &descriptors, &ScrapeOptions::default()).await;
        let (sources, articles) = normalize_all(scraped);
        assert_eq!(sources[1].source_id, 2);

        let summary = ingest::ingest(&store, sources, articles, DedupKey::Title)
            .await
            .unwrap();
        assert_eq!(summary.inserted_sources, 0);
        assert_eq!(summary.skipped_sources, 2);
    }
}
