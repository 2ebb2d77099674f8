//! Scraping every configured source.
//!
//! All sources go through the same generic scraper in [`source`]; what makes
//! one source differ from another is only its [`SourceDescriptor`].
//!
//! # Source identity
//!
//! Sources get `source_id` 1, 2, 3... in configuration order. The id is
//! fixed before any fetch starts, so it does not depend on which source
//! finishes first when sources run concurrently.
//!
//! # Concurrency
//!
//! Both levels use `futures::stream` with `buffered`, which bounds the number
//! of in-flight fetches and keeps output in input order. With both limits at
//! 1 the run is fully sequential.

pub mod source;

use crate::config::SourceDescriptor;
use crate::fetch::Fetch;
use crate::models::{RawArticle, SourceRecord};
use futures::stream::{self, StreamExt};
use tracing::{info, instrument};

/// How the source logo is chosen from the listing page thumbnails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogoPolicy {
    /// Thumbnail of the last linked container that has one.
    #[default]
    Last,
    /// Thumbnail of the first linked container that has one.
    First,
}

/// Knobs for a scraping run.
#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    /// Sources scraped at the same time.
    pub source_concurrency: usize,
    /// Article pages fetched at the same time within one source.
    pub article_concurrency: usize,
    pub logo_policy: LogoPolicy,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            source_concurrency: 1,
            article_concurrency: 1,
            logo_policy: LogoPolicy::default(),
        }
    }
}

/// Everything scraped from one source.
#[derive(Debug, Clone)]
pub struct ScrapedSource {
    pub record: SourceRecord,
    pub articles: Vec<RawArticle>,
}

/// Scrape all `sources`, assigning `source_id` from 1 in the given order.
#[instrument(level = "info", skip_all, fields(sources = sources.len()))]
pub async fn fetch_sources<F: Fetch>(
    fetcher: &F,
    sources: &[SourceDescriptor],
    options: &ScrapeOptions,
) -> Vec<ScrapedSource> {
    let scraped: Vec<ScrapedSource> = stream::iter(sources.iter().zip(1i64..))
        .map(|(source, source_id)| async move {
            let (record, articles) =
                source::fetch_source(fetcher, source, source_id, options).await;
            ScrapedSource { record, articles }
        })
        .buffered(options.source_concurrency.max(1))
        .collect()
        .await;

    let articles: usize = scraped.iter().map(|s| s.articles.len()).sum();
    info!(
        sources = scraped.len(),
        articles,
        "Scraped all sources"
    );
    scraped
}

#[cfg(test)]
mod tests {
    use super::source::tests::descriptor;
    use super::*;
    use crate::fetch::testing::PageFetcher;

    fn listing(links: &[&str]) -> String {
        let cards: String = links
            .iter()
            .map(|l| format!(r#"<div class="card"><a href="{l}">x</a></div>"#))
            .collect();
        format!("<html><body>{cards}</body></html>")
    }

    fn page(title: &str) -> String {
        format!("<html><body><h1>{title}</h1></body></html>")
    }

    #[tokio::test]
    async fn test_source_ids_follow_configuration_order() {
        let sources = vec![
            descriptor("Alpha", "https://alpha.example"),
            descriptor("Beta", "https://beta.example"),
        ];
        let fetcher = PageFetcher::new()
            .with_page("https://alpha.example/news", &listing(&["/1", "/2"]))
            .with_page("https://alpha.example/1", &page("A1"))
            .with_page("https://alpha.example/2", &page("A2"))
            .with_page("https://beta.example/news", &listing(&["/1"]))
            .with_page("https://beta.example/1", &page("B1"));

        let options = ScrapeOptions {
            source_concurrency: 2,
            article_concurrency: 2,
            ..ScrapeOptions::default()
        };
        let scraped = fetch_sources(&fetcher, &sources, &options).await;

        assert_eq!(scraped.len(), 2);
        assert_eq!(scraped[0].record.source_id, 1);
        assert_eq!(scraped[0].record.name, "Alpha");
        assert!(scraped[0].articles.iter().all(|a| a.source_id == 1));
        assert_eq!(scraped[1].record.source_id, 2);
        assert_eq!(scraped[1].articles.len(), 1);
        assert_eq!(scraped[1].articles[0].source_id, 2);
    }

    #[tokio::test]
    async fn test_failed_source_does_not_stop_siblings() {
        let sources = vec![
            descriptor("Down", "https://down.example"),
            descriptor("Up", "https://up.example"),
        ];
        let fetcher = PageFetcher::new()
            .with_page("https://up.example/news", &listing(&["/1"]))
            .with_page("https://up.example/1", &page("U1"));

        let scraped = fetch_sources(&fetcher, &sources, &ScrapeOptions::default()).await;

        assert!(scraped[0].articles.is_empty());
        assert_eq!(scraped[0].record.logo, "");
        assert_eq!(scraped[1].articles[0].title.as_deref(), Some("U1"));
    }

    #[tokio::test]
    async fn test_article_count_bounded_by_containers() {
        let sources = vec![descriptor("Alpha", "https://alpha.example")];
        let html = r#"<html><body>
            <div class="card"><a href="/1">x</a></div>
            <div class="card"><p>no link</p></div>
            <div class="card"><a href="/3">x</a></div>
            <div class="card"><a>no href</a></div>
        </body></html>"#;
        let fetcher = PageFetcher::new().with_page("https://alpha.example/news", html);

        let scraped = fetch_sources(&fetcher, &sources, &ScrapeOptions::default()).await;
        let index = source::index_listing(html, &sources[0]);

        assert_eq!(index.containers, 4);
        assert_eq!(scraped[0].articles.len(), 2);
        assert!(scraped[0].articles.len() <= index.containers);
    }

    #[tokio::test]
    async fn test_duplicate_names_get_distinct_ids() {
        let sources = vec![
            descriptor("Same", "https://one.example"),
            descriptor("Same", "https://two.example"),
        ];
        let fetcher = PageFetcher::new();

        let scraped = fetch_sources(&fetcher, &sources, &ScrapeOptions::default()).await;

        assert_eq!(scraped[0].record.source_id, 1);
        assert_eq!(scraped[1].record.source_id, 2);
    }
}
