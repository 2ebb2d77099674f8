//! Selector-driven scraper for one configured source.
//!
//! A source is scraped in two phases:
//!
//! 1. **Indexing**: fetch the listing page and collect one [`ListingEntry`]
//!    per container that has a link
//! 2. **Fetching**: fetch every entry's article page and extract the fields
//!    named in [`ArticleSelectors`]
//!
//! Neither phase raises. A listing page that cannot be fetched yields a
//! source with no articles; an article page that cannot be fetched yields a
//! record carrying only its URL and source id.

use super::{LogoPolicy, ScrapeOptions};
use crate::config::{ArticleSelectors, SourceDescriptor};
use crate::error::IngestError;
use crate::extract::{extract_attribute, extract_text, resolve_link};
use crate::fetch::Fetch;
use crate::models::{RawArticle, SourceRecord};
use crate::utils::truncate_for_log;
use futures::stream::{self, StreamExt};
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};

/// One article entry found on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    /// Absolute article URL.
    pub link: String,
    /// Absolute thumbnail URL, when the container has one.
    pub thumbnail: Option<String>,
}

/// Result of indexing a listing page.
#[derive(Debug, Default)]
pub struct ListingIndex {
    /// Number of containers matched, with or without a link.
    pub containers: usize,
    /// Entries for containers that had a link, in document order.
    pub entries: Vec<ListingEntry>,
}

/// Collect article entries from a listing page.
///
/// Containers without a link element (or whose link has no `href`) are
/// skipped.
pub fn index_listing(html: &str, source: &SourceDescriptor) -> ListingIndex {
    let selectors = &source.listing_selectors;
    let Ok(container_selector) = Selector::parse(&selectors.container) else {
        warn!(source = %source.name, selector = %selectors.container, "Container selector does not parse");
        return ListingIndex::default();
    };

    let document = Html::parse_document(html);
    let mut index = ListingIndex::default();

    for container in document.select(&container_selector) {
        index.containers += 1;

        let Some(href) = extract_attribute(&container, &selectors.link, "href") else {
            debug!(source = %source.name, container = index.containers, "Container has no link; skipping");
            continue;
        };

        let thumbnail = selectors
            .thumbnail
            .as_deref()
            .and_then(|sel| extract_attribute(&container, sel, "src"))
            .map(|src| resolve_link(&source.base_url, &src));

        index.entries.push(ListingEntry {
            link: resolve_link(&source.base_url, &href),
            thumbnail,
        });
    }

    index
}

/// Pick the source logo from the listing entries.
pub fn choose_logo(entries: &[ListingEntry], policy: LogoPolicy) -> String {
    let mut thumbnails = entries.iter().filter_map(|e| e.thumbnail.as_deref());
    let chosen = match policy {
        LogoPolicy::Last => thumbnails.last(),
        LogoPolicy::First => thumbnails.next(),
    };
    chosen.unwrap_or_default().to_string()
}

/// Extract every article field from a fetched article page.
pub fn extract_article(
    html: &str,
    url: String,
    selectors: &ArticleSelectors,
    base_url: &str,
    source_id: i64,
) -> RawArticle {
    let document = Html::parse_document(html);
    RawArticle {
        title: extract_text(&document, &selectors.title),
        url,
        text: extract_text(&document, &selectors.content),
        author: extract_text(&document, &selectors.author),
        date_published: extract_text(&document, &selectors.date_published),
        date_edited: extract_text(&document, &selectors.date_edited),
        thumbnail: extract_attribute(&document, &selectors.thumbnail, "src")
            .map(|src| resolve_link(base_url, &src))
            .unwrap_or_default(),
        source_id,
    }
}

/// Fetch and extract a single article. Never fails; see module docs.
#[instrument(level = "debug", skip_all, fields(url = %entry.link))]
async fn fetch_article<F: Fetch>(
    fetcher: &F,
    source: &SourceDescriptor,
    source_id: i64,
    entry: ListingEntry,
) -> RawArticle {
    match fetcher.fetch(&entry.link).await {
        Ok(body) => {
            let article = extract_article(
                &body,
                entry.link,
                &source.article_selectors,
                &source.base_url,
                source_id,
            );
            debug!(
                title = %truncate_for_log(article.title.as_deref().unwrap_or(""), 80),
                "Extracted article"
            );
            article
        }
        Err(cause) => {
            let err = IngestError::ArticleFetch {
                url: entry.link.clone(),
                cause,
            };
            warn!(source = %source.name, error = %err, "Keeping article with URL only");
            RawArticle::unreachable(entry.link, source_id)
        }
    }
}

/// Scrape one source: index its listing page, then fetch every article.
///
/// Articles come back in listing order regardless of
/// `options.article_concurrency`.
#[instrument(level = "info", skip_all, fields(source = %source.name, source_id = source_id))]
pub async fn fetch_source<F: Fetch>(
    fetcher: &F,
    source: &SourceDescriptor,
    source_id: i64,
    options: &ScrapeOptions,
) -> (SourceRecord, Vec<RawArticle>) {
    let mut record = SourceRecord {
        source_id,
        name: source.name.clone(),
        base_url: source.base_url.clone(),
        listing_url: source.listing_url.clone(),
        logo: String::new(),
    };

    let listing = match fetcher.fetch(&source.listing_url).await {
        Ok(body) => body,
        Err(cause) => {
            let err = IngestError::ListingFetch {
                source_name: source.name.clone(),
                cause,
            };
            warn!(error = %err, "Skipping articles for source");
            return (record, Vec::new());
        }
    };

    let index = index_listing(&listing, source);
    record.logo = choose_logo(&index.entries, options.logo_policy);
    info!(
        containers = index.containers,
        links = index.entries.len(),
        logo = %record.logo,
        "Indexed listing page"
    );

    let articles: Vec<RawArticle> = stream::iter(index.entries)
        .map(|entry| fetch_article(fetcher, source, source_id, entry))
        .buffered(options.article_concurrency.max(1))
        .collect()
        .await;

    let untitled = articles.iter().filter(|a| a.title.is_none()).count();
    info!(
        count = articles.len(),
        untitled,
        "Fetched article pages"
    );
    (record, articles)
}
