//! Record types produced by the pipeline.
//!
//! - [`SourceRecord`]: metadata for one configured source, one per run
//! - [`RawArticle`]: article fields exactly as extracted, dates still text
//! - [`ArticleRecord`]: normalized article, ready to persist
//! - [`RunReport`]: summary of one run, written by [`crate::outputs::json`]
//!
//! All records are immutable once built; the pipeline stages produce new
//! values instead of editing old ones.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Metadata about a source, persisted the first time its name is seen.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SourceRecord {
    /// Identifier shared with every [`ArticleRecord`] scraped from this source.
    pub source_id: i64,
    /// Source name, the source dedup key.
    pub name: String,
    /// Prefix for relative links.
    pub base_url: String,
    /// Page crawled for article links.
    pub listing_url: String,
    /// Thumbnail URL chosen from the listing page, or empty.
    pub logo: String,
}

/// An article as extracted from its page, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawArticle {
    pub title: Option<String>,
    /// Absolute article URL.
    pub url: String,
    pub text: Option<String>,
    pub author: Option<String>,
    pub date_published: Option<String>,
    pub date_edited: Option<String>,
    /// Absolute thumbnail URL, or empty.
    pub thumbnail: String,
    pub source_id: i64,
}

impl RawArticle {
    /// Record for an article whose page could not be fetched.
    ///
    /// Only the URL and the owning source are known; keeping the row lets
    /// later runs recognise the URL as already seen.
    pub fn unreachable(url: String, source_id: i64) -> Self {
        Self {
            title: None,
            url,
            text: None,
            author: None,
            date_published: None,
            date_edited: None,
            thumbnail: String::new(),
            source_id,
        }
    }
}

/// A normalized article, ready for the ingestor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ArticleRecord {
    pub title: Option<String>,
    pub url: String,
    pub text: Option<String>,
    pub author: Option<String>,
    /// Parsed timestamp, or [`crate::normalize::UNKNOWN_DATE`].
    pub date_published: NaiveDateTime,
    /// Parsed timestamp, or [`crate::normalize::UNKNOWN_DATE`].
    pub date_edited: NaiveDateTime,
    pub thumbnail: String,
    pub source_id: i64,
}

/// Per-source line of a [`RunReport`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceSummary {
    pub source_id: i64,
    pub name: String,
    pub articles_found: usize,
    pub logo: String,
}

/// Summary of one ingestion run.
#[derive(Debug, Deserialize, Serialize)]
pub struct RunReport {
    /// Run start date, `YYYY-MM-DD`.
    pub local_date: String,
    /// Run start time, `HH:MM:SS`.
    pub local_time: String,
    /// Whether anything was written.
    pub dry_run: bool,
    pub sources: Vec<SourceSummary>,
    pub inserted_sources: usize,
    pub inserted_articles: usize,
    pub skipped_sources: usize,
    pub skipped_articles: usize,
}
