//! Incremental ingestion: append only what is not stored yet.
//!
//! A run takes one [`Snapshot`] of the stored keys before writing anything
//! and filters every new record against it. Nothing is re-read mid-run, so a
//! writer racing with this one can still produce duplicates; the store is
//! append-only and never updated or pruned here.
//!
//! # Dedup keys
//!
//! | Record | Key |
//! |--------|-----|
//! | Source | `name` |
//! | Article, [`DedupKey::Title`] | `title`, or `url` when the article has no title |
//! | Article, [`DedupKey::Url`] | `url` |
//!
//! Title keys mean two different articles that share a headline collide;
//! [`DedupKey::Url`] avoids that at the cost of re-inserting an article whose
//! URL changed.

use crate::error::{IngestError, StoreError};
use crate::models::{ArticleRecord, SourceRecord};
use crate::store::Store;
use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use tracing::{info, instrument, warn};

/// Which article field decides whether an article is already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DedupKey {
    #[default]
    Title,
    Url,
}

/// Stored keys, read once at the start of a run.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub source_names: HashSet<String>,
    pub article_titles: HashSet<String>,
    pub article_urls: HashSet<String>,
}

impl Snapshot {
    /// Read every dedup key from `store`.
    #[instrument(level = "info", skip_all)]
    pub async fn capture<S: Store>(store: &S) -> Result<Self, IngestError> {
        let read = |cause: StoreError| IngestError::Persistence {
            stage: "snapshot",
            sources_written: 0,
            cause,
        };
        let snapshot = Self {
            source_names: store.existing_source_names().await.map_err(read)?,
            article_titles: store.existing_article_titles().await.map_err(read)?,
            article_urls: store.existing_article_urls().await.map_err(read)?,
        };
        info!(
            sources = snapshot.source_names.len(),
            titles = snapshot.article_titles.len(),
            urls = snapshot.article_urls.len(),
            "Captured stored keys"
        );
        Ok(snapshot)
    }

    fn contains_article(&self, article: &ArticleRecord, key: DedupKey) -> bool {
        match (key, article.title.as_deref()) {
            (DedupKey::Title, Some(title)) => self.article_titles.contains(title),
            _ => self.article_urls.contains(&article.url),
        }
    }
}

/// Records selected for insertion, in extraction order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestPlan {
    pub sources: Vec<SourceRecord>,
    pub articles: Vec<ArticleRecord>,
    pub skipped_sources: usize,
    pub skipped_articles: usize,
}

/// Filter new records against `snapshot`.
///
/// Sources are kept when their name is not stored. Articles are kept when
/// their key is neither stored nor already taken by an earlier article in
/// the same batch.
pub fn plan(
    sources: Vec<SourceRecord>,
    articles: Vec<ArticleRecord>,
    snapshot: &Snapshot,
    key: DedupKey,
) -> IngestPlan {
    let source_total = sources.len();
    let article_total = articles.len();

    let sources: Vec<SourceRecord> = sources
        .into_iter()
        .filter(|s| !snapshot.source_names.contains(&s.name))
        .collect();

    let mut seen_titles: HashSet<String> = HashSet::new();
    let mut seen_urls: HashSet<String> = HashSet::new();
    let articles: Vec<ArticleRecord> = articles
        .into_iter()
        .filter(|a| !snapshot.contains_article(a, key))
        .filter(|a| match (key, a.title.as_ref()) {
            (DedupKey::Title, Some(title)) => seen_titles.insert(title.clone()),
            _ => seen_urls.insert(a.url.clone()),
        })
        .collect();

    IngestPlan {
        skipped_sources: source_total - sources.len(),
        skipped_articles: article_total - articles.len(),
        sources,
        articles,
    }
}

/// Counts reported after an ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub inserted_sources: usize,
    pub inserted_articles: usize,
    pub skipped_sources: usize,
    pub skipped_articles: usize,
}

impl From<&IngestPlan> for IngestSummary {
    fn from(plan: &IngestPlan) -> Self {
        Self {
            inserted_sources: plan.sources.len(),
            inserted_articles: plan.articles.len(),
            skipped_sources: plan.skipped_sources,
            skipped_articles: plan.skipped_articles,
        }
    }
}

/// Write a plan: sources first, then articles.
///
/// Each append is all-or-nothing. If the article append fails after the
/// sources were committed, the error says how many source rows landed.
#[instrument(level = "info", skip_all)]
pub async fn apply<S: Store>(store: &S, plan: &IngestPlan) -> Result<IngestSummary, IngestError> {
    if !plan.sources.is_empty() {
        store
            .append_sources(&plan.sources)
            .await
            .map_err(|cause| IngestError::Persistence {
                stage: "source",
                sources_written: 0,
                cause,
            })?;
    }

    if !plan.articles.is_empty() {
        store
            .append_articles(&plan.articles)
            .await
            .map_err(|cause| IngestError::Persistence {
                stage: "article",
                sources_written: plan.sources.len(),
                cause,
            })?;
    }

    let summary = IngestSummary::from(plan);
    info!(
        inserted_sources = summary.inserted_sources,
        inserted_articles = summary.inserted_articles,
        skipped_sources = summary.skipped_sources,
        skipped_articles = summary.skipped_articles,
        "Ingestion complete"
    );
    Ok(summary)
}

/// Snapshot, filter and append in one go.
pub async fn ingest<S: Store>(
    store: &S,
    sources: Vec<SourceRecord>,
    articles: Vec<ArticleRecord>,
    key: DedupKey,
) -> Result<IngestSummary, IngestError> {
    let snapshot = Snapshot::capture(store).await?;
    let planned = plan(sources, articles, &snapshot, key);
    apply(store, &planned).await
}

/// Replace per-run source ids with ids that stay stable across runs.
///
/// A name already stored keeps its stored id. A new name gets the next id
/// after `max_id` (the largest id in storage) or the largest known id. When a name appears more than once in the
/// batch, only its first source is kept and the articles of the others are
/// moved onto it.
pub fn reconcile_source_ids(
    sources: Vec<SourceRecord>,
    articles: Vec<ArticleRecord>,
    known: &HashMap<String, i64>,
    max_id: i64,
) -> (Vec<SourceRecord>, Vec<ArticleRecord>) {
    for name in sources.iter().map(|s| &s.name).duplicates() {
        warn!(%name, "Source name configured more than once; merging under one id");
    }

    let mut next_id = known.values().copied().fold(max_id, i64::max);
    let mut assigned: HashMap<String, i64> = known.clone();
    let mut remap: HashMap<i64, i64> = HashMap::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut kept = Vec::with_capacity(sources.len());

    for mut source in sources {
        let id = *assigned.entry(source.name.clone()).or_insert_with(|| {
            next_id += 1;
            next_id
        });
        remap.insert(source.source_id, id);
        if seen.insert(source.name.clone()) {
            source.source_id = id;
            kept.push(source);
        }
    }

    let articles = articles
        .into_iter()
        .map(|mut article| {
            if let Some(id) = remap.get(&article.source_id) {
                article.source_id = *id;
            }
            article
        })
        .collect();

    (kept, articles)
}
