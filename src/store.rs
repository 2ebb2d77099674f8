//! Persistence of sources and articles.
//!
//! The pipeline only ever reads the keys it deduplicates on and appends new
//! rows; it never updates or deletes. [`Store`] captures exactly that
//! surface, with two implementations:
//!
//! - [`SqliteStore`]: `sqlx` backed, creates its tables on connect
//! - [`MemoryStore`]: in-process, for tests

use crate::error::StoreError;
use crate::models::{ArticleRecord, SourceRecord};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
#[cfg(test)]
use std::sync::Mutex;
use tracing::{info, instrument};

/// Persistence capability used by the ingestor.
pub trait Store {
    /// Names of every stored source.
    async fn existing_source_names(&self) -> Result<HashSet<String>, StoreError>;

    /// Titles of every stored article that has one.
    async fn existing_article_titles(&self) -> Result<HashSet<String>, StoreError>;

    /// URLs of every stored article.
    async fn existing_article_urls(&self) -> Result<HashSet<String>, StoreError>;

    /// Lowest stored id for each source name.
    async fn source_ids(&self) -> Result<HashMap<String, i64>, StoreError>;

    /// Largest stored source id, 0 when there are none.
    async fn max_source_id(&self) -> Result<i64, StoreError>;

    /// Append source rows. All rows are written or none are.
    async fn append_sources(&self, rows: &[SourceRecord]) -> Result<(), StoreError>;

    /// Append article rows. All rows are written or none are.
    async fn append_articles(&self, rows: &[ArticleRecord]) -> Result<(), StoreError>;
}

/// SQLite-backed store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to `database_url`, creating the file and tables if missing.
    ///
    /// # Example URLs
    /// - `sqlite::memory:` - in-memory database (ephemeral)
    /// - `sqlite://news.db` - file-based database
    #[instrument(level = "info", skip_all)]
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let store = Self::open(database_url, options).await?;
        store.create_tables().await?;
        info!("Connected to article store");
        Ok(store)
    }

    /// Open an existing database read-only. Nothing is created: a missing
    /// file or missing tables is an error.
    #[instrument(level = "info", skip_all)]
    pub async fn open_existing(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(false)
            .read_only(true);
        let store = Self::open(database_url, options).await?;

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('source', 'article')",
        )
        .fetch_one(&store.pool)
        .await?;
        if tables < 2 {
            store.pool.close().await;
            return Err(StoreError::Rejected(
                "database has no source/article tables".into(),
            ));
        }
        info!("Opened article store read-only");
        Ok(store)
    }

    async fn open(database_url: &str, options: SqliteConnectOptions) -> Result<Self, StoreError> {
        // A single connection keeps `sqlite::memory:` one database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    async fn create_tables(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS source (
                id INTEGER NOT NULL,
                name TEXT NOT NULL,
                base_url TEXT NOT NULL,
                listing_url TEXT NOT NULL,
                logo TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_source_name ON source(name);
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS article (
                title TEXT,
                url TEXT NOT NULL,
                text TEXT,
                author TEXT,
                date_published TEXT NOT NULL,
                date_edited TEXT NOT NULL,
                thumbnail TEXT NOT NULL,
                source_id INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_article_title ON article(title);
            CREATE INDEX IF NOT EXISTS idx_article_url ON article(url);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl Store for SqliteStore {
    async fn existing_source_names(&self) -> Result<HashSet<String>, StoreError> {
        let names = sqlx::query_scalar::<_, String>("SELECT DISTINCT name FROM source")
            .fetch_all(&self.pool)
            .await?;
        Ok(names.into_iter().collect())
    }

    async fn existing_article_titles(&self) -> Result<HashSet<String>, StoreError> {
        let titles = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT title FROM article WHERE title IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(titles.into_iter().collect())
    }

    async fn existing_article_urls(&self) -> Result<HashSet<String>, StoreError> {
        let urls = sqlx::query_scalar::<_, String>("SELECT DISTINCT url FROM article")
            .fetch_all(&self.pool)
            .await?;
        Ok(urls.into_iter().collect())
    }

    async fn source_ids(&self) -> Result<HashMap<String, i64>, StoreError> {
        let rows = sqlx::query("SELECT name, MIN(id) AS id FROM source GROUP BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get::<String, _>("name"), row.get::<i64, _>("id")))
            .collect())
    }

    async fn max_source_id(&self) -> Result<i64, StoreError> {
        let max = sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(id) FROM source")
            .fetch_one(&self.pool)
            .await?;
        Ok(max.unwrap_or(0))
    }

    #[instrument(level = "info", skip_all, fields(rows = rows.len()))]
    async fn append_sources(&self, rows: &[SourceRecord]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for source in rows {
            sqlx::query(
                "INSERT INTO source (id, name, base_url, listing_url, logo) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(source.source_id)
            .bind(&source.name)
            .bind(&source.base_url)
            .bind(&source.listing_url)
            .bind(&source.logo)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(level = "info", skip_all, fields(rows = rows.len()))]
    async fn append_articles(&self, rows: &[ArticleRecord]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for article in rows {
            sqlx::query(
                r#"
                INSERT INTO article
                    (title, url, text, author, date_published, date_edited, thumbnail, source_id)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&article.title)
            .bind(&article.url)
            .bind(&article.text)
            .bind(&article.author)
            .bind(article.date_published)
            .bind(article.date_edited)
            .bind(&article.thumbnail)
            .bind(article.source_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

/// In-memory store. Rows are kept in append order.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    sources: Mutex<Vec<SourceRecord>>,
    articles: Mutex<Vec<ArticleRecord>>,
    fail_article_appends: bool,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects every article append, for exercising failure paths.
    pub fn failing_article_appends() -> Self {
        Self {
            fail_article_appends: true,
            ..Self::default()
        }
    }

    pub fn sources(&self) -> Vec<SourceRecord> {
        self.sources.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn articles(&self) -> Vec<ArticleRecord> {
        self.articles.lock().map(|a| a.clone()).unwrap_or_default()
    }

    fn poisoned() -> StoreError {
        StoreError::Rejected("memory store lock poisoned".into())
    }
}

#[cfg(test)]
impl Store for MemoryStore {
    async fn existing_source_names(&self) -> Result<HashSet<String>, StoreError> {
        let sources = self.sources.lock().map_err(|_| Self::poisoned())?;
        Ok(sources.iter().map(|s| s.name.clone()).collect())
    }

    async fn existing_article_titles(&self) -> Result<HashSet<String>, StoreError> {
        let articles = self.articles.lock().map_err(|_| Self::poisoned())?;
        Ok(articles.iter().filter_map(|a| a.title.clone()).collect())
    }

    async fn existing_article_urls(&self) -> Result<HashSet<String>, StoreError> {
        let articles = self.articles.lock().map_err(|_| Self::poisoned())?;
        Ok(articles.iter().map(|a| a.url.clone()).collect())
    }

    async fn source_ids(&self) -> Result<HashMap<String, i64>, StoreError> {
        let sources = self.sources.lock().map_err(|_| Self::poisoned())?;
        let mut ids: HashMap<String, i64> = HashMap::new();
        for source in sources.iter() {
            ids.entry(source.name.clone())
                .and_modify(|id| *id = (*id).min(source.source_id))
                .or_insert(source.source_id);
        }
        Ok(ids)
    }

    async fn max_source_id(&self) -> Result<i64, StoreError> {
        let sources = self.sources.lock().map_err(|_| Self::poisoned())?;
        Ok(sources.iter().map(|s| s.source_id).max().unwrap_or(0))
    }

    async fn append_sources(&self, rows: &[SourceRecord]) -> Result<(), StoreError> {
        let mut sources = self.sources.lock().map_err(|_| Self::poisoned())?;
        sources.extend_from_slice(rows);
        Ok(())
    }

    async fn append_articles(&self, rows: &[ArticleRecord]) -> Result<(), StoreError> {
        if self.fail_article_appends {
            return Err(StoreError::Rejected("article appends disabled".into()));
        }
        let mut articles = self.articles.lock().map_err(|_| Self::poisoned())?;
        articles.extend_from_slice(rows);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::UNKNOWN_DATE;

    fn source(id: i64, name: &str) -> SourceRecord {
        SourceRecord {
            source_id: id,
            name: name.to_string(),
            base_url: "https://example.com".to_string(),
            listing_url: "https://example.com/news".to_string(),
            logo: String::new(),
        }
    }

    fn article(title: Option<&str>, url: &str, source_id: i64) -> ArticleRecord {
        ArticleRecord {
            title: title.map(str::to_string),
            url: url.to_string(),
            text: Some("Body".to_string()),
            author: None,
            date_published: UNKNOWN_DATE,
            date_edited: UNKNOWN_DATE,
            thumbnail: String::new(),
            source_id,
        }
    }

    #[tokio::test]
    async fn test_sqlite_append_and_read_keys() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        store
            .append_sources(&[source(1, "Alpha"), source(2, "Beta")])
            .await
            .unwrap();
        store
            .append_articles(&[
                article(Some("Title A"), "https://example.com/a", 1),
                article(None, "https://example.com/b", 2),
            ])
            .await
            .unwrap();

        let names = store.existing_source_names().await.unwrap();
        assert_eq!(names, HashSet::from(["Alpha".to_string(), "Beta".to_string()]));

        let titles = store.existing_article_titles().await.unwrap();
        assert_eq!(titles, HashSet::from(["Title A".to_string()]));

        let urls = store.existing_article_urls().await.unwrap();
        assert_eq!(urls.len(), 2);

        let ids = store.source_ids().await.unwrap();
        assert_eq!(ids.get("Beta"), Some(&2));
    }

    #[tokio::test]
    async fn test_sqlite_max_source_id_counts_duplicate_rows() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        assert_eq!(store.max_source_id().await.unwrap(), 0);

        store
            .append_sources(&[source(1, "Same"), source(2, "Same")])
            .await
            .unwrap();
        let ids = store.source_ids().await.unwrap();
        assert_eq!(ids.get("Same"), Some(&1));
        assert_eq!(store.max_source_id().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_sqlite_dates_roundtrip() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        store
            .append_articles(&[article(Some("T"), "https://example.com/t", 1)])
            .await
            .unwrap();

        let stored: chrono::NaiveDateTime =
            sqlx::query_scalar("SELECT date_published FROM article")
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert_eq!(stored, UNKNOWN_DATE);
    }

    #[tokio::test]
    async fn test_sqlite_file_store_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("news.db").display());

        {
            let store = SqliteStore::connect(&url).await.unwrap();
            store.append_sources(&[source(1, "Alpha")]).await.unwrap();
            store.pool().close().await;
        }

        let store = SqliteStore::connect(&url).await.unwrap();
        let names = store.existing_source_names().await.unwrap();
        assert!(names.contains("Alpha"));
    }

    #[tokio::test]
    async fn test_open_existing_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news.db");
        let url = format!("sqlite://{}", path.display());

        assert!(SqliteStore::open_existing(&url).await.is_err());
        assert!(!path.exists());

        let store = SqliteStore::connect(&url).await.unwrap();
        store.append_sources(&[source(1, "Alpha")]).await.unwrap();
        store.pool().close().await;

        let store = SqliteStore::open_existing(&url).await.unwrap();
        let names = store.existing_source_names().await.unwrap();
        assert!(names.contains("Alpha"));
        assert!(store.append_sources(&[source(2, "Beta")]).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_store_source_ids_use_lowest() {
        let store = MemoryStore::new();
        store
            .append_sources(&[source(3, "Alpha"), source(1, "Alpha"), source(2, "Beta")])
            .await
            .unwrap();
        let ids = store.source_ids().await.unwrap();
        assert_eq!(ids.get("Alpha"), Some(&1));
        assert_eq!(ids.get("Beta"), Some(&2));
    }

    #[tokio::test]
    async fn test_memory_store_rejects_when_configured() {
        let store = MemoryStore::failing_article_appends();
        let err = store
            .append_articles(&[article(Some("T"), "https://example.com/t", 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
        assert!(store.articles().is_empty());
    }
}
