//! Source descriptors and the selector schema.
//!
//! Each source is described purely by data: where its listing page lives and
//! which CSS selectors locate article entries on it and fields on each
//! article page. The file is a list of sources in JSON or YAML:
//!
//! ```json
//! [
//!   {
//!     "name": "Example Times",
//!     "base_url": "https://example.com",
//!     "listing_url": "https://example.com/news",
//!     "listing_selectors": { "container": "article.card", "link": "a", "thumbnail": "img" },
//!     "article_selectors": {
//!       "title": "h1", "content": ".body", "author": ".byline",
//!       "date_published": "time.published", "date_edited": "time.updated",
//!       "thumbnail": "figure img"
//!     }
//!   }
//! ]
//! ```
//!
//! The older key names `articles_url`, `source_selectors` and
//! `article_container` are accepted as aliases.
//!
//! Sources are validated one at a time, so a broken entry only takes itself
//! out of the run.

use crate::error::ConfigError;
use scraper::Selector;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::{info, instrument, warn};
use url::Url;

/// One configured source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub base_url: String,
    #[serde(alias = "articles_url")]
    pub listing_url: String,
    #[serde(alias = "source_selectors")]
    pub listing_selectors: ListingSelectors,
    pub article_selectors: ArticleSelectors,
}

/// Selectors applied to the listing page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ListingSelectors {
    /// Matches every entry on the listing page.
    #[serde(alias = "article_container")]
    pub container: String,
    /// Matches the link element inside one entry.
    pub link: String,
    /// Matches a thumbnail image inside one entry.
    #[serde(default)]
    pub thumbnail: Option<String>,
}

/// Selectors applied to an article page. All are required.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ArticleSelectors {
    pub title: String,
    pub content: String,
    pub author: String,
    pub date_published: String,
    pub date_edited: String,
    pub thumbnail: String,
}

/// Top-level keys a source entry may carry, legacy aliases included.
const KNOWN_KEYS: &[&str] = &[
    "name",
    "base_url",
    "listing_url",
    "articles_url",
    "listing_selectors",
    "source_selectors",
    "article_selectors",
];

impl SourceDescriptor {
    /// Build a descriptor from one untyped config entry.
    ///
    /// `index` is the entry's position in the file and only feeds the error.
    pub fn from_value(index: usize, value: Value) -> Result<Self, ConfigError> {
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("<unnamed>")
            .to_string();

        if let Some(entry) = value.as_object() {
            for key in entry.keys().filter(|k| !KNOWN_KEYS.contains(&k.as_str())) {
                warn!(index, %name, %key, "Ignoring unknown source key");
            }
        }

        let descriptor: SourceDescriptor =
            serde_json::from_value(value).map_err(|e| ConfigError::Schema {
                index,
                name: name.clone(),
                reason: e.to_string(),
            })?;

        descriptor
            .validate()
            .map_err(|reason| ConfigError::Schema {
                index,
                name,
                reason,
            })?;
        Ok(descriptor)
    }

    /// Check URLs and selector syntax.
    fn validate(&self) -> Result<(), String> {
        for (field, value) in [("base_url", &self.base_url), ("listing_url", &self.listing_url)] {
            Url::parse(value).map_err(|e| format!("{field} `{value}` is not an absolute URL: {e}"))?;
        }

        for (field, selector) in self.selectors() {
            Selector::parse(selector)
                .map_err(|e| format!("selector {field} `{selector}` does not parse: {e}"))?;
        }
        Ok(())
    }

    /// Every selector in the descriptor, labelled by its config key.
    fn selectors(&self) -> Vec<(&'static str, &str)> {
        let l = &self.listing_selectors;
        let a = &self.article_selectors;
        let mut all = vec![
            ("listing_selectors.container", l.container.as_str()),
            ("listing_selectors.link", l.link.as_str()),
            ("article_selectors.title", a.title.as_str()),
            ("article_selectors.content", a.content.as_str()),
            ("article_selectors.author", a.author.as_str()),
            ("article_selectors.date_published", a.date_published.as_str()),
            ("article_selectors.date_edited", a.date_edited.as_str()),
            ("article_selectors.thumbnail", a.thumbnail.as_str()),
        ];
        if let Some(thumbnail) = l.thumbnail.as_deref() {
            all.push(("listing_selectors.thumbnail", thumbnail));
        }
        all
    }
}

/// Parse a source list from text; YAML when `yaml` is set, JSON otherwise.
///
/// The outer error covers the file as a whole. Each inner result is one
/// source, in file order.
pub fn parse_sources(
    text: &str,
    yaml: bool,
) -> Result<Vec<Result<SourceDescriptor, ConfigError>>, ConfigError> {
    let root: Value = if yaml {
        serde_yaml::from_str(text)?
    } else {
        serde_json::from_str(text)?
    };

    let Value::Array(entries) = root else {
        return Err(ConfigError::NotAList);
    };

    Ok(entries
        .into_iter()
        .enumerate()
        .map(|(index, value)| SourceDescriptor::from_value(index, value))
        .collect())
}

/// Read and parse a source file. `.yaml`/`.yml` files are read as YAML.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_sources(
    path: &Path,
) -> Result<Vec<Result<SourceDescriptor, ConfigError>>, ConfigError> {
    let yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let text = tokio::fs::read_to_string(path).await?;
    let sources = parse_sources(&text, yaml)?;
    info!(count = sources.len(), yaml, "Loaded source configuration");
    Ok(sources)
}
