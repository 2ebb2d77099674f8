//! Error taxonomy for the ingestion pipeline.
//!
//! Failures are split by how far they are allowed to travel:
//!
//! | Error | Scope | Effect |
//! |-------|-------|--------|
//! | [`IngestError::ListingFetch`] | one source | source yields no articles and an empty logo |
//! | [`IngestError::ArticleFetch`] | one article | article kept with only `url` and `source_id` |
//! | [`IngestError::ConfigSchema`] | one source | source skipped before any fetch |
//! | [`IngestError::Persistence`] | whole run | returned to the caller |
//!
//! A selector that matches nothing is not an error at all; it resolves to an
//! absent field in [`crate::extract`].

use thiserror::Error;

/// Failure of the fetch capability for a single URL.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("not a fetchable URL: {url}")]
    InvalidUrl { url: String },
}

impl FetchError {
    /// Whether another attempt at the same URL could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::InvalidUrl { .. } => false,
        }
    }
}

/// Failure to load or validate the source configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("source configuration must be a list of sources")]
    NotAList,

    #[error("source #{index} ({name}) is invalid: {reason}")]
    Schema {
        index: usize,
        name: String,
        reason: String,
    },
}

/// Failure of the persistence capability.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("write rejected: {0}")]
    Rejected(String),
}

/// Pipeline-level errors, one variant per failure class.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("listing page for source {source_name} unavailable: {cause}")]
    ListingFetch {
        source_name: String,
        #[source]
        cause: FetchError,
    },

    #[error("article {url} unavailable: {cause}")]
    ArticleFetch {
        url: String,
        #[source]
        cause: FetchError,
    },

    #[error(transparent)]
    ConfigSchema(#[from] ConfigError),

    #[error("persisting {stage} failed after {sources_written} source rows were written: {cause}")]
    Persistence {
        stage: &'static str,
        sources_written: usize,
        #[source]
        cause: StoreError,
    },
}
