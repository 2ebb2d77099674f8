//! Page fetching with optional retries and per-host pacing.
//!
//! # Architecture
//!
//! The module uses a trait-based design so transport concerns stack without
//! the scrapers knowing about them:
//! - [`Fetch`]: core trait, `url -> page body` or a [`FetchError`]
//! - [`HttpFetcher`]: `reqwest` implementation with a request timeout
//! - [`RetryFetch`]: decorator adding exponential backoff on retryable errors
//! - [`ThrottledFetch`]: decorator spacing requests to the same host
//!
//! # Retry Strategy
//!
//! - Retries only timeouts, transport errors, HTTP 429 and 5xx
//! - Exponential backoff from a configurable base delay
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

use crate::error::FetchError;
use rand::{Rng, rng};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};
use url::Url;

/// Fetch capability: retrieve the raw document at a URL.
///
/// Implementations must report timeouts as [`FetchError::Timeout`] so callers
/// can treat them like any other failed fetch.
pub trait Fetch {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Plain HTTP GET via a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher whose requests give up after `timeout`.
    pub fn new(timeout: StdDuration, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    fn classify(url: &str, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else if let Some(status) = e.status() {
            FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else if e.is_builder() {
            FetchError::InvalidUrl {
                url: url.to_string(),
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                source: e,
            }
        }
    }
}

impl Fetch for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let t0 = Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Self::classify(url, e))?;
        let body = response.text().await.map_err(|e| Self::classify(url, e))?;
        debug!(
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched page"
        );
        Ok(body)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`Fetch`] implementation.
///
/// The delay between retries follows this formula:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryFetch<T> {
    /// The underlying fetcher to wrap.
    inner: T,
    /// Maximum number of retry attempts before giving up. Zero disables retries.
    max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    base_delay: StdDuration,
    /// Maximum delay cap to prevent excessive waiting.
    max_delay: StdDuration,
}

impl<T> RetryFetch<T>
where
    T: Fetch,
{
    /// Create a new retry wrapper around an existing [`Fetch`] implementation.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let http = HttpFetcher::new(Duration::from_secs(30), "news_ingest")?;
    /// let fetcher = RetryFetch::new(http, 3, Duration::from_millis(500));
    /// ```
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }

    fn backoff(&self, attempt: usize) -> StdDuration {
        let shift = (attempt - 1).min(16) as u32;
        let delay = self
            .base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + StdDuration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> Fetch for RetryFetch<T>
where
    T: Fetch,
{
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.fetch(url).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    attempt += 1;
                    let total_dt = total_t0.elapsed();

                    if !e.is_retryable() || attempt > self.max_retries {
                        if self.max_retries > 0 && e.is_retryable() {
                            error!(
                                attempt,
                                max = self.max_retries,
                                elapsed_ms_total = total_dt.as_millis() as u64,
                                error = %e,
                                "fetch exhausted retries"
                            );
                        }
                        return Err(e);
                    }

                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Wrapper that keeps at least `interval` between request starts to one host.
pub struct ThrottledFetch<T> {
    inner: T,
    interval: StdDuration,
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl<T> ThrottledFetch<T>
where
    T: Fetch,
{
    pub fn new(inner: T, interval: StdDuration) -> Self {
        Self {
            inner,
            interval,
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    /// Reserve the next free slot for `host` and return when it starts.
    async fn reserve(&self, host: &str) -> Instant {
        let mut slots = self.next_slot.lock().await;
        let now = Instant::now();
        let start = match slots.get(host) {
            Some(next) if *next > now => *next,
            _ => now,
        };
        slots.insert(host.to_string(), start + self.interval);
        start
    }
}

impl<T> fmt::Debug for ThrottledFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottledFetch")
            .field("interval", &self.interval)
            .finish()
    }
}

impl<T> Fetch for ThrottledFetch<T>
where
    T: Fetch,
{
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        if self.interval.is_zero() {
            return self.inner.fetch(url).await;
        }

        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .ok_or_else(|| FetchError::InvalidUrl {
                url: url.to_string(),
            })?;

        let start = self.reserve(&host).await;
        let wait = start.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            debug!(%host, ?wait, "Pacing request to host");
            sleep(wait).await;
        }
        self.inner.fetch(url).await
    }
}
