//! Normalization of extracted articles.
//!
//! Date fields arrive as free text in whatever format the source prints.
//! [`parse_date`] makes a best-effort attempt across common formats; anything
//! it cannot read becomes [`UNKNOWN_DATE`] so storage never sees a null date.

use crate::models::{ArticleRecord, RawArticle};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::debug;

/// Sentinel stored for a missing or unparseable date: `1900-01-01T00:00:00`.
pub const UNKNOWN_DATE: NaiveDateTime = match NaiveDate::from_ymd_opt(1900, 1, 1) {
    Some(date) => date.and_time(NaiveTime::MIN),
    None => panic!("1900-01-01 is a valid date"),
};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%MZ",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
    "%B %d, %Y %I:%M %p",
    "%B %d, %Y %H:%M",
    "%b %d, %Y %I:%M %p",
    "%b %d, %Y %H:%M",
    "%d %B %Y %H:%M",
    "%d %b %Y %H:%M",
];

const DATETIME_TZ_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%:z",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%b %d, %Y",
    "%b %d %Y",
    "%b. %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%A, %B %d, %Y",
    "%a, %b %d, %Y",
];

const PREFIXES: &[&str] = &["updated", "published", "posted", "modified", "on"];

/// Strip a leading label such as `Updated:` or `Published on`.
fn strip_prefixes(mut s: &str) -> &str {
    loop {
        let trimmed = s.trim_start_matches(|c: char| c.is_whitespace() || c == ':');
        let lower = trimmed.to_ascii_lowercase();
        let Some(prefix) = PREFIXES.iter().find(|p| {
            lower.starts_with(*p)
                && trimmed[p.len()..]
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_whitespace() || c == ':')
        }) else {
            return trimmed;
        };
        s = &trimmed[prefix.len()..];
    }
}

/// Collapse runs of whitespace and strip a leading label.
fn clean(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    strip_prefixes(&collapsed).trim().to_string()
}

/// Drop a trailing `UTC`/`GMT` zone name, which the strftime formats cannot read.
fn strip_zone_label(s: &str) -> Option<&str> {
    s.strip_suffix(" UTC").or_else(|| s.strip_suffix(" GMT"))
}

/// RFC 3339 or RFC 2822, with `UTC`/`GMT` read as `+0000`.
fn parse_internet_date(s: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_rfc2822(s))
        .ok()
        .or_else(|| {
            let bare = strip_zone_label(s)?;
            DateTime::parse_from_rfc2822(&format!("{bare} +0000")).ok()
        })
        .map(|dt| dt.naive_utc())
}

/// Parse a date/time string in any supported format.
///
/// Offsets are converted to UTC. Returns `None` when no format fits, and also
/// when the parsed value equals [`UNKNOWN_DATE`], so the sentinel only ever
/// means "unknown".
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let cleaned = clean(raw);
    if cleaned.is_empty() {
        return None;
    }
    let s = strip_zone_label(&cleaned).unwrap_or(&cleaned);

    let parsed = parse_internet_date(&cleaned)
        .or_else(|| {
            DATETIME_TZ_FORMATS
                .iter()
                .find_map(|f| DateTime::parse_from_str(s, f).ok())
                .map(|dt| dt.naive_utc())
        })
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        })
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        });

    match parsed {
        Some(dt) if dt == UNKNOWN_DATE => {
            debug!(raw, "Parsed date collides with the unknown-date sentinel; dropping");
            None
        }
        other => other,
    }
}

/// Parse an optional date field, substituting [`UNKNOWN_DATE`].
pub fn normalize_date(raw: Option<&str>) -> NaiveDateTime {
    match raw {
        Some(text) => parse_date(text).unwrap_or_else(|| {
            debug!(raw = text, "Unparseable date; using sentinel");
            UNKNOWN_DATE
        }),
        None => UNKNOWN_DATE,
    }
}

/// Build the normalized record for `raw`. The input is left untouched.
pub fn normalize(raw: &RawArticle) -> ArticleRecord {
    ArticleRecord {
        title: raw.title.clone(),
        url: raw.url.clone(),
        text: raw.text.clone(),
        author: raw.author.clone(),
        date_published: normalize_date(raw.date_published.as_deref()),
        date_edited: normalize_date(raw.date_edited.as_deref()),
        thumbnail: raw.thumbnail.clone(),
        source_id: raw.source_id,
    }
}
