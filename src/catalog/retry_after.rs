// src/catalog/retry_after.rs
//! Retry hints on 429 responses.
//!
//! Accepted forms, in order of precedence:
//! - `Retry-After-Ms: 1500` (milliseconds)
//! - `Retry-After: 3` or `Retry-After: 1.5` (seconds)
//! - `Retry-After: Wed, 21 Oct 2015 07:28:00 GMT` (HTTP-date)

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use std::time::Duration;

pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(2);

const RETRY_AFTER: &str = "retry-after";
const RETRY_AFTER_MS: &str = "retry-after-ms";

/// Wait requested by the server, or [`DEFAULT_RETRY_AFTER`] when absent or unparseable.
pub fn retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Duration {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(ms) = header(RETRY_AFTER_MS).and_then(parse_millis) {
        return ms;
    }
    header(RETRY_AFTER)
        .and_then(|v| parse_seconds(v).or_else(|| parse_http_date(v, now)))
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

fn parse_millis(v: &str) -> Option<Duration> {
    let ms: f64 = v.parse().ok()?;
    if ms < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(ms / 1000.0).ok()
}

fn parse_seconds(v: &str) -> Option<Duration> {
    let secs: f64 = v.parse().ok()?;
    if secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}

/// Dates in the past mean "retry now".
fn parse_http_date(v: &str, now: DateTime<Utc>) -> Option<Duration> {
    let at = DateTime::parse_from_rfc2822(v).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
