// src/relevance.rs
//! Relevance scoring for harvested playlists.
//!
//! The scorer is a pure function of the playlist detail, its track listing,
//! the seed index and the evaluation instant:
//!
//! ```text
//! score = 1.0 * |keywords| + 1.5 * |artists| + 2.0 * |tracks|
//!       + 0.5 * log10(followers + 1)
//!       + freshness_boost
//! ```
//!
//! `freshness_boost` falls linearly from 2.0 (added today) to 0 at 30 days.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::debug;

use crate::catalog::types::{PlaylistDetail, PlaylistTrackItem};
use crate::seeds::SeedIndex;

pub const KEYWORD_WEIGHT: f64 = 1.0;
pub const ARTIST_WEIGHT: f64 = 1.5;
pub const TRACK_WEIGHT: f64 = 2.0;
pub const FOLLOWER_WEIGHT: f64 = 0.5;

pub const FRESHNESS_WINDOW_DAYS: i64 = 30;
pub const FRESHNESS_MAX_BOOST: f64 = 2.0;

/// `freshness_days` when no track carries a parseable timestamp.
pub const FRESHNESS_UNKNOWN: i64 = -1;

#[derive(Debug, Clone, PartialEq)]
pub struct RelevanceResult {
    pub score: f64,
    /// Sorted, deduplicated lowercase seed phrases found in name/description.
    pub matched_keywords: Vec<String>,
    /// Sorted canonical seed artist names.
    pub matched_artists: Vec<String>,
    /// Sorted seed track names.
    pub matched_tracks: Vec<String>,
    pub freshness_days: i64,
    pub follower_boost: f64,
    pub freshness_boost: f64,
}

impl Default for RelevanceResult {
    fn default() -> Self {
        Self {
            score: 0.0,
            matched_keywords: Vec::new(),
            matched_artists: Vec::new(),
            matched_tracks: Vec::new(),
            freshness_days: FRESHNESS_UNKNOWN,
            follower_boost: 0.0,
            freshness_boost: 0.0,
        }
    }
}

impl RelevanceResult {
    pub fn match_count(&self) -> usize {
        self.matched_keywords.len() + self.matched_artists.len() + self.matched_tracks.len()
    }
}

/// Playlist description with HTML entities decoded (`&amp;` → `&`).
pub fn decoded_description(detail: &PlaylistDetail) -> String {
    html_escape::decode_html_entities(detail.description()).into_owned()
}

pub fn score_playlist(
    detail: &PlaylistDetail,
    tracks: &[PlaylistTrackItem],
    index: &SeedIndex,
    now: DateTime<Utc>,
) -> RelevanceResult {
    let text = format!("{} {}", detail.name, decoded_description(detail)).to_lowercase();
    let keywords: BTreeSet<String> = index
        .phrases_in(&text)
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut artists = BTreeSet::new();
    let mut seed_tracks = BTreeSet::new();
    let mut latest: Option<DateTime<Utc>> = None;

    for item in tracks {
        if let Some(added) = item.added_at.as_deref().and_then(parse_timestamp) {
            latest = Some(latest.map_or(added, |l| l.max(added)));
        }

        if let Some(seed) = item.track_id().and_then(|id| index.track_by_id(id)) {
            let name = if seed.name.is_empty() { &seed.id } else { &seed.name };
            seed_tracks.insert(name.clone());
        }

        let Some(track) = &item.track else { continue };
        for artist in &track.artists {
            let by_id = artist
                .id
                .as_deref()
                .filter(|id| !id.is_empty())
                .and_then(|id| index.artist_by_id(id));
            let seed = by_id.or_else(|| {
                (!artist.name.trim().is_empty())
                    .then(|| index.artist_by_name(&artist.name))
                    .flatten()
            });
            if let Some(seed) = seed {
                artists.insert(seed.name.clone());
            }
        }
    }

    let follower_boost = ((detail.follower_count() as f64) + 1.0).log10();
    let (freshness_days, freshness_boost) = match latest {
        Some(at) => {
            let days = freshness_days(at, now);
            (days, freshness_boost(days))
        }
        None => (FRESHNESS_UNKNOWN, 0.0),
    };

    let score = KEYWORD_WEIGHT * keywords.len() as f64
        + ARTIST_WEIGHT * artists.len() as f64
        + TRACK_WEIGHT * seed_tracks.len() as f64
        + FOLLOWER_WEIGHT * follower_boost
        + freshness_boost;

    RelevanceResult {
        score,
        matched_keywords: keywords.into_iter().collect(),
        matched_artists: artists.into_iter().collect(),
        matched_tracks: seed_tracks.into_iter().collect(),
        freshness_days,
        follower_boost,
        freshness_boost,
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Whole days since `at`, rounded half-up. Future timestamps count as today.
pub fn freshness_days(at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let hours = (now - at).num_seconds() as f64 / 3600.0;
    ((hours / 24.0) + 0.5).floor().max(0.0) as i64
}

pub fn freshness_boost(days: i64) -> f64 {
    if (0..FRESHNESS_WINDOW_DAYS).contains(&days) {
        ((FRESHNESS_WINDOW_DAYS - days) as f64 / FRESHNESS_WINDOW_DAYS as f64) * FRESHNESS_MAX_BOOST
    } else {
        0.0
    }
}

// Dev logging gate: RELEVANCE_DEV_LOG=1 AND dev env
// (debug build or HARVEST_ENV in {local,development,dev})
pub(crate) fn dev_logging_enabled() -> bool {
    let on = std::env::var("RELEVANCE_DEV_LOG").ok().as_deref() == Some("1");
    if !on {
        return false;
    }
    if cfg!(debug_assertions) {
        return true;
    }
    matches!(
        std::env::var("HARVEST_ENV")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str(),
        "local" | "development" | "dev"
    )
}

pub(crate) fn truncate_vec<T: ToString>(v: &[T], max: usize) -> Vec<String> {
    v.iter().take(max).map(|x| x.to_string()).collect()
}

/// Score breakdown for one decision. Never logs the description text.
pub(crate) fn dev_log_decision(
    playlist_id: &str,
    r: &RelevanceResult,
    threshold: f64,
    decision: &str,
) {
    if !dev_logging_enabled() {
        return;
    }
    debug!(
        target: "relevance",
        playlist_id,
        score = r.score,
        threshold,
        decision,
        keywords = ?truncate_vec(&r.matched_keywords, 5),
        artists = ?truncate_vec(&r.matched_artists, 5),
        tracks = ?truncate_vec(&r.matched_tracks, 5),
        freshness_days = r.freshness_days,
    );
}
