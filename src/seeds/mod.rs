// src/seeds/mod.rs
//! Seed vocabulary: the terms, artists and tracks that drive query generation
//! and relevance matching. Built once at startup from the compiled-in defaults
//! merged with an optional user override.

pub mod config;
pub mod index;
pub mod queries;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub use index::SeedIndex;
pub use queries::{generate_queries, SeedQuery};

const DEFAULT_SEEDS_TOML: &str = include_str!("../../config/default_seeds.toml");

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistSeed {
    /// Canonical display name, reported in artist matches.
    pub name: String,
    /// Catalog artist id. Preferred identity when present.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Catalog ids of the artist's best-known tracks. Carried through merges,
    /// not used for scoring.
    #[serde(default)]
    pub top_tracks: Vec<String>,
}

impl ArtistSeed {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    fn external_id(&self) -> Option<&str> {
        self.id.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Same artist if both carry the same external id. Names are compared
    /// case-insensitively only when at least one side has no id.
    fn same_identity(&self, other: &ArtistSeed) -> bool {
        match (self.external_id(), other.external_id()) {
            (Some(a), Some(b)) => a == b,
            _ => normalize_term(&self.name) == normalize_term(&other.name),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSeed {
    pub id: String,
    pub name: String,
}

impl TrackSeed {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// The configured seed vocabulary.
///
/// Term lists hold lowercase, whitespace-collapsed strings with no duplicates;
/// list order is preserved because it decides crawl priority.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedSet {
    pub keywords: Vec<String>,
    pub genres: Vec<String>,
    pub moods: Vec<String>,
    pub meta: Vec<String>,
    pub locales: Vec<String>,
    pub artists: Vec<ArtistSeed>,
    pub tracks: Vec<TrackSeed>,
}

impl SeedSet {
    /// The compiled-in default vocabulary (`config/default_seeds.toml`).
    pub fn builtin() -> Result<Self> {
        let set: SeedSet =
            toml::from_str(DEFAULT_SEEDS_TOML).context("parsing built-in seed defaults")?;
        Ok(set.normalized())
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
            && self.genres.is_empty()
            && self.moods.is_empty()
            && self.meta.is_empty()
            && self.locales.is_empty()
            && self.artists.is_empty()
            && self.tracks.is_empty()
    }

    /// Enforce the list invariants: trimmed, lowercase terms, no two entries
    /// with the same normalized form, first occurrence wins.
    pub fn normalized(self) -> Self {
        let mut artists: Vec<ArtistSeed> = Vec::with_capacity(self.artists.len());
        for artist in self.artists {
            let Some(artist) = tidy_artist(artist) else {
                continue;
            };
            match artists.iter_mut().find(|a| a.same_identity(&artist)) {
                Some(existing) => {
                    if existing.external_id().is_none() {
                        existing.id = artist.id.clone();
                    }
                    existing.aliases.extend(artist.aliases);
                    existing.aliases = dedup_display(std::mem::take(&mut existing.aliases));
                    existing.top_tracks.extend(artist.top_tracks);
                    existing.top_tracks = dedup_ids(std::mem::take(&mut existing.top_tracks));
                }
                None => artists.push(artist),
            }
        }

        let mut seen_tracks = HashSet::new();
        let tracks = self
            .tracks
            .into_iter()
            .filter_map(|t| {
                let id = t.id.trim().to_string();
                if id.is_empty() || !seen_tracks.insert(id.clone()) {
                    return None;
                }
                Some(TrackSeed {
                    id,
                    name: tidy(&t.name),
                })
            })
            .collect();

        Self {
            keywords: normalize_terms(self.keywords),
            genres: normalize_terms(self.genres),
            moods: normalize_terms(self.moods),
            meta: normalize_terms(self.meta),
            locales: normalize_terms(self.locales),
            artists,
            tracks,
        }
    }

    /// Merge `overlay` on top of `self`.
    ///
    /// Term lists are unioned (base order first). Artists are matched by external
    /// id, or lowercase name when an id is absent; on a match the overlay's name
    /// wins and alias / top-track lists are unioned. An alias or top track the
    /// overlay assigns to one artist is removed from every other artist.
    /// Tracks are matched by id and the overlay's name wins.
    pub fn merge(&self, overlay: &SeedSet) -> SeedSet {
        let base = self.clone().normalized();
        let overlay = overlay.clone().normalized();

        let mut artists = base.artists;
        let mut claimed: Vec<(usize, Vec<String>, Vec<String>)> = Vec::new();
        for over in overlay.artists {
            let aliases: Vec<String> = over.aliases.iter().map(|a| a.to_lowercase()).collect();
            let top_tracks = over.top_tracks.clone();
            let slot = match artists.iter().position(|a| a.same_identity(&over)) {
                Some(i) => {
                    let existing = &mut artists[i];
                    let has_id = over.external_id().is_some();
                    existing.name = over.name;
                    if has_id {
                        existing.id = over.id;
                    }
                    existing.aliases =
                        dedup_display(concat(std::mem::take(&mut existing.aliases), over.aliases));
                    existing.top_tracks = dedup_ids(concat(
                        std::mem::take(&mut existing.top_tracks),
                        over.top_tracks,
                    ));
                    i
                }
                None => {
                    artists.push(over);
                    artists.len() - 1
                }
            };
            claimed.push((slot, aliases, top_tracks));
        }
        for (owner, aliases, top_tracks) in &claimed {
            for (i, artist) in artists.iter_mut().enumerate() {
                if i == *owner {
                    continue;
                }
                artist.aliases.retain(|a| !aliases.contains(&a.to_lowercase()));
                artist.top_tracks.retain(|t| !top_tracks.contains(t));
            }
        }

        let mut tracks = base.tracks;
        for over in overlay.tracks {
            match tracks.iter_mut().find(|t| t.id == over.id) {
                Some(existing) => {
                    if !over.name.is_empty() {
                        existing.name = over.name;
                    }
                }
                None => tracks.push(over),
            }
        }

        SeedSet {
            keywords: concat(base.keywords, overlay.keywords),
            genres: concat(base.genres, overlay.genres),
            moods: concat(base.moods, overlay.moods),
            meta: concat(base.meta, overlay.meta),
            locales: concat(base.locales, overlay.locales),
            artists,
            tracks,
        }
        .normalized()
    }
}

/// Lowercase, trim and collapse inner whitespace.
pub fn normalize_term(s: &str) -> String {
    tidy(s).to_lowercase()
}

/// Trim and collapse inner whitespace, keeping case.
fn tidy(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_terms(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .map(|s| normalize_term(&s))
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}

/// Dedup case-insensitively while keeping the first spelling.
fn dedup_display(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .map(|s| tidy(&s))
        .filter(|s| !s.is_empty() && seen.insert(s.to_lowercase()))
        .collect()
}

fn dedup_ids(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}

fn tidy_artist(artist: ArtistSeed) -> Option<ArtistSeed> {
    let name = tidy(&artist.name);
    if name.is_empty() {
        return None;
    }
    let canonical = name.to_lowercase();
    let aliases = dedup_display(artist.aliases)
        .into_iter()
        .filter(|a| a.to_lowercase() != canonical)
        .collect();
    Some(ArtistSeed {
        name,
        id: artist
            .id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        aliases,
        top_tracks: dedup_ids(artist.top_tracks),
    })
}

fn concat(mut a: Vec<String>, b: Vec<String>) -> Vec<String> {
    a.extend(b);
    a
}
