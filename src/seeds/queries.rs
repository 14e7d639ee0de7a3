// src/seeds/queries.rs
//! Expansion of the seed vocabulary into an ordered list of search queries.
//!
//! Order is significant: broad single terms come first, combinatorial pairs
//! later, so an interrupted or capped crawl has already covered the cheap,
//! high-yield queries.

use serde::Serialize;
use std::collections::HashSet;

use super::SeedSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedQuery {
    pub text: String,
    /// How the query was derived, e.g. `"mood+genre"` or `"artist-alias+hits"`.
    pub provenance: &'static str,
}

#[derive(Default)]
struct QueryList {
    seen: HashSet<String>,
    out: Vec<SeedQuery>,
}

impl QueryList {
    fn push(&mut self, text: &str, provenance: &'static str) {
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            return;
        }
        if self.seen.insert(text.to_lowercase()) {
            self.out.push(SeedQuery { text, provenance });
        }
    }

    fn push_all(&mut self, items: &[String], provenance: &'static str) {
        for it in items {
            self.push(it, provenance);
        }
    }

    fn push_pairs(&mut self, left: &[String], right: &[String], provenance: &'static str) {
        for l in left {
            for r in right {
                if l.trim().is_empty() || r.trim().is_empty() {
                    continue;
                }
                self.push(&format!("{l} {r}"), provenance);
            }
        }
    }
}

/// Generate the deduplicated, ordered query list for `seeds`.
pub fn generate_queries(seeds: &SeedSet) -> Vec<SeedQuery> {
    let mut q = QueryList::default();

    q.push_all(&seeds.keywords, "keyword");
    q.push_all(&seeds.genres, "genre");
    q.push_all(&seeds.moods, "mood");
    q.push_all(&seeds.locales, "locale");
    q.push_all(&seeds.meta, "meta");

    q.push_pairs(&seeds.moods, &seeds.genres, "mood+genre");
    q.push_pairs(&seeds.locales, &seeds.genres, "locale+genre");
    q.push_pairs(&seeds.meta, &seeds.genres, "meta+genre");

    for artist in &seeds.artists {
        if artist.name.trim().is_empty() {
            continue;
        }
        q.push(&artist.name, "artist");
        q.push(&format!("{} best", artist.name), "artist+best");
        q.push(&format!("{} hits", artist.name), "artist+hits");
        for alias in &artist.aliases {
            if alias.trim().is_empty() {
                continue;
            }
            q.push(&format!("{alias} best"), "artist-alias+best");
            q.push(&format!("{alias} hits"), "artist-alias+hits");
        }
    }

    for track in &seeds.tracks {
        if track.name.trim().is_empty() {
            continue;
        }
        q.push(&track.name, "track");
        q.push(&format!("{} playlist", track.name), "track+playlist");
    }

    q.out
}
