// src/seeds/index.rs
//! Read-only lookup view over a [`SeedSet`], built once per run.

use std::collections::{BTreeSet, HashMap};

use super::{normalize_term, ArtistSeed, SeedSet, TrackSeed};

#[derive(Debug, Clone, Default)]
pub struct SeedIndex {
    /// Lowercase phrases matched as substrings of playlist text.
    phrases: BTreeSet<String>,
    artists: Vec<ArtistSeed>,
    /// Lowercase canonical names and aliases → position in `artists`.
    artist_by_name: HashMap<String, usize>,
    artist_by_id: HashMap<String, usize>,
    track_by_id: HashMap<String, TrackSeed>,
}

impl SeedIndex {
    pub fn build(seeds: &SeedSet) -> Self {
        let phrases = seeds
            .keywords
            .iter()
            .chain(&seeds.genres)
            .chain(&seeds.moods)
            .chain(&seeds.meta)
            .chain(&seeds.locales)
            .map(|s| normalize_term(s))
            .filter(|s| !s.is_empty())
            .collect();

        let artists = seeds.artists.clone();
        let mut artist_by_name = HashMap::new();
        let mut artist_by_id = HashMap::new();

        // Canonical names first so an alias never shadows another artist's name.
        for (pos, artist) in artists.iter().enumerate() {
            artist_by_name
                .entry(normalize_term(&artist.name))
                .or_insert(pos);
            if let Some(id) = artist.id.as_deref().filter(|s| !s.is_empty()) {
                artist_by_id.entry(id.to_string()).or_insert(pos);
            }
        }
        for (pos, artist) in artists.iter().enumerate() {
            for alias in &artist.aliases {
                let key = normalize_term(alias);
                if !key.is_empty() {
                    artist_by_name.entry(key).or_insert(pos);
                }
            }
        }

        let track_by_id = seeds
            .tracks
            .iter()
            .filter(|t| !t.id.is_empty())
            .map(|t| (t.id.clone(), t.clone()))
            .collect();

        Self {
            phrases,
            artists,
            artist_by_name,
            artist_by_id,
            track_by_id,
        }
    }

    pub fn phrases(&self) -> impl Iterator<Item = &str> {
        self.phrases.iter().map(String::as_str)
    }

    /// Seed phrases contained in `text_lower` (which must already be lowercase).
    pub fn phrases_in<'a>(&'a self, text_lower: &str) -> Vec<&'a str> {
        self.phrases
            .iter()
            .filter(|p| text_lower.contains(p.as_str()))
            .map(String::as_str)
            .collect()
    }

    pub fn artist_by_id(&self, id: &str) -> Option<&ArtistSeed> {
        self.artist_by_id.get(id).map(|&pos| &self.artists[pos])
    }

    /// Case-insensitive lookup over canonical names and aliases.
    pub fn artist_by_name(&self, name: &str) -> Option<&ArtistSeed> {
        self.artist_by_name
            .get(&normalize_term(name))
            .map(|&pos| &self.artists[pos])
    }

    pub fn track_by_id(&self, id: &str) -> Option<&TrackSeed> {
        self.track_by_id.get(id)
    }

    pub fn phrase_count(&self) -> usize {
        self.phrases.len()
    }

    pub fn artist_count(&self) -> usize {
        self.artists.len()
    }

    pub fn track_count(&self) -> usize {
        self.track_by_id.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> SeedIndex {
        let seeds = SeedSet {
            keywords: vec!["workout".into()],
            genres: vec!["hip hop".into()],
            artists: vec![
                ArtistSeed::new("Drake").with_id("drake-id").with_aliases(["Drizzy"]),
                ArtistSeed::new("Future").with_aliases(["drake"]),
            ],
            tracks: vec![TrackSeed::new("t1", "God's Plan")],
            ..SeedSet::default()
        }
        .normalized();
        SeedIndex::build(&seeds)
    }

    #[test]
    fn lookups_are_case_insensitive_and_alias_aware() {
        let idx = index();
        assert_eq!(idx.artist_by_name("DRIZZY").unwrap().name, "Drake");
        assert_eq!(idx.artist_by_id("drake-id").unwrap().name, "Drake");
        assert!(idx.artist_by_id("nope").is_none());
        assert_eq!(idx.track_by_id("t1").unwrap().name, "God's Plan");
    }

    #[test]
    fn alias_never_shadows_a_canonical_name() {
        let idx = index();
        assert_eq!(idx.artist_by_name("drake").unwrap().name, "Drake");
    }

    #[test]
    fn phrases_match_as_substrings() {
        let idx = index();
        let hits = idx.phrases_in("best hip hop workouts 2024");
        assert_eq!(hits, vec!["hip hop", "workout"]);
        assert_eq!(idx.phrase_count(), 2);
    }
}
