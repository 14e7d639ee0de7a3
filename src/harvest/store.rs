// src/harvest/store.rs
//! Append-only CSV sinks for persisted playlists and their tracks.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::HarvestOrigin;
use crate::catalog::types::{PlaylistDetail, PlaylistTrackItem};
use crate::relevance::{decoded_description, RelevanceResult};

pub const DEFAULT_PLAYLISTS_CSV: &str = "data/playlists.csv";
pub const DEFAULT_TRACKS_CSV: &str = "data/tracks.csv";

pub const PLAYLIST_HEADER: [&str; 21] = [
    "playlist_id",
    "name",
    "description",
    "owner_id",
    "owner_name",
    "public",
    "collaborative",
    "followers",
    "snapshot_id",
    "image_url",
    "track_count",
    "score",
    "matched_keywords",
    "matched_artists",
    "matched_tracks",
    "freshness_days",
    "follower_boost",
    "freshness_boost",
    "source",
    "origin",
    "harvested_at",
];

pub const TRACK_HEADER: [&str; 14] = [
    "playlist_id",
    "position",
    "track_id",
    "track_name",
    "track_uri",
    "track_url",
    "artist_ids",
    "artist_names",
    "album_id",
    "album_name",
    "added_at",
    "added_by",
    "source",
    "origin",
];

const LIST_SEPARATOR: &str = "|";

/// Replace every line break (`\r\n`, `\r`, `\n`) with one space, then trim.
pub fn sanitize_field(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push(' ');
            }
            '\n' => out.push(' '),
            c => out.push(c),
        }
    }
    out.trim().to_string()
}

/// One CSV file opened for appending. Writes are serialized and flushed per record.
pub struct CsvSink {
    path: PathBuf,
    writer: Mutex<csv::Writer<File>>,
}

impl CsvSink {
    /// Open (or create) `path`; the header row is written only to an empty file.
    pub fn open(path: impl Into<PathBuf>, header: &[&str]) -> Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        let fresh = file.metadata().map(|m| m.len() == 0).unwrap_or(true);

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if fresh {
            writer.write_record(header)?;
            writer.flush()?;
        }
        Ok(Self {
            path,
            writer: Mutex::new(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, fields: &[String]) -> Result<()> {
        let mut w = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        w.write_record(fields.iter().map(|f| sanitize_field(f)))
            .with_context(|| format!("writing row to {}", self.path.display()))?;
        w.flush()
            .with_context(|| format!("flushing {}", self.path.display()))?;
        Ok(())
    }
}

/// Flattened playlist row.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistRecord {
    pub playlist_id: String,
    pub name: String,
    pub description: String,
    pub owner_id: String,
    pub owner_name: String,
    pub public: Option<bool>,
    pub collaborative: bool,
    pub followers: u64,
    pub snapshot_id: String,
    pub image_url: String,
    pub track_count: u32,
    pub relevance: RelevanceResult,
    pub origin: HarvestOrigin,
    pub harvested_at: DateTime<Utc>,
}

impl PlaylistRecord {
    pub fn new(
        detail: &PlaylistDetail,
        relevance: RelevanceResult,
        origin: &HarvestOrigin,
        harvested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            playlist_id: detail.id.clone(),
            name: detail.name.clone(),
            description: decoded_description(detail),
            owner_id: detail.owner.id.clone(),
            owner_name: detail.owner.display_name.clone().unwrap_or_default(),
            public: detail.public,
            collaborative: detail.collaborative,
            followers: detail.follower_count(),
            snapshot_id: detail.snapshot_id.clone(),
            image_url: detail.image_url().unwrap_or_default().to_string(),
            track_count: detail.tracks.total,
            relevance,
            origin: origin.clone(),
            harvested_at,
        }
    }

    pub fn to_fields(&self) -> Vec<String> {
        let r = &self.relevance;
        vec![
            self.playlist_id.clone(),
            self.name.clone(),
            self.description.clone(),
            self.owner_id.clone(),
            self.owner_name.clone(),
            self.public.map(|p| p.to_string()).unwrap_or_default(),
            self.collaborative.to_string(),
            self.followers.to_string(),
            self.snapshot_id.clone(),
            self.image_url.clone(),
            self.track_count.to_string(),
            format!("{:.4}", r.score),
            r.matched_keywords.join(LIST_SEPARATOR),
            r.matched_artists.join(LIST_SEPARATOR),
            r.matched_tracks.join(LIST_SEPARATOR),
            r.freshness_days.to_string(),
            format!("{:.4}", r.follower_boost),
            format!("{:.4}", r.freshness_boost),
            self.origin.source.to_string(),
            self.origin.origin.clone(),
            self.harvested_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        ]
    }
}

/// Track row; `None` for items that carry no catalog track id.
pub fn track_fields(
    playlist_id: &str,
    position: usize,
    item: &PlaylistTrackItem,
    origin: &HarvestOrigin,
) -> Option<Vec<String>> {
    let track_id = item.track_id()?;
    let track = item.track.as_ref()?;
    let artist_ids: Vec<&str> = track
        .artists
        .iter()
        .map(|a| a.id.as_deref().unwrap_or_default())
        .collect();
    let artist_names: Vec<&str> = track.artists.iter().map(|a| a.name.as_str()).collect();
    let album = track.album.as_ref();

    Some(vec![
        playlist_id.to_string(),
        position.to_string(),
        track_id.to_string(),
        track.name.clone(),
        track.uri.clone(),
        track.external_urls.spotify.clone().unwrap_or_default(),
        artist_ids.join(LIST_SEPARATOR),
        artist_names.join(LIST_SEPARATOR),
        album.and_then(|a| a.id.clone()).unwrap_or_default(),
        album.map(|a| a.name.clone()).unwrap_or_default(),
        item.added_at.clone().unwrap_or_default(),
        item.added_by.as_ref().map(|u| u.id.clone()).unwrap_or_default(),
        origin.source.to_string(),
        origin.origin.clone(),
    ])
}

pub struct PlaylistStore {
    sink: CsvSink,
}

impl PlaylistStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            sink: CsvSink::open(path, &PLAYLIST_HEADER)?,
        })
    }

    pub fn append(&self, record: &PlaylistRecord) -> Result<()> {
        self.sink.append(&record.to_fields())
    }

    pub fn path(&self) -> &Path {
        self.sink.path()
    }
}

pub struct TrackStore {
    sink: CsvSink,
}

impl TrackStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            sink: CsvSink::open(path, &TRACK_HEADER)?,
        })
    }

    /// Append every item with a track id; returns the number of rows written.
    /// Stops at the first write failure.
    pub fn append_all(
        &self,
        playlist_id: &str,
        items: &[PlaylistTrackItem],
        origin: &HarvestOrigin,
    ) -> Result<usize> {
        let mut written = 0;
        for (position, item) in items.iter().enumerate() {
            if let Some(fields) = track_fields(playlist_id, position, item, origin) {
                self.sink.append(&fields)?;
                written += 1;
            }
        }
        Ok(written)
    }

    pub fn path(&self) -> &Path {
        self.sink.path()
    }
}
