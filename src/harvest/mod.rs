// src/harvest/mod.rs
//! Harvest orchestrator: discovery passes, per-playlist processing, and the
//! run report.
//!
//! Each pass turns a discovery source into playlist ids; every id goes through
//! [`Harvester::process_playlist`]:
//!
//! 1. skip ids already seen in this run (first pass wins provenance)
//! 2. fetch detail
//! 3. skip when the snapshot token is unchanged (no track fetch, no scoring)
//! 4. fetch tracks, score, record the token
//! 5. persist when the score reaches the threshold
//!
//! Item errors are collected per pass and logged as one joined message; only
//! fatal catalog errors (auth, cancellation, connection) stop the run.

pub mod paging;
pub mod snapshot;
pub mod store;

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::counter;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::{
    CatalogApi, CatalogError, PlaylistRef, BROWSE_PAGE_SIZE, SEARCH_PAGE_SIZE,
};
use crate::relevance::{dev_log_decision, score_playlist};
use crate::seeds::{generate_queries, SeedIndex, SeedQuery, SeedSet};

use paging::{
    CategoryListPages, CategoryPlaylistPages, FeaturedPages, PagedFetch, Pager, SearchPages,
    UserPlaylistPages,
};
pub use snapshot::SnapshotCache;
pub use store::{PlaylistRecord, PlaylistStore, TrackStore};

pub const SOURCE_SEARCH: &str = "search";
pub const SOURCE_FEATURED: &str = "featured";
pub const SOURCE_CATEGORY: &str = "category";
pub const SOURCE_USER: &str = "user";

pub const DEFAULT_THRESHOLD: f64 = 2.0;
pub const DEFAULT_MAX_SEARCH_PAGES: u32 = 20;
pub const DEFAULT_MAX_BROWSE_PAGES: u32 = 10;

/// Provenance attached to every persisted row. Not used for scoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestOrigin {
    pub source: &'static str,
    /// Query text, category id, or user id that surfaced the playlist.
    pub origin: String,
}

impl HarvestOrigin {
    pub fn new(source: &'static str, origin: impl Into<String>) -> Self {
        Self {
            source,
            origin: origin.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HarvestSettings {
    pub threshold: f64,
    pub max_search_pages: u32,
    pub max_browse_pages: u32,
    pub featured: bool,
    pub categories: bool,
    /// Owners whose public playlists are crawled after the category pass.
    pub user_ids: Vec<String>,
    /// Number of generated queries to skip (resume an interrupted crawl).
    pub start_query_index: usize,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            max_search_pages: DEFAULT_MAX_SEARCH_PAGES,
            max_browse_pages: DEFAULT_MAX_BROWSE_PAGES,
            featured: true,
            categories: true,
            user_ids: Vec::new(),
            start_query_index: 0,
        }
    }
}

/// What happened to one discovered playlist id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// Blank id.
    Ignored,
    AlreadySeen,
    Unchanged,
    BelowThreshold { score: f64 },
    Persisted { score: f64, tracks: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("playlist {id}: {source}")]
    Catalog {
        id: String,
        #[source]
        source: CatalogError,
    },
    #[error("playlist {id}: persisting failed: {message}")]
    Persist { id: String, message: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub discovered: usize,
    pub already_seen: usize,
    pub unchanged: usize,
    pub below_threshold: usize,
    pub persisted: usize,
    pub tracks_written: usize,
    pub errors: usize,
}

impl PassStats {
    fn count(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Ignored => {}
            Outcome::AlreadySeen => self.already_seen += 1,
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::BelowThreshold { .. } => self.below_threshold += 1,
            Outcome::Persisted { tracks, .. } => {
                self.persisted += 1;
                self.tracks_written += tracks;
            }
        }
        if outcome != Outcome::Ignored && outcome != Outcome::AlreadySeen {
            self.discovered += 1;
        }
    }

    fn add(&mut self, other: &PassStats) {
        self.discovered += other.discovered;
        self.already_seen += other.already_seen;
        self.unchanged += other.unchanged;
        self.below_threshold += other.below_threshold;
        self.persisted += other.persisted;
        self.tracks_written += other.tracks_written;
        self.errors += other.errors;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    pub pass: &'static str,
    pub stats: PassStats,
    /// Item errors of the pass joined with `"; "`.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub passes: Vec<PassReport>,
    /// Set when a fatal error stopped the run early.
    pub fatal: Option<String>,
    pub cancelled: bool,
}

impl RunReport {
    pub fn pass(&self, name: &str) -> Option<&PassReport> {
        self.passes.iter().find(|p| p.pass == name)
    }

    pub fn totals(&self) -> PassStats {
        let mut t = PassStats::default();
        for p in &self.passes {
            t.add(&p.stats);
        }
        t
    }

    pub fn is_complete(&self) -> bool {
        self.fatal.is_none()
    }
}

/// Per-pass accumulator.
struct PassLog {
    pass: &'static str,
    stats: PassStats,
    errors: Vec<String>,
}

impl PassLog {
    fn new(pass: &'static str) -> Self {
        Self {
            pass,
            stats: PassStats::default(),
            errors: Vec::new(),
        }
    }

    fn record(&mut self, err: impl std::fmt::Display) {
        let msg = err.to_string();
        debug!(target: "harvest", pass = self.pass, error = %msg, "item failed");
        counter!("harvest_item_errors_total", "pass" => self.pass).increment(1);
        self.stats.errors += 1;
        self.errors.push(msg);
    }

    fn finish(self) -> PassReport {
        let error = (!self.errors.is_empty()).then(|| self.errors.join("; "));
        let s = &self.stats;
        info!(
            target: "harvest",
            pass = self.pass,
            discovered = s.discovered,
            already_seen = s.already_seen,
            unchanged = s.unchanged,
            below_threshold = s.below_threshold,
            persisted = s.persisted,
            tracks = s.tracks_written,
            errors = s.errors,
            "pass finished"
        );
        if let Some(e) = &error {
            warn!(target: "harvest", pass = self.pass, errors = %e, "pass completed with errors");
        }
        PassReport {
            pass: self.pass,
            stats: self.stats,
            error,
        }
    }
}

/// Shared output state: snapshot cache plus both CSV sinks.
#[derive(Clone)]
pub struct Outputs {
    pub snapshots: Arc<SnapshotCache>,
    pub playlists: Arc<PlaylistStore>,
    pub tracks: Arc<TrackStore>,
}

impl Outputs {
    pub fn open(snapshot_path: &Path, playlists_csv: &Path, tracks_csv: &Path) -> Result<Self> {
        Ok(Self {
            snapshots: Arc::new(SnapshotCache::load(snapshot_path)),
            playlists: Arc::new(PlaylistStore::open(playlists_csv)?),
            tracks: Arc::new(TrackStore::open(tracks_csv)?),
        })
    }
}

pub struct Harvester {
    api: Arc<dyn CatalogApi>,
    index: SeedIndex,
    queries: Vec<SeedQuery>,
    settings: HarvestSettings,
    seen: Mutex<HashSet<String>>,
    outputs: Outputs,
    cancel: CancellationToken,
    clock: fn() -> DateTime<Utc>,
}

impl Harvester {
    pub fn new(
        api: Arc<dyn CatalogApi>,
        seeds: &SeedSet,
        settings: HarvestSettings,
        outputs: Outputs,
        cancel: CancellationToken,
    ) -> Self {
        crate::metrics::ensure_metrics_described();
        let index = SeedIndex::build(seeds);
        let queries = generate_queries(seeds);
        info!(
            target: "harvest",
            phrases = index.phrase_count(),
            artists = index.artist_count(),
            tracks = index.track_count(),
            queries = queries.len(),
            "seed index built"
        );
        Self {
            api,
            index,
            queries,
            settings,
            seen: Mutex::new(HashSet::new()),
            outputs,
            cancel,
            clock: Utc::now,
        }
    }

    /// Override the scoring clock.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn queries(&self) -> &[SeedQuery] {
        &self.queries
    }

    pub fn settings(&self) -> &HarvestSettings {
        &self.settings
    }

    pub fn seen_count(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or_default()
    }

    /// Run every enabled pass in order: search, featured, categories, users.
    pub async fn run(&self) -> RunReport {
        let started = Instant::now();
        let mut report = RunReport::default();

        for pass in [SOURCE_SEARCH, SOURCE_FEATURED, SOURCE_CATEGORY, SOURCE_USER] {
            let enabled = match pass {
                SOURCE_FEATURED => self.settings.featured,
                SOURCE_CATEGORY => self.settings.categories,
                SOURCE_USER => !self.settings.user_ids.is_empty(),
                _ => true,
            };
            if !enabled {
                debug!(target: "harvest", pass, "pass disabled");
                continue;
            }

            let mut log = PassLog::new(pass);
            let res = match pass {
                SOURCE_SEARCH => self.search_pass(&mut log).await,
                SOURCE_FEATURED => self.featured_pass(&mut log).await,
                SOURCE_CATEGORY => self.category_pass(&mut log).await,
                _ => self.user_pass(&mut log).await,
            };
            report.passes.push(log.finish());

            if let Err(e) = res {
                report.cancelled = matches!(e, CatalogError::Cancelled);
                if report.cancelled {
                    warn!(target: "harvest", pass, "run cancelled");
                } else {
                    warn!(target: "harvest", pass, error = %e, "fatal error, stopping run");
                }
                report.fatal = Some(format!("{pass} pass: {e}"));
                break;
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as f64;
        metrics::histogram!("harvest_run_ms").record(elapsed_ms);
        metrics::gauge!("harvest_last_run_ts").set((self.clock)().timestamp() as f64);

        let t = report.totals();
        info!(
            target: "harvest",
            discovered = t.discovered,
            persisted = t.persisted,
            tracks = t.tracks_written,
            errors = t.errors,
            elapsed_ms,
            "harvest run finished"
        );
        report
    }

    async fn search_pass(&self, log: &mut PassLog) -> Result<(), CatalogError> {
        let start = self.settings.start_query_index;
        if start > 0 && start >= self.queries.len() {
            info!(
                target: "harvest",
                start,
                queries = self.queries.len(),
                "start query index beyond generated queries, nothing to search"
            );
            return Ok(());
        }

        for (i, q) in self.queries.iter().enumerate().skip(start) {
            debug!(
                target: "harvest",
                query_index = i,
                query = %q.text,
                provenance = q.provenance,
                "search"
            );
            let origin = HarvestOrigin::new(SOURCE_SEARCH, q.text.as_str());
            let source = SearchPages {
                api: self.api.as_ref(),
                query: &q.text,
            };
            let mut pager = Pager::new(source, SEARCH_PAGE_SIZE, self.settings.max_search_pages);
            self.drain_playlists(&mut pager, &origin, log).await?;
        }
        Ok(())
    }

    async fn featured_pass(&self, log: &mut PassLog) -> Result<(), CatalogError> {
        let origin = HarvestOrigin::new(SOURCE_FEATURED, SOURCE_FEATURED);
        let source = FeaturedPages {
            api: self.api.as_ref(),
        };
        let mut pager = Pager::new(source, BROWSE_PAGE_SIZE, self.settings.max_browse_pages);
        self.drain_playlists(&mut pager, &origin, log).await
    }

    async fn category_pass(&self, log: &mut PassLog) -> Result<(), CatalogError> {
        let mut categories = Vec::new();
        let source = CategoryListPages {
            api: self.api.as_ref(),
        };
        let mut listing = Pager::new(source, BROWSE_PAGE_SIZE, self.settings.max_browse_pages);
        while let Some(page) = listing.next_page().await {
            match page {
                Ok(items) => categories.extend(items),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => log.record(format!("{}: {e}", listing.source().describe())),
            }
        }
        debug!(target: "harvest", categories = categories.len(), "categories listed");

        for category in &categories {
            if category.id.trim().is_empty() {
                continue;
            }
            let origin = HarvestOrigin::new(SOURCE_CATEGORY, category.id.as_str());
            let source = CategoryPlaylistPages {
                api: self.api.as_ref(),
                category_id: &category.id,
            };
            let mut pager = Pager::new(source, BROWSE_PAGE_SIZE, self.settings.max_browse_pages);
            self.drain_playlists(&mut pager, &origin, log).await?;
        }
        Ok(())
    }

    async fn user_pass(&self, log: &mut PassLog) -> Result<(), CatalogError> {
        for user_id in &self.settings.user_ids {
            let origin = HarvestOrigin::new(SOURCE_USER, user_id.as_str());
            let source = UserPlaylistPages {
                api: self.api.as_ref(),
                user_id,
            };
            let mut pager = Pager::new(source, BROWSE_PAGE_SIZE, self.settings.max_browse_pages);
            self.drain_playlists(&mut pager, &origin, log).await?;
        }
        Ok(())
    }

    /// Route every playlist of every page through `process_playlist`. A page
    /// error ends this listing only; fatal errors end the run.
    async fn drain_playlists<S>(
        &self,
        pager: &mut Pager<S>,
        origin: &HarvestOrigin,
        log: &mut PassLog,
    ) -> Result<(), CatalogError>
    where
        S: PagedFetch<Item = PlaylistRef>,
    {
        while let Some(page) = pager.next_page().await {
            let refs = match page {
                Ok(refs) => refs,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log.record(format!("{}: {e}", pager.source().describe()));
                    break;
                }
            };
            for playlist in refs {
                match self.process_playlist(&playlist.id, origin).await {
                    Ok(outcome) => log.stats.count(outcome),
                    Err(ProcessError::Catalog { source, .. }) if source.is_fatal() => {
                        return Err(source)
                    }
                    Err(e) => log.record(e),
                }
            }
        }
        Ok(())
    }

    /// Process one discovered playlist id.
    pub async fn process_playlist(
        &self,
        id: &str,
        origin: &HarvestOrigin,
    ) -> Result<Outcome, ProcessError> {
        let id = id.trim();
        if id.is_empty() {
            return Ok(Outcome::Ignored);
        }
        let catalog_err = |source| ProcessError::Catalog {
            id: id.to_string(),
            source,
        };
        if self.cancel.is_cancelled() {
            return Err(catalog_err(CatalogError::Cancelled));
        }

        let first_sighting = self
            .seen
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(id.to_string());
        if !first_sighting {
            counter!("harvest_playlists_skipped_total", "reason" => "seen").increment(1);
            return Ok(Outcome::AlreadySeen);
        }
        counter!("harvest_playlists_discovered_total").increment(1);

        let mut detail = self.api.playlist_detail(id).await.map_err(catalog_err)?;
        if detail.id.is_empty() {
            detail.id = id.to_string();
        }

        let snapshots = &self.outputs.snapshots;
        if snapshots.is_unchanged(id, &detail.snapshot_id) {
            counter!("harvest_playlists_skipped_total", "reason" => "unchanged").increment(1);
            debug!(target: "harvest", playlist_id = id, "snapshot unchanged, skipping");
            return Ok(Outcome::Unchanged);
        }

        let tracks = self.api.playlist_tracks(id).await.map_err(catalog_err)?;
        let relevance = score_playlist(&detail, &tracks, &self.index, (self.clock)());
        // Recorded for every evaluated version, including low scorers, so a
        // low scorer is not re-scored until its version changes.
        // TODO: revisit once seed changes should force re-evaluation.
        snapshots.update(id, &detail.snapshot_id);

        let score = relevance.score;
        if score < self.settings.threshold {
            counter!("harvest_playlists_skipped_total", "reason" => "below_threshold").increment(1);
            dev_log_decision(id, &relevance, self.settings.threshold, "below_threshold");
            debug!(
                target: "harvest",
                playlist_id = id,
                score,
                threshold = self.settings.threshold,
                "below threshold"
            );
            return Ok(Outcome::BelowThreshold { score });
        }
        dev_log_decision(id, &relevance, self.settings.threshold, "persist");

        let persist_err = |e: anyhow::Error| ProcessError::Persist {
            id: id.to_string(),
            message: format!("{e:#}"),
        };
        let record = PlaylistRecord::new(&detail, relevance, origin, (self.clock)());
        self.outputs.playlists.append(&record).map_err(persist_err)?;
        let written = self
            .outputs
            .tracks
            .append_all(id, &tracks, origin)
            .map_err(persist_err)?;

        counter!("harvest_playlists_persisted_total").increment(1);
        counter!("harvest_tracks_persisted_total").increment(written as u64);
        debug!(
            target: "harvest",
            playlist_id = id,
            score,
            tracks = written,
            source = origin.source,
            "persisted"
        );
        Ok(Outcome::Persisted {
            score,
            tracks: written,
        })
    }
}
