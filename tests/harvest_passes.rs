// tests/harvest_passes.rs
//
// Orchestrator behaviour against an in-memory catalog.
//
// Covered:
// - unchanged snapshot skips the track fetch
// - empty search page ends pagination without error
// - first pass to see a playlist keeps provenance
// - low scorers are dropped but their snapshot is recorded
// - per-playlist and per-page failures are collected, the run continues
// - fatal errors stop the remaining passes
// - persisted descriptions never contain line breaks

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use playlist_harvester::catalog::types::{ArtistRef, Followers, Track};
use playlist_harvester::catalog::{
    CatalogApi, CatalogError, CatalogResult, Category, Page, PlaylistDetail, PlaylistRef,
    PlaylistTrackItem,
};
use playlist_harvester::harvest::{HarvestSettings, Harvester, Outputs};
use playlist_harvester::seeds::{ArtistSeed, SeedSet, TrackSeed};

#[derive(Clone, Copy)]
enum Fail {
    NotFound,
    Auth,
}

impl Fail {
    fn error(self, path: &str) -> CatalogError {
        match self {
            Fail::NotFound => CatalogError::api("GET", path, 404, "not found"),
            Fail::Auth => CatalogError::Auth("token revoked".into()),
        }
    }
}

#[derive(Default)]
struct MockCatalog {
    search: HashMap<String, Vec<Page<PlaylistRef>>>,
    featured: Vec<Page<PlaylistRef>>,
    categories: Vec<Page<Category>>,
    category_playlists: HashMap<String, Vec<Page<PlaylistRef>>>,
    category_failures: HashMap<String, Fail>,
    users: HashMap<String, Vec<Page<PlaylistRef>>>,
    details: HashMap<String, PlaylistDetail>,
    detail_failures: HashMap<String, Fail>,
    tracks: HashMap<String, Vec<PlaylistTrackItem>>,
    calls: Mutex<Vec<String>>,
}

impl MockCatalog {
    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn with_playlist(mut self, detail: PlaylistDetail, tracks: Vec<PlaylistTrackItem>) -> Self {
        self.tracks.insert(detail.id.clone(), tracks);
        self.details.insert(detail.id.clone(), detail);
        self
    }

    fn with_search(mut self, query: &str, pages: Vec<Page<PlaylistRef>>) -> Self {
        self.search.insert(query.to_string(), pages);
        self
    }
}

fn page_at<T: Clone>(pages: &[Page<T>], offset: u32) -> Page<T> {
    pages
        .get((offset / 50) as usize)
        .cloned()
        .unwrap_or_else(Page::empty)
}

#[async_trait]
impl CatalogApi for MockCatalog {
    async fn search_playlists(&self, query: &str, offset: u32) -> CatalogResult<Page<PlaylistRef>> {
        self.log(format!("search:{query}:{offset}"));
        Ok(self
            .search
            .get(query)
            .map(|p| page_at(p, offset))
            .unwrap_or_else(Page::empty))
    }

    async fn featured_playlists(&self, offset: u32) -> CatalogResult<Page<PlaylistRef>> {
        self.log(format!("featured:{offset}"));
        Ok(page_at(&self.featured, offset))
    }

    async fn categories(&self, offset: u32) -> CatalogResult<Page<Category>> {
        self.log(format!("categories:{offset}"));
        Ok(page_at(&self.categories, offset))
    }

    async fn category_playlists(
        &self,
        category_id: &str,
        offset: u32,
    ) -> CatalogResult<Page<PlaylistRef>> {
        self.log(format!("category:{category_id}:{offset}"));
        if let Some(f) = self.category_failures.get(category_id) {
            return Err(f.error(&format!("/browse/categories/{category_id}/playlists")));
        }
        Ok(self
            .category_playlists
            .get(category_id)
            .map(|p| page_at(p, offset))
            .unwrap_or_else(Page::empty))
    }

    async fn user_playlists(&self, user_id: &str, offset: u32) -> CatalogResult<Page<PlaylistRef>> {
        self.log(format!("user:{user_id}:{offset}"));
        Ok(self
            .users
            .get(user_id)
            .map(|p| page_at(p, offset))
            .unwrap_or_else(Page::empty))
    }

    async fn playlist_detail(&self, playlist_id: &str) -> CatalogResult<PlaylistDetail> {
        self.log(format!("detail:{playlist_id}"));
        if let Some(f) = self.detail_failures.get(playlist_id) {
            return Err(f.error(&format!("/playlists/{playlist_id}")));
        }
        self.details
            .get(playlist_id)
            .cloned()
            .ok_or_else(|| Fail::NotFound.error(&format!("/playlists/{playlist_id}")))
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> CatalogResult<Vec<PlaylistTrackItem>> {
        self.log(format!("tracks:{playlist_id}"));
        Ok(self.tracks.get(playlist_id).cloned().unwrap_or_default())
    }
}

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn seeds() -> SeedSet {
    SeedSet {
        keywords: vec!["workout".into()],
        artists: vec![ArtistSeed::new("Drake").with_id("drake-id")],
        tracks: vec![TrackSeed::new("gods-plan", "God's Plan")],
        ..SeedSet::default()
    }
}

fn detail(id: &str, name: &str, snapshot: &str) -> PlaylistDetail {
    PlaylistDetail {
        id: id.into(),
        name: name.into(),
        description: Some(String::new()),
        snapshot_id: snapshot.into(),
        followers: Followers { total: 10 },
        ..PlaylistDetail::default()
    }
}

fn drake_track() -> PlaylistTrackItem {
    PlaylistTrackItem {
        added_at: Some("2024-05-30T12:00:00Z".into()),
        added_by: None,
        track: Some(Track {
            id: Some("gods-plan".into()),
            name: "God's Plan".into(),
            uri: "spotify:track:gods-plan".into(),
            artists: vec![ArtistRef {
                id: Some("drake-id".into()),
                name: "Drake".into(),
            }],
            ..Track::default()
        }),
    }
}

fn refs(ids: &[&str], more: bool) -> Page<PlaylistRef> {
    Page::new(
        ids.iter().map(|id| PlaylistRef::new(*id, "")).collect(),
        more.then(|| "https://next.page".to_string()),
    )
}

fn search_only() -> HarvestSettings {
    HarvestSettings {
        featured: false,
        categories: false,
        ..HarvestSettings::default()
    }
}

fn outputs(dir: &Path) -> Outputs {
    Outputs::open(
        &dir.join("state/snapshots.json"),
        &dir.join("data/playlists.csv"),
        &dir.join("data/tracks.csv"),
    )
    .unwrap()
}

fn harvester(api: Arc<MockCatalog>, settings: HarvestSettings, out: &Outputs) -> Harvester {
    Harvester::new(api, &seeds(), settings, out.clone(), CancellationToken::new())
        .with_clock(fixed_now)
}

fn csv_rows(path: &Path) -> Vec<csv::StringRecord> {
    let mut rdr = csv::Reader::from_path(path).unwrap();
    rdr.records().map(|r| r.unwrap()).collect()
}

#[tokio::test]
async fn unchanged_snapshot_never_fetches_tracks() {
    let dir = tempfile::tempdir().unwrap();
    let out = outputs(dir.path());
    out.snapshots.update("p1", "snap-1");

    let api = Arc::new(
        MockCatalog::default()
            .with_search("workout", vec![refs(&["p1"], false)])
            .with_playlist(detail("p1", "Workout Bangers", "snap-1"), vec![drake_track()]),
    );
    let report = harvester(api.clone(), search_only(), &out).run().await;

    assert_eq!(api.count("detail:p1"), 1);
    assert_eq!(api.count("tracks:"), 0);
    assert_eq!(report.pass("search").unwrap().stats.unchanged, 1);
    assert!(csv_rows(&dir.path().join("data/playlists.csv")).is_empty());
}

#[tokio::test]
async fn empty_search_page_ends_pagination_without_error() {
    let dir = tempfile::tempdir().unwrap();
    let out = outputs(dir.path());
    let api = Arc::new(
        MockCatalog::default()
            .with_search(
                "workout",
                vec![refs(&["p1"], true), refs(&[], true), refs(&["p9"], true)],
            )
            .with_playlist(detail("p1", "Workout Bangers", "s1"), vec![drake_track()]),
    );
    let report = harvester(api.clone(), search_only(), &out).run().await;

    let searches: Vec<String> = api
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("search:workout"))
        .collect();
    assert_eq!(searches, vec!["search:workout:0", "search:workout:50"]);
    let search = report.pass("search").unwrap();
    assert_eq!(search.error, None);
    assert_eq!(search.stats.persisted, 1);
    assert_eq!(api.count("detail:p9"), 0);
}

#[tokio::test]
async fn first_pass_to_see_a_playlist_keeps_provenance() {
    let dir = tempfile::tempdir().unwrap();
    let out = outputs(dir.path());
    let mut mock = MockCatalog::default()
        .with_search("workout", vec![refs(&["p1"], false)])
        .with_playlist(detail("p1", "Workout Bangers", "s1"), vec![drake_track()]);
    mock.featured = vec![refs(&["p1"], false)];
    let api = Arc::new(mock);

    let settings = HarvestSettings {
        featured: true,
        categories: false,
        ..HarvestSettings::default()
    };
    let report = harvester(api.clone(), settings, &out).run().await;

    assert_eq!(api.count("detail:p1"), 1);
    assert_eq!(report.pass("featured").unwrap().stats.already_seen, 1);

    let rows = csv_rows(&dir.path().join("data/playlists.csv"));
    assert_eq!(rows.len(), 1);
    assert_eq!(&rows[0][18], "search");
    assert_eq!(&rows[0][19], "workout");

    let tracks = csv_rows(&dir.path().join("data/tracks.csv"));
    assert_eq!(tracks.len(), 1);
    assert_eq!(&tracks[0][2], "gods-plan");
    assert_eq!(&tracks[0][12], "search");
}

#[tokio::test]
async fn low_scorer_is_dropped_but_its_snapshot_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let out = outputs(dir.path());
    let api = Arc::new(
        MockCatalog::default()
            .with_search("workout", vec![refs(&["p2"], false)])
            .with_playlist(detail("p2", "Quiet evening", "v1"), vec![]),
    );

    let report = harvester(api.clone(), search_only(), &out).run().await;
    assert_eq!(report.pass("search").unwrap().stats.below_threshold, 1);
    assert!(out.snapshots.is_unchanged("p2", "v1"));
    assert!(csv_rows(&dir.path().join("data/playlists.csv")).is_empty());

    // A second run with the same version does not re-evaluate it.
    let again = harvester(api.clone(), search_only(), &out).run().await;
    assert_eq!(again.pass("search").unwrap().stats.unchanged, 1);
    assert_eq!(api.count("tracks:p2"), 1);
}

#[tokio::test]
async fn failed_playlist_is_reported_and_the_run_continues() {
    let dir = tempfile::tempdir().unwrap();
    let out = outputs(dir.path());
    let mut mock = MockCatalog::default()
        .with_search("workout", vec![refs(&["broken", "p1"], false)])
        .with_playlist(detail("p1", "Workout Bangers", "s1"), vec![drake_track()]);
    mock.detail_failures.insert("broken".into(), Fail::NotFound);
    let api = Arc::new(mock);

    let report = harvester(api.clone(), search_only(), &out).run().await;

    assert!(report.is_complete());
    let search = report.pass("search").unwrap();
    assert_eq!(search.stats.errors, 1);
    assert_eq!(search.stats.persisted, 1);
    let err = search.error.as_deref().unwrap();
    assert!(err.contains("broken") && err.contains("404"), "{err}");
}

#[tokio::test]
async fn category_errors_are_joined_and_other_categories_still_run() {
    let dir = tempfile::tempdir().unwrap();
    let out = outputs(dir.path());
    let mut mock = MockCatalog::default()
        .with_playlist(detail("p3", "Workout Mix", "s3"), vec![drake_track()]);
    mock.categories = vec![Page::new(
        vec![
            Category { id: "gone".into(), name: "Gone".into() },
            Category { id: "fitness".into(), name: "Fitness".into() },
            Category { id: "lost".into(), name: "Lost".into() },
        ],
        None,
    )];
    mock.category_failures.insert("gone".into(), Fail::NotFound);
    mock.category_failures.insert("lost".into(), Fail::NotFound);
    mock.category_playlists.insert("fitness".into(), vec![refs(&["p3"], false)]);
    let api = Arc::new(mock);

    let settings = HarvestSettings {
        featured: false,
        categories: true,
        ..HarvestSettings::default()
    };
    let report = harvester(api, settings, &out).run().await;

    let cat = report.pass("category").unwrap();
    assert_eq!(cat.stats.persisted, 1);
    let err = cat.error.as_deref().unwrap();
    assert!(
        err.contains("category gone") && err.contains("; ") && err.contains("category lost"),
        "{err}"
    );

    let rows = csv_rows(&dir.path().join("data/playlists.csv"));
    assert_eq!(&rows[0][18], "category");
    assert_eq!(&rows[0][19], "fitness");
}

#[tokio::test]
async fn fatal_error_stops_the_remaining_passes() {
    let dir = tempfile::tempdir().unwrap();
    let out = outputs(dir.path());
    let mut mock = MockCatalog::default().with_search("workout", vec![refs(&["p1"], false)]);
    mock.detail_failures.insert("p1".into(), Fail::Auth);
    mock.featured = vec![refs(&["p7"], false)];
    let api = Arc::new(mock);

    let settings = HarvestSettings {
        featured: true,
        ..HarvestSettings::default()
    };
    let report = harvester(api.clone(), settings, &out).run().await;

    assert!(!report.is_complete());
    assert!(!report.cancelled);
    assert!(report.fatal.as_deref().unwrap().contains("token revoked"));
    assert_eq!(api.count("featured:"), 0);
    assert_eq!(api.count("categories:"), 0);
}

#[tokio::test]
async fn cancelled_run_reports_cancellation() {
    let dir = tempfile::tempdir().unwrap();
    let out = outputs(dir.path());
    let api = Arc::new(
        MockCatalog::default()
            .with_search("workout", vec![refs(&["p1"], false)])
            .with_playlist(detail("p1", "Workout Bangers", "s1"), vec![drake_track()]),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();
    let h = Harvester::new(api.clone(), &seeds(), search_only(), out.clone(), cancel);

    let report = h.run().await;
    assert!(report.cancelled);
    assert_eq!(api.count("detail:"), 0);
}

#[tokio::test]
async fn user_pass_runs_after_browse_passes_with_user_origin() {
    let dir = tempfile::tempdir().unwrap();
    let out = outputs(dir.path());
    let mut mock = MockCatalog::default()
        .with_playlist(detail("p5", "Workout by Alice", "s5"), vec![drake_track()]);
    mock.users.insert("alice".into(), vec![refs(&["p5"], false)]);
    let api = Arc::new(mock);

    let settings = HarvestSettings {
        featured: false,
        categories: false,
        user_ids: vec!["alice".into()],
        ..HarvestSettings::default()
    };
    let report = harvester(api, settings, &out).run().await;

    assert_eq!(report.pass("user").unwrap().stats.persisted, 1);
    let rows = csv_rows(&dir.path().join("data/playlists.csv"));
    assert_eq!(&rows[0][18], "user");
    assert_eq!(&rows[0][19], "alice");
}

#[tokio::test]
async fn start_index_past_the_query_list_searches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let out = outputs(dir.path());
    let api = Arc::new(MockCatalog::default().with_search("workout", vec![refs(&["p1"], false)]));

    let settings = HarvestSettings {
        start_query_index: 10_000,
        ..search_only()
    };
    let report = harvester(api.clone(), settings, &out).run().await;

    assert_eq!(api.count("search:"), 0);
    assert_eq!(report.pass("search").unwrap().error, None);
}

#[tokio::test]
async fn persisted_description_has_no_line_breaks() {
    let dir = tempfile::tempdir().unwrap();
    let out = outputs(dir.path());
    let mut d = detail("p1", "Workout Bangers", "s1");
    d.description = Some("line one\nline two\r\nthree &amp; four\r".into());
    let api = Arc::new(
        MockCatalog::default()
            .with_search("workout", vec![refs(&["p1"], false)])
            .with_playlist(d, vec![drake_track()]),
    );
    harvester(api, search_only(), &out).run().await;

    let text = std::fs::read_to_string(dir.path().join("data/playlists.csv")).unwrap();
    assert_eq!(text.lines().count(), 2, "{text}");
    let rows = csv_rows(&dir.path().join("data/playlists.csv"));
    assert_eq!(&rows[0][2], "line one line two three & four");
}
