// src/catalog/client.rs
//! HTTP access layer. Every request passes the shared [`RateGate`] and runs
//! through one small state machine:
//!
//! ```text
//! Admit -> Send -> success ............ return body
//!               -> 429 -> Backoff(wait) -> Admit
//!               -> 401 (first) -> Refresh -> Admit
//!               -> other error ......... return CatalogError::Api
//! ```
//!
//! Every wait observes the cancellation token.

use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::sync::RwLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::auth::{exchange_token, Credentials};
use super::error::{CatalogError, CatalogResult};
use super::rate_gate::RateGate;
use super::retry_after::retry_after;
use super::types::{
    CategoriesEnvelope, Category, Page, PlaylistDetail, PlaylistRef, PlaylistTrackItem,
    PlaylistsEnvelope,
};
use super::{CatalogApi, BROWSE_PAGE_SIZE, SEARCH_PAGE_SIZE, TRACK_PAGE_SIZE};

pub const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";
pub const DEFAULT_AUTH_URL: &str = "https://accounts.spotify.com/api/token";

const DETAIL_FIELDS: &str = "id,name,description,public,collaborative,owner(id,display_name),\
snapshot_id,followers.total,images(url),tracks.total";
const TRACK_FIELDS: &str = "items(added_at,added_by.id,track(id,name,uri,external_urls.spotify,\
artists(id,name),album(id,name))),next";

/// Default upper bound on track pages fetched for one playlist.
pub const DEFAULT_MAX_TRACK_PAGES: usize = 200;

/// Shared HTTP client with the crate's user agent and timeouts.
pub fn build_http(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("playlist-harvester/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(5))
        .timeout(timeout)
        .build()
        .context("building http client")
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub api_base: String,
    pub auth_url: String,
    pub requests_per_second: f64,
    /// Forwarded as `country` to the browse endpoints.
    pub country: Option<String>,
    /// A longer listing fails instead of being persisted partially.
    pub max_track_pages: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            requests_per_second: super::rate_gate::DEFAULT_REQUESTS_PER_SECOND,
            country: None,
            max_track_pages: DEFAULT_MAX_TRACK_PAGES,
        }
    }
}

enum Step {
    Admit,
    Send,
    Backoff(std::time::Duration),
    Refresh,
}

pub struct CatalogClient {
    http: reqwest::Client,
    base: Url,
    auth_url: String,
    country: Option<String>,
    token: RwLock<String>,
    credentials: Option<Credentials>,
    gate: RateGate,
    max_track_pages: usize,
    cancel: CancellationToken,
}

impl CatalogClient {
    pub fn new(
        http: reqwest::Client,
        settings: ClientSettings,
        token: String,
        cancel: CancellationToken,
    ) -> anyhow::Result<Self> {
        let base = Url::parse(settings.api_base.trim_end_matches('/'))
            .with_context(|| format!("invalid api base url {}", settings.api_base))?;
        if base.cannot_be_a_base() {
            bail!("api base url {} cannot carry a path", settings.api_base);
        }
        crate::metrics::ensure_metrics_described();
        let gate = RateGate::per_second(settings.requests_per_second);
        debug!(
            target: "catalog",
            interval_ms = gate.interval().as_millis() as u64,
            "rate gate ready"
        );
        Ok(Self {
            http,
            base,
            auth_url: settings.auth_url,
            country: settings.country.filter(|c| !c.trim().is_empty()),
            token: RwLock::new(token),
            credentials: None,
            gate,
            max_track_pages: settings.max_track_pages.max(1),
            cancel,
        })
    }

    /// Exchange credentials for a token, then build the client. The credentials
    /// are kept so an expired token can be renewed mid-run.
    pub async fn connect(
        http: reqwest::Client,
        settings: ClientSettings,
        credentials: Credentials,
        cancel: CancellationToken,
    ) -> anyhow::Result<Self> {
        let token = exchange_token(&http, &settings.auth_url, &credentials, &cancel).await?;
        let mut client = Self::new(http, settings, token, cancel)?;
        client.credentials = Some(credentials);
        Ok(client)
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn browse_query(&self, offset: u32) -> Vec<(&'static str, String)> {
        let mut q = vec![
            ("limit", BROWSE_PAGE_SIZE.to_string()),
            ("offset", offset.to_string()),
        ];
        if let Some(c) = &self.country {
            q.push(("country", c.clone()));
        }
        q
    }

    fn current_token(&self) -> String {
        self.token.read().map(|t| t.clone()).unwrap_or_default()
    }

    async fn refresh_token(&self) -> CatalogResult<()> {
        let Some(creds) = &self.credentials else {
            return Ok(());
        };
        let fresh = exchange_token(&self.http, &self.auth_url, creds, &self.cancel).await?;
        if let Ok(mut guard) = self.token.write() {
            *guard = fresh;
        }
        debug!(target: "catalog", "bearer token refreshed");
        Ok(())
    }

    async fn sleep(&self, wait: Duration) -> CatalogResult<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(CatalogError::Cancelled),
            _ = tokio::time::sleep(wait) => Ok(()),
        }
    }

    async fn send(
        &self,
        url: &Url,
        query: &[(&str, String)],
    ) -> CatalogResult<reqwest::Response> {
        let request = self
            .http
            .get(url.clone())
            .bearer_auth(self.current_token())
            .query(query)
            .send();
        tokio::select! {
            _ = self.cancel.cancelled() => Err(CatalogError::Cancelled),
            r = request => r.map_err(|source| CatalogError::Transport {
                method: "GET",
                path: url.path().to_string(),
                source,
            }),
        }
    }

    async fn read_body(&self, resp: reqwest::Response, path: &str) -> CatalogResult<String> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(CatalogError::Cancelled),
            r = resp.text() => r.map_err(|source| CatalogError::Transport {
                method: "GET",
                path: path.to_string(),
                source,
            }),
        }
    }

    /// Rate-gated GET with 429 backoff, returning the decoded body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> CatalogResult<T> {
        let path = url.path().to_string();
        let mut refreshed = false;
        let mut step = Step::Admit;
        loop {
            step = match step {
                Step::Admit => {
                    self.gate.admit(&self.cancel).await?;
                    Step::Send
                }
                Step::Send => {
                    counter!("catalog_requests_total").increment(1);
                    let resp = self.send(&url, query).await?;
                    let status = resp.status();

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        let wait = retry_after(resp.headers(), Utc::now());
                        counter!("catalog_rate_limited_total").increment(1);
                        warn!(
                            target: "catalog",
                            path = %path,
                            wait_ms = wait.as_millis() as u64,
                            "rate limited, backing off"
                        );
                        Step::Backoff(wait)
                    } else if status == StatusCode::UNAUTHORIZED
                        && !refreshed
                        && self.credentials.is_some()
                    {
                        refreshed = true;
                        Step::Refresh
                    } else {
                        let body = self.read_body(resp, &path).await?;
                        if !status.is_success() {
                            counter!("catalog_errors_total").increment(1);
                            return Err(CatalogError::api("GET", path, status.as_u16(), &body));
                        }
                        return serde_json::from_str(&body).map_err(|source| {
                            counter!("catalog_errors_total").increment(1);
                            CatalogError::Decode { path, source }
                        });
                    }
                }
                Step::Backoff(wait) => {
                    self.sleep(wait).await?;
                    Step::Admit
                }
                Step::Refresh => {
                    self.refresh_token().await?;
                    Step::Admit
                }
            };
        }
    }
}

#[async_trait]
impl CatalogApi for CatalogClient {
    async fn search_playlists(&self, query: &str, offset: u32) -> CatalogResult<Page<PlaylistRef>> {
        let q = [
            ("q", query.to_string()),
            ("type", "playlist".to_string()),
            ("limit", SEARCH_PAGE_SIZE.to_string()),
            ("offset", offset.to_string()),
        ];
        let env: PlaylistsEnvelope = self.get_json(self.endpoint(&["search"]), &q).await?;
        Ok(env.playlists)
    }

    async fn featured_playlists(&self, offset: u32) -> CatalogResult<Page<PlaylistRef>> {
        let url = self.endpoint(&["browse", "featured-playlists"]);
        let env: PlaylistsEnvelope = self.get_json(url, &self.browse_query(offset)).await?;
        Ok(env.playlists)
    }

    async fn categories(&self, offset: u32) -> CatalogResult<Page<Category>> {
        let url = self.endpoint(&["browse", "categories"]);
        let env: CategoriesEnvelope = self.get_json(url, &self.browse_query(offset)).await?;
        Ok(env.categories)
    }

    async fn category_playlists(
        &self,
        category_id: &str,
        offset: u32,
    ) -> CatalogResult<Page<PlaylistRef>> {
        let url = self.endpoint(&["browse", "categories", category_id, "playlists"]);
        let env: PlaylistsEnvelope = self.get_json(url, &self.browse_query(offset)).await?;
        Ok(env.playlists)
    }

    async fn user_playlists(&self, user_id: &str, offset: u32) -> CatalogResult<Page<PlaylistRef>> {
        let q = [
            ("limit", BROWSE_PAGE_SIZE.to_string()),
            ("offset", offset.to_string()),
        ];
        self.get_json(self.endpoint(&["users", user_id, "playlists"]), &q)
            .await
    }

    async fn playlist_detail(&self, playlist_id: &str) -> CatalogResult<PlaylistDetail> {
        let q = [("fields", DETAIL_FIELDS.to_string())];
        self.get_json(self.endpoint(&["playlists", playlist_id]), &q)
            .await
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> CatalogResult<Vec<PlaylistTrackItem>> {
        let q = [
            ("limit", TRACK_PAGE_SIZE.to_string()),
            ("offset", "0".to_string()),
            ("fields", TRACK_FIELDS.to_string()),
        ];
        let mut page: Page<PlaylistTrackItem> = self
            .get_json(self.endpoint(&["playlists", playlist_id, "tracks"]), &q)
            .await?;

        let mut items = std::mem::take(&mut page.items);
        let mut fetched = 1usize;
        while let Some(next) = page.next.take().filter(|n| !n.is_empty()) {
            if fetched >= self.max_track_pages {
                warn!(
                    target: "catalog",
                    playlist_id,
                    pages = fetched,
                    "track listing over page cap"
                );
                return Err(CatalogError::TooManyPages {
                    path: format!("/playlists/{playlist_id}/tracks"),
                    pages: self.max_track_pages,
                });
            }
            fetched += 1;
            // `next` already carries limit/offset/fields.
            let url = Url::parse(&next)
                .map_err(|e| CatalogError::InvalidUrl(format!("{next}: {e}")))?;
            page = self.get_json(url, &[]).await?;
            items.append(&mut page.items);
        }
        Ok(items)
    }
}
