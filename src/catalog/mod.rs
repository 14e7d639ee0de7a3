// src/catalog/mod.rs
//! Catalog access layer: rate-gated, authenticated HTTP against the playlist
//! catalog, exposed to the harvester through the [`CatalogApi`] seam.

pub mod auth;
pub mod client;
pub mod error;
pub mod rate_gate;
pub mod retry_after;
pub mod types;

use async_trait::async_trait;

pub use auth::Credentials;
pub use client::{build_http, CatalogClient, ClientSettings};
pub use error::{CatalogError, CatalogResult};
pub use rate_gate::RateGate;
pub use types::{Category, Page, PlaylistDetail, PlaylistRef, PlaylistTrackItem};

pub const SEARCH_PAGE_SIZE: u32 = 50;
pub const BROWSE_PAGE_SIZE: u32 = 50;
pub const TRACK_PAGE_SIZE: u32 = 100;

/// Everything the harvester needs from the catalog. Implementations must be
/// safe to share between concurrent passes.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn search_playlists(&self, query: &str, offset: u32) -> CatalogResult<Page<PlaylistRef>>;

    async fn featured_playlists(&self, offset: u32) -> CatalogResult<Page<PlaylistRef>>;

    async fn categories(&self, offset: u32) -> CatalogResult<Page<Category>>;

    async fn category_playlists(
        &self,
        category_id: &str,
        offset: u32,
    ) -> CatalogResult<Page<PlaylistRef>>;

    async fn user_playlists(&self, user_id: &str, offset: u32) -> CatalogResult<Page<PlaylistRef>>;

    async fn playlist_detail(&self, playlist_id: &str) -> CatalogResult<PlaylistDetail>;

    /// Full track listing, following `next` links to the end.
    async fn playlist_tracks(&self, playlist_id: &str) -> CatalogResult<Vec<PlaylistTrackItem>>;
}
