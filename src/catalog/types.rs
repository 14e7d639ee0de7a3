// src/catalog/types.rs
//! Wire models for the catalog API. Only the fields the harvester reads are
//! modelled; everything is lenient about missing and `null` values.

use serde::{Deserialize, Deserializer, Serialize};

/// Accept `null`, a missing field, or an array with `null` holes; keep the non-null entries.
fn skip_nulls<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let v: Option<Vec<Option<T>>> = Option::deserialize(d)?;
    Ok(v.unwrap_or_default().into_iter().flatten().collect())
}

/// Treat an explicit `null` like a missing field.
fn null_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// One page of an offset-paginated listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Page<T> {
    #[serde(default, deserialize_with = "skip_nulls")]
    pub items: Vec<T>,
    /// Absolute URL of the next page, absent on the last one.
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub limit: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next: Option<String>) -> Self {
        Self {
            items,
            next,
            total: 0,
            offset: 0,
            limit: 0,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), None)
    }

    pub fn has_next(&self) -> bool {
        self.next.as_deref().is_some_and(|n| !n.is_empty())
    }
}

/// Playlist as it appears inside search and browse listings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl PlaylistRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Owner {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Followers {
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Image {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackTotal {
    #[serde(default)]
    pub total: u32,
}

/// Field-limited playlist detail projection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistDetail {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub public: Option<bool>,
    #[serde(default)]
    pub collaborative: bool,
    #[serde(default, deserialize_with = "null_default")]
    pub owner: Owner,
    /// Opaque version token; changes whenever the playlist changes.
    #[serde(default)]
    pub snapshot_id: String,
    #[serde(default, deserialize_with = "null_default")]
    pub followers: Followers,
    #[serde(default, deserialize_with = "skip_nulls")]
    pub images: Vec<Image>,
    #[serde(default, deserialize_with = "null_default")]
    pub tracks: TrackTotal,
}

impl PlaylistDetail {
    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or_default()
    }

    pub fn follower_count(&self) -> u64 {
        self.followers.total
    }

    pub fn image_url(&self) -> Option<&str> {
        self.images
            .iter()
            .map(|i| i.url.as_str())
            .find(|u| !u.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalUrls {
    #[serde(default)]
    pub spotify: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtistRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlbumRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// `None` for local files.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default, deserialize_with = "null_default")]
    pub external_urls: ExternalUrls,
    #[serde(default, deserialize_with = "skip_nulls")]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub album: Option<AlbumRef>,
}

/// One entry of a playlist's track listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistTrackItem {
    /// RFC3339 timestamp; missing on very old playlists.
    #[serde(default)]
    pub added_at: Option<String>,
    #[serde(default)]
    pub added_by: Option<UserRef>,
    /// `None` when the track was removed from the catalog.
    #[serde(default)]
    pub track: Option<Track>,
}

impl PlaylistTrackItem {
    pub fn track_id(&self) -> Option<&str> {
        self.track
            .as_ref()
            .and_then(|t| t.id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

// Response envelopes.

#[derive(Debug, Deserialize)]
pub(crate) struct PlaylistsEnvelope {
    pub playlists: Page<PlaylistRef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CategoriesEnvelope {
    pub categories: Page<Category>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_items_are_dropped_from_pages() {
        let json =
            r#"{"items": [null, {"id": "p1", "name": "One"}, null], "next": null, "total": 3}"#;
        let page: Page<PlaylistRef> = serde_json::from_str(json).unwrap();
        assert_eq!(page.items, vec![PlaylistRef::new("p1", "One")]);
        assert!(!page.has_next());

        let page: Page<PlaylistRef> = serde_json::from_str(r#"{"items": null}"#).unwrap();
        assert!(page.items.is_empty());
    }

    #[test]
    fn detail_projection_tolerates_nulls() {
        let json = r#"{
            "id": "p1", "name": "Gym", "description": null, "public": null,
            "collaborative": false, "owner": {"id": "u1", "display_name": null},
            "snapshot_id": "snap", "followers": {"href": null, "total": 42},
            "images": null, "tracks": {"total": 7}
        }"#;
        let d: PlaylistDetail = serde_json::from_str(json).unwrap();
        assert_eq!(d.description(), "");
        assert_eq!(d.follower_count(), 42);
        assert_eq!(d.image_url(), None);
        assert_eq!(d.tracks.total, 7);
    }

    #[test]
    fn track_item_without_track_has_no_id() {
        let item: PlaylistTrackItem =
            serde_json::from_str(r#"{"added_at": "2024-01-01T00:00:00Z", "track": null}"#).unwrap();
        assert_eq!(item.track_id(), None);
    }
}
