// src/harvest/snapshot.rs
//! Persisted playlist-id → version-token map, used to skip re-fetching the
//! tracks of playlists that have not changed since the last run.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub const DEFAULT_SNAPSHOT_PATH: &str = "state/snapshots.json";

#[derive(Debug, Default)]
struct CacheState {
    tokens: BTreeMap<String, String>,
    dirty: bool,
}

#[derive(Debug)]
pub struct SnapshotCache {
    path: PathBuf,
    inner: Mutex<CacheState>,
}

impl SnapshotCache {
    /// Empty cache that will be saved to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            inner: Mutex::new(CacheState::default()),
        }
    }

    /// Load from `path`. A missing file yields an empty cache; an unreadable or
    /// malformed one is logged and replaced on the next save.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let tokens = match fs::read_to_string(&path) {
            Ok(s) => match serde_json::from_str::<BTreeMap<String, String>>(&s) {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        path = %path.display(),
                        "snapshot cache unreadable, starting empty"
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %path.display(),
                    "snapshot cache unreadable, starting empty"
                );
                BTreeMap::new()
            }
        };
        tracing::debug!(entries = tokens.len(), path = %path.display(), "snapshot cache loaded");
        Self {
            path,
            inner: Mutex::new(CacheState {
                tokens,
                dirty: false,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// True only when a token is stored for `id` and equals `token`.
    /// An empty token is always treated as changed.
    pub fn is_unchanged(&self, id: &str, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        self.state().tokens.get(id).is_some_and(|t| t == token)
    }

    /// Record `token` for `id`. Empty or identical tokens leave the cache clean.
    pub fn update(&self, id: &str, token: &str) {
        if token.is_empty() {
            return;
        }
        let mut st = self.state();
        if st.tokens.get(id).is_some_and(|t| t == token) {
            return;
        }
        st.tokens.insert(id.to_string(), token.to_string());
        st.dirty = true;
    }

    pub fn get(&self, id: &str) -> Option<String> {
        self.state().tokens.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state().tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_dirty(&self) -> bool {
        self.state().dirty
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the whole map as pretty JSON when dirty. Returns whether a write happened.
    pub fn save(&self) -> Result<bool> {
        let mut st = self.state();
        if !st.dirty {
            return Ok(false);
        }
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating snapshot dir {}", dir.display()))?;
        }
        let json = serde_json::to_vec_pretty(&st.tokens).context("encoding snapshot cache")?;
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut f = fs::File::create(&tmp)
                .with_context(|| format!("creating {}", tmp.display()))?;
            f.write_all(&json)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        st.dirty = false;
        tracing::info!(
            entries = st.tokens.len(),
            path = %self.path.display(),
            "snapshot cache saved"
        );
        Ok(true)
    }
}
