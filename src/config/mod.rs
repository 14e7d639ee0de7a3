// src/config/mod.rs
//! Run configuration: optional TOML file, then `HARVEST_*` / `CATALOG_*` env
//! overrides, then sanitization.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::catalog::client::{ClientSettings, DEFAULT_API_BASE, DEFAULT_AUTH_URL};
use crate::catalog::rate_gate::DEFAULT_REQUESTS_PER_SECOND;
use crate::harvest::snapshot::DEFAULT_SNAPSHOT_PATH;
use crate::harvest::store::{DEFAULT_PLAYLISTS_CSV, DEFAULT_TRACKS_CSV};
use crate::harvest::{
    HarvestSettings, DEFAULT_MAX_BROWSE_PAGES, DEFAULT_MAX_SEARCH_PAGES, DEFAULT_THRESHOLD,
};

pub const ENV_CONFIG_PATH: &str = "HARVEST_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/harvester.toml";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub threshold: f64,
    pub max_search_pages: u32,
    pub max_browse_pages: u32,
    pub requests_per_second: f64,
    pub featured: bool,
    pub categories: bool,
    pub user_ids: Vec<String>,
    pub start_query_index: usize,
    pub country: Option<String>,
    pub playlists_csv: PathBuf,
    pub tracks_csv: PathBuf,
    pub snapshot_path: PathBuf,
    /// Seed override file (TOML or JSON).
    pub seeds_path: Option<PathBuf>,
    /// Plain keyword list, one per line.
    pub keywords_file: Option<PathBuf>,
    /// Prometheus text dump written at the end of the run.
    pub metrics_path: Option<PathBuf>,
    pub api_base: String,
    pub auth_url: String,
    pub http_timeout_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            max_search_pages: DEFAULT_MAX_SEARCH_PAGES,
            max_browse_pages: DEFAULT_MAX_BROWSE_PAGES,
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            featured: true,
            categories: true,
            user_ids: Vec::new(),
            start_query_index: 0,
            country: None,
            playlists_csv: PathBuf::from(DEFAULT_PLAYLISTS_CSV),
            tracks_csv: PathBuf::from(DEFAULT_TRACKS_CSV),
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            seeds_path: None,
            keywords_file: None,
            metrics_path: None,
            api_base: DEFAULT_API_BASE.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl RunConfig {
    /// Resolve the config file, apply process env overrides.
    /// 1) $HARVEST_CONFIG_PATH (must exist)
    /// 2) config/harvester.toml (optional)
    /// 3) built-in defaults
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) if !p.trim().is_empty() => {
                let pb = PathBuf::from(p.trim());
                if !pb.exists() {
                    bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
                }
                Self::from_file(&pb)?
            }
            _ => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_env_from(|name| std::env::var(name).ok())?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading run config from {}", path.display()))?;
        let cfg: RunConfig = toml::from_str(&content)
            .with_context(|| format!("parsing run config {}", path.display()))?;
        Ok(cfg)
    }

    /// Apply overrides from `lookup` (normally the process environment).
    /// Empty values are ignored; malformed values are errors.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = parse_var(&get, "HARVEST_THRESHOLD")? {
            self.threshold = v;
        }
        if let Some(v) = parse_var(&get, "HARVEST_MAX_SEARCH_PAGES")? {
            self.max_search_pages = v;
        }
        if let Some(v) = parse_var(&get, "HARVEST_MAX_BROWSE_PAGES")? {
            self.max_browse_pages = v;
        }
        if let Some(v) = parse_var(&get, "HARVEST_RPS")? {
            self.requests_per_second = v;
        }
        if let Some(v) = get("HARVEST_FEATURED") {
            self.featured = parse_bool("HARVEST_FEATURED", &v)?;
        }
        if let Some(v) = get("HARVEST_CATEGORIES") {
            self.categories = parse_bool("HARVEST_CATEGORIES", &v)?;
        }
        if let Some(v) = get("HARVEST_USER_IDS") {
            self.user_ids = split_list(&v);
        }
        if let Some(v) = parse_var(&get, "HARVEST_START_QUERY")? {
            self.start_query_index = v;
        }
        if let Some(v) = get("HARVEST_COUNTRY") {
            self.country = Some(v);
        }
        if let Some(v) = get("HARVEST_PLAYLISTS_CSV") {
            self.playlists_csv = v.into();
        }
        if let Some(v) = get("HARVEST_TRACKS_CSV") {
            self.tracks_csv = v.into();
        }
        if let Some(v) = get("HARVEST_SNAPSHOT_PATH") {
            self.snapshot_path = v.into();
        }
        if let Some(v) = get("HARVEST_SEEDS_PATH") {
            self.seeds_path = Some(v.into());
        }
        if let Some(v) = get("HARVEST_KEYWORDS_FILE") {
            self.keywords_file = Some(v.into());
        }
        if let Some(v) = get("HARVEST_METRICS_PATH") {
            self.metrics_path = Some(v.into());
        }
        if let Some(v) = get("CATALOG_API_BASE") {
            self.api_base = v;
        }
        if let Some(v) = get("CATALOG_AUTH_URL") {
            self.auth_url = v;
        }
        if let Some(v) = parse_var(&get, "HARVEST_HTTP_TIMEOUT_SECS")? {
            self.http_timeout_secs = v;
        }
        Ok(())
    }

    /// Clamp out-of-range values back to defaults.
    pub fn sanitize(&mut self) {
        if !self.requests_per_second.is_finite() || self.requests_per_second <= 0.0 {
            self.requests_per_second = DEFAULT_REQUESTS_PER_SECOND;
        }
        if !self.threshold.is_finite() {
            self.threshold = DEFAULT_THRESHOLD;
        }
        if self.http_timeout_secs == 0 {
            self.http_timeout_secs = DEFAULT_HTTP_TIMEOUT_SECS;
        }
        self.user_ids.retain(|u| !u.trim().is_empty());
        self.country = self.country.take().filter(|c| !c.trim().is_empty());
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn harvest_settings(&self) -> HarvestSettings {
        HarvestSettings {
            threshold: self.threshold,
            max_search_pages: self.max_search_pages,
            max_browse_pages: self.max_browse_pages,
            featured: self.featured,
            categories: self.categories,
            user_ids: self.user_ids.clone(),
            start_query_index: self.start_query_index,
        }
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            api_base: self.api_base.clone(),
            auth_url: self.auth_url.clone(),
            requests_per_second: self.requests_per_second,
            country: self.country.clone(),
            ..ClientSettings::default()
        }
    }
}

fn parse_var<T, G>(get: &G, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("invalid {name}={raw:?}: {e}")),
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("invalid {name}={raw:?}: expected a boolean")),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
