// src/metrics.rs
//! Counter descriptions and the optional Prometheus text dump written at the
//! end of a run.

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};

pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("catalog_requests_total", "HTTP requests sent to the catalog.");
        describe_counter!(
            "catalog_rate_limited_total",
            "429 responses answered with a backoff."
        );
        describe_counter!(
            "catalog_errors_total",
            "Catalog responses that failed with a status or decode error."
        );
        describe_counter!(
            "harvest_playlists_discovered_total",
            "Playlist ids seen for the first time in this run."
        );
        describe_counter!(
            "harvest_playlists_persisted_total",
            "Playlists written to the playlist sink."
        );
        describe_counter!(
            "harvest_playlists_skipped_total",
            "Playlists skipped, labelled by reason (seen, unchanged, below_threshold)."
        );
        describe_counter!("harvest_tracks_persisted_total", "Track rows written.");
        describe_counter!(
            "harvest_item_errors_total",
            "Per-item fetch or persistence errors, labelled by pass."
        );
        describe_histogram!("harvest_run_ms", "Wall time of a full harvest run in milliseconds.");
        describe_gauge!("harvest_last_run_ts", "Unix ts when the last harvest run finished.");
    });
}

/// Installed Prometheus recorder whose exposition is written to `path` on demand.
pub struct MetricsDump {
    handle: PrometheusHandle,
    path: PathBuf,
}

impl MetricsDump {
    /// Install the global recorder. Fails if another recorder is already installed.
    pub fn install(path: impl Into<PathBuf>) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
        Ok(Self {
            handle,
            path: path.into(),
        })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        fs::write(&self.path, self.render())
            .with_context(|| format!("writing metrics to {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), "metrics written");
        Ok(())
    }
}
