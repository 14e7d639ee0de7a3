// src/app.rs
//! Wiring for one harvest run: config → seeds → outputs → authenticated
//! client → harvester. The snapshot cache is saved however the run ends.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::{build_http, CatalogApi, CatalogClient, Credentials};
use crate::config::RunConfig;
use crate::harvest::{Harvester, Outputs, RunReport};
use crate::metrics::MetricsDump;
use crate::seeds::config::load_seed_set;

pub async fn run(
    cfg: &RunConfig,
    creds: Credentials,
    cancel: CancellationToken,
) -> Result<RunReport> {
    let dump = install_metrics(cfg);

    let http = build_http(cfg.http_timeout())?;
    let client = CatalogClient::connect(http, cfg.client_settings(), creds, cancel.clone())
        .await
        .context("authenticating against the catalog")?;
    info!(api_base = %cfg.api_base, rps = cfg.requests_per_second, "catalog client ready");

    let report = run_with_api(cfg, Arc::new(client), cancel).await;

    if let Some(dump) = dump {
        if let Err(e) = dump.write() {
            warn!(error = ?e, "failed to write metrics");
        }
    }
    report
}

/// Same as [`run`] against an already-built catalog implementation.
pub async fn run_with_api(
    cfg: &RunConfig,
    api: Arc<dyn CatalogApi>,
    cancel: CancellationToken,
) -> Result<RunReport> {
    let seeds = load_seed_set(cfg.seeds_path.as_deref(), cfg.keywords_file.as_deref())?;
    let outputs = Outputs::open(&cfg.snapshot_path, &cfg.playlists_csv, &cfg.tracks_csv)?;
    info!(
        playlists = %cfg.playlists_csv.display(),
        tracks = %cfg.tracks_csv.display(),
        snapshots = outputs.snapshots.len(),
        "outputs opened"
    );

    let harvester = Harvester::new(api, &seeds, cfg.harvest_settings(), outputs.clone(), cancel);
    let report = harvester.run().await;

    outputs
        .snapshots
        .save()
        .context("saving snapshot cache")?;
    Ok(report)
}

fn install_metrics(cfg: &RunConfig) -> Option<MetricsDump> {
    let path = cfg.metrics_path.as_ref()?;
    match MetricsDump::install(path) {
        Ok(d) => Some(d),
        Err(e) => {
            warn!(error = ?e, "metrics disabled");
            None
        }
    }
}
