//! Playlist harvester binary entrypoint.
//! Loads `.env` and the run config, installs tracing, wires Ctrl-C to the
//! shared cancellation token, and maps the run report to an exit status.

use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use playlist_harvester::app;
use playlist_harvester::catalog::Credentials;
use playlist_harvester::config::RunConfig;

const DEFAULT_LOG_FILTER: &str = "playlist_harvester=info,harvest=info,catalog=info,warn";

/// Compact text logs by default; `LOG_FORMAT=json` for structured output.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // No-op when there is no .env file.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = match RunConfig::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = ?e, "invalid configuration");
            return ExitCode::from(2);
        }
    };
    let creds = match Credentials::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "credentials unavailable");
            return ExitCode::from(2);
        }
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, finishing current request");
                cancel.cancel();
            }
        });
    }

    match app::run(&cfg, creds, cancel).await {
        Ok(report) if report.is_complete() => ExitCode::SUCCESS,
        Ok(report) if report.cancelled => ExitCode::from(130),
        Ok(report) => {
            tracing::error!(error = report.fatal.as_deref().unwrap_or_default(), "harvest aborted");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = ?e, "harvest failed");
            ExitCode::FAILURE
        }
    }
}
