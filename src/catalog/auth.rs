// src/catalog/auth.rs
//! Client-credentials token exchange.

use anyhow::anyhow;
use std::fmt;
use tokio_util::sync::CancellationToken;

use super::error::{CatalogError, CatalogResult};
use super::types::TokenResponse;

pub const ENV_CLIENT_ID: &str = "CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "CLIENT_SECRET";

#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Read `CLIENT_ID` / `CLIENT_SECRET`; both must be non-empty.
    pub fn from_env() -> anyhow::Result<Self> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| anyhow!("missing {name} env var"))
        };
        Ok(Self::new(read(ENV_CLIENT_ID)?, read(ENV_CLIENT_SECRET)?))
    }
}

// Never print the secret.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret_len", &self.client_secret.len())
            .finish()
    }
}

/// Exchange client id/secret for a bearer token.
pub async fn exchange_token(
    http: &reqwest::Client,
    auth_url: &str,
    creds: &Credentials,
    cancel: &CancellationToken,
) -> CatalogResult<String> {
    let request = http
        .post(auth_url)
        .basic_auth(&creds.client_id, Some(&creds.client_secret))
        .form(&[("grant_type", "client_credentials")])
        .send();

    let resp = tokio::select! {
        _ = cancel.cancelled() => return Err(CatalogError::Cancelled),
        r = request => r.map_err(|e| CatalogError::Auth(format!("POST {auth_url}: {e}")))?,
    };

    let status = resp.status();
    let body = tokio::select! {
        _ = cancel.cancelled() => return Err(CatalogError::Cancelled),
        r = resp.text() => {
            r.map_err(|e| CatalogError::Auth(format!("reading token response: {e}")))?
        }
    };
    if !status.is_success() {
        return Err(CatalogError::Auth(format!(
            "POST {auth_url} returned {}: {}",
            status.as_u16(),
            body.chars().take(200).collect::<String>()
        )));
    }

    let token: TokenResponse = serde_json::from_str(&body)
        .map_err(|e| CatalogError::Auth(format!("token response without access_token: {e}")))?;
    if token.access_token.trim().is_empty() {
        return Err(CatalogError::Auth("empty access_token".into()));
    }
    tracing::debug!(target: "catalog", "bearer token acquired");
    Ok(token.access_token)
}
