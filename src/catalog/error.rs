// src/catalog/error.rs
use thiserror::Error;

/// Maximum number of response-body characters kept in an [`CatalogError::Api`].
pub const ERROR_BODY_LIMIT: usize = 512;

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// Non-success, non-retryable HTTP status.
    #[error("{method} {path} returned {status}: {body}")]
    Api {
        method: &'static str,
        path: String,
        status: u16,
        body: String,
    },

    /// No response at all (DNS, connect, reset, timeout).
    #[error("{method} {path} transport error: {source}")]
    Transport {
        method: &'static str,
        path: String,
        #[source]
        source: reqwest::Error,
    },

    /// Response body did not match the expected shape.
    #[error("decoding response of {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Token exchange failed or returned no token.
    #[error("token exchange failed: {0}")]
    Auth(String),

    /// A pagination link that is not a valid absolute URL.
    #[error("invalid url {0}")]
    InvalidUrl(String),

    /// Track listing still had a `next` link after the page cap.
    #[error("{path}: track listing exceeds {pages} pages")]
    TooManyPages { path: String, pages: usize },

    #[error("cancelled")]
    Cancelled,
}

impl CatalogError {
    pub fn api(method: &'static str, path: impl Into<String>, status: u16, body: &str) -> Self {
        Self::Api {
            method,
            path: path.into(),
            status,
            body: truncate_body(body),
        }
    }

    /// Errors that must abort the whole run rather than a single resource:
    /// cancellation, auth failure, and connection-level transport failures.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Cancelled | Self::Auth(_) => true,
            Self::Transport { source, .. } => source.is_connect(),
            Self::Api { .. }
            | Self::Decode { .. }
            | Self::InvalidUrl(_)
            | Self::TooManyPages { .. } => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= ERROR_BODY_LIMIT {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(ERROR_BODY_LIMIT).collect();
    out.push('…');
    out
}
