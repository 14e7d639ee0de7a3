// src/catalog/rate_gate.rs
//! Global admission gate: at most one request per fixed interval, shared by
//! every caller of the access layer.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::error::{CatalogError, CatalogResult};

pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 5.0;

pub struct RateGate {
    interval: Duration,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl RateGate {
    /// Non-positive or non-finite ceilings fall back to [`DEFAULT_REQUESTS_PER_SECOND`].
    pub fn per_second(requests_per_second: f64) -> Self {
        Self::with_interval(interval_for(requests_per_second))
    }

    pub fn with_interval(interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        // Burst of one: admissions are spaced by exactly `interval`.
        let quota =
            Quota::with_period(interval).unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN));
        Self {
            interval,
            limiter: RateLimiter::direct(quota),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for admission, or return [`CatalogError::Cancelled`] as soon as `cancel` fires.
    pub async fn admit(&self, cancel: &CancellationToken) -> CatalogResult<()> {
        if cancel.is_cancelled() {
            return Err(CatalogError::Cancelled);
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(CatalogError::Cancelled),
            _ = self.limiter.until_ready() => Ok(()),
        }
    }
}

pub fn interval_for(requests_per_second: f64) -> Duration {
    let rps = if requests_per_second.is_finite() && requests_per_second > 0.0 {
        requests_per_second
    } else {
        DEFAULT_REQUESTS_PER_SECOND
    };
    Duration::from_secs_f64(1.0 / rps)
}
