// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod app;
pub mod catalog;
pub mod config;
pub mod harvest;
pub mod metrics;
pub mod relevance;
pub mod seeds;

// ---- Re-exports for stable public API ----
pub use crate::catalog::{CatalogApi, CatalogClient, CatalogError, Credentials};
pub use crate::config::RunConfig;
pub use crate::harvest::{HarvestOrigin, HarvestSettings, Harvester, Outputs, RunReport};
pub use crate::relevance::{score_playlist, RelevanceResult};
pub use crate::seeds::{SeedIndex, SeedSet};
