// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod classify;
pub mod config;
pub mod ingest;
pub mod job;
pub mod metrics;
pub mod orchestrator;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::classify::{ClassificationResult, Classifier, ClassifierError};
pub use crate::config::{ScanConfig, Subject};
pub use crate::ingest::types::{Candidate, SourceKind};
pub use crate::ingest::SourceGateway;
pub use crate::job::{JobResults, JobRunner, JobState, JobStatus, TriggerOutcome};
pub use crate::orchestrator::{Orchestrator, ScanError, ScanReport};
pub use crate::store::{Alert, AlertStore, SeenStore};

/// Log targets used across the crate; the default filter enables all of them at `info`.
pub const DEFAULT_LOG_FILTER: &str = "regwatch=info,scan=info,job=info,classifier=info,store=info,ingest=info,warn";

/// Build the production router from `config/scan.toml` (or `$SCAN_CONFIG_PATH`).
pub fn app() -> anyhow::Result<axum::Router> {
    let cfg = ScanConfig::load_default();
    let state = AppState::from_config(&cfg)?;
    Ok(api::create_router(state))
}
