//! regwatch — Binary Entrypoint
//! Boots the Axum HTTP server with the scan job runner behind it.

use regwatch::metrics::{debug_routes_enabled, Metrics};
use regwatch::{api, AppState, ScanConfig, DEFAULT_LOG_FILTER};
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact logs by default, JSON lines with `LOG_FORMAT=json`.
/// `RUST_LOG` overrides the default filter.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    // The runtime may already have installed a global subscriber; keep it then.
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = ScanConfig::load_default();
    let state = AppState::from_config(&cfg)?;
    let mut router = api::create_router(state);

    if debug_routes_enabled() {
        match Metrics::init() {
            Ok(m) => router = router.merge(m.router()),
            Err(e) => tracing::warn!(error = %e, "metrics endpoint disabled"),
        }
    }

    Ok(router.into())
}
