//! regwatch binary entrypoint.
//! Loads config, wires the ingestion services and serves the status routes.

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use regwatch::api::{create_router, AppState};
use regwatch::config::PipelineConfig;
use regwatch::ingest::{InMemoryStore, Ingestor, JsonFileCollector};
use regwatch::metrics::Metrics;
use regwatch::sync::SyncCoordinator;

const ENV_FIXTURE_PATH: &str = "REGWATCH_FIXTURE_PATH";
const ENV_FIXTURE_SOURCE: &str = "REGWATCH_FIXTURE_SOURCE";

/// Compact logs by default, JSON lines with LOG_FORMAT=json.
/// A no-op if the runtime already installed a subscriber.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("regwatch=info,warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
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

    let cfg = PipelineConfig::load_default().context("loading pipeline config")?;
    let metrics = Metrics::init(&cfg.cache)?;

    let store = Arc::new(InMemoryStore::new());
    let ingestor = Arc::new(Ingestor::new(store, SyncCoordinator::new(), &cfg));
    ingestor.spawn_cache_sweepers(cfg.cache.sweep_interval());

    // Optional one-off sync from a local fixture, so the status routes have data.
    if let Ok(path) = std::env::var(ENV_FIXTURE_PATH) {
        let source = std::env::var(ENV_FIXTURE_SOURCE).unwrap_or_else(|_| "fixture".into());
        let collector = Arc::new(JsonFileCollector::new(source, path));
        let ing = Arc::clone(&ingestor);
        tokio::spawn(async move {
            if let Err(e) = ing.ingest_source(collector).await {
                tracing::warn!(target: "ingest", error = %e, "fixture sync failed");
            }
        });
    }

    let router = create_router(AppState::new(ingestor)).merge(metrics.router());
    Ok(router.into())
}
