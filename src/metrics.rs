use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::config::CacheConfig;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("sync_runs_total", "Sync runs started, per source.");
        describe_counter!("sync_errors_total", "Sync runs that ended in failure.");
        describe_counter!(
            "sync_joined_total",
            "Sync requests that joined an in-flight run instead of starting one."
        );
        describe_histogram!("sync_duration_ms", "Sync run wall time in milliseconds.");
        describe_counter!(
            "sync_items_processed_total",
            "Records processed by completed sync runs."
        );
        describe_counter!("cache_hits_total", "TTL cache lookups served from memory.");
        describe_counter!("cache_misses_total", "TTL cache lookups that missed or expired.");
        describe_counter!(
            "cache_evictions_total",
            "Entries dropped by capacity eviction or expiry sweeps."
        );
        describe_counter!("quality_records_total", "Records assessed by the quality report.");
        describe_counter!("quality_invalid_total", "Records that failed validation.");
        describe_counter!(
            "quality_duplicates_total",
            "Records involved in at least one duplicate match."
        );
        describe_counter!(
            "ingest_persist_errors_total",
            "Records the store refused to persist."
        );
        describe_gauge!("cache_default_ttl_secs", "Configured default cache TTL.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Fails if one is already installed.
    pub fn init(cache: &CacheConfig) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("installing prometheus recorder")?;

        ensure_metrics_described();
        gauge!("cache_default_ttl_secs").set(cache.default_ttl_secs as f64);

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
