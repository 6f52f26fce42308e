// src/ingest/pipeline.rs
//! One sync of one source, end to end:
//!
//! 1. fetch candidate records from the collector
//! 2. standardize every record
//! 3. assess the batch (validation, duplicates, quality report)
//! 4. persist accepted records in fixed-size chunks
//! 5. stamp the source's last sync and keep the report for the status API
//!
//! The whole sequence runs under the [`SyncCoordinator`], so concurrent
//! requests for the same source share one execution.

use anyhow::{Context, Result};
use chrono::Utc;
use futures::future::join_all;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::TtlCache;
use crate::config::{IngestConfig, PipelineConfig};
use crate::ingest::store::RecordStore;
use crate::ingest::types::{CandidateRecord, RecordCollector};
use crate::quality::{fingerprint, standardize_record, QualityReport, QualityReportBuilder};
use crate::sync::{SyncCoordinator, SyncOutcome, SyncRun, SyncState, SyncStats};

const AUDIT_KEY: &str = "store";

/// Record count and sync status for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSnapshot {
    pub source_id: String,
    pub record_count: usize,
    pub state: SyncState,
    pub last_run: Option<SyncRun>,
}

pub struct Ingestor {
    store: Arc<dyn RecordStore>,
    coordinator: SyncCoordinator,
    reports: QualityReportBuilder,
    cfg: IngestConfig,
    latest_reports: Mutex<HashMap<String, QualityReport>>,
    audit_cache: Arc<TtlCache<QualityReport>>,
    source_counts: Arc<TtlCache<usize>>,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn RecordStore>,
        coordinator: SyncCoordinator,
        cfg: &PipelineConfig,
    ) -> Self {
        Self {
            store,
            coordinator,
            reports: QualityReportBuilder::from_config(cfg),
            cfg: cfg.ingest.clone(),
            latest_reports: Mutex::new(HashMap::new()),
            audit_cache: Arc::new(TtlCache::from_config("store_audit", &cfg.cache)),
            source_counts: Arc::new(TtlCache::from_config("source_counts", &cfg.cache)),
        }
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    /// Sync one source. Callers racing on the same source get the same run.
    pub async fn ingest_source(self: &Arc<Self>, collector: Arc<dyn RecordCollector>) -> SyncOutcome {
        let me = Arc::clone(self);
        let source = collector.source_id().to_string();
        self.coordinator
            .run_sync(&source, move || async move { me.process(collector.as_ref()).await })
            .await
    }

    async fn process(&self, collector: &dyn RecordCollector) -> Result<SyncStats> {
        let source = collector.source_id().to_string();
        let raw = collector
            .fetch_records()
            .await
            .with_context(|| format!("fetching records for '{source}'"))?;

        let batch = prepare_batch(&raw);
        let assessment = self.reports.assess(&batch);
        let accepted: Vec<CandidateRecord> = assessment
            .accepted(&batch)
            .into_iter()
            .cloned()
            .collect();
        info!(
            target: "ingest",
            source = %source,
            fetched = raw.len(),
            accepted = accepted.len(),
            rejected = assessment.invalid_ids().len(),
            removal_candidates = assessment.removal_candidates.len(),
            "batch assessed"
        );

        let (created, errors) = self.persist(&accepted).await;

        self.store
            .update_last_sync(&source, Utc::now())
            .await
            .with_context(|| format!("updating last sync for '{source}'"))?;

        lock(&self.latest_reports).insert(source.clone(), assessment.report);
        self.source_counts.delete(&source);
        self.audit_cache.delete(AUDIT_KEY);

        Ok(SyncStats {
            new_items: created,
            processed_items: raw.len() as u64,
            errors,
        })
    }

    /// Persist in chunks: records within a chunk go out concurrently, chunks
    /// are separated by the configured pause. Returns (created, error messages).
    async fn persist(&self, records: &[CandidateRecord]) -> (u64, Vec<String>) {
        let mut created = 0u64;
        let mut errors = Vec::new();
        let chunk_size = self.cfg.chunk_size.max(1);
        for (i, chunk) in records.chunks(chunk_size).enumerate() {
            if i > 0 && !self.cfg.chunk_pause().is_zero() {
                tokio::time::sleep(self.cfg.chunk_pause()).await;
            }
            let results = join_all(chunk.iter().map(|r| self.store.create_record(r))).await;
            for (record, res) in chunk.iter().zip(results) {
                match res {
                    Ok(()) => created += 1,
                    Err(e) => {
                        counter!("ingest_persist_errors_total").increment(1);
                        warn!(
                            target: "ingest",
                            id = %fingerprint(&record.id),
                            error = %e,
                            "persist failed"
                        );
                        errors.push(format!("record '{}': {e:#}", record.id));
                    }
                }
            }
        }
        (created, errors)
    }

    /// Latest batch report for a source, if it has synced in this process.
    pub fn latest_report(&self, source: &str) -> Option<QualityReport> {
        lock(&self.latest_reports).get(source).cloned()
    }

    /// Quality report over everything in the store, cached between syncs.
    pub async fn audit_store(&self) -> Result<QualityReport> {
        self.audit_cache
            .cached(AUDIT_KEY, None, || async {
                let all = self
                    .store
                    .get_all_records()
                    .await
                    .context("loading records for audit")?;
                Ok::<_, anyhow::Error>(self.reports.build_report(&all))
            })
            .await
    }

    pub async fn source_snapshot(&self, source: &str) -> Result<SourceSnapshot> {
        let record_count = self
            .source_counts
            .cached(source, None, || async {
                self.store
                    .count_records_by_source(source)
                    .await
                    .with_context(|| format!("counting records for '{source}'"))
            })
            .await?;
        Ok(SourceSnapshot {
            source_id: source.to_string(),
            record_count,
            state: self.coordinator.state(source),
            last_run: self.coordinator.last_run(source),
        })
    }

    /// Background expiry sweeps for the ingestor's caches.
    pub fn spawn_cache_sweepers(&self, interval: Duration) -> Vec<JoinHandle<()>> {
        vec![
            self.audit_cache.spawn_sweeper(interval),
            self.source_counts.spawn_sweeper(interval),
        ]
    }
}

/// Standardize a raw batch, preserving collector order.
pub fn prepare_batch(records: &[CandidateRecord]) -> Vec<CandidateRecord> {
    records.iter().map(standardize_record).collect()
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::store::InMemoryStore;

    #[test]
    fn prepare_batch_keeps_order_and_standardizes() {
        let raw = vec![
            CandidateRecord::new("2", "  Second   title ", "c").with_region("germany"),
            CandidateRecord::new("1", "First", "c").with_region("France"),
        ];
        let out = prepare_batch(&raw);
        assert_eq!(out[0].id, "2");
        assert_eq!(out[0].title, "Second title");
        assert_eq!(out[0].region, "DE");
        assert_eq!(out[1].region, "FR");
    }

    #[tokio::test]
    async fn persist_reports_rejected_records() {
        let store = Arc::new(InMemoryStore::new());
        let mut cfg = PipelineConfig::default();
        cfg.ingest.chunk_size = 2;
        cfg.ingest.chunk_pause_ms = 0;
        let ing = Ingestor::new(store.clone(), SyncCoordinator::new(), &cfg);

        let recs: Vec<_> = ["a", "b", "a", "c"]
            .iter()
            .map(|id| CandidateRecord::new(*id, "t", "c"))
            .collect();
        let (created, errors) = ing.persist(&recs).await;
        assert_eq!(created, 3);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("'a'"));
        assert_eq!(store.len(), 3);
    }
}
