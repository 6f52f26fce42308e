// tests/ingest_e2e.rs
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

use regwatch::config::PipelineConfig;
use regwatch::ingest::{
    CandidateRecord, InMemoryStore, Ingestor, JsonFileCollector, RecordCollector, RecordStore,
};
use regwatch::quality::{MatchType, QualityReportBuilder};
use regwatch::sync::SyncCoordinator;

/// Collector double: fixed records, counts fetches, can be told to fail.
struct MockCollector {
    source: String,
    records: Vec<CandidateRecord>,
    fail: bool,
    fetches: Mutex<usize>,
}

impl MockCollector {
    fn new(source: &str, records: Vec<CandidateRecord>) -> Self {
        Self {
            source: source.into(),
            records,
            fail: false,
            fetches: Mutex::new(0),
        }
    }

    fn failing(source: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(source, Vec::new())
        }
    }
}

#[async_trait]
impl RecordCollector for MockCollector {
    async fn fetch_records(&self) -> Result<Vec<CandidateRecord>> {
        *self.fetches.lock() += 1;
        if self.fail {
            return Err(anyhow!("collector offline"));
        }
        Ok(self.records.clone())
    }

    fn source_id(&self) -> &str {
        &self.source
    }
}

fn fast_config() -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.ingest.chunk_size = 2;
    cfg.ingest.chunk_pause_ms = 0;
    cfg
}

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/regulatory_updates.json")
}

fn record(id: &str, title: &str, content: &str) -> CandidateRecord {
    CandidateRecord::new(id, title, content)
        .with_source("fda")
        .with_region("US")
        .with_update_type("guidance")
        .with_priority("medium")
        .with_published_at("2024-01-15")
        .with_metadata("authority", "FDA")
}

fn three_records() -> Vec<CandidateRecord> {
    vec![
        record(
            "1",
            "FDA Issues New Guidance on AI",
            "Draft guidance describing expectations for machine learning enabled devices.",
        ),
        record(
            "2",
            "FDA issue new guidance on AI.",
            "Syndicated summary of the agency's new AI device guidance for manufacturers.",
        ),
        record("3", "", "Body without a headline but otherwise complete."),
    ]
}

#[test]
fn three_record_report() {
    let report = QualityReportBuilder::default().build_report(&three_records());
    assert_eq!(report.total_updates, 3);
    assert_eq!(report.valid_updates, 2);
    assert_eq!(report.duplicate_count, 2);
    // one letter apart: caught by edit distance, not exact equality
    assert!(report
        .duplicate_samples
        .iter()
        .any(|m| m.matched_id == "2" && m.match_type == MatchType::Fuzzy && m.similarity < 1.0));
    assert_eq!(report.removal_candidates, vec!["2".to_string()]);
    assert!(
        report
            .recommendations
            .iter()
            .any(|r| r.contains("failed validation") && r.contains('3')),
        "{:?}",
        report.recommendations
    );
}

#[tokio::test]
async fn sync_persists_only_accepted_records() {
    let store = Arc::new(InMemoryStore::new());
    let ingestor = Arc::new(Ingestor::new(store.clone(), SyncCoordinator::new(), &fast_config()));
    let collector = Arc::new(MockCollector::new("fda", three_records()));

    let run = ingestor.ingest_source(collector.clone()).await.unwrap();
    assert!(run.succeeded);
    assert_eq!(run.processed_items, 3);
    assert_eq!(run.new_items, 1);
    assert_eq!(run.error_count, 0);
    assert_eq!(*collector.fetches.lock(), 1);

    let stored = store.get_all_records().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, "1");
    assert!(store.last_sync("fda").is_some());

    let report = ingestor.latest_report("fda").unwrap();
    assert_eq!(report.invalid_updates, 1);

    // re-syncing the same batch hits the store's duplicate-id guard
    let again = ingestor.ingest_source(collector).await.unwrap();
    assert_eq!(again.new_items, 0);
    assert_eq!(again.error_count, 1);
    assert!(again.errors[0].contains("'1'"));
}

#[tokio::test]
async fn fixture_file_flows_through_standardization() {
    let store = Arc::new(InMemoryStore::new());
    let ingestor = Arc::new(Ingestor::new(store.clone(), SyncCoordinator::new(), &fast_config()));
    let collector = Arc::new(JsonFileCollector::new("fda", fixture_path()));

    let run = ingestor.ingest_source(collector).await.unwrap();
    assert_eq!(run.processed_items, 5);
    assert_eq!(run.new_items, 3);

    let report = ingestor.latest_report("fda").unwrap();
    assert_eq!(report.valid_updates, 4);
    assert_eq!(report.removal_candidates, vec!["fda-002".to_string()]);

    let stored = store.get_all_records().await.unwrap();
    let ids: Vec<&str> = stored.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["fda-001", "fda-003", "fda-005"]);
    assert!(stored.iter().all(|r| r.region == "US"));
    assert_eq!(stored[0].update_type, "recall");
    assert_eq!(stored[0].published_at, "2024-03-05T00:00:00Z");
    assert_eq!(stored[1].title, "Draft guidance: cybersecurity in medical devices");
    assert_eq!(stored[2].update_type, "safety_alert");

    let snapshot = ingestor.source_snapshot("fda").await.unwrap();
    assert_eq!(snapshot.record_count, 3);
    assert_eq!(snapshot.last_run.map(|r| r.new_items), Some(3));

    let audit = ingestor.audit_store().await.unwrap();
    assert_eq!(audit.total_updates, 3);
    assert_eq!(audit.valid_updates, 3);
}

#[tokio::test]
async fn failed_collector_is_recorded_without_touching_store() {
    let store = Arc::new(InMemoryStore::new());
    let ingestor = Arc::new(Ingestor::new(store.clone(), SyncCoordinator::new(), &fast_config()));

    let err = ingestor
        .ingest_source(Arc::new(MockCollector::failing("ema")))
        .await
        .unwrap_err();
    assert!(err.message.contains("collector offline"), "{}", err.message);
    assert!(store.is_empty());
    assert!(store.last_sync("ema").is_none());
    assert!(ingestor.latest_report("ema").is_none());
    assert!(!ingestor.coordinator().last_run("ema").unwrap().succeeded);
}

#[tokio::test]
async fn snapshot_count_refreshes_after_sync() {
    let store = Arc::new(InMemoryStore::new());
    let ingestor = Arc::new(Ingestor::new(store.clone(), SyncCoordinator::new(), &fast_config()));

    assert_eq!(ingestor.source_snapshot("fda").await.unwrap().record_count, 0);
    ingestor
        .ingest_source(Arc::new(MockCollector::new("fda", three_records())))
        .await
        .unwrap();
    assert_eq!(ingestor.source_snapshot("fda").await.unwrap().record_count, 1);
}
