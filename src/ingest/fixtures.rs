// src/ingest/fixtures.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;

use crate::ingest::types::{CandidateRecord, RecordCollector};

/// Collector that replays a JSON array of candidate records from disk.
/// Used for local runs (`REGWATCH_FIXTURE_PATH`) and tests.
pub struct JsonFileCollector {
    source_id: String,
    path: PathBuf,
}

impl JsonFileCollector {
    pub fn new(source_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            source_id: source_id.into(),
            path: path.into(),
        }
    }

    /// Parse records from an in-memory JSON document.
    pub fn parse(json: &str) -> Result<Vec<CandidateRecord>> {
        serde_json::from_str(json).context("parsing candidate records")
    }
}

#[async_trait]
impl RecordCollector for JsonFileCollector {
    async fn fetch_records(&self) -> Result<Vec<CandidateRecord>> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading fixture {}", self.path.display()))?;
        Self::parse(&raw).with_context(|| format!("fixture {}", self.path.display()))
    }

    fn source_id(&self) -> &str {
        &self.source_id
    }
}
