// src/ingest/store.rs
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::ingest::types::CandidateRecord;

/// Persistence for accepted records. Implementations must be safe to call
/// concurrently; the ingestor persists a chunk of records in parallel.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create_record(&self, record: &CandidateRecord) -> Result<()>;
    async fn get_all_records(&self) -> Result<Vec<CandidateRecord>>;
    async fn count_records_by_source(&self, source: &str) -> Result<usize>;
    async fn update_last_sync(&self, source: &str, at: DateTime<Utc>) -> Result<()>;
}

/// Process-local store used by the binary and tests. Ids are unique.
#[derive(Default)]
pub struct InMemoryStore {
    records: Mutex<Vec<CandidateRecord>>,
    last_sync: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_sync(&self, source: &str) -> Option<DateTime<Utc>> {
        lock(&self.last_sync).get(source).copied()
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn create_record(&self, record: &CandidateRecord) -> Result<()> {
        let mut records = lock(&self.records);
        if records.iter().any(|r| r.id == record.id) {
            bail!("record '{}' already stored", record.id);
        }
        records.push(record.clone());
        Ok(())
    }

    async fn get_all_records(&self) -> Result<Vec<CandidateRecord>> {
        Ok(lock(&self.records).clone())
    }

    async fn count_records_by_source(&self, source: &str) -> Result<usize> {
        Ok(lock(&self.records)
            .iter()
            .filter(|r| r.source == source)
            .count())
    }

    async fn update_last_sync(&self, source: &str, at: DateTime<Utc>) -> Result<()> {
        lock(&self.last_sync).insert(source.to_string(), at);
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_duplicate_ids_and_counts_by_source() {
        let store = InMemoryStore::new();
        let a = CandidateRecord::new("1", "t", "c").with_source("fda");
        let b = CandidateRecord::new("2", "t", "c").with_source("ema");
        store.create_record(&a).await.unwrap();
        store.create_record(&b).await.unwrap();
        assert!(store.create_record(&a).await.is_err());

        assert_eq!(store.count_records_by_source("fda").await.unwrap(), 1);
        assert_eq!(store.get_all_records().await.unwrap().len(), 2);

        let at = Utc::now();
        store.update_last_sync("fda", at).await.unwrap();
        assert_eq!(store.last_sync("fda"), Some(at));
        assert_eq!(store.last_sync("ema"), None);
    }
}
