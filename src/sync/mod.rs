// src/sync/mod.rs
//! Per-source sync coordination.
//!
//! At most one sync job runs per source. A caller asking for a source that is
//! already syncing awaits the running job and receives its outcome; distinct
//! sources run in parallel. Each completed job (success or failure) leaves a
//! [`SyncRun`] behind, overwriting the previous one for that source.

pub mod memory;
pub mod singleflight;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{info, warn};

use crate::metrics::ensure_metrics_described;
use singleflight::{Aborted, Role, SingleFlight};

/// What a sync job reports back when it finishes without failing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub new_items: u64,
    pub processed_items: u64,
    /// Non-fatal problems (e.g. individual records the store refused).
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRun {
    pub source_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
    pub new_items: u64,
    pub processed_items: u64,
    pub error_count: usize,
    pub errors: Vec<String>,
    pub throughput_per_sec: f64,
    pub memory_delta_mb: f64,
    /// False when the job itself failed.
    pub succeeded: bool,
}

/// A failed sync job. Cloned to every caller that awaited it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("sync for '{}' failed: {}", .run.source_id, .message)]
pub struct SyncError {
    pub message: String,
    pub run: SyncRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Idle,
    Running,
    /// Running, with at least one more caller waiting on the same job.
    Pending,
}

pub type SyncOutcome = Result<SyncRun, SyncError>;

struct Inner {
    flights: SingleFlight<String, SyncOutcome>,
    runs: Mutex<HashMap<String, SyncRun>>,
}

#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl Default for SyncCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncCoordinator {
    pub fn new() -> Self {
        ensure_metrics_described();
        Self {
            inner: Arc::new(Inner {
                flights: SingleFlight::new(),
                runs: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Run `job` for `source_id`, or join the job already running for it.
    /// The job and its bookkeeping run on their own task, so the run is
    /// recorded and the source released even if every caller stops waiting.
    /// A panic inside the job is recorded as a failed run.
    pub async fn run_sync<F, Fut>(&self, source_id: &str, job: F) -> SyncOutcome
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<SyncStats>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let source = source_id.to_string();
        let (outcome, role) = self
            .inner
            .flights
            .run(source.clone(), move || execute(inner, source, job))
            .await;
        if role == Role::Joined {
            counter!("sync_joined_total", "source" => source_id.to_string()).increment(1);
            info!(target: "sync", source = %source_id, "joined in-flight sync");
        }
        outcome.unwrap_or_else(|Aborted(message)| {
            warn!(target: "sync", source = %source_id, error = %message, "sync task aborted");
            let now = Utc::now();
            Err(SyncError {
                run: SyncRun {
                    source_id: source_id.to_string(),
                    start_time: now,
                    end_time: now,
                    duration_ms: 0,
                    new_items: 0,
                    processed_items: 0,
                    error_count: 1,
                    errors: vec![message.clone()],
                    throughput_per_sec: 0.0,
                    memory_delta_mb: 0.0,
                    succeeded: false,
                },
                message,
            })
        })
    }

    pub fn state(&self, source_id: &str) -> SyncState {
        match self.inner.flights.joined(source_id) {
            None => SyncState::Idle,
            Some(0) => SyncState::Running,
            Some(_) => SyncState::Pending,
        }
    }

    pub fn is_syncing(&self, source_id: &str) -> bool {
        self.state(source_id) != SyncState::Idle
    }

    pub fn last_run(&self, source_id: &str) -> Option<SyncRun> {
        lock(&self.inner.runs).get(source_id).cloned()
    }

    /// Latest run per source, ordered by source id.
    pub fn all_runs(&self) -> Vec<SyncRun> {
        let mut runs: Vec<SyncRun> = lock(&self.inner.runs).values().cloned().collect();
        runs.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        runs
    }
}

async fn execute<F, Fut>(inner: Arc<Inner>, source_id: String, job: F) -> SyncOutcome
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<SyncStats>> + Send + 'static,
{
    counter!("sync_runs_total", "source" => source_id.clone()).increment(1);
    info!(target: "sync", source = %source_id, "sync started");

    let start_time = Utc::now();
    let started = Instant::now();
    let mem_before = memory::snapshot().await;

    let result = match tokio::spawn(async move { job().await }).await {
        Ok(Ok(stats)) => Ok(stats),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(join) => Err(format!("sync job aborted: {join}")),
    };

    let elapsed = started.elapsed();
    let memory_delta_mb = memory::delta_mb(mem_before, memory::snapshot().await);
    let (stats, failure) = match result {
        Ok(stats) => (stats, None),
        Err(message) => (
            SyncStats {
                errors: vec![message.clone()],
                ..SyncStats::default()
            },
            Some(message),
        ),
    };

    let secs = elapsed.as_secs_f64();
    let run = SyncRun {
        source_id: source_id.clone(),
        start_time,
        end_time: Utc::now(),
        duration_ms: elapsed.as_millis() as u64,
        new_items: stats.new_items,
        processed_items: stats.processed_items,
        error_count: stats.errors.len(),
        errors: stats.errors,
        throughput_per_sec: if secs > 0.0 {
            stats.processed_items as f64 / secs
        } else {
            0.0
        },
        memory_delta_mb,
        succeeded: failure.is_none(),
    };

    lock(&inner.runs).insert(source_id.clone(), run.clone());
    histogram!("sync_duration_ms", "source" => source_id.clone()).record(run.duration_ms as f64);

    match failure {
        None => {
            counter!("sync_items_processed_total", "source" => source_id.clone())
                .increment(run.processed_items);
            info!(
                target: "sync",
                source = %source_id,
                new_items = run.new_items,
                processed = run.processed_items,
                errors = run.error_count,
                duration_ms = run.duration_ms,
                "sync finished"
            );
            Ok(run)
        }
        Some(message) => {
            counter!("sync_errors_total", "source" => source_id.clone()).increment(1);
            warn!(target: "sync", source = %source_id, error = %message, "sync failed");
            Err(SyncError { message, run })
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
