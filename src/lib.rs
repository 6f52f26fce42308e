// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod cache;
pub mod config;
pub mod ingest;
pub mod metrics;
pub mod quality;
pub mod sync;

pub use crate::api::{create_router, AppState};
pub use crate::cache::TtlCache;
pub use crate::config::PipelineConfig;
pub use crate::ingest::{CandidateRecord, Ingestor, RecordCollector, RecordStore};
pub use crate::quality::{QualityReport, QualityReportBuilder};
pub use crate::sync::{SyncCoordinator, SyncError, SyncRun, SyncStats};
