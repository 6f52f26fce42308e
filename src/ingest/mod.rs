// src/ingest/mod.rs
//! Collector and storage seams plus the per-source ingestion pipeline.

pub mod fixtures;
pub mod pipeline;
pub mod store;
pub mod types;

pub use fixtures::JsonFileCollector;
pub use pipeline::{prepare_batch, Ingestor, SourceSnapshot};
pub use store::{InMemoryStore, RecordStore};
pub use types::{CandidateRecord, Priority, RecordCollector, UpdateType};
