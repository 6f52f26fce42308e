pub mod pipeline;

pub use pipeline::{
    CacheConfig, DuplicateConfig, IngestConfig, PenaltyWeights, PipelineConfig, ReportConfig,
    ValidationConfig,
};
