// src/config/pipeline.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG_PATH: &str = "REGWATCH_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/pipeline.toml";
pub const DEFAULT_JSON_PATH: &str = "config/pipeline.json";

/// Tunables for the cleaning pipeline, cache and ingestion loop.
/// Every field has a default so partial config files are fine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub duplicates: DuplicateConfig,
    pub validation: ValidationConfig,
    pub report: ReportConfig,
    pub cache: CacheConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateConfig {
    /// Title similarity at or above which two records are fuzzy duplicates.
    pub title_threshold: f64,
    /// Content similarity at or above which two records are semantic duplicates.
    pub content_threshold: f64,
    /// Members below this similarity are dropped from a group.
    pub group_min_similarity: f64,
    /// Number of normalized title characters forming a group key.
    pub group_key_len: usize,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            title_threshold: 0.85,
            content_threshold: 0.90,
            group_min_similarity: 0.80,
            group_key_len: 50,
        }
    }
}

/// Score deductions per defect. Each defect is charged at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltyWeights {
    pub missing_title: u32,
    pub missing_content: u32,
    pub missing_source: u32,
    pub missing_authority: u32,
    pub missing_region: u32,
    pub invalid_date: u32,
    pub future_date: u32,
    pub stale_date: u32,
    pub invalid_priority: u32,
    pub invalid_update_type: u32,
    pub invalid_url: u32,
    pub placeholder_text: u32,
    pub repetitive_text: u32,
}

impl Default for PenaltyWeights {
    fn default() -> Self {
        Self {
            missing_title: 20,
            missing_content: 15,
            missing_source: 10,
            missing_authority: 10,
            missing_region: 10,
            invalid_date: 10,
            future_date: 5,
            stale_date: 5,
            invalid_priority: 5,
            invalid_update_type: 5,
            invalid_url: 3,
            placeholder_text: 10,
            repetitive_text: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub min_title_len: usize,
    pub min_content_len: usize,
    /// Publish dates before this year are flagged as implausibly old.
    pub oldest_plausible_year: i32,
    /// Unique-word ratio below which content counts as repetitive.
    pub min_unique_word_ratio: f64,
    /// Repetition is only judged on content with at least this many words.
    pub repetition_min_words: usize,
    pub placeholder_terms: Vec<String>,
    pub penalties: PenaltyWeights,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_title_len: 10,
            min_content_len: 20,
            oldest_plausible_year: 2000,
            min_unique_word_ratio: 0.3,
            repetition_min_words: 20,
            placeholder_terms: ["lorem ipsum", "placeholder", "todo", "coming soon"]
                .into_iter()
                .map(String::from)
                .collect(),
            penalties: PenaltyWeights::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub max_validation_samples: usize,
    pub max_duplicate_samples: usize,
    pub min_average_score: f64,
    pub max_duplicate_ratio: f64,
    pub min_valid_ratio: f64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_validation_samples: 50,
            max_duplicate_samples: 100,
            min_average_score: 70.0,
            max_duplicate_ratio: 0.10,
            min_valid_ratio: 0.95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub default_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            default_ttl_secs: 600,
            sweep_interval_secs: 300,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Records persisted concurrently per chunk.
    pub chunk_size: usize,
    /// Pause between chunks, to stay under storage/API rate limits.
    pub chunk_pause_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 50,
            chunk_pause_ms: 100,
        }
    }
}

impl IngestConfig {
    pub fn chunk_pause(&self) -> Duration {
        Duration::from_millis(self.chunk_pause_ms)
    }
}

impl PipelineConfig {
    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = match ext.as_str() {
            "json" => serde_json::from_str::<PipelineConfig>(&content)
                .with_context(|| format!("parsing JSON config {}", path.display()))?,
            _ => toml::from_str::<PipelineConfig>(&content)
                .with_context(|| format!("parsing TOML config {}", path.display()))?,
        };
        Ok(cfg.sanitized())
    }

    /// Load using env var + fallbacks:
    /// 1) $REGWATCH_CONFIG_PATH
    /// 2) config/pipeline.toml
    /// 3) config/pipeline.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        for candidate in [DEFAULT_TOML_PATH, DEFAULT_JSON_PATH] {
            let p = PathBuf::from(candidate);
            if p.exists() {
                return Self::load_from(&p);
            }
        }
        Ok(Self::default())
    }

    /// Clamp ratios into [0,1] and lift zero sizes to 1.
    pub fn sanitized(mut self) -> Self {
        let d = &mut self.duplicates;
        d.title_threshold = d.title_threshold.clamp(0.0, 1.0);
        d.content_threshold = d.content_threshold.clamp(0.0, 1.0);
        d.group_min_similarity = d.group_min_similarity.clamp(0.0, 1.0);
        d.group_key_len = d.group_key_len.max(1);

        let v = &mut self.validation;
        v.min_unique_word_ratio = v.min_unique_word_ratio.clamp(0.0, 1.0);
        v.placeholder_terms = v
            .placeholder_terms
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        let r = &mut self.report;
        r.max_duplicate_ratio = r.max_duplicate_ratio.clamp(0.0, 1.0);
        r.min_valid_ratio = r.min_valid_ratio.clamp(0.0, 1.0);
        r.min_average_score = r.min_average_score.clamp(0.0, 100.0);

        self.cache.max_entries = self.cache.max_entries.max(1);
        self.cache.sweep_interval_secs = self.cache.sweep_interval_secs.max(1);
        self.ingest.chunk_size = self.ingest.chunk_size.max(1);
        self
    }
}
