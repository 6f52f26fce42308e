//! Batch quality report.
//!
//! Runs the validator over every record and the duplicate detector once over
//! the batch, then folds both into counts, bounded samples and human-readable
//! recommendations. Each stage is isolated: if one panics the report still
//! renders, with empty results for that stage and a "not available" note.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error};

use crate::config::pipeline::{PipelineConfig, ReportConfig};
use crate::ingest::types::CandidateRecord;
use crate::metrics::ensure_metrics_described;
use crate::quality::duplicates::{
    select_removal_candidates, DuplicateDetector, DuplicateGroup, DuplicateMatch,
};
use crate::quality::validator::{RecordValidator, ValidationResult};

/// Ids listed verbatim in the "failed validation" recommendation.
const MAX_IDS_IN_RECOMMENDATION: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub generated_at: DateTime<Utc>,
    pub total_updates: usize,
    pub valid_updates: usize,
    pub invalid_updates: usize,
    /// Blocking errors summed over all records.
    pub error_count: usize,
    pub warning_count: usize,
    pub average_score: f64,
    /// Distinct records that take part in at least one duplicate match.
    pub duplicate_count: usize,
    pub duplicate_group_count: usize,
    pub duplicate_groups: Vec<DuplicateGroup>,
    pub removal_candidates: Vec<String>,
    pub validation_samples: Vec<ValidationResult>,
    pub duplicate_samples: Vec<DuplicateMatch>,
    pub recommendations: Vec<String>,
}

/// Full, unsampled output of one assessment. The report is the bounded view.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub results: Vec<ValidationResult>,
    pub matches: Vec<DuplicateMatch>,
    pub groups: Vec<DuplicateGroup>,
    pub removal_candidates: Vec<String>,
    pub report: QualityReport,
}

impl Assessment {
    /// Records that passed validation and are not proposed for removal,
    /// in input order. Without validation results nothing is accepted.
    pub fn accepted<'a>(&self, records: &'a [CandidateRecord]) -> Vec<&'a CandidateRecord> {
        let valid: HashSet<&str> = self
            .results
            .iter()
            .filter(|r| r.is_valid)
            .map(|r| r.record_id.as_str())
            .collect();
        let removed: HashSet<&str> = self.removal_candidates.iter().map(String::as_str).collect();
        records
            .iter()
            .filter(|r| valid.contains(r.id.as_str()) && !removed.contains(r.id.as_str()))
            .collect()
    }

    pub fn invalid_ids(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| !r.is_valid)
            .map(|r| r.record_id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct QualityReportBuilder {
    validator: RecordValidator,
    detector: DuplicateDetector,
    cfg: ReportConfig,
}

impl QualityReportBuilder {
    pub fn new(validator: RecordValidator, detector: DuplicateDetector, cfg: ReportConfig) -> Self {
        Self {
            validator,
            detector,
            cfg,
        }
    }

    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self::new(
            RecordValidator::new(cfg.validation.clone()),
            DuplicateDetector::new(cfg.duplicates.clone()),
            cfg.report.clone(),
        )
    }

    pub fn build_report(&self, records: &[CandidateRecord]) -> QualityReport {
        self.assess_at(records, Utc::now()).report
    }

    pub fn assess(&self, records: &[CandidateRecord]) -> Assessment {
        self.assess_at(records, Utc::now())
    }

    pub fn assess_at(&self, records: &[CandidateRecord], now: DateTime<Utc>) -> Assessment {
        ensure_metrics_described();

        let validation = run_stage("validator", || {
            records
                .iter()
                .map(|r| self.validator.validate_at(r, now))
                .collect::<Vec<_>>()
        });
        let dedup = run_stage("duplicate detector", || {
            let matches = self.detector.find_duplicates(records);
            let groups = self.detector.group_duplicates(records, &matches);
            (matches, groups)
        });
        self.fold(records, now, validation, dedup)
    }

    /// Fold stage outputs into an assessment. `None` marks a stage that
    /// failed; its results count as empty.
    fn fold(
        &self,
        records: &[CandidateRecord],
        now: DateTime<Utc>,
        validation: Option<Vec<ValidationResult>>,
        dedup: Option<(Vec<DuplicateMatch>, Vec<DuplicateGroup>)>,
    ) -> Assessment {
        let mut recommendations = Vec::new();
        let validation_ok = validation.is_some();
        let dedup_ok = dedup.is_some();
        let results = validation.unwrap_or_default();
        let (matches, groups) = dedup.unwrap_or_default();
        let removal_candidates = select_removal_candidates(&groups);

        let n = records.len();
        let valid = results.iter().filter(|r| r.is_valid).count();
        let invalid = results.len() - valid;
        let error_count: usize = results.iter().map(|r| r.errors.len()).sum();
        let warning_count: usize = results.iter().map(|r| r.warnings.len()).sum();
        let average_score = if results.is_empty() {
            0.0
        } else {
            results.iter().map(|r| f64::from(r.score)).sum::<f64>() / results.len() as f64
        };
        let duplicate_ids: HashSet<&str> = matches
            .iter()
            .flat_map(|m| [m.record_id.as_str(), m.matched_id.as_str()])
            .collect();
        let duplicate_count = duplicate_ids.len();

        if !validation_ok {
            recommendations.push(
                "Validation results not available for this batch; record validity was not assessed."
                    .to_string(),
            );
        }
        if !dedup_ok {
            recommendations.push(
                "Duplicate detection not available for this batch; no duplicates were flagged."
                    .to_string(),
            );
        }

        if n > 0 && validation_ok {
            if average_score < self.cfg.min_average_score {
                recommendations.push(format!(
                    "Average quality score {average_score:.1} is below the acceptable threshold of {:.0}; review collector field mapping.",
                    self.cfg.min_average_score
                ));
            }
            if invalid > 0 {
                let ids: Vec<&str> = results
                    .iter()
                    .filter(|r| !r.is_valid)
                    .take(MAX_IDS_IN_RECOMMENDATION)
                    .map(|r| r.record_id.as_str())
                    .collect();
                let more = invalid.saturating_sub(ids.len());
                let suffix = if more > 0 {
                    format!(" and {more} more")
                } else {
                    String::new()
                };
                recommendations.push(format!(
                    "{invalid} update(s) failed validation and were held back: {}{suffix}.",
                    ids.join(", ")
                ));
            }
            let valid_ratio = valid as f64 / n as f64;
            if valid_ratio < self.cfg.min_valid_ratio {
                recommendations.push(format!(
                    "Only {:.1}% of updates are valid (target {:.0}%).",
                    valid_ratio * 100.0,
                    self.cfg.min_valid_ratio * 100.0
                ));
            }
        }
        if n > 0 && duplicate_count as f64 > self.cfg.max_duplicate_ratio * n as f64 {
            recommendations.push(format!(
                "High duplicate rate: {duplicate_count} of {n} updates are involved in duplicates; review {} removal candidate(s).",
                removal_candidates.len()
            ));
        }

        counter!("quality_records_total").increment(n as u64);
        counter!("quality_invalid_total").increment(invalid as u64);
        counter!("quality_duplicates_total").increment(duplicate_count as u64);
        debug!(
            target: "quality",
            total = n,
            valid,
            duplicate_count,
            groups = groups.len(),
            "batch assessed"
        );

        let report = QualityReport {
            generated_at: now,
            total_updates: n,
            valid_updates: valid,
            invalid_updates: invalid,
            error_count,
            warning_count,
            average_score,
            duplicate_count,
            duplicate_group_count: groups.len(),
            duplicate_groups: groups.clone(),
            removal_candidates: removal_candidates.clone(),
            validation_samples: results
                .iter()
                .take(self.cfg.max_validation_samples)
                .cloned()
                .collect(),
            duplicate_samples: matches
                .iter()
                .take(self.cfg.max_duplicate_samples)
                .cloned()
                .collect(),
            recommendations,
        };

        Assessment {
            results,
            matches,
            groups,
            removal_candidates,
            report,
        }
    }
}

/// Convenience over a default-configured builder.
pub fn build_report(records: &[CandidateRecord]) -> QualityReport {
    QualityReportBuilder::default().build_report(records)
}

fn run_stage<T>(stage: &'static str, f: impl FnOnce() -> T) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(v) => Some(v),
        Err(_) => {
            error!(target: "quality", stage, "stage panicked; report uses empty results");
            None
        }
    }
}
