//! Field-level record validation and quality scoring.
//!
//! Errors block a record (`is_valid == false`); warnings are informational.
//! The score starts at 100 and each detected defect deducts its configured
//! penalty exactly once, floored at 0.

use chrono::{DateTime, Datelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::pipeline::{PenaltyWeights, ValidationConfig};
use crate::ingest::types::{CandidateRecord, Priority, UpdateType};
use crate::quality::standardize::parse_published;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub record_id: String,
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub score: u8,
}

/// Defects the validator can detect. Each maps to one penalty weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Defect {
    Title,
    Content,
    Source,
    Authority,
    Region,
    InvalidDate,
    FutureDate,
    StaleDate,
    Priority,
    UpdateType,
    Url,
    Placeholder,
    Repetitive,
}

impl Defect {
    fn penalty(self, w: &PenaltyWeights) -> u32 {
        match self {
            Defect::Title => w.missing_title,
            Defect::Content => w.missing_content,
            Defect::Source => w.missing_source,
            Defect::Authority => w.missing_authority,
            Defect::Region => w.missing_region,
            Defect::InvalidDate => w.invalid_date,
            Defect::FutureDate => w.future_date,
            Defect::StaleDate => w.stale_date,
            Defect::Priority => w.invalid_priority,
            Defect::UpdateType => w.invalid_update_type,
            Defect::Url => w.invalid_url,
            Defect::Placeholder => w.placeholder_text,
            Defect::Repetitive => w.repetitive_text,
        }
    }
}

#[derive(Default)]
struct Findings {
    errors: Vec<String>,
    warnings: Vec<String>,
    defects: HashSet<Defect>,
}

impl Findings {
    fn error(&mut self, defect: Defect, msg: String) {
        self.defects.insert(defect);
        self.errors.push(msg);
    }

    fn warn(&mut self, defect: Defect, msg: String) {
        self.defects.insert(defect);
        self.warnings.push(msg);
    }
}

#[derive(Debug, Clone)]
pub struct RecordValidator {
    cfg: ValidationConfig,
    placeholder_re: Option<Regex>,
}

impl Default for RecordValidator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

impl RecordValidator {
    pub fn new(cfg: ValidationConfig) -> Self {
        let placeholder_re = build_placeholder_regex(&cfg.placeholder_terms);
        Self {
            cfg,
            placeholder_re,
        }
    }

    pub fn validate(&self, record: &CandidateRecord) -> ValidationResult {
        self.validate_at(record, Utc::now())
    }

    /// Validate against an explicit "now" (publish-date plausibility depends on it).
    pub fn validate_at(&self, record: &CandidateRecord, now: DateTime<Utc>) -> ValidationResult {
        let mut f = Findings::default();

        self.check_text_fields(record, &mut f);
        check_enums(record, &mut f);
        self.check_published(record, now, &mut f);
        check_url(record, &mut f);
        self.check_placeholder(record, &mut f);
        self.check_repetition(record, &mut f);

        let deducted: u32 = f
            .defects
            .iter()
            .map(|d| d.penalty(&self.cfg.penalties))
            .sum();
        let score = 100u32.saturating_sub(deducted) as u8;

        ValidationResult {
            record_id: record.id.clone(),
            is_valid: f.errors.is_empty(),
            errors: f.errors,
            warnings: f.warnings,
            score,
        }
    }

    fn check_text_fields(&self, r: &CandidateRecord, f: &mut Findings) {
        let title_len = r.title.trim().chars().count();
        if title_len == 0 {
            f.error(Defect::Title, "missing title".into());
        } else if title_len < self.cfg.min_title_len {
            f.error(
                Defect::Title,
                format!("title too short ({title_len} < {} chars)", self.cfg.min_title_len),
            );
        }

        let content_len = r.content.trim().chars().count();
        if content_len == 0 {
            f.error(Defect::Content, "missing content".into());
        } else if content_len < self.cfg.min_content_len {
            f.error(
                Defect::Content,
                format!(
                    "content too short ({content_len} < {} chars)",
                    self.cfg.min_content_len
                ),
            );
        }

        if r.source.trim().is_empty() {
            f.error(Defect::Source, "missing source".into());
        }
        if r.region.trim().is_empty() {
            f.error(Defect::Region, "missing region".into());
        }
        if r.authority().is_none() {
            f.warn(Defect::Authority, "missing authority".into());
        }
    }

    fn check_published(&self, r: &CandidateRecord, now: DateTime<Utc>, f: &mut Findings) {
        let Some(published) = parse_published(&r.published_at) else {
            f.warn(
                Defect::InvalidDate,
                format!("invalid publish date '{}'", r.published_at.trim()),
            );
            return;
        };
        if published > now {
            f.warn(Defect::FutureDate, format!("publish date {published} is in the future"));
        } else if published.year() < self.cfg.oldest_plausible_year {
            f.warn(
                Defect::StaleDate,
                format!(
                    "publish date {published} predates {}",
                    self.cfg.oldest_plausible_year
                ),
            );
        }
    }

    fn check_placeholder(&self, r: &CandidateRecord, f: &mut Findings) {
        let Some(re) = &self.placeholder_re else {
            return;
        };
        let hit = re
            .find(&r.title)
            .or_else(|| re.find(&r.content))
            .map(|m| m.as_str().to_lowercase());
        if let Some(term) = hit {
            f.warn(Defect::Placeholder, format!("placeholder text detected ('{term}')"));
        }
    }

    fn check_repetition(&self, r: &CandidateRecord, f: &mut Findings) {
        let words: Vec<String> = r.content.split_whitespace().map(str::to_lowercase).collect();
        if words.len() < self.cfg.repetition_min_words {
            return;
        }
        let unique = words.iter().collect::<HashSet<_>>().len();
        let ratio = unique as f64 / words.len() as f64;
        if ratio < self.cfg.min_unique_word_ratio {
            f.warn(
                Defect::Repetitive,
                format!("highly repetitive content (unique word ratio {ratio:.2})"),
            );
        }
    }
}

fn check_enums(r: &CandidateRecord, f: &mut Findings) {
    if let Err(e) = r.update_type.parse::<UpdateType>() {
        f.error(Defect::UpdateType, format!("invalid update type: {e}"));
    }
    if let Err(e) = r.priority.parse::<Priority>() {
        f.error(Defect::Priority, format!("invalid priority: {e}"));
    }
}

fn check_url(r: &CandidateRecord, f: &mut Findings) {
    let Some(raw) = r.url() else {
        return;
    };
    let ok = url::Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host().is_some())
        .unwrap_or(false);
    if !ok {
        f.warn(Defect::Url, format!("malformed metadata URL '{raw}'"));
    }
}

fn build_placeholder_regex(terms: &[String]) -> Option<Regex> {
    static WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));
    let alts: Vec<String> = terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| WS.replace_all(&regex::escape(t), r"\s+").into_owned())
        .collect();
    if alts.is_empty() {
        return None;
    }
    match Regex::new(&format!(r"(?i)\b(?:{})\b", alts.join("|"))) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(target: "quality", error = %e, "placeholder terms did not compile");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn good() -> CandidateRecord {
        CandidateRecord::new(
            "r1",
            "FDA issues final guidance on AI-enabled devices",
            "The guidance describes lifecycle expectations for machine learning enabled device software.",
        )
        .with_source("FDA")
        .with_region("US")
        .with_update_type("guidance")
        .with_priority("high")
        .with_published_at("2025-05-20")
        .with_metadata("authority", "FDA")
        .with_metadata("url", "https://www.fda.gov/guidance/ai-devices")
    }

    fn check(r: &CandidateRecord) -> ValidationResult {
        RecordValidator::default().validate_at(r, now())
    }

    #[test]
    fn clean_record_scores_full() {
        let v = check(&good());
        assert!(v.is_valid, "{v:?}");
        assert!(v.errors.is_empty() && v.warnings.is_empty(), "{v:?}");
        assert_eq!(v.score, 100);
    }

    #[test]
    fn empty_title_blocks_and_costs_twenty() {
        let mut r = good();
        r.title.clear();
        r.content = "adequate content here".into();
        let v = check(&r);
        assert!(!v.is_valid);
        assert!(v.errors.iter().any(|e| e.contains("title")));
        assert!(v.score <= 80);
        assert_eq!(v.score, 80);
    }

    #[test]
    fn short_title_is_one_defect_not_two() {
        let mut r = good();
        r.title = "Recall".into();
        let v = check(&r);
        assert_eq!(v.errors.len(), 1);
        assert_eq!(v.score, 80);
    }

    #[test]
    fn bad_enums_are_blocking() {
        let r = good().with_update_type("press release").with_priority("urgent");
        let v = check(&r);
        assert!(!v.is_valid);
        assert_eq!(v.errors.len(), 2);
        assert_eq!(v.score, 90);
    }

    #[test]
    fn warnings_do_not_block() {
        let mut r = good()
            .with_published_at("2031-01-01")
            .with_metadata("url", "not a url");
        r.raw_metadata.remove("authority");
        let v = check(&r);
        assert!(v.is_valid);
        assert_eq!(v.warnings.len(), 3);
        assert_eq!(v.score, 100 - 5 - 3 - 10);
    }

    #[test]
    fn date_rules() {
        let v = check(&good().with_published_at("sometime last week"));
        assert_eq!(v.score, 90);
        let v = check(&good().with_published_at("1998-03-01"));
        assert_eq!(v.score, 95);
        let v = check(&good().with_published_at(""));
        assert!(v.warnings[0].contains("invalid publish date"));
    }

    #[test]
    fn placeholder_matches_whole_words_only() {
        let mut r = good();
        r.content = "Coming  soon: details of the consultation will follow shortly.".into();
        let v = check(&r);
        assert_eq!(v.score, 90);

        // "todos" is not "todo"
        let mut r = good();
        r.content = "Agency todos were published in the annual work programme.".into();
        assert_eq!(check(&r).score, 100);
    }

    #[test]
    fn repetitive_content_is_flagged() {
        let mut r = good();
        r.content = "recall recall recall device ".repeat(6);
        let v = check(&r);
        assert!(v.warnings.iter().any(|w| w.contains("repetitive")));
        assert_eq!(v.score, 95);
    }

    #[test]
    fn score_never_increases_as_defects_accumulate() {
        let base = good();
        type Step = Box<dyn Fn(&mut CandidateRecord)>;
        let steps: Vec<Step> = vec![
            Box::new(|r: &mut CandidateRecord| r.title.clear()),
            Box::new(|r: &mut CandidateRecord| r.content.clear()),
            Box::new(|r: &mut CandidateRecord| r.source.clear()),
            Box::new(|r: &mut CandidateRecord| r.region.clear()),
            Box::new(|r: &mut CandidateRecord| {
                r.raw_metadata.remove("authority");
            }),
            Box::new(|r: &mut CandidateRecord| r.published_at = "garbage".into()),
            Box::new(|r: &mut CandidateRecord| r.priority = "??".into()),
            Box::new(|r: &mut CandidateRecord| r.update_type = "??".into()),
            Box::new(|r: &mut CandidateRecord| {
                r.raw_metadata.insert("url".into(), "ftp:/broken".into());
            }),
            // still too short, now also placeholder text
            Box::new(|r: &mut CandidateRecord| r.content = "lorem ipsum".into()),
        ];
        let mut r = base;
        let mut last = check(&r).score;
        for step in steps {
            step(&mut r);
            let s = check(&r).score;
            assert!(s <= last, "score rose from {last} to {s}");
            last = s;
        }
        // a second placeholder hit is the same defect
        r.title = "todo".into();
        assert_eq!(check(&r).score, last);
        assert_eq!(last, 2);
    }
}
