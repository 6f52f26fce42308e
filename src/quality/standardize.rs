//! # Standardizer
//!
//! Lookup-table canonicalization of free-text fields:
//!
//! - region names → 2-letter codes (exact, case-insensitive; unknown values pass through)
//! - update types → canonical category labels (first keyword contained wins)
//! - publish dates in assorted formats → RFC 3339 UTC
//! - titles → entities decoded, stray symbols removed, whitespace collapsed
//!
//! Every transformation is idempotent: feeding a standardized value back in
//! yields the same value.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ingest::types::CandidateRecord;

/// Fields the standardizer could canonicalize. `None` means "leave as is".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardizationPatch {
    pub country_code: Option<String>,
    pub normalized_date: Option<String>,
    pub standardized_category: Option<String>,
    pub cleaned_title: Option<String>,
}

impl StandardizationPatch {
    /// Copy of `record` with the patch applied.
    pub fn apply(&self, record: &CandidateRecord) -> CandidateRecord {
        let mut out = record.clone();
        if let Some(v) = &self.country_code {
            out.region = v.clone();
        }
        if let Some(v) = &self.normalized_date {
            out.published_at = v.clone();
        }
        if let Some(v) = &self.standardized_category {
            out.update_type = v.clone();
        }
        if let Some(v) = &self.cleaned_title {
            out.title = v.clone();
        }
        out
    }
}

static COUNTRY_CODES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("united states", "US"),
        ("united states of america", "US"),
        ("usa", "US"),
        ("u.s.", "US"),
        ("america", "US"),
        ("european union", "EU"),
        ("europe", "EU"),
        ("germany", "DE"),
        ("deutschland", "DE"),
        ("france", "FR"),
        ("italy", "IT"),
        ("spain", "ES"),
        ("netherlands", "NL"),
        ("the netherlands", "NL"),
        ("switzerland", "CH"),
        ("austria", "AT"),
        ("belgium", "BE"),
        ("sweden", "SE"),
        ("denmark", "DK"),
        ("ireland", "IE"),
        ("united kingdom", "GB"),
        ("uk", "GB"),
        ("great britain", "GB"),
        ("england", "GB"),
        ("canada", "CA"),
        ("japan", "JP"),
        ("china", "CN"),
        ("south korea", "KR"),
        ("korea", "KR"),
        ("india", "IN"),
        ("australia", "AU"),
        ("new zealand", "NZ"),
        ("brazil", "BR"),
        ("mexico", "MX"),
        ("singapore", "SG"),
    ])
});

/// Keyword → canonical label. Order matters: first contained keyword wins.
/// Every label maps to itself, which keeps the mapping idempotent.
const CATEGORY_KEYWORDS: &[(&str, &str)] = &[
    ("recall", "recall"),
    ("withdraw", "recall"),
    ("safety", "safety_alert"),
    ("warning", "safety_alert"),
    ("alert", "safety_alert"),
    ("guidance", "guidance"),
    ("guideline", "guidance"),
    ("approval", "approval"),
    ("approved", "approval"),
    ("clearance", "approval"),
    ("authoris", "approval"),
    ("authoriz", "approval"),
    ("consultation", "consultation"),
    ("draft", "consultation"),
    ("standard", "standard"),
    ("legislat", "legislation"),
    ("regulation", "regulation"),
    ("regulatory", "regulation"),
    ("directive", "regulation"),
    ("rule", "regulation"),
];

static RE_TITLE_STRIP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s()\-:,.]").expect("title strip regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Compute the patch for one record. Pure; never fails.
pub fn standardize(record: &CandidateRecord) -> StandardizationPatch {
    StandardizationPatch {
        country_code: non_blank(&record.region).map(country_code),
        normalized_date: parse_published(&record.published_at).map(format_date),
        standardized_category: non_blank(&record.update_type).map(standardize_category),
        cleaned_title: non_blank(&record.title).map(clean_title),
    }
}

/// Standardize and apply in one go.
pub fn standardize_record(record: &CandidateRecord) -> CandidateRecord {
    standardize(record).apply(record)
}

pub fn country_code(region: &str) -> String {
    let trimmed = region.trim();
    COUNTRY_CODES
        .get(trimmed.to_lowercase().as_str())
        .map(|c| c.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

pub fn standardize_category(update_type: &str) -> String {
    let lower = update_type.trim().to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(kw, _)| lower.contains(kw))
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| update_type.trim().to_string())
}

pub fn clean_title(title: &str) -> String {
    let decoded = html_escape::decode_html_entities(title);
    let stripped = RE_TITLE_STRIP.replace_all(&decoded, "");
    RE_WS.replace_all(&stripped, " ").trim().to_string()
}

/// Parse the publish dates collectors send us. Date-only forms are midnight UTC.
pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M"];
    for f in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, f) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    const DATE_FORMATS: &[&str] = &[
        "%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y", "%m/%d/%Y", "%d %B %Y", "%B %d, %Y", "%d %b %Y",
        "%b %d, %Y", "%Y%m%d",
    ];
    for f in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, f) {
            return d.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
        }
    }
    None
}

fn format_date(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn non_blank(s: &str) -> Option<&str> {
    let t = s.trim();
    (!t.is_empty()).then_some(t)
}
