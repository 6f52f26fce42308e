// src/ingest/types.rs
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Free-form metadata attached by a collector (e.g. `url`, `authority`).
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A regulatory update exactly as a collector delivered it.
///
/// Enumerated fields (`update_type`, `priority`) and the publish date stay raw
/// text here: the validator has to see bad values to report them. Use
/// [`CandidateRecord::priority_level`] / [`CandidateRecord::update_kind`] for
/// the typed view.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CandidateRecord {
    pub id: String,
    pub title: String,
    pub content: String,
    pub source: String,
    pub region: String,
    pub update_type: String,
    pub priority: String,
    pub published_at: String,
    pub raw_metadata: Metadata,
}

impl CandidateRecord {
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_update_type(mut self, update_type: impl Into<String>) -> Self {
        self.update_type = update_type.into();
        self
    }

    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = priority.into();
        self
    }

    pub fn with_published_at(mut self, published_at: impl Into<String>) -> Self {
        self.published_at = published_at.into();
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.raw_metadata.insert(key.to_string(), value.into());
        self
    }

    /// Issuing authority from metadata, if present and non-blank.
    pub fn authority(&self) -> Option<&str> {
        self.metadata_str("authority")
    }

    /// Source document URL from metadata, if present and non-blank.
    pub fn url(&self) -> Option<&str> {
        self.metadata_str("url")
    }

    /// Typed priority; unknown or missing values degrade to `Low`.
    pub fn priority_level(&self) -> Priority {
        self.priority.parse().unwrap_or_default()
    }

    pub fn update_kind(&self) -> Option<UpdateType> {
        self.update_type.parse().ok()
    }

    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.raw_metadata
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(ParseEnumError {
                kind: "priority",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical update categories. The standardizer maps free text onto these labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    Regulation,
    Guidance,
    Approval,
    Recall,
    SafetyAlert,
    Standard,
    Consultation,
    Legislation,
}

impl UpdateType {
    pub const ALL: [UpdateType; 8] = [
        UpdateType::Regulation,
        UpdateType::Guidance,
        UpdateType::Approval,
        UpdateType::Recall,
        UpdateType::SafetyAlert,
        UpdateType::Standard,
        UpdateType::Consultation,
        UpdateType::Legislation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateType::Regulation => "regulation",
            UpdateType::Guidance => "guidance",
            UpdateType::Approval => "approval",
            UpdateType::Recall => "recall",
            UpdateType::SafetyAlert => "safety_alert",
            UpdateType::Standard => "standard",
            UpdateType::Consultation => "consultation",
            UpdateType::Legislation => "legislation",
        }
    }
}

impl FromStr for UpdateType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        UpdateType::ALL
            .into_iter()
            .find(|t| t.as_str() == key)
            .ok_or_else(|| ParseEnumError {
                kind: "update type",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Produces raw candidate records for one external authority.
#[async_trait::async_trait]
pub trait RecordCollector: Send + Sync {
    async fn fetch_records(&self) -> Result<Vec<CandidateRecord>>;
    fn source_id(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_parse_is_case_insensitive_and_defaults_low() {
        assert_eq!(" HIGH ".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
        let r = CandidateRecord::new("1", "t", "c").with_priority("urgent");
        assert_eq!(r.priority_level(), Priority::Low);
    }

    #[test]
    fn update_type_accepts_spaced_and_dashed_labels() {
        assert_eq!(
            "Safety Alert".parse::<UpdateType>().unwrap(),
            UpdateType::SafetyAlert
        );
        assert_eq!(
            "safety-alert".parse::<UpdateType>().unwrap(),
            UpdateType::SafetyAlert
        );
        assert!("press release".parse::<UpdateType>().is_err());
    }

    #[test]
    fn metadata_accessors_skip_blank_values() {
        let r = CandidateRecord::new("1", "t", "c")
            .with_metadata("authority", "  ")
            .with_metadata("url", "https://www.fda.gov/x");
        assert_eq!(r.authority(), None);
        assert_eq!(r.url(), Some("https://www.fda.gov/x"));
    }

    #[test]
    fn deserializes_camel_case_with_missing_fields() {
        let r: CandidateRecord = serde_json::from_str(
            r#"{"id":"a","title":"T","updateType":"recall","rawMetadata":{"url":"https://x.test"}}"#,
        )
        .unwrap();
        assert_eq!(r.update_kind(), Some(UpdateType::Recall));
        assert_eq!(r.content, "");
        assert_eq!(r.url(), Some("https://x.test"));
    }
}
