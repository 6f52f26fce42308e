//! Batch duplicate detection, grouping and removal-candidate selection.
//!
//! Detection is a pairwise scan, O(n²) in batch size. Batches are expected in
//! the low hundreds per sync; beyond a few thousand records this becomes the
//! bottleneck and needs blocking/bucketing first.
//!
//! Pass order per pair:
//! 1. exact normalized title → `Exact`
//! 2. title similarity ≥ `title_threshold` → `Fuzzy`
//! 3. independently, content similarity ≥ `content_threshold` → `Semantic`
//!
//! The first record of a cluster (lowest index) is the anchor; it is emitted as
//! a self-referential `Exact` entry ahead of its matches.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::config::pipeline::DuplicateConfig;
use crate::ingest::types::CandidateRecord;
use crate::quality::fingerprint;
use crate::quality::similarity::{normalize, similarity_normalized};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Fuzzy,
    Semantic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateMatch {
    /// Anchor of the cluster this match belongs to.
    pub record_id: String,
    pub matched_id: String,
    pub similarity: f64,
    pub match_type: MatchType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup {
    /// First `group_key_len` normalized characters of the anchor title.
    pub key: String,
    pub anchor_id: String,
    /// Distinct member ids, anchor first.
    pub member_ids: Vec<String>,
    /// Worst-case similarity of any non-anchor member.
    pub confidence: f64,
}

#[derive(Debug, Clone, Default)]
pub struct DuplicateDetector {
    cfg: DuplicateConfig,
}

impl DuplicateDetector {
    pub fn new(cfg: DuplicateConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &DuplicateConfig {
        &self.cfg
    }

    pub fn find_duplicates(&self, records: &[CandidateRecord]) -> Vec<DuplicateMatch> {
        let titles: Vec<String> = records.iter().map(|r| normalize(&r.title)).collect();
        let contents: Vec<String> = records.iter().map(|r| normalize(&r.content)).collect();
        let n = records.len();

        let mut processed = vec![false; n];
        let mut out = Vec::new();

        for i in 0..n {
            if processed[i] {
                continue;
            }
            processed[i] = true;

            let mut found = Vec::new();
            for j in (i + 1)..n {
                if processed[j] {
                    continue;
                }
                let before = found.len();

                if let Some((sim, kind)) = self.title_match(&titles[i], &titles[j]) {
                    found.push(DuplicateMatch {
                        record_id: records[i].id.clone(),
                        matched_id: records[j].id.clone(),
                        similarity: sim,
                        match_type: kind,
                    });
                }

                if let Some(sim) =
                    threshold_similarity(&contents[i], &contents[j], self.cfg.content_threshold)
                {
                    found.push(DuplicateMatch {
                        record_id: records[i].id.clone(),
                        matched_id: records[j].id.clone(),
                        similarity: sim,
                        match_type: MatchType::Semantic,
                    });
                }

                if found.len() > before {
                    processed[j] = true;
                }
            }

            if !found.is_empty() {
                tracing::debug!(
                    target: "quality",
                    anchor = %records[i].id,
                    title = %fingerprint(&records[i].title),
                    matches = found.len(),
                    "duplicate cluster"
                );
                out.push(DuplicateMatch {
                    record_id: records[i].id.clone(),
                    matched_id: records[i].id.clone(),
                    similarity: 1.0,
                    match_type: MatchType::Exact,
                });
                out.append(&mut found);
            }
        }

        out
    }

    fn title_match(&self, a: &str, b: &str) -> Option<(f64, MatchType)> {
        // Blank titles carry no identity; two of them are not duplicates.
        if a.is_empty() || b.is_empty() {
            return None;
        }
        if a == b {
            return Some((1.0, MatchType::Exact));
        }
        threshold_similarity(a, b, self.cfg.title_threshold).map(|s| (s, MatchType::Fuzzy))
    }

    /// Cluster matches by the anchor's normalized-title key.
    ///
    /// Distinct anchors whose titles share the same key prefix end up in one
    /// group under the first anchor. A member's similarity is its best match
    /// against any other member; members below `group_min_similarity` are
    /// left out.
    pub fn group_duplicates(
        &self,
        records: &[CandidateRecord],
        matches: &[DuplicateMatch],
    ) -> Vec<DuplicateGroup> {
        let titles: HashMap<&str, &str> = records
            .iter()
            .map(|r| (r.id.as_str(), r.title.as_str()))
            .collect();
        let title_of = |id: &str| titles.get(id).copied().unwrap_or_default();

        let mut order: Vec<String> = Vec::new();
        let mut accs: HashMap<String, GroupAcc> = HashMap::new();

        for m in matches {
            let key: String = normalize(title_of(&m.record_id))
                .chars()
                .take(self.cfg.group_key_len)
                .collect();
            let acc = accs.entry(key.clone()).or_insert_with(|| {
                order.push(key.clone());
                GroupAcc::new(m.record_id.clone())
            });

            if m.matched_id == m.record_id {
                continue;
            }
            if m.record_id != acc.anchor_id {
                acc.observe(&m.record_id, m.similarity);
            }
            if m.matched_id != acc.anchor_id {
                acc.observe(&m.matched_id, m.similarity);
            }
        }

        order
            .into_iter()
            .filter_map(|key| {
                let acc = accs.remove(&key)?;
                acc.finish(key, self.cfg.group_min_similarity)
            })
            .collect()
    }
}

/// Similarity if it can reach `threshold`, skipping the distance computation
/// when the length ratio alone rules it out (`sim ≤ min_len / max_len`).
fn threshold_similarity(a: &str, b: &str, threshold: f64) -> Option<f64> {
    if a.is_empty() || b.is_empty() {
        return None;
    }
    let (la, lb) = (a.chars().count(), b.chars().count());
    let bound = la.min(lb) as f64 / la.max(lb) as f64;
    if bound < threshold {
        return None;
    }
    let sim = similarity_normalized(a, b);
    (sim >= threshold).then_some(sim)
}

struct GroupAcc {
    anchor_id: String,
    members: Vec<String>,
    best: HashMap<String, f64>,
}

impl GroupAcc {
    fn new(anchor_id: String) -> Self {
        Self {
            members: vec![anchor_id.clone()],
            anchor_id,
            best: HashMap::new(),
        }
    }

    fn observe(&mut self, id: &str, sim: f64) {
        match self.best.get_mut(id) {
            Some(best) => *best = best.max(sim),
            None => {
                self.members.push(id.to_string());
                self.best.insert(id.to_string(), sim);
            }
        }
    }

    fn finish(self, key: String, min_similarity: f64) -> Option<DuplicateGroup> {
        let GroupAcc {
            anchor_id,
            members,
            best,
        } = self;

        let members: Vec<String> = members
            .into_iter()
            .filter(|id| *id == anchor_id || best.get(id).is_some_and(|s| *s >= min_similarity))
            .collect();
        if members.len() < 2 {
            return None;
        }

        let confidence = members
            .iter()
            .filter_map(|id| best.get(id))
            .copied()
            .fold(1.0_f64, f64::min);

        Some(DuplicateGroup {
            key,
            anchor_id,
            member_ids: members,
            confidence,
        })
    }
}

/// Convenience wrapper with default settings and an explicit title threshold.
pub fn find_duplicates(records: &[CandidateRecord], threshold: f64) -> Vec<DuplicateMatch> {
    DuplicateDetector::new(DuplicateConfig {
        title_threshold: threshold,
        ..DuplicateConfig::default()
    })
    .find_duplicates(records)
}

/// Everything but each group's anchor, deduplicated, in group order.
/// Anchors are never proposed, even if they show up inside another group.
pub fn select_removal_candidates(groups: &[DuplicateGroup]) -> Vec<String> {
    let anchors: HashSet<&str> = groups.iter().map(|g| g.anchor_id.as_str()).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    groups
        .iter()
        .flat_map(|g| g.member_ids.iter())
        .filter(|id| !anchors.contains(id.as_str()) && seen.insert(id.as_str()))
        .cloned()
        .collect()
}
