//! Normalized edit-distance similarity.
//!
//! Both inputs are normalized (lower-cased, everything outside word characters
//! and whitespace stripped, trimmed) and compared with Levenshtein distance:
//!
//! `similarity = (max_len - distance) / max_len`
//!
//! Equal normalized strings short-circuit to 1.0, so the O(n·m) distance is
//! only paid for strings that actually differ. Lengths are counted in chars.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("non-word regex"));

/// Lower-case, drop punctuation/symbols, trim.
pub fn normalize(s: &str) -> String {
    let lower = s.to_lowercase();
    RE_NON_WORD.replace_all(&lower, "").trim().to_string()
}

/// Similarity in [0.0, 1.0] between two raw strings.
pub fn similarity(a: &str, b: &str) -> f64 {
    similarity_normalized(&normalize(a), &normalize(b))
}

/// Same as [`similarity`] for inputs that already went through [`normalize`].
pub fn similarity_normalized(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    let dist = strsim::levenshtein(a, b);
    (max_len.saturating_sub(dist)) as f64 / max_len as f64
}
