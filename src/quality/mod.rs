//! Cleaning stages applied to every batch of candidate records before it is
//! persisted: similarity scoring, duplicate detection, validation,
//! standardization and the batch quality report.

pub mod duplicates;
pub mod report;
pub mod similarity;
pub mod standardize;
pub mod validator;

pub use duplicates::{
    select_removal_candidates, DuplicateDetector, DuplicateGroup, DuplicateMatch, MatchType,
};
pub use report::{Assessment, QualityReport, QualityReportBuilder};
pub use similarity::similarity;
pub use standardize::{standardize, standardize_record, StandardizationPatch};
pub use validator::{RecordValidator, ValidationResult};

/// Short stable hash for log lines. Titles and ids go to logs hashed, never raw.
pub(crate) fn fingerprint(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::fingerprint;

    #[test]
    fn fingerprint_is_short_and_stable() {
        let a = fingerprint("FDA issues guidance");
        assert_eq!(a.len(), 12);
        assert_eq!(a, fingerprint("FDA issues guidance"));
        assert_ne!(a, fingerprint("FDA issues guidance."));
    }
}
