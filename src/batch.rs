//! Document-level pattern analysis.
//!
//! Looks across a whole reference list after classification. A document
//! where most references came back `NOT_FOUND`/`SUSPICIOUS` but none came
//! back `DEFINITE_FAKE` usually means the extraction mangled the text
//! (column breaks, hanging indents), not that the author invented 15 papers
//! at once. Fabrication leaves fakes; broken parsing leaves absences.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::cascade::{RecordStatus, Tier, VerificationRecord};

/// Threshold above which a fake-free failure pile is treated as a parsing
/// problem rather than a fraud signal.
const SYSTEMIC_FAILURE_RATE: f64 = 0.70;

/// Overall document integrity rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Integrity {
    High,
    Moderate,
    Low,
    Critical,
}

/// Aggregate view of one verified document.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    /// Classified references (excludes incomplete ones).
    pub total: usize,
    /// References whose verification did not complete this run.
    pub incomplete: usize,
    pub tier_counts: BTreeMap<&'static str, usize>,
    /// `(NOT_FOUND + SUSPICIOUS) / total`.
    pub failure_rate: f64,
    pub systemic_failure: bool,
    /// Present when `systemic_failure` is set; the recommended remedy.
    pub systemic_reason: Option<String>,
    pub integrity: Integrity,
}

fn tier_name(tier: Tier) -> &'static str {
    match tier {
        Tier::Verified => "VERIFIED",
        Tier::VerifiedLegacyDoi => "VERIFIED_LEGACY_DOI",
        Tier::GreyLiterature => "GREY_LITERATURE",
        Tier::LowQualitySource => "LOW_QUALITY_SOURCE",
        Tier::Suspicious => "SUSPICIOUS",
        Tier::NotFound => "NOT_FOUND",
        Tier::DefiniteFake => "DEFINITE_FAKE",
        Tier::LikelyValid => "LIKELY_VALID",
    }
}

/// Summarize a complete set of verification records.
pub fn summarize(records: &[VerificationRecord]) -> BatchSummary {
    let mut tier_counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut incomplete = 0usize;

    for record in records {
        match record.status {
            RecordStatus::Classified(tier) => {
                *tier_counts.entry(tier_name(tier)).or_insert(0) += 1;
            }
            RecordStatus::Incomplete => incomplete += 1,
        }
    }

    let total: usize = tier_counts.values().sum();
    let count = |tier: Tier| tier_counts.get(tier_name(tier)).copied().unwrap_or(0);

    let failures = count(Tier::NotFound) + count(Tier::Suspicious);
    let fakes = count(Tier::DefiniteFake);
    let failure_rate = if total > 0 {
        failures as f64 / total as f64
    } else {
        0.0
    };

    let systemic_failure = total > 0 && failure_rate >= SYSTEMIC_FAILURE_RATE && fakes == 0;
    let systemic_reason = systemic_failure.then(|| {
        format!(
            "{failures} of {total} references unresolved with no definite fakes; \
             re-extract source text — likely layout/column-break parsing issue"
        )
    });

    let sound =
        count(Tier::Verified) + count(Tier::VerifiedLegacyDoi) + count(Tier::GreyLiterature);
    let sound_rate = if total > 0 {
        sound as f64 / total as f64
    } else {
        1.0
    };

    let mut integrity = if fakes > 0 || sound_rate < 0.40 {
        Integrity::Critical
    } else if sound_rate >= 0.90 {
        Integrity::High
    } else if sound_rate >= 0.70 {
        Integrity::Moderate
    } else {
        Integrity::Low
    };
    // A parsing problem is not an integrity problem; hold back the alarm.
    if systemic_failure && integrity == Integrity::Critical {
        integrity = Integrity::Low;
    }

    BatchSummary {
        total,
        incomplete,
        tier_counts,
        failure_rate,
        systemic_failure,
        systemic_reason,
        integrity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Reference;
    use crate::cascade::Action;

    fn record_with(status: RecordStatus) -> VerificationRecord {
        VerificationRecord {
            reference: Reference::from_raw(
                "Smith, J. (2020). A perfectly ordinary test citation. Journal of Tests, 1(1), 1-10.",
                0,
            ),
            status,
            confidence: 50,
            title_similarity: None,
            author_overlap: None,
            year_delta: None,
            matched: None,
            action: Action::Keep,
            rationale: vec!["test".into()],
            manual_check_links: vec![],
            transient_failures: vec![],
        }
    }

    fn classified(tier: Tier, n: usize) -> Vec<VerificationRecord> {
        (0..n)
            .map(|_| record_with(RecordStatus::Classified(tier)))
            .collect()
    }

    #[test]
    fn clean_document_rates_high() {
        let mut records = classified(Tier::Verified, 18);
        records.extend(classified(Tier::GreyLiterature, 2));
        let summary = summarize(&records);
        assert_eq!(summary.integrity, Integrity::High);
        assert!(!summary.systemic_failure);
        assert_eq!(summary.failure_rate, 0.0);
    }

    #[test]
    fn high_failure_without_fakes_flags_systemic_issue() {
        // 15 of 20 unresolved, zero fakes: extraction broke, not the author.
        let mut records = classified(Tier::NotFound, 10);
        records.extend(classified(Tier::Suspicious, 5));
        records.extend(classified(Tier::Verified, 5));
        let summary = summarize(&records);
        assert!(summary.failure_rate >= 0.70);
        assert!(summary.systemic_failure);
        assert!(summary.systemic_reason.as_deref().unwrap().contains("re-extract"));
        assert_ne!(summary.integrity, Integrity::Critical);
    }

    #[test]
    fn single_fake_defeats_systemic_excuse() {
        let mut records = classified(Tier::NotFound, 15);
        records.extend(classified(Tier::DefiniteFake, 1));
        records.extend(classified(Tier::Verified, 4));
        let summary = summarize(&records);
        assert!(!summary.systemic_failure);
        assert_eq!(summary.integrity, Integrity::Critical);
    }

    #[test]
    fn any_fake_is_critical_even_when_mostly_verified() {
        let mut records = classified(Tier::Verified, 19);
        records.extend(classified(Tier::DefiniteFake, 1));
        let summary = summarize(&records);
        assert_eq!(summary.integrity, Integrity::Critical);
    }

    #[test]
    fn moderate_band() {
        let mut records = classified(Tier::Verified, 15);
        records.extend(classified(Tier::NotFound, 5));
        let summary = summarize(&records);
        assert_eq!(summary.integrity, Integrity::Moderate);
    }

    #[test]
    fn incomplete_records_counted_separately() {
        let mut records = classified(Tier::Verified, 3);
        records.push(record_with(RecordStatus::Incomplete));
        let summary = summarize(&records);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.incomplete, 1);
        assert_eq!(summary.integrity, Integrity::High);
    }

    #[test]
    fn eighty_five_percent_failure_rate_sets_flag() {
        let mut records = classified(Tier::NotFound, 17);
        records.extend(classified(Tier::Verified, 3));
        let summary = summarize(&records);
        assert!((summary.failure_rate - 0.85).abs() < 1e-9);
        assert!(summary.systemic_failure);
    }

    #[test]
    fn empty_document_is_benign() {
        let summary = summarize(&[]);
        assert_eq!(summary.total, 0);
        assert!(!summary.systemic_failure);
        assert_eq!(summary.integrity, Integrity::High);
    }
}
