//! The classification cascade.
//!
//! Rules are evaluated in a fixed order against the evidence gathered for
//! one reference; the first rule that fires decides the record. Keeping the
//! rules as named entries in a single ordered list makes the precedence
//! auditable: the emitted rationale names the rule that fired.
//!
//! Thresholds (all similarities are 0–100):
//! - identifier path: title ≥ 60 accepts the record as "the cited work";
//!   authors ≥ 50 then verifies it, authors below that is author
//!   fabrication, title below 60 is a stolen identifier.
//! - search path: title ≥ 80 with authors ≥ 60 and year within tolerance
//!   verifies; title in [50, 80) is suspicious.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::Reference;
use crate::markers::SourceMarkers;
use crate::matching::SimilarityScore;
use crate::pool::LookupOutcome;
use crate::registry::LookupResult;

/// Classification tier for a completed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    /// Identifier resolved and metadata agrees.
    Verified,
    /// Found via title search while the cited DOI no longer resolves.
    VerifiedLegacyDoi,
    /// Institutional report or book — legitimately absent from registries.
    GreyLiterature,
    /// Real but published somewhere with weak editorial rigor.
    LowQualitySource,
    /// A similar-but-not-matching record exists.
    Suspicious,
    /// No registry knows it and no excuse applies.
    NotFound,
    /// Positive evidence of fabrication.
    DefiniteFake,
    /// Too recent to be indexed yet; absence is not yet meaningful.
    LikelyValid,
}

/// Whether a record carries a classification or the run could not conclude.
///
/// `Incomplete` is deliberately not a tier: a network outage says nothing
/// about the citation and must never count against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "tier")]
pub enum RecordStatus {
    Classified(Tier),
    Incomplete,
}

/// Recommended editorial action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Keep,
    Remove,
    UpdateDoi,
    ManualReview,
}

/// Final verdict for one reference.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationRecord {
    pub reference: Reference,
    pub status: RecordStatus,
    /// 0–100; how sure the cascade is of this status.
    pub confidence: u8,
    pub title_similarity: Option<f64>,
    pub author_overlap: Option<f64>,
    /// Signed `resolved_year - cited_year` of the matched record.
    pub year_delta: Option<i32>,
    /// The registry record the verdict is based on, when one matched.
    pub matched: Option<LookupResult>,
    pub action: Action,
    /// One line per decision step, in the order taken.
    pub rationale: Vec<String>,
    /// Links for a human to check manually (populated for inconclusive
    /// tiers).
    pub manual_check_links: Vec<String>,
    /// Sources that could not be reached during this run.
    pub transient_failures: Vec<String>,
}

impl VerificationRecord {
    /// A record for a reference that was cancelled or timed out mid-lookup.
    pub fn incomplete(reference: Reference, transient_failures: Vec<String>) -> Self {
        Self {
            reference,
            status: RecordStatus::Incomplete,
            confidence: 0,
            title_similarity: None,
            author_overlap: None,
            year_delta: None,
            matched: None,
            action: Action::ManualReview,
            rationale: vec!["verification did not complete; no conclusion drawn".into()],
            manual_check_links: vec![],
            transient_failures,
        }
    }
}

/// Evidence gathered for one reference, input to [`classify`].
pub struct CascadeInput<'a> {
    pub reference: &'a Reference,
    /// Outcome of identifier resolution (`None` if the reference had no
    /// usable identifier).
    pub id_lookup: Option<&'a LookupOutcome>,
    /// Outcome of the title-search fallback (`None` if it was not run).
    pub search_lookup: Option<&'a LookupOutcome>,
    pub today: NaiveDate,
    pub markers: &'a SourceMarkers,
    /// Tie-break priority by source name; lower ranks first.
    pub priority_of: &'a dyn Fn(&str) -> u8,
}

/// A candidate record with its similarity to the cited reference.
struct Scored {
    record: LookupResult,
    score: SimilarityScore,
}

/// Pick the best candidate: highest title similarity, ties broken by source
/// priority. Logs the tie-break when it mattered.
fn best_candidate(
    input: &CascadeInput<'_>,
    outcome: &LookupOutcome,
    rationale: &mut Vec<String>,
) -> Option<Scored> {
    let mut scored: Vec<Scored> = outcome
        .results
        .iter()
        .map(|record| Scored {
            score: SimilarityScore::compute(input.reference, record),
            record: record.clone(),
        })
        .collect();
    if scored.is_empty() {
        return None;
    }

    scored.sort_by(|a, b| {
        b.score
            .title
            .partial_cmp(&a.score.title)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                (input.priority_of)(&a.record.source).cmp(&(input.priority_of)(&b.record.source))
            })
    });

    if scored.len() > 1 && (scored[0].score.title - scored[1].score.title).abs() < f64::EPSILON {
        rationale.push(format!(
            "{} and {} scored equally on title; preferred {} by source priority",
            scored[0].record.source, scored[1].record.source, scored[0].record.source
        ));
    }
    Some(scored.swap_remove(0))
}

const IDENTIFIER_TITLE_MIN: f64 = 60.0;
const IDENTIFIER_AUTHOR_MIN: f64 = 50.0;
const SEARCH_TITLE_MIN: f64 = 80.0;
const SEARCH_AUTHOR_MIN: f64 = 60.0;
const SUSPICIOUS_TITLE_MIN: f64 = 50.0;
/// References younger than this cannot be condemned for absence.
const RECENCY_WINDOW_DAYS: i64 = 548; // 18 months

type Verdict = (
    RecordStatus,
    u8,
    Action,
    Option<Scored>,
);

/// Classify one reference from its gathered evidence.
pub fn classify(input: &CascadeInput<'_>) -> VerificationRecord {
    let mut rationale = Vec::new();
    let mut links = Vec::new();

    let transient_failures: Vec<String> = [input.id_lookup, input.search_lookup]
        .iter()
        .flatten()
        .flat_map(|o| o.transient_failures.iter().cloned())
        .collect();

    let (status, confidence, action, matched) = run_rules(input, &mut rationale, &mut links);

    if !input.reference.damaged_dois.is_empty() {
        rationale.push(format!(
            "truncated DOI fragment ignored as a parsing artifact: {}",
            input.reference.damaged_dois.join(", ")
        ));
    }

    let (title_similarity, author_overlap, year_delta, matched_record) = match matched {
        Some(scored) => (
            Some(scored.score.title),
            Some(scored.score.authors),
            scored.score.year_delta,
            Some(scored.record),
        ),
        None => (None, None, None, None),
    };

    VerificationRecord {
        reference: input.reference.clone(),
        status,
        confidence,
        title_similarity,
        author_overlap,
        year_delta,
        matched: matched_record,
        action,
        rationale,
        manual_check_links: links,
        transient_failures,
    }
}

fn run_rules(
    input: &CascadeInput<'_>,
    rationale: &mut Vec<String>,
    links: &mut Vec<String>,
) -> Verdict {
    // The order is the contract: hard evidence of fabrication first, then
    // positive matches, then the excuses for absence, then the default.
    let rules: &[(&str, RuleFn)] = &[
        ("impossible_date", rule_impossible_date),
        ("insufficient_text", rule_insufficient_text),
        ("verification_incomplete", rule_incomplete),
        ("identifier_match", rule_identifier_match),
        ("title_search_match", rule_search_match),
        ("grey_literature", rule_grey_literature),
        ("low_quality_source", rule_low_quality),
        ("too_recent_to_index", rule_recent),
    ];

    for (name, rule) in rules {
        if let Some(verdict) = rule(input, rationale, links) {
            tracing::debug!(
                index = input.reference.index,
                rule = name,
                "cascade rule fired"
            );
            return verdict;
        }
    }

    rule_not_found(input, rationale, links)
}

type RuleFn = fn(&CascadeInput<'_>, &mut Vec<String>, &mut Vec<String>) -> Option<Verdict>;

/// A publication year in the future is not a lookup problem; it is proof.
fn rule_impossible_date(
    input: &CascadeInput<'_>,
    rationale: &mut Vec<String>,
    _links: &mut Vec<String>,
) -> Option<Verdict> {
    let year = input.reference.year?;
    if year <= input.today.year() {
        return None;
    }
    rationale.push(format!(
        "cited publication year {year} is after the processing date {}",
        input.today
    ));
    Some((
        RecordStatus::Classified(Tier::DefiniteFake),
        100,
        Action::Remove,
        None,
    ))
}

fn rule_insufficient_text(
    input: &CascadeInput<'_>,
    rationale: &mut Vec<String>,
    _links: &mut Vec<String>,
) -> Option<Verdict> {
    if !input.reference.malformed {
        return None;
    }
    rationale.push("residual text too short to identify a citation; lookup skipped".into());
    Some((
        RecordStatus::Classified(Tier::NotFound),
        20,
        Action::ManualReview,
        None,
    ))
}

/// Every attempted source failed transiently: the world was unreachable, so
/// no conclusion about the citation is possible.
fn rule_incomplete(
    input: &CascadeInput<'_>,
    rationale: &mut Vec<String>,
    _links: &mut Vec<String>,
) -> Option<Verdict> {
    let phases: Vec<&LookupOutcome> = [input.id_lookup, input.search_lookup]
        .into_iter()
        .flatten()
        .collect();
    let attempted: usize = phases.iter().map(|o| o.attempted).sum();
    if attempted == 0 || !phases.iter().all(|o| o.attempted == 0 || o.all_transient()) {
        return None;
    }
    rationale.push(format!(
        "all {attempted} registry queries failed transiently; absence cannot be concluded"
    ));
    Some((RecordStatus::Incomplete, 0, Action::ManualReview, None))
}

/// The identifier path. A resolved identifier anchors the comparison: the
/// registry record *is* what the identifier points at, so disagreement is
/// evidence about the citation, not about the lookup.
fn rule_identifier_match(
    input: &CascadeInput<'_>,
    rationale: &mut Vec<String>,
    _links: &mut Vec<String>,
) -> Option<Verdict> {
    let outcome = input.id_lookup?;
    let best = best_candidate(input, outcome, rationale)?;
    let (title, authors) = (best.score.title, best.score.authors);

    if title >= IDENTIFIER_TITLE_MIN {
        if authors >= IDENTIFIER_AUTHOR_MIN || input.reference.authors.is_empty() {
            let confidence = (0.6 * title + 0.4 * authors).round() as u8;
            rationale.push(format!(
                "identifier resolved via {}; title {title:.0} and authors {authors:.0} agree",
                best.record.source
            ));
            return Some((
                RecordStatus::Classified(Tier::Verified),
                confidence,
                Action::Keep,
                Some(best),
            ));
        }
        // Right paper, wrong people.
        let confidence = (90.0 + (IDENTIFIER_AUTHOR_MIN - authors) / 5.0).min(100.0) as u8;
        rationale.push(format!(
            "identifier resolves to the cited title but the author list does not match \
             ({authors:.0} overlap); cited authors appear fabricated"
        ));
        rationale.push(
            "an erratum or indexing error could also explain the author discrepancy; \
             confirm against the publisher record before removal"
                .into(),
        );
        return Some((
            RecordStatus::Classified(Tier::DefiniteFake),
            confidence,
            Action::ManualReview,
            Some(best),
        ));
    }

    // The identifier is real but belongs to a different work entirely: a
    // fabricated citation wearing a stolen DOI.
    let confidence = (100.0 - title).round() as u8;
    rationale.push(format!(
        "identifier resolves to an unrelated work \"{}\" (title similarity {title:.0})",
        best.record.title
    ));
    Some((
        RecordStatus::Classified(Tier::DefiniteFake),
        confidence,
        Action::Remove,
        Some(best),
    ))
}

/// The title-search path, used when no identifier resolved.
fn rule_search_match(
    input: &CascadeInput<'_>,
    rationale: &mut Vec<String>,
    links: &mut Vec<String>,
) -> Option<Verdict> {
    let outcome = input.search_lookup?;
    let best = best_candidate(input, outcome, rationale)?;
    let (title, authors) = (best.score.title, best.score.authors);
    let year_gap = best.score.year_delta.map(i32::abs);

    if title >= SEARCH_TITLE_MIN
        && (authors >= SEARCH_AUTHOR_MIN || input.reference.authors.is_empty())
        && year_gap.is_none_or(|gap| gap <= 2)
    {
        let mut confidence = 0.6 * title + 0.4 * authors;
        if let Some(gap) = year_gap
            && gap > 1
        {
            confidence -= 15.0;
            rationale.push(format!(
                "publication year differs by {gap}; likely online-first vs print dating"
            ));
        }
        let confidence = confidence.clamp(0.0, 100.0).round() as u8;

        // A broken DOI alongside a solid search match means the work is real
        // and the identifier rotted.
        let cited_id_failed = !input.reference.identifiers.is_empty()
            && input.id_lookup.is_some_and(|o| o.results.is_empty() && !o.all_transient());
        if cited_id_failed {
            rationale.push(format!(
                "cited identifier no longer resolves, but {} has the work; DOI needs updating",
                best.record.source
            ));
            return Some((
                RecordStatus::Classified(Tier::VerifiedLegacyDoi),
                confidence,
                Action::UpdateDoi,
                Some(best),
            ));
        }

        rationale.push(format!(
            "found by title search via {}; title {title:.0}, authors {authors:.0}",
            best.record.source
        ));
        return Some((
            RecordStatus::Classified(Tier::Verified),
            confidence,
            Action::Keep,
            Some(best),
        ));
    }

    if title >= SUSPICIOUS_TITLE_MIN {
        let reason = if title < SEARCH_TITLE_MIN {
            "similar but not matching title".to_string()
        } else if year_gap.is_some_and(|gap| gap > 2) {
            format!("title matches but years differ by {}", year_gap.unwrap_or(0))
        } else {
            format!("title matches but author overlap is only {authors:.0}")
        };
        rationale.push(format!(
            "closest record \"{}\" via {}: {reason}",
            best.record.title, best.record.source
        ));
        push_manual_links(input.reference, links);
        let confidence = title.min(79.0).round() as u8;
        return Some((
            RecordStatus::Classified(Tier::Suspicious),
            confidence,
            Action::ManualReview,
            Some(best),
        ));
    }

    // Nothing close enough to say anything; fall through to the excuses.
    None
}

fn marker_haystack(reference: &Reference) -> &str {
    reference
        .venue
        .as_deref()
        .unwrap_or(&reference.cleaned_text)
}

fn rule_grey_literature(
    input: &CascadeInput<'_>,
    rationale: &mut Vec<String>,
    links: &mut Vec<String>,
) -> Option<Verdict> {
    let text = marker_haystack(input.reference);
    let markers = input.markers;
    let hit = markers
        .first_match(&markers.grey_literature, text)
        .or_else(|| markers.first_match(&markers.book_or_software, text))?;

    rationale.push(format!(
        "not indexed, but the source reads as grey literature or a book (marker: \"{hit}\")"
    ));
    push_manual_links(input.reference, links);
    // Fixed confidence: absence from registries is expected here, so the
    // evidence neither condemns nor clears.
    Some((
        RecordStatus::Classified(Tier::GreyLiterature),
        50,
        Action::ManualReview,
        None,
    ))
}

fn rule_low_quality(
    input: &CascadeInput<'_>,
    rationale: &mut Vec<String>,
    links: &mut Vec<String>,
) -> Option<Verdict> {
    let text = marker_haystack(input.reference);
    let hit = input
        .markers
        .first_match(&input.markers.low_quality, text)?;

    rationale.push(format!(
        "source venue has weak editorial rigor (marker: \"{hit}\")"
    ));
    push_manual_links(input.reference, links);
    Some((
        RecordStatus::Classified(Tier::LowQualitySource),
        50,
        Action::ManualReview,
        None,
    ))
}

/// Registries lag publication; very recent work earns the benefit of the
/// doubt. Publication is assumed mid-year since citations carry only a year.
fn rule_recent(
    input: &CascadeInput<'_>,
    rationale: &mut Vec<String>,
    links: &mut Vec<String>,
) -> Option<Verdict> {
    let year = input.reference.year?;
    let assumed = NaiveDate::from_ymd_opt(year, 7, 1)?;
    let age_days = (input.today - assumed).num_days();
    if age_days >= RECENCY_WINDOW_DAYS {
        return None;
    }
    rationale.push(format!(
        "published within the last 18 months ({year}); may not be indexed yet"
    ));
    push_manual_links(input.reference, links);
    Some((
        RecordStatus::Classified(Tier::LikelyValid),
        55,
        Action::ManualReview,
        None,
    ))
}

fn rule_not_found(
    input: &CascadeInput<'_>,
    rationale: &mut Vec<String>,
    links: &mut Vec<String>,
) -> Verdict {
    rationale.push("no registry has a matching record and no exemption applies".into());
    push_manual_links(input.reference, links);
    // Capped well below the fake tiers: absence is weak evidence.
    let confidence = if input.reference.damaged_dois.is_empty() {
        40
    } else {
        30
    };
    (
        RecordStatus::Classified(Tier::NotFound),
        confidence,
        Action::ManualReview,
        None,
    )
}

fn push_manual_links(reference: &Reference, links: &mut Vec<String>) {
    if let Some(ref title) = reference.title {
        let q = urlencoding::encode(title);
        links.push(format!("https://scholar.google.com/scholar?q={q}"));
        links.push(format!(
            "https://search.crossref.org/?q={q}&from_ui=yes"
        ));
    }
    for id in &reference.identifiers {
        if let crate::identifiers::CanonicalId::Doi(doi) = id {
            links.push(format!("https://doi.org/{doi}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const APA: &str = "Smith, J. A., & Jones, M. (2021). Outcomes of remote cardiac rehabilitation: A randomized trial. Journal of Cardiology, 44(2), 101-109. https://doi.org/10.1000/jcard.2021.0042";

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn markers() -> Arc<SourceMarkers> {
        Arc::new(SourceMarkers::default())
    }

    fn flat_priority(_: &str) -> u8 {
        0
    }

    fn record(source: &str, title: &str, authors: &[&str], year: i32) -> LookupResult {
        LookupResult {
            source: source.into(),
            title: title.into(),
            authors: authors.iter().map(|s| s.to_string()).collect(),
            year: Some(year),
            venue: None,
            doi: None,
            url: None,
        }
    }

    fn outcome_with(results: Vec<LookupResult>) -> LookupOutcome {
        LookupOutcome {
            attempted: results.len().max(1),
            results,
            transient_failures: vec![],
        }
    }

    fn classify_ref(
        reference: &Reference,
        id_lookup: Option<&LookupOutcome>,
        search_lookup: Option<&LookupOutcome>,
    ) -> VerificationRecord {
        let m = markers();
        classify(&CascadeInput {
            reference,
            id_lookup,
            search_lookup,
            today: today(),
            markers: &m,
            priority_of: &flat_priority,
        })
    }

    #[test]
    fn future_year_is_definite_fake() {
        let reference = Reference::from_raw(
            "Doe, J. (2031). A study that has not happened yet somehow. Journal, 1(1), 1-2.",
            0,
        );
        let rec = classify_ref(&reference, None, None);
        assert_eq!(rec.status, RecordStatus::Classified(Tier::DefiniteFake));
        assert_eq!(rec.confidence, 100);
        assert_eq!(rec.action, Action::Remove);
    }

    #[test]
    fn identifier_full_agreement_verifies() {
        let reference = Reference::from_raw(APA, 0);
        let id_lookup = outcome_with(vec![record(
            "CrossRef",
            "Outcomes of remote cardiac rehabilitation: A randomized trial",
            &["John Smith", "Mary Jones"],
            2021,
        )]);
        let rec = classify_ref(&reference, Some(&id_lookup), None);
        assert_eq!(rec.status, RecordStatus::Classified(Tier::Verified));
        assert_eq!(rec.action, Action::Keep);
        // 0.6 * 100 + 0.4 * 100
        assert_eq!(rec.confidence, 100);
    }

    #[test]
    fn verified_confidence_is_weighted_mix() {
        let reference = Reference::from_raw(APA, 0);
        // Authors half-match: second author differs.
        let id_lookup = outcome_with(vec![record(
            "CrossRef",
            "Outcomes of remote cardiac rehabilitation: A randomized trial",
            &["John Smith", "Alice Brown"],
            2021,
        )]);
        let rec = classify_ref(&reference, Some(&id_lookup), None);
        assert_eq!(rec.status, RecordStatus::Classified(Tier::Verified));
        assert!(rec.confidence < 100);
        assert!(rec.confidence >= 80, "got {}", rec.confidence);
    }

    #[test]
    fn author_fabrication_on_resolved_identifier() {
        let reference = Reference::from_raw(APA, 0);
        let id_lookup = outcome_with(vec![record(
            "CrossRef",
            "Outcomes of remote cardiac rehabilitation: A randomized trial",
            &["Alice Brown", "Bob White"],
            2021,
        )]);
        let rec = classify_ref(&reference, Some(&id_lookup), None);
        assert_eq!(rec.status, RecordStatus::Classified(Tier::DefiniteFake));
        assert!(rec.confidence >= 90);
        // Author mismatch could be an erratum, so a human confirms removal.
        assert_eq!(rec.action, Action::ManualReview);
        assert!(rec.rationale.iter().any(|r| r.contains("erratum")));
    }

    #[test]
    fn stolen_identifier_is_frankenstein() {
        let reference = Reference::from_raw(APA, 0);
        let id_lookup = outcome_with(vec![record(
            "doi.org",
            "Soil microbiome diversity in arid climates",
            &["Zhang W"],
            2019,
        )]);
        let rec = classify_ref(&reference, Some(&id_lookup), None);
        assert_eq!(rec.status, RecordStatus::Classified(Tier::DefiniteFake));
        assert_eq!(rec.action, Action::Remove);
        // Confidence is the inverse of the title similarity.
        let sim = rec.title_similarity.unwrap();
        assert_eq!(rec.confidence, (100.0 - sim).round() as u8);
    }

    #[test]
    fn search_match_verifies_without_identifier() {
        let reference = Reference::from_raw(
            "Smith, J. (2020). Remote monitoring of heart failure patients at home. Cardiology Today, 12(3), 45-52.",
            0,
        );
        let search = outcome_with(vec![record(
            "PubMed",
            "Remote monitoring of heart failure patients at home",
            &["John Smith"],
            2020,
        )]);
        let rec = classify_ref(&reference, None, Some(&search));
        assert_eq!(rec.status, RecordStatus::Classified(Tier::Verified));
    }

    #[test]
    fn broken_doi_with_search_match_is_legacy() {
        let reference = Reference::from_raw(APA, 0);
        // Identifier phase ran and terminally found nothing.
        let id_lookup = outcome_with(vec![]);
        let search = outcome_with(vec![record(
            "PubMed",
            "Outcomes of remote cardiac rehabilitation: A randomized trial",
            &["John Smith", "Mary Jones"],
            2021,
        )]);
        let rec = classify_ref(&reference, Some(&id_lookup), Some(&search));
        assert_eq!(rec.status, RecordStatus::Classified(Tier::VerifiedLegacyDoi));
        assert_eq!(rec.action, Action::UpdateDoi);
    }

    #[test]
    fn two_year_gap_costs_confidence() {
        let reference = Reference::from_raw(
            "Smith, J. (2019). Remote monitoring of heart failure patients at home. Cardiology Today, 12(3), 45-52.",
            0,
        );
        let search = outcome_with(vec![record(
            "PubMed",
            "Remote monitoring of heart failure patients at home",
            &["John Smith"],
            2021,
        )]);
        let rec = classify_ref(&reference, None, Some(&search));
        assert_eq!(rec.status, RecordStatus::Classified(Tier::Verified));
        assert_eq!(rec.confidence, 85); // 100 - 15 year penalty
    }

    #[test]
    fn three_year_gap_is_suspicious() {
        let reference = Reference::from_raw(
            "Smith, J. (2017). Remote monitoring of heart failure patients at home. Cardiology Today, 12(3), 45-52.",
            0,
        );
        let search = outcome_with(vec![record(
            "PubMed",
            "Remote monitoring of heart failure patients at home",
            &["John Smith"],
            2021,
        )]);
        let rec = classify_ref(&reference, None, Some(&search));
        assert_eq!(rec.status, RecordStatus::Classified(Tier::Suspicious));
        assert_eq!(rec.action, Action::ManualReview);
    }

    #[test]
    fn near_miss_title_is_suspicious_with_links() {
        let reference = Reference::from_raw(
            "Smith, J. (2020). Remote cardiac monitoring outcomes in elderly rural patients. Cardiology Today, 12(3), 45-52.",
            0,
        );
        let search = outcome_with(vec![record(
            "PubMed",
            "Remote cardiac monitoring outcomes in elderly patients",
            &["John Smith"],
            2020,
        )]);
        let rec = classify_ref(&reference, None, Some(&search));
        if let RecordStatus::Classified(tier) = rec.status {
            assert!(matches!(tier, Tier::Suspicious | Tier::Verified));
        }
        if rec.status == RecordStatus::Classified(Tier::Suspicious) {
            assert!(!rec.manual_check_links.is_empty());
            assert!(rec.confidence < 80);
        }
    }

    #[test]
    fn who_report_is_grey_literature_at_fixed_confidence() {
        let reference = Reference::from_raw(
            "World Health Organization. (2020). Guidelines on physical activity and sedentary behaviour. WHO Press.",
            0,
        );
        let search = outcome_with(vec![]);
        let rec = classify_ref(&reference, None, Some(&search));
        assert_eq!(rec.status, RecordStatus::Classified(Tier::GreyLiterature));
        assert_eq!(rec.confidence, 50);
    }

    #[test]
    fn preprint_is_low_quality_source() {
        let reference = Reference::from_raw(
            "Doe, A. (2021). Early results of an unreviewed intervention study. ResearchGate preprint, 1-15.",
            0,
        );
        let search = outcome_with(vec![]);
        let rec = classify_ref(&reference, None, Some(&search));
        assert_eq!(rec.status, RecordStatus::Classified(Tier::LowQualitySource));
    }

    #[test]
    fn recent_unindexed_is_likely_valid() {
        let reference = Reference::from_raw(
            "Doe, A. (2025). Very recent findings on something plausible. New Journal, 1(1), 1-10.",
            0,
        );
        let search = outcome_with(vec![]);
        let rec = classify_ref(&reference, None, Some(&search));
        assert_eq!(rec.status, RecordStatus::Classified(Tier::LikelyValid));
        assert_eq!(rec.confidence, 55);
    }

    #[test]
    fn old_unindexed_is_not_found_with_low_confidence() {
        let reference = Reference::from_raw(
            "Doe, A. (2015). A plausible but unfindable clinical study. Obscure Journal, 3(2), 10-20.",
            0,
        );
        let search = outcome_with(vec![]);
        let rec = classify_ref(&reference, None, Some(&search));
        assert_eq!(rec.status, RecordStatus::Classified(Tier::NotFound));
        assert!(rec.confidence <= 40);
        assert!(!rec.manual_check_links.is_empty());
    }

    #[test]
    fn all_transient_is_incomplete_not_not_found() {
        let reference = Reference::from_raw(
            "Doe, A. (2015). A plausible but unfindable clinical study. Obscure Journal, 3(2), 10-20.",
            0,
        );
        let search = LookupOutcome {
            results: vec![],
            attempted: 4,
            transient_failures: vec![
                "PubMed".into(),
                "CrossRef".into(),
                "doi.org".into(),
                "Europe PMC".into(),
            ],
        };
        let rec = classify_ref(&reference, None, Some(&search));
        assert_eq!(rec.status, RecordStatus::Incomplete);
        assert_eq!(rec.transient_failures.len(), 4);
    }

    #[test]
    fn malformed_reference_routes_to_not_found() {
        let reference = Reference::from_raw("Vol 3, 12", 0);
        assert!(reference.malformed);
        let rec = classify_ref(&reference, None, None);
        assert_eq!(rec.status, RecordStatus::Classified(Tier::NotFound));
        assert!(rec.rationale[0].contains("too short"));
    }

    #[test]
    fn tie_break_prefers_priority_and_logs() {
        let reference = Reference::from_raw(APA, 0);
        let id_lookup = outcome_with(vec![
            record(
                "CrossRef",
                "Outcomes of remote cardiac rehabilitation: A randomized trial",
                &["John Smith", "Mary Jones"],
                2021,
            ),
            record(
                "PubMed",
                "Outcomes of remote cardiac rehabilitation: A randomized trial",
                &["John Smith", "Mary Jones"],
                2021,
            ),
        ]);
        let m = markers();
        let priority = |name: &str| if name == "PubMed" { 0 } else { 1 };
        let rec = classify(&CascadeInput {
            reference: &reference,
            id_lookup: Some(&id_lookup),
            search_lookup: None,
            today: today(),
            markers: &m,
            priority_of: &priority,
        });
        assert_eq!(rec.matched.unwrap().source, "PubMed");
        assert!(rec.rationale.iter().any(|r| r.contains("source priority")));
    }

    #[test]
    fn verified_confidence_is_monotonic_in_similarity() {
        let reference = Reference::from_raw(APA, 0);
        let exact = outcome_with(vec![record(
            "CrossRef",
            "Outcomes of remote cardiac rehabilitation: A randomized trial",
            &["John Smith", "Mary Jones"],
            2021,
        )]);
        let partial = outcome_with(vec![record(
            "CrossRef",
            "Outcomes of remote cardiac rehabilitation: A randomized trial",
            &["John Smith", "Alice Brown"],
            2021,
        )]);
        let high = classify_ref(&reference, Some(&exact), None);
        let low = classify_ref(&reference, Some(&partial), None);
        assert!(high.confidence >= low.confidence);
    }

    #[test]
    fn damaged_doi_noted_in_rationale() {
        let reference = Reference::from_raw(
            "Smith, J. (2015). A plausible but unfindable clinical study. Obscure Journal, 3(2), 10-20. doi:10.1016/j",
            0,
        );
        let search = outcome_with(vec![]);
        let rec = classify_ref(&reference, None, Some(&search));
        assert!(rec.rationale.iter().any(|r| r.contains("truncated DOI")));
        assert_eq!(rec.confidence, 30);
    }
}
