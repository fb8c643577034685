//! Fuzzy comparison of cited metadata against registry records.
//!
//! All functions here are pure and deterministic: no network, no clock.
//! Scores are normalized to 0–100 so the cascade thresholds read the same
//! way they are documented.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

use crate::Reference;
use crate::registry::LookupResult;

/// Similarity between one cited reference and one registry record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityScore {
    /// Token-set title similarity, 0–100.
    pub title: f64,
    /// Author-list overlap, 0–100.
    pub authors: f64,
    /// Signed `resolved_year - cited_year`, when both are known.
    pub year_delta: Option<i32>,
}

impl SimilarityScore {
    /// Score a (reference, lookup) pair.
    pub fn compute(reference: &Reference, lookup: &LookupResult) -> Self {
        let title = match reference.title.as_deref() {
            Some(cited) => title_similarity(cited, &lookup.title),
            None => 0.0,
        };
        let authors = author_overlap(&reference.authors, &lookup.authors);
        let year_delta = match (reference.year, lookup.year) {
            (Some(cited), Some(resolved)) => Some(resolved - cited),
            _ => None,
        };
        Self {
            title,
            authors,
            year_delta,
        }
    }
}

/// Normalize a title for comparison: unescape common HTML entities, NFKD
/// decompose, strip to ASCII alphanumerics, lowercase.
///
/// Accents reduce to their base letter; any other non-ASCII character
/// (em-dashes, CJK) becomes a space so adjacent words stay separate.
pub fn normalize_title(title: &str) -> String {
    let title = title
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'");

    let decomposed: String = title
        .nfkd()
        .filter_map(|c| {
            if c.is_ascii() {
                Some(c)
            } else if unicode_normalization::char::is_combining_mark(c) {
                None
            } else {
                Some(' ')
            }
        })
        .collect();

    static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9 ]").unwrap());
    NON_ALNUM
        .replace_all(&decomposed, " ")
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sorted, deduplicated tokens of a normalized title, rejoined into one
/// comparison string.
fn token_sort(title: &str) -> String {
    let normalized = normalize_title(title);
    let mut tokens: Vec<&str> = normalized.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.dedup();
    tokens.join(" ")
}

/// Token-sorted fuzzy title similarity on normalized titles, 0–100.
///
/// Comparing sorted token sets (rather than the raw strings) tolerates
/// word-order changes and subtitle reordering, which registries and citation
/// styles disagree on constantly.
pub fn title_similarity(cited: &str, resolved: &str) -> f64 {
    let a = token_sort(cited);
    let b = token_sort(resolved);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    rapidfuzz::fuzz::ratio(a.chars(), b.chars()) * 100.0
}

/// Common surname prefixes kept attached to multi-word surnames.
static SURNAME_PREFIXES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "van", "von", "de", "del", "della", "di", "da", "al", "el", "la", "le", "ben", "ibn",
        "mac", "mc",
    ]
    .into_iter()
    .collect()
});

/// Extract a lowercase surname from a name in either inverted
/// (`Last, F. M.`) or natural (`First Last`) form.
pub fn surname(name: &str) -> String {
    let name = name.trim();
    if let Some((last, _)) = name.split_once(',') {
        return last.trim().to_lowercase();
    }

    let parts: Vec<&str> = name.split_whitespace().collect();
    match parts.as_slice() {
        [] => String::new(),
        [only] => only.to_lowercase(),
        _ => {
            // "Jay Van Bavel" -> "van bavel"
            let n = parts.len();
            if n >= 2 && SURNAME_PREFIXES.contains(parts[n - 2].to_lowercase().as_str()) {
                format!("{} {}", parts[n - 2], parts[n - 1]).to_lowercase()
            } else {
                parts[n - 1].to_lowercase()
            }
        }
    }
}

/// Author-list overlap, 0–100.
///
/// Compares surname sets (so `Smith, J.` matches `John Smith`), weighting
/// first-author agreement at 60% and overall overlap at 40%. Either list
/// being empty scores 0 — absence of authors is never evidence of a match.
pub fn author_overlap(cited: &[String], resolved: &[String]) -> f64 {
    if cited.is_empty() || resolved.is_empty() {
        return 0.0;
    }

    let cited_surnames: Vec<String> = cited.iter().map(|a| surname(a)).collect();
    let resolved_surnames: HashSet<String> = resolved.iter().map(|a| surname(a)).collect();

    let matched = cited_surnames
        .iter()
        .filter(|s| !s.is_empty() && resolved_surnames.contains(*s))
        .count();
    let overlap = matched as f64 / cited_surnames.len() as f64;

    let first_cited = cited_surnames.first().map(String::as_str).unwrap_or("");
    let first_resolved = resolved.first().map(|a| surname(a)).unwrap_or_default();
    let first_match = if !first_cited.is_empty() && first_cited == first_resolved {
        1.0
    } else if resolved_surnames.contains(first_cited) {
        // First author present but not first in the registry record.
        0.8
    } else {
        0.5
    };

    (first_match * 0.6 + overlap * 0.4) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_accents_and_case() {
        assert_eq!(normalize_title("Rényi Divergence—Revisited!"), "renyi divergence revisited");
    }

    #[test]
    fn normalize_keeps_dash_joined_words_separate() {
        assert_eq!(
            normalize_title("Machine translation\u{2014}a survey"),
            "machine translation a survey"
        );
    }

    #[test]
    fn normalize_html_entities() {
        assert_eq!(normalize_title("Health &amp; Society"), "health society");
    }

    #[test]
    fn identical_titles_score_100() {
        assert_eq!(
            title_similarity("Outcomes of remote care", "Outcomes of remote care"),
            100.0
        );
    }

    #[test]
    fn word_order_tolerated() {
        let s = title_similarity(
            "Remote cardiac rehabilitation outcomes: a randomized trial",
            "A randomized trial: remote cardiac rehabilitation outcomes",
        );
        assert!(s > 95.0, "got {s}");
    }

    #[test]
    fn repeated_words_do_not_inflate_the_score() {
        let once = title_similarity(
            "Remote monitoring of heart failure",
            "Remote monitoring of heart failure",
        );
        let repeated = title_similarity(
            "Remote remote monitoring of heart failure",
            "Remote monitoring of heart failure",
        );
        assert_eq!(once, 100.0);
        assert_eq!(repeated, 100.0);
    }

    #[test]
    fn scores_stay_on_the_percent_scale() {
        let s = title_similarity(
            "Outcomes of remote cardiac rehabilitation",
            "Outcomes of remote cardiac rehab programs",
        );
        assert!(s > 1.0 && s < 100.0, "got {s}");
    }

    #[test]
    fn unrelated_titles_score_low() {
        let s = title_similarity(
            "Machine learning feedback in large language models",
            "Scoping studies: towards a methodological framework",
        );
        assert!(s < 50.0, "got {s}");
    }

    #[test]
    fn empty_title_scores_zero() {
        assert_eq!(title_similarity("", "Anything"), 0.0);
    }

    #[test]
    fn surname_inverted_and_natural() {
        assert_eq!(surname("Smith, J. A."), "smith");
        assert_eq!(surname("John Smith"), "smith");
        assert_eq!(surname("Jay Van Bavel"), "van bavel");
    }

    #[test]
    fn full_author_match_scores_100() {
        let cited = vec!["Smith, J.".to_string(), "Jones, M.".to_string()];
        let resolved = vec!["John Smith".to_string(), "Mary Jones".to_string()];
        assert_eq!(author_overlap(&cited, &resolved), 100.0);
    }

    #[test]
    fn disjoint_authors_score_below_threshold() {
        let cited = vec!["Smith, J.".to_string()];
        let resolved = vec!["Brown, B.".to_string()];
        assert!(author_overlap(&cited, &resolved) < 50.0);
    }

    #[test]
    fn empty_authors_score_zero() {
        assert_eq!(author_overlap(&[], &["Smith, J.".to_string()]), 0.0);
        assert_eq!(author_overlap(&["Smith, J.".to_string()], &[]), 0.0);
    }

    #[test]
    fn partial_overlap_is_midrange() {
        let cited = vec!["Smith, J.".to_string(), "Doe, A.".to_string()];
        let resolved = vec!["John Smith".to_string(), "Bob Brown".to_string()];
        let s = author_overlap(&cited, &resolved);
        assert!(s >= 50.0 && s < 100.0, "got {s}");
    }

    #[test]
    fn year_delta_is_signed() {
        let mut reference = Reference::from_raw(
            "Smith, J. (2020). A sufficiently long reference title for testing. Journal, 1(1), 1-2.",
            0,
        );
        reference.year = Some(2020);
        let lookup = LookupResult {
            source: "PubMed".into(),
            title: "A sufficiently long reference title for testing".into(),
            authors: vec!["John Smith".into()],
            year: Some(2019),
            venue: None,
            doi: None,
            url: None,
        };
        let score = SimilarityScore::compute(&reference, &lookup);
        assert_eq!(score.year_delta, Some(-1));
    }
}
