//! APA reference-format checks.
//!
//! Entirely independent of verification: a perfectly formatted citation can
//! be fabricated and a real one can be sloppily formatted. Findings are
//! reported alongside the verification records, never fed into them.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::Reference;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Clearly wrong under the style guide.
    Error,
    /// Deviates from convention; may be intentional.
    Warning,
}

/// One formatting problem in one reference.
#[derive(Debug, Clone, Serialize)]
pub struct StyleFinding {
    /// Index of the reference within the document.
    pub index: usize,
    pub severity: Severity,
    /// Which part of the entry the finding concerns.
    pub field: &'static str,
    pub message: String,
}

// "Smith, J. A." or "van der Berg, M." at the start of the entry.
static INVERTED_AUTHOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z][\p{L}'\-]+(?: [a-z]+)*, [A-Z]\.").unwrap()
});

static PARENTHESIZED_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((?:19|20)\d{2}[a-z]?\)").unwrap());

static BARE_DOI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bdoi:\s*10\.\d{4,9}/").unwrap());

static LEGACY_DOI_HOST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)dx\.doi\.org/").unwrap());

static SPACE_BEFORE_PERIOD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w \.").unwrap());

static ET_AL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bet al\b").unwrap());

// ", and Smith" or "and Smith, J." joining the final two authors where APA
// wants an ampersand.
static AND_BEFORE_FINAL_AUTHOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r",? and [A-Z][\p{L}'\-]+, [A-Z]\.").unwrap()
});

/// Run every check against one reference.
pub fn check_reference(reference: &Reference) -> Vec<StyleFinding> {
    let mut findings = Vec::new();
    let text = &reference.cleaned_text;
    let index = reference.index;
    let mut push = |severity, field, message: String| {
        findings.push(StyleFinding {
            index,
            severity,
            field,
            message,
        });
    };

    if reference.malformed {
        push(
            Severity::Error,
            "entry",
            "entry too short to be a complete reference".into(),
        );
        return findings;
    }

    if !reference.authors.is_empty() && !INVERTED_AUTHOR.is_match(text) {
        push(
            Severity::Warning,
            "authors",
            "first author is not in inverted form (Surname, I.)".into(),
        );
    }

    if AND_BEFORE_FINAL_AUTHOR.is_match(text) {
        push(
            Severity::Warning,
            "authors",
            "use \"&\" rather than \"and\" before the final author".into(),
        );
    }

    if ET_AL.is_match(text) {
        push(
            Severity::Error,
            "authors",
            "reference-list entries must list authors, not \"et al.\"".into(),
        );
    }

    match reference.year {
        Some(_) if !PARENTHESIZED_YEAR.is_match(text) => push(
            Severity::Warning,
            "year",
            "publication year is not parenthesized after the authors".into(),
        ),
        None => push(Severity::Error, "year", "no publication year found".into()),
        _ => {}
    }

    match reference.title {
        Some(ref title) if looks_all_caps(title) => push(
            Severity::Warning,
            "title",
            "title is in all caps; APA uses sentence case".into(),
        ),
        Some(ref title) if looks_title_case(title) => push(
            Severity::Warning,
            "title",
            "title appears to be in Title Case; APA uses sentence case".into(),
        ),
        Some(_) => {}
        None => push(
            Severity::Warning,
            "title",
            "no title could be identified in the entry".into(),
        ),
    }

    if BARE_DOI.is_match(text) {
        push(
            Severity::Warning,
            "doi",
            "DOI should be given as a URL (https://doi.org/...), not a doi: prefix".into(),
        );
    }

    if LEGACY_DOI_HOST.is_match(text) {
        push(
            Severity::Warning,
            "doi",
            "dx.doi.org is the legacy resolver host; use https://doi.org/".into(),
        );
    }

    // Spacing checks run on the raw text; cleaning collapses whitespace.
    if reference.raw_text.contains("  ") {
        push(
            Severity::Warning,
            "punctuation",
            "double space in entry".into(),
        );
    }
    if SPACE_BEFORE_PERIOD.is_match(&reference.raw_text) {
        push(
            Severity::Warning,
            "punctuation",
            "space before period".into(),
        );
    }

    findings
}

/// Run the style checks over a whole document.
pub fn check_document(references: &[Reference]) -> Vec<StyleFinding> {
    references.iter().flat_map(check_reference).collect()
}

fn looks_all_caps(title: &str) -> bool {
    let letters: Vec<char> = title.chars().filter(|c| c.is_ascii_alphabetic()).collect();
    letters.len() >= 10 && letters.iter().all(char::is_ascii_uppercase)
}

/// Heuristic: a title where most multi-letter interior words are capitalized
/// is Title Case. Short connectives are ignored, as Title Case itself
/// lowercases them.
fn looks_title_case(title: &str) -> bool {
    let words: Vec<&str> = title
        .split_whitespace()
        .skip(1)
        .filter(|w| w.chars().filter(char::is_ascii_alphabetic).count() > 3)
        .collect();
    if words.len() < 3 {
        return false;
    }
    let capitalized = words
        .iter()
        .filter(|w| w.chars().next().is_some_and(|c| c.is_ascii_uppercase()))
        .count();
    capitalized * 3 >= words.len() * 2
}
