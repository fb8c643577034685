//! Identifier extraction: DOI, PMID and their URL forms.
//!
//! Extraction never fails — a reference with no identifier is a common,
//! valid outcome. DOI-shaped tokens that are clearly truncated (a bare
//! prefix, a single-letter suffix) are parsing artifacts and are kept apart
//! from usable identifiers so they are never treated as evidence of fraud.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A canonical identifier for a cited work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CanonicalId {
    Doi(String),
    Pmid(String),
}

impl CanonicalId {
    pub fn as_str(&self) -> &str {
        match self {
            CanonicalId::Doi(s) | CanonicalId::Pmid(s) => s,
        }
    }

    /// Stable cache key, e.g. `doi:10.1000/xyz` or `pmid:12345678`.
    pub fn cache_key(&self) -> String {
        match self {
            CanonicalId::Doi(s) => format!("doi:{s}"),
            CanonicalId::Pmid(s) => format!("pmid:{s}"),
        }
    }
}

impl std::fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.cache_key())
    }
}

static DOI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:https?://(?:dx\.)?doi\.org/|\bdoi\s*[:=]\s*)?\b(10\.\d{4,9}/[^\s\]>]+)",
    )
    .unwrap()
});

static PMID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:PMID\s*:?\s*(\d{6,9})\b|PubMed\s*(?:ID)?\s*:?\s*(\d{6,9})\b|pubmed\.ncbi\.nlm\.nih\.gov/(\d{1,9}))",
    )
    .unwrap()
});

/// DOI shapes that indicate a truncated token rather than a real identifier.
static TRUNCATED_DOI: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^10\.\d{4,9}$",
        r"^10\.\d{4,9}/[a-z]{1,2}\.?$",
        r"^10\.\d{4,9}/978-?$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("truncated DOI pattern"))
    .collect()
});

/// Identifiers pulled from one cleaned reference.
#[derive(Debug, Clone, Default)]
pub struct ExtractedIds {
    /// Usable identifiers, deduplicated by canonical form.
    pub ids: Vec<CanonicalId>,
    /// Truncated DOI tokens, reported but never queried.
    pub damaged: Vec<String>,
}

/// Extract and canonicalize all identifiers in a cleaned reference string.
///
/// A DOI cited both bare and as a `doi.org` URL collapses to one entry.
pub fn extract(text: &str) -> ExtractedIds {
    let mut out = ExtractedIds::default();

    for caps in DOI.captures_iter(text) {
        let doi = canonicalize_doi(&caps[1]);
        if doi.is_empty() {
            continue;
        }
        if TRUNCATED_DOI.iter().any(|p| p.is_match(&doi)) {
            if !out.damaged.contains(&doi) {
                out.damaged.push(doi);
            }
            continue;
        }
        let id = CanonicalId::Doi(doi);
        if !out.ids.contains(&id) {
            out.ids.push(id);
        }
    }

    for caps in PMID.captures_iter(text) {
        let Some(m) = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)) else {
            continue;
        };
        let id = CanonicalId::Pmid(m.as_str().to_string());
        if !out.ids.contains(&id) {
            out.ids.push(id);
        }
    }

    out
}

/// Lowercase and strip trailing punctuation a citation sentence leaves on a
/// DOI.
fn canonicalize_doi(raw: &str) -> String {
    raw.trim()
        .trim_end_matches(['.', ',', ';', ':', ')', ']'])
        .to_lowercase()
}
