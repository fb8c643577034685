//! Keyword marker sets for source-type detection.
//!
//! These drive the grey-literature, book/software and low-rigor rules in the
//! classification cascade. The sets are injected through [`crate::Config`] so
//! a run's classification is a pure function of its inputs.

/// Keyword sets matched case-insensitively against a reference's venue (or,
/// when no venue was segmented, its full cleaned text).
#[derive(Debug, Clone)]
pub struct SourceMarkers {
    /// Institutional publishers whose reports rarely appear in scholarly
    /// registries: WHO, OECD, government agencies, NGOs.
    pub grey_literature: Vec<String>,
    /// Books, chapters, software and dataset citations — legitimately
    /// unindexed by article registries.
    pub book_or_software: Vec<String>,
    /// Venues with weak or absent editorial rigor (preprint servers,
    /// predatory-adjacent outlets, general web content).
    pub low_quality: Vec<String>,
}

impl Default for SourceMarkers {
    fn default() -> Self {
        Self {
            grey_literature: to_owned(&[
                "world health organization",
                "who press",
                "who guidelines",
                "united nations",
                "unicef",
                "unesco",
                "oecd",
                "world bank",
                "centers for disease control",
                "cdc",
                "national institutes of health",
                "food and drug administration",
                "european commission",
                "government printing office",
                "department of health",
                "ministry of health",
                "technical report",
                "working paper",
                "white paper",
                "policy brief",
                "committee report",
                "consensus statement",
                "practice guideline",
                "clinical guideline",
            ]),
            book_or_software: to_owned(&[
                "in press",
                "press",
                "publishers",
                "publishing",
                "books",
                "handbook of",
                "textbook",
                "encyclopedia",
                "dissertation",
                "doctoral thesis",
                "master's thesis",
                "(ed.)",
                "(eds.)",
                "edition",
                "chapter",
                "software",
                "computer program",
                "r package",
                "python package",
                "version",
                "github",
                "zenodo",
                "dataset",
            ]),
            low_quality: to_owned(&[
                "preprint",
                "researchgate",
                "academia.edu",
                "ssrn",
                "medium.com",
                "blog",
                "blogspot",
                "wordpress",
                "substack",
                "wikipedia",
                "youtube",
                "linkedin",
                "news release",
                "press release",
            ]),
        }
    }
}

impl SourceMarkers {
    /// The first marker from `set` occurring in `text`, for rationale
    /// strings. `None` means no marker applies.
    pub fn first_match<'a>(&'a self, set: &'a [String], text: &str) -> Option<&'a str> {
        let lower = text.to_lowercase();
        set.iter().find(|m| lower.contains(m.as_str())).map(String::as_str)
    }
}

fn to_owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn who_report_matches_grey_literature() {
        let markers = SourceMarkers::default();
        let hit = markers.first_match(
            &markers.grey_literature,
            "World Health Organization. (2020). Guidelines on physical activity. WHO Press.",
        );
        assert_eq!(hit, Some("world health organization"));
    }

    #[test]
    fn preprint_matches_low_quality() {
        let markers = SourceMarkers::default();
        let hit = markers.first_match(&markers.low_quality, "medRxiv preprint, not peer reviewed");
        assert_eq!(hit, Some("preprint"));
    }

    #[test]
    fn book_marker_matches() {
        let markers = SourceMarkers::default();
        let hit = markers.first_match(
            &markers.book_or_software,
            "Handbook of Psychophysiology (3rd edition)",
        );
        assert!(hit.is_some());
    }

    #[test]
    fn journal_article_matches_nothing() {
        let markers = SourceMarkers::default();
        let text = "Journal of Clinical Oncology, 38(4), 342-350";
        assert!(markers.first_match(&markers.grey_literature, text).is_none());
        assert!(markers.first_match(&markers.book_or_software, text).is_none());
        assert!(markers.first_match(&markers.low_quality, text).is_none());
    }

    #[test]
    fn matching_is_case_insensitive() {
        let markers = SourceMarkers::default();
        let hit = markers.first_match(
            &markers.grey_literature,
            "WORLD HEALTH ORGANIZATION technical series",
        );
        assert_eq!(hit, Some("world health organization"));
    }

    #[test]
    fn first_match_reports_marker() {
        let markers = SourceMarkers::default();
        let hit = markers.first_match(&markers.grey_literature, "An OECD working paper");
        assert_eq!(hit, Some("oecd"));
    }
}
