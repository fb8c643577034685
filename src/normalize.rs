//! Reference text cleaning and field segmentation.
//!
//! Raw reference strings arrive contaminated with PDF-extraction noise:
//! page-footer watermarks, header lines, copyright notices, hyphenated
//! line-break splits, DOIs broken across lines. Cleaning is a pure function;
//! it never touches the network.

use once_cell::sync::Lazy;
use regex::Regex;

/// Minimum residual length (chars) for a cleaned reference to be worth
/// looking up. Below this the reference is marked malformed and routed to
/// NOT_FOUND with an "insufficient text" rationale.
pub const MIN_VIABLE_LEN: usize = 25;

/// Noise-line patterns observed in PDF-extracted reference lists.
static NOISE_LINES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?im)^Downloaded from.*$",
        r"(?im)^Available at.*$",
        r"(?im)^Access provided by.*$",
        r"(?im)^Vol(?:ume)?\s*\d+.*$",
        r"(?im)^Copyright\s*©?.*$",
        r"(?im)^All rights reserved.*$",
        r"(?im)^This article.*$",
        r"(?im)^Author.{0,40}manuscript.*$",
        r"(?m)^\s*\d{1,3}\s*$",
        r"(?im)^ISSN[:\s].*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("noise pattern"))
    .collect()
});

static HYPHEN_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w)-\s*\n\s*(\w)").unwrap());
static MULTI_NEWLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").unwrap());
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").unwrap());

// DOI reassembly: DOIs split across line breaks by PDF extractors. The
// hyphen-continuation pattern is anchored to a DOI prefix so ordinary
// hyphenated word splits are left for HYPHEN_BREAK to rejoin.
static DOI_HYPHEN_CONT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(10\.\d{4,9}/\S*)-\s*[\n\r]+\s*(\S+)").unwrap());
static DOI_LINE_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(10\.\d{4,9}/[^\s\n]*?)[\n\r]+\s*(\S+)").unwrap());
static DOI_SPACE_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(10\.\d{4,9}/\S+)-\s+(\d)").unwrap());

/// Result of cleaning a raw reference string.
#[derive(Debug, Clone)]
pub struct Cleaned {
    pub text: String,
    /// False when noise lines were dropped — the cleaning may have been
    /// lossy and downstream confidence should reflect that.
    pub lossless: bool,
}

/// Clean a raw reference string: drop noise lines, rejoin hyphenated
/// line-break splits, reassemble broken DOIs, collapse whitespace.
pub fn clean_reference(raw: &str) -> Cleaned {
    let mut text = raw.replace('\u{ad}', ""); // soft hyphens
    let mut lossless = true;

    for pattern in NOISE_LINES.iter() {
        let stripped = pattern.replace_all(&text, "");
        if stripped != text {
            lossless = false;
            text = stripped.into_owned();
        }
    }

    // Reassemble DOIs before collapsing line structure: a hyphen-continued
    // DOI must keep its hyphen, an ordinary word split must not.
    let text = DOI_HYPHEN_CONT.replace_all(&text, "$1-$2");
    let text = DOI_LINE_SPLIT.replace_all(&text, "$1$2");
    let text = DOI_SPACE_SPLIT.replace_all(&text, "$1-$2");

    let text = HYPHEN_BREAK.replace_all(&text, "$1$2");
    let text = MULTI_NEWLINE.replace_all(&text, "\n");
    let text = text.replace('\n', " ");
    let text = MULTI_SPACE.replace_all(&text, " ");

    Cleaned {
        text: text.trim().to_string(),
        lossless,
    }
}

/// Segmented citation fields. All optional: segmentation is best-effort and
/// a missing field is a normal outcome, not an error.
#[derive(Debug, Clone, Default)]
pub struct Fields {
    pub authors: Vec<String>,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
}

static PAREN_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((\d{4})[a-z]?\)").unwrap());
static BARE_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|\D)((?:19|20)\d{2})(?:\D|$)").unwrap());

/// APA-style inverted author: `Last, F. M.` or `Last, First`.
static AUTHOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\p{Lu}[\p{Ll}\p{Lu}'\-]+),\s*((?:\p{Lu}\.\s*)+|\p{Lu}[\p{Ll}]+(?:\s+\p{Lu}\.)?)",
    )
    .unwrap()
});

/// `Journal, 15(3), 123-145` style volume block, used to locate the venue.
static VOLUME_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*\(\d+(?:-\d+)?\)\s*[,:]?\s*\d+(?:[-–]\d+)?").unwrap());

/// Segment a cleaned reference into authors, year, title and venue.
///
/// APA-shaped citations segment well; anything else degrades gracefully to
/// partial fields, which the cascade tolerates.
pub fn segment_fields(text: &str) -> Fields {
    let year = extract_year(text);
    let authors = extract_authors(text);
    let title = extract_title(text, year);
    let venue = extract_venue(text);

    Fields {
        authors,
        title,
        year,
        venue,
    }
}

fn extract_year(text: &str) -> Option<i32> {
    if let Some(caps) = PAREN_YEAR.captures(text) {
        let year: i32 = caps[1].parse().ok()?;
        // Deliberately no upper bound: future years must survive extraction
        // so the impossible-date rule can see them.
        if year >= 1800 {
            return Some(year);
        }
    }
    for caps in BARE_YEAR.captures_iter(text) {
        if let Ok(year) = caps[1].parse::<i32>() {
            return Some(year);
        }
    }
    None
}

/// Largest char boundary at or below `max`, so slicing never lands inside a
/// multi-byte character.
fn boundary_before(text: &str, max: usize) -> usize {
    if text.len() <= max {
        return text.len();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    end
}

fn extract_authors(text: &str) -> Vec<String> {
    // Authors precede the parenthesized year in APA style.
    let section = match PAREN_YEAR.find(text) {
        Some(m) => &text[..m.start()],
        None => {
            // Fall back to the text before the first sentence-looking break.
            let end = text
                .find(". ")
                .map(|p| p + 1)
                .unwrap_or_else(|| boundary_before(text, 200));
            &text[..end]
        }
    };

    let mut authors = Vec::new();
    for caps in AUTHOR.captures_iter(section) {
        let name = format!("{}, {}", &caps[1], caps[2].trim());
        if !authors.contains(&name) {
            authors.push(name);
        }
        if authors.len() >= 20 {
            break;
        }
    }
    authors
}

fn extract_title(text: &str, year: Option<i32>) -> Option<String> {
    let year = year?;
    let after_year = Regex::new(&format!(r"\({year}[a-z]?\)\.?\s*"))
        .ok()?
        .find(text)
        .map(|m| &text[m.end()..])?;

    // Title runs to the first period followed by an uppercase venue word.
    let end = after_year
        .char_indices()
        .filter(|&(_, c)| c == '.')
        .map(|(i, _)| i)
        .find(|&i| {
            after_year[i + 1..]
                .trim_start()
                .chars()
                .next()
                .is_some_and(|c| c.is_uppercase())
        })
        .unwrap_or(after_year.len());

    let title = after_year[..end].trim().trim_end_matches('.').trim();
    if title.len() >= 10 {
        Some(title.to_string())
    } else {
        None
    }
}

fn extract_venue(text: &str) -> Option<String> {
    // The venue sits between the title's closing period and the volume block.
    let vol = VOLUME_BLOCK.find(text)?;
    let before = text[..vol.start()].trim_end_matches([' ', ',']);
    let start = before.rfind(". ").map(|p| p + 2).unwrap_or(0);
    let venue = before[start..].trim().trim_end_matches(',').trim();
    if venue.len() >= 3 && venue.chars().next().is_some_and(|c| c.is_uppercase()) {
        Some(venue.to_string())
    } else {
        None
    }
}
