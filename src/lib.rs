//! Forensic verification of bibliographic references.
//!
//! Given raw reference strings (as extracted from a manuscript) or bare
//! identifiers, this crate decides whether each citation corresponds to a
//! real, correctly-attributed publication — and when it does not, classifies
//! *why*: fabricated outright, a real identifier stapled to fabricated
//! metadata, real-but-unindexed grey literature, or simply unverifiable
//! because the text was too damaged to look up.
//!
//! The pipeline per reference: [`normalize`] → [`identifiers`] →
//! [`pool`] (concurrent registry lookups) → [`matching`] → [`cascade`].
//! A whole document is processed by [`verify_document`], which also runs the
//! [`batch`] pattern analyzer and the independent [`style`] validator.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub mod batch;
pub mod cache;
pub mod cascade;
pub mod config_file;
pub mod identifiers;
pub mod markers;
pub mod matching;
pub mod normalize;
pub mod pool;
pub mod rate_limit;
pub mod registry;
pub mod runner;
pub mod style;

// Re-export for convenience
pub use batch::{BatchSummary, Integrity};
pub use cache::{DEFAULT_NEGATIVE_TTL, DEFAULT_POSITIVE_TTL, IdentifierCache};
pub use cascade::{Action, RecordStatus, Tier, VerificationRecord};
pub use identifiers::CanonicalId;
pub use markers::SourceMarkers;
pub use registry::{LookupResult, SourceError};
pub use runner::{DocumentReport, QuickLookupError, verify_document, verify_identifier};

/// One cited work as claimed by the document author.
///
/// Built from a raw reference string by [`Reference::from_raw`]; immutable
/// once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    /// Verbatim text as supplied by the document parser.
    pub raw_text: String,
    /// Text after noise-line removal and de-hyphenation.
    pub cleaned_text: String,
    /// Extracted author names in citation order (may be empty).
    pub authors: Vec<String>,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    /// Canonical identifiers found in the text, deduplicated.
    pub identifiers: Vec<CanonicalId>,
    /// DOI-shaped tokens too truncated to resolve (parsing artifacts, not
    /// evidence of fabrication).
    pub damaged_dois: Vec<String>,
    /// 0-based position in the original reference list.
    pub index: usize,
    /// Residual text after cleaning was below the minimum viable citation
    /// length; lookup is skipped for such references.
    pub malformed: bool,
}

impl Reference {
    /// Parse a raw reference string: clean it, segment fields, extract
    /// identifiers.
    pub fn from_raw(raw: &str, index: usize) -> Self {
        let cleaned = normalize::clean_reference(raw);
        let malformed = cleaned.text.len() < normalize::MIN_VIABLE_LEN;
        let fields = if malformed {
            normalize::Fields::default()
        } else {
            normalize::segment_fields(&cleaned.text)
        };
        let extracted = identifiers::extract(&cleaned.text);

        Self {
            raw_text: raw.trim().to_string(),
            cleaned_text: cleaned.text,
            authors: fields.authors,
            title: fields.title,
            year: fields.year,
            venue: fields.venue,
            identifiers: extracted.ids,
            damaged_dois: extracted.damaged,
            index,
            malformed,
        }
    }
}

/// Status of a single registry query within a verification run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
    Match,
    NoMatch,
    Transient,
    RateLimited,
    Skipped,
}

/// Progress events emitted during verification, for external renderers.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Checking {
        index: usize,
        total: usize,
        title: String,
    },
    SourceQueryComplete {
        index: usize,
        source: &'static str,
        status: SourceStatus,
        elapsed: Duration,
    },
    Result {
        index: usize,
        total: usize,
        record: Box<VerificationRecord>,
    },
}

/// Configuration for a verification run.
///
/// Marker keyword sets are injected here and immutable for the lifetime of
/// the run, so classification is deterministic.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of concurrent reference workers.
    pub num_workers: usize,
    /// Timeout for a single registry HTTP call.
    pub source_timeout_secs: u64,
    /// Retry bound for transient registry failures.
    pub max_retries: u32,
    /// Per-source concurrency ceiling (counting semaphore).
    pub per_source_concurrency: usize,
    /// Email for the CrossRef polite pool (raises its rate limit).
    pub crossref_mailto: Option<String>,
    /// Registry sources to skip, by name.
    pub disabled_sources: Vec<String>,
    /// Document-level deadline; in-flight references are reported as
    /// incomplete when it expires, never dropped.
    pub document_timeout_secs: Option<u64>,
    /// Path to the persistent identifier cache (in-memory only when `None`).
    pub cache_path: Option<PathBuf>,
    pub cache_positive_ttl_secs: u64,
    pub cache_negative_ttl_secs: u64,
    /// Processing date override for the impossible-date and recency rules.
    /// `None` means today. Tests inject a fixed date here.
    pub processing_date: Option<NaiveDate>,
    /// Keyword sets for grey-literature / book-software / low-rigor source
    /// detection.
    pub markers: Arc<SourceMarkers>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_workers: 4,
            source_timeout_secs: 10,
            max_retries: 3,
            per_source_concurrency: 4,
            crossref_mailto: None,
            disabled_sources: vec![],
            document_timeout_secs: None,
            cache_path: None,
            cache_positive_ttl_secs: DEFAULT_POSITIVE_TTL.as_secs(),
            cache_negative_ttl_secs: DEFAULT_NEGATIVE_TTL.as_secs(),
            processing_date: None,
            markers: Arc::new(SourceMarkers::default()),
        }
    }
}

impl Config {
    /// The date classification rules compare against.
    pub fn today(&self) -> NaiveDate {
        self.processing_date
            .unwrap_or_else(|| chrono::Utc::now().date_naive())
    }
}

/// Build an [`IdentifierCache`] from configuration.
///
/// Opens a persistent SQLite-backed cache when `cache_path` is set, falling
/// back to in-memory on open failure.
pub fn build_identifier_cache(config: &Config) -> Arc<IdentifierCache> {
    let positive_ttl = Duration::from_secs(config.cache_positive_ttl_secs);
    let negative_ttl = Duration::from_secs(config.cache_negative_ttl_secs);
    if let Some(ref path) = config.cache_path {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match IdentifierCache::open(path, positive_ttl, negative_ttl) {
            Ok(cache) => {
                tracing::info!(path = %path.display(), "opened persistent identifier cache");
                return Arc::new(cache);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to open cache, falling back to in-memory");
            }
        }
    }
    Arc::new(IdentifierCache::new(positive_ttl, negative_ttl))
}

/// Verify a list of raw reference strings against scholarly registries.
///
/// References are verified concurrently; the returned records are in input
/// order regardless of completion order. Progress events are emitted via the
/// callback, and the run can be cancelled via the token — cancelled
/// references yield incomplete records rather than disappearing.
pub async fn verify_references(
    raw_refs: Vec<String>,
    config: Config,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> Vec<VerificationRecord> {
    runner::verify_references(raw_refs, config, progress, cancel).await
}
