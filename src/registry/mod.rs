//! Registry source trait and implementations for scholarly databases.

pub mod crossref;
pub mod doi_org;
pub mod europe_pmc;
pub mod mock;
pub mod pubmed;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Reference;
use crate::identifiers::CanonicalId;
use crate::rate_limit::parse_retry_after;

/// Bibliographic record returned by a registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupResult {
    /// Registry the record came from.
    pub source: String,
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub doi: Option<String>,
    /// Landing page for the resolved record.
    pub url: Option<String>,
}

/// Error from a registry query, distinguishing rate limiting from other
/// transient failures. Terminal "not found" is `Ok(None)`, never an error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    #[error("rate limited (429)")]
    RateLimited { retry_after: Option<Duration> },
    #[error("{0}")]
    Transient(String),
}

/// Future type returned by registry operations.
pub type SourceFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Option<LookupResult>, SourceError>> + Send + 'a>>;

/// A scholarly registry that can resolve identifiers and search by title.
pub trait RegistrySource: Send + Sync {
    /// Canonical registry name (e.g. "PubMed", "CrossRef").
    fn name(&self) -> &'static str;

    /// Tie-break priority when two sources return equally similar records.
    /// Lower wins; domain-authoritative sources rank first.
    fn priority(&self) -> u8;

    /// Whether this registry can resolve the given identifier kind directly.
    fn can_resolve(&self, id: &CanonicalId) -> bool;

    /// Resolve an identifier to its registered record.
    ///
    /// `Ok(None)` means the identifier does not exist in this registry — a
    /// terminal answer, not a failure.
    fn resolve<'a>(
        &'a self,
        id: &'a CanonicalId,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> SourceFuture<'a>;

    /// Search by title (plus whatever metadata the registry accepts) and
    /// return the best candidate record, if any.
    fn search<'a>(
        &'a self,
        reference: &'a Reference,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> SourceFuture<'a>;
}

/// Map an HTTP status to the query outcome taxonomy.
///
/// Returns `Ok(true)` for success, `Ok(false)` for a terminal client error
/// (the record does not exist), `Err` for 429 and server-side failures.
pub(crate) fn check_status(resp: &reqwest::Response) -> Result<bool, SourceError> {
    let status = resp.status();
    if status.as_u16() == 429 {
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        return Err(SourceError::RateLimited { retry_after });
    }
    if status.is_client_error() {
        return Ok(false);
    }
    if !status.is_success() {
        return Err(SourceError::Transient(format!("HTTP {status}")));
    }
    Ok(true)
}

/// First `max` significant words of a title, for search queries. Skipping
/// one- and two-letter words keeps stopwords out of the query string.
pub(crate) fn query_words(title: &str, max: usize) -> Vec<String> {
    crate::matching::normalize_title(title)
        .split_whitespace()
        .filter(|w| w.len() > 2)
        .take(max)
        .map(String::from)
        .collect()
}

/// Extract a publication year from common registry date shapes:
/// `"2021"`, `"2021-03-15"`, `"2021 Mar"`.
pub(crate) fn parse_year(raw: &str) -> Option<i32> {
    raw.split(['-', ' ', '/']).next()?.parse().ok()
}

pub(crate) const USER_AGENT: &str = "citecheck/0.2 (reference verification)";
