//! Europe PMC REST API.
//!
//! Useful both as a fallback resolver (its query language accepts PMIDs and
//! DOIs) and as a second title-search source with broader coverage of
//! European and preprint literature than PubMed.

use std::time::Duration;

use super::{
    LookupResult, RegistrySource, SourceFuture, USER_AGENT, check_status, parse_year, query_words,
};
use crate::Reference;
use crate::identifiers::CanonicalId;

const SEARCH_URL: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest/search";

pub struct EuropePmc;

impl EuropePmc {
    fn record_from_result(item: &serde_json::Value) -> Option<LookupResult> {
        let title = item["title"].as_str()?.trim_end_matches('.').to_string();
        if title.is_empty() {
            return None;
        }

        let authors: Vec<String> = item["authorString"]
            .as_str()
            .map(|s| {
                s.trim_end_matches('.')
                    .split(", ")
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let year = item["pubYear"]
            .as_str()
            .and_then(parse_year)
            .or_else(|| item["pubYear"].as_i64().map(|y| y as i32));
        let venue = item["journalTitle"].as_str().map(String::from);
        let doi = item["doi"].as_str().map(str::to_lowercase);
        let url = match (item["pmid"].as_str(), doi.as_ref()) {
            (Some(pmid), _) => Some(format!("https://europepmc.org/abstract/MED/{pmid}")),
            (None, Some(d)) => Some(format!("https://doi.org/{d}")),
            _ => None,
        };

        Some(LookupResult {
            source: "Europe PMC".into(),
            title,
            authors,
            year,
            venue,
            doi,
            url,
        })
    }

    async fn run_query(
        client: &reqwest::Client,
        query: &str,
        timeout: Duration,
    ) -> Result<Vec<serde_json::Value>, super::SourceError> {
        let resp = client
            .get(SEARCH_URL)
            .query(&[("query", query), ("format", "json"), ("pageSize", "5")])
            .header("User-Agent", USER_AGENT)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| super::SourceError::Transient(e.to_string()))?;

        if !check_status(&resp)? {
            return Ok(vec![]);
        }
        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| super::SourceError::Transient(e.to_string()))?;
        Ok(data["resultList"]["result"]
            .as_array()
            .cloned()
            .unwrap_or_default())
    }
}

impl RegistrySource for EuropePmc {
    fn name(&self) -> &'static str {
        "Europe PMC"
    }

    fn priority(&self) -> u8 {
        3
    }

    fn can_resolve(&self, id: &CanonicalId) -> bool {
        matches!(id, CanonicalId::Pmid(_) | CanonicalId::Doi(_))
    }

    fn resolve<'a>(
        &'a self,
        id: &'a CanonicalId,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> SourceFuture<'a> {
        Box::pin(async move {
            let query = match id {
                CanonicalId::Pmid(pmid) => format!("EXT_ID:{pmid} AND SRC:MED"),
                CanonicalId::Doi(doi) => format!("DOI:\"{doi}\""),
            };
            let results = Self::run_query(client, &query, timeout).await?;
            Ok(results.first().and_then(Self::record_from_result))
        })
    }

    fn search<'a>(
        &'a self,
        reference: &'a Reference,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> SourceFuture<'a> {
        Box::pin(async move {
            let Some(ref title) = reference.title else {
                return Ok(None);
            };
            let query = format!("TITLE:\"{}\"", query_words(title, 6).join(" "));
            let results = Self::run_query(client, &query, timeout).await?;

            let mut best: Option<(f64, LookupResult)> = None;
            for item in &results {
                if let Some(record) = Self::record_from_result(item) {
                    let sim = crate::matching::title_similarity(title, &record.title);
                    if best.as_ref().is_none_or(|(s, _)| sim > *s) {
                        best = Some((sim, record));
                    }
                }
            }
            Ok(best.map(|(_, record)| record))
        })
    }
}
