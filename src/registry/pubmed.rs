//! PubMed via the NCBI E-utilities API.

use std::time::Duration;

use super::{
    LookupResult, RegistrySource, SourceFuture, USER_AGENT, check_status, parse_year, query_words,
};
use crate::Reference;
use crate::identifiers::CanonicalId;

const ESEARCH: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi";
const ESUMMARY: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esummary.fcgi";

pub struct PubMed;

impl PubMed {
    fn record_from_summary(item: &serde_json::Value, pmid: &str) -> Option<LookupResult> {
        let title = item["title"].as_str()?.trim_end_matches('.').to_string();
        if title.is_empty() {
            return None;
        }

        let authors: Vec<String> = item["authors"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|a| a["name"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        let year = item["pubdate"].as_str().and_then(parse_year);
        let venue = item["fulljournalname"].as_str().map(String::from);
        let doi = item["articleids"].as_array().and_then(|ids| {
            ids.iter()
                .find(|id| id["idtype"].as_str() == Some("doi"))
                .and_then(|id| id["value"].as_str())
                .map(str::to_lowercase)
        });

        Some(LookupResult {
            source: "PubMed".into(),
            title,
            authors,
            year,
            venue,
            doi,
            url: Some(format!("https://pubmed.ncbi.nlm.nih.gov/{pmid}/")),
        })
    }

    async fn fetch_summaries(
        client: &reqwest::Client,
        pmids: &[String],
        timeout: Duration,
    ) -> Result<serde_json::Value, super::SourceError> {
        let ids = pmids.join(",");
        let resp = client
            .get(ESUMMARY)
            .query(&[("db", "pubmed"), ("id", ids.as_str()), ("retmode", "json")])
            .header("User-Agent", USER_AGENT)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| super::SourceError::Transient(e.to_string()))?;

        if !check_status(&resp)? {
            return Ok(serde_json::Value::Null);
        }
        resp.json()
            .await
            .map_err(|e| super::SourceError::Transient(e.to_string()))
    }
}

impl RegistrySource for PubMed {
    fn name(&self) -> &'static str {
        "PubMed"
    }

    // Domain-authoritative for biomedical literature.
    fn priority(&self) -> u8 {
        0
    }

    fn can_resolve(&self, id: &CanonicalId) -> bool {
        matches!(id, CanonicalId::Pmid(_))
    }

    fn resolve<'a>(
        &'a self,
        id: &'a CanonicalId,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> SourceFuture<'a> {
        Box::pin(async move {
            let CanonicalId::Pmid(pmid) = id else {
                return Ok(None);
            };

            let data = Self::fetch_summaries(client, std::slice::from_ref(pmid), timeout).await?;
            let item = &data["result"][pmid.as_str()];
            // esummary reports unknown PMIDs inline rather than via HTTP 404.
            if item.is_null() || item["error"].is_string() {
                return Ok(None);
            }
            Ok(Self::record_from_summary(item, pmid))
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
            let term = format!("{}[Title]", query_words(title, 6).join(" "));

            let resp = client
                .get(ESEARCH)
                .query(&[
                    ("db", "pubmed"),
                    ("term", term.as_str()),
                    ("retmode", "json"),
                    ("retmax", "10"),
                ])
                .header("User-Agent", USER_AGENT)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| super::SourceError::Transient(e.to_string()))?;

            if !check_status(&resp)? {
                return Ok(None);
            }
            let data: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| super::SourceError::Transient(e.to_string()))?;

            let pmids: Vec<String> = data["esearchresult"]["idlist"]
                .as_array()
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();
            if pmids.is_empty() {
                return Ok(None);
            }

            let data = Self::fetch_summaries(client, &pmids, timeout).await?;
            let results = &data["result"];

            // Return the best candidate by title similarity; the cascade owns
            // the accept/reject thresholds.
            let mut best: Option<(f64, LookupResult)> = None;
            for pmid in &pmids {
                if let Some(record) = Self::record_from_summary(&results[pmid.as_str()], pmid) {
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
