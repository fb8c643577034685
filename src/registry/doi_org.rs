//! DOI resolution via doi.org content negotiation (CSL-JSON).
//!
//! This is the ground truth for whether a DOI is registered at all — a DOI
//! that doi.org cannot resolve does not exist, regardless of what any
//! aggregator says. Resolve-only; the handle system has no search API.

use std::time::Duration;

use super::{LookupResult, RegistrySource, SourceFuture, USER_AGENT, check_status};
use crate::Reference;
use crate::identifiers::CanonicalId;

pub struct DoiOrg;

impl DoiOrg {
    fn record_from_csl(data: &serde_json::Value) -> Option<LookupResult> {
        let title = match &data["title"] {
            serde_json::Value::Array(arr) => arr.first().and_then(|v| v.as_str()),
            serde_json::Value::String(s) => Some(s.as_str()),
            _ => None,
        }?
        .to_string();
        if title.is_empty() {
            return None;
        }

        let authors: Vec<String> = data["author"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|a| {
                        if let Some(family) = a["family"].as_str() {
                            let given = a["given"].as_str().unwrap_or("");
                            Some(format!("{given} {family}").trim().to_string())
                        } else {
                            a["literal"].as_str().map(String::from)
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        let year = data["issued"]["date-parts"][0][0]
            .as_i64()
            .map(|y| y as i32);
        let venue = data["container-title"].as_str().map(String::from);
        let doi = data["DOI"].as_str().map(str::to_lowercase);
        let url = doi.as_ref().map(|d| format!("https://doi.org/{d}"));

        Some(LookupResult {
            source: "doi.org".into(),
            title,
            authors,
            year,
            venue,
            doi,
            url,
        })
    }
}

impl RegistrySource for DoiOrg {
    fn name(&self) -> &'static str {
        "doi.org"
    }

    fn priority(&self) -> u8 {
        2
    }

    fn can_resolve(&self, id: &CanonicalId) -> bool {
        matches!(id, CanonicalId::Doi(_))
    }

    fn resolve<'a>(
        &'a self,
        id: &'a CanonicalId,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> SourceFuture<'a> {
        Box::pin(async move {
            let CanonicalId::Doi(doi) = id else {
                return Ok(None);
            };
            let url = format!("https://doi.org/{doi}");

            let resp = client
                .get(&url)
                .header("Accept", "application/vnd.citationstyles.csl+json")
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

            Ok(Self::record_from_csl(&data))
        })
    }

    fn search<'a>(
        &'a self,
        _reference: &'a Reference,
        _client: &'a reqwest::Client,
        _timeout: Duration,
    ) -> SourceFuture<'a> {
        Box::pin(async { Ok(None) })
    }
}
