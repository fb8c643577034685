//! CrossRef works API.

use std::time::Duration;

use super::{
    LookupResult, RegistrySource, SourceFuture, USER_AGENT, check_status, query_words,
};
use crate::Reference;
use crate::identifiers::CanonicalId;

pub struct CrossRef {
    /// Contact email for the CrossRef polite pool (raises the rate limit).
    pub mailto: Option<String>,
}

impl CrossRef {
    fn user_agent(&self) -> String {
        match self.mailto {
            Some(ref email) => format!("{USER_AGENT} (mailto:{email})"),
            None => USER_AGENT.to_string(),
        }
    }

    fn record_from_work(work: &serde_json::Value) -> Option<LookupResult> {
        let title = work["title"]
            .as_array()
            .and_then(|a| a.first())
            .and_then(|v| v.as_str())?
            .to_string();
        if title.is_empty() {
            return None;
        }

        let authors: Vec<String> = work["author"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .map(|a| {
                        let given = a["given"].as_str().unwrap_or("");
                        let family = a["family"].as_str().unwrap_or("");
                        format!("{given} {family}").trim().to_string()
                    })
                    .filter(|name| !name.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let year = ["published-print", "published-online", "issued"]
            .iter()
            .find_map(|field| {
                work[field]["date-parts"][0][0]
                    .as_i64()
                    .map(|y| y as i32)
            });

        let venue = work["container-title"]
            .as_array()
            .and_then(|a| a.first())
            .and_then(|v| v.as_str())
            .map(String::from);

        let doi = work["DOI"].as_str().map(str::to_lowercase);
        let url = doi.as_ref().map(|d| format!("https://doi.org/{d}"));

        Some(LookupResult {
            source: "CrossRef".into(),
            title,
            authors,
            year,
            venue,
            doi,
            url,
        })
    }
}

impl RegistrySource for CrossRef {
    fn name(&self) -> &'static str {
        "CrossRef"
    }

    fn priority(&self) -> u8 {
        1
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
            let url = format!("https://api.crossref.org/works/{}", urlencoding::encode(doi));

            let resp = client
                .get(&url)
                .header("User-Agent", self.user_agent())
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

            Ok(Self::record_from_work(&data["message"]))
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
            let query = query_words(title, 6).join(" ");
            let mut url = format!(
                "https://api.crossref.org/works?query.title={}&rows=5",
                urlencoding::encode(&query)
            );
            if let Some(ref email) = self.mailto {
                url.push_str(&format!("&mailto={}", urlencoding::encode(email)));
            }

            let resp = client
                .get(&url)
                .header("User-Agent", self.user_agent())
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

            let items = data["message"]["items"].as_array().cloned().unwrap_or_default();
            let mut best: Option<(f64, LookupResult)> = None;
            for item in &items {
                if let Some(record) = Self::record_from_work(item) {
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
