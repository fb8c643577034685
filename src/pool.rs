//! Concurrent fan-out of one lookup across all enabled registries.
//!
//! Each query runs as its own task in a [`JoinSet`], bounded by a per-source
//! counting semaphore and paced by the per-source governor. The pool
//! aggregates every terminal answer and keeps transient failures separate,
//! so callers can tell "nobody has this record" apart from "nobody could be
//! reached".

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::cache::{IdentifierCache, id_key, title_key};
use crate::identifiers::CanonicalId;
use crate::rate_limit::{RateLimiters, run_governed};
use crate::registry::crossref::CrossRef;
use crate::registry::doi_org::DoiOrg;
use crate::registry::europe_pmc::EuropePmc;
use crate::registry::pubmed::PubMed;
use crate::registry::{LookupResult, RegistrySource, SourceError};
use crate::{Config, Reference, SourceStatus};

/// Per-source progress callback: (source name, status, elapsed).
pub type SourceProgress = Arc<dyn Fn(&'static str, SourceStatus, Duration) + Send + Sync>;

/// Aggregated outcome of fanning one lookup across the registries.
#[derive(Debug, Default)]
pub struct LookupOutcome {
    /// Every record returned, in completion order.
    pub results: Vec<LookupResult>,
    /// Number of sources that were asked.
    pub attempted: usize,
    /// Sources that failed transiently (timeout, 5xx, retries exhausted).
    pub transient_failures: Vec<String>,
}

impl LookupOutcome {
    /// True when every attempted source failed transiently — no source gave
    /// a terminal answer, so "not found" cannot be concluded.
    pub fn all_transient(&self) -> bool {
        self.attempted > 0
            && self.results.is_empty()
            && self.transient_failures.len() == self.attempted
    }
}

/// Shared registry pool for a verification run.
pub struct RegistryPool {
    sources: Vec<Arc<dyn RegistrySource>>,
    client: reqwest::Client,
    limiters: Arc<RateLimiters>,
    semaphores: HashMap<&'static str, Arc<Semaphore>>,
    cache: Arc<IdentifierCache>,
    timeout: Duration,
    max_retries: u32,
}

impl RegistryPool {
    /// Build the production pool from configuration: PubMed, CrossRef,
    /// doi.org and Europe PMC, minus any disabled sources.
    pub fn from_config(config: &Config, cache: Arc<IdentifierCache>) -> Self {
        let all: Vec<Arc<dyn RegistrySource>> = vec![
            Arc::new(PubMed),
            Arc::new(CrossRef {
                mailto: config.crossref_mailto.clone(),
            }),
            Arc::new(DoiOrg),
            Arc::new(EuropePmc),
        ];
        let sources: Vec<Arc<dyn RegistrySource>> = all
            .into_iter()
            .filter(|s| !config.disabled_sources.iter().any(|d| d == s.name()))
            .collect();

        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self::assemble(sources, client, config, cache)
    }

    /// Build a pool over arbitrary sources. Used by tests with mocks.
    pub fn with_sources(
        sources: Vec<Arc<dyn RegistrySource>>,
        config: &Config,
        cache: Arc<IdentifierCache>,
    ) -> Self {
        Self::assemble(sources, reqwest::Client::new(), config, cache)
    }

    fn assemble(
        sources: Vec<Arc<dyn RegistrySource>>,
        client: reqwest::Client,
        config: &Config,
        cache: Arc<IdentifierCache>,
    ) -> Self {
        let limiters = Arc::new(RateLimiters::new(config.crossref_mailto.is_some()));
        let semaphores = sources
            .iter()
            .map(|s| {
                (
                    s.name(),
                    Arc::new(Semaphore::new(config.per_source_concurrency.max(1))),
                )
            })
            .collect();

        Self {
            sources,
            client,
            limiters,
            semaphores,
            cache,
            timeout: Duration::from_secs(config.source_timeout_secs),
            max_retries: config.max_retries,
        }
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Tie-break priority of a source by name; unknown sources rank last.
    pub fn priority_of(&self, name: &str) -> u8 {
        self.sources
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.priority())
            .unwrap_or(u8::MAX)
    }

    /// Resolve an identifier against every source that understands it.
    pub async fn resolve_identifier(
        &self,
        id: &CanonicalId,
        progress: SourceProgress,
    ) -> LookupOutcome {
        let key = id_key(id);
        let eligible: Vec<Arc<dyn RegistrySource>> = self
            .sources
            .iter()
            .filter(|s| s.can_resolve(id))
            .cloned()
            .collect();
        let id = id.clone();
        self.fan_out(eligible, key, progress, move |source, client, timeout| {
            let id = id.clone();
            async move { source.resolve(&id, &client, timeout).await }
        })
        .await
    }

    /// Search every source by the reference's title.
    pub async fn search_title(
        &self,
        reference: &Reference,
        progress: SourceProgress,
    ) -> LookupOutcome {
        let Some(ref title) = reference.title else {
            return LookupOutcome::default();
        };
        let key = title_key(title);
        let reference = Arc::new(reference.clone());
        self.fan_out(
            self.sources.clone(),
            key,
            progress,
            move |source, client, timeout| {
                let reference = Arc::clone(&reference);
                async move { source.search(&reference, &client, timeout).await }
            },
        )
        .await
    }

    async fn fan_out<F, Fut>(
        &self,
        sources: Vec<Arc<dyn RegistrySource>>,
        cache_key: String,
        progress: SourceProgress,
        op: F,
    ) -> LookupOutcome
    where
        F: Fn(Arc<dyn RegistrySource>, reqwest::Client, Duration) -> Fut
            + Clone
            + Send
            + Sync
            + 'static,
        Fut: std::future::Future<Output = Result<Option<LookupResult>, SourceError>>
            + Send
            + 'static,
    {
        let mut outcome = LookupOutcome {
            attempted: sources.len(),
            ..Default::default()
        };
        let mut join_set = JoinSet::new();

        for source in sources {
            let name = source.name();

            // Cache pre-check happens before spawning so a hit never
            // occupies a semaphore permit.
            if let Some(answer) = self.cache.get(&cache_key, name) {
                (progress)(name, SourceStatus::Skipped, Duration::ZERO);
                if let Some(record) = answer {
                    outcome.results.push(record);
                }
                outcome.attempted -= 1;
                continue;
            }

            let semaphore = Arc::clone(&self.semaphores[name]);
            let limiters = Arc::clone(&self.limiters);
            let cache = Arc::clone(&self.cache);
            let client = self.client.clone();
            let cache_key = cache_key.clone();
            let timeout = self.timeout;
            let max_retries = self.max_retries;
            let progress = Arc::clone(&progress);
            let op = op.clone();

            join_set.spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return (name, Err(SourceError::Transient("pool shut down".into())));
                };

                let query = run_governed(name, &limiters, timeout, max_retries, || {
                    op(Arc::clone(&source), client.clone(), timeout)
                })
                .await;

                match &query.result {
                    Ok(answer) => {
                        cache.insert(&cache_key, name, answer.as_ref());
                        let status = if answer.is_some() {
                            SourceStatus::Match
                        } else {
                            SourceStatus::NoMatch
                        };
                        (progress)(name, status, query.elapsed);
                    }
                    Err(SourceError::RateLimited { .. }) => {
                        (progress)(name, SourceStatus::RateLimited, query.elapsed);
                    }
                    Err(SourceError::Transient(_)) => {
                        (progress)(name, SourceStatus::Transient, query.elapsed);
                    }
                }
                (name, query.result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            let Ok((name, result)) = joined else {
                continue;
            };
            match result {
                Ok(Some(record)) => outcome.results.push(record),
                Ok(None) => {}
                Err(err) => {
                    tracing::debug!(source = name, error = %err, "registry query failed");
                    outcome.transient_failures.push(name.to_string());
                }
            }
        }

        outcome
    }
}
