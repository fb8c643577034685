//! Verification run orchestration.
//!
//! A fixed pool of workers pulls references off a shared channel, runs the
//! lookup pipeline for each, and reports records back to a collector that
//! reassembles them in input order. Cancellation and the document deadline
//! both resolve to the same behavior: whatever has finished is kept, and
//! every reference still in flight gets an incomplete record. Nothing is
//! ever silently dropped.

use std::sync::Arc;
use std::time::Duration;

use chrono::Datelike;
use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::batch::{self, BatchSummary};
use crate::cascade::{self, CascadeInput, VerificationRecord};
use crate::identifiers;
use crate::pool::{LookupOutcome, RegistryPool, SourceProgress};
use crate::registry::LookupResult;
use crate::style::{self, StyleFinding};
use crate::{Config, ProgressEvent, Reference, build_identifier_cache};

/// Boxed progress callback shared across workers.
pub type ProgressFn = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Everything a renderer needs for one document.
#[derive(Debug, Serialize)]
pub struct DocumentReport {
    /// One record per reference, in document order.
    pub records: Vec<VerificationRecord>,
    pub summary: BatchSummary,
    /// Formatting findings; independent of the verification verdicts.
    pub style_findings: Vec<StyleFinding>,
}

/// Verify raw reference strings; records come back in input order.
pub async fn verify_references(
    raw_refs: Vec<String>,
    config: Config,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> Vec<VerificationRecord> {
    let references = parse_all(&raw_refs);
    let cache = build_identifier_cache(&config);
    let pool = Arc::new(RegistryPool::from_config(&config, cache));
    run_workers(references, pool, config, Arc::new(progress), cancel).await
}

/// Verify a whole document: records, batch summary, and style findings.
pub async fn verify_document(
    raw_refs: Vec<String>,
    config: Config,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> DocumentReport {
    let references = parse_all(&raw_refs);
    let style_findings = style::check_document(&references);

    let cache = build_identifier_cache(&config);
    let pool = Arc::new(RegistryPool::from_config(&config, cache));
    let records = run_workers(references, pool, config, Arc::new(progress), cancel).await;
    let summary = batch::summarize(&records);

    DocumentReport {
        records,
        summary,
        style_findings,
    }
}

/// Error from quick single-identifier lookup.
#[derive(Debug, thiserror::Error)]
pub enum QuickLookupError {
    #[error("no DOI or PMID recognized in {0:?}")]
    UnrecognizedIdentifier(String),
}

/// Quick mode: resolve one identifier string directly, no cascade.
///
/// Returns the record from the highest-priority source that had one, or
/// `None` when every source that understands the identifier says not-found.
pub async fn verify_identifier(
    raw: &str,
    config: &Config,
) -> Result<Option<LookupResult>, QuickLookupError> {
    let extracted = identifiers::extract(raw);
    let Some(id) = extracted.ids.first() else {
        return Err(QuickLookupError::UnrecognizedIdentifier(raw.to_string()));
    };

    let cache = build_identifier_cache(config);
    let pool = RegistryPool::from_config(config, cache);
    let quiet: SourceProgress = Arc::new(|_, _, _| {});
    let mut outcome = pool.resolve_identifier(id, quiet).await;

    outcome
        .results
        .sort_by_key(|r| pool.priority_of(&r.source));
    Ok(outcome.results.into_iter().next())
}

fn parse_all(raw_refs: &[String]) -> Vec<Reference> {
    raw_refs
        .iter()
        .enumerate()
        .map(|(index, raw)| Reference::from_raw(raw, index))
        .collect()
}

/// The worker pool proper, over an explicit registry pool. Callers that
/// assemble their own source set (embedders, tests with mocks) enter here;
/// everyone else goes through [`verify_references`] or [`verify_document`].
pub async fn run_workers(
    references: Vec<Reference>,
    pool: Arc<RegistryPool>,
    config: Config,
    progress: ProgressFn,
    cancel: CancellationToken,
) -> Vec<VerificationRecord> {
    let total = references.len();
    if total == 0 {
        return vec![];
    }

    // All jobs fit in the channel up front; workers drain it until empty or
    // cancelled.
    let (job_tx, job_rx) = async_channel::bounded(total);
    for reference in references.clone() {
        // Cannot fail: the channel is sized for exactly this many jobs.
        let _ = job_tx.try_send(reference);
    }
    job_tx.close();

    let (result_tx, mut result_rx) = tokio::sync::mpsc::unbounded_channel();
    let config = Arc::new(config);
    let mut workers = JoinSet::new();

    for _ in 0..config.num_workers.max(1) {
        let job_rx = job_rx.clone();
        let result_tx = result_tx.clone();
        let pool = Arc::clone(&pool);
        let config = Arc::clone(&config);
        let progress = Arc::clone(&progress);
        let cancel = cancel.clone();

        workers.spawn(async move {
            while let Ok(reference) = job_rx.recv().await {
                if cancel.is_cancelled() {
                    break;
                }
                let index = reference.index;
                let record = verify_single(reference, &pool, &config, total, &progress).await;
                if result_tx.send((index, record)).is_err() {
                    break;
                }
            }
        });
    }
    drop(result_tx);

    let mut slots: Vec<Option<VerificationRecord>> = (0..total).map(|_| None).collect();
    let mut received = 0usize;
    let deadline = config
        .document_timeout_secs
        .map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));

    loop {
        let deadline_expired = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            next = result_rx.recv() => match next {
                Some((index, record)) => {
                    (progress)(ProgressEvent::Result {
                        index,
                        total,
                        record: Box::new(record.clone()),
                    });
                    slots[index] = Some(record);
                    received += 1;
                    if received == total {
                        break;
                    }
                }
                None => break,
            },
            _ = cancel.cancelled() => {
                tracing::info!(completed = received, total, "verification cancelled");
                break;
            }
            _ = deadline_expired => {
                tracing::warn!(completed = received, total, "document deadline expired");
                cancel.cancel();
                break;
            }
        }
    }

    // Keep anything that finished while we were deciding to stop.
    while let Ok((index, record)) = result_rx.try_recv() {
        slots[index] = Some(record);
    }
    workers.abort_all();

    references
        .into_iter()
        .zip(slots)
        .map(|(reference, slot)| {
            slot.unwrap_or_else(|| VerificationRecord::incomplete(reference, vec![]))
        })
        .collect()
}

/// The full pipeline for one reference: identifier resolution, title-search
/// fallback, then classification.
async fn verify_single(
    reference: Reference,
    pool: &RegistryPool,
    config: &Config,
    total: usize,
    progress: &ProgressFn,
) -> VerificationRecord {
    let index = reference.index;
    (progress)(ProgressEvent::Checking {
        index,
        total,
        title: reference
            .title
            .clone()
            .unwrap_or_else(|| reference.cleaned_text.chars().take(60).collect()),
    });

    let source_progress: SourceProgress = {
        let progress = Arc::clone(progress);
        Arc::new(move |source, status, elapsed| {
            (progress)(ProgressEvent::SourceQueryComplete {
                index,
                source,
                status,
                elapsed,
            })
        })
    };

    // Malformed text cannot be looked up; an impossible date needs no lookup
    // to condemn it. Both classify on the reference alone.
    let today = config.today();
    let skip_lookup =
        reference.malformed || reference.year.is_some_and(|year| year > today.year());

    let mut id_lookup: Option<LookupOutcome> = None;
    let mut search_lookup: Option<LookupOutcome> = None;

    if !skip_lookup {
        if !reference.identifiers.is_empty() {
            let mut merged = LookupOutcome::default();
            for id in &reference.identifiers {
                let outcome = pool
                    .resolve_identifier(id, Arc::clone(&source_progress))
                    .await;
                merged.attempted += outcome.attempted;
                merged.results.extend(outcome.results);
                merged.transient_failures.extend(outcome.transient_failures);
            }
            id_lookup = Some(merged);
        }

        let identifiers_answered = id_lookup
            .as_ref()
            .is_some_and(|outcome| !outcome.results.is_empty());
        if !identifiers_answered {
            search_lookup = Some(pool.search_title(&reference, source_progress).await);
        }
    }

    cascade::classify(&CascadeInput {
        reference: &reference,
        id_lookup: id_lookup.as_ref(),
        search_lookup: search_lookup.as_ref(),
        today,
        markers: &config.markers,
        priority_of: &|name| pool.priority_of(name),
    })
}
