//! Per-registry rate limiting with adaptive governor instances.
//!
//! Each registry query waits for its governor permit via `until_ready()`,
//! which spaces requests at the configured rate across all concurrent
//! callers. On 429, the governor is atomically swapped to a slower rate;
//! after 60 seconds without a 429 the original rate is restored.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::registry::{LookupResult, SourceError};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// How long after the last 429 before the base rate is restored.
const DECAY_SECS: u64 = 60;

/// Adaptive per-registry rate limiter.
///
/// A 429 doubles the period between requests (capped at 16x); the base rate
/// comes back once the registry has been quiet for [`DECAY_SECS`].
pub struct AdaptiveLimiter {
    limiter: ArcSwap<DirectLimiter>,
    base_period: Duration,
    current_factor: AtomicU32,
    last_429: std::sync::Mutex<Option<Instant>>,
}

impl AdaptiveLimiter {
    pub fn new(period: Duration) -> Self {
        let quota = Quota::with_period(period).unwrap_or_else(|| {
            Quota::with_period(Duration::from_millis(1)).unwrap()
        });
        Self {
            limiter: ArcSwap::from(Arc::new(DirectLimiter::direct(quota))),
            base_period: period,
            current_factor: AtomicU32::new(1),
            last_429: std::sync::Mutex::new(None),
        }
    }

    /// A limiter allowing `n` requests per second.
    pub fn per_second(n: u32) -> Self {
        Self::new(Duration::from_millis(1000 / n.max(1) as u64))
    }

    /// Wait until the limiter allows a request.
    pub async fn acquire(&self) {
        self.try_decay();
        let limiter = self.limiter.load();
        limiter.until_ready().await;
    }

    /// Record a 429: double the slowdown factor and swap the governor.
    pub fn on_rate_limited(&self) {
        if let Ok(mut last) = self.last_429.lock() {
            *last = Some(Instant::now());
        }

        let _ = self
            .current_factor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |f| Some((f * 2).min(16)));

        let factor = self.current_factor.load(Ordering::SeqCst);
        if let Some(scaled) = self.base_period.checked_mul(factor)
            && let Some(quota) = Quota::with_period(scaled)
        {
            self.limiter.store(Arc::new(DirectLimiter::direct(quota)));
        }
    }

    fn try_decay(&self) {
        let should_restore = self
            .last_429
            .lock()
            .ok()
            .and_then(|last| last.map(|t| t.elapsed().as_secs() >= DECAY_SECS))
            .unwrap_or(false);

        if should_restore && self.current_factor.load(Ordering::SeqCst) > 1 {
            self.current_factor.store(1, Ordering::SeqCst);
            if let Some(quota) = Quota::with_period(self.base_period) {
                self.limiter.store(Arc::new(DirectLimiter::direct(quota)));
            }
        }
    }

    #[cfg(test)]
    fn factor(&self) -> u32 {
        self.current_factor.load(Ordering::SeqCst)
    }
}

/// Collection of per-registry rate limiters.
pub struct RateLimiters {
    limiters: HashMap<&'static str, AdaptiveLimiter>,
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::new(false)
    }
}

impl RateLimiters {
    /// Build limiters at each registry's documented (or conservatively
    /// assumed) rate.
    pub fn new(has_crossref_mailto: bool) -> Self {
        let mut limiters = HashMap::new();

        // CrossRef: 1/s anonymous, 3/s in the polite pool
        let crossref_rate = if has_crossref_mailto { 3 } else { 1 };
        limiters.insert("CrossRef", AdaptiveLimiter::per_second(crossref_rate));

        // NCBI eutils: 3/s without an API key
        limiters.insert("PubMed", AdaptiveLimiter::per_second(3));

        // Europe PMC: undocumented, conservative 2/s
        limiters.insert("Europe PMC", AdaptiveLimiter::per_second(2));

        // doi.org handle resolution: conservative 2/s
        limiters.insert("doi.org", AdaptiveLimiter::per_second(2));

        Self { limiters }
    }

    pub fn get(&self, source_name: &str) -> Option<&AdaptiveLimiter> {
        self.limiters.get(source_name)
    }
}

/// Parse a Retry-After header value (seconds or HTTP-date).
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    // HTTP-date form: conservative fixed wait rather than date math.
    if value.contains(',') || value.contains("GMT") {
        return Some(Duration::from_secs(5));
    }
    None
}

/// Result of a governed query, with elapsed time measured after the governor
/// wait (HTTP round-trip only).
pub struct QueryOutcome {
    pub result: Result<Option<LookupResult>, SourceError>,
    pub elapsed: Duration,
}

/// Run a registry operation under its governor, with bounded retries.
///
/// - 429: adapt the governor, honor Retry-After (capped at `timeout`), retry.
/// - Transient: exponential backoff with jitter, retry.
/// - Terminal outcomes (`Ok`) return immediately.
///
/// Retries count against `max_retries` regardless of failure kind.
pub async fn run_governed<F, Fut>(
    source_name: &str,
    limiters: &RateLimiters,
    timeout: Duration,
    max_retries: u32,
    op: F,
) -> QueryOutcome
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Option<LookupResult>, SourceError>>,
{
    let limiter = limiters.get(source_name);
    if let Some(lim) = limiter {
        lim.acquire().await;
    }

    let start = Instant::now();
    let mut attempt = 0u32;

    let result = loop {
        match op().await {
            Ok(outcome) => break Ok(outcome),
            Err(err) if attempt >= max_retries => break Err(err),
            Err(SourceError::RateLimited { retry_after }) => {
                if let Some(lim) = limiter {
                    lim.on_rate_limited();
                }
                let wait = retry_after.unwrap_or(Duration::from_secs(2)).min(timeout);
                tracing::info!(
                    source = source_name,
                    wait_secs = wait.as_secs_f64(),
                    "429 rate limited, backing off"
                );
                tokio::time::sleep(wait).await;
                if let Some(lim) = limiter {
                    lim.acquire().await;
                }
            }
            Err(SourceError::Transient(msg)) => {
                let backoff = backoff_with_jitter(attempt);
                tracing::debug!(
                    source = source_name,
                    error = %msg,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "transient failure, retrying"
                );
                tokio::time::sleep(backoff).await;
            }
        }
        attempt += 1;
    };

    QueryOutcome {
        result,
        elapsed: start.elapsed(),
    }
}

/// 500ms * 2^attempt plus up to 250ms of jitter, capped at 8s.
fn backoff_with_jitter(attempt: u32) -> Duration {
    let base = Duration::from_millis(500)
        .checked_mul(2u32.saturating_pow(attempt))
        .unwrap_or(Duration::from_secs(8))
        .min(Duration::from_secs(8));
    base + Duration::from_millis(fastrand::u64(0..250))
}
