//! Mock registry source for testing.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{LookupResult, RegistrySource, SourceError, SourceFuture};
use crate::Reference;
use crate::identifiers::CanonicalId;

/// A configurable mock response for [`MockSource`].
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Simulate a record match.
    Found(MockRecord),
    /// Terminal not-found.
    NotFound,
    /// Simulate a 429 response.
    RateLimited { retry_after: Option<Duration> },
    /// Simulate a timeout or 5xx.
    Transient(String),
}

/// Record data for a mock match, converted to [`LookupResult`] on use.
#[derive(Clone, Debug, Default)]
pub struct MockRecord {
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub doi: Option<String>,
}

/// A hand-rolled [`RegistrySource`] for tests.
///
/// Resolve and search have independent response sequences; each call pops the
/// next response, repeating the last one when exhausted. Supports simulated
/// latency and call counting.
pub struct MockSource {
    name: &'static str,
    priority: u8,
    resolve_responses: Mutex<Vec<MockResponse>>,
    search_responses: Mutex<Vec<MockResponse>>,
    delay: Option<Duration>,
    resolve_calls: AtomicUsize,
    search_calls: AtomicUsize,
}

impl MockSource {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            priority: 10,
            resolve_responses: Mutex::new(vec![MockResponse::NotFound]),
            search_responses: Mutex::new(vec![MockResponse::NotFound]),
            delay: None,
            resolve_calls: AtomicUsize::new(0),
            search_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Responses returned by `resolve`, in order, repeating the last.
    pub fn on_resolve(self, responses: Vec<MockResponse>) -> Self {
        assert!(!responses.is_empty(), "need at least one response");
        *self.resolve_responses.lock().unwrap() = reversed(responses);
        self
    }

    /// Responses returned by `search`, in order, repeating the last.
    pub fn on_search(self, responses: Vec<MockResponse>) -> Self {
        assert!(!responses.is_empty(), "need at least one response");
        *self.search_responses.lock().unwrap() = reversed(responses);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    fn respond(&self, queue: &Mutex<Vec<MockResponse>>) -> SourceFuture<'_> {
        let response = {
            let mut seq = queue.lock().unwrap();
            if seq.len() > 1 {
                seq.pop().unwrap()
            } else {
                seq.last().cloned().unwrap_or(MockResponse::NotFound)
            }
        };
        let delay = self.delay;
        let source = self.name;

        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            match response {
                MockResponse::Found(record) => Ok(Some(LookupResult {
                    source: source.to_string(),
                    title: record.title,
                    authors: record.authors,
                    year: record.year,
                    venue: record.venue,
                    doi: record.doi,
                    url: None,
                })),
                MockResponse::NotFound => Ok(None),
                MockResponse::RateLimited { retry_after } => {
                    Err(SourceError::RateLimited { retry_after })
                }
                MockResponse::Transient(msg) => Err(SourceError::Transient(msg)),
            }
        })
    }
}

fn reversed(mut responses: Vec<MockResponse>) -> Vec<MockResponse> {
    responses.reverse();
    responses
}

impl RegistrySource for MockSource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn can_resolve(&self, _id: &CanonicalId) -> bool {
        true
    }

    fn resolve<'a>(
        &'a self,
        _id: &'a CanonicalId,
        _client: &'a reqwest::Client,
        _timeout: Duration,
    ) -> SourceFuture<'a> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        self.respond(&self.resolve_responses)
    }

    fn search<'a>(
        &'a self,
        _reference: &'a Reference,
        _client: &'a reqwest::Client,
        _timeout: Duration,
    ) -> SourceFuture<'a> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.respond(&self.search_responses)
    }
}
