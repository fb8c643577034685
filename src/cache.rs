//! Two-tier cache for registry lookups.
//!
//! **L1** – [`DashMap`] in-memory map (lock-free concurrent reads).
//! **L2** – Optional SQLite database on disk, surviving process restarts.
//!
//! Keys combine a lookup key (`doi:…`, `pmid:…`, or `title:…` with a
//! normalized title) with the registry name, so each source caches its own
//! answer. Positive and negative entries carry different TTLs; transient
//! failures are never cached — only real answers are.

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use rusqlite::{Connection, OpenFlags, params};

use crate::identifiers::CanonicalId;
use crate::registry::LookupResult;

/// Default TTL for positive (found) entries: 7 days.
pub const DEFAULT_POSITIVE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default TTL for negative (not found) entries: 24 hours. Registries index
/// new records continuously, so "not found" goes stale much faster than
/// "found".
pub const DEFAULT_NEGATIVE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors from the persistent cache tier.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to open cache database at {path}: {source}")]
    Open {
        path: String,
        source: rusqlite::Error,
    },
}

/// Lookup key for one cached answer.
#[derive(Hash, Eq, PartialEq, Clone, Debug)]
struct CacheKey {
    lookup_key: String,
    source: String,
}

/// The key under which an identifier resolution is cached.
pub fn id_key(id: &CanonicalId) -> String {
    id.cache_key()
}

/// The key under which a title search is cached.
pub fn title_key(title: &str) -> String {
    format!("title:{}", crate::matching::normalize_title(title))
}

#[derive(Clone, Debug)]
enum Cached {
    Found(LookupResult),
    NotFound,
}

#[derive(Clone, Debug)]
struct Entry {
    cached: Cached,
    inserted_at: Instant,
}

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Thread-safe two-tier cache for registry answers.
pub struct IdentifierCache {
    entries: DashMap<CacheKey, Entry>,
    sqlite: Option<Mutex<Connection>>,
    positive_ttl: Duration,
    negative_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for IdentifierCache {
    fn default() -> Self {
        Self::new(DEFAULT_POSITIVE_TTL, DEFAULT_NEGATIVE_TTL)
    }
}

impl IdentifierCache {
    /// In-memory-only cache with custom TTLs.
    pub fn new(positive_ttl: Duration, negative_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            sqlite: None,
            positive_ttl,
            negative_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Open a persistent cache backed by SQLite at `path`.
    ///
    /// Expired rows are evicted on open; L1 starts empty and fills lazily.
    pub fn open(
        path: &Path,
        positive_ttl: Duration,
        negative_ttl: Duration,
    ) -> Result<Self, CacheError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| CacheError::Open {
            path: path.display().to_string(),
            source: e,
        })?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;
             CREATE TABLE IF NOT EXISTS lookup_cache (
                 lookup_key  TEXT NOT NULL,
                 source      TEXT NOT NULL,
                 found       INTEGER NOT NULL,
                 record_json TEXT,
                 inserted_at INTEGER NOT NULL,
                 PRIMARY KEY (lookup_key, source)
             );",
        )
        .map_err(|e| CacheError::Open {
            path: path.display().to_string(),
            source: e,
        })?;

        let cache = Self {
            entries: DashMap::new(),
            sqlite: Some(Mutex::new(conn)),
            positive_ttl,
            negative_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        };
        cache.evict_expired();
        Ok(cache)
    }

    fn ttl_for(&self, cached: &Cached) -> Duration {
        match cached {
            Cached::Found(_) => self.positive_ttl,
            Cached::NotFound => self.negative_ttl,
        }
    }

    /// Cached answer for `lookup_key` from `source`.
    ///
    /// `Some(Some(record))` is a cached hit, `Some(None)` a cached miss
    /// (known-absent within TTL), `None` means the cache has no answer.
    pub fn get(&self, lookup_key: &str, source: &str) -> Option<Option<LookupResult>> {
        let key = CacheKey {
            lookup_key: lookup_key.to_string(),
            source: source.to_string(),
        };

        if let Some(entry) = self.entries.get(&key) {
            if entry.inserted_at.elapsed() <= self.ttl_for(&entry.cached) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(source, lookup_key, "cache L1 hit");
                return Some(match &entry.cached {
                    Cached::Found(record) => Some(record.clone()),
                    Cached::NotFound => None,
                });
            }
            drop(entry);
            self.entries.remove(&key);
        }

        if let Some((cached, epoch)) = self.l2_get(lookup_key, source) {
            tracing::trace!(source, lookup_key, "cache L2 hit, promoting");
            let answer = match &cached {
                Cached::Found(record) => Some(record.clone()),
                Cached::NotFound => None,
            };
            let age = Duration::from_secs(now_epoch().saturating_sub(epoch));
            self.entries.insert(
                key,
                Entry {
                    cached,
                    inserted_at: Instant::now() - age,
                },
            );
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(answer);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store an answer. Write-through to both tiers.
    ///
    /// A zero negative TTL disables caching of not-found answers entirely.
    pub fn insert(&self, lookup_key: &str, source: &str, answer: Option<&LookupResult>) {
        let cached = match answer {
            Some(record) => Cached::Found(record.clone()),
            None => {
                if self.negative_ttl.is_zero() {
                    return;
                }
                Cached::NotFound
            }
        };
        tracing::trace!(source, lookup_key, found = answer.is_some(), "cache insert");

        let epoch = now_epoch();
        self.entries.insert(
            CacheKey {
                lookup_key: lookup_key.to_string(),
                source: source.to_string(),
            },
            Entry {
                cached: cached.clone(),
                inserted_at: Instant::now(),
            },
        );

        if let Some(ref sqlite) = self.sqlite
            && let Ok(conn) = sqlite.lock()
        {
            let (found, record_json) = match &cached {
                Cached::Found(record) => (1i32, serde_json::to_string(record).ok()),
                Cached::NotFound => (0i32, None),
            };
            let _ = conn.execute(
                "INSERT OR REPLACE INTO lookup_cache
                     (lookup_key, source, found, record_json, inserted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![lookup_key, source, found, record_json, epoch],
            );
        }
    }

    fn l2_get(&self, lookup_key: &str, source: &str) -> Option<(Cached, u64)> {
        let sqlite = self.sqlite.as_ref()?;
        let conn = sqlite.lock().ok()?;
        let (found, record_json, inserted_at): (i32, Option<String>, u64) = conn
            .query_row(
                "SELECT found, record_json, inserted_at FROM lookup_cache
                 WHERE lookup_key = ?1 AND source = ?2",
                params![lookup_key, source],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .ok()?;
        drop(conn);

        let cached = if found != 0 {
            Cached::Found(serde_json::from_str(record_json.as_deref()?).ok()?)
        } else {
            Cached::NotFound
        };

        let age = Duration::from_secs(now_epoch().saturating_sub(inserted_at));
        if age > self.ttl_for(&cached) {
            return None;
        }
        Some((cached, inserted_at))
    }

    fn evict_expired(&self) {
        if let Some(ref sqlite) = self.sqlite
            && let Ok(conn) = sqlite.lock()
        {
            let now = now_epoch();
            let pos_cutoff = now.saturating_sub(self.positive_ttl.as_secs());
            let neg_cutoff = now.saturating_sub(self.negative_ttl.as_secs());
            let _ = conn.execute(
                "DELETE FROM lookup_cache WHERE
                     (found = 1 AND inserted_at < ?1) OR
                     (found = 0 AND inserted_at < ?2)",
                params![pos_cutoff, neg_cutoff],
            );
        }
    }

    /// Drop everything from both tiers.
    pub fn clear(&self) {
        self.entries.clear();
        if let Some(ref sqlite) = self.sqlite
            && let Ok(conn) = sqlite.lock()
        {
            let _ = conn.execute("DELETE FROM lookup_cache", []);
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Entries currently in L1.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_persistence(&self) -> bool {
        self.sqlite.is_some()
    }
}

impl std::fmt::Debug for IdentifierCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentifierCache")
            .field("l1_entries", &self.entries.len())
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .field("persistent", &self.has_persistence())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str) -> LookupResult {
        LookupResult {
            source: "PubMed".into(),
            title: title.into(),
            authors: vec!["Smith J".into()],
            year: Some(2021),
            venue: None,
            doi: Some("10.1/x".into()),
            url: None,
        }
    }

    #[test]
    fn miss_on_empty() {
        let cache = IdentifierCache::default();
        assert!(cache.get("doi:10.1/x", "PubMed").is_none());
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn positive_roundtrip() {
        let cache = IdentifierCache::default();
        let rec = record("A Paper");
        cache.insert("doi:10.1/x", "PubMed", Some(&rec));
        let got = cache.get("doi:10.1/x", "PubMed").flatten().unwrap();
        assert_eq!(got.title, "A Paper");
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn negative_roundtrip() {
        let cache = IdentifierCache::default();
        cache.insert("doi:10.1/missing", "CrossRef", None);
        // Cached "known absent" is Some(None), distinct from a cache miss.
        assert!(matches!(cache.get("doi:10.1/missing", "CrossRef"), Some(None)));
    }

    #[test]
    fn per_source_isolation() {
        let cache = IdentifierCache::default();
        cache.insert("doi:10.1/x", "PubMed", Some(&record("A Paper")));
        assert!(cache.get("doi:10.1/x", "CrossRef").is_none());
    }

    #[test]
    fn zero_negative_ttl_skips_not_found() {
        let cache = IdentifierCache::new(DEFAULT_POSITIVE_TTL, Duration::ZERO);
        cache.insert("doi:10.1/x", "PubMed", None);
        assert!(cache.get("doi:10.1/x", "PubMed").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn expired_positive_entry_is_a_miss() {
        let cache = IdentifierCache::new(Duration::from_millis(1), DEFAULT_NEGATIVE_TTL);
        cache.insert("doi:10.1/x", "PubMed", Some(&record("A Paper")));
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.get("doi:10.1/x", "PubMed").is_none());
    }

    #[test]
    fn title_key_normalizes() {
        assert_eq!(
            title_key("Rényi Divergence, Revisited"),
            title_key("renyi divergence revisited")
        );
    }

    #[test]
    fn sqlite_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        {
            let cache =
                IdentifierCache::open(&path, DEFAULT_POSITIVE_TTL, DEFAULT_NEGATIVE_TTL).unwrap();
            cache.insert("pmid:12345678", "PubMed", Some(&record("Persistent Paper")));
            cache.insert("doi:10.1/gone", "CrossRef", None);
        }

        let cache =
            IdentifierCache::open(&path, DEFAULT_POSITIVE_TTL, DEFAULT_NEGATIVE_TTL).unwrap();
        assert!(cache.is_empty()); // L1 empty after restart
        let got = cache.get("pmid:12345678", "PubMed").flatten().unwrap();
        assert_eq!(got.title, "Persistent Paper");
        assert_eq!(cache.len(), 1); // promoted to L1
        assert!(matches!(cache.get("doi:10.1/gone", "CrossRef"), Some(None)));
    }

    #[test]
    fn sqlite_expired_evicted_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        {
            let cache =
                IdentifierCache::open(&path, Duration::from_secs(1), Duration::from_secs(1))
                    .unwrap();
            cache.insert("doi:10.1/x", "PubMed", Some(&record("Short Lived")));
        }
        std::thread::sleep(Duration::from_secs(2));

        let cache =
            IdentifierCache::open(&path, Duration::from_secs(1), Duration::from_secs(1)).unwrap();
        assert!(cache.get("doi:10.1/x", "PubMed").is_none());
    }

    #[test]
    fn clear_both_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        let cache =
            IdentifierCache::open(&path, DEFAULT_POSITIVE_TTL, DEFAULT_NEGATIVE_TTL).unwrap();
        cache.insert("doi:10.1/x", "PubMed", Some(&record("A Paper")));
        cache.clear();
        assert!(cache.get("doi:10.1/x", "PubMed").is_none());
    }

    #[test]
    fn concurrent_access() {
        let cache = std::sync::Arc::new(IdentifierCache::default());
        let mut handles = vec![];
        for i in 0..10 {
            let c = cache.clone();
            handles.push(std::thread::spawn(move || {
                let key = format!("doi:10.1/{i}");
                c.insert(&key, "PubMed", Some(&record(&format!("Paper {i}"))));
                assert!(c.get(&key, "PubMed").is_some());
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 10);
    }
}
