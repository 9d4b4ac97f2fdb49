//! Size-bounded, TTL-based cache of reference content.
//!
//! Size is the sum of stored content lengths in bytes, not the entry count.
//! Insertion evicts least-recently-used entries until the new entry fits.
//! The lock covers map mutation only; the [`ContentReader`] runs outside it,
//! so two concurrent misses on one identifier may both fetch and the second
//! write wins.

use crate::{ContentLoadError, Metrics};
use lru::LruCache;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Supplies raw reference content by identifier.
///
/// The engine treats failures as "skip this reference" and never interprets
/// them further.
pub trait ContentReader: Send + Sync {
    /// Fetch the content for `id`.
    ///
    /// # Errors
    ///
    /// Any [`ContentLoadError`]; the reference is skipped.
    fn read(&self, id: &str) -> Result<String, ContentLoadError>;
}

impl<F> ContentReader for F
where
    F: Fn(&str) -> Result<String, ContentLoadError> + Send + Sync,
{
    fn read(&self, id: &str) -> Result<String, ContentLoadError> {
        self(id)
    }
}

/// One cached reference.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub content: Arc<str>,
    /// Bytes counted against the ceiling.
    pub size_estimate: usize,
    pub loaded_at: Instant,
    /// `None` when the TTL is too large to represent; the entry never expires.
    pub expires_at: Option<Instant>,
    pub source_identifier: String,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

struct Inner {
    entries: LruCache<String, CacheEntry>,
    size_bytes: usize,
    ttl: Duration,
    max_bytes: usize,
}

impl Inner {
    fn remove(&mut self, id: &str) {
        if let Some(old) = self.entries.pop(id) {
            self.size_bytes = self.size_bytes.saturating_sub(old.size_estimate);
        }
    }

    fn evict_until_fits(&mut self, incoming: usize) {
        while self.size_bytes + incoming > self.max_bytes {
            let Some((id, evicted)) = self.entries.pop_lru() else {
                break;
            };
            self.size_bytes = self.size_bytes.saturating_sub(evicted.size_estimate);
            debug!(reference = %id, bytes = evicted.size_estimate, "evicted cached content");
        }
    }
}

/// Thread-safe content cache shared by all callers.
pub struct ContentCache {
    inner: Mutex<Inner>,
    metrics: Arc<Metrics>,
}

impl ContentCache {
    /// A cache whose entries live for `ttl` and whose total size stays at or
    /// below `max_bytes`.
    #[must_use]
    pub fn new(ttl: Duration, max_bytes: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                size_bytes: 0,
                ttl,
                max_bytes,
            }),
            metrics,
        }
    }

    /// Return cached content for `id`, fetching it through `reader` on a miss
    /// or after expiry.
    ///
    /// Content larger than the whole ceiling is returned but not stored.
    ///
    /// # Errors
    ///
    /// Propagates the reader's [`ContentLoadError`]; nothing is cached then.
    pub fn get_or_load(
        &self,
        id: &str,
        reader: &dyn ContentReader,
    ) -> Result<Arc<str>, ContentLoadError> {
        {
            let mut inner = self.inner.lock();
            let now = Instant::now();
            if let Some(entry) = inner.entries.get(id) {
                if entry.is_fresh(now) {
                    let content = Arc::clone(&entry.content);
                    self.metrics.record_cache_hit();
                    debug!(reference = id, "content cache hit");
                    return Ok(content);
                }
            }
            // Expired entries stop counting against the ceiling right away.
            inner.remove(id);
        }

        self.metrics.record_cache_miss();
        debug!(reference = id, "content cache miss");
        let content: Arc<str> = Arc::from(reader.read(id)?);
        self.insert(id, Arc::clone(&content));
        Ok(content)
    }

    fn insert(&self, id: &str, content: Arc<str>) {
        let size = content.len();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        inner.remove(id);
        if size > inner.max_bytes {
            debug!(
                reference = id,
                bytes = size,
                max_bytes = inner.max_bytes,
                "content larger than cache, not caching"
            );
            return;
        }
        inner.evict_until_fits(size);

        let loaded_at = Instant::now();
        let entry = CacheEntry {
            content,
            size_estimate: size,
            loaded_at,
            expires_at: loaded_at.checked_add(inner.ttl),
            source_identifier: id.to_string(),
        };
        inner.entries.put(id.to_string(), entry);
        inner.size_bytes += size;
    }

    /// Drop every entry and reset the size counter.
    pub fn invalidate_all(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.size_bytes = 0;
    }

    /// Apply new limits. Existing entries keep their expiry; the cache is
    /// trimmed immediately if the ceiling shrank.
    pub fn reconfigure(&self, ttl: Duration, max_bytes: usize) {
        let mut inner = self.inner.lock();
        inner.ttl = ttl;
        inner.max_bytes = max_bytes;
        inner.evict_until_fits(0);
    }

    /// Snapshot of the entry for `id`, without touching recency.
    #[must_use]
    pub fn entry(&self, id: &str) -> Option<CacheEntry> {
        self.inner.lock().entries.peek(id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently stored.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.inner.lock().size_bytes
    }
}

impl fmt::Debug for ContentCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ContentCache")
            .field("entries", &inner.entries.len())
            .field("size_bytes", &inner.size_bytes)
            .field("max_bytes", &inner.max_bytes)
            .field("ttl", &inner.ttl)
            .finish()
    }
}
