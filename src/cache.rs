//! In-memory page cache with TTL.
//!
//! TOC and context-discovery pages are fetched repeatedly while resolving
//! boundaries; caching them keeps probing polite. Document pages are never
//! cached, each is fetched exactly once per run.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::Result;

/// A cached page body with its fetch time.
#[derive(Debug, Clone)]
struct CacheEntry {
    fetched_at: Instant,
    body: String,
}

/// Explicit page cache with a `get_or_fetch` contract.
///
/// Only successful fetches are cached; errors always propagate and leave
/// the entry absent so the next call retries.
#[derive(Debug)]
pub struct PageCache {
    ttl: Duration,
    entries: HashMap<String, CacheEntry>,
}

impl PageCache {
    /// Create a cache with the given entry lifetime.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Return the cached body for `url`, or run `fetch` and cache its result.
    ///
    /// Within the TTL, `fetch` runs at most once per URL.
    pub fn get_or_fetch<F>(&mut self, url: &str, fetch: F) -> Result<String>
    where
        F: FnOnce() -> Result<String>,
    {
        if let Some(entry) = self.entries.get(url) {
            if entry.fetched_at.elapsed() < self.ttl {
                tracing::debug!(url, "Cache hit");
                return Ok(entry.body.clone());
            }
        }

        let body = fetch()?;
        self.entries.insert(
            url.to_string(),
            CacheEntry {
                fetched_at: Instant::now(),
                body: body.clone(),
            },
        );
        Ok(body)
    }

    /// Number of cached entries (expired ones included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PageCache {
    /// One-hour TTL; a TOC does not change within a run.
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}
