//! Lookout cache keyed by catalog fingerprint, using [`moka`].
//!
//! Lookouts depend only on the catalog, so every run against the same
//! catalog can share them. Concurrent misses for one fingerprint share a
//! single in-flight extraction; failed extractions are not cached.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache;
use tracing::debug;

use crate::error::{IntentError, Result};
use crate::types::Lookout;

// ── cache stats ──────────────────────────────────────────────────────

/// Counters tracking cache effectiveness.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    extractions: AtomicU64,
}

impl CacheStats {
    /// Lookups served without running an extraction.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Extractions actually run.
    pub fn extractions(&self) -> u64 {
        self.extractions.load(Ordering::Relaxed)
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hits={} extractions={}", self.hits(), self.extractions())
    }
}

// ── cache ────────────────────────────────────────────────────────────

/// Shared lookout cache. Cloning is cheap and clones share entries.
#[derive(Clone)]
pub struct LookoutCache {
    inner: Cache<String, Arc<Vec<Lookout>>>,
    stats: Arc<CacheStats>,
}

impl fmt::Debug for LookoutCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookoutCache")
            .field("entries", &self.inner.entry_count())
            .field("stats", &self.stats.to_string())
            .finish()
    }
}

impl LookoutCache {
    pub fn builder() -> LookoutCacheBuilder {
        LookoutCacheBuilder {
            max_capacity: 64,
            ttl_seconds: 3600,
        }
    }

    /// Lookouts for the catalog with `fingerprint`, running `extract` only
    /// when no entry exists and no other caller is already extracting.
    pub async fn get_or_extract<F>(&self, fingerprint: &str, extract: F) -> Result<Arc<Vec<Lookout>>>
    where
        F: Future<Output = Result<Vec<Lookout>>> + Send,
    {
        let mut ran = false;
        let lookouts = self
            .inner
            .try_get_with(fingerprint.to_owned(), async {
                ran = true;
                self.stats.extractions.fetch_add(1, Ordering::Relaxed);
                extract.await.map(Arc::new)
            })
            .await
            .map_err(IntentError::Shared)?;

        if ran {
            debug!(fingerprint = %fingerprint, count = lookouts.len(), "lookout cache filled");
        } else {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            debug!(fingerprint = %fingerprint, "lookout cache hit");
        }
        Ok(lookouts)
    }

    /// Drop the entry for `fingerprint`.
    pub async fn invalidate(&self, fingerprint: &str) {
        self.inner.invalidate(fingerprint).await;
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

impl Default for LookoutCache {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`LookoutCache`].
pub struct LookoutCacheBuilder {
    max_capacity: u64,
    ttl_seconds: u64,
}

impl LookoutCacheBuilder {
    /// Maximum number of catalogs kept.
    pub fn max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = capacity;
        self
    }

    /// Time-to-live per entry, in seconds.
    pub fn ttl_seconds(mut self, seconds: u64) -> Self {
        self.ttl_seconds = seconds;
        self
    }

    pub fn build(self) -> LookoutCache {
        let inner = Cache::builder()
            .max_capacity(self.max_capacity)
            .time_to_live(Duration::from_secs(self.ttl_seconds))
            .build();
        LookoutCache {
            inner,
            stats: Arc::new(CacheStats::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use crate::types::IntentKind;

    fn sample() -> Vec<Lookout> {
        vec![Lookout {
            intent: IntentKind::Create,
            target_type: "task".into(),
            watch_for: vec!["todo".into()],
            fields: vec!["title".into()],
            source_text: None,
        }]
    }

    #[tokio::test]
    async fn second_lookup_is_a_hit() {
        let cache = LookoutCache::default();
        let first = cache.get_or_extract("fp", async { Ok(sample()) }).await.unwrap();
        let second = cache
            .get_or_extract("fp", async {
                Err(IntentError::generation(Stage::LookoutExtraction, "not called"))
            })
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.stats().extractions(), 1);
        assert_eq!(cache.stats().hits(), 1);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache = LookoutCache::default();
        let err = cache
            .get_or_extract("fp", async {
                Err(IntentError::generation(Stage::LookoutExtraction, "boom"))
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boom"));

        let ok = cache.get_or_extract("fp", async { Ok(sample()) }).await.unwrap();
        assert_eq!(ok.len(), 1);
        assert_eq!(cache.stats().extractions(), 2);
    }

    #[tokio::test]
    async fn fingerprints_are_separate() {
        let cache = LookoutCache::default();
        cache.get_or_extract("a", async { Ok(sample()) }).await.unwrap();
        let b = cache.get_or_extract("b", async { Ok(Vec::new()) }).await.unwrap();
        assert!(b.is_empty());

        cache.invalidate("a").await;
        cache.get_or_extract("a", async { Ok(Vec::new()) }).await.unwrap();
        assert_eq!(cache.stats().extractions(), 3);
    }
}
