use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Snapshot of one bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketState {
    /// Available admission credits, within `[0, capacity]`.
    pub tokens: f64,
    /// Clock reading of the last refill computation.
    pub last_refill_millis: u64,
    /// Bumped on every write; compare-and-set checks against it.
    pub version: u64,
}

/// Failure reported by a token store backend.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("token store unavailable: {0}")]
    Unavailable(String),
}

/// Abstract storage interface for bucket state.
///
/// Writes are compare-and-set on [`BucketState::version`], which gives per-key mutual
/// exclusion without holding a lock across the refill computation. Backends may be
/// in-memory or distributed.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch the current state for a key.
    async fn get_state(&self, key: &str) -> Result<Option<BucketState>, Self::Error>;

    /// Write new state if the stored version still equals `expected_version`.
    ///
    /// * `expected_version`: `None` means the key must not exist yet (first write).
    ///
    /// Returns `Ok(true)` if the write landed, `Ok(false)` if another writer won the race.
    async fn set_state(
        &self,
        key: &str,
        tokens: f64,
        refilled_at: u64,
        expected_version: Option<u64>,
    ) -> Result<bool, Self::Error>;
}

/// Default bound on the number of live buckets.
pub const DEFAULT_MAX_BUCKETS: usize = 100_000;

/// Share of `max_buckets` dropped by one eviction pass.
const EVICTION_BATCH_DIVISOR: usize = 10;

/// Concurrent in-memory token store.
///
/// Bounded: inserting past `max_buckets` evicts the least recently refilled tenth of
/// the buckets in one pass, so the scan runs at most once per `max_buckets / 10` new
/// keys. [`InMemoryTokenStore::sweep_idle`] drops buckets nobody has touched for a
/// while; callers must pick an idle window no shorter than the slowest policy's full
/// refill time, so an evicted bucket would have been full anyway.
#[derive(Clone, Debug)]
pub struct InMemoryTokenStore {
    buckets: Arc<DashMap<String, BucketState>>,
    max_buckets: usize,
    evicting: Arc<AtomicBool>,
}

impl Default for InMemoryTokenStore {
    fn default() -> Self {
        Self::with_max_buckets(DEFAULT_MAX_BUCKETS)
    }
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_buckets(max_buckets: usize) -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            max_buckets: max_buckets.max(1),
            evicting: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Remove buckets whose last refill is more than `max_idle` before `now_millis`.
    ///
    /// Returns how many buckets were dropped.
    pub fn sweep_idle(&self, now_millis: u64, max_idle: Duration) -> usize {
        let max_idle = u64::try_from(max_idle.as_millis()).unwrap_or(u64::MAX);
        let before = self.buckets.len();
        self.buckets.retain(|_, state| now_millis.saturating_sub(state.last_refill_millis) <= max_idle);
        let removed = before.saturating_sub(self.buckets.len());
        if removed > 0 {
            debug!(target: "locus::rate_limit", removed, remaining = self.buckets.len(), "swept idle buckets");
        }
        removed
    }

    /// Buckets dropped by one eviction pass.
    fn eviction_batch(&self) -> usize {
        (self.max_buckets / EVICTION_BATCH_DIVISOR).max(1)
    }

    fn evict_oldest_except(&self, keep: &str) {
        // One pass at a time; concurrent inserters skip instead of rescanning.
        if self.evicting.swap(true, Ordering::Acquire) {
            return;
        }
        let mut candidates: Vec<(u64, String)> = self
            .buckets
            .iter()
            .filter(|entry| entry.key() != keep)
            .map(|entry| (entry.value().last_refill_millis, entry.key().clone()))
            .collect();
        let batch = self.eviction_batch().min(candidates.len());
        if batch > 0 && batch < candidates.len() {
            candidates.select_nth_unstable(batch - 1);
        }
        for (_, key) in candidates.iter().take(batch) {
            self.buckets.remove(key);
        }
        self.evicting.store(false, Ordering::Release);
        debug!(
            target: "locus::rate_limit",
            evicted = batch,
            remaining = self.buckets.len(),
            "evicted least recently refilled buckets"
        );
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    type Error = std::convert::Infallible;

    async fn get_state(&self, key: &str) -> Result<Option<BucketState>, Self::Error> {
        Ok(self.buckets.get(key).map(|entry| *entry.value()))
    }

    async fn set_state(
        &self,
        key: &str,
        tokens: f64,
        refilled_at: u64,
        expected_version: Option<u64>,
    ) -> Result<bool, Self::Error> {
        // The entry guard holds the shard lock; drop it before any eviction scan.
        let inserted = match self.buckets.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let current = entry.get().version;
                if expected_version != Some(current) {
                    return Ok(false);
                }
                entry.insert(BucketState {
                    tokens,
                    last_refill_millis: refilled_at,
                    version: current.wrapping_add(1),
                });
                false
            }
            Entry::Vacant(entry) => {
                if expected_version.is_some() {
                    // Swept or evicted between read and write.
                    return Ok(false);
                }
                entry.insert(BucketState { tokens, last_refill_millis: refilled_at, version: 0 });
                true
            }
        };

        if inserted && self.buckets.len() > self.max_buckets {
            self.evict_oldest_except(key);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_write_requires_absent_key() {
        let store = InMemoryTokenStore::new();
        assert!(store.set_state("k", 4.0, 10, None).await.unwrap());
        assert!(!store.set_state("k", 3.0, 20, None).await.unwrap());

        let state = store.get_state("k").await.unwrap().unwrap();
        assert_eq!(state, BucketState { tokens: 4.0, last_refill_millis: 10, version: 0 });
    }

    #[tokio::test]
    async fn stale_version_loses_the_race() {
        let store = InMemoryTokenStore::new();
        store.set_state("k", 5.0, 0, None).await.unwrap();

        assert!(store.set_state("k", 4.0, 0, Some(0)).await.unwrap());
        // Same timestamp, stale version: must be rejected.
        assert!(!store.set_state("k", 4.0, 0, Some(0)).await.unwrap());
        assert_eq!(store.get_state("k").await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn sweep_drops_only_idle_buckets() {
        let store = InMemoryTokenStore::new();
        store.set_state("old", 1.0, 0, None).await.unwrap();
        store.set_state("fresh", 1.0, 9_000, None).await.unwrap();

        let removed = store.sweep_idle(10_000, Duration::from_secs(5));
        assert_eq!(removed, 1);
        assert!(store.get_state("old").await.unwrap().is_none());
        assert!(store.get_state("fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn bounded_store_evicts_least_recently_refilled() {
        let store = InMemoryTokenStore::with_max_buckets(2);
        store.set_state("a", 1.0, 100, None).await.unwrap();
        store.set_state("b", 1.0, 50, None).await.unwrap();
        store.set_state("c", 1.0, 10, None).await.unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.get_state("b").await.unwrap().is_none());
        assert!(store.get_state("a").await.unwrap().is_some());
        assert!(store.get_state("c").await.unwrap().is_some(), "new key survives its own insert");
    }

    #[tokio::test]
    async fn eviction_drops_a_batch_then_stays_quiet() {
        let store = InMemoryTokenStore::with_max_buckets(100);
        for i in 0..100u64 {
            store.set_state(&format!("k{}", i), 1.0, i, None).await.unwrap();
        }
        assert_eq!(store.len(), 100);

        // One insert past the cap frees a tenth of the map in a single pass.
        store.set_state("new-0", 1.0, 1_000, None).await.unwrap();
        assert_eq!(store.len(), 91);
        for i in 0..10u64 {
            assert!(store.get_state(&format!("k{}", i)).await.unwrap().is_none());
        }
        assert!(store.get_state("k10").await.unwrap().is_some());

        // The next nine new keys fit without another pass.
        for i in 1..10 {
            store.set_state(&format!("new-{}", i), 1.0, 1_000, None).await.unwrap();
        }
        assert_eq!(store.len(), 100);
        assert!(store.get_state("k10").await.unwrap().is_some());
    }
}
