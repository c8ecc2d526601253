//! Match cache policy on top of a [`CacheStore`].
//!
//! Match lists expire after a TTL measured from the last full matcher pass.
//! Resolved ranges and metrics never expire; they are only dropped by an
//! explicit invalidation. Writers are serialized per key, different keys
//! proceed in parallel.
//!
//! A computation records the invalidation epoch it started in. Its result is
//! written only if neither its segment nor (for per-activity rows) its
//! activity was invalidated since, and the check and the write happen under
//! the read side of the lock every invalidation takes for writing.

use std::{
    collections::HashMap,
    future::Future,
    hash::Hash,
    sync::{Arc, Mutex, PoisonError, Weak},
    time::Duration,
};

use time::OffsetDateTime;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock};
use tracing::{debug, warn};

use crate::{
    clock::Clock,
    errors::AppError,
    models::{CacheEntry, CacheKey, ListKey, Match, ResolvedRange, SegmentMetrics},
    store::CacheStore,
};

/// Async locks handed out per key and dropped once nobody holds or awaits them.
pub struct KeyLocks<K> {
    locks: Mutex<HashMap<K, Weak<AsyncMutex<()>>>>,
}

impl<K: Eq + Hash + Copy> KeyLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| lock.strong_count() > 0);
            match locks.get(&key).and_then(Weak::upgrade) {
                Some(mutex) => mutex,
                None => {
                    let mutex = Arc::new(AsyncMutex::new(()));
                    locks.insert(key, Arc::downgrade(&mutex));
                    mutex
                }
            }
        };
        mutex.lock_owned().await
    }

    /// Keys with a live lock.
    pub fn len(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.values().filter(|lock| lock.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Copy> Default for KeyLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Computed,
    /// Computed but not stored, e.g. the activity does not match the segment.
    Uncached,
}

/// Output of a compute-on-miss callback.
#[derive(Debug, Clone, Default)]
pub struct Computation {
    /// The match the result belongs to. `None` keeps the result out of the cache.
    pub matched: Option<Match>,
    /// `None` when no sample lies within tolerance.
    pub resolved: Option<(ResolvedRange, SegmentMetrics)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub range: ResolvedRange,
    pub metrics: SegmentMetrics,
    pub source: Source,
}

impl Resolution {
    fn cached(entry: &CacheEntry) -> Option<Self> {
        Some(Self {
            range: entry.range?,
            metrics: entry.metrics?,
            source: Source::Cache,
        })
    }
}

/// Epoch of the last invalidation per segment and per activity.
#[derive(Debug, Default)]
struct Invalidations {
    epoch: u64,
    segments: HashMap<i64, u64>,
    activities: HashMap<i64, u64>,
    last_activity: u64,
}

impl Invalidations {
    fn segment_since(&self, segment_id: i64, epoch: u64) -> bool {
        self.segments.get(&segment_id).is_some_and(|&at| at > epoch)
    }

    fn activity_since(&self, activity_id: i64, epoch: u64) -> bool {
        self.activities.get(&activity_id).is_some_and(|&at| at > epoch)
    }

    /// A list holds rows of many activities, so any activity invalidation counts.
    fn list_stale(&self, key: ListKey, epoch: u64) -> bool {
        self.segment_since(key.segment_id, epoch) || self.last_activity > epoch
    }

    fn entry_stale(&self, key: CacheKey, epoch: u64) -> bool {
        self.segment_since(key.segment_id, epoch) || self.activity_since(key.activity_id, epoch)
    }
}

pub struct MatchCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    ttl: time::Duration,
    list_locks: KeyLocks<ListKey>,
    entry_locks: KeyLocks<CacheKey>,
    invalidations: RwLock<Invalidations>,
}

impl MatchCache {
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            store,
            clock,
            ttl: time::Duration::try_from(ttl).unwrap_or(time::Duration::MAX),
            list_locks: KeyLocks::new(),
            entry_locks: KeyLocks::new(),
            invalidations: RwLock::new(Invalidations::default()),
        }
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    async fn epoch(&self) -> u64 {
        self.invalidations.read().await.epoch
    }

    /// The cached list, if its last full pass is younger than the TTL.
    pub async fn fresh_list(&self, key: ListKey) -> Result<Option<Vec<CacheEntry>>, AppError> {
        let Some(refreshed_at) = self.store.list_refreshed_at(key).await? else {
            return Ok(None);
        };
        if self.clock.now() - refreshed_at >= self.ttl {
            debug!(segment_id = key.segment_id, %refreshed_at, "Match list expired");
            return Ok(None);
        }
        Ok(Some(self.store.list_entries(key).await?))
    }

    /// Serves a fresh list from the cache, or runs `compute` (the full
    /// matcher pass) and stores its result.
    pub async fn get_or_refresh_list<F, Fut>(
        &self,
        key: ListKey,
        force_refresh: bool,
        compute: F,
    ) -> Result<(Vec<CacheEntry>, Source), AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Match>, AppError>>,
    {
        if !force_refresh && let Some(entries) = self.fresh_list(key).await? {
            debug!(segment_id = key.segment_id, entries = entries.len(), "Match list cache hit");
            return Ok((entries, Source::Cache));
        }

        let _guard = self.list_locks.lock(key).await;
        if !force_refresh && let Some(entries) = self.fresh_list(key).await? {
            debug!(segment_id = key.segment_id, "Match list refreshed by a concurrent request");
            return Ok((entries, Source::Cache));
        }

        let epoch = self.epoch().await;
        let matches = compute().await?;
        let now = self.clock.now();

        let invalidations = self.invalidations.read().await;
        if invalidations.list_stale(key, epoch) {
            debug!(segment_id = key.segment_id, "Invalidated during matcher pass, not caching");
            return Ok((uncached_entries(key, &matches, now), Source::Uncached));
        }

        let written = self.store.replace_matches(key, &matches, now).await;
        drop(invalidations);
        match written {
            Ok(()) => Ok((self.store.list_entries(key).await?, Source::Computed)),
            Err(e) => {
                warn!(segment_id = key.segment_id, "Failed to cache match list: {e}");
                Ok((uncached_entries(key, &matches, now), Source::Uncached))
            }
        }
    }

    /// Returns the cached range and metrics for `key`, or runs `compute` and
    /// upserts its result into the same row.
    ///
    /// `compute` receives the current row, which may hold a match without a
    /// range. A failed write leaves the row as it was; the next caller
    /// recomputes the missing part.
    pub async fn get_or_compute<F, Fut>(&self, key: CacheKey, compute: F) -> Result<Resolution, AppError>
    where
        F: FnOnce(Option<CacheEntry>) -> Fut,
        Fut: Future<Output = Result<Computation, AppError>>,
    {
        if let Some(hit) = self.store.get_entry(key).await?.as_ref().and_then(Resolution::cached) {
            debug!(segment_id = key.segment_id, activity_id = key.activity_id, "Metrics cache hit");
            return Ok(hit);
        }

        let _guard = self.entry_locks.lock(key).await;
        let epoch = self.epoch().await;
        let existing = self.store.get_entry(key).await?;
        if let Some(hit) = existing.as_ref().and_then(Resolution::cached) {
            return Ok(hit);
        }
        let had_row = existing.is_some();

        debug!(segment_id = key.segment_id, activity_id = key.activity_id, "Metrics cache miss");
        let computation = compute(existing).await?;
        let now = self.clock.now();

        let invalidations = self.invalidations.read().await;
        let storable = !invalidations.entry_stale(key, epoch);
        if !storable {
            debug!(
                segment_id = key.segment_id,
                activity_id = key.activity_id,
                "Invalidated during metrics computation, not caching"
            );
        }

        match (computation.matched, computation.resolved) {
            (Some(matched), Some((range, metrics))) => {
                let mut source = Source::Uncached;
                if storable {
                    match self
                        .store
                        .store_resolution(key, &matched, range, &metrics, now)
                        .await
                    {
                        Ok(()) => source = Source::Computed,
                        Err(e) => warn!(
                            segment_id = key.segment_id,
                            activity_id = key.activity_id,
                            "Failed to cache segment metrics: {e}"
                        ),
                    }
                }
                Ok(Resolution {
                    range,
                    metrics,
                    source,
                })
            }
            (None, Some((range, metrics))) => Ok(Resolution {
                range,
                metrics,
                source: Source::Uncached,
            }),
            (Some(matched), None) => {
                if storable
                    && !had_row
                    && let Err(e) = self.store.upsert_match(key, &matched, now).await
                {
                    warn!(segment_id = key.segment_id, "Failed to cache match: {e}");
                }
                Err(AppError::NotFound)
            }
            (None, None) => Err(AppError::NotFound),
        }
    }

    /// Drops the segment's rows. Waits for in-flight cache writes, and
    /// computations already running for the segment are not stored.
    pub async fn invalidate_segment(&self, segment_id: i64) -> Result<u64, AppError> {
        let mut invalidations = self.invalidations.write().await;
        invalidations.epoch += 1;
        let epoch = invalidations.epoch;
        invalidations.segments.insert(segment_id, epoch);
        let removed = self.store.invalidate_segment(segment_id).await?;
        drop(invalidations);
        debug!(segment_id, removed, "Invalidated segment cache");
        Ok(removed)
    }

    pub async fn invalidate_activity(&self, activity_id: i64) -> Result<u64, AppError> {
        let mut invalidations = self.invalidations.write().await;
        invalidations.epoch += 1;
        let epoch = invalidations.epoch;
        invalidations.activities.insert(activity_id, epoch);
        invalidations.last_activity = epoch;
        let removed = self.store.invalidate_activity(activity_id).await?;
        drop(invalidations);
        debug!(activity_id, removed, "Invalidated activity cache");
        Ok(removed)
    }
}

fn uncached_entries(key: ListKey, matches: &[Match], now: OffsetDateTime) -> Vec<CacheEntry> {
    matches
        .iter()
        .map(|matched| CacheEntry {
            segment_id: key.segment_id,
            tolerance_meters: key.tolerance_m(),
            matched: *matched,
            range: None,
            metrics: None,
            cached_at: now,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::ManualClock, memory::InMemoryStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;
    use time::macros::datetime;

    fn cache(store: &InMemoryStore, clock: &Arc<ManualClock>) -> MatchCache {
        MatchCache::new(
            Arc::new(store.clone()),
            clock.clone(),
            Duration::from_secs(3600),
        )
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(datetime!(2024-05-01 08:00 UTC)))
    }

    fn resolved() -> (ResolvedRange, SegmentMetrics) {
        (
            ResolvedRange {
                start_index: 3,
                end_index: 40,
            },
            SegmentMetrics {
                avg_hr: Some(151.0),
                avg_speed: None,
                distance_m: 1000.0,
                elevation_gain_m: 12.0,
            },
        )
    }

    #[tokio::test]
    async fn test_key_locks_reclaimed() {
        let locks: KeyLocks<i64> = KeyLocks::new();
        let guard = locks.lock(1).await;
        assert_eq!(locks.len(), 1);
        drop(guard);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_list_ttl() {
        let store = InMemoryStore::new();
        let clock = clock();
        let cache = cache(&store, &clock);
        let key = ListKey::new(1, 15.0);
        let counter = AtomicUsize::new(0);
        let passes = &counter;

        let run = move || async move {
            passes.fetch_add(1, Ordering::SeqCst);
            Ok::<_, AppError>(vec![Match::new(10, 1.0, 500.0, 500.0)])
        };

        let (_, source) = cache.get_or_refresh_list(key, false, run).await.unwrap();
        assert_eq!(source, Source::Computed);
        clock.advance(time::Duration::minutes(59));
        let (entries, source) = cache.get_or_refresh_list(key, false, run).await.unwrap();
        assert_eq!(source, Source::Cache);
        assert_eq!(entries.len(), 1);
        clock.advance(time::Duration::minutes(2));
        cache.get_or_refresh_list(key, false, run).await.unwrap();
        cache.get_or_refresh_list(key, true, run).await.unwrap();
        assert_eq!(passes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_get_or_compute_upserts_existing_row() {
        let store = InMemoryStore::new();
        let clock = clock();
        let cache = cache(&store, &clock);
        let matched = Match::new(10, 1.0, 500.0, 500.0);
        store
            .replace_matches(ListKey::new(1, 15.0), &[matched], clock.now())
            .await
            .unwrap();

        let key = CacheKey::new(1, 10, 15.0);
        let first = cache
            .get_or_compute(key, |existing| async move {
                let existing = existing.expect("row from the list pass");
                Ok(Computation {
                    matched: Some(existing.matched),
                    resolved: Some(resolved()),
                })
            })
            .await
            .unwrap();
        assert_eq!(first.source, Source::Computed);
        assert_eq!(store.entry_count().await, 1);

        let second = cache
            .get_or_compute(key, |_| async { Err(AppError::Internal) })
            .await
            .unwrap();
        assert_eq!(second.source, Source::Cache);
        assert_eq!(second.range, first.range);
        assert_eq!(second.metrics, first.metrics);
    }

    #[tokio::test]
    async fn test_unmatched_result_not_cached() {
        let store = InMemoryStore::new();
        let clock = clock();
        let cache = cache(&store, &clock);
        let key = CacheKey::new(1, 10, 15.0);

        let result = cache
            .get_or_compute(key, |_| async {
                Ok(Computation {
                    matched: None,
                    resolved: Some(resolved()),
                })
            })
            .await
            .unwrap();
        assert_eq!(result.source, Source::Uncached);
        assert_eq!(store.entry_count().await, 0);

        let missing = cache
            .get_or_compute(key, |_| async { Ok(Computation::default()) })
            .await;
        assert!(matches!(missing, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn test_failed_compute_leaves_partial_row() {
        let store = InMemoryStore::new();
        let clock = clock();
        let cache = cache(&store, &clock);
        let key = CacheKey::new(1, 10, 15.0);
        store
            .upsert_match(key, &Match::new(10, 1.0, 500.0, 500.0), clock.now())
            .await
            .unwrap();

        let failed = cache
            .get_or_compute(key, |_| async {
                Err::<Computation, _>(AppError::Unavailable("store down".into()))
            })
            .await;
        assert!(matches!(failed, Err(AppError::Unavailable(_))));

        let entry = store.get_entry(key).await.unwrap().unwrap();
        assert!(entry.range.is_none());
        assert_eq!(entry.matched.activity_id, 10);
    }

    /// Store whose result writes stop until the test releases them.
    struct GatedStore {
        inner: InMemoryStore,
        entered: Notify,
        release: Notify,
    }

    impl GatedStore {
        fn new(inner: InMemoryStore) -> Self {
            Self {
                inner,
                entered: Notify::new(),
                release: Notify::new(),
            }
        }

        async fn gate(&self) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }

    #[async_trait]
    impl CacheStore for GatedStore {
        async fn get_entry(&self, key: CacheKey) -> Result<Option<CacheEntry>, AppError> {
            self.inner.get_entry(key).await
        }

        async fn list_entries(&self, key: ListKey) -> Result<Vec<CacheEntry>, AppError> {
            self.inner.list_entries(key).await
        }

        async fn list_refreshed_at(&self, key: ListKey) -> Result<Option<OffsetDateTime>, AppError> {
            self.inner.list_refreshed_at(key).await
        }

        async fn replace_matches(
            &self,
            key: ListKey,
            matches: &[Match],
            now: OffsetDateTime,
        ) -> Result<(), AppError> {
            self.gate().await;
            self.inner.replace_matches(key, matches, now).await
        }

        async fn upsert_match(
            &self,
            key: CacheKey,
            matched: &Match,
            now: OffsetDateTime,
        ) -> Result<(), AppError> {
            self.inner.upsert_match(key, matched, now).await
        }

        async fn store_resolution(
            &self,
            key: CacheKey,
            matched: &Match,
            range: ResolvedRange,
            metrics: &SegmentMetrics,
            now: OffsetDateTime,
        ) -> Result<(), AppError> {
            self.gate().await;
            self.inner.store_resolution(key, matched, range, metrics, now).await
        }

        async fn invalidate_segment(&self, segment_id: i64) -> Result<u64, AppError> {
            self.inner.invalidate_segment(segment_id).await
        }

        async fn invalidate_activity(&self, activity_id: i64) -> Result<u64, AppError> {
            self.inner.invalidate_activity(activity_id).await
        }
    }

    fn gated_cache(store: &Arc<GatedStore>) -> Arc<MatchCache> {
        Arc::new(MatchCache::new(
            store.clone(),
            clock(),
            Duration::from_secs(3600),
        ))
    }

    #[tokio::test]
    async fn test_invalidation_during_list_write_forces_recompute() {
        let store = Arc::new(GatedStore::new(InMemoryStore::new()));
        let cache = gated_cache(&store);
        let key = ListKey::new(1, 15.0);

        let pass = tokio::spawn({
            let cache = cache.clone();
            async move {
                cache
                    .get_or_refresh_list(key, false, || async {
                        Ok(vec![Match::new(10, 1.0, 500.0, 500.0)])
                    })
                    .await
            }
        });
        store.entered.notified().await;

        let invalidation = tokio::spawn({
            let cache = cache.clone();
            async move { cache.invalidate_segment(1).await }
        });
        tokio::task::yield_now().await;
        store.release.notify_one();

        pass.await.unwrap().unwrap();
        invalidation.await.unwrap().unwrap();

        let release = tokio::spawn({
            let store = store.clone();
            async move {
                store.entered.notified().await;
                store.release.notify_one();
            }
        });
        let (entries, source) = cache
            .get_or_refresh_list(key, false, || async { Ok(Vec::new()) })
            .await
            .unwrap();
        release.await.unwrap();
        assert_eq!(source, Source::Computed);
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_invalidation_during_metrics_write_drops_row() {
        let store = Arc::new(GatedStore::new(InMemoryStore::new()));
        let cache = gated_cache(&store);
        let key = CacheKey::new(1, 10, 15.0);

        let compute = tokio::spawn({
            let cache = cache.clone();
            async move {
                cache
                    .get_or_compute(key, |_| async {
                        Ok(Computation {
                            matched: Some(Match::new(10, 1.0, 500.0, 500.0)),
                            resolved: Some(resolved()),
                        })
                    })
                    .await
            }
        });
        store.entered.notified().await;

        let invalidation = tokio::spawn({
            let cache = cache.clone();
            async move { cache.invalidate_activity(10).await }
        });
        tokio::task::yield_now().await;
        store.release.notify_one();

        compute.await.unwrap().unwrap();
        invalidation.await.unwrap().unwrap();
        assert!(store.inner.get_entry(key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_computation_straddling_invalidation_not_stored() {
        let store = InMemoryStore::new();
        let cache = Arc::new(cache(&store, &clock()));
        let key = ListKey::new(1, 15.0);

        let (_, source) = cache
            .get_or_refresh_list(key, false, || {
                let cache = cache.clone();
                async move {
                    cache.invalidate_segment(1).await?;
                    Ok(vec![Match::new(10, 1.0, 500.0, 500.0)])
                }
            })
            .await
            .unwrap();
        assert_eq!(source, Source::Uncached);
        assert_eq!(store.entry_count().await, 0);

        // Other segments are unaffected.
        let other = ListKey::new(2, 15.0);
        let (_, source) = cache
            .get_or_refresh_list(other, false, || {
                let cache = cache.clone();
                async move {
                    cache.invalidate_segment(1).await?;
                    Ok(vec![Match::new(10, 1.0, 500.0, 500.0)])
                }
            })
            .await
            .unwrap();
        assert_eq!(source, Source::Computed);
    }
}
