//! The recent-entries cache manager.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};
use super::entry::{by_popularity, by_recency, evict_overflow, PoiRecord, RecentEntry, RecentStats};
use super::persist::{self, PersistCommand};
use super::subscribers::{SubscriberRegistry, Subscription};
use super::Snapshot;
use crate::config::RecentConfig;
use crate::error::{LooError, Result};
use crate::storage::DurableStore;

/// Bounded index of recently viewed points of interest.
///
/// Clone is cheap; all clones share one index, one subscriber registry and one
/// persistence worker. Create a single instance per durable key and hand
/// clones to whoever needs it.
///
/// Reads and mutations are synchronous and never wait on storage. Every
/// mutation queues a background write of the whole index and then notifies
/// subscribers with a fresh [`Snapshot`]. Storage failures are logged and
/// never undo an in-memory change.
#[derive(Clone)]
pub struct RecentCache {
    inner: Arc<CacheInner>,
    persist_tx: mpsc::UnboundedSender<PersistCommand>,
}

pub(crate) struct CacheInner {
    pub(crate) config: RecentConfig,
    clock: Arc<dyn Clock>,
    index: RwLock<HashMap<String, RecentEntry>>,
    subscribers: Arc<SubscriberRegistry>,
    updates: watch::Sender<Snapshot>,
    loaded: watch::Sender<bool>,
}

impl RecentCache {
    /// Create a cache over `store` and start restoring it in the background.
    ///
    /// Returns immediately; queries see an empty (or partially built) index
    /// until [`ready`](Self::ready) resolves. Fails only when called outside
    /// a Tokio runtime.
    pub fn new(store: Arc<dyn DurableStore>, config: RecentConfig) -> Result<Self> {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Like [`new`](Self::new) with an explicit time source.
    pub fn with_clock(
        store: Arc<dyn DurableStore>,
        config: RecentConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            LooError::Runtime(format!("RecentCache must be created inside a Tokio runtime: {e}"))
        })?;

        let empty: Snapshot = Arc::from(Vec::new());
        let (updates, _) = watch::channel(empty);
        let (loaded, _) = watch::channel(false);
        let inner = Arc::new(CacheInner {
            config: config.normalized(),
            clock,
            index: RwLock::new(HashMap::new()),
            subscribers: Arc::new(SubscriberRegistry::new()),
            updates,
            loaded,
        });

        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        runtime.spawn(persist::run(Arc::clone(&inner), store, persist_rx));
        debug!(key = %inner.config.storage_key, "Recent-entries cache created");

        Ok(Self { inner, persist_tx })
    }

    /// Create a cache and wait until the stored index has been restored.
    pub async fn open(store: Arc<dyn DurableStore>, config: RecentConfig) -> Result<Self> {
        let cache = Self::new(store, config)?;
        cache.ready().await;
        Ok(cache)
    }

    /// Record that the user opened the detail view of `poi`.
    ///
    /// Returns the updated entry, or `None` when `poi` has no usable id (the
    /// event is logged and ignored).
    pub fn record_view(&self, poi: PoiRecord) -> Option<RecentEntry> {
        let Some(id) = poi.key().map(str::to_string) else {
            warn!(?poi, "Ignoring view of a point of interest without an id");
            return None;
        };
        let now = self.inner.clock.now_millis();
        let max_entries = self.inner.config.max_entries;

        self.mutate(|index| {
            let entry = match index.get_mut(&id) {
                Some(existing) => {
                    existing.record_repeat_view(&poi, now);
                    existing.clone()
                }
                None => {
                    let entry = RecentEntry::first_view(&id, &poi, now);
                    index.insert(id.clone(), entry.clone());
                    entry
                }
            };
            let evicted = evict_overflow(index, max_entries);
            if !evicted.is_empty() {
                debug!(?evicted, "Evicted least-recently-viewed entries");
            }
            debug!(id = %id, views = entry.view_count, "Recorded view");
            Some(entry)
        })
    }

    /// All entries, most recently viewed first (ties by id).
    pub fn recent(&self) -> Snapshot {
        sorted_snapshot(&self.inner.read_index())
    }

    /// The `limit` most recently viewed entries.
    pub fn recent_limited(&self, limit: usize) -> Vec<RecentEntry> {
        self.recent().iter().take(limit).cloned().collect()
    }

    /// The most viewed entries, capped at `most_viewed_limit`.
    ///
    /// Ordered by view count, then recency, then id.
    pub fn most_viewed(&self) -> Vec<RecentEntry> {
        let mut entries: Vec<RecentEntry> = self.inner.read_index().values().cloned().collect();
        entries.sort_by(by_popularity);
        entries.truncate(self.inner.config.most_viewed_limit);
        entries
    }

    pub fn is_recent(&self, id: &str) -> bool {
        self.inner.read_index().contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<RecentEntry> {
        self.inner.read_index().get(id).cloned()
    }

    /// Delete `id`. Returns `false`, without persisting or notifying, if it
    /// was not present.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.mutate(|index| index.remove(id).map(|_| ())).is_some();
        if removed {
            debug!(id = %id, "Removed recent entry");
        }
        removed
    }

    /// Delete every entry.
    pub fn clear(&self) {
        self.mutate(|index| {
            let cleared = index.len();
            index.clear();
            debug!(cleared, "Cleared recent entries");
            Some(())
        });
    }

    /// Register `callback` for snapshots.
    ///
    /// The callback runs once right away with the current [`recent`](Self::recent)
    /// snapshot, then after every mutation (and once when the background load
    /// finishes). It may query the cache. Keep the returned [`Subscription`]
    /// alive for as long as updates are wanted.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        let id = self.inner.subscribers.register(Arc::new(callback));
        self.inner.subscribers.deliver_to(id, &self.recent());
        Subscription::new(id, &self.inner.subscribers)
    }

    /// Receiver that always holds the latest snapshot.
    pub fn updates(&self) -> watch::Receiver<Snapshot> {
        self.inner.updates.subscribe()
    }

    pub fn stats(&self) -> RecentStats {
        RecentStats::collect(self.inner.read_index().values())
    }

    pub fn len(&self) -> usize {
        self.inner.read_index().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read_index().is_empty()
    }

    pub fn config(&self) -> &RecentConfig {
        &self.inner.config
    }

    /// Whether the background load has finished.
    pub fn is_loaded(&self) -> bool {
        *self.inner.loaded.borrow()
    }

    /// Wait for the background load to finish (successfully or not).
    pub async fn ready(&self) {
        let mut loaded = self.inner.loaded.subscribe();
        let _ = loaded.wait_for(|done| *done).await;
    }

    /// Wait until every mutation made before this call has been written to
    /// the durable store, or its write has failed and been logged.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.persist_tx.send(PersistCommand::Flush(ack_tx)).is_err() {
            warn!("Recent-entries persistence worker is gone; nothing to flush");
            return;
        }
        let _ = ack_rx.await;
    }

    /// Apply `change` under the write lock. If it reports a change (`Some`),
    /// queue persistence and notify subscribers.
    fn mutate<R>(
        &self,
        change: impl FnOnce(&mut HashMap<String, RecentEntry>) -> Option<R>,
    ) -> Option<R> {
        let (result, snapshot) = {
            let mut index = self.inner.write_index();
            let result = change(&mut *index)?;
            (result, sorted_snapshot(&index))
        };
        if self.persist_tx.send(PersistCommand::Sync).is_err() {
            warn!("Recent-entries persistence worker is gone; change kept in memory only");
        }
        self.inner.publish(snapshot);
        Some(result)
    }
}

impl std::fmt::Debug for RecentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecentCache")
            .field("storage_key", &self.inner.config.storage_key)
            .field("max_entries", &self.inner.config.max_entries)
            .field("entries", &self.len())
            .field("subscribers", &self.inner.subscribers.len())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl CacheInner {
    pub(crate) fn read_index(&self) -> RwLockReadGuard<'_, HashMap<String, RecentEntry>> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, HashMap<String, RecentEntry>> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fold restored entries into the live index.
    ///
    /// Ids viewed before the load finished keep their live display fields and
    /// add the stored view count. Returns the resulting snapshot and whether
    /// the merged index should be written back.
    pub(crate) fn merge_restored(
        &self,
        restored: HashMap<String, RecentEntry>,
    ) -> (Snapshot, bool) {
        let mut index = self.write_index();
        let had_live_views = !index.is_empty();
        for (id, stored) in restored {
            match index.get_mut(&id) {
                Some(live) => live.absorb_stored(&stored),
                None => {
                    index.insert(id, stored);
                }
            }
        }
        let evicted = evict_overflow(&mut index, self.config.max_entries);
        if !evicted.is_empty() {
            debug!(?evicted, "Trimmed restored recent entries to capacity");
        }
        (sorted_snapshot(&index), had_live_views || !evicted.is_empty())
    }

    pub(crate) fn publish(&self, snapshot: Snapshot) {
        self.updates.send_replace(Arc::clone(&snapshot));
        self.subscribers.notify(&snapshot);
    }

    pub(crate) fn mark_loaded(&self) {
        self.loaded.send_replace(true);
    }
}

fn sorted_snapshot(index: &HashMap<String, RecentEntry>) -> Snapshot {
    let mut entries: Vec<RecentEntry> = index.values().cloned().collect();
    entries.sort_by(by_recency);
    Arc::from(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recent::clock::ManualClock;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    const KEY: &str = "recent_toilets";

    fn config(max_entries: usize) -> RecentConfig {
        RecentConfig {
            max_entries,
            ..RecentConfig::default()
        }
    }

    async fn cache_with(
        store: MemoryStore,
        max_entries: usize,
    ) -> (RecentCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let cache =
            RecentCache::with_clock(Arc::new(store), config(max_entries), clock.clone()).unwrap();
        cache.ready().await;
        (cache, clock)
    }

    fn view_at(cache: &RecentCache, clock: &ManualClock, id: &str, at: i64) -> RecentEntry {
        clock.set(at);
        cache.record_view(PoiRecord::new(id)).unwrap()
    }

    fn ids(entries: &[RecentEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.id.as_str()).collect()
    }

    /// Store whose writes and reads always fail.
    struct FailingStore {
        writes: AtomicUsize,
    }

    #[async_trait]
    impl DurableStore for FailingStore {
        fn name(&self) -> &str {
            "failing"
        }
        async fn read(&self, _key: &str) -> Result<Option<String>> {
            Err(LooError::Storage("device storage unavailable".into()))
        }
        async fn write(&self, _key: &str, _value: &str) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Err(LooError::Storage("quota exceeded".into()))
        }
        async fn remove(&self, _key: &str) -> Result<()> {
            Err(LooError::Storage("quota exceeded".into()))
        }
    }

    /// Store whose first read blocks until `gate` is notified.
    struct GatedStore {
        inner: MemoryStore,
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl DurableStore for GatedStore {
        fn name(&self) -> &str {
            "gated"
        }
        async fn read(&self, key: &str) -> Result<Option<String>> {
            self.gate.notified().await;
            self.inner.read(key).await
        }
        async fn write(&self, key: &str, value: &str) -> Result<()> {
            self.inner.write(key, value).await
        }
        async fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key).await
        }
    }

    // ── record_view ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_repeat_view_scenario() {
        let (cache, clock) = cache_with(MemoryStore::new(), 20).await;
        view_at(&cache, &clock, "A", 1);
        view_at(&cache, &clock, "B", 2);
        view_at(&cache, &clock, "A", 3);

        let recent = cache.recent();
        assert_eq!(ids(&recent), ["A", "B"]);
        assert_eq!((recent[0].view_count, recent[0].last_viewed_at), (2, 3));
        assert_eq!((recent[1].view_count, recent[1].last_viewed_at), (1, 2));
    }

    #[tokio::test]
    async fn test_repeat_views_increment_by_one_without_duplicates() {
        let (cache, clock) = cache_with(MemoryStore::new(), 20).await;
        for n in 1..=5u32 {
            let entry = view_at(&cache, &clock, "T", i64::from(n));
            assert_eq!(entry.view_count, n);
        }
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_view_without_id_is_ignored() {
        let (cache, _clock) = cache_with(MemoryStore::new(), 20).await;
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let _sub = cache.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(cache.record_view(PoiRecord::default()).is_none());
        assert!(cache.record_view(PoiRecord::new("  ")).is_none());
        assert!(cache.is_empty());
        // Only the delivery made at subscribe time.
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_view_fields_default_and_refresh() {
        let (cache, clock) = cache_with(MemoryStore::new(), 20).await;
        clock.set(10);
        let first = cache.record_view(PoiRecord::new("t1")).unwrap();
        assert_eq!(first.name, crate::recent::DEFAULT_NAME);
        assert_eq!(first.address, crate::recent::DEFAULT_ADDRESS);

        clock.set(20);
        let second = cache
            .record_view(
                PoiRecord::new("t1")
                    .with_name("Library WC")
                    .with_rating(4.0),
            )
            .unwrap();
        assert_eq!(second.name, "Library WC");
        assert_eq!(second.rating, Some(4.0));
        assert_eq!(cache.get("t1"), Some(second));
    }

    #[tokio::test]
    async fn test_recent_is_sorted_by_non_increasing_time() {
        let (cache, clock) = cache_with(MemoryStore::new(), 20).await;
        for (id, at) in [("c", 5), ("a", 9), ("b", 5), ("d", 1), ("a", 12), ("e", 9)] {
            view_at(&cache, &clock, id, at);
        }
        let recent = cache.recent();
        assert!(recent
            .windows(2)
            .all(|w| w[0].last_viewed_at >= w[1].last_viewed_at));
        assert_eq!(ids(&recent), ["a", "e", "b", "c", "d"]);
        assert_eq!(ids(&cache.recent_limited(2)), ["a", "e"]);
    }

    // ── eviction ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_capacity_two_evicts_oldest() {
        let (cache, clock) = cache_with(MemoryStore::new(), 2).await;
        view_at(&cache, &clock, "A", 1);
        view_at(&cache, &clock, "B", 2);
        view_at(&cache, &clock, "C", 3);

        assert!(!cache.is_recent("A"));
        assert_eq!(ids(&cache.recent()), ["C", "B"]);
    }

    #[tokio::test]
    async fn test_overflow_keeps_most_recent_max_entries() {
        let (cache, clock) = cache_with(MemoryStore::new(), 20).await;
        for i in 0..27 {
            view_at(&cache, &clock, &format!("poi-{i:02}"), i64::from(i) + 1);
        }
        assert_eq!(cache.len(), 20);
        let expected: Vec<String> = (7..27).rev().map(|i| format!("poi-{i:02}")).collect();
        let recent = cache.recent();
        assert_eq!(ids(&recent), expected.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_subscribers_never_see_over_capacity() {
        let (cache, clock) = cache_with(MemoryStore::new(), 3).await;
        let max_seen = Arc::new(AtomicUsize::new(0));
        let m = max_seen.clone();
        let _sub = cache.subscribe(move |snapshot| {
            m.fetch_max(snapshot.len(), Ordering::SeqCst);
        });
        for i in 0..10 {
            view_at(&cache, &clock, &format!("t{i}"), i);
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 3);
    }

    // ── queries ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_most_viewed_top_ten() {
        let (cache, clock) = cache_with(MemoryStore::new(), 20).await;
        let mut t = 0;
        for i in 0..12 {
            for _ in 0..=i {
                t += 1;
                view_at(&cache, &clock, &format!("t{i:02}"), t);
            }
        }
        // Two views, same as t01, but t01 still falls outside the top ten.
        view_at(&cache, &clock, "tie-old", 1000);
        view_at(&cache, &clock, "tie-old", 1001);

        let top = cache.most_viewed();
        assert_eq!(top.len(), 10);
        assert_eq!(top[0].id, "t11");
        assert_eq!(top[0].view_count, 12);
        assert!(top.windows(2).all(|w| w[0].view_count >= w[1].view_count));
        assert!(!top.iter().any(|e| e.id == "t00" || e.id == "tie-old"));
    }

    #[tokio::test]
    async fn test_most_viewed_tie_breaks() {
        let (cache, clock) = cache_with(MemoryStore::new(), 20).await;
        view_at(&cache, &clock, "b", 1);
        view_at(&cache, &clock, "a", 1);
        view_at(&cache, &clock, "c", 2);
        assert_eq!(ids(&cache.most_viewed()), ["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_is_recent_matches_get() {
        let (cache, clock) = cache_with(MemoryStore::new(), 2).await;
        for (id, at) in [("x", 1), ("y", 2), ("z", 3)] {
            view_at(&cache, &clock, id, at);
        }
        for id in ["x", "y", "z", "missing"] {
            assert_eq!(cache.is_recent(id), cache.get(id).is_some(), "id {id}");
        }
    }

    #[tokio::test]
    async fn test_stats() {
        let (cache, clock) = cache_with(MemoryStore::new(), 20).await;
        let empty = cache.stats();
        assert_eq!(empty.total_entries, 0);
        assert_eq!(empty.oldest_viewed_at, None);

        view_at(&cache, &clock, "a", 100);
        view_at(&cache, &clock, "b", 200);
        view_at(&cache, &clock, "a", 300);
        let stats = cache.stats();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.total_views, 3);
        assert_eq!(stats.oldest_viewed_at, Some(200));
        assert_eq!(stats.newest_viewed_at, Some(300));
    }

    // ── remove / clear ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_remove_present_and_absent() {
        let (cache, clock) = cache_with(MemoryStore::new(), 20).await;
        view_at(&cache, &clock, "a", 1);

        let notified = Arc::new(AtomicUsize::new(0));
        let n = notified.clone();
        let _sub = cache.subscribe(move |_| {
            n.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        assert!(cache.remove("a"));
        assert!(!cache.is_recent("a"));
        assert_eq!(notified.load(Ordering::SeqCst), 2);

        assert!(!cache.remove("a"));
        assert_eq!(notified.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_clear() {
        let store = MemoryStore::new();
        let (cache, clock) = cache_with(store.clone(), 20).await;
        view_at(&cache, &clock, "a", 1);
        view_at(&cache, &clock, "b", 2);
        cache.flush().await;
        assert!(store.get_sync(KEY).is_some());

        cache.clear();
        assert!(cache.recent().is_empty());
        assert_eq!(cache.stats().total_entries, 0);

        cache.flush().await;
        assert_eq!(store.get_sync(KEY), None);
    }

    // ── subscriptions ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_subscribe_delivers_current_state_then_updates() {
        let (cache, clock) = cache_with(MemoryStore::new(), 20).await;
        view_at(&cache, &clock, "a", 1);

        let seen: Arc<Mutex<Vec<Snapshot>>> = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let sub = cache.subscribe(move |snapshot| s.lock().unwrap().push(snapshot.clone()));

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(seen.lock().unwrap()[0], cache.recent());

        view_at(&cache, &clock, "b", 2);
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(ids(&seen.lock().unwrap()[1]), ["b", "a"]);

        sub.unsubscribe();
        sub.unsubscribe();
        view_at(&cache, &clock, "c", 3);
        cache.clear();
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_each_subscriber_notified_once_per_mutation() {
        let (cache, clock) = cache_with(MemoryStore::new(), 20).await;
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let (a2, b2) = (a.clone(), b.clone());
        let _sa = cache.subscribe(move |_| {
            a2.fetch_add(1, Ordering::SeqCst);
        });
        let _sb = cache.subscribe(move |_| {
            b2.fetch_add(1, Ordering::SeqCst);
        });

        view_at(&cache, &clock, "x", 1);
        view_at(&cache, &clock, "x", 2);
        cache.remove("x");
        cache.clear();

        assert_eq!(a.load(Ordering::SeqCst), 5);
        assert_eq!(b.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_subscriber_may_query_cache() {
        let (cache, clock) = cache_with(MemoryStore::new(), 20).await;
        let reader = cache.clone();
        let consistent = Arc::new(AtomicUsize::new(0));
        let c = consistent.clone();
        let _sub = cache.subscribe(move |snapshot| {
            if snapshot.len() == reader.len() {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });
        view_at(&cache, &clock, "a", 1);
        assert_eq!(consistent.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_updates_channel_tracks_latest() {
        let (cache, clock) = cache_with(MemoryStore::new(), 20).await;
        let mut rx = cache.updates();
        view_at(&cache, &clock, "a", 1);
        rx.changed().await.unwrap();
        assert_eq!(ids(&rx.borrow_and_update()), ["a"]);
    }

    // ── load on start ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_persist_and_reload_round_trip() {
        let store = MemoryStore::new();
        let (cache, clock) = cache_with(store.clone(), 20).await;
        clock.set(5);
        cache.record_view(
            PoiRecord::new("a")
                .with_name("Mall WC")
                .with_image_ref("img/a.png"),
        );
        view_at(&cache, &clock, "b", 6);
        view_at(&cache, &clock, "a", 7);
        cache.flush().await;

        let (reloaded, _) = cache_with(store, 20).await;
        let before = cache.recent();
        let after = reloaded.recent();
        assert_eq!(before, after);
        assert_eq!(after[0].image_ref.as_deref(), Some("img/a.png"));
    }

    #[tokio::test]
    async fn test_corrupt_record_starts_empty() {
        let store = MemoryStore::with_record(KEY, "{{{ definitely not json");
        let (cache, _) = cache_with(store, 20).await;
        assert!(cache.is_loaded());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_partially_corrupt_record_keeps_valid_entries() {
        let store = MemoryStore::with_record(
            KEY,
            r#"{"a":{"lastViewedAt":4,"viewCount":2,"futureField":[1]},"b":{"viewCount":"x"}}"#,
        );
        let (cache, _) = cache_with(store, 20).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a").unwrap().view_count, 2);
    }

    #[tokio::test]
    async fn test_oversized_record_trimmed_on_load() {
        let raw = format!(
            "{{{}}}",
            (1..=5)
                .map(|i| format!(r#""t{i}":{{"lastViewedAt":{i}}}"#))
                .collect::<Vec<_>>()
                .join(",")
        );
        let store = MemoryStore::with_record(KEY, &raw);
        let (cache, _) = cache_with(store.clone(), 3).await;
        assert_eq!(ids(&cache.recent()), ["t5", "t4", "t3"]);

        cache.flush().await;
        let stored = persist::decode_index(&store.get_sync(KEY).unwrap());
        assert_eq!(stored.len(), 3);
    }

    #[tokio::test]
    async fn test_subscriber_before_load_is_notified_when_load_finishes() {
        let seed = MemoryStore::with_record(KEY, r#"{"old":{"lastViewedAt":1,"viewCount":4}}"#);
        let gate = Arc::new(Notify::new());
        let store = GatedStore {
            inner: seed,
            gate: gate.clone(),
        };
        let cache =
            RecentCache::with_clock(Arc::new(store), config(20), Arc::new(ManualClock::new(10)))
                .unwrap();

        let seen: Arc<Mutex<Vec<Snapshot>>> = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let _sub = cache.subscribe(move |snapshot| s.lock().unwrap().push(snapshot.clone()));
        assert!(!cache.is_loaded());
        assert!(seen.lock().unwrap()[0].is_empty());

        gate.notify_one();
        cache.ready().await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(ids(&seen[1]), ["old"]);
    }

    #[tokio::test]
    async fn test_view_during_load_merges_with_stored_entry() {
        let seed = MemoryStore::with_record(
            KEY,
            r#"{"a":{"name":"Old name","lastViewedAt":1,"viewCount":4},"b":{"lastViewedAt":2}}"#,
        );
        let gate = Arc::new(Notify::new());
        let store = GatedStore {
            inner: seed.clone(),
            gate: gate.clone(),
        };
        let clock = Arc::new(ManualClock::new(50));
        let cache = RecentCache::with_clock(Arc::new(store), config(20), clock).unwrap();

        cache.record_view(PoiRecord::new("a").with_name("New name"));
        gate.notify_one();
        cache.ready().await;

        let a = cache.get("a").unwrap();
        assert_eq!(a.view_count, 5);
        assert_eq!(a.last_viewed_at, 50);
        assert_eq!(a.name, "New name");
        assert!(cache.is_recent("b"));

        cache.flush().await;
        let stored = persist::decode_index(&seed.get_sync(KEY).unwrap());
        assert_eq!(stored["a"].view_count, 5);
        assert!(stored.contains_key("b"));
    }

    // ── storage failures ────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_storage_failures_leave_memory_authoritative() {
        let store = Arc::new(FailingStore {
            writes: AtomicUsize::new(0),
        });
        let clock = Arc::new(ManualClock::new(0));
        let cache = RecentCache::with_clock(store.clone(), config(20), clock.clone()).unwrap();
        cache.ready().await;
        assert!(cache.is_empty());

        view_at(&cache, &clock, "a", 1);
        cache.flush().await;
        view_at(&cache, &clock, "b", 2);
        cache.flush().await;

        assert_eq!(ids(&cache.recent()), ["b", "a"]);
        assert_eq!(store.writes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_flush_coalesces_and_persists_latest_state() {
        let store = MemoryStore::new();
        let (cache, clock) = cache_with(store.clone(), 20).await;
        for i in 0..50 {
            view_at(&cache, &clock, &format!("t{}", i % 7), i);
        }
        cache.flush().await;
        let stored = persist::decode_index(&store.get_sync(KEY).unwrap());
        let live: HashMap<String, RecentEntry> = cache
            .recent()
            .iter()
            .map(|e| (e.id.clone(), e.clone()))
            .collect();
        assert_eq!(stored, live);
    }

    #[test]
    fn test_new_outside_runtime_is_error() {
        let err = RecentCache::new(Arc::new(MemoryStore::new()), RecentConfig::default())
            .unwrap_err();
        assert!(matches!(err, LooError::Runtime(_)), "got: {err}");
    }

    #[tokio::test]
    async fn test_open_waits_for_load() {
        let store = MemoryStore::with_record(KEY, r#"{"a":{"lastViewedAt":1}}"#);
        let cache = RecentCache::open(Arc::new(store), RecentConfig::default())
            .await
            .unwrap();
        assert!(cache.is_loaded());
        assert!(cache.is_recent("a"));
    }
}
