//! Observer registry for recent-entry snapshots.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::warn;

use super::Snapshot;

type Callback = Arc<dyn Fn(&Snapshot) + Send + Sync>;

/// Live subscriber callbacks, keyed by registration id.
///
/// Registering the same closure twice produces two independent registrations.
#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(u64, Callback)>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback and return its registration id.
    pub fn register(&self, callback: Callback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push((id, callback));
        id
    }

    /// Remove the registration `id`. Returns `false` if it was already gone.
    pub fn deregister(&self, id: u64) -> bool {
        let mut callbacks = self.lock();
        let before = callbacks.len();
        callbacks.retain(|(cid, _)| *cid != id);
        callbacks.len() != before
    }

    /// Call one registered callback.
    pub fn deliver_to(&self, id: u64, snapshot: &Snapshot) {
        let callback = self
            .lock()
            .iter()
            .find(|(cid, _)| *cid == id)
            .map(|(_, cb)| Arc::clone(cb));
        if let Some(callback) = callback {
            invoke(id, &callback, snapshot);
        }
    }

    /// Call every registered callback once with `snapshot`.
    ///
    /// The list is copied before calling out, so callbacks may subscribe,
    /// unsubscribe or query the cache.
    pub fn notify(&self, snapshot: &Snapshot) {
        let callbacks: Vec<(u64, Callback)> = self.lock().clone();
        for (id, callback) in &callbacks {
            invoke(*id, callback, snapshot);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(u64, Callback)>> {
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn invoke(id: u64, callback: &Callback, snapshot: &Snapshot) {
    if catch_unwind(AssertUnwindSafe(|| callback(snapshot))).is_err() {
        warn!(subscriber = id, "Recent-entries subscriber panicked; continuing");
    }
}

/// Handle returned by [`RecentCache::subscribe`](super::RecentCache::subscribe).
///
/// Dropping it unsubscribes. [`unsubscribe`](Self::unsubscribe) may be called
/// any number of times.
#[must_use = "dropping a Subscription unsubscribes its callback"]
pub struct Subscription {
    id: u64,
    registry: Weak<SubscriberRegistry>,
    active: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(id: u64, registry: &Arc<SubscriberRegistry>) -> Self {
        Self {
            id,
            registry: Arc::downgrade(registry),
            active: AtomicBool::new(true),
        }
    }

    /// Stop receiving snapshots. Later calls do nothing.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.deregister(self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
