//! Background load and persistence for a [`RecentCache`](super::RecentCache).
//!
//! One worker task per cache instance. It restores the index from the durable
//! store first, then serves persist requests in arrival order. Requests that
//! pile up while a write is in flight are coalesced into a single write of the
//! index as it is at that moment, so the stored record never moves backwards.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::cache::CacheInner;
use super::entry::RecentEntry;
use crate::error::Result;
use crate::storage::DurableStore;

pub(crate) enum PersistCommand {
    /// The index changed and should be written.
    Sync,
    /// Acknowledge once everything queued before this has been handled.
    Flush(oneshot::Sender<()>),
}

pub(crate) async fn run(
    inner: Arc<CacheInner>,
    store: Arc<dyn DurableStore>,
    mut rx: mpsc::UnboundedReceiver<PersistCommand>,
) {
    if restore(&inner, store.as_ref()).await {
        write_index(&inner, store.as_ref()).await;
    }

    while let Some(first) = rx.recv().await {
        let mut dirty = false;
        let mut waiters = Vec::new();
        let mut next = Some(first);
        while let Some(command) = next {
            match command {
                PersistCommand::Sync => dirty = true,
                PersistCommand::Flush(ack) => waiters.push(ack),
            }
            next = rx.try_recv().ok();
        }

        if dirty {
            write_index(&inner, store.as_ref()).await;
        }
        for ack in waiters {
            let _ = ack.send(());
        }
    }
    debug!(
        key = %inner.config.storage_key,
        "Recent-entries persistence worker stopped"
    );
}

/// Load the stored index into `inner`. Returns `true` if the merged result
/// differs from what is stored and should be written back.
async fn restore(inner: &CacheInner, store: &dyn DurableStore) -> bool {
    let key = &inner.config.storage_key;
    let stored = match store.read(key).await {
        Ok(Some(raw)) => decode_index(&raw),
        Ok(None) => {
            debug!(key = %key, backend = store.name(), "No stored recent entries");
            HashMap::new()
        }
        Err(e) => {
            warn!(
                key = %key,
                backend = store.name(),
                error = %e,
                "Failed to read recent entries, starting empty"
            );
            HashMap::new()
        }
    };

    let restored = stored.len();
    let (snapshot, needs_write) = inner.merge_restored(stored);
    info!(key = %key, restored, total = snapshot.len(), "Recent entries loaded");
    inner.publish(snapshot);
    inner.mark_loaded();
    needs_write
}

async fn write_index(inner: &CacheInner, store: &dyn DurableStore) {
    let key = &inner.config.storage_key;
    let payload = {
        let index = inner.read_index();
        if index.is_empty() {
            None
        } else {
            Some(encode_index(&index))
        }
    };

    let result = match payload {
        None => store.remove(key).await,
        Some(Ok(data)) => store.write(key, &data).await,
        Some(Err(e)) => Err(e),
    };
    match result {
        Ok(()) => debug!(key = %key, backend = store.name(), "Recent entries persisted"),
        Err(e) => warn!(
            key = %key,
            backend = store.name(),
            error = %e,
            "Failed to persist recent entries; in-memory state remains authoritative"
        ),
    }
}

/// Serialize the index as a JSON object keyed by id, in id order.
pub(crate) fn encode_index(index: &HashMap<String, RecentEntry>) -> Result<String> {
    let ordered: BTreeMap<&str, &RecentEntry> =
        index.iter().map(|(id, e)| (id.as_str(), e)).collect();
    Ok(serde_json::to_string(&ordered)?)
}

/// Parse a stored record entry by entry.
///
/// An unparsable record yields an empty index; an unparsable entry is skipped.
/// The map key is authoritative for the id.
pub(crate) fn decode_index(raw: &str) -> HashMap<String, RecentEntry> {
    let map: serde_json::Map<String, serde_json::Value> = match serde_json::from_str(raw) {
        Ok(map) => map,
        Err(e) => {
            warn!(error = %e, "Stored recent entries are unreadable, starting empty");
            return HashMap::new();
        }
    };

    let mut index = HashMap::with_capacity(map.len());
    for (id, value) in map {
        if id.trim().is_empty() {
            warn!("Skipping stored recent entry with a blank id");
            continue;
        }
        match serde_json::from_value::<RecentEntry>(value) {
            Ok(mut entry) => {
                entry.id = id.clone();
                entry.view_count = entry.view_count.max(1);
                index.insert(id, entry);
            }
            Err(e) => warn!(id = %id, error = %e, "Skipping unreadable stored recent entry"),
        }
    }
    index
}
