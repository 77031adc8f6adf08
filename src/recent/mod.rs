//! Recently viewed points of interest.
//!
//! [`RecentCache`] keeps a bounded, in-memory index of the toilets a user has
//! opened, mirrors it to a [`DurableStore`](crate::storage::DurableStore) in
//! the background, and pushes a sorted [`Snapshot`] to subscribers after every
//! change.
//!
//! # Example
//!
//! ```rust
//! # tokio_test::block_on(async {
//! use std::sync::Arc;
//! use loofinder::config::RecentConfig;
//! use loofinder::recent::{PoiRecord, RecentCache};
//! use loofinder::storage::MemoryStore;
//!
//! let cache = RecentCache::open(Arc::new(MemoryStore::new()), RecentConfig::default())
//!     .await
//!     .unwrap();
//! cache.record_view(PoiRecord::new("t-42").with_name("Central Station WC"));
//! cache.record_view(PoiRecord::new("t-42"));
//!
//! let recent = cache.recent();
//! assert_eq!(recent.len(), 1);
//! assert_eq!(recent[0].view_count, 2);
//! # });
//! ```

mod cache;
pub mod clock;
mod entry;
mod persist;
mod subscribers;

use std::sync::Arc;

pub use cache::RecentCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{
    by_popularity, by_recency, PoiRecord, RecentEntry, RecentStats, DEFAULT_ADDRESS, DEFAULT_NAME,
};
pub use subscribers::Subscription;

/// Immutable, ordered view of the index delivered to subscribers.
pub type Snapshot = Arc<[RecentEntry]>;
