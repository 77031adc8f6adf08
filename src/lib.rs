//! LooFinder: recently viewed toilets, cached on device.
//!
//! - [`recent`]: the bounded recent-entries cache with live subscriptions
//! - [`storage`]: durable key-value adapters the cache persists through
//! - [`config`]: file and environment configuration
//! - [`error`]: the crate error type

pub mod config;
pub mod error;
pub mod recent;
pub mod storage;

pub use config::{Config, RecentConfig};
pub use error::{LooError, Result};
pub use recent::{PoiRecord, RecentCache, RecentEntry, RecentStats, Snapshot, Subscription};
pub use storage::{DurableStore, FileStore, MemoryStore};
