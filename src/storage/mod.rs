//! Durable key-value storage adapters.
//!
//! The recent-entries cache persists its whole index as one string value
//! under a single key. Any backend that can read, write and remove a named
//! string record can host it.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::Result;

/// A durable string-valued key-value store.
///
/// Failures are returned, never swallowed. Callers treat an error as
/// "not persisted"; no atomicity is promised across different keys.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Short backend name used in log output (e.g. `"file"`, `"memory"`).
    fn name(&self) -> &str;

    /// Read the record stored under `key`, or `None` if there is none.
    async fn read(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous record.
    async fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Delete the record under `key`. Removing an absent key succeeds.
    async fn remove(&self, key: &str) -> Result<()>;
}
