//! Module of MemStorage, the in-memory store a node keeps for the identifiers it owns.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
pub use crate::storage::memory::MemStorage;

/// Key value storage interface
#[async_trait]
pub trait KvStorageInterface<K, V> {
    /// Get a cache entry by `key`.
    async fn get(&self, key: &K) -> Result<Option<V>>;

    /// Put `entry` in the cache under `key`.
    async fn put(&self, key: &K, value: &V) -> Result<()>;

    /// Get all entries.
    async fn get_all(&self) -> Result<Vec<(K, V)>>;

    /// Remove an `entry` by `key`, returning it if it was present.
    async fn remove(&self, key: &K) -> Result<Option<V>>;

    /// Delete all values.
    async fn clear(&self) -> Result<()>;

    /// Get the current storage usage.
    async fn count(&self) -> Result<u32>;
}
