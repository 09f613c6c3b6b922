//! Key-value store trait.
//!
//! This is the only seam between the cache and whatever actually persists
//! bytes. Every tab/process of one profile shares the same store, so
//! implementations must tolerate concurrent writers without coordination.

use agora_core::StoreError;
use async_trait::async_trait;

/// Byte-level view of how much a store currently holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreUsage {
    /// Number of keys present.
    pub entries: u64,
    /// Sum of key and value sizes in bytes.
    pub bytes: u64,
    /// Capacity in bytes, if the store has a fixed quota.
    pub quota_bytes: Option<u64>,
}

impl StoreUsage {
    /// Fraction of the quota in use (0.0 to 1.0), or `None` without a quota.
    pub fn utilization(&self) -> Option<f64> {
        self.quota_bytes
            .filter(|quota| *quota > 0)
            .map(|quota| self.bytes as f64 / quota as f64)
    }
}

/// Persistent key-value store with byte-size awareness.
///
/// # Errors
///
/// `set` must report a refused write for lack of space as
/// [`StoreError::QuotaExceeded`]; the cache relies on that variant to trigger
/// eviction.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read the raw bytes under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Delete `key`. Returns true if something was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// All keys starting with `prefix`.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Current usage of the store.
    async fn usage(&self) -> Result<StoreUsage, StoreError>;
}
