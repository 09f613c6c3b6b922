//! In-memory key-value store with an optional byte quota.
//!
//! Behaves like a browser-profile storage area: writes that would push the
//! total past the quota are refused with [`StoreError::QuotaExceeded`].
//! Cloning shares the underlying map, which is how tests model several tabs
//! over one profile.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use agora_core::StoreError;
use async_trait::async_trait;

use crate::kv::{KvStore, StoreUsage};

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<String, Vec<u8>>,
    bytes: u64,
    rejected_writes: u64,
}

fn entry_size(key: &str, value: &[u8]) -> u64 {
    (key.len() + value.len()) as u64
}

/// Shared in-memory store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryKvStore {
    inner: Arc<RwLock<Inner>>,
    quota_bytes: Option<u64>,
}

impl InMemoryKvStore {
    /// Store without a quota.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that refuses writes once `quota_bytes` would be exceeded.
    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Number of writes refused for lack of space.
    pub fn rejected_writes(&self) -> u64 {
        self.inner
            .read()
            .map(|inner| inner.rejected_writes)
            .unwrap_or_default()
    }

    /// Raw bytes under `key`, bypassing the async interface.
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.inner
            .read()
            .ok()
            .and_then(|inner| inner.entries.get(key).cloned())
    }

    /// Write raw bytes, ignoring the quota. Used to seed fixtures.
    pub fn insert_raw(&self, key: &str, value: Vec<u8>) {
        if let Ok(mut inner) = self.inner.write() {
            let size = entry_size(key, &value);
            if let Some(previous) = inner.entries.insert(key.to_string(), value) {
                inner.bytes = inner.bytes.saturating_sub(entry_size(key, &previous));
            }
            inner.bytes += size;
        }
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(inner.entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        let previous = inner
            .entries
            .get(key)
            .map(|old| entry_size(key, old))
            .unwrap_or(0);
        let projected = inner.bytes - previous + entry_size(key, value);

        if let Some(quota) = self.quota_bytes {
            if projected > quota {
                inner.rejected_writes += 1;
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    bytes: value.len(),
                });
            }
        }

        inner.entries.insert(key.to_string(), value.to_vec());
        inner.bytes = projected;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        match inner.entries.remove(key) {
            Some(old) => {
                inner.bytes = inner.bytes.saturating_sub(entry_size(key, &old));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(inner
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn usage(&self) -> Result<StoreUsage, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(StoreUsage {
            entries: inner.entries.len() as u64,
            bytes: inner.bytes,
            quota_bytes: self.quota_bytes,
        })
    }
}
