//! LMDB-backed key-value store.
//!
//! Uses the heed crate (Rust bindings for LMDB). The environment's map size
//! is the store quota: a write that does not fit fails with `MDB_MAP_FULL`,
//! which is surfaced as [`StoreError::QuotaExceeded`].
//!
//! Several handles opened on the same directory within one process must
//! share a single `Env`; clone the store instead of opening it twice.

use std::path::Path;

use agora_core::StoreError;
use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, MdbError};

use crate::kv::{KvStore, StoreUsage};

fn map_heed(key: &str, bytes: usize, err: heed::Error) -> StoreError {
    match err {
        heed::Error::Mdb(MdbError::MapFull) => StoreError::QuotaExceeded {
            key: key.to_string(),
            bytes,
        },
        other => StoreError::Backend {
            reason: other.to_string(),
        },
    }
}

fn backend_err(err: heed::Error) -> StoreError {
    StoreError::Backend {
        reason: err.to_string(),
    }
}

/// Persistent store in a single unnamed LMDB database.
#[derive(Clone)]
pub struct LmdbKvStore {
    env: Env,
    db: Database<Bytes, Bytes>,
    map_size: usize,
}

impl std::fmt::Debug for LmdbKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbKvStore")
            .field("path", &self.env.path())
            .field("map_size", &self.map_size)
            .finish()
    }
}

impl LmdbKvStore {
    /// Open (or create) a store under `path` with a quota of `max_size_mb`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the directory cannot be created or
    /// the environment cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&path).map_err(|e| StoreError::Backend {
            reason: format!("create {}: {e}", path.as_ref().display()),
        })?;

        let map_size = max_size_mb.max(1) * 1024 * 1024;
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(backend_err)?;

        let mut wtxn = env.write_txn().map_err(backend_err)?;
        let db: Database<Bytes, Bytes> =
            env.create_database(&mut wtxn, None).map_err(backend_err)?;
        wtxn.commit().map_err(backend_err)?;

        Ok(Self { env, db, map_size })
    }
}

#[async_trait]
impl KvStore for LmdbKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let rtxn = self.env.read_txn().map_err(backend_err)?;
        let value = self
            .db
            .get(&rtxn, key.as_bytes())
            .map_err(backend_err)?
            .map(|bytes| bytes.to_vec());
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| map_heed(key, value.len(), e))?;
        self.db
            .put(&mut wtxn, key.as_bytes(), value)
            .map_err(|e| map_heed(key, value.len(), e))?;
        wtxn.commit().map_err(|e| map_heed(key, value.len(), e))
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(backend_err)?;
        let deleted = self
            .db
            .delete(&mut wtxn, key.as_bytes())
            .map_err(backend_err)?;
        wtxn.commit().map_err(backend_err)?;
        Ok(deleted)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let rtxn = self.env.read_txn().map_err(backend_err)?;
        let prefix = prefix.as_bytes();
        let mut keys = Vec::new();
        for result in self.db.iter(&rtxn).map_err(backend_err)? {
            let Ok((key, _)) = result else { continue };
            if key.starts_with(prefix) {
                if let Ok(key) = std::str::from_utf8(key) {
                    keys.push(key.to_string());
                }
            }
        }
        Ok(keys)
    }

    async fn usage(&self) -> Result<StoreUsage, StoreError> {
        let rtxn = self.env.read_txn().map_err(backend_err)?;
        let mut usage = StoreUsage {
            quota_bytes: Some(self.map_size as u64),
            ..StoreUsage::default()
        };
        for result in self.db.iter(&rtxn).map_err(backend_err)? {
            let Ok((key, value)) = result else { continue };
            usage.entries += 1;
            usage.bytes += (key.len() + value.len()) as u64;
        }
        Ok(usage)
    }
}
