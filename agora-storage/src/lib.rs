//! AGORA Storage - Persistent Stores and Directory Cache
//!
//! A [`KvStore`] is the byte-level store shared by every engine instance of
//! one profile. [`CacheStore`] layers typed, fingerprint-checked and
//! TTL-bounded entries on top of it.

pub mod entry;
pub mod kv;
pub mod layer;
pub mod lmdb;
pub mod memory;
pub mod payload;
pub mod store;

pub use entry::{CacheEntry, CacheRead, Validity};
pub use kv::{KvStore, StoreUsage};
pub use layer::{CacheKey, CacheLayer};
pub use lmdb::LmdbKvStore;
pub use memory::InMemoryKvStore;
pub use payload::{CacheStats, CacheablePayload};
pub use store::{CacheConfig, CacheStore, WriteOutcome, DEFAULT_MAX_ENTRY_BYTES};
