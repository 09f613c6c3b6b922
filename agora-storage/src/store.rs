//! Versioned, TTL-bounded directory cache over a [`KvStore`].
//!
//! Reads never fail: anything that is not a valid entry for the requesting
//! user and current fingerprint is deleted and reported as a miss. Writes
//! recover from a full store by evicting the graph-discovery layer for all
//! users and retrying once.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use agora_core::{Clock, Fingerprint, StoreError, UserId};
use serde::de::IgnoredAny;
use tracing::{debug, info, warn};

use crate::entry::{CacheEntry, CacheRead, Validity};
use crate::kv::{KvStore, StoreUsage};
use crate::layer::{CacheKey, CacheLayer};
use crate::payload::{CacheStats, CacheablePayload};

/// Default ceiling for one serialized entry.
pub const DEFAULT_MAX_ENTRY_BYTES: usize = 2 * 1024 * 1024;

/// Configuration for the directory cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// TTL of graph-discovery entries.
    pub graph_discovery_ttl: Duration,
    /// TTL of assistant-list entries.
    pub assistant_list_ttl: Duration,
    /// When false the assistant-list layer is neither read nor written.
    pub assistant_layer_enabled: bool,
    /// Serialized entries above this size are rejected before writing.
    pub max_entry_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            graph_discovery_ttl: CacheLayer::GraphDiscovery.default_ttl(),
            assistant_list_ttl: CacheLayer::AssistantList.default_ttl(),
            assistant_layer_enabled: true,
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_graph_discovery_ttl(mut self, ttl: Duration) -> Self {
        self.graph_discovery_ttl = ttl;
        self
    }

    pub fn with_assistant_list_ttl(mut self, ttl: Duration) -> Self {
        self.assistant_list_ttl = ttl;
        self
    }

    pub fn with_assistant_layer(mut self, enabled: bool) -> Self {
        self.assistant_layer_enabled = enabled;
        self
    }

    pub fn with_max_entry_bytes(mut self, max: usize) -> Self {
        self.max_entry_bytes = max;
        self
    }

    pub fn ttl(&self, layer: CacheLayer) -> Duration {
        match layer {
            CacheLayer::GraphDiscovery => self.graph_discovery_ttl,
            CacheLayer::AssistantList => self.assistant_list_ttl,
        }
    }

    pub fn layer_enabled(&self, layer: CacheLayer) -> bool {
        match layer {
            CacheLayer::GraphDiscovery => true,
            CacheLayer::AssistantList => self.assistant_layer_enabled,
        }
    }
}

/// Result of a cache write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Written on the first attempt.
    Stored { bytes: usize },
    /// Written after the store reported it was full and a layer was evicted.
    StoredAfterEviction { bytes: usize, evicted: u64 },
    /// Not written; the reason has already been logged.
    Dropped { reason: String },
    /// The target layer is disabled by configuration.
    Disabled,
}

impl WriteOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(
            self,
            WriteOutcome::Stored { .. } | WriteOutcome::StoredAfterEviction { .. }
        )
    }
}

/// Typed cache over a shared key-value store.
pub struct CacheStore {
    kv: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    stats: Mutex<CacheStats>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl CacheStore {
    pub fn new(kv: Arc<dyn KvStore>, clock: Arc<dyn Clock>, config: CacheConfig) -> Self {
        Self {
            kv,
            clock,
            config,
            stats: Mutex::new(CacheStats::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
            .lock()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }

    pub async fn usage(&self) -> Result<StoreUsage, StoreError> {
        self.kv.usage().await
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            update(&mut stats);
        }
    }

    /// Read the `T` layer for `user_id`, valid under `expected`.
    ///
    /// Expired, mismatched, foreign and undecodable entries are deleted and
    /// reported as `None`. Store errors are logged and also read as `None`.
    pub async fn get<T: CacheablePayload>(
        &self,
        user_id: &UserId,
        expected: &Fingerprint,
    ) -> Option<CacheRead<T>> {
        let layer = T::LAYER;
        if !self.config.layer_enabled(layer) {
            self.record(|s| s.misses += 1);
            return None;
        }

        let key = CacheKey::new(layer, user_id);
        let raw = match self.kv.get(key.as_str()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key = %key, "cache miss: absent");
                self.record(|s| s.misses += 1);
                return None;
            }
            Err(err) => {
                warn!(key = %key, error = %err, "cache read failed, treating as miss");
                self.record(|s| s.misses += 1);
                return None;
            }
        };

        let entry: CacheEntry<T> = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(key = %key, error = %err, "undecodable cache entry, deleting");
                self.discard(&key).await;
                return None;
            }
        };

        let validity = entry.validate(
            self.clock.now_millis(),
            self.config.ttl(layer),
            expected,
            user_id,
        );
        match validity {
            Validity::Valid => {
                debug!(key = %key, fingerprint = %expected, "cache hit");
                self.record(|s| s.hits += 1);
                Some(CacheRead::from_entry(entry))
            }
            invalid => {
                debug!(
                    key = %key,
                    reason = invalid.reason(),
                    stored = %entry.fingerprint,
                    expected = %expected,
                    "cache entry invalid, deleting"
                );
                self.discard(&key).await;
                None
            }
        }
    }

    async fn discard(&self, key: &CacheKey) {
        if let Err(err) = self.kv.delete(key.as_str()).await {
            warn!(key = %key, error = %err, "failed to delete invalid cache entry");
        }
        self.record(|s| {
            s.misses += 1;
            s.invalidated_on_read += 1;
        });
    }

    /// Write `value` for `user_id` stamped with `fingerprint` and now.
    ///
    /// # Errors
    ///
    /// [`StoreError::PayloadTooLarge`] when the serialized entry exceeds
    /// `max_entry_bytes`, [`StoreError::Serialization`] if encoding fails, and
    /// non-quota store errors. A full store never produces an error.
    pub async fn set<T: CacheablePayload>(
        &self,
        user_id: &UserId,
        value: &T,
        fingerprint: &Fingerprint,
    ) -> Result<WriteOutcome, StoreError> {
        let layer = T::LAYER;
        if !self.config.layer_enabled(layer) {
            return Ok(WriteOutcome::Disabled);
        }

        let key = CacheKey::new(layer, user_id);
        let entry = CacheEntry::new(
            value,
            self.clock.now_millis(),
            user_id.clone(),
            fingerprint.clone(),
        );
        let bytes = serde_json::to_vec(&entry).map_err(|e| StoreError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        if bytes.len() > self.config.max_entry_bytes {
            return Err(StoreError::PayloadTooLarge {
                key: key.to_string(),
                bytes: bytes.len(),
                limit: self.config.max_entry_bytes,
            });
        }

        match self.kv.set(key.as_str(), &bytes).await {
            Ok(()) => {
                debug!(key = %key, bytes = bytes.len(), fingerprint = %fingerprint, "cache write");
                self.record(|s| s.writes += 1);
                return Ok(WriteOutcome::Stored { bytes: bytes.len() });
            }
            Err(err) if err.is_quota() => {
                self.record(|s| s.quota_failures += 1);
                warn!(key = %key, bytes = bytes.len(), "store full, evicting before retry");
            }
            Err(err) => return Err(err),
        }

        let mut evicted = 0;
        for victim in CacheLayer::eviction_order() {
            evicted += self.evict_layer(victim).await;
        }

        match self.kv.set(key.as_str(), &bytes).await {
            Ok(()) => {
                info!(key = %key, bytes = bytes.len(), evicted, "cache write succeeded after eviction");
                self.record(|s| s.writes += 1);
                Ok(WriteOutcome::StoredAfterEviction {
                    bytes: bytes.len(),
                    evicted,
                })
            }
            Err(err) => {
                warn!(key = %key, bytes = bytes.len(), error = %err, "cache write dropped after eviction retry");
                self.record(|s| {
                    if err.is_quota() {
                        s.quota_failures += 1;
                    }
                    s.dropped_writes += 1;
                });
                Ok(WriteOutcome::Dropped {
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Delete one layer for one user. Returns true if an entry was removed.
    pub async fn invalidate(&self, layer: CacheLayer, user_id: &UserId) -> bool {
        let key = CacheKey::new(layer, user_id);
        match self.kv.delete(key.as_str()).await {
            Ok(removed) => {
                debug!(key = %key, removed, "cache invalidated");
                removed
            }
            Err(err) => {
                warn!(key = %key, error = %err, "cache invalidation failed");
                false
            }
        }
    }

    /// Delete every layer for one user.
    pub async fn invalidate_user(&self, user_id: &UserId) -> u64 {
        let mut removed = 0;
        for layer in CacheLayer::ALL {
            if self.invalidate(layer, user_id).await {
                removed += 1;
            }
        }
        removed
    }

    /// Delete `layer` for every user. Returns the number of removed entries.
    pub async fn evict_layer(&self, layer: CacheLayer) -> u64 {
        let keys = match self.kv.keys_with_prefix(&layer.prefix()).await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(layer = %layer, error = %err, "failed to list keys for eviction");
                return 0;
            }
        };

        let mut evicted = 0;
        for key in keys {
            match self.kv.delete(&key).await {
                Ok(true) => evicted += 1,
                Ok(false) => {}
                Err(err) => warn!(key = %key, error = %err, "eviction delete failed"),
            }
        }
        self.record(|s| s.evictions += evicted);
        info!(layer = %layer, evicted, "cache layer evicted");
        evicted
    }

    /// Delete the user's entries that are expired or no longer match
    /// `current`. Returns the number of removed entries.
    pub async fn sweep(&self, user_id: &UserId, current: &Fingerprint) -> u64 {
        let now_ms = self.clock.now_millis();
        let mut removed = 0;
        for layer in CacheLayer::ALL {
            let key = CacheKey::new(layer, user_id);
            let raw = match self.kv.get(key.as_str()).await {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(err) => {
                    warn!(key = %key, error = %err, "sweep read failed");
                    continue;
                }
            };
            let stale = match serde_json::from_slice::<CacheEntry<IgnoredAny>>(&raw) {
                Ok(entry) => !entry
                    .validate(now_ms, self.config.ttl(layer), current, user_id)
                    .is_valid(),
                Err(_) => true,
            };
            if stale && self.invalidate(layer, user_id).await {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(user_id = %user_id, fingerprint = %current, removed, "swept stale cache entries");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryKvStore;
    use agora_core::{
        AssistantId, AssistantListing, AssistantSummary, DeploymentId, GraphDiscovery, GraphId,
        ManualClock, VersionVector,
    };

    fn listing(n: usize) -> AssistantListing {
        AssistantListing {
            assistants: (0..n)
                .map(|i| AssistantSummary {
                    assistant_id: AssistantId::new(format!("a{i}")),
                    graph_id: GraphId::new("g"),
                    name: format!("Assistant {i}"),
                    description: None,
                    permission_level: None,
                    owner_id: None,
                    tags: Vec::new(),
                    created_at: None,
                    updated_at: None,
                    allowed_actions: Vec::new(),
                })
                .collect(),
        }
    }

    fn discovery() -> GraphDiscovery {
        GraphDiscovery {
            deployment_id: DeploymentId::new("dep"),
            deployment_name: None,
            valid_graphs: Vec::new(),
            invalid_graphs: Vec::new(),
            assistant_counts: Default::default(),
            user_role: None,
            is_dev_admin: false,
            scan_metadata: None,
        }
    }

    fn store_with(kv: InMemoryKvStore, config: CacheConfig) -> (CacheStore, ManualClock) {
        let clock = ManualClock::starting_now();
        let store = CacheStore::new(Arc::new(kv), Arc::new(clock.clone()), config);
        (store, clock)
    }

    #[tokio::test]
    async fn test_set_then_get_hits() {
        let (store, _clock) = store_with(InMemoryKvStore::new(), CacheConfig::default());
        let user = UserId::new("u1");
        let fp = VersionVector::new(1, 5, 1).fingerprint();

        let outcome = store.set(&user, &listing(2), &fp).await.expect("set");
        assert!(outcome.is_stored());

        let read = store
            .get::<AssistantListing>(&user, &fp)
            .await
            .expect("should hit");
        assert_eq!(read.value().len(), 2);
        assert_eq!(store.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_fingerprint_mismatch_deletes_entry() {
        let kv = InMemoryKvStore::new();
        let (store, _clock) = store_with(kv.clone(), CacheConfig::default());
        let user = UserId::new("u1");
        let old = VersionVector::new(1, 5, 1).fingerprint();
        let new = VersionVector::new(1, 6, 1).fingerprint();

        store.set(&user, &listing(1), &old).await.expect("set");
        assert!(store.get::<AssistantListing>(&user, &new).await.is_none());
        assert!(kv.raw("assistant-list:u1").is_none());
        assert_eq!(store.stats().invalidated_on_read, 1);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_miss_and_deleted() {
        let kv = InMemoryKvStore::new();
        kv.insert_raw("graph-discovery:u1", b"{not json".to_vec());
        let (store, _clock) = store_with(kv.clone(), CacheConfig::default());

        let fp = Fingerprint::unversioned();
        assert!(store
            .get::<GraphDiscovery>(&UserId::new("u1"), &fp)
            .await
            .is_none());
        assert!(kv.raw("graph-discovery:u1").is_none());
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected_before_write() {
        let kv = InMemoryKvStore::new();
        let (store, _clock) = store_with(kv.clone(), CacheConfig::new().with_max_entry_bytes(64));
        let err = store
            .set(&UserId::new("u1"), &listing(10), &Fingerprint::unversioned())
            .await
            .expect_err("should reject");
        assert!(matches!(err, StoreError::PayloadTooLarge { limit: 64, .. }));
        assert!(kv.raw("assistant-list:u1").is_none());
    }

    #[tokio::test]
    async fn test_quota_evicts_graph_discovery_then_retries() {
        let kv = InMemoryKvStore::new();
        let (seed, _clock) = store_with(kv.clone(), CacheConfig::default());
        let fp = Fingerprint::unversioned();
        seed.set(&UserId::new("other"), &discovery(), &fp)
            .await
            .expect("seed");
        let used = kv.usage().await.expect("usage").bytes;

        let sizing = InMemoryKvStore::new();
        let (measure, _clock) = store_with(sizing.clone(), CacheConfig::default());
        measure
            .set(&UserId::new("u1"), &listing(2), &fp)
            .await
            .expect("sizing write");
        let listing_bytes = sizing.usage().await.expect("usage").bytes;

        // The listing fits only once the discovery entry is gone.
        let limited = InMemoryKvStore::with_quota(used + listing_bytes - 1);
        for key in kv.keys_with_prefix("").await.expect("keys") {
            limited.insert_raw(&key, kv.raw(&key).unwrap_or_default());
        }
        let (store, _clock) = store_with(limited.clone(), CacheConfig::default());

        let outcome = store
            .set(&UserId::new("u1"), &listing(2), &fp)
            .await
            .expect("quota never errors");
        assert!(
            matches!(outcome, WriteOutcome::StoredAfterEviction { evicted: 1, .. }),
            "got {outcome:?}"
        );
        assert!(limited.raw("graph-discovery:other").is_none());
        assert!(limited.raw("assistant-list:u1").is_some());
        assert_eq!(store.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_quota_retry_failure_drops_write() {
        let kv = InMemoryKvStore::with_quota(32);
        let (store, _clock) = store_with(kv.clone(), CacheConfig::default());
        let outcome = store
            .set(&UserId::new("u1"), &listing(3), &Fingerprint::unversioned())
            .await
            .expect("quota never errors");
        assert!(matches!(outcome, WriteOutcome::Dropped { .. }));
        assert_eq!(store.stats().dropped_writes, 1);
        assert_eq!(kv.rejected_writes(), 2);
    }

    #[tokio::test]
    async fn test_disabled_assistant_layer() {
        let kv = InMemoryKvStore::new();
        let (store, _clock) = store_with(kv.clone(), CacheConfig::new().with_assistant_layer(false));
        let user = UserId::new("u1");
        let fp = Fingerprint::unversioned();
        assert_eq!(
            store.set(&user, &listing(1), &fp).await.expect("set"),
            WriteOutcome::Disabled
        );
        assert!(kv.raw("assistant-list:u1").is_none());
        assert!(store.get::<AssistantListing>(&user, &fp).await.is_none());
    }

    #[tokio::test]
    async fn test_ttl_expiry_at_boundary() {
        let (store, clock) = store_with(InMemoryKvStore::new(), CacheConfig::default());
        let user = UserId::new("u1");
        let fp = VersionVector::new(1, 5, 1).fingerprint();
        store.set(&user, &listing(1), &fp).await.expect("set");

        clock.advance(CacheLayer::AssistantList.default_ttl());
        assert!(store.get::<AssistantListing>(&user, &fp).await.is_some());

        clock.advance(Duration::from_millis(1));
        assert!(store.get::<AssistantListing>(&user, &fp).await.is_none());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_stale_entries() {
        let kv = InMemoryKvStore::new();
        let (store, _clock) = store_with(kv.clone(), CacheConfig::default());
        let user = UserId::new("u1");
        let old = VersionVector::new(1, 5, 1).fingerprint();
        let new = VersionVector::new(1, 6, 1).fingerprint();

        store.set(&user, &discovery(), &new).await.expect("set");
        store.set(&user, &listing(1), &old).await.expect("set");

        assert_eq!(store.sweep(&user, &new).await, 1);
        assert!(kv.raw("graph-discovery:u1").is_some());
        assert!(kv.raw("assistant-list:u1").is_none());
    }

    #[tokio::test]
    async fn test_invalidate_user_removes_both_layers() {
        let kv = InMemoryKvStore::new();
        let (store, _clock) = store_with(kv.clone(), CacheConfig::default());
        let user = UserId::new("u1");
        let fp = Fingerprint::unversioned();
        store.set(&user, &discovery(), &fp).await.expect("set");
        store.set(&user, &listing(1), &fp).await.expect("set");
        store
            .set(&UserId::new("u2"), &listing(1), &fp)
            .await
            .expect("set");

        assert_eq!(store.invalidate_user(&user).await, 2);
        assert!(kv.raw("assistant-list:u2").is_some());
    }
}
