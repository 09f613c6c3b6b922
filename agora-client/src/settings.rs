//! Runtime settings for a [`crate::SyncEngine`].

use std::time::Duration;

use agora_storage::CacheConfig;

use crate::constants::{
    DEFAULT_ASSISTANT_LIST_TTL_SECS, DEFAULT_GRAPH_DISCOVERY_TTL_SECS, DEFAULT_MAX_ENTRY_BYTES,
    DEFAULT_NOTIFICATION_TTL_SECS, DEFAULT_OPTIMISTIC_RETENTION_SECS, DEFAULT_RECONCILE_DELAY_MS,
    DEFAULT_VERSION_POLL_INTERVAL_SECS,
};

/// Tunables for one engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Interval between version polls while logged in.
    pub poll_interval: Duration,
    /// Delay before a provisional insert triggers a forced refresh.
    pub reconcile_delay: Duration,
    /// How long a provisional entry survives fetches that omit it.
    pub optimistic_retention: Duration,
    /// Lifetime of transient notifications.
    pub notification_ttl: Duration,
    /// Cache layer TTLs and limits.
    pub cache: CacheConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_VERSION_POLL_INTERVAL_SECS),
            reconcile_delay: Duration::from_millis(DEFAULT_RECONCILE_DELAY_MS),
            optimistic_retention: Duration::from_secs(DEFAULT_OPTIMISTIC_RETENTION_SECS),
            notification_ttl: Duration::from_secs(DEFAULT_NOTIFICATION_TTL_SECS),
            cache: CacheConfig::new()
                .with_graph_discovery_ttl(Duration::from_secs(DEFAULT_GRAPH_DISCOVERY_TTL_SECS))
                .with_assistant_list_ttl(Duration::from_secs(DEFAULT_ASSISTANT_LIST_TTL_SECS))
                .with_max_entry_bytes(DEFAULT_MAX_ENTRY_BYTES),
        }
    }
}

impl EngineSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_reconcile_delay(mut self, delay: Duration) -> Self {
        self.reconcile_delay = delay;
        self
    }

    pub fn with_optimistic_retention(mut self, retention: Duration) -> Self {
        self.optimistic_retention = retention;
        self
    }

    pub fn with_notification_ttl(mut self, ttl: Duration) -> Self {
        self.notification_ttl = ttl;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }
}
