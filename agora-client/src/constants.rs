//! Constants for the AGORA sync engine
//!
//! Defaults used by [`crate::settings::EngineSettings`] and the example
//! configuration. Centralized so tests and documentation agree.

// ============================================================================
// VERSION POLLING
// ============================================================================

/// Interval between `/cache-state` polls while a session is active.
pub const DEFAULT_VERSION_POLL_INTERVAL_SECS: u64 = 30;

// ============================================================================
// CACHE LAYERS
// ============================================================================

/// TTL of the graph-discovery layer (2 hours).
pub const DEFAULT_GRAPH_DISCOVERY_TTL_SECS: u64 = 7_200;

/// TTL of the assistant-list layer (30 minutes).
pub const DEFAULT_ASSISTANT_LIST_TTL_SECS: u64 = 1_800;

/// Maximum serialized size of one cache entry (2 MiB).
pub const DEFAULT_MAX_ENTRY_BYTES: usize = agora_storage::DEFAULT_MAX_ENTRY_BYTES;

/// LMDB map size used by the CLI store.
pub const DEFAULT_STORE_MAX_SIZE_MB: usize = 10;

// ============================================================================
// OPTIMISTIC MUTATIONS
// ============================================================================

/// Delay before a provisional insert is reconciled against the backend.
pub const DEFAULT_RECONCILE_DELAY_MS: u64 = 3_000;

/// How long a provisional entry survives fetches that do not include it.
pub const DEFAULT_OPTIMISTIC_RETENTION_SECS: u64 = 60;

// ============================================================================
// NOTIFICATIONS / TRANSPORT
// ============================================================================

/// Lifetime of a transient notification.
pub const DEFAULT_NOTIFICATION_TTL_SECS: u64 = 8;

/// HTTP request timeout applied by the REST client.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_ttls_match_storage_defaults() {
        use agora_storage::CacheLayer;
        assert_eq!(
            CacheLayer::GraphDiscovery.default_ttl().as_secs(),
            DEFAULT_GRAPH_DISCOVERY_TTL_SECS
        );
        assert_eq!(
            CacheLayer::AssistantList.default_ttl().as_secs(),
            DEFAULT_ASSISTANT_LIST_TTL_SECS
        );
    }
}
