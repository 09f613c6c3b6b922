//! Cacheable payload marker and cache statistics.

use agora_core::{AssistantListing, GraphDiscovery};
use serde::{de::DeserializeOwned, Serialize};

use crate::layer::CacheLayer;

/// Marker trait for directory slices that can be cached.
///
/// Each payload type lives in exactly one [`CacheLayer`], which fixes its key
/// prefix and TTL.
pub trait CacheablePayload: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const LAYER: CacheLayer;
}

impl CacheablePayload for GraphDiscovery {
    const LAYER: CacheLayer = CacheLayer::GraphDiscovery;
}

impl CacheablePayload for AssistantListing {
    const LAYER: CacheLayer = CacheLayer::AssistantList;
}

/// Counters kept by a `CacheStore` since it was created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Valid entries returned.
    pub hits: u64,
    /// Reads that found nothing usable, including invalidated entries.
    pub misses: u64,
    /// Entries deleted on read for TTL, fingerprint, owner or decode failure.
    pub invalidated_on_read: u64,
    /// Successful writes.
    pub writes: u64,
    /// Entries removed to free space.
    pub evictions: u64,
    /// Writes refused by the store for lack of space.
    pub quota_failures: u64,
    /// Writes abandoned after the eviction retry also failed.
    pub dropped_writes: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < 0.001);
        assert!(CacheStats::default().hit_rate().abs() < 0.001);
    }

    #[test]
    fn test_payload_layers() {
        assert_eq!(GraphDiscovery::LAYER, CacheLayer::GraphDiscovery);
        assert_eq!(AssistantListing::LAYER, CacheLayer::AssistantList);
    }
}
