//! Cache layers and user-scoped cache keys.
//!
//! A `CacheKey` can only be built from a layer and a user id, so every key
//! the cache touches is namespaced `"{layer}:{userId}"`.

use std::fmt;
use std::time::Duration;

use agora_core::UserId;

/// Separator between the layer prefix and the user id.
const SEPARATOR: char = ':';

/// One independently cached slice of the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheLayer {
    /// Graph templates, counts and deployment info.
    GraphDiscovery,
    /// Lightweight assistant records.
    AssistantList,
}

impl CacheLayer {
    pub const ALL: [CacheLayer; 2] = [CacheLayer::GraphDiscovery, CacheLayer::AssistantList];

    /// Key prefix, without the separator.
    pub fn name(self) -> &'static str {
        match self {
            CacheLayer::GraphDiscovery => "graph-discovery",
            CacheLayer::AssistantList => "assistant-list",
        }
    }

    /// Prefix covering this layer for every user.
    pub fn prefix(self) -> String {
        format!("{}{SEPARATOR}", self.name())
    }

    /// Default time-to-live of entries in this layer.
    pub fn default_ttl(self) -> Duration {
        match self {
            CacheLayer::GraphDiscovery => Duration::from_secs(2 * 60 * 60),
            CacheLayer::AssistantList => Duration::from_secs(30 * 60),
        }
    }

    /// Layers evicted, across all users, when the store reports it is full.
    pub fn eviction_order() -> [CacheLayer; 1] {
        [CacheLayer::GraphDiscovery]
    }
}

impl fmt::Display for CacheLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A store key scoped to one layer and one user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    layer: CacheLayer,
    user_id: UserId,
    encoded: String,
}

impl CacheKey {
    pub fn new(layer: CacheLayer, user_id: &UserId) -> Self {
        Self {
            layer,
            user_id: user_id.clone(),
            encoded: format!("{}{SEPARATOR}{}", layer.name(), user_id.as_str()),
        }
    }

    pub fn layer(&self) -> CacheLayer {
        self.layer
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    /// Parse a raw store key back into a `CacheKey`.
    ///
    /// Returns `None` for keys outside the known layers or with an empty
    /// user id.
    pub fn parse(raw: &str) -> Option<Self> {
        let (prefix, user) = raw.split_once(SEPARATOR)?;
        if user.is_empty() {
            return None;
        }
        let layer = CacheLayer::ALL
            .into_iter()
            .find(|layer| layer.name() == prefix)?;
        Some(Self::new(layer, &UserId::new(user)))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}
