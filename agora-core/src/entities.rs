//! Core entity structures

use crate::{AssistantId, DeploymentId, GraphId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Permission a user holds on a graph or assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    Owner,
    Admin,
    Editor,
    User,
    Viewer,
    /// Any level this client does not know about yet.
    #[serde(other)]
    Unknown,
}

impl PermissionLevel {
    /// Whether this level allows changing the resource.
    pub fn can_edit(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin | Self::Editor)
    }
}

/// Graph template - the blueprint assistants are instantiated from.
/// Rarely mutated; identified by `graph_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphTemplate {
    pub graph_id: GraphId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub assistants_count: u64,
    #[serde(default)]
    pub user_permission_level: Option<PermissionLevel>,
    #[serde(default)]
    pub schema_accessible: bool,
    #[serde(default)]
    pub needs_initialization: bool,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
}

/// Listing-only projection of an assistant. This is the only assistant shape
/// ever written to the persistent cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantSummary {
    pub assistant_id: AssistantId,
    pub graph_id: GraphId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permission_level: Option<PermissionLevel>,
    #[serde(default)]
    pub owner_id: Option<UserId>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
    #[serde(default)]
    pub allowed_actions: Vec<String>,
}

/// Assistant with its heavy configuration loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct FullAssistant {
    pub summary: AssistantSummary,
    pub config: Map<String, Value>,
    pub metadata: Map<String, Value>,
    pub version: Option<i64>,
}

/// An assistant as held in memory: either the listing projection or the
/// hydrated record. Consumers must match on the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Assistant {
    Lightweight(AssistantSummary),
    Full(FullAssistant),
}

impl Assistant {
    pub fn id(&self) -> &AssistantId {
        &self.summary().assistant_id
    }

    /// Listing fields, present in both representations.
    pub fn summary(&self) -> &AssistantSummary {
        match self {
            Self::Lightweight(summary) => summary,
            Self::Full(full) => &full.summary,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }

    pub fn as_full(&self) -> Option<&FullAssistant> {
        match self {
            Self::Full(full) => Some(full),
            Self::Lightweight(_) => None,
        }
    }
}

impl From<AssistantSummary> for Assistant {
    fn from(summary: AssistantSummary) -> Self {
        Self::Lightweight(summary)
    }
}

impl From<FullAssistant> for Assistant {
    fn from(full: FullAssistant) -> Self {
        Self::Full(full)
    }
}

/// Per-graph assistant counts as reported by the backend.
pub type AssistantCounts = BTreeMap<String, u64>;

/// Graph half of a directory: templates plus the deployment context they
/// were discovered in. Cached in the graph-discovery layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDiscovery {
    pub deployment_id: DeploymentId,
    #[serde(default)]
    pub deployment_name: Option<String>,
    pub valid_graphs: Vec<GraphTemplate>,
    pub invalid_graphs: Vec<GraphTemplate>,
    #[serde(default)]
    pub assistant_counts: AssistantCounts,
    #[serde(default)]
    pub user_role: Option<String>,
    #[serde(default)]
    pub is_dev_admin: bool,
    #[serde(default)]
    pub scan_metadata: Option<Value>,
}

/// Assistant half of a directory, in backend order. Cached in the
/// assistant-list layer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AssistantListing {
    pub assistants: Vec<AssistantSummary>,
}

impl AssistantListing {
    pub fn len(&self) -> usize {
        self.assistants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assistants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str) -> AssistantSummary {
        AssistantSummary {
            assistant_id: AssistantId::new(id),
            graph_id: GraphId::new("g-1"),
            name: format!("Assistant {}", id),
            description: None,
            permission_level: Some(PermissionLevel::Owner),
            owner_id: Some(UserId::new("u-1")),
            tags: vec!["ops".to_string()],
            created_at: None,
            updated_at: None,
            allowed_actions: vec!["chat".to_string()],
        }
    }

    #[test]
    fn test_unknown_permission_level_deserializes() {
        let level: PermissionLevel = serde_json::from_str("\"superuser\"").expect("deserialize");
        assert_eq!(level, PermissionLevel::Unknown);
        let level: PermissionLevel = serde_json::from_str("\"editor\"").expect("deserialize");
        assert!(level.can_edit());
    }

    #[test]
    fn test_assistant_variant_accessors() {
        let light = Assistant::from(summary("a-1"));
        assert!(!light.is_full());
        assert!(light.as_full().is_none());
        assert_eq!(light.id().as_str(), "a-1");

        let full = Assistant::from(FullAssistant {
            summary: summary("a-2"),
            config: Map::new(),
            metadata: Map::new(),
            version: Some(3),
        });
        assert!(full.is_full());
        assert_eq!(full.summary().name, "Assistant a-2");
    }

    #[test]
    fn test_graph_template_defaults() {
        let graph: GraphTemplate =
            serde_json::from_str(r#"{"graph_id":"g-1","name":"Agent"}"#).expect("deserialize");
        assert_eq!(graph.assistants_count, 0);
        assert!(!graph.schema_accessible);
        assert!(graph.user_permission_level.is_none());
    }
}
