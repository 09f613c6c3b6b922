//! Backend wire shapes.
//!
//! These mirror the JSON the directory service emits. They are converted
//! into entity types by [`crate::convert`] and never held in directory state.

use crate::{
    AssistantCounts, AssistantId, DeploymentId, GraphId, GraphTemplate, PermissionLevel,
    Timestamp, UserId, VersionVector,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Response of `GET /cache-state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStateResponse {
    pub graphs_version: i64,
    pub assistants_version: i64,
    pub schemas_version: i64,
}

impl From<CacheStateResponse> for VersionVector {
    fn from(value: CacheStateResponse) -> Self {
        VersionVector::new(
            value.graphs_version,
            value.assistants_version,
            value.schemas_version,
        )
    }
}

/// Assistant as listed inside `GET /accessible-graphs`.
///
/// Some backends inline `config`/`metadata` in the listing; they are accepted
/// here and dropped by the converters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantWire {
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Response of `GET /accessible-graphs?deploymentId=D`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessibleGraphsResponse {
    #[serde(default)]
    pub valid_graphs: Vec<GraphTemplate>,
    #[serde(default)]
    pub invalid_graphs: Vec<GraphTemplate>,
    #[serde(default)]
    pub assistants: Vec<AssistantWire>,
    #[serde(default)]
    pub assistant_counts: AssistantCounts,
    #[serde(default)]
    pub user_role: Option<String>,
    #[serde(default)]
    pub is_dev_admin: bool,
    pub deployment_id: DeploymentId,
    #[serde(default)]
    pub deployment_name: Option<String>,
    #[serde(default)]
    pub scan_metadata: Option<Value>,
}

/// Response of `GET /assistants/{id}`.
///
/// `config` and `metadata` may arrive either as JSON objects or as JSON
/// encoded into a string; [`crate::convert::decode_structured`] handles both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantDetailWire {
    pub assistant_id: AssistantId,
    #[serde(default)]
    pub graph_id: Option<GraphId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub version: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
}

/// Body of `POST /assistants`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateAssistantRequest {
    pub graph_id: GraphId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_state_into_vector() {
        let state: CacheStateResponse = serde_json::from_str(
            r#"{"graphs_version":1,"assistants_version":5,"schemas_version":1}"#,
        )
        .expect("deserialize");
        let vector = VersionVector::from(state);
        assert_eq!(vector.fingerprint().as_str(), "g1-a5-s1");
    }

    #[test]
    fn test_accessible_graphs_minimal_payload() {
        let response: AccessibleGraphsResponse =
            serde_json::from_str(r#"{"deployment_id":"dep-1"}"#).expect("deserialize");
        assert!(response.valid_graphs.is_empty());
        assert!(response.assistants.is_empty());
        assert!(!response.is_dev_admin);
    }

    #[test]
    fn test_detail_wire_accepts_string_config() {
        let detail: AssistantDetailWire = serde_json::from_str(
            r#"{"assistant_id":"a-1","config":"{\"configurable\":{}}","metadata":null}"#,
        )
        .expect("deserialize");
        assert!(detail.config.is_string());
        assert!(detail.metadata.is_null());
    }
}
