//! Pure conversions between wire shapes, listing projections and hydrated
//! assistants. Nothing in here performs I/O.

use crate::{
    AccessibleGraphsResponse, AgoraError, AgoraResult, Assistant, AssistantDetailWire,
    AssistantListing, AssistantSummary, AssistantWire, FullAssistant, GraphDiscovery,
};
use serde_json::{Map, Value};

/// Project a listed assistant onto its lightweight fields.
pub fn summary_from_wire(wire: AssistantWire) -> AssistantSummary {
    AssistantSummary {
        assistant_id: wire.assistant_id,
        graph_id: wire.graph_id,
        name: wire.name,
        description: wire.description,
        permission_level: wire.permission_level,
        owner_id: wire.owner_id,
        tags: wire.tags,
        created_at: wire.created_at,
        updated_at: wire.updated_at,
        allowed_actions: wire.allowed_actions,
    }
}

/// Split a directory response into its two cacheable halves. Assistant order
/// is preserved exactly as the backend returned it.
pub fn split_directory(response: AccessibleGraphsResponse) -> (GraphDiscovery, AssistantListing) {
    let listing = AssistantListing {
        assistants: response
            .assistants
            .into_iter()
            .map(summary_from_wire)
            .collect(),
    };
    let graphs = GraphDiscovery {
        deployment_id: response.deployment_id,
        deployment_name: response.deployment_name,
        valid_graphs: response.valid_graphs,
        invalid_graphs: response.invalid_graphs,
        assistant_counts: response.assistant_counts,
        user_role: response.user_role,
        is_dev_admin: response.is_dev_admin,
        scan_metadata: response.scan_metadata,
    };
    (graphs, listing)
}

/// Decode a structured field that may arrive as an object, as JSON text, or
/// not at all. `null` and empty strings decode to an empty map.
pub fn try_decode_structured(field: &str, value: &Value) -> AgoraResult<Map<String, Value>> {
    match value {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map.clone()),
        Value::String(text) if text.trim().is_empty() => Ok(Map::new()),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(Value::Null) => Ok(Map::new()),
            Ok(other) => Err(AgoraError::Decode {
                field: field.to_string(),
                reason: format!("expected object, got {}", json_kind(&other)),
            }),
            Err(err) => Err(AgoraError::Decode {
                field: field.to_string(),
                reason: err.to_string(),
            }),
        },
        other => Err(AgoraError::Decode {
            field: field.to_string(),
            reason: format!("expected object, got {}", json_kind(other)),
        }),
    }
}

/// Lenient variant of [`try_decode_structured`]: failures become an empty map.
pub fn decode_structured(field: &str, value: &Value) -> Map<String, Value> {
    try_decode_structured(field, value).unwrap_or_default()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Outcome of merging a detail fetch onto a lightweight record.
#[derive(Debug, Clone, PartialEq)]
pub struct Hydrated {
    pub assistant: FullAssistant,
    /// Structured fields that could not be decoded and were emptied.
    pub degraded: Vec<AgoraError>,
}

/// Merge a detail fetch onto the lightweight copy. Identity, permissions and
/// tags always come from `summary`; the detail only supplies `config`,
/// `metadata` and `version`.
pub fn hydrate_summary(summary: AssistantSummary, detail: &AssistantDetailWire) -> Hydrated {
    let mut degraded = Vec::new();
    let config = try_decode_structured("config", &detail.config).unwrap_or_else(|err| {
        degraded.push(err);
        Map::new()
    });
    let metadata = try_decode_structured("metadata", &detail.metadata).unwrap_or_else(|err| {
        degraded.push(err);
        Map::new()
    });
    Hydrated {
        assistant: FullAssistant {
            summary,
            config,
            metadata,
            version: detail.version,
        },
        degraded,
    }
}

/// Reconcile an in-memory assistant with a freshly listed summary.
///
/// A hydrated record keeps its heavy fields unless the listing reports a
/// newer `updated_at`, in which case the heavy fields are known stale and the
/// record falls back to the listing projection.
pub fn refresh_listing(existing: &Assistant, fresh: AssistantSummary) -> Assistant {
    match existing {
        Assistant::Full(full) if !is_newer(&fresh, &full.summary) => Assistant::Full(FullAssistant {
            summary: fresh,
            config: full.config.clone(),
            metadata: full.metadata.clone(),
            version: full.version,
        }),
        _ => Assistant::Lightweight(fresh),
    }
}

fn is_newer(fresh: &AssistantSummary, held: &AssistantSummary) -> bool {
    match (fresh.updated_at, held.updated_at) {
        (Some(fresh), Some(held)) => fresh > held,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AssistantId, DeploymentId, GraphId, PermissionLevel, UserId};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn wire(id: &str) -> AssistantWire {
        AssistantWire {
            assistant_id: AssistantId::new(id),
            graph_id: GraphId::new("g-1"),
            name: format!("Assistant {}", id),
            description: None,
            permission_level: Some(PermissionLevel::Editor),
            owner_id: Some(UserId::new("owner")),
            tags: vec!["t".to_string()],
            created_at: None,
            updated_at: None,
            allowed_actions: vec![],
            config: Some(json!({"heavy": true})),
            metadata: None,
        }
    }

    fn detail(config: Value, metadata: Value) -> AssistantDetailWire {
        AssistantDetailWire {
            assistant_id: AssistantId::new("a-1"),
            graph_id: Some(GraphId::new("other-graph")),
            name: Some("Renamed".to_string()),
            config,
            metadata,
            version: Some(7),
            updated_at: None,
        }
    }

    #[test]
    fn test_split_directory_preserves_order() {
        let response = AccessibleGraphsResponse {
            valid_graphs: vec![],
            invalid_graphs: vec![],
            assistants: vec![wire("c"), wire("a"), wire("b")],
            assistant_counts: Default::default(),
            user_role: Some("admin".to_string()),
            is_dev_admin: true,
            deployment_id: DeploymentId::new("dep"),
            deployment_name: None,
            scan_metadata: None,
        };
        let (graphs, listing) = split_directory(response);
        let ids: Vec<&str> = listing
            .assistants
            .iter()
            .map(|a| a.assistant_id.as_str())
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert!(graphs.is_dev_admin);
        assert_eq!(graphs.user_role.as_deref(), Some("admin"));
    }

    #[test]
    fn test_decode_structured_variants() {
        assert!(decode_structured("config", &Value::Null).is_empty());
        assert_eq!(
            decode_structured("config", &json!({"a": 1})).get("a"),
            Some(&json!(1))
        );
        assert_eq!(
            decode_structured("config", &json!("{\"a\": 2}")).get("a"),
            Some(&json!(2))
        );
        assert!(decode_structured("config", &json!("")).is_empty());
    }

    #[test]
    fn test_decode_failure_degrades_to_empty() {
        assert!(try_decode_structured("metadata", &json!("{not json")).is_err());
        assert!(decode_structured("metadata", &json!("{not json")).is_empty());
        assert!(try_decode_structured("metadata", &json!([1, 2])).is_err());
        assert!(try_decode_structured("metadata", &json!("[1, 2]")).is_err());
    }

    #[test]
    fn test_hydrate_keeps_lightweight_identity() {
        let summary = summary_from_wire(wire("a-1"));
        let hydrated = hydrate_summary(
            summary.clone(),
            &detail(json!("{\"configurable\":{\"model\":\"x\"}}"), json!({"k": "v"})),
        );
        assert!(hydrated.degraded.is_empty());
        assert_eq!(hydrated.assistant.summary, summary);
        assert_eq!(hydrated.assistant.version, Some(7));
        assert!(hydrated.assistant.config.contains_key("configurable"));
        assert_eq!(hydrated.assistant.metadata.get("k"), Some(&json!("v")));
    }

    #[test]
    fn test_hydrate_reports_degraded_fields() {
        let summary = summary_from_wire(wire("a-1"));
        let hydrated = hydrate_summary(summary, &detail(json!("{oops"), json!(42)));
        assert_eq!(hydrated.degraded.len(), 2);
        assert!(hydrated.assistant.config.is_empty());
        assert!(hydrated.assistant.metadata.is_empty());
    }

    #[test]
    fn test_refresh_listing_keeps_full_unless_newer() {
        let t1 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single();
        let t2 = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).single();
        let mut summary = summary_from_wire(wire("a-1"));
        summary.updated_at = t1;
        let full = Assistant::Full(FullAssistant {
            summary: summary.clone(),
            config: Map::new(),
            metadata: Map::new(),
            version: Some(1),
        });

        let mut same = summary.clone();
        same.name = "Renamed".to_string();
        let kept = refresh_listing(&full, same);
        assert!(kept.is_full());
        assert_eq!(kept.summary().name, "Renamed");

        let mut newer = summary;
        newer.updated_at = t2;
        assert!(!refresh_listing(&full, newer).is_full());
    }
}
