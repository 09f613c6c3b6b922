//! AGORA Test Utilities
//!
//! Centralized test infrastructure for the AGORA workspace:
//! - A scripted in-process directory backend with call counters
//! - Proptest generators for entity types
//! - Test fixtures for common directory scenarios
//! - Custom assertions for AGORA error variants

// Re-export the in-memory pieces tests wire together most often
pub use agora_core::{Clock, ManualClock};
pub use agora_storage::InMemoryKvStore;

pub use agora_core::{
    AccessibleGraphsResponse, AgoraError, AgoraResult, AssistantDetailWire, AssistantId,
    AssistantListing, AssistantSummary, AssistantWire, BearerToken, CacheStateResponse,
    CreateAssistantRequest, DeploymentId, DirectoryBackend, EntityClass, GraphDiscovery, GraphId,
    GraphTemplate, NetworkError, PermissionLevel, Timestamp, UserId, VersionVector,
};

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

// ============================================================================
// FAKE DIRECTORY BACKEND
// ============================================================================

/// Which backend call a failure switch applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeCall {
    CacheState,
    Directory,
    Assistant,
    Create,
}

impl FakeCall {
    fn endpoint(self) -> &'static str {
        match self {
            FakeCall::CacheState => "/cache-state",
            FakeCall::Directory => "/accessible-graphs",
            FakeCall::Assistant => "/assistants/{id}",
            FakeCall::Create => "/assistants",
        }
    }
}

#[derive(Debug)]
struct PendingAssistant {
    wire: AssistantWire,
    hidden_fetches: u32,
}

#[derive(Debug)]
struct FakeState {
    versions: VersionVector,
    deployment_id: DeploymentId,
    deployment_name: Option<String>,
    valid_graphs: Vec<GraphTemplate>,
    invalid_graphs: Vec<GraphTemplate>,
    assistants: Vec<AssistantWire>,
    pending: Vec<PendingAssistant>,
    details: HashMap<AssistantId, AssistantDetailWire>,
    failing: HashMap<FakeCall, u16>,
    replication_lag: u32,
    next_id: u64,
}

/// Scripted in-process directory service.
///
/// Holds the versions, graphs and assistants a real backend would serve, and
/// counts every call. Failure switches make a call return HTTP errors until
/// cleared. With a replication lag of `n`, a created assistant is missing
/// from the next `n` directory responses.
#[derive(Debug)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
    cache_state_calls: AtomicUsize,
    directory_calls: AtomicUsize,
    assistant_calls: AtomicUsize,
    create_calls: AtomicUsize,
}

impl FakeBackend {
    /// Empty directory for `deployment_id` at versions `{0,0,0}`.
    pub fn new(deployment_id: impl Into<DeploymentId>) -> Self {
        Self {
            state: Mutex::new(FakeState {
                versions: VersionVector::default(),
                deployment_id: deployment_id.into(),
                deployment_name: None,
                valid_graphs: Vec::new(),
                invalid_graphs: Vec::new(),
                assistants: Vec::new(),
                pending: Vec::new(),
                details: HashMap::new(),
                failing: HashMap::new(),
                replication_lag: 0,
                next_id: 1,
            }),
            cache_state_calls: AtomicUsize::new(0),
            directory_calls: AtomicUsize::new(0),
            assistant_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_versions(&self, versions: VersionVector) {
        self.state().versions = versions;
    }

    pub fn versions(&self) -> VersionVector {
        self.state().versions
    }

    /// Increment one version counter, as a backend mutation would.
    pub fn bump(&self, class: EntityClass) {
        let mut state = self.state();
        match class {
            EntityClass::Graphs => state.versions.graphs += 1,
            EntityClass::Assistants => state.versions.assistants += 1,
            EntityClass::Schemas => state.versions.schemas += 1,
        }
    }

    pub fn set_deployment_name(&self, name: impl Into<String>) {
        self.state().deployment_name = Some(name.into());
    }

    pub fn add_graph(&self, graph: GraphTemplate) {
        self.state().valid_graphs.push(graph);
    }

    pub fn add_invalid_graph(&self, graph: GraphTemplate) {
        self.state().invalid_graphs.push(graph);
    }

    /// Append an assistant to the listing without touching versions.
    pub fn add_assistant(&self, wire: AssistantWire) {
        self.state().assistants.push(wire);
    }

    pub fn remove_assistant(&self, assistant_id: &AssistantId) {
        self.state()
            .assistants
            .retain(|wire| &wire.assistant_id != assistant_id);
    }

    /// Register the single-entity response for `detail.assistant_id`.
    pub fn set_detail(&self, detail: AssistantDetailWire) {
        self.state()
            .details
            .insert(detail.assistant_id.clone(), detail);
    }

    pub fn set_replication_lag(&self, fetches: u32) {
        self.state().replication_lag = fetches;
    }

    /// Make `call` fail with HTTP `status` until [`FakeBackend::recover`].
    pub fn fail(&self, call: FakeCall, status: u16) {
        self.state().failing.insert(call, status);
    }

    pub fn recover(&self, call: FakeCall) {
        self.state().failing.remove(&call);
    }

    pub fn cache_state_calls(&self) -> usize {
        self.cache_state_calls.load(Ordering::SeqCst)
    }

    pub fn directory_calls(&self) -> usize {
        self.directory_calls.load(Ordering::SeqCst)
    }

    pub fn assistant_calls(&self) -> usize {
        self.assistant_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    fn check(&self, call: FakeCall, credential: &BearerToken) -> Result<(), NetworkError> {
        if credential.is_empty() {
            return Err(NetworkError::Status {
                endpoint: call.endpoint().to_string(),
                status: 401,
                message: "missing bearer token".to_string(),
            });
        }
        match self.state().failing.get(&call) {
            Some(status) => Err(NetworkError::Status {
                endpoint: call.endpoint().to_string(),
                status: *status,
                message: "scripted failure".to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DirectoryBackend for FakeBackend {
    async fn fetch_cache_state(
        &self,
        credential: &BearerToken,
    ) -> Result<CacheStateResponse, NetworkError> {
        self.cache_state_calls.fetch_add(1, Ordering::SeqCst);
        self.check(FakeCall::CacheState, credential)?;
        let versions = self.state().versions;
        Ok(CacheStateResponse {
            graphs_version: versions.graphs,
            assistants_version: versions.assistants,
            schemas_version: versions.schemas,
        })
    }

    async fn fetch_directory(
        &self,
        credential: &BearerToken,
        deployment_id: &DeploymentId,
    ) -> Result<AccessibleGraphsResponse, NetworkError> {
        self.directory_calls.fetch_add(1, Ordering::SeqCst);
        self.check(FakeCall::Directory, credential)?;

        let mut state = self.state();
        if &state.deployment_id != deployment_id {
            return Err(NetworkError::Status {
                endpoint: FakeCall::Directory.endpoint().to_string(),
                status: 404,
                message: format!("unknown deployment {deployment_id}"),
            });
        }

        let pending = std::mem::take(&mut state.pending);
        for mut item in pending {
            if item.hidden_fetches == 0 {
                state.assistants.push(item.wire);
            } else {
                item.hidden_fetches -= 1;
                state.pending.push(item);
            }
        }

        let mut assistant_counts = std::collections::BTreeMap::new();
        for wire in &state.assistants {
            *assistant_counts
                .entry(wire.graph_id.as_str().to_string())
                .or_insert(0) += 1;
        }

        Ok(AccessibleGraphsResponse {
            valid_graphs: state.valid_graphs.clone(),
            invalid_graphs: state.invalid_graphs.clone(),
            assistants: state.assistants.clone(),
            assistant_counts,
            user_role: Some("member".to_string()),
            is_dev_admin: false,
            deployment_id: state.deployment_id.clone(),
            deployment_name: state.deployment_name.clone(),
            scan_metadata: None,
        })
    }

    async fn fetch_assistant(
        &self,
        credential: &BearerToken,
        assistant_id: &AssistantId,
    ) -> Result<AssistantDetailWire, NetworkError> {
        self.assistant_calls.fetch_add(1, Ordering::SeqCst);
        self.check(FakeCall::Assistant, credential)?;
        let state = self.state();
        if let Some(detail) = state.details.get(assistant_id) {
            return Ok(detail.clone());
        }
        state
            .assistants
            .iter()
            .find(|wire| &wire.assistant_id == assistant_id)
            .map(|wire| AssistantDetailWire {
                assistant_id: wire.assistant_id.clone(),
                graph_id: Some(wire.graph_id.clone()),
                name: Some(wire.name.clone()),
                config: wire.config.clone().unwrap_or_default(),
                metadata: wire.metadata.clone().unwrap_or_default(),
                version: Some(1),
                updated_at: wire.updated_at,
            })
            .ok_or_else(|| NetworkError::Status {
                endpoint: format!("/assistants/{assistant_id}"),
                status: 404,
                message: "assistant not found".to_string(),
            })
    }

    async fn create_assistant(
        &self,
        credential: &BearerToken,
        deployment_id: &DeploymentId,
        request: &CreateAssistantRequest,
    ) -> Result<AssistantWire, NetworkError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check(FakeCall::Create, credential)?;

        let mut state = self.state();
        if &state.deployment_id != deployment_id {
            return Err(NetworkError::Status {
                endpoint: FakeCall::Create.endpoint().to_string(),
                status: 404,
                message: format!("unknown deployment {deployment_id}"),
            });
        }

        let id = AssistantId::new(format!("created-{}", state.next_id));
        state.next_id += 1;
        let now = Utc::now();
        let wire = AssistantWire {
            assistant_id: id,
            graph_id: request.graph_id.clone(),
            name: request.name.clone(),
            description: request.description.clone(),
            permission_level: Some(PermissionLevel::Owner),
            owner_id: None,
            tags: request.tags.clone(),
            created_at: Some(now),
            updated_at: Some(now),
            allowed_actions: vec!["edit".to_string(), "delete".to_string()],
            config: Some(serde_json::Value::Object(request.config.clone())),
            metadata: Some(serde_json::Value::Object(request.metadata.clone())),
        };
        state.versions.assistants += 1;
        let hidden_fetches = state.replication_lag;
        state.pending.push(PendingAssistant {
            wire: wire.clone(),
            hidden_fetches,
        });
        Ok(wire)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating AGORA entity types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a non-negative VersionVector.
    pub fn arb_version_vector() -> impl Strategy<Value = VersionVector> {
        (0i64..1_000, 0i64..1_000, 0i64..1_000)
            .prop_map(|(g, a, s)| VersionVector::new(g, a, s))
    }

    pub fn arb_user_id() -> impl Strategy<Value = UserId> {
        "[a-z0-9]{1,12}".prop_map(UserId::new)
    }

    pub fn arb_assistant_id() -> impl Strategy<Value = AssistantId> {
        "[a-z0-9-]{4,16}".prop_map(AssistantId::new)
    }

    /// Generate a Timestamp within 2020-2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64)
            .prop_map(|secs| chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now))
    }

    pub fn arb_permission_level() -> impl Strategy<Value = PermissionLevel> {
        prop_oneof![
            Just(PermissionLevel::Owner),
            Just(PermissionLevel::Admin),
            Just(PermissionLevel::Editor),
            Just(PermissionLevel::User),
            Just(PermissionLevel::Viewer),
        ]
    }

    pub fn arb_assistant_summary() -> impl Strategy<Value = AssistantSummary> {
        (
            arb_assistant_id(),
            "[a-z]{1,8}",
            "[A-Za-z ]{1,24}",
            proptest::option::of(arb_permission_level()),
            proptest::collection::vec("[a-z]{1,6}", 0..4),
            proptest::option::of(arb_timestamp()),
        )
            .prop_map(
                |(assistant_id, graph, name, permission_level, tags, updated_at)| {
                    AssistantSummary {
                        assistant_id,
                        graph_id: GraphId::new(graph),
                        name,
                        description: None,
                        permission_level,
                        owner_id: None,
                        tags,
                        created_at: updated_at,
                        updated_at,
                        allowed_actions: Vec::new(),
                    }
                },
            )
    }

    /// Listing with unique assistant ids.
    pub fn arb_assistant_listing() -> impl Strategy<Value = AssistantListing> {
        proptest::collection::vec(arb_assistant_summary(), 0..12).prop_map(|summaries| {
            let mut seen = std::collections::HashSet::new();
            AssistantListing {
                assistants: summaries
                    .into_iter()
                    .filter(|s| seen.insert(s.assistant_id.clone()))
                    .collect(),
            }
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common directory scenarios.

    use super::*;

    pub const DEPLOYMENT: &str = "dep-main";

    pub fn user() -> UserId {
        UserId::new("user-1")
    }

    pub fn credential() -> BearerToken {
        BearerToken::new("test-token")
    }

    pub fn deployment() -> DeploymentId {
        DeploymentId::new(DEPLOYMENT)
    }

    pub fn graph_template(graph_id: &str) -> GraphTemplate {
        GraphTemplate {
            graph_id: GraphId::new(graph_id),
            name: format!("Graph {graph_id}"),
            description: None,
            assistants_count: 0,
            user_permission_level: Some(PermissionLevel::Editor),
            schema_accessible: true,
            needs_initialization: false,
            created_at: None,
        }
    }

    pub fn assistant_wire(assistant_id: &str, graph_id: &str) -> AssistantWire {
        AssistantWire {
            assistant_id: AssistantId::new(assistant_id),
            graph_id: GraphId::new(graph_id),
            name: format!("Assistant {assistant_id}"),
            description: Some("fixture assistant".to_string()),
            permission_level: Some(PermissionLevel::Editor),
            owner_id: Some(user()),
            tags: vec!["fixture".to_string()],
            created_at: None,
            updated_at: None,
            allowed_actions: vec!["edit".to_string()],
            config: None,
            metadata: None,
        }
    }

    pub fn assistant_summary(assistant_id: &str) -> AssistantSummary {
        agora_core::convert::summary_from_wire(assistant_wire(assistant_id, "graph-a"))
    }

    /// Detail response whose `config` arrives as serialized text.
    pub fn detail_wire(assistant_id: &str) -> AssistantDetailWire {
        AssistantDetailWire {
            assistant_id: AssistantId::new(assistant_id),
            graph_id: Some(GraphId::new("graph-a")),
            name: Some(format!("Assistant {assistant_id}")),
            config: serde_json::Value::String(
                r#"{"configurable":{"model":"small"}}"#.to_string(),
            ),
            metadata: serde_json::json!({"source": "fixture"}),
            version: Some(3),
            updated_at: None,
        }
    }

    pub fn create_request(name: &str) -> CreateAssistantRequest {
        CreateAssistantRequest {
            graph_id: GraphId::new("graph-a"),
            name: name.to_string(),
            description: None,
            config: serde_json::Map::new(),
            metadata: serde_json::Map::new(),
            tags: Vec::new(),
        }
    }

    /// Backend at versions `{g:1, a:5, s:1}` with two graphs and three
    /// assistants `a-1`, `a-2`, `a-3`, in that order.
    pub fn seeded_backend() -> FakeBackend {
        let backend = FakeBackend::new(DEPLOYMENT);
        backend.set_versions(VersionVector::new(1, 5, 1));
        backend.set_deployment_name("Main");
        backend.add_graph(graph_template("graph-a"));
        backend.add_graph(graph_template("graph-b"));
        backend.add_assistant(assistant_wire("a-1", "graph-a"));
        backend.add_assistant(assistant_wire("a-2", "graph-b"));
        backend.add_assistant(assistant_wire("a-3", "graph-a"));
        backend
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for AGORA-specific error variants.

    use super::*;

    #[track_caller]
    pub fn assert_network_error<T: std::fmt::Debug>(result: &AgoraResult<T>) {
        match result {
            Err(AgoraError::Network(_)) => {}
            other => panic!("Expected Network error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &AgoraResult<T>, assistant_id: &str) {
        match result {
            Err(AgoraError::NotFound { assistant_id: id }) => {
                assert_eq!(id.as_str(), assistant_id, "Wrong id in NotFound error");
            }
            other => panic!("Expected NotFound for {}, got: {:?}", assistant_id, other),
        }
    }

    #[track_caller]
    pub fn assert_unauthenticated<T: std::fmt::Debug>(result: &AgoraResult<T>) {
        match result {
            Err(AgoraError::Unauthenticated) => {}
            other => panic!("Expected Unauthenticated, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_session_ended<T: std::fmt::Debug>(result: &AgoraResult<T>) {
        match result {
            Err(AgoraError::SessionEnded) => {}
            other => panic!("Expected SessionEnded, got: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixtures::*;

    #[tokio::test]
    async fn test_seeded_backend_serves_directory_in_order() {
        let backend = seeded_backend();
        let response = backend
            .fetch_directory(&credential(), &deployment())
            .await
            .expect("directory");
        let ids: Vec<_> = response
            .assistants
            .iter()
            .map(|a| a.assistant_id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["a-1", "a-2", "a-3"]);
        assert_eq!(response.assistant_counts.get("graph-a"), Some(&2));
        assert_eq!(backend.directory_calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_switch_and_recover() {
        let backend = seeded_backend();
        backend.fail(FakeCall::CacheState, 503);
        let err = backend
            .fetch_cache_state(&credential())
            .await
            .expect_err("should fail");
        assert!(matches!(err, NetworkError::Status { status: 503, .. }));
        backend.recover(FakeCall::CacheState);
        assert!(backend.fetch_cache_state(&credential()).await.is_ok());
        assert_eq!(backend.cache_state_calls(), 2);
    }

    #[tokio::test]
    async fn test_replication_lag_hides_created_assistant() {
        let backend = seeded_backend();
        backend.set_replication_lag(1);
        let created = backend
            .create_assistant(&credential(), &deployment(), &create_request("New"))
            .await
            .expect("create");
        assert_eq!(backend.versions().assistants, 6);

        let first = backend
            .fetch_directory(&credential(), &deployment())
            .await
            .expect("directory");
        assert!(!first
            .assistants
            .iter()
            .any(|a| a.assistant_id == created.assistant_id));

        let second = backend
            .fetch_directory(&credential(), &deployment())
            .await
            .expect("directory");
        assert!(second
            .assistants
            .iter()
            .any(|a| a.assistant_id == created.assistant_id));
    }

    #[tokio::test]
    async fn test_empty_credential_is_rejected() {
        let backend = seeded_backend();
        let err = backend
            .fetch_cache_state(&BearerToken::new(""))
            .await
            .expect_err("should reject");
        assert!(matches!(err, NetworkError::Status { status: 401, .. }));
    }
}
