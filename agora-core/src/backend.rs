//! Directory backend trait.
//!
//! Abstracts the remote directory service so the sync engine can run against
//! the REST client in production and a scripted fake in tests.

use async_trait::async_trait;

use crate::{
    AccessibleGraphsResponse, AssistantDetailWire, AssistantId, AssistantWire, BearerToken,
    CacheStateResponse, CreateAssistantRequest, DeploymentId, NetworkError,
};

/// Remote directory service contract.
///
/// Every call is a suspension point; implementations must not retry on their
/// own. Callers supply the bearer credential explicitly.
#[async_trait]
pub trait DirectoryBackend: Send + Sync {
    /// `GET /cache-state`
    async fn fetch_cache_state(
        &self,
        credential: &BearerToken,
    ) -> Result<CacheStateResponse, NetworkError>;

    /// `GET /accessible-graphs?deploymentId=D`
    async fn fetch_directory(
        &self,
        credential: &BearerToken,
        deployment_id: &DeploymentId,
    ) -> Result<AccessibleGraphsResponse, NetworkError>;

    /// `GET /assistants/{id}`
    async fn fetch_assistant(
        &self,
        credential: &BearerToken,
        assistant_id: &AssistantId,
    ) -> Result<AssistantDetailWire, NetworkError>;

    /// `POST /assistants?deploymentId=D`
    async fn create_assistant(
        &self,
        credential: &BearerToken,
        deployment_id: &DeploymentId,
        request: &CreateAssistantRequest,
    ) -> Result<AssistantWire, NetworkError>;
}
