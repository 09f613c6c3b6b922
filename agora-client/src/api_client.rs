//! REST client for the directory service.

use std::time::Duration;

use agora_core::{
    AccessibleGraphsResponse, AssistantDetailWire, AssistantId, AssistantWire, BearerToken,
    CacheStateResponse, CreateAssistantRequest, DeploymentId, DirectoryBackend, NetworkError,
};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;

/// Error body shape returned by the directory service.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(alias = "detail", alias = "error")]
    message: String,
}

fn transport(endpoint: &str, err: reqwest::Error) -> NetworkError {
    NetworkError::Transport {
        endpoint: endpoint.to_string(),
        reason: err.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: Url,
}

impl RestClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, NetworkError> {
        let parsed = Url::parse(base_url.trim_end_matches('/')).map_err(|e| {
            NetworkError::Transport {
                endpoint: base_url.to_string(),
                reason: format!("invalid base url: {e}"),
            }
        })?;
        if parsed.cannot_be_a_base() {
            return Err(NetworkError::Transport {
                endpoint: base_url.to_string(),
                reason: "base url cannot carry a path".to_string(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| transport(base_url, e))?;
        Ok(Self {
            client,
            base_url: parsed,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Base url with `segments` appended, each percent-encoded.
    fn url(&self, endpoint: &str, segments: &[&str]) -> Result<Url, NetworkError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| NetworkError::Transport {
                endpoint: endpoint.to_string(),
                reason: "base url cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T, Q>(
        &self,
        credential: &BearerToken,
        endpoint: &str,
        segments: &[&str],
        query: Option<&Q>,
    ) -> Result<T, NetworkError>
    where
        T: serde::de::DeserializeOwned,
        Q: serde::Serialize + ?Sized,
    {
        let url = self.url(endpoint, segments)?;
        let mut request = self.client.get(url).bearer_auth(credential.expose());
        if let Some(query) = query {
            request = request.query(query);
        }
        let response = request.send().await.map_err(|e| transport(endpoint, e))?;
        parse_response(endpoint, response).await
    }

    async fn post_json<T, Q, B>(
        &self,
        credential: &BearerToken,
        endpoint: &str,
        segments: &[&str],
        query: &Q,
        body: &B,
    ) -> Result<T, NetworkError>
    where
        T: serde::de::DeserializeOwned,
        Q: serde::Serialize + ?Sized,
        B: serde::Serialize + ?Sized,
    {
        let url = self.url(endpoint, segments)?;
        let response = self
            .client
            .post(url)
            .bearer_auth(credential.expose())
            .query(query)
            .json(body)
            .send()
            .await
            .map_err(|e| transport(endpoint, e))?;
        parse_response(endpoint, response).await
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    endpoint: &str,
    response: reqwest::Response,
) -> Result<T, NetworkError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| NetworkError::InvalidResponse {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            });
    }

    let text = response.text().await.map_err(|e| transport(endpoint, e))?;
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.message)
        .unwrap_or(text);
    Err(NetworkError::Status {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl DirectoryBackend for RestClient {
    async fn fetch_cache_state(
        &self,
        credential: &BearerToken,
    ) -> Result<CacheStateResponse, NetworkError> {
        self.get_json::<_, ()>(credential, "/cache-state", &["cache-state"], None)
            .await
    }

    async fn fetch_directory(
        &self,
        credential: &BearerToken,
        deployment_id: &DeploymentId,
    ) -> Result<AccessibleGraphsResponse, NetworkError> {
        self.get_json(
            credential,
            "/accessible-graphs",
            &["accessible-graphs"],
            Some(&[("deploymentId", deployment_id.as_str())]),
        )
        .await
    }

    async fn fetch_assistant(
        &self,
        credential: &BearerToken,
        assistant_id: &AssistantId,
    ) -> Result<AssistantDetailWire, NetworkError> {
        let endpoint = format!("/assistants/{}", assistant_id.as_str());
        self.get_json::<_, ()>(
            credential,
            &endpoint,
            &["assistants", assistant_id.as_str()],
            None,
        )
        .await
    }

    async fn create_assistant(
        &self,
        credential: &BearerToken,
        deployment_id: &DeploymentId,
        request: &CreateAssistantRequest,
    ) -> Result<AssistantWire, NetworkError> {
        self.post_json(
            credential,
            "/assistants",
            &["assistants"],
            &[("deploymentId", deployment_id.as_str())],
            request,
        )
        .await
    }
}
