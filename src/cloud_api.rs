//! HTTP client for the Cloud.ru IAM, Container Apps, and Artifact
//! Registry APIs.
//!
//! Every operation is a two-step flow: obtain a fresh bearer token from
//! the IAM endpoint, then call the target resource endpoint with it.
//! Tokens are never cached or reused across operations. No retries and
//! no timeouts beyond the HTTP client defaults.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

const DEFAULT_IAM_URL: &str = "https://iam.api.cloud.ru";
const DEFAULT_CONTAINERS_URL: &str = "https://containers.api.cloud.ru";
const DEFAULT_REGISTRY_URL: &str = "https://ar.api.cloud.ru";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("authentication failed with status {status}: {body}")]
    AuthFailed { status: u16, body: String },
    #[error("API request failed with status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("API returned empty response body with status {status}")]
    EmptyResponse { status: u16 },
    #[error("failed to decode API response: {source} body: {body}")]
    Decode {
        source: serde_json::Error,
        body: String,
    },
}

/// Authentication credentials for Cloud.ru. Supplied per call, never
/// persisted beyond it.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub registry_name: String,
    pub key_id: String,
    pub key_secret: String,
}

/// A Cloud.ru Container App. Only `id`/`name`/`status` are inspected;
/// every other provider field passes through `extra` untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerApp {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A Cloud.ru Artifact Registry entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerRegistry {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "registryType")]
    pub registry_type: String,
    #[serde(default, rename = "isPublic")]
    pub is_public: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
}

#[derive(Deserialize)]
struct ContainerAppList {
    #[serde(default)]
    data: Vec<ContainerApp>,
}

#[derive(Deserialize)]
struct RegistryList {
    #[serde(default)]
    registries: Vec<DockerRegistry>,
}

/// Client for the Cloud.ru REST APIs.
pub struct CloudApiClient {
    client: reqwest::Client,
    iam_url: String,
    containers_url: String,
    registry_url: String,
}

impl CloudApiClient {
    pub fn new() -> Self {
        Self::with_endpoints(DEFAULT_IAM_URL, DEFAULT_CONTAINERS_URL, DEFAULT_REGISTRY_URL)
    }

    /// Construct a client against non-default API endpoints.
    pub fn with_endpoints(
        iam_url: impl Into<String>,
        containers_url: impl Into<String>,
        registry_url: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            iam_url: iam_url.into(),
            containers_url: containers_url.into(),
            registry_url: registry_url.into(),
        }
    }

    /// Exchange the key pair for a bearer token.
    async fn get_access_token(&self, credentials: &Credentials) -> Result<String, ApiError> {
        let url = format!("{}/api/v1/auth/token", self.iam_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "keyId": credentials.key_id,
                "secret": credentials.key_secret,
            }))
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        if status != 200 {
            return Err(ApiError::AuthFailed { status, body });
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|_| ApiError::AuthFailed { status, body: body.clone() })?;
        if token.access_token.is_empty() {
            return Err(ApiError::AuthFailed { status, body });
        }
        Ok(token.access_token)
    }

    /// Execute an authenticated request and return (status, body).
    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        token: &str,
    ) -> Result<(u16, String), ApiError> {
        let response = request
            .bearer_auth(token)
            .header("Content-Type", "application/json")
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok((status, body))
    }

    fn decode<T: serde::de::DeserializeOwned>(body: String) -> Result<T, ApiError> {
        serde_json::from_str(&body).map_err(|source| ApiError::Decode { source, body })
    }

    /// List Container Apps in a project.
    pub async fn get_list_container_apps(
        &self,
        project_id: &str,
        credentials: &Credentials,
    ) -> Result<Vec<ContainerApp>, ApiError> {
        let token = self.get_access_token(credentials).await?;
        let url = format!("{}/v1/containers", self.containers_url);
        let request = self.client.get(&url).query(&[("projectId", project_id)]);
        let (status, body) = self.execute(request, &token).await?;
        if status != 200 {
            return Err(ApiError::Api { status, body });
        }
        if body.is_empty() {
            return Err(ApiError::EmptyResponse { status });
        }
        let list: ContainerAppList = Self::decode(body)?;
        Ok(list.data)
    }

    /// Get a single Container App by name.
    pub async fn get_container_app(
        &self,
        project_id: &str,
        name: &str,
        credentials: &Credentials,
    ) -> Result<ContainerApp, ApiError> {
        let token = self.get_access_token(credentials).await?;
        let url = format!("{}/v1/containers/{}", self.containers_url, name);
        let request = self.client.get(&url).query(&[("projectId", project_id)]);
        let (status, body) = self.execute(request, &token).await?;
        if status != 200 {
            return Err(ApiError::Api { status, body });
        }
        if body.is_empty() {
            return Err(ApiError::EmptyResponse { status });
        }
        Self::decode(body)
    }

    /// Create a Container App running a single container image.
    pub async fn create_container_app(
        &self,
        project_id: &str,
        name: &str,
        port: u16,
        image: &str,
        credentials: &Credentials,
    ) -> Result<ContainerApp, ApiError> {
        let token = self.get_access_token(credentials).await?;
        let payload = json!({
            "name": name,
            "projectId": project_id,
            "description": format!("Container App {name} created via MCP"),
            "template": {
                "containers": [
                    {
                        "name": name,
                        "image": image,
                        "containerPort": port,
                        "env": [
                            {"name": "CONTAINERAPP_NAME", "value": name},
                        ],
                    },
                ],
            },
        });
        let url = format!("{}/v2/containers/", self.containers_url);
        let request = self.client.post(&url).json(&payload);
        let (status, body) = self.execute(request, &token).await?;
        if status != 200 && status != 201 {
            return Err(ApiError::Api { status, body });
        }
        if body.is_empty() {
            return Err(ApiError::EmptyResponse { status });
        }
        Self::decode(body)
    }

    /// Delete a Container App by name.
    pub async fn delete_container_app(
        &self,
        project_id: &str,
        name: &str,
        credentials: &Credentials,
    ) -> Result<(), ApiError> {
        let token = self.get_access_token(credentials).await?;
        let url = format!("{}/v2/containers/{}", self.containers_url, name);
        let request = self.client.delete(&url).query(&[("projectId", project_id)]);
        let (status, body) = self.execute(request, &token).await?;
        if status != 200 && status != 204 {
            return Err(ApiError::Api { status, body });
        }
        Ok(())
    }

    /// Start a stopped Container App.
    pub async fn start_container_app(
        &self,
        project_id: &str,
        name: &str,
        credentials: &Credentials,
    ) -> Result<(), ApiError> {
        self.signal_container_app(project_id, name, "start", credentials).await
    }

    /// Stop a running Container App.
    pub async fn stop_container_app(
        &self,
        project_id: &str,
        name: &str,
        credentials: &Credentials,
    ) -> Result<(), ApiError> {
        self.signal_container_app(project_id, name, "stop", credentials).await
    }

    async fn signal_container_app(
        &self,
        project_id: &str,
        name: &str,
        action: &str,
        credentials: &Credentials,
    ) -> Result<(), ApiError> {
        let token = self.get_access_token(credentials).await?;
        let url = format!("{}/v2/containers/{}:{}", self.containers_url, name, action);
        let request = self.client.post(&url).query(&[("projectId", project_id)]);
        let (status, body) = self.execute(request, &token).await?;
        if status != 200 {
            return Err(ApiError::Api { status, body });
        }
        Ok(())
    }

    /// List Docker-type registries in a project. An empty response body
    /// means zero registries, not an error.
    pub async fn get_list_docker_registries(
        &self,
        project_id: &str,
        credentials: &Credentials,
    ) -> Result<Vec<DockerRegistry>, ApiError> {
        let token = self.get_access_token(credentials).await?;
        let url = format!("{}/v1/projects/{}/registries", self.registry_url, project_id);
        let request = self.client.get(&url);
        let (status, body) = self.execute(request, &token).await?;
        if status != 200 {
            return Err(ApiError::Api { status, body });
        }
        if body.is_empty() {
            return Ok(Vec::new());
        }
        let list: RegistryList = Self::decode(body)?;
        Ok(list
            .registries
            .into_iter()
            .filter(|r| r.registry_type == "DOCKER")
            .collect())
    }

    /// Create a Docker-type registry.
    pub async fn create_docker_registry(
        &self,
        project_id: &str,
        name: &str,
        is_public: bool,
        credentials: &Credentials,
    ) -> Result<DockerRegistry, ApiError> {
        let token = self.get_access_token(credentials).await?;
        let url = format!("{}/v1/projects/{}/registries", self.registry_url, project_id);
        let request = self.client.post(&url).json(&json!({
            "name": name,
            "isPublic": is_public,
            "registryType": "DOCKER",
        }));
        let (status, body) = self.execute(request, &token).await?;
        if status != 200 && status != 201 {
            return Err(ApiError::Api { status, body });
        }
        if body.is_empty() {
            return Err(ApiError::EmptyResponse { status });
        }
        Self::decode(body)
    }
}

impl Default for CloudApiClient {
    fn default() -> Self {
        Self::new()
    }
}
