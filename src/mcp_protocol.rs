//! MCP protocol implementation over stdio.
//!
//! Implements the Model Context Protocol (MCP) JSON-RPC over stdio and
//! dispatches tool calls to the Cloud.ru API client and the docker
//! orchestrator. Tool failures become `isError` tool results carrying
//! the error text; they never escape as protocol errors or panics.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use thiserror::Error;

use crate::cloud_api::{CloudApiClient, Credentials};
use crate::config::Config;
use crate::description;
use crate::docker::{DockerCli, DockerImage};
use crate::params::{Field, ParamTable};

#[derive(Debug, Error)]
pub enum McpError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// JSON-RPC request structure.
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

/// JSON-RPC response structure.
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

/// MCP server implementation.
pub struct McpServer {
    cfg: Config,
    params: ParamTable,
    cloud: CloudApiClient,
    docker: DockerCli,
}

impl McpServer {
    pub fn new(cfg: Config) -> Self {
        Self::with_components(cfg, CloudApiClient::new(), DockerCli::new())
    }

    /// Construct the server around explicit components; used by tests
    /// to point at mock endpoints and stub executables.
    pub fn with_components(cfg: Config, cloud: CloudApiClient, docker: DockerCli) -> Self {
        let params = ParamTable::new(&cfg);
        Self {
            cfg,
            params,
            cloud,
            docker,
        }
    }

    /// Run the MCP server, reading from stdin and writing to stdout.
    pub async fn run(&self) -> Result<(), McpError> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();

        for line in stdin.lock().lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(&line) {
                Ok(req) => req,
                Err(e) => {
                    eprintln!("[cloudru-containerapps-mcp] Failed to parse request: {}", e);
                    continue;
                }
            };

            let response = self.handle_request(&request).await;

            if let Some(resp) = response {
                let output = serde_json::to_string(&resp)?;
                writeln!(stdout, "{}", output)?;
                stdout.flush()?;
            }
        }

        Ok(())
    }

    /// Handle a single JSON-RPC request.
    async fn handle_request(&self, request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
        // Notifications (no id) don't get responses
        let id = request.id.clone()?;

        let (result, error) = match request.method.as_str() {
            "initialize" => (Some(self.handle_initialize()), None),
            "notifications/initialized" => return None,
            "tools/list" => (Some(self.handle_tools_list()), None),
            "tools/call" => (Some(self.handle_tools_call(&request.params).await), None),
            "ping" => (Some(json!({})), None),
            _ => (
                None,
                Some(JsonRpcError {
                    code: -32601,
                    message: format!("Method not found: {}", request.method),
                }),
            ),
        };

        Some(JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result,
            error,
        })
    }

    /// Handle the initialize request.
    fn handle_initialize(&self) -> Value {
        json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": "cloudru-containerapps-mcp",
                "version": env!("CARGO_PKG_VERSION")
            }
        })
    }

    /// Handle the tools/list request.
    fn handle_tools_list(&self) -> Value {
        let tool = |name: &str, about: &str, fields: &[Field]| {
            json!({
                "name": name,
                "description": about,
                "inputSchema": self.params.input_schema(fields),
            })
        };

        json!({
            "tools": [
                tool(
                    "cloudru_containerapps_description",
                    "Returns usage instructions for Cloud.ru Container Apps MCP",
                    &[],
                ),
                tool(
                    "cloudru_docker_login",
                    "Login to Cloud.ru Artifact Registry (Docker registry)",
                    &[Field::RegistryName, Field::KeyId, Field::KeySecret],
                ),
                tool(
                    "cloudru_docker_push",
                    "Build and push Docker image to Cloud.ru Artifact Registry (Docker registry)",
                    &[
                        Field::RegistryName,
                        Field::RepositoryName,
                        Field::ImageVersion,
                        Field::DockerfilePath,
                        Field::DockerfileTarget,
                        Field::DockerfileFolder,
                        Field::KeyId,
                        Field::KeySecret,
                    ],
                ),
                tool(
                    "cloudru_get_list_containerapps",
                    "Get list of Container Apps from Cloud.ru. Project ID can be set via CLOUDRU_PROJECT_ID and obtained from console.cloud.ru",
                    &[Field::ProjectId, Field::KeyId, Field::KeySecret],
                ),
                tool(
                    "cloudru_get_containerapp",
                    "Get a single Container App from Cloud.ru by name",
                    &[Field::ProjectId, Field::ContainerAppName, Field::KeyId, Field::KeySecret],
                ),
                tool(
                    "cloudru_create_containerapp",
                    "Create a Container App in Cloud.ru from a container image",
                    &[
                        Field::ProjectId,
                        Field::ContainerAppName,
                        Field::ContainerAppPort,
                        Field::ContainerAppImage,
                        Field::KeyId,
                        Field::KeySecret,
                    ],
                ),
                tool(
                    "cloudru_delete_containerapp",
                    "Delete a Container App from Cloud.ru by name",
                    &[Field::ProjectId, Field::ContainerAppName, Field::KeyId, Field::KeySecret],
                ),
                tool(
                    "cloudru_start_containerapp",
                    "Start a stopped Container App",
                    &[Field::ProjectId, Field::ContainerAppName, Field::KeyId, Field::KeySecret],
                ),
                tool(
                    "cloudru_stop_containerapp",
                    "Stop a running Container App",
                    &[Field::ProjectId, Field::ContainerAppName, Field::KeyId, Field::KeySecret],
                ),
                tool(
                    "cloudru_get_list_docker_registries",
                    "Get list of Docker registries in the Cloud.ru Artifact Registry",
                    &[Field::ProjectId, Field::KeyId, Field::KeySecret],
                ),
                tool(
                    "cloudru_create_docker_registry",
                    "Create a Docker registry in the Cloud.ru Artifact Registry",
                    &[
                        Field::ProjectId,
                        Field::RegistryName,
                        Field::RegistryIsPublic,
                        Field::KeyId,
                        Field::KeySecret,
                    ],
                ),
            ]
        })
    }

    /// Handle the tools/call request. Tool failures are rendered as
    /// `isError` tool results, never as protocol errors.
    async fn handle_tools_call(&self, params: &Value) -> Value {
        let name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        let outcome = match name {
            "cloudru_containerapps_description" => Ok(description::render(&self.cfg)),
            "cloudru_docker_login" => self.docker_login(&arguments).await,
            "cloudru_docker_push" => self.docker_push(&arguments).await,
            "cloudru_get_list_containerapps" => self.get_list_containerapps(&arguments).await,
            "cloudru_get_containerapp" => self.get_containerapp(&arguments).await,
            "cloudru_create_containerapp" => self.create_containerapp(&arguments).await,
            "cloudru_delete_containerapp" => self.delete_containerapp(&arguments).await,
            "cloudru_start_containerapp" => self.signal_containerapp(&arguments, false).await,
            "cloudru_stop_containerapp" => self.signal_containerapp(&arguments, true).await,
            "cloudru_get_list_docker_registries" => self.get_list_docker_registries(&arguments).await,
            "cloudru_create_docker_registry" => self.create_docker_registry(&arguments).await,
            _ => Err(format!("Unknown tool: {}", name)),
        };

        match outcome {
            Ok(text) => json!({
                "content": [{"type": "text", "text": text}]
            }),
            Err(message) => json!({
                "content": [{"type": "text", "text": message}],
                "isError": true
            }),
        }
    }

    /// Resolve one parameter, rendering resolution failures as the
    /// tool-error message text.
    fn field(&self, field: Field, arguments: &Value) -> Result<String, String> {
        self.params.resolve(field, arguments).map_err(|e| e.to_string())
    }

    /// Credentials for API calls; the registry name is only resolved
    /// when the operation needs it.
    fn api_credentials(&self, arguments: &Value) -> Result<Credentials, String> {
        Ok(Credentials {
            registry_name: String::new(),
            key_id: self.field(Field::KeyId, arguments)?,
            key_secret: self.field(Field::KeySecret, arguments)?,
        })
    }

    fn registry_credentials(&self, arguments: &Value) -> Result<Credentials, String> {
        Ok(Credentials {
            registry_name: self.field(Field::RegistryName, arguments)?,
            key_id: self.field(Field::KeyId, arguments)?,
            key_secret: self.field(Field::KeySecret, arguments)?,
        })
    }

    async fn docker_login(&self, arguments: &Value) -> Result<String, String> {
        let credentials = self.registry_credentials(arguments)?;
        self.docker
            .login(&credentials.registry_name, &credentials)
            .await
            .map_err(|e| e.to_string())?;
        Ok("Successfully logged into Cloud.ru Docker registry".to_string())
    }

    async fn docker_push(&self, arguments: &Value) -> Result<String, String> {
        let credentials = self.registry_credentials(arguments)?;
        let image = DockerImage {
            registry_name: credentials.registry_name.clone(),
            repository_name: self.field(Field::RepositoryName, arguments)?,
            image_version: self.field(Field::ImageVersion, arguments)?,
            dockerfile_path: self.field(Field::DockerfilePath, arguments)?,
            dockerfile_target: self.field(Field::DockerfileTarget, arguments)?,
            dockerfile_folder: self.field(Field::DockerfileFolder, arguments)?,
        };

        eprintln!(
            "[cloudru-containerapps-mcp] Starting Docker build and push process for image: {}",
            image.image_tag()
        );
        let tag = self
            .docker
            .build_and_push(&image, &credentials)
            .await
            .map_err(|e| e.to_string())?;
        Ok(format!(
            "Successfully built and pushed Docker image to Cloud.ru Artifact Registry: {tag}"
        ))
    }

    async fn get_list_containerapps(&self, arguments: &Value) -> Result<String, String> {
        let project_id = self.field(Field::ProjectId, arguments)?;
        let credentials = self.api_credentials(arguments)?;
        let apps = self
            .cloud
            .get_list_container_apps(&project_id, &credentials)
            .await
            .map_err(|e| e.to_string())?;
        to_pretty_json(&apps)
    }

    async fn get_containerapp(&self, arguments: &Value) -> Result<String, String> {
        let project_id = self.field(Field::ProjectId, arguments)?;
        let name = self.field(Field::ContainerAppName, arguments)?;
        let credentials = self.api_credentials(arguments)?;
        let app = self
            .cloud
            .get_container_app(&project_id, &name, &credentials)
            .await
            .map_err(|e| e.to_string())?;
        to_pretty_json(&app)
    }

    async fn create_containerapp(&self, arguments: &Value) -> Result<String, String> {
        let project_id = self.field(Field::ProjectId, arguments)?;
        let name = self.field(Field::ContainerAppName, arguments)?;
        let port = self.field(Field::ContainerAppPort, arguments)?;
        let port: u16 = port
            .parse()
            .map_err(|_| format!("invalid containerapp_port '{port}': expected a port number"))?;
        let image = self.field(Field::ContainerAppImage, arguments)?;
        let credentials = self.api_credentials(arguments)?;
        let app = self
            .cloud
            .create_container_app(&project_id, &name, port, &image, &credentials)
            .await
            .map_err(|e| e.to_string())?;
        to_pretty_json(&app)
    }

    async fn delete_containerapp(&self, arguments: &Value) -> Result<String, String> {
        let project_id = self.field(Field::ProjectId, arguments)?;
        let name = self.field(Field::ContainerAppName, arguments)?;
        let credentials = self.api_credentials(arguments)?;
        self.cloud
            .delete_container_app(&project_id, &name, &credentials)
            .await
            .map_err(|e| e.to_string())?;
        Ok(format!("Successfully deleted Container App {name}"))
    }

    async fn signal_containerapp(&self, arguments: &Value, stop: bool) -> Result<String, String> {
        let project_id = self.field(Field::ProjectId, arguments)?;
        let name = self.field(Field::ContainerAppName, arguments)?;
        let credentials = self.api_credentials(arguments)?;
        if stop {
            self.cloud
                .stop_container_app(&project_id, &name, &credentials)
                .await
                .map_err(|e| e.to_string())?;
            Ok(format!("Successfully stopped Container App {name}"))
        } else {
            self.cloud
                .start_container_app(&project_id, &name, &credentials)
                .await
                .map_err(|e| e.to_string())?;
            Ok(format!("Successfully started Container App {name}"))
        }
    }

    async fn get_list_docker_registries(&self, arguments: &Value) -> Result<String, String> {
        let project_id = self.field(Field::ProjectId, arguments)?;
        let credentials = self.api_credentials(arguments)?;
        let registries = self
            .cloud
            .get_list_docker_registries(&project_id, &credentials)
            .await
            .map_err(|e| e.to_string())?;
        to_pretty_json(&registries)
    }

    async fn create_docker_registry(&self, arguments: &Value) -> Result<String, String> {
        let project_id = self.field(Field::ProjectId, arguments)?;
        let name = self.field(Field::RegistryName, arguments)?;
        let is_public = self.field(Field::RegistryIsPublic, arguments)?;
        let is_public: bool = is_public
            .parse()
            .map_err(|_| format!("invalid registry_is_public '{is_public}': expected true or false"))?;
        let credentials = self.api_credentials(arguments)?;
        let registry = self
            .cloud
            .create_docker_registry(&project_id, &name, is_public, &credentials)
            .await
            .map_err(|e| e.to_string())?;
        to_pretty_json(&registry)
    }
}

fn to_pretty_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("Failed to format result: {e}"))
}
