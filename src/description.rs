//! Usage instructions for the MCP, rendered with the current
//! configuration values. Key material is masked before display.

use crate::config::Config;

/// Render the usage-instructions text for the `description` tool.
pub fn render(cfg: &Config) -> String {
    format!(
        r#"Cloud.ru Container Apps MCP provides functions to interact with Cloud.ru Container Apps and Artifact Registry:

1. cloudru_containerapps_description() - Returns usage instructions for this MCP
2. cloudru_docker_login(registry_name, key_id, key_secret) - Login to Docker registry
3. cloudru_docker_push(registry_name, repository_name, image_version, key_id, key_secret) - Build and push Docker image
4. cloudru_get_list_containerapps(project_id) / cloudru_get_containerapp(containerapp_name) - Inspect Container Apps
5. cloudru_create_containerapp / cloudru_delete_containerapp / cloudru_start_containerapp / cloudru_stop_containerapp - Manage Container Apps
6. cloudru_get_list_docker_registries / cloudru_create_docker_registry - Manage Artifact Registry registries

Environment variables can be used as bindings for parameters:
- CLOUDRU_REGISTRY_NAME: Registry name
- CLOUDRU_KEY_ID: Service account key ID for authentication
- CLOUDRU_KEY_SECRET: Service account key secret for authentication
- CLOUDRU_REPOSITORY_NAME: Repository name (defaults to current directory name if not set)
- CLOUDRU_PROJECT_ID: Project ID for Container Apps
- CLOUDRU_CONTAINERAPP_NAME: Container App name (defaults to current directory name if not set)
- CLOUDRU_DOCKERFILE: Path to Dockerfile (defaults to "Dockerfile" if not set)

Current configuration values:
- CLOUDRU_REGISTRY_NAME: ({registry_name}) (Registry for storing Docker images)
- CLOUDRU_REPOSITORY_NAME: ({repository_name}) (Name of the repository in the registry)
- CLOUDRU_PROJECT_ID: ({project_id}) (Project ID, see console.cloud.ru)
- CLOUDRU_DOCKERFILE: ({dockerfile}) (Path to the Dockerfile to build the image, by default Dockerfile)
- CLOUDRU_KEY_ID: ({key_id}) (Authentication key identifier)
- CLOUDRU_KEY_SECRET: ({key_secret}) (Authentication key secret)
- Current directory: {current_dir} (Name of the current working directory)

For more details see: https://cloud.ru/docs/container-apps-evolution/ug/topics/tutorials__before-work"#,
        registry_name = cfg.registry_name,
        repository_name = cfg.repository_name,
        project_id = cfg.project_id,
        dockerfile = cfg.dockerfile,
        key_id = mask_sensitive(&cfg.key_id),
        key_secret = mask_sensitive(&cfg.key_secret),
        current_dir = cfg.current_dir,
    )
}

/// Mask the middle of a sensitive value, keeping three characters at
/// each end. Short values are masked entirely. Counts characters, not
/// bytes, so multi-byte values never split a char boundary.
fn mask_sensitive(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    let chars = value.chars().count();
    if chars <= 4 {
        return "***".to_string();
    }
    let start: String = value.chars().take(3).collect();
    let end: String = value.chars().skip(chars - 3).collect();
    format!("{start}***{end}")
}
