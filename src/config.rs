//! Configuration snapshot loaded from the process environment.
//!
//! All settings come from `CLOUDRU_*` environment variables, with a
//! best-effort `.env` file load on top. The snapshot is built once at
//! startup and only read afterwards; missing credentials surface as
//! parameter-resolution errors at first use rather than aborting the
//! server.

use std::env;
use std::path::Path;

pub const ENV_REGISTRY_NAME: &str = "CLOUDRU_REGISTRY_NAME";
pub const ENV_KEY_ID: &str = "CLOUDRU_KEY_ID";
pub const ENV_KEY_SECRET: &str = "CLOUDRU_KEY_SECRET";
pub const ENV_REPOSITORY_NAME: &str = "CLOUDRU_REPOSITORY_NAME";
pub const ENV_PROJECT_ID: &str = "CLOUDRU_PROJECT_ID";
pub const ENV_CONTAINERAPP_NAME: &str = "CLOUDRU_CONTAINERAPP_NAME";
pub const ENV_DOCKERFILE: &str = "CLOUDRU_DOCKERFILE";
pub const ENV_DOCKERFILE_TARGET: &str = "CLOUDRU_DOCKERFILE_TARGET";
pub const ENV_DOCKERFILE_FOLDER: &str = "CLOUDRU_DOCKERFILE_FOLDER";

/// Configuration values for the MCP server.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub registry_name: String,
    pub key_id: String,
    pub key_secret: String,
    pub repository_name: String,
    pub project_id: String,
    pub containerapp_name: String,
    pub dockerfile: String,
    pub dockerfile_target: String,
    pub dockerfile_folder: String,
    /// Basename of the working directory, used as the default
    /// repository and application name.
    pub current_dir: String,
}

impl Config {
    /// Load configuration from environment variables and an optional
    /// `.env` file. Absent variables resolve to empty strings.
    pub fn load() -> Self {
        if dotenvy::dotenv().is_err() {
            eprintln!("[cloudru-containerapps-mcp] No .env file found, using environment variables only");
        }

        let key_id = env_or_empty(ENV_KEY_ID);
        let key_secret = env_or_empty(ENV_KEY_SECRET);
        if key_id.is_empty() || key_secret.is_empty() {
            eprintln!(
                "[cloudru-containerapps-mcp] Warning: {ENV_KEY_ID} and {ENV_KEY_SECRET} are not both set; \
                 authenticated operations will require key_id/key_secret arguments. \
                 See https://cloud.ru/docs/console_api/ug/topics/quickstart to obtain access keys."
            );
        }

        Self {
            registry_name: env_or_empty(ENV_REGISTRY_NAME),
            key_id,
            key_secret,
            repository_name: env_or_empty(ENV_REPOSITORY_NAME),
            project_id: env_or_empty(ENV_PROJECT_ID),
            containerapp_name: env_or_empty(ENV_CONTAINERAPP_NAME),
            dockerfile: env_or_empty(ENV_DOCKERFILE),
            dockerfile_target: env_or_empty(ENV_DOCKERFILE_TARGET),
            dockerfile_folder: env_or_empty(ENV_DOCKERFILE_FOLDER),
            current_dir: current_dir_name(),
        }
    }
}

fn env_or_empty(name: &str) -> String {
    env::var(name).unwrap_or_default()
}

/// Basename of the current working directory, or "default" when the
/// working directory cannot be determined.
fn current_dir_name() -> String {
    env::current_dir()
        .ok()
        .as_deref()
        .and_then(Path::file_name)
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| "default".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_dir_name_is_nonempty() {
        assert!(!current_dir_name().is_empty());
    }

    #[test]
    fn default_config_is_all_empty() {
        let cfg = Config::default();
        assert!(cfg.registry_name.is_empty());
        assert!(cfg.key_id.is_empty());
        assert!(cfg.current_dir.is_empty());
    }
}
