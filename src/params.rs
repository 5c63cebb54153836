//! Tool parameter descriptors and the value-resolution policy.
//!
//! Every tool parameter is one of a fixed set of fields, each with a
//! wire name, a description, an optional value bound from the
//! environment at startup, an optional static default, and a required
//! flag. Resolution precedence, first non-empty wins:
//!
//! 1. the environment-bound value (absolute precedence — fields with
//!    an env binding are not advertised in the tool's input schema,
//!    so callers are never offered them);
//! 2. the caller-supplied argument;
//! 3. the static default;
//! 4. empty string, when the field is optional;
//! 5. `MissingParameter`, when the field is required.

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum ParamError {
    #[error("missing required parameter '{name}': {description}")]
    MissingParameter { name: String, description: String },
}

/// The fixed set of tool parameter fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    RegistryName,
    KeyId,
    KeySecret,
    RepositoryName,
    ImageVersion,
    DockerfilePath,
    DockerfileTarget,
    DockerfileFolder,
    ProjectId,
    ContainerAppName,
    ContainerAppPort,
    ContainerAppImage,
    RegistryIsPublic,
}

const FIELD_COUNT: usize = 13;

const ALL_FIELDS: [Field; FIELD_COUNT] = [
    Field::RegistryName,
    Field::KeyId,
    Field::KeySecret,
    Field::RepositoryName,
    Field::ImageVersion,
    Field::DockerfilePath,
    Field::DockerfileTarget,
    Field::DockerfileFolder,
    Field::ProjectId,
    Field::ContainerAppName,
    Field::ContainerAppPort,
    Field::ContainerAppImage,
    Field::RegistryIsPublic,
];

impl Field {
    /// Wire name of the field in tool arguments and input schemas.
    pub fn name(self) -> &'static str {
        match self {
            Field::RegistryName => "registry_name",
            Field::KeyId => "key_id",
            Field::KeySecret => "key_secret",
            Field::RepositoryName => "repository_name",
            Field::ImageVersion => "image_version",
            Field::DockerfilePath => "dockerfile_path",
            Field::DockerfileTarget => "dockerfile_target",
            Field::DockerfileFolder => "dockerfile_folder",
            Field::ProjectId => "project_id",
            Field::ContainerAppName => "containerapp_name",
            Field::ContainerAppPort => "containerapp_port",
            Field::ContainerAppImage => "containerapp_image",
            Field::RegistryIsPublic => "registry_is_public",
        }
    }

    fn index(self) -> usize {
        ALL_FIELDS.iter().position(|f| *f == self).unwrap_or(0)
    }
}

/// Descriptor for one parameter field.
#[derive(Debug, Clone)]
struct ParamSpec {
    description: &'static str,
    /// Value bound from the configuration snapshot; empty means unbound.
    env_value: String,
    default: String,
    required: bool,
}

/// Read-only table of parameter descriptors, built once at startup.
#[derive(Debug)]
pub struct ParamTable {
    specs: [ParamSpec; FIELD_COUNT],
}

impl ParamTable {
    pub fn new(cfg: &Config) -> Self {
        let spec = |description, env_value: &str, default: &str, required| ParamSpec {
            description,
            env_value: env_value.to_string(),
            default: default.to_string(),
            required,
        };

        Self {
            specs: [
                spec("Registry name", &cfg.registry_name, "", true),
                spec("Service account key ID", &cfg.key_id, "", true),
                spec("Service account key secret", &cfg.key_secret, "", true),
                spec(
                    "Repository name (defaults to the current directory name)",
                    &cfg.repository_name,
                    &cfg.current_dir,
                    true,
                ),
                spec("Image version", "", "latest", true),
                spec("Path to the Dockerfile", &cfg.dockerfile, "Dockerfile", false),
                spec("Dockerfile target stage ('-' for none)", &cfg.dockerfile_target, "-", false),
                spec("Dockerfile folder (build context)", &cfg.dockerfile_folder, ".", false),
                spec(
                    "Project ID for Container Apps (can be set via CLOUDRU_PROJECT_ID, see console.cloud.ru)",
                    &cfg.project_id,
                    "",
                    true,
                ),
                spec(
                    "Container App name (defaults to the current directory name)",
                    &cfg.containerapp_name,
                    &cfg.current_dir,
                    true,
                ),
                spec("Container port the application listens on", "", "8080", true),
                spec("Full image reference to deploy", "", "", true),
                spec("Whether the registry is publicly readable", "", "false", false),
            ],
        }
    }

    /// Resolve the effective value of `field` against the caller's
    /// `arguments` object.
    pub fn resolve(&self, field: Field, arguments: &Value) -> Result<String, ParamError> {
        let spec = &self.specs[field.index()];

        if !spec.env_value.is_empty() {
            return Ok(spec.env_value.clone());
        }

        if let Some(value) = arguments.get(field.name()).and_then(Value::as_str) {
            if !value.is_empty() {
                return Ok(value.to_string());
            }
        }

        if !spec.default.is_empty() {
            return Ok(spec.default.clone());
        }

        if !spec.required {
            return Ok(String::new());
        }

        Err(ParamError::MissingParameter {
            name: field.name().to_string(),
            description: spec.description.to_string(),
        })
    }

    /// Build the MCP input schema for a tool taking `fields`. Fields
    /// with an environment binding are omitted entirely.
    pub fn input_schema(&self, fields: &[Field]) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for &field in fields {
            let spec = &self.specs[field.index()];
            if !spec.env_value.is_empty() {
                continue;
            }

            let mut property = Map::new();
            property.insert("type".into(), json!("string"));
            property.insert("description".into(), json!(spec.description));
            if !spec.default.is_empty() {
                property.insert("default".into(), json!(spec.default));
            }
            properties.insert(field.name().to_string(), Value::Object(property));

            if spec.required && spec.default.is_empty() {
                required.push(json!(field.name()));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(cfg: Config) -> ParamTable {
        ParamTable::new(&cfg)
    }

    #[test]
    fn env_binding_wins_over_caller_argument() {
        let table = table_with(Config {
            registry_name: "env-registry".into(),
            ..Config::default()
        });
        let args = json!({"registry_name": "caller-registry"});
        let value = table.resolve(Field::RegistryName, &args).unwrap();
        assert_eq!(value, "env-registry");
    }

    #[test]
    fn caller_argument_wins_over_default() {
        let table = table_with(Config::default());
        let args = json!({"image_version": "v2"});
        assert_eq!(table.resolve(Field::ImageVersion, &args).unwrap(), "v2");
    }

    #[test]
    fn default_applies_when_caller_silent() {
        let table = table_with(Config::default());
        let args = json!({});
        assert_eq!(table.resolve(Field::ImageVersion, &args).unwrap(), "latest");
        assert_eq!(table.resolve(Field::DockerfilePath, &args).unwrap(), "Dockerfile");
    }

    #[test]
    fn current_dir_is_default_repository_name() {
        let table = table_with(Config {
            current_dir: "myapp".into(),
            ..Config::default()
        });
        assert_eq!(table.resolve(Field::RepositoryName, &json!({})).unwrap(), "myapp");
    }

    #[test]
    fn optional_field_without_default_resolves_to_empty() {
        let mut table = table_with(Config::default());
        table.specs[Field::DockerfileTarget.index()].default.clear();
        let value = table.resolve(Field::DockerfileTarget, &json!({})).unwrap();
        assert_eq!(value, "");
    }

    #[test]
    fn required_field_without_any_source_is_missing() {
        let table = table_with(Config::default());
        let err = table.resolve(Field::KeyId, &json!({})).unwrap_err();
        match err {
            ParamError::MissingParameter { name, description } => {
                assert_eq!(name, "key_id");
                assert!(description.contains("key ID"));
            }
        }
    }

    #[test]
    fn empty_caller_argument_is_ignored() {
        let table = table_with(Config::default());
        let args = json!({"key_secret": ""});
        assert!(table.resolve(Field::KeySecret, &args).is_err());
    }

    #[test]
    fn schema_omits_env_bound_fields() {
        let table = table_with(Config {
            key_id: "bound".into(),
            ..Config::default()
        });
        let schema = table.input_schema(&[Field::KeyId, Field::KeySecret]);
        let properties = schema["properties"].as_object().unwrap();
        assert!(!properties.contains_key("key_id"));
        assert!(properties.contains_key("key_secret"));
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required, &[json!("key_secret")]);
    }

    #[test]
    fn schema_carries_defaults() {
        let table = table_with(Config::default());
        let schema = table.input_schema(&[Field::ImageVersion]);
        assert_eq!(schema["properties"]["image_version"]["default"], json!("latest"));
        // A field with a default can always be resolved, so it is not
        // listed as required.
        assert!(schema["required"].as_array().unwrap().is_empty());
    }
}
