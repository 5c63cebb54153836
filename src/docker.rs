//! Docker build/push orchestration against the Cloud.ru Artifact
//! Registry, shelling out to the local `docker` CLI.
//!
//! The flow is build, push, and on a failed push a single
//! re-login-and-retry. The registry secret is fed to `docker login`
//! over stdin (`--password-stdin`), never as a command-line argument.

use std::process::Stdio;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::cloud_api::Credentials;

const REGISTRY_DOMAIN: &str = "cr.cloud.ru";

const LOGIN_HELP: &str = "\n\nPlease ensure:\n\
    1. The registry exists in Cloud.ru Evolution Artifact Registry\n\
    2. You have created a registry and obtained access keys\n\
    3. See documentation: https://cloud.ru/docs/container-apps-evolution/ug/topics/tutorials__before-work";

const PUSH_HELP: &str = "\n\nTo resolve this issue:\n\
    1. Set CLOUDRU_KEY_ID and CLOUDRU_KEY_SECRET environment variables\n\
    2. Or run the cloudru_docker_login function\n\
    3. See documentation: https://cloud.ru/docs/container-apps-evolution/ug/topics/tutorials__before-work";

#[derive(Debug, Error)]
pub enum DockerError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("docker login failed: {output}{LOGIN_HELP}")]
    LoginFailed { output: String },
    #[error("failed to build Docker image: {output}")]
    BuildFailed { output: String },
    #[error("docker push failed: {output}{PUSH_HELP}")]
    PushFailed { output: String },
    #[error("docker push failed and re-login unsuccessful: {login_error}\nPush output: {output}{PUSH_HELP}")]
    ReloginFailed {
        login_error: String,
        output: String,
    },
}

/// A Docker image to be built and pushed.
#[derive(Debug, Clone)]
pub struct DockerImage {
    pub registry_name: String,
    pub repository_name: String,
    pub image_version: String,
    pub dockerfile_path: String,
    pub dockerfile_target: String,
    pub dockerfile_folder: String,
}

impl DockerImage {
    /// Full tag of the image inside the Cloud.ru registry,
    /// `<registry>.cr.cloud.ru/<repository>:<version>`.
    pub fn image_tag(&self) -> String {
        format!(
            "{}.{}/{}:{}",
            self.registry_name, REGISTRY_DOMAIN, self.repository_name, self.image_version
        )
    }
}

/// Runs docker CLI commands. The program name is configurable so tests
/// can substitute a stub executable.
pub struct DockerCli {
    program: String,
}

impl DockerCli {
    pub fn new() -> Self {
        Self::with_program("docker")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run the docker CLI with `args`, returning (success, combined output).
    async fn run(&self, args: &[&str]) -> Result<(bool, String), DockerError> {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|source| DockerError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        Ok((output.status.success(), combined_output(&output)))
    }

    /// Log into the Cloud.ru Docker registry.
    ///
    /// The secret is written to the child's stdin on a spawned task
    /// which closes the pipe when done; the parent waits for the exit
    /// status only after the writer is running, so a full pipe buffer
    /// can never deadlock the exchange.
    pub async fn login(&self, registry_name: &str, credentials: &Credentials) -> Result<(), DockerError> {
        let login_target = format!("{registry_name}.{REGISTRY_DOMAIN}");
        let mut child = Command::new(&self.program)
            .args(["login", &login_target, "--username", &credentials.key_id, "--password-stdin"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| DockerError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| DockerError::Spawn {
            program: self.program.clone(),
            source: std::io::Error::other("child stdin unavailable"),
        })?;
        let secret = credentials.key_secret.clone();
        let writer = tokio::spawn(async move {
            stdin.write_all(secret.as_bytes()).await?;
            stdin.shutdown().await?;
            Ok::<(), std::io::Error>(())
            // stdin drops here, closing the pipe
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| DockerError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        // Join the writer before inspecting the exit status. A write
        // error just means the child exited early; the exit status is
        // the authoritative outcome.
        let _ = writer.await;

        if !output.status.success() {
            return Err(DockerError::LoginFailed {
                output: combined_output(&output),
            });
        }
        Ok(())
    }

    /// Build the image and push it to the registry, re-logging-in and
    /// retrying the push exactly once on failure. Returns the pushed
    /// image tag.
    pub async fn build_and_push(
        &self,
        image: &DockerImage,
        credentials: &Credentials,
    ) -> Result<String, DockerError> {
        let image_tag = image.image_tag();

        let mut build_args = vec![
            "build",
            "--platform",
            "linux/amd64",
            "-t",
            image_tag.as_str(),
            "-f",
            image.dockerfile_path.as_str(),
        ];
        // "-" is the no-target sentinel
        if !image.dockerfile_target.is_empty() && image.dockerfile_target != "-" {
            build_args.extend(["--target", image.dockerfile_target.as_str()]);
        }
        build_args.push(image.dockerfile_folder.as_str());

        let (built, build_output) = self.run(&build_args).await?;
        if !built {
            return Err(DockerError::BuildFailed {
                output: build_output,
            });
        }

        let (pushed, push_output) = self.run(&["push", image_tag.as_str()]).await?;
        if pushed {
            return Ok(image_tag);
        }

        if credentials.key_id.is_empty() && credentials.key_secret.is_empty() {
            return Err(DockerError::PushFailed {
                output: push_output,
            });
        }

        // Best-effort recovery: refresh the login and push once more.
        if let Err(login_err) = self.login(&image.registry_name, credentials).await {
            return Err(DockerError::ReloginFailed {
                login_error: login_err.to_string(),
                output: push_output,
            });
        }

        let (pushed, push_output) = self.run(&["push", image_tag.as_str()]).await?;
        if !pushed {
            return Err(DockerError::PushFailed {
                output: push_output,
            });
        }
        Ok(image_tag)
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

fn combined_output(output: &std::process::Output) -> String {
    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_image() -> DockerImage {
        DockerImage {
            registry_name: "reg".into(),
            repository_name: "app".into(),
            image_version: "v1".into(),
            dockerfile_path: "Dockerfile".into(),
            dockerfile_target: "-".into(),
            dockerfile_folder: ".".into(),
        }
    }

    #[test]
    fn image_tag_round_trips_its_components() {
        let image = sample_image();
        let tag = image.image_tag();
        assert_eq!(tag, "reg.cr.cloud.ru/app:v1");

        let (host, rest) = tag.split_once('/').unwrap();
        let (repository, version) = rest.split_once(':').unwrap();
        let registry = host.strip_suffix(".cr.cloud.ru").unwrap();
        assert_eq!(registry, image.registry_name);
        assert_eq!(repository, image.repository_name);
        assert_eq!(version, image.image_version);
    }

    #[cfg(unix)]
    mod stub_cli {
        use super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        /// Write an executable stub named `docker` into `dir`. The stub
        /// appends its subcommand to `calls.log` and runs `body`.
        fn write_stub(dir: &std::path::Path, body: &str) -> String {
            let path = dir.join("docker");
            let script = format!(
                "#!/bin/sh\necho \"$1\" >> \"{}/calls.log\"\n{}\n",
                dir.display(),
                body
            );
            fs::write(&path, script).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path.to_str().unwrap().to_string()
        }

        fn calls(dir: &std::path::Path) -> Vec<String> {
            fs::read_to_string(dir.join("calls.log"))
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect()
        }

        fn creds() -> Credentials {
            Credentials {
                registry_name: "reg".into(),
                key_id: "kid".into(),
                key_secret: "sekret".into(),
            }
        }

        #[tokio::test]
        async fn push_retry_after_relogin_returns_the_tag() {
            let dir = tempfile::tempdir().unwrap();
            // First push fails, later pushes succeed; everything else
            // succeeds. Login must see the secret on stdin.
            let body = r#"
case "$1" in
  push)
    if [ ! -f "$(dirname "$0")/pushed-once" ]; then
      touch "$(dirname "$0")/pushed-once"
      echo "denied: access token expired" >&2
      exit 1
    fi
    exit 0
    ;;
  login)
    read -r secret
    [ "$secret" = "sekret" ] || exit 1
    exit 0
    ;;
  *)
    exit 0
    ;;
esac"#;
            let program = write_stub(dir.path(), body);
            let cli = DockerCli::with_program(program);

            let tag = cli.build_and_push(&sample_image(), &creds()).await.unwrap();
            assert_eq!(tag, "reg.cr.cloud.ru/app:v1");
            assert_eq!(calls(dir.path()), ["build", "push", "login", "push"]);
        }

        #[tokio::test]
        async fn build_failure_is_fatal_and_push_is_never_attempted() {
            let dir = tempfile::tempdir().unwrap();
            let body = r#"
if [ "$1" = "build" ]; then
  echo "syntax error in Dockerfile" >&2
  exit 1
fi
exit 0"#;
            let program = write_stub(dir.path(), body);
            let cli = DockerCli::with_program(program);

            let err = cli.build_and_push(&sample_image(), &creds()).await.unwrap_err();
            match err {
                DockerError::BuildFailed { output } => {
                    assert!(output.contains("syntax error"));
                }
                other => panic!("expected BuildFailed, got {other:?}"),
            }
            assert_eq!(calls(dir.path()), ["build"]);
        }

        #[tokio::test]
        async fn push_failure_without_credentials_is_not_retried() {
            let dir = tempfile::tempdir().unwrap();
            let body = r#"
if [ "$1" = "push" ]; then
  echo "denied" >&2
  exit 1
fi
exit 0"#;
            let program = write_stub(dir.path(), body);
            let cli = DockerCli::with_program(program);

            let no_creds = Credentials::default();
            let err = cli.build_and_push(&sample_image(), &no_creds).await.unwrap_err();
            assert!(matches!(err, DockerError::PushFailed { .. }));
            assert_eq!(calls(dir.path()), ["build", "push"]);
        }

        #[tokio::test]
        async fn second_push_failure_is_terminal() {
            let dir = tempfile::tempdir().unwrap();
            let body = r#"
if [ "$1" = "push" ]; then
  echo "denied" >&2
  exit 1
fi
if [ "$1" = "login" ]; then
  read -r _secret
fi
exit 0"#;
            let program = write_stub(dir.path(), body);
            let cli = DockerCli::with_program(program);

            let err = cli.build_and_push(&sample_image(), &creds()).await.unwrap_err();
            match err {
                DockerError::PushFailed { output } => assert!(output.contains("denied")),
                other => panic!("expected PushFailed, got {other:?}"),
            }
            assert_eq!(calls(dir.path()), ["build", "push", "login", "push"]);
        }

        #[tokio::test]
        async fn login_feeds_the_secret_over_stdin() {
            let dir = tempfile::tempdir().unwrap();
            let body = r#"
if [ "$1" = "login" ]; then
  read -r secret
  echo "$secret" > "$(dirname "$0")/seen-secret"
  for arg in "$@"; do
    [ "$arg" = "sekret" ] && exit 9
  done
  exit 0
fi
exit 0"#;
            let program = write_stub(dir.path(), body);
            let cli = DockerCli::with_program(program);

            cli.login("reg", &creds()).await.unwrap();
            let seen = std::fs::read_to_string(dir.path().join("seen-secret")).unwrap();
            assert_eq!(seen.trim(), "sekret");
        }

        #[tokio::test]
        async fn login_failure_includes_the_cli_output() {
            let dir = tempfile::tempdir().unwrap();
            let body = r#"
if [ "$1" = "login" ]; then
  read -r _secret
  echo "unauthorized: incorrect username" >&2
  exit 1
fi
exit 0"#;
            let program = write_stub(dir.path(), body);
            let cli = DockerCli::with_program(program);

            let err = cli.login("reg", &creds()).await.unwrap_err();
            match err {
                DockerError::LoginFailed { output } => {
                    assert!(output.contains("unauthorized"));
                }
                other => panic!("expected LoginFailed, got {other:?}"),
            }
        }
    }
}
