//! Container runtime abstraction.
//!
//! `ContainerRuntime` is the single "launch isolated instance" capability
//! the environment manager builds on. `DockerRuntime` implements it on top
//! of the bollard Docker API client.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;
use tracing::debug;

use super::launch::LaunchSpec;
use crate::error::EnvironmentError;

/// Captured result of an instance that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl InstanceOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last `max_chars` characters of stderr, or stdout when stderr is empty.
    pub fn tail(&self, max_chars: usize) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let count = source.chars().count();
        source.chars().skip(count.saturating_sub(max_chars)).collect()
    }
}

/// Minimal container operations needed to run task environments.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Checks that the runtime daemon answers.
    async fn ping(&self) -> Result<(), EnvironmentError>;

    /// Whether the image is available locally.
    async fn image_present(&self, image: &str) -> Result<bool, EnvironmentError>;

    async fn pull_image(&self, image: &str, platform: Option<&str>)
        -> Result<(), EnvironmentError>;

    /// Runs an instance to completion and returns its output. The instance
    /// is removed afterwards. Timeouts are enforced by the caller.
    async fn run(&self, spec: &LaunchSpec) -> Result<InstanceOutput, EnvironmentError>;

    /// Force-removes an instance by name. Removing a missing instance succeeds.
    async fn remove(&self, name: &str) -> Result<(), EnvironmentError>;
}

/// Docker-backed runtime.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects to the local Docker daemon.
    pub fn connect() -> Result<Self, EnvironmentError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| EnvironmentError::DaemonUnavailable(format!("Failed to connect: {e}")))?;
        Ok(Self { docker })
    }

    pub fn from_docker(docker: Docker) -> Self {
        Self { docker }
    }

    async fn collect_logs(&self, name: &str) -> Result<(String, String), EnvironmentError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            timestamps: false,
            ..Default::default()
        };

        let mut logs = self.docker.logs(name, Some(options));
        let mut stdout = String::new();
        let mut stderr = String::new();

        while let Some(chunk) = logs.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                    stdout.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(LogOutput::StdErr { message }) => {
                    stderr.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(EnvironmentError::Launch {
                        name: name.to_string(),
                        reason: format!("Error reading logs: {e}"),
                    });
                }
            }
        }

        Ok((stdout, stderr))
    }

    async fn wait(&self, name: &str) -> Result<i64, EnvironmentError> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut stream = self.docker.wait_container(name, Some(options));

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports non-zero exits as an error carrying the code
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(EnvironmentError::Launch {
                name: name.to_string(),
                reason: format!("Error waiting for container: {e}"),
            }),
            None => Err(EnvironmentError::Launch {
                name: name.to_string(),
                reason: "Container wait stream ended without a status".to_string(),
            }),
        }
    }
}

fn is_not_found(e: &BollardError) -> bool {
    matches!(
        e,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<(), EnvironmentError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| EnvironmentError::DaemonUnavailable(e.to_string()))
    }

    async fn image_present(&self, image: &str) -> Result<bool, EnvironmentError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(EnvironmentError::DaemonUnavailable(e.to_string())),
        }
    }

    async fn pull_image(
        &self,
        image: &str,
        platform: Option<&str>,
    ) -> Result<(), EnvironmentError> {
        let options = CreateImageOptions {
            from_image: image,
            platform: platform.unwrap_or_default(),
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            result.map_err(|e| EnvironmentError::ImagePull {
                image: image.to_string(),
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }

    async fn run(&self, spec: &LaunchSpec) -> Result<InstanceOutput, EnvironmentError> {
        let launch_error = |reason: String| EnvironmentError::Launch {
            name: spec.name.clone(),
            reason,
        };

        let binds = spec.binds();
        let extra_hosts = spec.extra_hosts();
        let env = spec.env_list();

        let host_config = HostConfig {
            network_mode: Some(spec.network.to_string()),
            binds: (!binds.is_empty()).then_some(binds),
            extra_hosts: (!extra_hosts.is_empty()).then_some(extra_hosts),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: (!spec.command.is_empty()).then(|| spec.command.clone()),
            env: (!env.is_empty()).then_some(env),
            host_config: Some(host_config),
            tty: Some(false),
            attach_stdin: Some(false),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: spec.platform.clone(),
        };

        debug!(args = ?spec.docker_run_args(), "Launching instance");

        self.docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| launch_error(format!("Failed to create container: {e}")))?;

        let outcome = async {
            self.docker
                .start_container(&spec.name, None::<StartContainerOptions<String>>)
                .await
                .map_err(|e| launch_error(format!("Failed to start container: {e}")))?;

            let exit_code = self.wait(&spec.name).await?;
            let (stdout, stderr) = self.collect_logs(&spec.name).await?;
            Ok::<_, EnvironmentError>(InstanceOutput {
                exit_code,
                stdout,
                stderr,
            })
        }
        .await;

        if let Err(e) = self.remove(&spec.name).await {
            debug!(name = %spec.name, error = %e, "Failed to remove finished instance");
        }

        outcome
    }

    async fn remove(&self, name: &str) -> Result<(), EnvironmentError> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };

        match self.docker.remove_container(name, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(EnvironmentError::Launch {
                name: name.to_string(),
                reason: format!("Failed to remove container: {e}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_output_tail_prefers_stderr() {
        let output = InstanceOutput {
            exit_code: 1,
            stdout: "progress".to_string(),
            stderr: "Traceback: boom".to_string(),
        };
        assert_eq!(output.tail(4), "boom");
        assert!(!output.is_success());
    }

    #[test]
    fn test_instance_output_tail_falls_back_to_stdout() {
        let output = InstanceOutput::success("=== Evaluation completed ===");
        assert_eq!(output.tail(100), "=== Evaluation completed ===");
        assert!(output.is_success());
    }

    #[tokio::test]
    #[ignore] // Requires a running Docker daemon
    async fn test_docker_runtime_runs_instance() {
        let runtime = DockerRuntime::connect().expect("docker");
        runtime.ping().await.expect("ping");
        if !runtime.image_present("alpine:3.19").await.expect("inspect") {
            runtime.pull_image("alpine:3.19", None).await.expect("pull");
        }

        let spec = LaunchSpec::new("tac_runtime_smoke", "alpine:3.19")
            .with_command(["sh", "-c", "echo hello; exit 3"]);
        let output = runtime.run(&spec).await.expect("run");

        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout.trim(), "hello");
        runtime.remove("tac_runtime_smoke").await.expect("idempotent remove");
    }
}
