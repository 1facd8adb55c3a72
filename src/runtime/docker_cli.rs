// src/runtime/docker_cli.rs

//! [`ContainerRuntime`] backed by the `docker` command-line client.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::fs::FileSystem;
use crate::runtime::{
    ContainerCreationRequest, ContainerRuntime, CreatedContainer, DockerContainer, DockerImage,
    DockerNetwork, HealthCheckResult, HealthStatus, ImageBuildRequest, ProgressCallback,
    RuntimeError, RuntimeFuture, RuntimeResult,
};

const DEFAULT_HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct DockerCliRuntime {
    docker: String,
    project_name: String,
    fs: Arc<dyn FileSystem>,
    health_poll_interval: Duration,
}

impl DockerCliRuntime {
    pub fn new(project_name: impl Into<String>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            docker: "docker".to_string(),
            project_name: project_name.into(),
            fs,
            health_poll_interval: DEFAULT_HEALTH_POLL_INTERVAL,
        }
    }

    fn command(&self, args: &[String]) -> Command {
        debug!(docker = %self.docker, ?args, "invoking docker");
        let mut cmd = Command::new(&self.docker);
        cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    fn spawn_failed(&self, e: std::io::Error) -> RuntimeError {
        RuntimeError::new(format!("could not run '{}': {e}", self.docker))
    }

    /// Run docker to completion; stdout on success, the error output otherwise.
    async fn docker(&self, args: &[String]) -> RuntimeResult<String> {
        let output = self
            .command(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| self.spawn_failed(e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(RuntimeError::new(if stderr.is_empty() { stdout } else { stderr }))
    }

    /// Run docker, reporting every output line as progress. On failure the
    /// error carries the full output.
    async fn docker_with_progress(
        &self,
        args: &[String],
        on_progress: ProgressCallback,
    ) -> RuntimeResult<()> {
        let mut child = self
            .command(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_failed(e))?;

        let (stdout, stderr) = tokio::join!(
            read_lines(child.stdout.take(), Arc::clone(&on_progress)),
            read_lines(child.stderr.take(), on_progress),
        );

        let status = child.wait().await.map_err(|e| self.spawn_failed(e))?;
        if status.success() {
            Ok(())
        } else {
            let mut output = stdout;
            output.extend(stderr);
            Err(RuntimeError::new(output.join("\n")))
        }
    }

    async fn inspect<T: for<'de> Deserialize<'de>>(
        &self,
        container: &DockerContainer,
        template: &str,
    ) -> RuntimeResult<T> {
        let raw = self
            .docker(&args(["inspect", "--format", template, container.id()]))
            .await?;
        serde_json::from_str(&raw).map_err(|e| {
            RuntimeError::new(format!(
                "could not understand output of docker inspect for container '{container}': {e}"
            ))
        })
    }

    fn write_env_file(&self, request: &ContainerCreationRequest) -> RuntimeResult<PathBuf> {
        let path = self.fs.temp_dir().join(format!(
            "dockdag-{}-{}-{}.env",
            self.project_name,
            request.container,
            Uuid::new_v4()
        ));
        let contents: String = request
            .environment
            .iter()
            .map(|(k, v)| format!("{k}={v}\n"))
            .collect();
        self.fs
            .write(&path, contents.as_bytes())
            .map_err(|e| RuntimeError::new(format!("could not write environment file: {e:#}")))?;
        Ok(path)
    }

    fn discard_env_file(&self, path: &Path) {
        if let Err(e) = self.fs.delete_file(path) {
            warn!(path = %path.display(), error = %e, "could not delete environment file");
        }
    }
}

impl ContainerRuntime for DockerCliRuntime {
    fn build_image(
        &self,
        request: ImageBuildRequest,
        on_progress: ProgressCallback,
    ) -> RuntimeFuture<'_, DockerImage> {
        Box::pin(async move {
            info!(container = %request.container, tag = %request.image_tag, "building image");
            let dockerfile = request.build_directory.join(&request.dockerfile);
            self.docker_with_progress(
                &[
                    "build".to_string(),
                    "--tag".to_string(),
                    request.image_tag.clone(),
                    "--file".to_string(),
                    dockerfile.display().to_string(),
                    request.build_directory.display().to_string(),
                ],
                on_progress,
            )
            .await?;

            let id = self
                .docker(&args(["image", "inspect", "--format", "{{.Id}}", &request.image_tag]))
                .await?;
            Ok(DockerImage::new(id))
        })
    }

    fn pull_image(
        &self,
        image_name: String,
        on_progress: ProgressCallback,
    ) -> RuntimeFuture<'_, DockerImage> {
        Box::pin(async move {
            info!(image = %image_name, "pulling image");
            self.docker_with_progress(&args(["pull", &image_name]), on_progress)
                .await?;
            Ok(DockerImage::new(image_name))
        })
    }

    fn create_network(&self) -> RuntimeFuture<'_, DockerNetwork> {
        Box::pin(async move {
            let name = format!("{}-{}", self.project_name, Uuid::new_v4());
            let id = self
                .docker(&args(["network", "create", "--driver", "bridge", &name]))
                .await?;
            info!(network = %name, "task network created");
            Ok(DockerNetwork::new(id))
        })
    }

    fn create_container(
        &self,
        request: ContainerCreationRequest,
    ) -> RuntimeFuture<'_, CreatedContainer> {
        Box::pin(async move {
            let env_file = self.write_env_file(&request)?;
            let create_args = create_args(&self.project_name, &request, &env_file);

            match self.docker(&create_args).await {
                Ok(id) => Ok(CreatedContainer {
                    container: DockerContainer::new(id),
                    temporary_files: vec![env_file],
                }),
                Err(e) => {
                    self.discard_env_file(&env_file);
                    Err(e)
                }
            }
        })
    }

    fn start_container(&self, container: DockerContainer) -> RuntimeFuture<'_, ()> {
        Box::pin(async move {
            self.docker(&args(["start", container.id()])).await?;
            Ok(())
        })
    }

    fn run_container(&self, container: DockerContainer) -> RuntimeFuture<'_, i64> {
        Box::pin(async move {
            // Attached: the container's output goes straight to the terminal.
            let status = self
                .command(&args(["start", "--attach", container.id()]))
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .await
                .map_err(|e| self.spawn_failed(e))?;

            status.code().map(i64::from).ok_or_else(|| {
                RuntimeError::new(format!("'{}' was terminated by a signal", self.docker))
            })
        })
    }

    fn stop_container(&self, container: DockerContainer) -> RuntimeFuture<'_, ()> {
        Box::pin(async move {
            self.docker(&args(["stop", container.id()])).await?;
            Ok(())
        })
    }

    fn remove_container(
        &self,
        container: DockerContainer,
        force: bool,
    ) -> RuntimeFuture<'_, ()> {
        Box::pin(async move {
            let mut rm = args(["rm", "--volumes"]);
            if force {
                rm.push("--force".to_string());
            }
            rm.push(container.id().to_string());
            self.docker(&rm).await?;
            Ok(())
        })
    }

    fn wait_for_health(&self, container: DockerContainer) -> RuntimeFuture<'_, HealthStatus> {
        Box::pin(async move {
            let config: Option<InspectHealthConfig> = self
                .inspect(&container, "{{json .Config.Healthcheck}}")
                .await?;
            if !config.is_some_and(|c| c.is_enabled()) {
                return Ok(HealthStatus::NoHealthCheck);
            }

            loop {
                let state: InspectState = self.inspect(&container, "{{json .State}}").await?;
                if let Some(status) = state.health_status() {
                    return Ok(status);
                }
                tokio::time::sleep(self.health_poll_interval).await;
            }
        })
    }

    fn last_health_check_result(
        &self,
        container: DockerContainer,
    ) -> RuntimeFuture<'_, Option<HealthCheckResult>> {
        Box::pin(async move {
            let health: Option<InspectHealth> =
                self.inspect(&container, "{{json .State.Health}}").await?;
            Ok(health.and_then(InspectHealth::last_result))
        })
    }

    fn delete_network(&self, network: DockerNetwork) -> RuntimeFuture<'_, ()> {
        Box::pin(async move {
            self.docker(&args(["network", "rm", network.id()])).await?;
            Ok(())
        })
    }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

async fn read_lines<R>(reader: Option<R>, on_progress: ProgressCallback) -> Vec<String>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Vec::new();
    };

    let mut collected = Vec::new();
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        on_progress(line.clone());
        collected.push(line);
    }
    collected
}

/// Arguments for `docker create`.
fn create_args(project_name: &str, request: &ContainerCreationRequest, env_file: &Path) -> Vec<String> {
    let mut out = args(["create", "--network"]);
    out.push(request.network.id().to_string());
    out.extend(args(["--network-alias", &request.container, "--hostname", &request.container]));
    out.extend(args(["--label", &format!("dockdag.project={project_name}")]));
    out.extend(args(["--env-file", &env_file.display().to_string()]));

    if let Some(dir) = &request.working_directory {
        out.extend(args(["--workdir", dir]));
    }
    for mapping in &request.port_mappings {
        out.extend(args(["--publish", &mapping.to_string()]));
    }

    let health = &request.health_check;
    if let Some(command) = &health.command {
        out.extend(args(["--health-cmd", command]));
    }
    if let Some(interval) = health.interval {
        out.extend(args(["--health-interval", &go_duration(interval)]));
    }
    if let Some(retries) = health.retries {
        out.extend(args(["--health-retries", &retries.to_string()]));
    }
    if let Some(start_period) = health.start_period {
        out.extend(args(["--health-start-period", &go_duration(start_period)]));
    }
    if let Some(timeout) = health.timeout {
        out.extend(args(["--health-timeout", &go_duration(timeout)]));
    }

    out.push(request.image.id().to_string());
    if let Some(command) = &request.command {
        out.extend(command.iter().cloned());
    }
    out
}

fn go_duration(d: Duration) -> String {
    format!("{}ms", d.as_millis())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectHealthConfig {
    #[serde(default)]
    test: Vec<String>,
}

impl InspectHealthConfig {
    fn is_enabled(&self) -> bool {
        self.test.first().is_some_and(|t| t != "NONE")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    status: String,
    #[serde(default)]
    health: Option<InspectHealth>,
}

impl InspectState {
    /// `None` while the container is still starting up.
    fn health_status(&self) -> Option<HealthStatus> {
        if matches!(self.status.as_str(), "exited" | "dead") {
            return Some(HealthStatus::Exited);
        }
        match self.health.as_ref().map(|h| h.status.as_str()) {
            Some("healthy") => Some(HealthStatus::BecameHealthy),
            Some("unhealthy") => Some(HealthStatus::BecameUnhealthy),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectHealth {
    status: String,
    #[serde(default)]
    log: Option<Vec<InspectHealthLog>>,
}

impl InspectHealth {
    fn last_result(self) -> Option<HealthCheckResult> {
        self.log?.pop().map(|entry| HealthCheckResult {
            exit_code: entry.exit_code,
            output: entry.output,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectHealthLog {
    exit_code: i64,
    #[serde(default)]
    output: String,
}
