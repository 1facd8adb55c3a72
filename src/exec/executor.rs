// src/exec/executor.rs

//! Turns one [`TaskStep`] into a runtime call and the event describing how
//! it went.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::dag::ContainerGraph;
use crate::engine::{RunContext, TaskEvent, TaskStep};
use crate::fs::FileSystem;
use crate::runtime::{
    ContainerCreationRequest, ContainerRuntime, DockerContainer, DockerNetwork,
    HealthCheckResult, HealthStatus, ImageBuildRequest, ProgressCallback, RuntimeError,
};
use crate::ui::FailureSink;

const NOT_HEALTHY_IN_TIME: &str = "The configured health check did not indicate that the container was healthy within the timeout period.";

/// Executes steps against the container runtime, the filesystem and the
/// failure sink.
///
/// Every step yields exactly one completion event, success or failure.
/// Progress and temporary-file events are posted to the context while the
/// step runs and do not complete it.
pub struct StepExecutor {
    runtime: Arc<dyn ContainerRuntime>,
    fs: Arc<dyn FileSystem>,
    sink: Arc<dyn FailureSink>,
    graph: Arc<ContainerGraph>,
}

impl StepExecutor {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        fs: Arc<dyn FileSystem>,
        sink: Arc<dyn FailureSink>,
        graph: Arc<ContainerGraph>,
    ) -> Self {
        Self {
            runtime,
            fs,
            sink,
            graph,
        }
    }

    pub async fn execute(&self, step: TaskStep, context: &Arc<RunContext>) -> TaskEvent {
        match step {
            TaskStep::BuildImage {
                container,
                build_directory,
                dockerfile,
                image_tag,
            } => {
                let progress = {
                    let context = Arc::clone(context);
                    let container = container.clone();
                    progress_callback(move |progress| TaskEvent::ImageBuildProgress {
                        container: container.clone(),
                        progress,
                    }, context)
                };
                let request = ImageBuildRequest {
                    container: container.clone(),
                    build_directory,
                    dockerfile,
                    image_tag,
                };
                match self.runtime.build_image(request, progress).await {
                    Ok(image) => TaskEvent::ImageBuilt { container, image },
                    Err(e) => TaskEvent::ImageBuildFailed {
                        container,
                        message: docker_failure("Image build failed.", &e),
                    },
                }
            }

            TaskStep::PullImage { image_name } => {
                let progress = {
                    let context = Arc::clone(context);
                    let image_name = image_name.clone();
                    progress_callback(move |progress| TaskEvent::ImagePullProgress {
                        image_name: image_name.clone(),
                        progress,
                    }, context)
                };
                match self.runtime.pull_image(image_name.clone(), progress).await {
                    Ok(image) => TaskEvent::ImagePulled { image_name, image },
                    Err(e) => TaskEvent::ImagePullFailed {
                        message: docker_failure(&format!("Pulling image '{image_name}' failed."), &e),
                        image_name,
                    },
                }
            }

            TaskStep::CreateTaskNetwork => match self.runtime.create_network().await {
                Ok(network) => TaskEvent::TaskNetworkCreated { network },
                Err(e) => TaskEvent::TaskNetworkCreationFailed {
                    message: docker_failure("Creation of network failed.", &e),
                },
            },

            TaskStep::CreateContainer {
                container,
                image,
                network,
                command,
                additional_environment_variables,
                additional_port_mappings,
            } => {
                let Some(config) = self.graph.container(&container) else {
                    return TaskEvent::ContainerCreationFailed {
                        message: format!("Container '{container}' is not part of this task."),
                        container,
                    };
                };

                let mut environment = config.environment.clone();
                environment.extend(additional_environment_variables);
                let mut port_mappings = config.port_mappings.clone();
                port_mappings.extend(additional_port_mappings);

                let request = ContainerCreationRequest {
                    container: container.clone(),
                    image,
                    network,
                    command,
                    working_directory: config.working_directory.clone(),
                    environment,
                    port_mappings,
                    health_check: config.health_check.clone(),
                };

                match self.runtime.create_container(request).await {
                    Ok(created) => {
                        for path in created.temporary_files {
                            context.post_event(TaskEvent::TemporaryFileCreated {
                                container: container.clone(),
                                path,
                            });
                        }
                        TaskEvent::ContainerCreated {
                            container,
                            docker_container: created.container,
                        }
                    }
                    Err(e) => TaskEvent::ContainerCreationFailed {
                        container,
                        message: docker_failure("Creation of container failed.", &e),
                    },
                }
            }

            TaskStep::StartContainer {
                container,
                docker_container,
            } => match self.runtime.start_container(docker_container.clone()).await {
                Ok(()) => TaskEvent::ContainerStarted { container },
                Err(e) => TaskEvent::ContainerStartFailed {
                    container,
                    message: docker_failure(
                        &format!("Starting container '{docker_container}' failed."),
                        &e,
                    ),
                },
            },

            TaskStep::RunContainer {
                container,
                docker_container,
            } => match self.runtime.run_container(docker_container.clone()).await {
                Ok(exit_code) => TaskEvent::RunningContainerExited {
                    container,
                    exit_code,
                },
                Err(e) => TaskEvent::ContainerRunFailed {
                    container,
                    message: docker_failure(
                        &format!("Running container '{docker_container}' failed."),
                        &e,
                    ),
                },
            },

            TaskStep::WaitForContainerToBecomeHealthy {
                container,
                docker_container,
            } => self.wait_for_health(container, docker_container).await,

            TaskStep::StopContainer {
                container,
                docker_container,
            } => match self.runtime.stop_container(docker_container.clone()).await {
                Ok(()) => TaskEvent::ContainerStopped { container },
                Err(e) => TaskEvent::ContainerStopFailed {
                    container,
                    message: docker_failure(
                        &format!("Stopping container '{docker_container}' failed."),
                        &e,
                    ),
                },
            },

            TaskStep::RemoveContainer {
                container,
                docker_container,
            } => self.remove(container, docker_container, false).await,

            TaskStep::CleanUpContainer {
                container,
                docker_container,
            } => self.remove(container, docker_container, true).await,

            TaskStep::DeleteTemporaryFile { path } => match self.fs.delete_file(&path) {
                Ok(()) => TaskEvent::TemporaryFileDeleted { path },
                Err(e) => TaskEvent::TemporaryFileDeletionFailed {
                    path,
                    message: format!("{e:#}"),
                },
            },

            TaskStep::DeleteTaskNetwork { network } => self.delete_network(network).await,

            TaskStep::DisplayTaskFailure { message } => {
                self.sink.display_failure(&message);
                TaskEvent::TaskFailureDisplayed
            }
        }
    }

    async fn remove(
        &self,
        container: String,
        docker_container: DockerContainer,
        force: bool,
    ) -> TaskEvent {
        match self
            .runtime
            .remove_container(docker_container.clone(), force)
            .await
        {
            Ok(()) => TaskEvent::ContainerRemoved { container },
            Err(e) => TaskEvent::ContainerRemovalFailed {
                container,
                message: docker_failure(
                    &format!("Removal of container '{docker_container}' failed."),
                    &e,
                ),
            },
        }
    }

    async fn delete_network(&self, network: DockerNetwork) -> TaskEvent {
        match self.runtime.delete_network(network.clone()).await {
            Ok(()) => TaskEvent::TaskNetworkDeleted,
            Err(e) => TaskEvent::TaskNetworkDeletionFailed {
                message: docker_failure(&format!("Deletion of network '{network}' failed."), &e),
            },
        }
    }

    async fn wait_for_health(&self, container: String, docker_container: DockerContainer) -> TaskEvent {
        let status = match self.runtime.wait_for_health(docker_container.clone()).await {
            Ok(status) => status,
            Err(e) => {
                return TaskEvent::ContainerDidNotBecomeHealthy {
                    container,
                    message: health_wait_failed(&e),
                };
            }
        };
        debug!(container = %container, ?status, "health status settled");

        match status {
            HealthStatus::NoHealthCheck | HealthStatus::BecameHealthy => {
                TaskEvent::ContainerBecameHealthy { container }
            }
            HealthStatus::Exited => TaskEvent::ContainerDidNotBecomeHealthy {
                container,
                message: "The container exited before becoming healthy.".to_string(),
            },
            HealthStatus::BecameUnhealthy => {
                let message = match self.runtime.last_health_check_result(docker_container).await {
                    Ok(last) => unhealthy_message(last.as_ref()),
                    Err(e) => health_wait_failed(&e),
                };
                TaskEvent::ContainerDidNotBecomeHealthy { container, message }
            }
        }
    }
}

fn progress_callback(
    to_event: impl Fn(String) -> TaskEvent + Send + Sync + 'static,
    context: Arc<RunContext>,
) -> ProgressCallback {
    Arc::new(move |progress: String| context.post_event(to_event(progress)))
}

/// `"<what> Output from Docker was: <output>."`
fn docker_failure(what: &str, error: &RuntimeError) -> String {
    let output = error.message.trim().trim_end_matches('.');
    format!("{what} Output from Docker was: {output}.")
}

fn health_wait_failed(error: &RuntimeError) -> String {
    warn!(error = %error, "waiting for health status failed");
    format!("Waiting for the container's health status failed: {error}")
}

/// Explain an unhealthy container using the last probe that ran.
///
/// An exit code of 0 means the probe passed, but too late: usually the
/// container became healthy just after the retries ran out.
pub fn unhealthy_message(last: Option<&HealthCheckResult>) -> String {
    let Some(last) = last else {
        return NOT_HEALTHY_IN_TIME.to_string();
    };

    let output = last.output.trim();
    let detail = match (last.exit_code, output.is_empty()) {
        (0, _) => "The most recent health check exited with code 0, which usually indicates that the container became healthy just after the timeout period expired.".to_string(),
        (code, true) => format!(
            "The last health check exited with code {code} but did not produce any output."
        ),
        (code, false) => format!(
            "The last health check exited with code {code} and output:\n{output}"
        ),
    };

    format!("{NOT_HEALTHY_IN_TIME} {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_failure_does_not_double_the_full_stop() {
        assert_eq!(
            docker_failure("Image build failed.", &RuntimeError::new("disk full")),
            "Image build failed. Output from Docker was: disk full."
        );
        assert_eq!(
            docker_failure("Image build failed.", &RuntimeError::new("disk full.\n")),
            "Image build failed. Output from Docker was: disk full."
        );
    }

    #[test]
    fn unhealthy_messages() {
        let race = HealthCheckResult {
            exit_code: 0,
            output: String::new(),
        };
        assert!(unhealthy_message(Some(&race)).ends_with(
            "The most recent health check exited with code 0, which usually indicates that the container became healthy just after the timeout period expired."
        ));

        let silent = HealthCheckResult {
            exit_code: 2,
            output: "  \n".to_string(),
        };
        assert_eq!(
            unhealthy_message(Some(&silent)),
            "The configured health check did not indicate that the container was healthy within the timeout period. The last health check exited with code 2 but did not produce any output."
        );

        let noisy = HealthCheckResult {
            exit_code: 1,
            output: "connection refused\n".to_string(),
        };
        assert_eq!(
            unhealthy_message(Some(&noisy)),
            "The configured health check did not indicate that the container was healthy within the timeout period. The last health check exited with code 1 and output:\nconnection refused"
        );
    }
}
