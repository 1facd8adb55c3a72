// src/engine/handlers.rs

//! Event handlers: what a run does next after each event.
//!
//! Handlers take the event that was just appended and the run state. They
//! read past events and steps, then enqueue or remove steps. They keep no
//! state of their own, so everything they decide can be reproduced from the
//! event log.
//!
//! The run state never deduplicates steps itself; the handlers below skip
//! creating, starting, stopping and cleaning up a container, and deleting the
//! network, when a step for the same target already exists.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, error, info, warn};

use crate::config::model::ImageSource;
use crate::engine::core::RunState;
use crate::engine::events::{TaskEvent, TaskEventKind};
use crate::engine::messages;
use crate::engine::steps::{TaskStep, TaskStepKind};
use crate::engine::ContainerName;
use crate::runtime::{DockerContainer, DockerImage, DockerNetwork};
use crate::types::BehaviourAfterFailure;

/// Step kinds that start new work, dropped as soon as a run fails before the
/// task container has exited.
const NEW_WORK_STEPS: [TaskStepKind; 7] = [
    TaskStepKind::BuildImage,
    TaskStepKind::PullImage,
    TaskStepKind::CreateContainer,
    TaskStepKind::CreateTaskNetwork,
    TaskStepKind::StartContainer,
    TaskStepKind::RunContainer,
    TaskStepKind::WaitForContainerToBecomeHealthy,
];

/// Apply the handler for `event`, which has already been appended to the log.
pub fn apply(event: &TaskEvent, ctx: &mut RunState) {
    match event {
        TaskEvent::TaskStarted => handle_task_started(ctx),
        TaskEvent::TaskNetworkCreated { network } => handle_task_network_created(ctx, network),
        TaskEvent::ImageBuilt { container, image } => handle_image_built(ctx, container, image),
        TaskEvent::ImagePulled { image_name, image } => {
            handle_image_pulled(ctx, image_name, image)
        }
        TaskEvent::ContainerCreated {
            container,
            docker_container,
        } => handle_container_created(ctx, container, docker_container),
        TaskEvent::ContainerStarted { container } => handle_container_started(ctx, container),
        TaskEvent::ContainerBecameHealthy { container } => {
            handle_container_became_healthy(ctx, container)
        }
        TaskEvent::RunningContainerExited {
            container,
            exit_code,
        } => handle_running_container_exited(ctx, container, *exit_code),
        TaskEvent::ContainerStopped { container } => handle_container_stopped(ctx, container),
        TaskEvent::ContainerRemoved { container } => handle_container_removed(ctx, container),

        TaskEvent::ContainerDidNotBecomeHealthy { .. } => {
            if task_exit_code(ctx).is_some() {
                handle_post_run_failure(ctx, event)
            } else {
                handle_pre_run_failure(ctx, event)
            }
        }
        TaskEvent::ImageBuildFailed { .. }
        | TaskEvent::ImagePullFailed { .. }
        | TaskEvent::TaskNetworkCreationFailed { .. }
        | TaskEvent::ContainerCreationFailed { .. }
        | TaskEvent::ContainerStartFailed { .. }
        | TaskEvent::ContainerRunFailed { .. }
        | TaskEvent::UserInterruptedExecution
        | TaskEvent::ExecutionFailed { .. } => handle_pre_run_failure(ctx, event),

        TaskEvent::ContainerStopFailed { .. } | TaskEvent::ContainerRemovalFailed { .. } => {
            handle_post_run_failure(ctx, event)
        }
        TaskEvent::TaskNetworkDeletionFailed { message } => {
            handle_network_deletion_failed(ctx, message)
        }
        TaskEvent::TemporaryFileDeletionFailed { path, message } => {
            warn!(path = %path.display(), %message, "could not delete temporary file");
        }

        TaskEvent::ImageBuildProgress {
            container,
            progress,
        } => debug!(container = %container, %progress, "image build progress"),
        TaskEvent::ImagePullProgress {
            image_name,
            progress,
        } => debug!(image = %image_name, %progress, "image pull progress"),
        TaskEvent::TemporaryFileCreated { container, path } => {
            debug!(container = %container, path = %path.display(), "temporary file created")
        }
        TaskEvent::TemporaryFileDeleted { path } => {
            debug!(path = %path.display(), "temporary file deleted")
        }
        TaskEvent::TaskNetworkDeleted => info!("task network deleted"),
        TaskEvent::TaskFailureDisplayed => debug!("task failure displayed"),
    }
}

fn handle_task_started(ctx: &mut RunState) {
    if ctx.is_aborting() {
        info!("task aborted before it started; nothing to do");
        return;
    }

    ctx.queue_step(TaskStep::CreateTaskNetwork);

    let project_name = ctx.project_name().to_string();
    let mut images_to_pull = BTreeSet::new();
    for container in ctx.all_task_containers() {
        match container.image_source {
            ImageSource::Build {
                build_directory,
                dockerfile,
            } => {
                ctx.queue_step(TaskStep::BuildImage {
                    image_tag: format!("{project_name}-{}", container.name),
                    container: container.name,
                    build_directory,
                    dockerfile,
                });
            }
            ImageSource::Pull { image_name } => {
                images_to_pull.insert(image_name);
            }
        }
    }

    for image_name in images_to_pull {
        ctx.queue_step(TaskStep::PullImage { image_name });
    }
}

fn handle_task_network_created(ctx: &mut RunState, network: &DockerNetwork) {
    if ctx.is_aborting() {
        info!(network = %network, "network created after the task failed; deleting it");
        queue_network_deletion(ctx, network.clone());
        return;
    }

    for (container, image) in images_ready(ctx) {
        queue_create_container(ctx, &container, image, network.clone());
    }
}

fn handle_image_built(ctx: &mut RunState, container: &str, image: &DockerImage) {
    if ctx.is_aborting() {
        debug!(container = %container, "image built after the task failed; ignoring");
        return;
    }

    match task_network(ctx) {
        Some(network) => queue_create_container(ctx, container, image.clone(), network),
        None => debug!(container = %container, "image built before the network; creation deferred"),
    }
}

fn handle_image_pulled(ctx: &mut RunState, image_name: &str, image: &DockerImage) {
    if ctx.is_aborting() {
        debug!(image = %image_name, "image pulled after the task failed; ignoring");
        return;
    }

    let Some(network) = task_network(ctx) else {
        debug!(image = %image_name, "image pulled before the network; creation deferred");
        return;
    };

    let users: Vec<ContainerName> = ctx
        .all_task_containers()
        .into_iter()
        .filter(|c| matches!(&c.image_source, ImageSource::Pull { image_name: n } if n == image_name))
        .map(|c| c.name)
        .collect();
    for container in users {
        queue_create_container(ctx, &container, image.clone(), network.clone());
    }
}

fn handle_container_created(ctx: &mut RunState, container: &str, docker_container: &DockerContainer) {
    if ctx.is_aborting() {
        match ctx.behaviour_after_failure() {
            BehaviourAfterFailure::Cleanup => {
                info!(container = %container, "container created after the task failed; cleaning it up");
                queue_clean_up(ctx, container, docker_container.clone());
            }
            BehaviourAfterFailure::DontCleanup => {
                let network = task_network(ctx);
                queue_failure_display(
                    ctx,
                    messages::created_after_abort(container, docker_container, network.as_ref()),
                );
            }
        }
        return;
    }

    let healthy = containers_with_event(ctx, TaskEventKind::ContainerBecameHealthy);
    let waiting_on: Vec<String> = ctx
        .dependencies_of(container)
        .into_iter()
        .filter(|d| !healthy.contains(d))
        .collect();

    if waiting_on.is_empty() {
        queue_start_or_run(ctx, container, docker_container.clone());
    } else {
        debug!(container = %container, ?waiting_on, "container created; waiting for dependencies");
    }
}

fn handle_container_started(ctx: &mut RunState, container: &str) {
    if ctx.is_aborting() {
        debug!(container = %container, "container started after the task failed; not waiting for it");
        return;
    }

    match docker_container_for(ctx, container) {
        Some(docker_container) => {
            ctx.queue_step(TaskStep::WaitForContainerToBecomeHealthy {
                container: container.to_string(),
                docker_container,
            });
        }
        None => warn!(container = %container, "started container was never created"),
    }
}

fn handle_container_became_healthy(ctx: &mut RunState, container: &str) {
    if ctx.is_aborting() {
        debug!(container = %container, "container became healthy after the task failed; ignoring");
        return;
    }

    let created: BTreeMap<ContainerName, DockerContainer> =
        created_containers(ctx).into_iter().collect();
    let healthy = containers_with_event(ctx, TaskEventKind::ContainerBecameHealthy);

    for dependent in ctx.containers_that_depend_on(container) {
        let Some(docker_container) = created.get(&dependent) else {
            continue;
        };
        let ready = ctx
            .dependencies_of(&dependent)
            .iter()
            .all(|d| healthy.contains(d));
        if ready {
            queue_start_or_run(ctx, &dependent, docker_container.clone());
        }
    }
}

fn handle_running_container_exited(ctx: &mut RunState, container: &str, exit_code: i64) {
    info!(container = %container, exit_code, "task container exited");

    if ctx.is_aborting() {
        debug!(container = %container, "task already failed; clean up is under way");
        return;
    }

    match docker_container_for(ctx, container) {
        Some(docker_container) => {
            ctx.queue_step(TaskStep::RemoveContainer {
                container: container.to_string(),
                docker_container,
            });
        }
        None => warn!(container = %container, "exited container was never created"),
    }

    stop_unneeded_dependencies(ctx, container);
}

fn handle_container_stopped(ctx: &mut RunState, container: &str) {
    if ctx.is_aborting() {
        info!(container = %container, "container stopped while aborting; clean up handles removal");
        return;
    }

    if let Some(docker_container) = docker_container_for(ctx, container) {
        ctx.queue_step(TaskStep::RemoveContainer {
            container: container.to_string(),
            docker_container,
        });
    }

    stop_unneeded_dependencies(ctx, container);
}

/// Stop each dependency of `stopped` once nothing that depends on it is
/// still running.
fn stop_unneeded_dependencies(ctx: &mut RunState, stopped: &str) {
    let created: BTreeMap<ContainerName, DockerContainer> =
        created_containers(ctx).into_iter().collect();
    let stopped_containers = stopped_containers(ctx);

    for dependency in ctx.dependencies_of(stopped) {
        let still_needed_by: Vec<String> = ctx
            .containers_that_depend_on(&dependency)
            .into_iter()
            .filter(|d| created.contains_key(d) && !stopped_containers.contains(d))
            .collect();

        if !still_needed_by.is_empty() {
            debug!(container = %dependency, ?still_needed_by, "dependency still in use; not stopping it yet");
            continue;
        }

        if let Some(docker_container) = created.get(&dependency) {
            queue_stop(ctx, &dependency, docker_container.clone());
        }
    }
}

fn handle_container_removed(ctx: &mut RunState, container: &str) {
    let already_queued: BTreeSet<_> = ctx
        .pending_and_processed_steps_of_type(TaskStepKind::DeleteTemporaryFile)
        .into_iter()
        .filter_map(|s| match s {
            TaskStep::DeleteTemporaryFile { path } => Some(path.clone()),
            _ => None,
        })
        .collect();

    let files: Vec<_> = ctx
        .past_events_of_type(TaskEventKind::TemporaryFileCreated)
        .into_iter()
        .filter_map(|e| match e {
            TaskEvent::TemporaryFileCreated { container: c, path } if c == container => {
                Some(path.clone())
            }
            _ => None,
        })
        .filter(|p| !already_queued.contains(p))
        .collect();

    for path in files {
        ctx.queue_step(TaskStep::DeleteTemporaryFile { path });
    }

    queue_network_deletion_once_containers_removed(ctx);
}

fn handle_pre_run_failure(ctx: &mut RunState, event: &TaskEvent) {
    if matches!(event, TaskEvent::UserInterruptedExecution) && task_exit_code(ctx).is_some() {
        info!("interrupted after the task container exited; letting clean up finish");
        return;
    }

    error!(%event, "task failed");

    ctx.abort();
    for kind in NEW_WORK_STEPS {
        ctx.remove_pending_steps_of_type(kind);
    }

    let created = created_containers(ctx);
    let network = task_network(ctx);
    let headline = messages::pre_run_failure(event);
    let behaviour = ctx.behaviour_after_failure();

    let message = match behaviour {
        BehaviourAfterFailure::DontCleanup if !created.is_empty() => {
            let started: Vec<String> = containers_with_event(ctx, TaskEventKind::ContainerStarted)
                .into_iter()
                .collect();
            messages::left_for_investigation(&headline, &created, &started, network.as_ref())
        }
        BehaviourAfterFailure::Cleanup
            if !created.is_empty() && messages::suggests_no_cleanup_flag(event) =>
        {
            messages::with_no_cleanup_hint(&headline)
        }
        _ => headline,
    };
    queue_failure_display(ctx, message);

    match behaviour {
        BehaviourAfterFailure::Cleanup => {
            let removed = containers_with_event(ctx, TaskEventKind::ContainerRemoved);
            for (container, docker_container) in created {
                if !removed.contains(&container) {
                    queue_clean_up(ctx, &container, docker_container);
                }
            }
        }
        BehaviourAfterFailure::DontCleanup if !created.is_empty() => {
            info!(count = created.len(), "leaving created containers in place for investigation");
            return;
        }
        BehaviourAfterFailure::DontCleanup => {}
    }

    // A creation that was still in flight may have been the last thing the
    // network was waiting for.
    queue_network_deletion_once_containers_removed(ctx);
}

fn handle_post_run_failure(ctx: &mut RunState, event: &TaskEvent) {
    error!(%event, "clean up failed");

    let container = event.container().unwrap_or_default().to_string();
    let prefix = messages::post_run_prefix(ctx.is_aborting(), task_exit_code(ctx));
    let docker_container = docker_container_for(ctx, &container);
    let network = task_network(ctx);

    queue_failure_display(
        ctx,
        messages::container_cleanup_failure(
            &prefix,
            &messages::cleanup_failure_detail(event),
            docker_container.as_ref(),
            network.as_ref(),
        ),
    );

    if ctx.is_aborting() {
        return;
    }

    ctx.abort();
    ctx.remove_pending_steps_of_type(TaskStepKind::StopContainer);
    ctx.remove_pending_steps_of_type(TaskStepKind::RemoveContainer);

    let mut already_handled = containers_with_event(ctx, TaskEventKind::ContainerRemoved);
    already_handled.extend(containers_with_step(ctx, TaskStepKind::RemoveContainer));

    for (container, docker_container) in created_containers(ctx) {
        if !already_handled.contains(&container) {
            queue_clean_up(ctx, &container, docker_container);
        }
    }
}

fn handle_network_deletion_failed(ctx: &mut RunState, message: &str) {
    error!(%message, "could not delete task network");

    let prefix = messages::post_run_prefix(ctx.is_aborting(), task_exit_code(ctx));
    let network = task_network(ctx);
    queue_failure_display(
        ctx,
        messages::network_deletion_failure(&prefix, message, network.as_ref()),
    );

    if !ctx.is_aborting() {
        ctx.abort();
    }
}

// ---------------------------------------------------------------------------
// Queries over the event log and step queue.
// ---------------------------------------------------------------------------

/// Created containers in creation order.
fn created_containers(ctx: &RunState) -> Vec<(ContainerName, DockerContainer)> {
    ctx.past_events_of_type(TaskEventKind::ContainerCreated)
        .into_iter()
        .filter_map(|e| match e {
            TaskEvent::ContainerCreated {
                container,
                docker_container,
            } => Some((container.clone(), docker_container.clone())),
            _ => None,
        })
        .collect()
}

fn docker_container_for(ctx: &RunState, container: &str) -> Option<DockerContainer> {
    created_containers(ctx)
        .into_iter()
        .find(|(name, _)| name == container)
        .map(|(_, id)| id)
}

fn containers_with_event(ctx: &RunState, kind: TaskEventKind) -> BTreeSet<ContainerName> {
    ctx.past_events_of_type(kind)
        .into_iter()
        .filter_map(TaskEvent::container)
        .map(str::to_string)
        .collect()
}

/// Containers with a step of `kind` that has not been removed.
fn containers_with_step(ctx: &RunState, kind: TaskStepKind) -> BTreeSet<ContainerName> {
    ctx.pending_and_processed_steps_of_type(kind)
        .into_iter()
        .filter_map(TaskStep::container)
        .map(str::to_string)
        .collect()
}

/// Containers that are no longer running: stopped ones, plus the task
/// container once it has exited.
fn stopped_containers(ctx: &RunState) -> BTreeSet<ContainerName> {
    let mut stopped = containers_with_event(ctx, TaskEventKind::ContainerStopped);
    stopped.extend(containers_with_event(ctx, TaskEventKind::RunningContainerExited));
    stopped
}

fn task_network(ctx: &RunState) -> Option<DockerNetwork> {
    match ctx.single_past_event_of_type(TaskEventKind::TaskNetworkCreated) {
        Some(TaskEvent::TaskNetworkCreated { network }) => Some(network.clone()),
        _ => None,
    }
}

fn task_exit_code(ctx: &RunState) -> Option<i64> {
    match ctx.single_past_event_of_type(TaskEventKind::RunningContainerExited) {
        Some(TaskEvent::RunningContainerExited { exit_code, .. }) => Some(*exit_code),
        _ => None,
    }
}

/// Images that are ready, paired with the containers that use them.
fn images_ready(ctx: &RunState) -> Vec<(ContainerName, DockerImage)> {
    let built: BTreeMap<ContainerName, DockerImage> = ctx
        .past_events_of_type(TaskEventKind::ImageBuilt)
        .into_iter()
        .filter_map(|e| match e {
            TaskEvent::ImageBuilt { container, image } => Some((container.clone(), image.clone())),
            _ => None,
        })
        .collect();
    let pulled: BTreeMap<String, DockerImage> = ctx
        .past_events_of_type(TaskEventKind::ImagePulled)
        .into_iter()
        .filter_map(|e| match e {
            TaskEvent::ImagePulled { image_name, image } => {
                Some((image_name.clone(), image.clone()))
            }
            _ => None,
        })
        .collect();

    ctx.all_task_containers()
        .into_iter()
        .filter_map(|c| {
            let image = match &c.image_source {
                ImageSource::Build { .. } => built.get(&c.name),
                ImageSource::Pull { image_name } => pulled.get(image_name),
            };
            image.map(|i| (c.name.clone(), i.clone()))
        })
        .collect()
}

/// `{containers with a create step} \ ({removed} ∪ {failed to create})`.
fn containers_awaiting_removal(ctx: &RunState) -> BTreeSet<ContainerName> {
    let mut remaining = containers_with_step(ctx, TaskStepKind::CreateContainer);
    for done in containers_with_event(ctx, TaskEventKind::ContainerRemoved)
        .into_iter()
        .chain(containers_with_event(ctx, TaskEventKind::ContainerCreationFailed))
    {
        remaining.remove(&done);
    }
    remaining
}

// ---------------------------------------------------------------------------
// Step helpers. These are where duplicate steps are coalesced.
// ---------------------------------------------------------------------------

fn queue_create_container(
    ctx: &mut RunState,
    container: &str,
    image: DockerImage,
    network: DockerNetwork,
) {
    if containers_with_step(ctx, TaskStepKind::CreateContainer).contains(container) {
        debug!(container = %container, "container creation already queued");
        return;
    }

    let step = TaskStep::CreateContainer {
        container: container.to_string(),
        image,
        network,
        command: ctx.command_for_container(container),
        additional_environment_variables: ctx
            .additional_environment_variables_for_container(container),
        additional_port_mappings: ctx.additional_port_mappings_for_container(container),
    };
    ctx.queue_step(step);
}

fn queue_start_or_run(ctx: &mut RunState, container: &str, docker_container: DockerContainer) {
    let kind = if ctx.is_task_container(container) {
        TaskStepKind::RunContainer
    } else {
        TaskStepKind::StartContainer
    };
    if containers_with_step(ctx, kind).contains(container) {
        debug!(container = %container, "container start already queued");
        return;
    }

    let container = container.to_string();
    let step = match kind {
        TaskStepKind::RunContainer => TaskStep::RunContainer {
            container,
            docker_container,
        },
        _ => TaskStep::StartContainer {
            container,
            docker_container,
        },
    };
    ctx.queue_step(step);
}

fn queue_stop(ctx: &mut RunState, container: &str, docker_container: DockerContainer) {
    if containers_with_step(ctx, TaskStepKind::StopContainer).contains(container) {
        return;
    }
    ctx.queue_step(TaskStep::StopContainer {
        container: container.to_string(),
        docker_container,
    });
}

fn queue_clean_up(ctx: &mut RunState, container: &str, docker_container: DockerContainer) {
    if containers_with_step(ctx, TaskStepKind::CleanUpContainer).contains(container) {
        debug!(container = %container, "clean up already queued");
        return;
    }
    ctx.queue_step(TaskStep::CleanUpContainer {
        container: container.to_string(),
        docker_container,
    });
}

fn queue_network_deletion(ctx: &mut RunState, network: DockerNetwork) {
    if !ctx
        .pending_and_processed_steps_of_type(TaskStepKind::DeleteTaskNetwork)
        .is_empty()
    {
        debug!(network = %network, "network deletion already queued");
        return;
    }
    ctx.queue_step(TaskStep::DeleteTaskNetwork { network });
}

fn queue_network_deletion_once_containers_removed(ctx: &mut RunState) {
    let remaining = containers_awaiting_removal(ctx);
    if !remaining.is_empty() {
        debug!(?remaining, "waiting for containers to be removed before deleting the network");
        return;
    }

    match task_network(ctx) {
        Some(network) => queue_network_deletion(ctx, network),
        None => debug!("no task network to delete"),
    }
}

fn queue_failure_display(ctx: &mut RunState, message: String) {
    ctx.queue_step(TaskStep::DisplayTaskFailure { message });
}
