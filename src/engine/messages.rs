// src/engine/messages.rs

//! User-facing failure messages, including the manual clean-up commands shown
//! when automatic clean-up is impossible or was switched off.

use crate::engine::events::TaskEvent;
use crate::runtime::{DockerContainer, DockerNetwork};

const NO_CLEANUP_HINT: &str = "You can re-run the task with --no-cleanup-after-failure to leave the created containers running to diagnose the issue.";

/// Headline for a failure that happened before the entry container exited.
pub fn pre_run_failure(event: &TaskEvent) -> String {
    match event {
        TaskEvent::ImageBuildFailed { container, message } => {
            format!("Could not build image for container '{container}': {message}")
        }
        TaskEvent::ImagePullFailed {
            image_name,
            message,
        } => format!("Could not pull image '{image_name}': {message}"),
        TaskEvent::TaskNetworkCreationFailed { message } => {
            format!("Could not create network for task: {message}")
        }
        TaskEvent::ContainerCreationFailed { container, message } => {
            format!("Could not create container '{container}': {message}")
        }
        TaskEvent::ContainerStartFailed { container, message } => {
            format!("Could not start container '{container}': {message}")
        }
        TaskEvent::ContainerDidNotBecomeHealthy { container, message } => {
            format!("Container '{container}' did not become healthy: {message}")
        }
        TaskEvent::ContainerRunFailed { container, message } => {
            format!("Could not run container '{container}': {message}")
        }
        TaskEvent::UserInterruptedExecution => "The task was interrupted by the user.".to_string(),
        TaskEvent::ExecutionFailed { message } => {
            format!("An unexpected error occurred during execution of the task: {message}")
        }
        other => format!("The task failed: {other}"),
    }
}

/// Failures where leaving the containers running would help diagnose the
/// problem, so the user is told how to do that.
pub fn suggests_no_cleanup_flag(event: &TaskEvent) -> bool {
    matches!(
        event,
        TaskEvent::ContainerStartFailed { .. }
            | TaskEvent::ContainerDidNotBecomeHealthy { .. }
            | TaskEvent::ContainerRunFailed { .. }
    )
}

pub fn with_no_cleanup_hint(message: &str) -> String {
    format!("{message}\n\n{NO_CLEANUP_HINT}")
}

/// Message for a failure when the user asked for containers to be left in
/// place. Lists how to view logs for every started container and the single
/// command that removes everything afterwards.
pub fn left_for_investigation(
    message: &str,
    created: &[(String, DockerContainer)],
    started: &[String],
    network: Option<&DockerNetwork>,
) -> String {
    let mut sections = vec![
        message.to_string(),
        "As the task was run with --no-cleanup-after-failure, the created containers will not be cleaned up.".to_string(),
    ];

    let log_commands: Vec<String> = created
        .iter()
        .filter(|(name, _)| started.contains(name))
        .map(|(name, id)| {
            format!("You can view the logs for container '{name}' by running 'docker logs {id}'.")
        })
        .collect();
    if !log_commands.is_empty() {
        sections.push(log_commands.join("\n"));
    }

    sections.push(format!(
        "To clean up the containers and task network once you have finished investigating the issue, run '{}'.",
        cleanup_command(created, network)
    ));

    sections.join("\n\n")
}

fn cleanup_command(created: &[(String, DockerContainer)], network: Option<&DockerNetwork>) -> String {
    let ids: Vec<&str> = created.iter().map(|(_, id)| id.id()).collect();
    let remove = format!("docker rm --force {}", ids.join(" "));
    match network {
        Some(network) => format!("{remove} && docker network rm {network}"),
        None => remove,
    }
}

/// A container finished creating after the run had already failed, and the
/// user asked for nothing to be cleaned up.
pub fn created_after_abort(
    container: &str,
    docker_container: &DockerContainer,
    network: Option<&DockerNetwork>,
) -> String {
    let created = [(container.to_string(), docker_container.clone())];
    format!(
        "The container '{container}' was created after the task had already failed. As the task was run with --no-cleanup-after-failure, it will not be cleaned up.\n\nTo clean it up once you have finished investigating the issue, run '{}'.",
        cleanup_command(&created, network)
    )
}

/// Opening words for a failure that happened while tearing down.
pub fn post_run_prefix(aborting: bool, exit_code: Option<i64>) -> String {
    match (aborting, exit_code) {
        (true, _) => "During clean up after the previous failure, ".to_string(),
        (false, Some(code)) => format!("After the task exited with exit code {code}, "),
        (false, None) => "During clean up, ".to_string(),
    }
}

/// Description of a container clean-up failure, without the prefix.
pub fn cleanup_failure_detail(event: &TaskEvent) -> String {
    match event {
        TaskEvent::ContainerStopFailed { container, message } => {
            format!("the container '{container}' couldn't be stopped: {message}")
        }
        TaskEvent::ContainerRemovalFailed { container, message } => {
            format!("the container '{container}' couldn't be removed: {message}")
        }
        TaskEvent::ContainerDidNotBecomeHealthy { container, message } => {
            format!("the container '{container}' did not become healthy: {message}")
        }
        other => format!("clean up failed: {other}"),
    }
}

pub fn container_cleanup_failure(
    prefix: &str,
    detail: &str,
    docker_container: Option<&DockerContainer>,
    network: Option<&DockerNetwork>,
) -> String {
    let mut message = format!("{prefix}{detail}\n\n");

    if let Some(id) = docker_container {
        message.push_str(&format!(
            "This container may not have been cleaned up completely, so you may need to remove this container yourself by running 'docker rm --force {id}'.\n"
        ));
    }
    if let Some(network) = network {
        message.push_str(&format!(
            "Furthermore, the task network cannot be automatically cleaned up, so you will need to clean up this network yourself by running 'docker network rm {network}'.\n"
        ));
    }

    message
}

pub fn network_deletion_failure(prefix: &str, message: &str, network: Option<&DockerNetwork>) -> String {
    let mut text = format!("{prefix}the task network couldn't be deleted: {message}");
    if let Some(network) = network {
        text.push_str(&format!(
            "\n\nThis network may not have been removed, so you may need to clean up this network yourself by running 'docker network rm {network}'."
        ));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_failure_headline() {
        let event = TaskEvent::ImageBuildFailed {
            container: "web".to_string(),
            message: "Image build failed. Output from Docker was: disk full.".to_string(),
        };
        assert_eq!(
            pre_run_failure(&event),
            "Could not build image for container 'web': Image build failed. Output from Docker was: disk full."
        );
        assert!(!suggests_no_cleanup_flag(&event));
    }

    #[test]
    fn investigation_message_lists_logs_and_cleanup_command() {
        let created = vec![
            ("db".to_string(), DockerContainer::new("db-id")),
            ("app".to_string(), DockerContainer::new("app-id")),
        ];
        let started = vec!["db".to_string()];
        let network = DockerNetwork::new("net-id");

        let message = left_for_investigation("Something broke.", &created, &started, Some(&network));

        assert_eq!(
            message,
            "Something broke.\n\n\
             As the task was run with --no-cleanup-after-failure, the created containers will not be cleaned up.\n\n\
             You can view the logs for container 'db' by running 'docker logs db-id'.\n\n\
             To clean up the containers and task network once you have finished investigating the issue, run 'docker rm --force db-id app-id && docker network rm net-id'."
        );
    }

    #[test]
    fn post_run_prefixes() {
        assert_eq!(
            post_run_prefix(false, Some(123)),
            "After the task exited with exit code 123, "
        );
        assert_eq!(
            post_run_prefix(true, Some(123)),
            "During clean up after the previous failure, "
        );
    }

    #[test]
    fn container_cleanup_failure_mentions_both_commands() {
        let message = container_cleanup_failure(
            "After the task exited with exit code 123, ",
            "the container 'db' couldn't be stopped: Something went wrong",
            Some(&DockerContainer::new("db-id")),
            Some(&DockerNetwork::new("net-id")),
        );
        assert_eq!(
            message,
            "After the task exited with exit code 123, the container 'db' couldn't be stopped: Something went wrong\n\n\
             This container may not have been cleaned up completely, so you may need to remove this container yourself by running 'docker rm --force db-id'.\n\
             Furthermore, the task network cannot be automatically cleaned up, so you will need to clean up this network yourself by running 'docker network rm net-id'.\n"
        );
    }
}
