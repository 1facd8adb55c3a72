// src/engine/events.rs

//! The closed catalogue of things that can happen during a run.

use std::fmt;
use std::path::PathBuf;

use crate::engine::ContainerName;
use crate::runtime::{DockerContainer, DockerImage, DockerNetwork};

/// An immutable fact recorded in the event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    TaskStarted,

    TaskNetworkCreated { network: DockerNetwork },
    TaskNetworkCreationFailed { message: String },

    ImageBuildProgress { container: ContainerName, progress: String },
    ImageBuilt { container: ContainerName, image: DockerImage },
    ImageBuildFailed { container: ContainerName, message: String },

    ImagePullProgress { image_name: String, progress: String },
    ImagePulled { image_name: String, image: DockerImage },
    ImagePullFailed { image_name: String, message: String },

    TemporaryFileCreated { container: ContainerName, path: PathBuf },

    ContainerCreated { container: ContainerName, docker_container: DockerContainer },
    ContainerCreationFailed { container: ContainerName, message: String },

    ContainerStarted { container: ContainerName },
    ContainerStartFailed { container: ContainerName, message: String },

    ContainerBecameHealthy { container: ContainerName },
    ContainerDidNotBecomeHealthy { container: ContainerName, message: String },

    RunningContainerExited { container: ContainerName, exit_code: i64 },
    ContainerRunFailed { container: ContainerName, message: String },

    ContainerStopped { container: ContainerName },
    ContainerStopFailed { container: ContainerName, message: String },

    ContainerRemoved { container: ContainerName },
    ContainerRemovalFailed { container: ContainerName, message: String },

    TemporaryFileDeleted { path: PathBuf },
    TemporaryFileDeletionFailed { path: PathBuf, message: String },

    TaskNetworkDeleted,
    TaskNetworkDeletionFailed { message: String },

    TaskFailureDisplayed,

    UserInterruptedExecution,
    ExecutionFailed { message: String },
}

/// Fieldless tag for each [`TaskEvent`] variant, used to index the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskEventKind {
    TaskStarted,
    TaskNetworkCreated,
    TaskNetworkCreationFailed,
    ImageBuildProgress,
    ImageBuilt,
    ImageBuildFailed,
    ImagePullProgress,
    ImagePulled,
    ImagePullFailed,
    TemporaryFileCreated,
    ContainerCreated,
    ContainerCreationFailed,
    ContainerStarted,
    ContainerStartFailed,
    ContainerBecameHealthy,
    ContainerDidNotBecomeHealthy,
    RunningContainerExited,
    ContainerRunFailed,
    ContainerStopped,
    ContainerStopFailed,
    ContainerRemoved,
    ContainerRemovalFailed,
    TemporaryFileDeleted,
    TemporaryFileDeletionFailed,
    TaskNetworkDeleted,
    TaskNetworkDeletionFailed,
    TaskFailureDisplayed,
    UserInterruptedExecution,
    ExecutionFailed,
}

impl TaskEvent {
    pub fn kind(&self) -> TaskEventKind {
        match self {
            TaskEvent::TaskStarted => TaskEventKind::TaskStarted,
            TaskEvent::TaskNetworkCreated { .. } => TaskEventKind::TaskNetworkCreated,
            TaskEvent::TaskNetworkCreationFailed { .. } => TaskEventKind::TaskNetworkCreationFailed,
            TaskEvent::ImageBuildProgress { .. } => TaskEventKind::ImageBuildProgress,
            TaskEvent::ImageBuilt { .. } => TaskEventKind::ImageBuilt,
            TaskEvent::ImageBuildFailed { .. } => TaskEventKind::ImageBuildFailed,
            TaskEvent::ImagePullProgress { .. } => TaskEventKind::ImagePullProgress,
            TaskEvent::ImagePulled { .. } => TaskEventKind::ImagePulled,
            TaskEvent::ImagePullFailed { .. } => TaskEventKind::ImagePullFailed,
            TaskEvent::TemporaryFileCreated { .. } => TaskEventKind::TemporaryFileCreated,
            TaskEvent::ContainerCreated { .. } => TaskEventKind::ContainerCreated,
            TaskEvent::ContainerCreationFailed { .. } => TaskEventKind::ContainerCreationFailed,
            TaskEvent::ContainerStarted { .. } => TaskEventKind::ContainerStarted,
            TaskEvent::ContainerStartFailed { .. } => TaskEventKind::ContainerStartFailed,
            TaskEvent::ContainerBecameHealthy { .. } => TaskEventKind::ContainerBecameHealthy,
            TaskEvent::ContainerDidNotBecomeHealthy { .. } => {
                TaskEventKind::ContainerDidNotBecomeHealthy
            }
            TaskEvent::RunningContainerExited { .. } => TaskEventKind::RunningContainerExited,
            TaskEvent::ContainerRunFailed { .. } => TaskEventKind::ContainerRunFailed,
            TaskEvent::ContainerStopped { .. } => TaskEventKind::ContainerStopped,
            TaskEvent::ContainerStopFailed { .. } => TaskEventKind::ContainerStopFailed,
            TaskEvent::ContainerRemoved { .. } => TaskEventKind::ContainerRemoved,
            TaskEvent::ContainerRemovalFailed { .. } => TaskEventKind::ContainerRemovalFailed,
            TaskEvent::TemporaryFileDeleted { .. } => TaskEventKind::TemporaryFileDeleted,
            TaskEvent::TemporaryFileDeletionFailed { .. } => {
                TaskEventKind::TemporaryFileDeletionFailed
            }
            TaskEvent::TaskNetworkDeleted => TaskEventKind::TaskNetworkDeleted,
            TaskEvent::TaskNetworkDeletionFailed { .. } => TaskEventKind::TaskNetworkDeletionFailed,
            TaskEvent::TaskFailureDisplayed => TaskEventKind::TaskFailureDisplayed,
            TaskEvent::UserInterruptedExecution => TaskEventKind::UserInterruptedExecution,
            TaskEvent::ExecutionFailed { .. } => TaskEventKind::ExecutionFailed,
        }
    }

    /// Progress-style events emitted while a step is still running. They
    /// never retire the step that produced them.
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            TaskEvent::ImageBuildProgress { .. }
                | TaskEvent::ImagePullProgress { .. }
                | TaskEvent::TemporaryFileCreated { .. }
        )
    }

    /// The container this event is about, if any.
    pub fn container(&self) -> Option<&str> {
        match self {
            TaskEvent::ImageBuildProgress { container, .. }
            | TaskEvent::ImageBuilt { container, .. }
            | TaskEvent::ImageBuildFailed { container, .. }
            | TaskEvent::TemporaryFileCreated { container, .. }
            | TaskEvent::ContainerCreated { container, .. }
            | TaskEvent::ContainerCreationFailed { container, .. }
            | TaskEvent::ContainerStarted { container }
            | TaskEvent::ContainerStartFailed { container, .. }
            | TaskEvent::ContainerBecameHealthy { container }
            | TaskEvent::ContainerDidNotBecomeHealthy { container, .. }
            | TaskEvent::RunningContainerExited { container, .. }
            | TaskEvent::ContainerRunFailed { container, .. }
            | TaskEvent::ContainerStopped { container }
            | TaskEvent::ContainerStopFailed { container, .. }
            | TaskEvent::ContainerRemoved { container }
            | TaskEvent::ContainerRemovalFailed { container, .. } => Some(container),
            _ => None,
        }
    }
}

impl fmt::Display for TaskEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for TaskEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskEvent::TaskNetworkCreated { network } => {
                write!(f, "TaskNetworkCreated(network: '{network}')")
            }
            TaskEvent::ImageBuilt { container, image } => {
                write!(f, "ImageBuilt(container: '{container}', image: '{image}')")
            }
            TaskEvent::ImagePulled { image_name, image } => {
                write!(f, "ImagePulled(image: '{image_name}', id: '{image}')")
            }
            TaskEvent::ContainerCreated {
                container,
                docker_container,
            } => write!(
                f,
                "ContainerCreated(container: '{container}', Docker container ID: '{docker_container}')"
            ),
            TaskEvent::RunningContainerExited {
                container,
                exit_code,
            } => write!(
                f,
                "RunningContainerExited(container: '{container}', exit code: {exit_code})"
            ),
            TaskEvent::TemporaryFileCreated { container, path } => write!(
                f,
                "TemporaryFileCreated(container: '{container}', path: {})",
                path.display()
            ),
            TaskEvent::TemporaryFileDeleted { path } => {
                write!(f, "TemporaryFileDeleted(path: {})", path.display())
            }
            other => match (other.container(), failure_message(other)) {
                (Some(c), Some(m)) => write!(f, "{}(container: '{c}', message: '{m}')", other.kind()),
                (Some(c), None) => write!(f, "{}(container: '{c}')", other.kind()),
                (None, Some(m)) => write!(f, "{}(message: '{m}')", other.kind()),
                (None, None) => write!(f, "{}", other.kind()),
            },
        }
    }
}

fn failure_message(event: &TaskEvent) -> Option<&str> {
    match event {
        TaskEvent::TaskNetworkCreationFailed { message }
        | TaskEvent::ImageBuildFailed { message, .. }
        | TaskEvent::ImagePullFailed { message, .. }
        | TaskEvent::ContainerCreationFailed { message, .. }
        | TaskEvent::ContainerStartFailed { message, .. }
        | TaskEvent::ContainerDidNotBecomeHealthy { message, .. }
        | TaskEvent::ContainerRunFailed { message, .. }
        | TaskEvent::ContainerStopFailed { message, .. }
        | TaskEvent::ContainerRemovalFailed { message, .. }
        | TaskEvent::TemporaryFileDeletionFailed { message, .. }
        | TaskEvent::TaskNetworkDeletionFailed { message }
        | TaskEvent::ExecutionFailed { message } => Some(message),
        TaskEvent::ImageBuildProgress { progress, .. }
        | TaskEvent::ImagePullProgress { progress, .. } => Some(progress),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_identifiers() {
        let event = TaskEvent::ContainerCreated {
            container: "db".to_string(),
            docker_container: DockerContainer::new("abc123"),
        };
        assert_eq!(
            event.to_string(),
            "ContainerCreated(container: 'db', Docker container ID: 'abc123')"
        );

        let event = TaskEvent::ContainerStopFailed {
            container: "db".to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(
            event.to_string(),
            "ContainerStopFailed(container: 'db', message: 'boom')"
        );
        assert_eq!(TaskEvent::TaskStarted.to_string(), "TaskStarted");
    }

    #[test]
    fn only_progress_events_are_informational() {
        assert!(
            TaskEvent::ImagePullProgress {
                image_name: "redis".into(),
                progress: "50%".into()
            }
            .is_informational()
        );
        assert!(!TaskEvent::TaskNetworkDeleted.is_informational());
    }
}
