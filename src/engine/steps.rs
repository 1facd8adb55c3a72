// src/engine/steps.rs

//! Units of work the step runner hands to the container runtime.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::config::model::PortMapping;
use crate::engine::ContainerName;
use crate::runtime::{DockerContainer, DockerImage, DockerNetwork};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStep {
    BuildImage {
        container: ContainerName,
        build_directory: PathBuf,
        dockerfile: String,
        image_tag: String,
    },
    PullImage {
        image_name: String,
    },
    CreateTaskNetwork,
    CreateContainer {
        container: ContainerName,
        image: DockerImage,
        network: DockerNetwork,
        command: Option<Vec<String>>,
        additional_environment_variables: BTreeMap<String, String>,
        additional_port_mappings: Vec<PortMapping>,
    },
    StartContainer {
        container: ContainerName,
        docker_container: DockerContainer,
    },
    RunContainer {
        container: ContainerName,
        docker_container: DockerContainer,
    },
    WaitForContainerToBecomeHealthy {
        container: ContainerName,
        docker_container: DockerContainer,
    },
    StopContainer {
        container: ContainerName,
        docker_container: DockerContainer,
    },
    RemoveContainer {
        container: ContainerName,
        docker_container: DockerContainer,
    },
    /// Force-remove a container regardless of its state.
    CleanUpContainer {
        container: ContainerName,
        docker_container: DockerContainer,
    },
    DeleteTemporaryFile {
        path: PathBuf,
    },
    DeleteTaskNetwork {
        network: DockerNetwork,
    },
    DisplayTaskFailure {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskStepKind {
    BuildImage,
    PullImage,
    CreateTaskNetwork,
    CreateContainer,
    StartContainer,
    RunContainer,
    WaitForContainerToBecomeHealthy,
    StopContainer,
    RemoveContainer,
    CleanUpContainer,
    DeleteTemporaryFile,
    DeleteTaskNetwork,
    DisplayTaskFailure,
}

impl TaskStep {
    pub fn kind(&self) -> TaskStepKind {
        match self {
            TaskStep::BuildImage { .. } => TaskStepKind::BuildImage,
            TaskStep::PullImage { .. } => TaskStepKind::PullImage,
            TaskStep::CreateTaskNetwork => TaskStepKind::CreateTaskNetwork,
            TaskStep::CreateContainer { .. } => TaskStepKind::CreateContainer,
            TaskStep::StartContainer { .. } => TaskStepKind::StartContainer,
            TaskStep::RunContainer { .. } => TaskStepKind::RunContainer,
            TaskStep::WaitForContainerToBecomeHealthy { .. } => {
                TaskStepKind::WaitForContainerToBecomeHealthy
            }
            TaskStep::StopContainer { .. } => TaskStepKind::StopContainer,
            TaskStep::RemoveContainer { .. } => TaskStepKind::RemoveContainer,
            TaskStep::CleanUpContainer { .. } => TaskStepKind::CleanUpContainer,
            TaskStep::DeleteTemporaryFile { .. } => TaskStepKind::DeleteTemporaryFile,
            TaskStep::DeleteTaskNetwork { .. } => TaskStepKind::DeleteTaskNetwork,
            TaskStep::DisplayTaskFailure { .. } => TaskStepKind::DisplayTaskFailure,
        }
    }

    /// The container this step acts on, if any.
    pub fn container(&self) -> Option<&str> {
        match self {
            TaskStep::BuildImage { container, .. }
            | TaskStep::CreateContainer { container, .. }
            | TaskStep::StartContainer { container, .. }
            | TaskStep::RunContainer { container, .. }
            | TaskStep::WaitForContainerToBecomeHealthy { container, .. }
            | TaskStep::StopContainer { container, .. }
            | TaskStep::RemoveContainer { container, .. }
            | TaskStep::CleanUpContainer { container, .. } => Some(container),
            TaskStep::PullImage { .. }
            | TaskStep::CreateTaskNetwork
            | TaskStep::DeleteTemporaryFile { .. }
            | TaskStep::DeleteTaskNetwork { .. }
            | TaskStep::DisplayTaskFailure { .. } => None,
        }
    }
}

impl fmt::Display for TaskStepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for TaskStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStep::PullImage { image_name } => write!(f, "PullImage(image: '{image_name}')"),
            TaskStep::DeleteTemporaryFile { path } => {
                write!(f, "DeleteTemporaryFile(path: {})", path.display())
            }
            TaskStep::DeleteTaskNetwork { network } => {
                write!(f, "DeleteTaskNetwork(network: '{network}')")
            }
            TaskStep::DisplayTaskFailure { .. } => write!(f, "DisplayTaskFailure"),
            other => match other.container() {
                Some(c) => write!(f, "{}(container: '{c}')", other.kind()),
                None => write!(f, "{}", other.kind()),
            },
        }
    }
}
