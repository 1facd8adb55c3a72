// src/runtime/mod.rs

//! Container runtime abstraction.
//!
//! The step executor talks to a `ContainerRuntime` instead of the docker CLI
//! directly. Production code uses [`DockerCliRuntime`]; tests provide a fake
//! that records calls and fails on demand.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use crate::config::model::{HealthCheck, PortMapping};

pub mod docker_cli;

pub use docker_cli::DockerCliRuntime;

/// Identifier the runtime assigned to a created container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DockerContainer(pub String);

/// Identifier (or reference) of a built or pulled image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DockerImage(pub String);

/// Identifier of the task network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DockerNetwork(pub String);

macro_rules! impl_handle {
    ($ty:ident) => {
        impl $ty {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn id(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

impl_handle!(DockerContainer);
impl_handle!(DockerImage);
impl_handle!(DockerNetwork);

/// A runtime call failed. `message` is whatever the runtime said about it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct RuntimeError {
    pub message: String,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

pub type RuntimeFuture<'a, T> = Pin<Box<dyn Future<Output = RuntimeResult<T>> + Send + 'a>>;

/// Receives progress lines while an image is built or pulled.
pub type ProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuildRequest {
    pub container: String,
    pub build_directory: PathBuf,
    pub dockerfile: String,
    pub image_tag: String,
}

/// Everything needed to create one container on the task network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerCreationRequest {
    pub container: String,
    pub image: DockerImage,
    pub network: DockerNetwork,
    pub command: Option<Vec<String>>,
    pub working_directory: Option<String>,
    pub environment: BTreeMap<String, String>,
    pub port_mappings: Vec<PortMapping>,
    pub health_check: HealthCheck,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedContainer {
    pub container: DockerContainer,
    /// Files written while creating the container that must be deleted once
    /// it has been removed.
    pub temporary_files: Vec<PathBuf>,
}

/// Result of waiting for a container's health status to settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    NoHealthCheck,
    BecameHealthy,
    BecameUnhealthy,
    Exited,
}

/// The most recent health probe run against a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckResult {
    pub exit_code: i64,
    pub output: String,
}

/// One method per runtime operation the engine needs.
pub trait ContainerRuntime: Send + Sync {
    fn build_image(
        &self,
        request: ImageBuildRequest,
        on_progress: ProgressCallback,
    ) -> RuntimeFuture<'_, DockerImage>;

    fn pull_image(
        &self,
        image_name: String,
        on_progress: ProgressCallback,
    ) -> RuntimeFuture<'_, DockerImage>;

    fn create_network(&self) -> RuntimeFuture<'_, DockerNetwork>;

    fn create_container(
        &self,
        request: ContainerCreationRequest,
    ) -> RuntimeFuture<'_, CreatedContainer>;

    fn start_container(&self, container: DockerContainer) -> RuntimeFuture<'_, ()>;

    /// Start the container attached to the terminal and block until it exits.
    /// Returns its exit code.
    fn run_container(&self, container: DockerContainer) -> RuntimeFuture<'_, i64>;

    fn stop_container(&self, container: DockerContainer) -> RuntimeFuture<'_, ()>;

    /// Remove a container. With `force`, a running container is killed first.
    fn remove_container(&self, container: DockerContainer, force: bool)
    -> RuntimeFuture<'_, ()>;

    fn wait_for_health(&self, container: DockerContainer) -> RuntimeFuture<'_, HealthStatus>;

    /// `None` when no health probe has run yet.
    fn last_health_check_result(
        &self,
        container: DockerContainer,
    ) -> RuntimeFuture<'_, Option<HealthCheckResult>>;

    fn delete_network(&self, network: DockerNetwork) -> RuntimeFuture<'_, ()>;
}
