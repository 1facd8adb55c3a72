use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dockdag::fs::mock::MockFileSystem;
use dockdag::fs::FileSystem;
use dockdag::runtime::{
    ContainerCreationRequest, ContainerRuntime, CreatedContainer, DockerContainer, DockerImage,
    DockerNetwork, HealthCheckResult, HealthStatus, ImageBuildRequest, ProgressCallback,
    RuntimeError, RuntimeFuture,
};

pub const FAKE_NETWORK_ID: &str = "fake-network";

/// Docker container ID the fake assigns to `container`.
pub fn fake_container_id(container: &str) -> String {
    format!("{container}-id")
}

#[derive(Debug, Default)]
struct FakeState {
    calls: Vec<String>,
    failures: HashMap<String, String>,
    panics: HashSet<String>,
    health: HashMap<String, HealthStatus>,
    last_health: HashMap<String, HealthCheckResult>,
    exit_code: i64,
    run_delay: Option<Duration>,
    fs: Option<MockFileSystem>,
    creation_requests: Vec<ContainerCreationRequest>,
}

/// A container runtime that:
/// - records every call as `"<operation>:<target>"` (e.g. `"start:db"`)
/// - succeeds unless told to fail a specific call via [`FakeRuntime::fail`]
/// - reports containers as having no health check unless told otherwise.
///
/// Clones share state, so a test can keep one handle while the runner owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct FakeRuntime {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the call recorded as `call` fail with `message`.
    pub fn fail(&self, call: &str, message: &str) -> &Self {
        self.lock()
            .failures
            .insert(call.to_string(), message.to_string());
        self
    }

    /// Make the call recorded as `call` panic.
    pub fn panic_on(&self, call: &str) -> &Self {
        self.lock().panics.insert(call.to_string());
        self
    }

    pub fn with_exit_code(&self, code: i64) -> &Self {
        self.lock().exit_code = code;
        self
    }

    pub fn with_health(&self, container: &str, status: HealthStatus) -> &Self {
        self.lock().health.insert(container.to_string(), status);
        self
    }

    pub fn with_last_health_check(&self, container: &str, exit_code: i64, output: &str) -> &Self {
        self.lock().last_health.insert(
            container.to_string(),
            HealthCheckResult {
                exit_code,
                output: output.to_string(),
            },
        );
        self
    }

    /// Keep the task container running for `delay` before it exits.
    pub fn with_run_delay(&self, delay: Duration) -> &Self {
        self.lock().run_delay = Some(delay);
        self
    }

    /// Write an env-file into `fs` for every created container and report it
    /// as a temporary file.
    pub fn with_filesystem(&self, fs: MockFileSystem) -> &Self {
        self.lock().fs = Some(fs);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Every container creation request received, successful or not.
    pub fn creation_requests(&self) -> Vec<ContainerCreationRequest> {
        self.lock().creation_requests.clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    /// Position of `call` in the call log.
    pub fn position_of(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: String) -> Result<(), RuntimeError> {
        let failure = {
            let mut state = self.lock();
            state.calls.push(call.clone());
            if state.panics.contains(&call) {
                None
            } else {
                Some(state.failures.get(&call).cloned())
            }
        };
        match failure {
            None => panic!("fake runtime told to panic on {call}"),
            Some(Some(message)) => Err(RuntimeError::new(message)),
            Some(None) => Ok(()),
        }
    }
}

fn name_of(container: &DockerContainer) -> String {
    container
        .id()
        .strip_suffix("-id")
        .unwrap_or(container.id())
        .to_string()
}

impl ContainerRuntime for FakeRuntime {
    fn build_image(
        &self,
        request: ImageBuildRequest,
        on_progress: ProgressCallback,
    ) -> RuntimeFuture<'_, DockerImage> {
        Box::pin(async move {
            on_progress(format!("building {}", request.image_tag));
            self.record(format!("build:{}", request.container))?;
            Ok(DockerImage::new(request.image_tag))
        })
    }

    fn pull_image(
        &self,
        image_name: String,
        on_progress: ProgressCallback,
    ) -> RuntimeFuture<'_, DockerImage> {
        Box::pin(async move {
            on_progress(format!("pulling {image_name}"));
            self.record(format!("pull:{image_name}"))?;
            Ok(DockerImage::new(image_name))
        })
    }

    fn create_network(&self) -> RuntimeFuture<'_, DockerNetwork> {
        Box::pin(async move {
            self.record("create_network".to_string())?;
            Ok(DockerNetwork::new(FAKE_NETWORK_ID))
        })
    }

    fn create_container(
        &self,
        request: ContainerCreationRequest,
    ) -> RuntimeFuture<'_, CreatedContainer> {
        Box::pin(async move {
            self.lock().creation_requests.push(request.clone());
            self.record(format!("create:{}", request.container))?;

            let fs = self.lock().fs.clone();
            let temporary_files = match fs {
                Some(fs) => {
                    let path = PathBuf::from(format!("/mock-tmp/{}.env", request.container));
                    let contents: String = request
                        .environment
                        .iter()
                        .map(|(k, v)| format!("{k}={v}\n"))
                        .collect();
                    fs.write(&path, contents.as_bytes())
                        .map_err(|e| RuntimeError::new(e.to_string()))?;
                    vec![path]
                }
                None => Vec::new(),
            };

            Ok(CreatedContainer {
                container: DockerContainer::new(fake_container_id(&request.container)),
                temporary_files,
            })
        })
    }

    fn start_container(&self, container: DockerContainer) -> RuntimeFuture<'_, ()> {
        Box::pin(async move { self.record(format!("start:{}", name_of(&container))) })
    }

    fn run_container(&self, container: DockerContainer) -> RuntimeFuture<'_, i64> {
        Box::pin(async move {
            self.record(format!("run:{}", name_of(&container)))?;
            let (delay, exit_code) = {
                let state = self.lock();
                (state.run_delay, state.exit_code)
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(exit_code)
        })
    }

    fn stop_container(&self, container: DockerContainer) -> RuntimeFuture<'_, ()> {
        Box::pin(async move { self.record(format!("stop:{}", name_of(&container))) })
    }

    fn remove_container(
        &self,
        container: DockerContainer,
        force: bool,
    ) -> RuntimeFuture<'_, ()> {
        Box::pin(async move {
            let op = if force { "force_remove" } else { "remove" };
            self.record(format!("{op}:{}", name_of(&container)))
        })
    }

    fn wait_for_health(&self, container: DockerContainer) -> RuntimeFuture<'_, HealthStatus> {
        Box::pin(async move {
            let name = name_of(&container);
            self.record(format!("wait:{name}"))?;
            Ok(self
                .lock()
                .health
                .get(&name)
                .copied()
                .unwrap_or(HealthStatus::NoHealthCheck))
        })
    }

    fn last_health_check_result(
        &self,
        container: DockerContainer,
    ) -> RuntimeFuture<'_, Option<HealthCheckResult>> {
        Box::pin(async move {
            let name = name_of(&container);
            self.record(format!("last_health:{name}"))?;
            Ok(self.lock().last_health.get(&name).cloned())
        })
    }

    fn delete_network(&self, network: DockerNetwork) -> RuntimeFuture<'_, ()> {
        Box::pin(async move { self.record(format!("delete_network:{network}")) })
    }
}
