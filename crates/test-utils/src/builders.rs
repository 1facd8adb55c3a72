#![allow(dead_code)]

use std::sync::Arc;

use dockdag::config::{ConfigFile, ContainerConfig, HealthCheckConfig, RawConfigFile, TaskConfig};
use dockdag::dag::ContainerGraph;
use dockdag::engine::{RunContext, RunOptions, RunState};
use dockdag::types::BehaviourAfterFailure;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                project_name: Some("testproject".to_string()),
                ..RawConfigFile::default()
            },
        }
    }

    pub fn project_name(mut self, name: &str) -> Self {
        self.config.project_name = Some(name.to_string());
        self
    }

    pub fn with_container(mut self, name: &str, container: ContainerConfig) -> Self {
        self.config.container.insert(name.to_string(), container);
        self
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ContainerConfig`.
pub struct ContainerConfigBuilder {
    container: ContainerConfig,
}

impl ContainerConfigBuilder {
    /// A container whose image is pulled.
    pub fn pull(image: &str) -> Self {
        Self {
            container: ContainerConfig {
                image: Some(image.to_string()),
                ..ContainerConfig::default()
            },
        }
    }

    /// A container whose image is built from `directory`.
    pub fn build_from(directory: &str) -> Self {
        Self {
            container: ContainerConfig {
                build_directory: Some(directory.to_string()),
                ..ContainerConfig::default()
            },
        }
    }

    pub fn depends_on(mut self, dep: &str) -> Self {
        self.container.dependencies.push(dep.to_string());
        self
    }

    pub fn command(mut self, args: &[&str]) -> Self {
        self.container.command = Some(args.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.container
            .environment
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn port(mut self, mapping: &str) -> Self {
        self.container.ports.push(mapping.to_string());
        self
    }

    pub fn working_directory(mut self, dir: &str) -> Self {
        self.container.working_directory = Some(dir.to_string());
        self
    }

    pub fn health_check(mut self, command: &str) -> Self {
        self.container.health_check = Some(HealthCheckConfig {
            command: Some(command.to_string()),
            interval: Some("1s".to_string()),
            retries: Some(3),
            ..HealthCheckConfig::default()
        });
        self
    }

    pub fn build(self) -> ContainerConfig {
        self.container
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(container: &str) -> Self {
        Self {
            task: TaskConfig {
                container: container.to_string(),
                ..TaskConfig::default()
            },
        }
    }

    pub fn command(mut self, args: &[&str]) -> Self {
        self.task.command = Some(args.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.task
            .environment
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn port(mut self, mapping: &str) -> Self {
        self.task.ports.push(mapping.to_string());
        self
    }

    pub fn depends_on(mut self, dep: &str) -> Self {
        self.task.dependencies.push(dep.to_string());
        self
    }

    pub fn description(mut self, text: &str) -> Self {
        self.task.description = Some(text.to_string());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

/// Graph for `task` in `cfg`, ready to share with a run.
pub fn graph_for(cfg: &ConfigFile, task: &str) -> Arc<ContainerGraph> {
    Arc::new(ContainerGraph::for_task(cfg, task).expect("task should exist in test config"))
}

pub fn run_options(behaviour: BehaviourAfterFailure) -> RunOptions {
    RunOptions {
        project_name: "testproject".to_string(),
        behaviour_after_failure: behaviour,
    }
}

/// A fresh run state for `task`.
pub fn run_state_for(cfg: &ConfigFile, task: &str, behaviour: BehaviourAfterFailure) -> RunState {
    RunState::new(graph_for(cfg, task), run_options(behaviour))
}

/// A fresh thread-safe run context for `task`.
pub fn run_context_for(
    cfg: &ConfigFile,
    task: &str,
    behaviour: BehaviourAfterFailure,
) -> Arc<RunContext> {
    Arc::new(RunContext::new(graph_for(cfg, task), run_options(behaviour)))
}
