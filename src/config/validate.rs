// src/config/validate.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use regex::Regex;

use crate::config::model::{
    parse_duration, Container, ConfigFile, ContainerConfig, HealthCheck, HealthCheckConfig,
    ImageSource, PortMapping, RawConfigFile, Task, TaskConfig,
};
use crate::errors::{DockdagError, Result};

const DEFAULT_PROJECT_NAME: &str = "dockdag";
const DEFAULT_DOCKERFILE: &str = "Dockerfile";

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = DockdagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;

        let containers = raw
            .container
            .iter()
            .map(|(name, cfg)| Ok((name.clone(), convert_container(name, cfg)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        let tasks = raw
            .task
            .iter()
            .map(|(name, cfg)| Ok((name.clone(), convert_task(name, cfg)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        let project_name = raw
            .project_name
            .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string());

        Ok(ConfigFile::new_unchecked(project_name, containers, tasks))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_containers(cfg)?;
    ensure_has_tasks(cfg)?;
    validate_names(cfg)?;
    validate_image_sources(cfg)?;
    validate_image_tags(cfg)?;
    validate_environments(cfg)?;
    validate_container_dependencies(cfg)?;
    validate_tasks(cfg)?;
    validate_dependency_graph(cfg)?;
    Ok(())
}

fn ensure_has_containers(cfg: &RawConfigFile) -> Result<()> {
    if cfg.container.is_empty() {
        return Err(DockdagError::ConfigError(
            "config must contain at least one [container.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(DockdagError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]*$").expect("name pattern is a valid regex")
    })
}

/// One path component of a docker image reference. Built images are tagged
/// `<project>-<container>`, so both parts must match it.
fn image_name_component_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*$")
            .expect("image name pattern is a valid regex")
    })
}

const IMAGE_NAME_RULES: &str = "must contain only lowercase letters, digits and separators ('.', '_', '__' or '-'), and must start and end with a letter or digit";

fn validate_names(cfg: &RawConfigFile) -> Result<()> {
    let pattern = name_pattern();

    if let Some(project) = &cfg.project_name {
        if !pattern.is_match(project) {
            return Err(DockdagError::ConfigError(format!(
                "invalid project name '{project}': must start with a letter or digit and contain only letters, digits, '_', '.' and '-'"
            )));
        }
    }

    for (kind, name) in cfg
        .container
        .keys()
        .map(|n| ("container", n))
        .chain(cfg.task.keys().map(|n| ("task", n)))
    {
        if !pattern.is_match(name) {
            return Err(DockdagError::ConfigError(format!(
                "invalid {kind} name '{name}': must start with a letter or digit and contain only letters, digits, '_', '.' and '-'"
            )));
        }
    }
    Ok(())
}

fn validate_image_tags(cfg: &RawConfigFile) -> Result<()> {
    let pattern = image_name_component_pattern();

    if let Some(project) = &cfg.project_name {
        if !pattern.is_match(project) {
            return Err(DockdagError::ConfigError(format!(
                "invalid project name '{project}': it is used in image names, so it {IMAGE_NAME_RULES}"
            )));
        }
    }

    for (name, container) in cfg.container.iter() {
        if container.build_directory.is_some() && !pattern.is_match(name) {
            return Err(DockdagError::ConfigError(format!(
                "invalid container name '{name}': container builds an image, so its name {IMAGE_NAME_RULES}"
            )));
        }
    }
    Ok(())
}

fn validate_environments(cfg: &RawConfigFile) -> Result<()> {
    let containers = cfg
        .container
        .iter()
        .map(|(name, c)| (format!("container '{name}'"), &c.environment));
    let tasks = cfg
        .task
        .iter()
        .map(|(name, t)| (format!("task '{name}'"), &t.environment));

    for (owner, environment) in containers.chain(tasks) {
        for (key, value) in environment {
            if key.is_empty() || key.contains(['=', '\n', '\r']) {
                return Err(DockdagError::ConfigError(format!(
                    "{owner} has invalid environment variable name '{key}'"
                )));
            }
            if value.contains(['\n', '\r']) {
                return Err(DockdagError::ConfigError(format!(
                    "environment variable '{key}' of {owner} must not contain a line break"
                )));
            }
        }
    }
    Ok(())
}

fn validate_image_sources(cfg: &RawConfigFile) -> Result<()> {
    for (name, container) in cfg.container.iter() {
        match (&container.image, &container.build_directory) {
            (Some(_), Some(_)) => {
                return Err(DockdagError::ConfigError(format!(
                    "container '{name}' must not specify both `image` and `build_directory`"
                )));
            }
            (None, None) => {
                return Err(DockdagError::ConfigError(format!(
                    "container '{name}' must specify either `image` or `build_directory`"
                )));
            }
            (Some(_), None) if container.dockerfile.is_some() => {
                return Err(DockdagError::ConfigError(format!(
                    "container '{name}' specifies `dockerfile` without `build_directory`"
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

fn validate_container_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, container) in cfg.container.iter() {
        for dep in container.dependencies.iter() {
            if dep == name {
                return Err(DockdagError::ConfigError(format!(
                    "container '{name}' cannot depend on itself"
                )));
            }
            if !cfg.container.contains_key(dep) {
                return Err(DockdagError::ConfigError(format!(
                    "container '{name}' has unknown dependency '{dep}'"
                )));
            }
        }
    }
    Ok(())
}

fn validate_tasks(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        if !cfg.container.contains_key(&task.container) {
            return Err(DockdagError::ConfigError(format!(
                "task '{name}' refers to unknown container '{}'",
                task.container
            )));
        }
        for dep in task.dependencies.iter() {
            if !cfg.container.contains_key(dep) {
                return Err(DockdagError::ConfigError(format!(
                    "task '{name}' has unknown dependency '{dep}'"
                )));
            }
            if dep == &task.container {
                return Err(DockdagError::ConfigError(format!(
                    "task '{name}' lists its own container '{dep}' as a dependency"
                )));
            }
        }
    }
    Ok(())
}

fn validate_dependency_graph(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dependency -> dependent.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.container.keys() {
        graph.add_node(name.as_str());
    }
    for (name, container) in cfg.container.iter() {
        for dep in container.dependencies.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }
    ensure_acyclic(&graph, None)?;

    // Task-level dependencies add edges into the entry container, which can
    // close a loop that the container graph alone does not have.
    for (task_name, task) in cfg.task.iter() {
        if task.dependencies.is_empty() {
            continue;
        }
        let mut with_task = graph.clone();
        for dep in task.dependencies.iter() {
            with_task.add_edge(dep.as_str(), task.container.as_str(), ());
        }
        ensure_acyclic(&with_task, Some(task_name))?;
    }

    Ok(())
}

fn ensure_acyclic(graph: &DiGraphMap<&str, ()>, task: Option<&str>) -> Result<()> {
    match toposort(graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            let msg = match task {
                Some(task) => format!(
                    "dependencies of task '{task}' form a cycle involving container '{node}'"
                ),
                None => format!("cycle detected in container dependencies involving container '{node}'"),
            };
            Err(DockdagError::DependencyCycle(msg))
        }
    }
}

fn convert_container(name: &str, cfg: &ContainerConfig) -> Result<Container> {
    let image_source = match (&cfg.image, &cfg.build_directory) {
        (Some(image_name), _) => ImageSource::Pull {
            image_name: image_name.clone(),
        },
        (None, Some(dir)) => ImageSource::Build {
            build_directory: PathBuf::from(dir),
            dockerfile: cfg
                .dockerfile
                .clone()
                .unwrap_or_else(|| DEFAULT_DOCKERFILE.to_string()),
        },
        (None, None) => unreachable!("image sources are validated before conversion"),
    };

    Ok(Container {
        name: name.to_string(),
        dependencies: cfg.dependencies.iter().cloned().collect(),
        image_source,
        command: cfg.command.clone(),
        working_directory: cfg.working_directory.clone(),
        environment: cfg.environment.clone(),
        port_mappings: parse_ports(&format!("container '{name}'"), &cfg.ports)?,
        health_check: convert_health_check(name, cfg.health_check.as_ref())?,
    })
}

fn convert_task(name: &str, cfg: &TaskConfig) -> Result<Task> {
    Ok(Task {
        name: name.to_string(),
        container: cfg.container.clone(),
        command: cfg.command.clone(),
        environment: cfg.environment.clone(),
        port_mappings: parse_ports(&format!("task '{name}'"), &cfg.ports)?,
        dependencies: cfg.dependencies.iter().cloned().collect(),
        description: cfg.description.clone(),
    })
}

fn parse_ports(owner: &str, ports: &[String]) -> Result<Vec<PortMapping>> {
    ports
        .iter()
        .map(|p| {
            p.parse::<PortMapping>()
                .map_err(|e| DockdagError::ConfigError(format!("{owner}: {e}")))
        })
        .collect()
}

fn convert_health_check(name: &str, cfg: Option<&HealthCheckConfig>) -> Result<HealthCheck> {
    let Some(cfg) = cfg else {
        return Ok(HealthCheck::default());
    };

    let duration = |field: &str, value: &Option<String>| {
        value
            .as_deref()
            .map(parse_duration)
            .transpose()
            .map_err(|e| {
                DockdagError::ConfigError(format!(
                    "container '{name}' has invalid health_check.{field}: {e}"
                ))
            })
    };

    Ok(HealthCheck {
        command: cfg.command.clone(),
        interval: duration("interval", &cfg.interval)?,
        retries: cfg.retries,
        start_period: duration("start_period", &cfg.start_period)?,
        timeout: duration("timeout", &cfg.timeout)?,
    })
}
