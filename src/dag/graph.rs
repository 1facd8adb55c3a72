// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, Container, PortMapping, Task};
use crate::errors::{DockdagError, Result};

static NO_CONTAINERS: BTreeSet<String> = BTreeSet::new();

/// Internal node structure: stores the container plus immediate deps and
/// dependents, restricted to the containers taking part in the task.
#[derive(Debug, Clone)]
struct GraphNode {
    container: Container,
    deps: BTreeSet<String>,
    dependents: BTreeSet<String>,
}

/// The containers taking part in one task, and how they depend on each other.
///
/// Built from a validated [`ConfigFile`], which has already rejected unknown
/// references and cycles, so lookups here never fail.
#[derive(Debug, Clone)]
pub struct ContainerGraph {
    task: Task,
    nodes: BTreeMap<String, GraphNode>,
}

impl ContainerGraph {
    /// Collect the entry container of `task_name`, the task's extra
    /// dependencies, and everything they transitively depend on.
    ///
    /// The task's extra dependencies are treated as direct dependencies of
    /// the entry container.
    pub fn for_task(cfg: &ConfigFile, task_name: &str) -> Result<Self> {
        let task = cfg
            .tasks
            .get(task_name)
            .ok_or_else(|| DockdagError::TaskNotFound(task_name.to_string()))?
            .clone();

        let mut nodes: BTreeMap<String, GraphNode> = BTreeMap::new();
        let mut to_visit: VecDeque<String> = VecDeque::from([task.container.clone()]);

        while let Some(name) = to_visit.pop_front() {
            if nodes.contains_key(&name) {
                continue;
            }
            let container = cfg.containers.get(&name).cloned().ok_or_else(|| {
                DockdagError::ConfigError(format!(
                    "task '{}' needs unknown container '{name}'",
                    task.name
                ))
            })?;

            let mut deps = container.dependencies.clone();
            if name == task.container {
                deps.extend(task.dependencies.iter().cloned());
            }
            to_visit.extend(deps.iter().cloned());

            nodes.insert(
                name,
                GraphNode {
                    container,
                    deps,
                    dependents: BTreeSet::new(),
                },
            );
        }

        let edges: Vec<(String, String)> = nodes
            .iter()
            .flat_map(|(name, node)| node.deps.iter().map(move |d| (d.clone(), name.clone())))
            .collect();
        for (dep, dependent) in edges {
            if let Some(dep_node) = nodes.get_mut(&dep) {
                dep_node.dependents.insert(dependent);
            }
        }

        Ok(Self { task, nodes })
    }

    pub fn task_name(&self) -> &str {
        &self.task.name
    }

    pub fn task_description(&self) -> Option<&str> {
        self.task.description.as_deref()
    }

    /// The container whose exit code becomes the task's exit code.
    pub fn task_container(&self) -> &str {
        &self.task.container
    }

    pub fn is_task_container(&self, name: &str) -> bool {
        self.task.container == name
    }

    /// All containers taking part in the task, ordered by name.
    pub fn all_containers(&self) -> impl Iterator<Item = &Container> {
        self.nodes.values().map(|n| &n.container)
    }

    pub fn container(&self, name: &str) -> Option<&Container> {
        self.nodes.get(name).map(|n| &n.container)
    }

    /// Immediate dependencies of a container.
    pub fn dependencies_of(&self, name: &str) -> &BTreeSet<String> {
        self.nodes.get(name).map(|n| &n.deps).unwrap_or(&NO_CONTAINERS)
    }

    /// Containers that list this one as an immediate dependency.
    pub fn containers_that_depend_on(&self, name: &str) -> &BTreeSet<String> {
        self.nodes
            .get(name)
            .map(|n| &n.dependents)
            .unwrap_or(&NO_CONTAINERS)
    }

    /// The task's command overrides the entry container's own command.
    pub fn command_for(&self, name: &str) -> Option<Vec<String>> {
        if self.is_task_container(name) && self.task.command.is_some() {
            return self.task.command.clone();
        }
        self.container(name).and_then(|c| c.command.clone())
    }

    /// Environment variables the task adds on top of the container's own.
    pub fn additional_environment_variables_for(&self, name: &str) -> BTreeMap<String, String> {
        if self.is_task_container(name) {
            self.task.environment.clone()
        } else {
            BTreeMap::new()
        }
    }

    /// Port mappings the task adds on top of the container's own.
    pub fn additional_port_mappings_for(&self, name: &str) -> Vec<PortMapping> {
        if self.is_task_container(name) {
            self.task.port_mappings.clone()
        } else {
            Vec::new()
        }
    }

    /// Containers in an order where every dependency comes before its
    /// dependents. Used for dry runs.
    pub fn startup_order(&self) -> Vec<String> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for name in self.nodes.keys() {
            graph.add_node(name.as_str());
        }
        for (name, node) in self.nodes.iter() {
            for dep in node.deps.iter() {
                graph.add_edge(dep.as_str(), name.as_str(), ());
            }
        }

        match toposort(&graph, None) {
            Ok(order) => order.into_iter().map(str::to_string).collect(),
            // Config validation rejects cycles; fall back to name order.
            Err(_) => self.nodes.keys().cloned().collect(),
        }
    }
}
