// tests/container_graph.rs

mod common;
use crate::common::builders::{ConfigFileBuilder, ContainerConfigBuilder, TaskConfigBuilder};
use crate::common::app_with_database;

use std::collections::BTreeSet;

use dockdag::config::ConfigFile;
use dockdag::dag::ContainerGraph;
use dockdag::errors::DockdagError;

fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// web -> api -> db, plus an unrelated `docs` container and a `cache`
/// that only the `e2e` task pulls in.
fn shop() -> ConfigFile {
    ConfigFileBuilder::new()
        .with_container(
            "web",
            ContainerConfigBuilder::pull("web:1")
                .depends_on("api")
                .command(&["serve"])
                .build(),
        )
        .with_container(
            "api",
            ContainerConfigBuilder::pull("api:1").depends_on("db").build(),
        )
        .with_container("db", ContainerConfigBuilder::pull("postgres:16").build())
        .with_container("cache", ContainerConfigBuilder::pull("redis:7").build())
        .with_container("docs", ContainerConfigBuilder::build_from("docs").build())
        .with_task("serve", TaskConfigBuilder::new("web").build())
        .with_task("api-only", TaskConfigBuilder::new("api").build())
        .with_task(
            "e2e",
            TaskConfigBuilder::new("web")
                .depends_on("cache")
                .command(&["npm", "test"])
                .description("end-to-end tests")
                .build(),
        )
        .build()
}

fn names(graph: &ContainerGraph) -> BTreeSet<String> {
    graph.all_containers().map(|c| c.name.clone()).collect()
}

#[test]
fn test_graph_contains_only_the_transitive_dependencies() {
    let cfg = shop();

    let serve = ContainerGraph::for_task(&cfg, "serve").unwrap();
    assert_eq!(names(&serve), set(&["api", "db", "web"]));

    let api_only = ContainerGraph::for_task(&cfg, "api-only").unwrap();
    assert_eq!(names(&api_only), set(&["api", "db"]));
    assert!(api_only.containers_that_depend_on("api").is_empty());
}

#[test]
fn test_task_dependencies_become_dependencies_of_the_task_container() {
    let cfg = shop();
    let graph = ContainerGraph::for_task(&cfg, "e2e").unwrap();

    assert_eq!(names(&graph), set(&["api", "cache", "db", "web"]));
    assert_eq!(graph.dependencies_of("web"), &set(&["api", "cache"]));
    assert_eq!(graph.containers_that_depend_on("cache"), &set(&["web"]));
    assert_eq!(graph.task_description(), Some("end-to-end tests"));

    // The container on its own does not depend on cache.
    let serve = ContainerGraph::for_task(&cfg, "serve").unwrap();
    assert_eq!(serve.dependencies_of("web"), &set(&["api"]));
}

#[test]
fn test_task_command_overrides_the_task_container_only() {
    let cfg = shop();

    let e2e = ContainerGraph::for_task(&cfg, "e2e").unwrap();
    assert_eq!(
        e2e.command_for("web"),
        Some(vec!["npm".to_string(), "test".to_string()])
    );
    assert_eq!(e2e.command_for("api"), None);

    let serve = ContainerGraph::for_task(&cfg, "serve").unwrap();
    assert_eq!(serve.command_for("web"), Some(vec!["serve".to_string()]));
}

#[test]
fn test_additional_settings_apply_to_the_task_container() {
    let cfg = app_with_database();
    let graph = ContainerGraph::for_task(&cfg, "test").unwrap();

    assert_eq!(graph.task_container(), "app");
    assert!(graph.is_task_container("app"));
    assert_eq!(
        graph.additional_environment_variables_for("app")["CI"],
        "1"
    );
    assert!(graph.additional_environment_variables_for("db").is_empty());
    assert_eq!(graph.additional_port_mappings_for("app").len(), 1);
    assert!(graph.additional_port_mappings_for("db").is_empty());
}

#[test]
fn test_startup_order_puts_dependencies_first() {
    let cfg = shop();
    let graph = ContainerGraph::for_task(&cfg, "e2e").unwrap();

    let order = graph.startup_order();
    let position = |name: &str| order.iter().position(|n| n == name).unwrap();

    assert_eq!(order.len(), 4);
    assert!(position("db") < position("api"));
    assert!(position("api") < position("web"));
    assert!(position("cache") < position("web"));
}

#[test]
fn test_unknown_container_lookups_are_empty() {
    let cfg = shop();
    let graph = ContainerGraph::for_task(&cfg, "serve").unwrap();

    assert!(graph.container("docs").is_none());
    assert!(graph.dependencies_of("docs").is_empty());
    assert!(graph.containers_that_depend_on("docs").is_empty());
}

#[test]
fn test_unknown_task_is_reported() {
    let cfg = shop();

    match ContainerGraph::for_task(&cfg, "deploy") {
        Err(DockdagError::TaskNotFound(name)) => assert_eq!(name, "deploy"),
        other => panic!("Expected TaskNotFound, got: {:?}", other.map(|g| g.task_name().to_string())),
    }
}
