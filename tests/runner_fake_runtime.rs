// tests/runner_fake_runtime.rs

mod common;
use crate::common::builders::{graph_for, run_options};
use crate::common::fake_runtime::FakeRuntime;
use crate::common::recording_sink::RecordingFailureSink;
use crate::common::{app_with_database, app_with_two_dependencies, init_tracing, lone_container, with_timeout};

use std::future::{pending, Future};
use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use tempfile::NamedTempFile;
use tokio::time::{sleep, Duration};

use dockdag::cli::CliArgs;
use dockdag::config::ConfigFile;
use dockdag::engine::RunOutcome;
use dockdag::execute_task;
use dockdag::fs::mock::MockFileSystem;
use dockdag::types::BehaviourAfterFailure;

async fn run_task<I>(
    cfg: &ConfigFile,
    task: &str,
    runtime: &FakeRuntime,
    sink: &RecordingFailureSink,
    behaviour: BehaviourAfterFailure,
    parallelism: usize,
    interrupt: I,
) -> RunOutcome
where
    I: Future<Output = ()>,
{
    init_tracing();
    with_timeout(execute_task(
        graph_for(cfg, task),
        run_options(behaviour),
        Arc::new(runtime.clone()),
        Arc::new(MockFileSystem::new()),
        Arc::new(sink.clone()),
        parallelism,
        interrupt,
    ))
    .await
}

fn position(runtime: &FakeRuntime, call: &str) -> usize {
    runtime
        .position_of(call)
        .unwrap_or_else(|| panic!("'{call}' never happened; calls: {:?}", runtime.calls()))
}

#[tokio::test]
async fn test_successful_run_starts_dependencies_first_and_cleans_up() {
    let cfg = app_with_database();
    let runtime = FakeRuntime::new();
    runtime.with_exit_code(3);
    let sink = RecordingFailureSink::new();

    let outcome = run_task(
        &cfg,
        "test",
        &runtime,
        &sink,
        BehaviourAfterFailure::Cleanup,
        4,
        pending(),
    )
    .await;

    assert_eq!(outcome.exit_code, Some(3));
    assert!(!outcome.aborted);
    assert_eq!(outcome.process_exit_code(), 3);
    assert!(outcome.containers_left_behind.is_empty());
    assert!(!outcome.network_left_behind);
    assert!(sink.messages().is_empty());

    assert!(position(&runtime, "create:db") > position(&runtime, "create_network"));
    assert!(position(&runtime, "wait:db") > position(&runtime, "start:db"));
    assert!(position(&runtime, "run:app") > position(&runtime, "wait:db"));
    assert!(position(&runtime, "stop:db") > position(&runtime, "run:app"));
    assert!(position(&runtime, "remove:db") > position(&runtime, "stop:db"));
    assert_eq!(
        runtime.calls().last().map(String::as_str),
        Some("delete_network:fake-network")
    );
    assert!(runtime.calls_starting_with("force_remove").is_empty());
}

#[tokio::test]
async fn test_single_worker_reaches_the_same_outcome() {
    let cfg = app_with_two_dependencies();
    let runtime = FakeRuntime::new();
    let sink = RecordingFailureSink::new();

    let outcome = run_task(
        &cfg,
        "test",
        &runtime,
        &sink,
        BehaviourAfterFailure::Cleanup,
        1,
        pending(),
    )
    .await;

    assert!(outcome.succeeded());
    assert_eq!(outcome.exit_code, Some(0));
    assert!(outcome.containers_left_behind.is_empty());
    assert!(!outcome.network_left_behind);
    assert_eq!(runtime.calls_starting_with("create:").len(), 3);
    assert_eq!(runtime.calls_starting_with("remove:").len(), 3);
    assert_eq!(runtime.calls_starting_with("stop:").len(), 2);
}

#[tokio::test]
async fn test_build_failure_aborts_and_leaves_nothing_behind() {
    let cfg = app_with_database();
    let runtime = FakeRuntime::new();
    runtime.fail("build:app", "disk full");
    let sink = RecordingFailureSink::new();

    let outcome = run_task(
        &cfg,
        "test",
        &runtime,
        &sink,
        BehaviourAfterFailure::Cleanup,
        4,
        pending(),
    )
    .await;

    assert!(outcome.aborted);
    assert_eq!(outcome.exit_code, None);
    assert_eq!(outcome.process_exit_code(), 1);
    assert_eq!(
        sink.messages(),
        vec![
            "Could not build image for container 'app': Image build failed. Output from Docker was: disk full."
                .to_string()
        ]
    );
    assert!(runtime.calls_starting_with("run:").is_empty());
    assert!(outcome.containers_left_behind.is_empty());
    assert!(!outcome.network_left_behind);
    assert_eq!(runtime.calls_starting_with("delete_network").len(), 1);
}

#[tokio::test]
async fn test_start_failure_without_cleanup_leaves_containers_for_inspection() {
    let cfg = app_with_database();
    let runtime = FakeRuntime::new();
    runtime.fail("start:db", "port is already allocated");
    let sink = RecordingFailureSink::new();

    let outcome = run_task(
        &cfg,
        "test",
        &runtime,
        &sink,
        BehaviourAfterFailure::DontCleanup,
        4,
        pending(),
    )
    .await;

    assert!(outcome.aborted);
    assert!(outcome.containers_left_behind.contains(&"db".to_string()));
    assert!(outcome.network_left_behind);
    assert!(runtime.calls_starting_with("force_remove").is_empty());
    assert!(runtime.calls_starting_with("delete_network").is_empty());

    let messages = sink.messages();
    assert!(messages[0].starts_with(
        "Could not start container 'db': Starting container 'db-id' failed. Output from Docker was: port is already allocated."
    ));
    assert!(messages[0].contains("docker rm --force"));
    assert!(messages[0].contains("docker network rm fake-network"));
}

#[tokio::test]
async fn test_interrupt_cleans_up_the_running_task() {
    let cfg = lone_container();
    let runtime = FakeRuntime::new();
    runtime.with_run_delay(Duration::from_millis(300));
    let sink = RecordingFailureSink::new();

    let outcome = run_task(
        &cfg,
        "run",
        &runtime,
        &sink,
        BehaviourAfterFailure::Cleanup,
        4,
        sleep(Duration::from_millis(50)),
    )
    .await;

    assert!(outcome.aborted);
    assert_eq!(outcome.process_exit_code(), 1);
    assert_eq!(
        sink.messages(),
        vec!["The task was interrupted by the user.".to_string()]
    );
    assert!(runtime.position_of("force_remove:tool").is_some());
    assert!(outcome.containers_left_behind.is_empty());
    assert!(!outcome.network_left_behind);
}

#[tokio::test]
async fn test_panicking_step_is_reported_as_an_unexpected_error() {
    let cfg = lone_container();
    let runtime = FakeRuntime::new();
    runtime.panic_on("pull:alpine:3");
    let sink = RecordingFailureSink::new();

    let outcome = run_task(
        &cfg,
        "run",
        &runtime,
        &sink,
        BehaviourAfterFailure::Cleanup,
        2,
        pending(),
    )
    .await;

    assert!(outcome.aborted);
    let messages = sink.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with(
        "An unexpected error occurred during execution of the task: During execution of step of kind 'PullImage':"
    ));
    assert!(!outcome.network_left_behind);
}

#[tokio::test]
async fn test_dry_run_only_validates_the_config() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[container.db]
image = "postgres:16"

[container.app]
image = "shop-app:latest"
dependencies = ["db"]

[task.test]
container = "app"
"#
    )
    .unwrap();

    let args = CliArgs::parse_from([
        "dockdag",
        "--config",
        file.path().to_str().unwrap(),
        "--dry-run",
        "test",
    ]);

    let code = dockdag::run(args).await.unwrap();
    assert_eq!(code, 0);
}
