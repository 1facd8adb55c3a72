// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod runtime;
pub mod types;
pub mod ui;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ImageSource;
use crate::dag::ContainerGraph;
use crate::engine::{RunContext, RunOptions, RunOutcome};
use crate::exec::{StepExecutor, StepRunner};
use crate::fs::{FileSystem, RealFileSystem};
use crate::runtime::{ContainerRuntime, DockerCliRuntime};
use crate::ui::{ConsoleFailureSink, FailureSink};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and the task's container graph
/// - the run context (event log, step queue, handlers)
/// - the docker CLI runtime and the step runner
/// - Ctrl-C handling
///
/// Returns the exit code for the process: the task container's exit code,
/// or 1 if the run failed.
pub async fn run(args: CliArgs) -> Result<i32> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;
    let graph = ContainerGraph::for_task(&cfg, &args.task)?;

    if args.dry_run {
        print_dry_run(&cfg.project_name, &graph);
        return Ok(0);
    }

    let parallelism = args
        .level_of_parallelism
        .unwrap_or_else(|| default_parallelism(&graph));

    let options = RunOptions {
        project_name: cfg.project_name.clone(),
        behaviour_after_failure: args.behaviour_after_failure(),
    };

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let runtime = Arc::new(DockerCliRuntime::new(cfg.project_name.clone(), Arc::clone(&fs)));

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    let outcome = execute_task(
        Arc::new(graph),
        options,
        runtime,
        fs,
        Arc::new(ConsoleFailureSink),
        parallelism,
        interrupt,
    )
    .await;

    if !outcome.containers_left_behind.is_empty() {
        info!(containers = ?outcome.containers_left_behind, "some containers were not removed");
    }

    Ok(outcome.process_exit_code())
}

/// Run one task to completion against the given collaborators.
pub async fn execute_task<I>(
    graph: Arc<ContainerGraph>,
    options: RunOptions,
    runtime: Arc<dyn ContainerRuntime>,
    fs: Arc<dyn FileSystem>,
    sink: Arc<dyn FailureSink>,
    parallelism: usize,
    interrupt: I,
) -> RunOutcome
where
    I: Future<Output = ()>,
{
    let context = Arc::new(RunContext::new(Arc::clone(&graph), options));
    let executor = Arc::new(StepExecutor::new(runtime, fs, sink, graph));
    StepRunner::new(context, executor, parallelism)
        .run(interrupt)
        .await
}

/// Enough workers that every container can be mid-operation at once.
fn default_parallelism(graph: &ContainerGraph) -> usize {
    (graph.all_containers().count() * 2).max(1)
}

/// Simple dry-run output: print the task's containers in start-up order.
fn print_dry_run(project_name: &str, graph: &ContainerGraph) {
    println!("dockdag dry-run");
    println!("  project = {project_name}");
    println!("  task = {}", graph.task_name());
    if let Some(description) = graph.task_description() {
        println!("  description = {description}");
    }
    println!("  task container = {}", graph.task_container());
    println!();

    let order = graph.startup_order();
    println!("containers ({}), in start-up order:", order.len());
    for name in order {
        let Some(container) = graph.container(&name) else {
            continue;
        };
        println!("  - {name}");
        match &container.image_source {
            ImageSource::Build {
                build_directory,
                dockerfile,
            } => println!(
                "      build: {} ({dockerfile})",
                build_directory.display()
            ),
            ImageSource::Pull { image_name } => println!("      image: {image_name}"),
        }
        let deps = graph.dependencies_of(&name);
        if !deps.is_empty() {
            println!("      dependencies: {:?}", deps);
        }
        if let Some(command) = graph.command_for(&name) {
            println!("      command: {:?}", command);
        }
        let ports: Vec<String> = container
            .port_mappings
            .iter()
            .chain(graph.additional_port_mappings_for(&name).iter())
            .map(|p| p.to_string())
            .collect();
        if !ports.is_empty() {
            println!("      ports: {:?}", ports);
        }
        if container.health_check.command.is_some() {
            println!("      health check: {:?}", container.health_check.command);
        }
    }

    debug!("dry-run complete (no execution)");
}
