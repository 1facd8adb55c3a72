// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::types::BehaviourAfterFailure;

/// Command-line arguments for `dockdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dockdag",
    version,
    about = "Run a task inside containers, starting its dependencies first and cleaning everything up afterwards.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "dockdag.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DOCKDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Maximum number of runtime operations to run at once.
    ///
    /// Defaults to twice the number of containers in the task.
    #[arg(long, value_name = "N", value_parser = parse_parallelism)]
    pub level_of_parallelism: Option<usize>,

    /// Leave containers in place after a failure so they can be inspected.
    #[arg(long)]
    pub no_cleanup_after_failure: bool,

    /// Parse + validate, print the containers the task would start, but
    /// don't talk to docker.
    #[arg(long)]
    pub dry_run: bool,

    /// Name of the task to run.
    #[arg(value_name = "TASK")]
    pub task: String,
}

impl CliArgs {
    pub fn behaviour_after_failure(&self) -> BehaviourAfterFailure {
        BehaviourAfterFailure::from_no_cleanup_flag(self.no_cleanup_after_failure)
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn parse_parallelism(s: &str) -> Result<usize, String> {
    match s.trim().parse::<usize>() {
        Ok(0) => Err("level of parallelism must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(format!("invalid level of parallelism '{s}': {e}")),
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_and_task() {
        let args = CliArgs::try_parse_from([
            "dockdag",
            "--config",
            "ci/dockdag.toml",
            "--level-of-parallelism",
            "3",
            "--no-cleanup-after-failure",
            "test",
        ])
        .unwrap();

        assert_eq!(args.config, "ci/dockdag.toml");
        assert_eq!(args.level_of_parallelism, Some(3));
        assert_eq!(args.task, "test");
        assert_eq!(
            args.behaviour_after_failure(),
            BehaviourAfterFailure::DontCleanup
        );
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        assert!(
            CliArgs::try_parse_from(["dockdag", "--level-of-parallelism", "0", "test"]).is_err()
        );
    }

    #[test]
    fn task_is_required() {
        assert!(CliArgs::try_parse_from(["dockdag"]).is_err());
    }
}
