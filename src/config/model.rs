// src/config/model.rs

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// project_name = "shop"
///
/// [container.database]
/// image = "postgres:16"
/// health_check = { command = "pg_isready", interval = "2s", retries = 10 }
///
/// [container.app]
/// build_directory = "app"
/// dependencies = ["database"]
///
/// [task.test]
/// container = "app"
/// command = ["./test.sh"]
/// ```
///
/// This is only the deserialised shape; it becomes a [`ConfigFile`] once
/// it has passed validation (see `validate.rs`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    /// Used to name built images. Defaults to the config directory name.
    #[serde(default)]
    pub project_name: Option<String>,

    /// All containers from `[container.<name>]`.
    #[serde(default)]
    pub container: BTreeMap<String, ContainerConfig>,

    /// All tasks from `[task.<name>]`.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// `[container.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerConfig {
    /// Image to pull. Mutually exclusive with `build_directory`.
    #[serde(default)]
    pub image: Option<String>,

    /// Directory to build an image from, relative to the config file.
    #[serde(default)]
    pub build_directory: Option<String>,

    /// Dockerfile inside `build_directory` (default `Dockerfile`).
    #[serde(default)]
    pub dockerfile: Option<String>,

    #[serde(default)]
    pub command: Option<Vec<String>>,

    #[serde(default)]
    pub working_directory: Option<String>,

    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// `"host:container"` port mappings.
    #[serde(default)]
    pub ports: Vec<String>,

    /// Names of other containers that must be healthy before this one starts.
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub health_check: Option<HealthCheckConfig>,
}

/// Inline `health_check = { ... }` table.
///
/// Durations use the `<n>ms|s|m|h` syntax.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthCheckConfig {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub start_period: Option<String>,
    #[serde(default)]
    pub timeout: Option<String>,
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    /// The entry container whose exit code becomes the task's exit code.
    pub container: String,

    /// Overrides the entry container's own command.
    #[serde(default)]
    pub command: Option<Vec<String>>,

    /// Extra environment variables for the entry container only.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// Extra port mappings for the entry container only.
    #[serde(default)]
    pub ports: Vec<String>,

    /// Extra containers to start alongside the entry container's own
    /// dependencies.
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub description: Option<String>,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub project_name: String,
    pub containers: BTreeMap<String, Container>,
    pub tasks: BTreeMap<String, Task>,
}

impl ConfigFile {
    /// Assemble a `ConfigFile` from already-validated parts.
    pub(crate) fn new_unchecked(
        project_name: String,
        containers: BTreeMap<String, Container>,
        tasks: BTreeMap<String, Task>,
    ) -> Self {
        Self {
            project_name,
            containers,
            tasks,
        }
    }

    /// Make relative build directories relative to `root` instead of the
    /// current working directory.
    pub fn resolve_build_directories(&mut self, root: &std::path::Path) {
        for container in self.containers.values_mut() {
            if let ImageSource::Build {
                build_directory, ..
            } = &mut container.image_source
            {
                if build_directory.is_relative() {
                    *build_directory = root.join(&*build_directory);
                }
            }
        }
    }
}

/// A container definition after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub name: String,
    pub dependencies: BTreeSet<String>,
    pub image_source: ImageSource,
    pub command: Option<Vec<String>>,
    pub working_directory: Option<String>,
    pub environment: BTreeMap<String, String>,
    pub port_mappings: Vec<PortMapping>,
    pub health_check: HealthCheck,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Build {
        build_directory: PathBuf,
        dockerfile: String,
    },
    Pull {
        image_name: String,
    },
}

/// Health check overrides. Anything left `None` falls back to whatever the
/// image itself declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthCheck {
    pub command: Option<String>,
    pub interval: Option<Duration>,
    pub retries: Option<u32>,
    pub start_period: Option<Duration>,
    pub timeout: Option<Duration>,
}

/// A task definition after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub name: String,
    pub container: String,
    pub command: Option<Vec<String>>,
    pub environment: BTreeMap<String, String>,
    pub port_mappings: Vec<PortMapping>,
    pub dependencies: BTreeSet<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortMapping {
    pub local: u16,
    pub container: u16,
}

impl FromStr for PortMapping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (local, container) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("port mapping '{s}' must be in the form 'local:container'"))?;

        let parse = |part: &str| {
            part.trim()
                .parse::<u16>()
                .map_err(|_| format!("port mapping '{s}' contains invalid port '{part}'"))
        };

        Ok(PortMapping {
            local: parse(local)?,
            container: parse(container)?,
        })
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.local, self.container)
    }
}

/// Parse `"250ms"`, `"3s"`, `"1m"` or `"2h"` into a [`Duration`].
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;

    let seconds_per_unit = match unit_part.trim().to_lowercase().as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        unit => {
            return Err(format!(
                "unsupported duration unit '{unit}'; expected ms, s, m, or h"
            ))
        }
    };

    value
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_mapping_parses_and_displays() {
        let mapping: PortMapping = "8080:80".parse().unwrap();
        assert_eq!(
            mapping,
            PortMapping {
                local: 8080,
                container: 80
            }
        );
        assert_eq!(mapping.to_string(), "8080:80");
    }

    #[test]
    fn port_mapping_rejects_garbage() {
        assert!("8080".parse::<PortMapping>().is_err());
        assert!("80:http".parse::<PortMapping>().is_err());
        assert!("70000:80".parse::<PortMapping>().is_err());
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("9999999999999999h")
            .unwrap_err()
            .contains("too large"));
        assert!(parse_duration("999999999999999999m").is_err());
    }
}
