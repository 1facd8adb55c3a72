// src/config/mod.rs

//! Configuration loading and validation for dockdag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it into typed containers and tasks (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_and_validate_with, load_from_path};
pub use model::{
    Container, ConfigFile, ContainerConfig, HealthCheck, HealthCheckConfig, ImageSource,
    PortMapping, RawConfigFile, Task, TaskConfig,
};
