// src/config/loader.rs

use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{DockdagError, Result};
use crate::fs::{FileSystem, RealFileSystem};

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (dependency correctness, etc.). Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    load_from_fs(&RealFileSystem, path.as_ref())
}

/// Same as [`load_from_path`], reading through the given filesystem.
pub fn load_from_fs(fs: &dyn FileSystem, path: &Path) -> Result<RawConfigFile> {
    if !fs.exists(path) {
        return Err(DockdagError::ConfigError(format!(
            "config file {} does not exist",
            path.display()
        )));
    }
    let contents = fs.read_to_string(path)?;
    let config: RawConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// - Reads TOML.
/// - Defaults `project_name` to the name of the directory holding the file.
/// - Checks names, image sources, unknown dependencies, ports, durations and
///   dependency cycles.
/// - Resolves `build_directory` entries relative to the config file.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    load_and_validate_with(&RealFileSystem, path.as_ref())
}

pub fn load_and_validate_with(fs: &dyn FileSystem, path: &Path) -> Result<ConfigFile> {
    let mut raw_config = load_from_fs(fs, path)?;
    if raw_config.project_name.is_none() {
        raw_config.project_name = project_name_from_path(fs, path);
    }

    let mut config = ConfigFile::try_from(raw_config)?;
    config.resolve_build_directories(&config_root_dir(path));
    Ok(config)
}

/// Directory holding the config file, falling back to the working directory
/// for bare file names.
pub fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

fn project_name_from_path(fs: &dyn FileSystem, config_path: &Path) -> Option<String> {
    let root = config_root_dir(config_path);
    let root = fs.canonicalize(&root).unwrap_or(root);
    let name: String = root
        .file_name()?
        .to_str()?
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' | '.' | '-' => c,
            _ => '-',
        })
        .collect();
    let name = name.trim_matches(|c: char| !c.is_ascii_alphanumeric());
    (!name.is_empty()).then(|| name.to_string())
}
