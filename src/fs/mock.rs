// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MockState {
    files: HashMap<PathBuf, Vec<u8>>,
    undeletable: HashSet<PathBuf>,
    deleted: Vec<PathBuf>,
}

/// In-memory filesystem for tests. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.lock()
            .files
            .insert(path.as_ref().to_path_buf(), content.into());
    }

    /// Make every later `delete_file` for `path` fail.
    pub fn fail_deletion_of(&self, path: impl AsRef<Path>) {
        self.lock().undeletable.insert(path.as_ref().to_path_buf());
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.lock().files.get(path.as_ref()).cloned()
    }

    /// Paths successfully deleted so far, in order.
    pub fn deleted_files(&self) -> Vec<PathBuf> {
        self.lock().deleted.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let state = self.lock();
        let bytes = state
            .files
            .get(path)
            .ok_or_else(|| anyhow!("File not found: {:?}", path))?;
        Ok(String::from_utf8(bytes.clone())?)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.lock().files.contains_key(path)
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        if state.undeletable.contains(path) {
            return Err(anyhow!("permission denied deleting {:?}", path));
        }
        state
            .files
            .remove(path)
            .ok_or_else(|| anyhow!("File not found: {:?}", path))?;
        state.deleted.push(path.to_path_buf());
        Ok(())
    }

    /// Paths are returned as given; tests use absolute paths.
    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        Ok(path.to_path_buf())
    }

    fn temp_dir(&self) -> PathBuf {
        PathBuf::from("/mock-tmp")
    }
}
