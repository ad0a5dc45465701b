//! Root path registration and lookup.

use crate::store::{RecordStore, RootPath, StoreError};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Invalid root path: {0:?} (expected a non-empty absolute path)")]
    InvalidPath(PathBuf),
    #[error("Root path not registered: {0} (run catalog first)")]
    UnregisteredRoot(PathBuf),
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn validate(path: &Path) -> Result<(), RegistryError> {
    if path.as_os_str().is_empty() || !path.is_absolute() {
        return Err(RegistryError::InvalidPath(path.to_path_buf()));
    }
    Ok(())
}

/// Register `path` as a root, or return the existing registration.
pub fn register(store: &RecordStore, path: &Path) -> Result<RootPath, RegistryError> {
    validate(path)?;

    if let Some(root) = store.find_root(path)? {
        return Ok(root);
    }

    let root = store.upsert_root(path)?;
    info!("Registered root {} as #{}", root.path.display(), root.id);
    Ok(root)
}

/// Look up a root registered earlier.
pub fn resolve(store: &RecordStore, path: &Path) -> Result<RootPath, RegistryError> {
    validate(path)?;

    store
        .find_root(path)?
        .ok_or_else(|| RegistryError::UnregisteredRoot(path.to_path_buf()))
}

pub fn list(store: &RecordStore) -> Result<Vec<RootPath>, RegistryError> {
    Ok(store.roots()?)
}
