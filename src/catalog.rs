//! Reconciles the files found under a root against its stored records.

use crate::cancel::Cancellation;
use crate::enumerate;
use crate::pipeline::StageError;
use crate::registry;
use crate::store::{RecordStore, RootPath};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tracing::{debug, info};

pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Chunks queued between the enumerating thread and the writer.
const CHANNEL_DEPTH: usize = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogResult {
    pub inserted: usize,
    pub skipped: usize,
    pub cancelled: bool,
}

/// Insert a record for each observed relative path not yet cataloged under `root`.
///
/// `observed` is drained on a separate thread and written in chunks of
/// `chunk_size`, each chunk in its own transaction. Existing records are left
/// untouched; repeated paths count as skipped.
pub fn reconcile<I>(
    store: &mut RecordStore,
    root: &RootPath,
    observed: I,
    chunk_size: usize,
    cancel: &Cancellation,
) -> Result<CatalogResult, StageError>
where
    I: IntoIterator<Item = PathBuf>,
    I::IntoIter: Send,
{
    let chunk_size = chunk_size.max(1);
    let observed = observed.into_iter();
    let (tx, rx) = mpsc::sync_channel::<Vec<PathBuf>>(CHANNEL_DEPTH);

    std::thread::scope(|scope| -> Result<CatalogResult, StageError> {
        scope.spawn(move || {
            let mut chunk = Vec::with_capacity(chunk_size);
            for path in observed {
                if cancel.is_cancelled() {
                    return;
                }
                chunk.push(path);
                if chunk.len() == chunk_size {
                    let full = std::mem::replace(&mut chunk, Vec::with_capacity(chunk_size));
                    // The writer hung up after an error.
                    if tx.send(full).is_err() {
                        return;
                    }
                }
            }
            if !chunk.is_empty() {
                let _ = tx.send(chunk);
            }
        });

        let mut result = CatalogResult::default();
        for chunk in rx {
            let (inserted, skipped) = store.insert_files(root.id, &chunk)?;
            debug!(
                "Cataloged chunk of {} under {}: {} new",
                chunk.len(),
                root.path.display(),
                inserted
            );
            result.inserted += inserted;
            result.skipped += skipped;
        }
        result.cancelled = cancel.is_cancelled();
        Ok(result)
    })
}

/// Enumerate `path`, register it as a root and reconcile its files.
///
/// Absolute paths in `excluded` are never cataloged.
pub fn catalog(
    store: &mut RecordStore,
    path: &Path,
    excluded: &[PathBuf],
    chunk_size: usize,
    cancel: &Cancellation,
) -> Result<(RootPath, CatalogResult), StageError> {
    let mut files = enumerate::regular_files(path).map_err(|source| StageError::RootUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    for excluded_path in excluded {
        files = files.exclude(excluded_path.clone());
    }

    let root = registry::register(store, path)?;
    let result = reconcile(store, &root, files, chunk_size, cancel)?;

    info!(
        "Cataloged {}: {} new, {} already known",
        root.path.display(),
        result.inserted,
        result.skipped
    );
    Ok((root, result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ExistenceStatus, RecordUpdate};
    use std::fs;
    use tempfile::TempDir;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    fn store_with_root() -> (RecordStore, RootPath) {
        let store = RecordStore::open_in_memory().unwrap();
        let root = store.upsert_root(Path::new("/data")).unwrap();
        (store, root)
    }

    #[test]
    fn test_reconcile_inserts_new_paths() {
        let (mut store, root) = store_with_root();
        let cancel = Cancellation::new();

        let result = reconcile(
            &mut store,
            &root,
            paths(&["a.txt", "b.bin", "a.txt"]),
            DEFAULT_CHUNK_SIZE,
            &cancel,
        )
        .unwrap();

        assert_eq!(
            result,
            CatalogResult {
                inserted: 2,
                skipped: 1,
                cancelled: false
            }
        );
    }

    #[test]
    fn test_reconcile_in_small_chunks() {
        let (mut store, root) = store_with_root();
        let cancel = Cancellation::new();
        let names: Vec<PathBuf> = (0..11).map(|i| PathBuf::from(format!("f{i}"))).collect();

        let result = reconcile(&mut store, &root, names, 3, &cancel).unwrap();

        assert_eq!(result.inserted, 11);
        assert_eq!(store.summary(root.id).unwrap().files, 11);
    }

    #[test]
    fn test_reconcile_twice_keeps_existing_records() {
        let (mut store, root) = store_with_root();
        let cancel = Cancellation::new();
        reconcile(&mut store, &root, paths(&["a.txt"]), 10, &cancel).unwrap();
        let before = store
            .file_by_path(root.id, Path::new("a.txt"))
            .unwrap()
            .unwrap();
        store
            .apply(&[
                RecordUpdate::Existence {
                    id: before.id,
                    status: ExistenceStatus::Present,
                },
                RecordUpdate::Size {
                    id: before.id,
                    size_bytes: 500,
                    mtime_nanos: None,
                },
                RecordUpdate::Checksum {
                    id: before.id,
                    checksum: "x".to_string(),
                },
            ])
            .unwrap();
        let before = store
            .file_by_path(root.id, Path::new("a.txt"))
            .unwrap()
            .unwrap();

        let result =
            reconcile(&mut store, &root, paths(&["a.txt", "c.txt"]), 10, &cancel).unwrap();

        assert_eq!((result.inserted, result.skipped), (1, 1));
        let after = store
            .file_by_path(root.id, Path::new("a.txt"))
            .unwrap()
            .unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_reconcile_cancelled_before_start() {
        let (mut store, root) = store_with_root();
        let cancel = Cancellation::new();
        cancel.cancel();

        let result = reconcile(&mut store, &root, paths(&["a", "b"]), 1, &cancel).unwrap();

        assert!(result.cancelled);
        assert_eq!(result.inserted, 0);
    }

    #[test]
    fn test_catalog_directory_tree() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("a.txt"), "a").unwrap();
        fs::create_dir(dir.join("sub")).unwrap();
        fs::write(dir.join("sub/b.bin"), "b").unwrap();
        fs::write(dir.join("audit.db"), "").unwrap();
        let mut store = RecordStore::open_in_memory().unwrap();
        let cancel = Cancellation::new();

        let (root, result) = catalog(
            &mut store,
            dir,
            &[dir.join("audit.db")],
            DEFAULT_CHUNK_SIZE,
            &cancel,
        )
        .unwrap();

        assert_eq!(root.path, dir);
        assert_eq!(result.inserted, 2);
        assert!(
            store
                .file_by_path(root.id, Path::new("sub/b.bin"))
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .file_by_path(root.id, Path::new("audit.db"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_catalog_missing_root_is_not_registered() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing");
        let mut store = RecordStore::open_in_memory().unwrap();
        let cancel = Cancellation::new();

        match catalog(&mut store, &missing, &[], DEFAULT_CHUNK_SIZE, &cancel) {
            Err(StageError::RootUnreadable { path, .. }) => assert_eq!(path, missing),
            other => panic!("Expected RootUnreadable, got {:?}", other.err()),
        }
        assert!(store.roots().unwrap().is_empty());
    }
}
