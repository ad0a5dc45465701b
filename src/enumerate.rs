//! Recursive enumeration of the regular files under a root.
//!
//! The enumerator is a lazy iterator over relative paths so that trees with
//! millions of files never need to be held in memory at once. Directories,
//! symlinks and special files are not yielded. Entries that cannot be read
//! (for example a subdirectory without permissions) are logged and skipped;
//! only an unreadable root is an error.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, thiserror::Error)]
pub enum EnumerateError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
}

pub struct FileEnumerator {
    root: PathBuf,
    walker: walkdir::IntoIter,
    excluded: Vec<PathBuf>,
}

/// Fail unless `root` is a directory whose entries can be listed.
pub fn check_root(root: &Path) -> Result<(), EnumerateError> {
    let metadata = std::fs::metadata(root).map_err(|e| root_error(root, e))?;
    if !metadata.is_dir() {
        return Err(EnumerateError::NotADirectory(root.to_path_buf()));
    }

    // Surface an unreadable root up front rather than as a skipped entry.
    std::fs::read_dir(root).map_err(|e| root_error(root, e))?;
    Ok(())
}

fn root_error(root: &Path, e: std::io::Error) -> EnumerateError {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        EnumerateError::PermissionDenied(root.to_path_buf())
    } else {
        EnumerateError::Io(e)
    }
}

/// Start enumerating the regular files below `root`.
///
/// Calling this again on the same root restarts the enumeration from the beginning.
pub fn regular_files(root: &Path) -> Result<FileEnumerator, EnumerateError> {
    check_root(root)?;

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    Ok(FileEnumerator {
        root: root.to_path_buf(),
        walker,
        excluded: Vec::new(),
    })
}

impl FileEnumerator {
    /// Never yield the file at absolute `path`.
    pub fn exclude(mut self, path: PathBuf) -> Self {
        self.excluded.push(path);
        self
    }
}

impl Iterator for FileEnumerator {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            if self.excluded.iter().any(|p| p == entry.path()) {
                debug!("Excluding {}", entry.path().display());
                continue;
            }

            match entry.path().strip_prefix(&self.root) {
                Ok(relative) => return Some(relative.to_path_buf()),
                Err(_) => continue,
            }
        }
    }
}
