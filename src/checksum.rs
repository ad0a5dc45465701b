use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

/// Files larger than this are hashed with the large-file strategy.
pub const DEFAULT_LARGE_FILE_THRESHOLD: u64 = 8 * 1024 * 1024;

const SMALL_FILE_BUFFER: usize = 8192;
const LARGE_FILE_BUFFER: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("Not a regular file: {0}")]
    NotRegularFile(PathBuf),
    #[error("File modified during checksumming: {0}")]
    ConcurrentModification(PathBuf),
    #[error("External hasher {program} failed on {path}: {message}")]
    ExternalTool {
        program: String,
        path: PathBuf,
        message: String,
    },
}

pub struct FileChecksum {
    /// Hex encoded.
    pub sha256: String,
    /// File size in bytes, taken after reading.
    pub size: u64,
}

/// How files above the large-file threshold are read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LargeFileStrategy {
    /// In-process hashing with a larger read buffer.
    Buffered,
    /// A `sha256sum`-compatible program printing the hex digest as its first field.
    External(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashOptions {
    pub large_file_threshold: u64,
    pub large_file_strategy: LargeFileStrategy,
}

impl Default for HashOptions {
    fn default() -> Self {
        HashOptions {
            large_file_threshold: DEFAULT_LARGE_FILE_THRESHOLD,
            large_file_strategy: LargeFileStrategy::Buffered,
        }
    }
}

fn open_error(path: &Path, e: std::io::Error) -> ChecksumError {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        ChecksumError::PermissionDenied(path.to_path_buf())
    } else {
        ChecksumError::Io(e)
    }
}

/// Computes the SHA-256 checksum of a file with concurrent modification detection.
///
/// # Behavior
/// - Records the file's modification time and size before reading
/// - Hashes small files in-process; files above `options.large_file_threshold`
///   use `options.large_file_strategy`. Every strategy yields the same digest
///   for the same content.
/// - Verifies the modification time hasn't changed after reading
///
/// # Errors (may be changed in the future)
/// - `ChecksumError::Io`: File doesn't exist or other I/O errors
/// - `ChecksumError::PermissionDenied`: Insufficient permissions to read the file
/// - `ChecksumError::NotRegularFile`: The path is a symlink, directory or special file;
///   symlinks are never followed
/// - `ChecksumError::ConcurrentModification`: File was detected as being modified while
///   checksumming. Note that the absence of this error is *not* a guarantee that the
///   file was *not* modified.
/// - `ChecksumError::ExternalTool`: The external hasher ran but did not produce a digest
pub fn checksum_file(path: &Path, options: &HashOptions) -> Result<FileChecksum, ChecksumError> {
    debug!("Checksumming {}", path.display());

    let metadata_before = std::fs::symlink_metadata(path).map_err(|e| open_error(path, e))?;
    if !metadata_before.is_file() {
        return Err(ChecksumError::NotRegularFile(path.to_path_buf()));
    }
    let mtime_before = metadata_before.modified().map_err(ChecksumError::Io)?;

    let sha256 = if metadata_before.len() > options.large_file_threshold {
        match &options.large_file_strategy {
            LargeFileStrategy::Buffered => hash_in_process(path, LARGE_FILE_BUFFER)?,
            LargeFileStrategy::External(program) => match hash_external(program, path) {
                Ok(sha256) => sha256,
                Err(ExternalOutcome::Unavailable(e)) => {
                    warn!(
                        "Cannot run {}: {}; hashing {} in-process",
                        program,
                        e,
                        path.display()
                    );
                    hash_in_process(path, LARGE_FILE_BUFFER)?
                }
                Err(ExternalOutcome::Failed(err)) => return Err(err),
            },
        }
    } else {
        hash_in_process(path, SMALL_FILE_BUFFER)?
    };

    let metadata_after = std::fs::symlink_metadata(path).map_err(ChecksumError::Io)?;
    let mtime_after = metadata_after.modified().map_err(ChecksumError::Io)?;

    if mtime_before != mtime_after {
        return Err(ChecksumError::ConcurrentModification(path.to_path_buf()));
    }

    debug!("Checksum of {} is {}", path.display(), sha256);

    Ok(FileChecksum {
        sha256,
        size: metadata_after.len(),
    })
}

fn hash_in_process(path: &Path, buffer_size: usize) -> Result<String, ChecksumError> {
    let mut file = File::open(path).map_err(|e| open_error(path, e))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; buffer_size];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(ChecksumError::Io)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

enum ExternalOutcome {
    /// The program could not be started at all.
    Unavailable(std::io::Error),
    Failed(ChecksumError),
}

fn hash_external(program: &str, path: &Path) -> Result<String, ExternalOutcome> {
    let output = Command::new(program)
        .arg(path)
        .output()
        .map_err(ExternalOutcome::Unavailable)?;

    let failed = |message: String| {
        ExternalOutcome::Failed(ChecksumError::ExternalTool {
            program: program.to_string(),
            path: path.to_path_buf(),
            message,
        })
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(failed(format!("{} ({})", output.status, stderr.trim())));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    // sha256sum prefixes the line with a backslash when it escapes the file name.
    let digest = stdout
        .split_whitespace()
        .next()
        .map(|field| field.trim_start_matches('\\').to_ascii_lowercase())
        .unwrap_or_default();

    if digest.len() != 64 || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(failed(format!("unexpected output {:?}", stdout.trim())));
    }

    Ok(digest)
}
