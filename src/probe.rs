//! Existence and size probes.

use crate::cancel::Cancellation;
use crate::pipeline::{self, Outcome, StageError, StageOptions, StageTally};
use crate::store::{ExistenceStatus, Pending, RecordStore, RootPath};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Decide present or absent for every record whose existence is unknown.
///
/// A record is present when its path is a regular file. Symlinks, directories
/// and anything that cannot be stat'ed count as absent.
pub fn probe_existence(
    store: &mut RecordStore,
    root: &RootPath,
    options: &StageOptions,
    cancel: &Cancellation,
) -> Result<StageTally, StageError> {
    let tally = pipeline::run_stage(
        store,
        root,
        Pending::Existence,
        options,
        cancel,
        |_, path| match std::fs::symlink_metadata(path) {
            Ok(metadata) if metadata.is_file() => Outcome::Existence(ExistenceStatus::Present),
            Ok(_) => {
                debug!("{} is not a regular file", path.display());
                Outcome::Existence(ExistenceStatus::Absent)
            }
            Err(e) => {
                debug!("{}: {}", path.display(), e);
                Outcome::Existence(ExistenceStatus::Absent)
            }
        },
    )?;

    info!(
        "Existence of {}: {} present, {} absent",
        root.path.display(),
        tally.present,
        tally.absent
    );
    Ok(tally)
}

/// Record the byte size and modification time of present records without a size.
///
/// A file that cannot be measured keeps its size unset for a later pass.
pub fn probe_size(
    store: &mut RecordStore,
    root: &RootPath,
    options: &StageOptions,
    cancel: &Cancellation,
) -> Result<StageTally, StageError> {
    let tally = pipeline::run_stage(
        store,
        root,
        Pending::Size,
        options,
        cancel,
        |_, path| match std::fs::symlink_metadata(path) {
            Ok(metadata) if metadata.is_file() => Outcome::Size {
                size_bytes: metadata.len(),
                mtime_nanos: metadata.modified().ok().and_then(unix_nanos),
            },
            Ok(_) => {
                warn!("Cannot measure {}: not a regular file", path.display());
                Outcome::Skipped
            }
            Err(e) => {
                warn!("Cannot measure {}: {}", path.display(), e);
                Outcome::Skipped
            }
        },
    )?;

    info!(
        "Sizes of {}: {} measured, {} unavailable",
        root.path.display(),
        tally.measured,
        tally.skipped
    );
    Ok(tally)
}

fn unix_nanos(time: SystemTime) -> Option<u64> {
    let since_epoch = time.duration_since(UNIX_EPOCH).ok()?;
    u64::try_from(since_epoch.as_nanos()).ok()
}
