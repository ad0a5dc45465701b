//! Checksum computation, verification and the full audit run.

use crate::cancel::Cancellation;
use crate::catalog::{self, CatalogResult};
use crate::checksum::{ChecksumError, HashOptions, checksum_file};
use crate::config::Settings;
use crate::pipeline::{self, Outcome, StageError, StageOptions, StageTally};
use crate::probe;
use crate::store::{FileId, Pending, RecordStore, RootPath};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A verified file whose content no longer matches its recorded baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub id: FileId,
    /// Relative to the root.
    pub path: PathBuf,
    pub stored_checksum: String,
    pub observed_checksum: String,
    pub stored_size: Option<u64>,
    pub observed_size: u64,
}

/// Hash every present record that has no checksum yet.
///
/// Unreadable files are demoted to absent. Files modified while being hashed
/// stay owed for a later pass.
pub fn compute_checksums(
    store: &mut RecordStore,
    root: &RootPath,
    options: &StageOptions,
    hash: &HashOptions,
    cancel: &Cancellation,
) -> Result<StageTally, StageError> {
    let tally = pipeline::run_stage(
        store,
        root,
        Pending::Checksum,
        options,
        cancel,
        |_, path| match checksum_file(path, hash) {
            Ok(checksum) => Outcome::Checksum(checksum.sha256),
            Err(e) => read_failure(path, e),
        },
    )?;

    info!(
        "Checksums of {}: {} computed, {} unreadable, {} deferred",
        root.path.display(),
        tally.computed,
        tally.absent,
        tally.skipped
    );
    Ok(tally)
}

/// Re-hash every present record awaiting verification and compare with its baseline.
///
/// `on_mismatch` sees each corrupted record once its page is committed, so an
/// interrupted pass still reports what it wrote.
pub fn verify(
    store: &mut RecordStore,
    root: &RootPath,
    options: &StageOptions,
    hash: &HashOptions,
    cancel: &Cancellation,
    mut on_mismatch: impl FnMut(&Mismatch),
) -> Result<StageTally, StageError> {
    let tally = pipeline::run_stage_with(
        store,
        root,
        Pending::Verification,
        options,
        cancel,
        |record, path| {
            let Some(stored) = record.checksum.as_deref() else {
                return Outcome::Skipped;
            };
            match checksum_file(path, hash) {
                Ok(observed) if observed.sha256 == stored => Outcome::Intact,
                Ok(observed) => {
                    let mismatch = Mismatch {
                        id: record.id,
                        path: record.relative_path.clone(),
                        stored_checksum: stored.to_string(),
                        observed_checksum: observed.sha256,
                        stored_size: record.size_bytes,
                        observed_size: observed.size,
                    };
                    warn!(
                        "Checksum mismatch for #{} {}: {} -> {}",
                        mismatch.id,
                        path.display(),
                        mismatch.stored_checksum,
                        mismatch.observed_checksum
                    );
                    Outcome::Corrupted(mismatch)
                }
                Err(e) => read_failure(path, e),
            }
        },
        |outcome| {
            if let Outcome::Corrupted(mismatch) = outcome {
                on_mismatch(mismatch);
            }
        },
    )?;

    info!(
        "Verification of {}: {} intact, {} corrupted, {} unreadable",
        root.path.display(),
        tally.intact,
        tally.corrupted,
        tally.absent
    );
    Ok(tally)
}

fn read_failure(path: &Path, error: ChecksumError) -> Outcome {
    match error {
        ChecksumError::ConcurrentModification(_) => {
            warn!(
                "{} changed while being hashed, leaving it for a later pass",
                path.display()
            );
            Outcome::Skipped
        }
        ChecksumError::ExternalTool { .. } => {
            warn!("{}", error);
            Outcome::Skipped
        }
        ChecksumError::Io(_)
        | ChecksumError::PermissionDenied(_)
        | ChecksumError::NotRegularFile(_) => {
            warn!("Cannot read {}: {}; marking absent", path.display(), error);
            Outcome::Absent
        }
    }
}

/// Queue every present record of `root` for verification again.
///
/// Refuses when the root is unreadable, since the pass that follows would
/// demote everything to absent.
pub fn reset_verification(store: &RecordStore, root: &RootPath) -> Result<usize, StageError> {
    pipeline::check_root(root)?;
    let reset = store.reset_verification(root.id)?;
    info!(
        "Queued {} records of {} for verification",
        reset,
        root.path.display()
    );
    Ok(reset)
}

/// Results of each step of a full audit run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditRun {
    pub catalog: CatalogResult,
    pub existence: StageTally,
    pub size: StageTally,
    pub checksums: StageTally,
    pub reset: usize,
    pub verification: StageTally,
    pub cancelled: bool,
}

/// Catalog `path`, run every stage, then re-verify all present records.
///
/// Stops after the step during which cancellation was observed.
pub fn run_audit(
    store: &mut RecordStore,
    path: &Path,
    excluded: &[PathBuf],
    settings: &Settings,
    cancel: &Cancellation,
    on_mismatch: impl FnMut(&Mismatch),
) -> Result<AuditRun, StageError> {
    let mut run = AuditRun::default();
    let probe_stage = settings.probe_stage();
    let hash_stage = settings.hash_stage();

    let (root, catalog) =
        catalog::catalog(store, path, excluded, settings.catalog_chunk, cancel)?;
    run.catalog = catalog;
    if cancel.is_cancelled() {
        run.cancelled = true;
        return Ok(run);
    }

    run.existence = probe::probe_existence(store, &root, &probe_stage, cancel)?;
    if run.existence.cancelled {
        run.cancelled = true;
        return Ok(run);
    }

    run.size = probe::probe_size(store, &root, &probe_stage, cancel)?;
    if run.size.cancelled {
        run.cancelled = true;
        return Ok(run);
    }

    run.checksums = compute_checksums(store, &root, &hash_stage, &settings.hash, cancel)?;
    if run.checksums.cancelled {
        run.cancelled = true;
        return Ok(run);
    }

    run.reset = reset_verification(store, &root)?;
    run.verification = verify(
        store,
        &root,
        &hash_stage,
        &settings.hash,
        cancel,
        on_mismatch,
    )?;
    run.cancelled = run.verification.cancelled;
    Ok(run)
}
