//! Shared stage runner for the probe, checksum and verify passes.
//!
//! A stage pages through the records that still owe it work in ascending id
//! order, runs the per-record work on a bounded rayon pool, and writes each
//! page's outcomes back in one transaction. The next page starts after the
//! highest id seen, so a record that stays eligible (for example because its
//! size could not be measured) is visited once per pass.

use crate::audit::Mismatch;
use crate::cancel::Cancellation;
use crate::enumerate::{self, EnumerateError};
use crate::registry::RegistryError;
use crate::store::{
    ExistenceStatus, FileId, FileRecord, Pending, RecordStore, RecordUpdate, RootPath,
    StoreError, VerificationStatus,
};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_PAGE_SIZE: usize = 512;
const MAX_PROBE_JOBS: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Cannot read root directory {path}: {source}")]
    RootUnreadable {
        path: PathBuf,
        source: EnumerateError,
    },
    #[error("Cannot start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Probes are mostly waiting on metadata calls, so they run wider than hashing.
pub fn default_probe_jobs() -> usize {
    (available_parallelism() * 4).min(MAX_PROBE_JOBS)
}

pub fn default_hash_jobs() -> usize {
    available_parallelism()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageOptions {
    pub jobs: usize,
    pub page_size: usize,
}

/// What the work for one record concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Existence(ExistenceStatus),
    Size {
        size_bytes: u64,
        mtime_nanos: Option<u64>,
    },
    Checksum(String),
    Intact,
    Corrupted(Mismatch),
    /// The content could not be read; the record is demoted to absent.
    Absent,
    /// Nothing to record; the record stays eligible.
    Skipped,
}

impl Outcome {
    fn update(&self, id: FileId) -> Option<RecordUpdate> {
        match self {
            Outcome::Existence(status) => Some(RecordUpdate::Existence {
                id,
                status: *status,
            }),
            Outcome::Size {
                size_bytes,
                mtime_nanos,
            } => Some(RecordUpdate::Size {
                id,
                size_bytes: *size_bytes,
                mtime_nanos: *mtime_nanos,
            }),
            Outcome::Checksum(checksum) => Some(RecordUpdate::Checksum {
                id,
                checksum: checksum.clone(),
            }),
            Outcome::Intact => Some(RecordUpdate::Verification {
                id,
                status: VerificationStatus::Intact,
            }),
            Outcome::Corrupted(_) => Some(RecordUpdate::Verification {
                id,
                status: VerificationStatus::Corrupted,
            }),
            Outcome::Absent => Some(RecordUpdate::Absent { id }),
            Outcome::Skipped => None,
        }
    }
}

/// Per-outcome counts for one stage pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageTally {
    pub present: usize,
    pub absent: usize,
    pub measured: usize,
    pub computed: usize,
    pub intact: usize,
    pub corrupted: usize,
    pub skipped: usize,
    /// Set when the pass stopped early because of cancellation.
    pub cancelled: bool,
}

impl StageTally {
    /// Records that reached a new state in this pass.
    pub fn processed(&self) -> usize {
        self.present + self.absent + self.measured + self.computed + self.intact + self.corrupted
    }

    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Existence(ExistenceStatus::Present) => self.present += 1,
            Outcome::Existence(ExistenceStatus::Absent) | Outcome::Absent => self.absent += 1,
            Outcome::Existence(ExistenceStatus::Unknown) | Outcome::Skipped => self.skipped += 1,
            Outcome::Size { .. } => self.measured += 1,
            Outcome::Checksum(_) => self.computed += 1,
            Outcome::Intact => self.intact += 1,
            Outcome::Corrupted(_) => self.corrupted += 1,
        }
    }
}

/// Fail with `RootUnreadable` unless the root directory can be listed.
///
/// A missing root (an unmounted volume, say) would otherwise turn every
/// record absent.
pub fn check_root(root: &RootPath) -> Result<(), StageError> {
    enumerate::check_root(&root.path).map_err(|source| StageError::RootUnreadable {
        path: root.path.clone(),
        source,
    })
}

/// Run `work` over every record of `root` that owes `pending`.
///
/// `work` receives the record and its absolute path. Cancellation is checked
/// before each record; outcomes already computed for the current page are
/// still written.
pub fn run_stage<F>(
    store: &mut RecordStore,
    root: &RootPath,
    pending: Pending,
    options: &StageOptions,
    cancel: &Cancellation,
    work: F,
) -> Result<StageTally, StageError>
where
    F: Fn(&FileRecord, &Path) -> Outcome + Sync,
{
    run_stage_with(store, root, pending, options, cancel, work, |_| {})
}

/// Like [`run_stage`], handing every outcome to `committed` once its page
/// has been written.
pub fn run_stage_with<F, C>(
    store: &mut RecordStore,
    root: &RootPath,
    pending: Pending,
    options: &StageOptions,
    cancel: &Cancellation,
    work: F,
    mut committed: C,
) -> Result<StageTally, StageError>
where
    F: Fn(&FileRecord, &Path) -> Outcome + Sync,
    C: FnMut(&Outcome),
{
    check_root(root)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.jobs.max(1))
        .build()?;
    let page_size = options.page_size.max(1);

    let mut tally = StageTally::default();
    let mut after: FileId = 0;

    loop {
        if cancel.is_cancelled() {
            tally.cancelled = true;
            break;
        }

        let page = store.pending(root.id, pending, after, page_size)?;
        let Some(last) = page.last() else {
            break;
        };
        after = last.id;

        let outcomes: Vec<(FileId, Outcome)> = pool.install(|| {
            page.par_iter()
                .filter_map(|record| {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    debug_assert_eq!(record.root_path_id, root.id);
                    let path = root.join(&record.relative_path);
                    Some((record.id, work(record, &path)))
                })
                .collect()
        });

        let updates: Vec<RecordUpdate> = outcomes
            .iter()
            .filter_map(|(id, outcome)| outcome.update(*id))
            .collect();
        let changed = store.apply(&updates)?;
        debug!(
            "{:?} page from #{}: {} outcomes, {} records changed",
            pending,
            page[0].id,
            outcomes.len(),
            changed
        );

        for (_, outcome) in &outcomes {
            committed(outcome);
            tally.record(outcome);
        }

        if page.len() < page_size {
            if cancel.is_cancelled() {
                tally.cancelled = true;
            }
            break;
        }
    }

    Ok(tally)
}
