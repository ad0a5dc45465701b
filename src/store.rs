//! SQLite-backed record store for root paths and per-file audit records.
//!
//! Every write that changes a single record is a single parameterized UPDATE
//! whose WHERE clause re-states the state it expects to transition from. This
//! keeps each record consistent even if a batch transaction is interrupted, and
//! it keeps stored sizes and checksums from ever being overwritten in place.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, ToSql, params};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const SCHEMA_VERSION: u32 = 1;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS root_paths (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path BLOB NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    root_path_id INTEGER NOT NULL REFERENCES root_paths(id),
    relative_path BLOB NOT NULL,
    size_bytes INTEGER,
    mtime_nanos INTEGER,
    checksum_sha256 TEXT,
    existence INTEGER NOT NULL DEFAULT 0,
    verification INTEGER NOT NULL DEFAULT 0,
    UNIQUE (root_path_id, relative_path)
);
CREATE INDEX IF NOT EXISTS idx_files_root_existence ON files(root_path_id, existence);
"#;

const FILE_COLUMNS: &str = "id, root_path_id, relative_path, size_bytes, mtime_nanos, \
                            checksum_sha256, existence, verification";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record store unavailable: {0}")]
    Unavailable(#[from] rusqlite::Error),
    #[error("Unsupported record store schema version: {0}")]
    UnsupportedVersion(u32),
}

pub type RootPathId = i64;
pub type FileId = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootPath {
    pub id: RootPathId,
    pub path: PathBuf,
}

impl RootPath {
    /// Absolute location of a file cataloged under this root.
    pub fn join(&self, relative_path: &Path) -> PathBuf {
        self.path.join(relative_path)
    }
}

/// Whether a cataloged file was found on disk. Stored as 0, 1, 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistenceStatus {
    Unknown,
    Present,
    Absent,
}

/// Outcome of the most recent re-check against the stored checksum. Stored as 0, 1, 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    Unpending,
    Intact,
    Corrupted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: FileId,
    pub root_path_id: RootPathId,
    pub relative_path: PathBuf,
    pub size_bytes: Option<u64>,
    /// Modification time in nanoseconds since the Unix epoch, captured with the size.
    pub mtime_nanos: Option<u64>,
    /// Hex encoded SHA-256.
    pub checksum: Option<String>,
    pub existence: ExistenceStatus,
    pub verification: VerificationStatus,
}

/// The work a stage still owes a record, expressed as a selection predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pending {
    Existence,
    Size,
    Checksum,
    Verification,
}

impl Pending {
    fn predicate(self) -> &'static str {
        match self {
            Pending::Existence => "existence = 0",
            Pending::Size => "existence = 1 AND size_bytes IS NULL",
            Pending::Checksum => "existence = 1 AND checksum_sha256 IS NULL",
            Pending::Verification => {
                "existence = 1 AND checksum_sha256 IS NOT NULL AND verification = 0"
            }
        }
    }
}

/// A single-record state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordUpdate {
    Existence {
        id: FileId,
        status: ExistenceStatus,
    },
    Size {
        id: FileId,
        size_bytes: u64,
        mtime_nanos: Option<u64>,
    },
    Checksum {
        id: FileId,
        checksum: String,
    },
    Verification {
        id: FileId,
        status: VerificationStatus,
    },
    /// Demote a present record whose content could not be read.
    Absent { id: FileId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing {
    Absent,
    Corrupted,
    Largest,
    Recent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub files: u64,
    pub unknown: u64,
    pub present: u64,
    pub absent: u64,
    pub sized: u64,
    pub checksummed: u64,
    pub awaiting_verification: u64,
    pub intact: u64,
    pub corrupted: u64,
    pub total_bytes: u64,
}

pub struct RecordStore {
    conn: Connection,
}

impl RecordStore {
    /// Open (creating if needed) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(Duration::from_secs(30))?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA_SQL)?;

        let version: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match version {
            None => {
                conn.execute(
                    "INSERT INTO meta (key, value) VALUES ('schema_version', ?1)",
                    params![SCHEMA_VERSION.to_string()],
                )?;
            }
            Some(v) => {
                let v: u32 = v.trim().parse().unwrap_or(0);
                if v != SCHEMA_VERSION {
                    return Err(StoreError::UnsupportedVersion(v));
                }
            }
        }

        Ok(RecordStore { conn })
    }

    pub fn find_root(&self, path: &Path) -> Result<Option<RootPath>, StoreError> {
        let root = self
            .conn
            .query_row(
                "SELECT id, path FROM root_paths WHERE path = ?1",
                params![path_to_bytes(path)],
                root_from_row,
            )
            .optional()?;
        Ok(root)
    }

    /// Insert `path` unless it is already present, returning the stored row either way.
    pub fn upsert_root(&self, path: &Path) -> Result<RootPath, StoreError> {
        let bytes = path_to_bytes(path);
        self.conn.execute(
            "INSERT OR IGNORE INTO root_paths (path) VALUES (?1)",
            params![bytes],
        )?;
        let root = self.conn.query_row(
            "SELECT id, path FROM root_paths WHERE path = ?1",
            params![bytes],
            root_from_row,
        )?;
        Ok(root)
    }

    pub fn roots(&self) -> Result<Vec<RootPath>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, path FROM root_paths ORDER BY id")?;
        let roots = stmt
            .query_map([], root_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(roots)
    }

    /// Insert a record for every path not yet cataloged under `root_id`.
    ///
    /// Runs as one transaction. Returns `(inserted, skipped)`; a path already
    /// present (including one repeated within `paths`) counts as skipped.
    pub fn insert_files(
        &mut self,
        root_id: RootPathId,
        paths: &[PathBuf],
    ) -> Result<(usize, usize), StoreError> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO files (root_path_id, relative_path) VALUES (?1, ?2)",
            )?;
            for path in paths {
                inserted += stmt.execute(params![root_id, path_to_bytes(path)])?;
            }
        }
        tx.commit()?;

        Ok((inserted, paths.len() - inserted))
    }

    /// Up to `limit` records of `root_id` that still owe `pending` work and have an id
    /// greater than `after`, in ascending id order.
    pub fn pending(
        &self,
        root_id: RootPathId,
        pending: Pending,
        after: FileId,
        limit: usize,
    ) -> Result<Vec<FileRecord>, StoreError> {
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM files \
             WHERE root_path_id = ?1 AND id > ?2 AND {} \
             ORDER BY id LIMIT ?3",
            pending.predicate()
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let records = stmt
            .query_map(params![root_id, after, limit as i64], file_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Apply a batch of single-record transitions in one transaction.
    ///
    /// Returns how many records actually changed. An update whose expected prior
    /// state no longer holds is a no-op.
    pub fn apply(&mut self, updates: &[RecordUpdate]) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        let mut changed = 0;
        for update in updates {
            changed += match update {
                RecordUpdate::Existence { id, status } => tx
                    .prepare_cached("UPDATE files SET existence = ?2 WHERE id = ?1 AND existence = 0")?
                    .execute(params![id, status])?,
                RecordUpdate::Size {
                    id,
                    size_bytes,
                    mtime_nanos,
                } => tx
                    .prepare_cached(
                        "UPDATE files SET size_bytes = ?2, mtime_nanos = ?3 \
                         WHERE id = ?1 AND existence = 1 AND size_bytes IS NULL",
                    )?
                    .execute(params![
                        id,
                        *size_bytes as i64,
                        mtime_nanos.map(|m| m as i64)
                    ])?,
                RecordUpdate::Checksum { id, checksum } => tx
                    .prepare_cached(
                        "UPDATE files SET checksum_sha256 = ?2 \
                         WHERE id = ?1 AND existence = 1 AND checksum_sha256 IS NULL",
                    )?
                    .execute(params![id, checksum])?,
                RecordUpdate::Verification { id, status } => tx
                    .prepare_cached(
                        "UPDATE files SET verification = ?2 \
                         WHERE id = ?1 AND existence = 1 AND checksum_sha256 IS NOT NULL",
                    )?
                    .execute(params![id, status])?,
                RecordUpdate::Absent { id } => tx
                    .prepare_cached("UPDATE files SET existence = 2 WHERE id = ?1 AND existence = 1")?
                    .execute(params![id])?,
            };
        }
        tx.commit()?;

        debug!("Applied {} of {} record updates", changed, updates.len());
        Ok(changed)
    }

    /// Mark every present record of `root_id` as awaiting verification.
    pub fn reset_verification(&self, root_id: RootPathId) -> Result<usize, StoreError> {
        let reset = self.conn.execute(
            "UPDATE files SET verification = 0 WHERE root_path_id = ?1 AND existence = 1",
            params![root_id],
        )?;
        Ok(reset)
    }

    /// Drop the baseline of corrupted records so the next passes record current content.
    pub fn accept_changes(&self, root_id: RootPathId) -> Result<usize, StoreError> {
        let accepted = self.conn.execute(
            "UPDATE files \
             SET checksum_sha256 = NULL, size_bytes = NULL, mtime_nanos = NULL, verification = 0 \
             WHERE root_path_id = ?1 AND verification = 2",
            params![root_id],
        )?;
        Ok(accepted)
    }

    /// Return absent records to `unknown` so the existence probe looks at them again.
    pub fn requeue_absent(&self, root_id: RootPathId) -> Result<usize, StoreError> {
        let requeued = self.conn.execute(
            "UPDATE files SET existence = 0, verification = 0 \
             WHERE root_path_id = ?1 AND existence = 2",
            params![root_id],
        )?;
        Ok(requeued)
    }

    #[cfg(test)]
    pub fn file_by_path(
        &self,
        root_id: RootPathId,
        relative_path: &Path,
    ) -> Result<Option<FileRecord>, StoreError> {
        let record = self
            .conn
            .query_row(
                &format!(
                    "SELECT {FILE_COLUMNS} FROM files WHERE root_path_id = ?1 AND relative_path = ?2"
                ),
                params![root_id, path_to_bytes(relative_path)],
                file_from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn summary(&self, root_id: RootPathId) -> Result<Summary, StoreError> {
        let summary = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(existence = 0), 0),
                    COALESCE(SUM(existence = 1), 0),
                    COALESCE(SUM(existence = 2), 0),
                    COALESCE(SUM(size_bytes IS NOT NULL), 0),
                    COALESCE(SUM(checksum_sha256 IS NOT NULL), 0),
                    COALESCE(SUM(existence = 1 AND checksum_sha256 IS NOT NULL AND verification = 0), 0),
                    COALESCE(SUM(verification = 1), 0),
                    COALESCE(SUM(verification = 2), 0),
                    COALESCE(SUM(size_bytes), 0)
             FROM files WHERE root_path_id = ?1",
            params![root_id],
            |row| {
                let count = |idx: usize| row.get::<_, i64>(idx).map(|v| v.max(0) as u64);
                Ok(Summary {
                    files: count(0)?,
                    unknown: count(1)?,
                    present: count(2)?,
                    absent: count(3)?,
                    sized: count(4)?,
                    checksummed: count(5)?,
                    awaiting_verification: count(6)?,
                    intact: count(7)?,
                    corrupted: count(8)?,
                    total_bytes: count(9)?,
                })
            },
        )?;
        Ok(summary)
    }

    pub fn listing(
        &self,
        root_id: RootPathId,
        listing: Listing,
        limit: Option<usize>,
    ) -> Result<Vec<FileRecord>, StoreError> {
        let (filter, order) = match listing {
            Listing::Absent => ("existence = 2", "size_bytes DESC, id"),
            Listing::Corrupted => ("verification = 2", "size_bytes DESC, id"),
            Listing::Largest => ("size_bytes IS NOT NULL", "size_bytes DESC, id"),
            Listing::Recent => (
                "existence = 1 AND mtime_nanos IS NOT NULL",
                "mtime_nanos DESC, id",
            ),
        };
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE root_path_id = ?1 AND {filter} \
             ORDER BY {order} LIMIT ?2"
        );
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![root_id, limit], file_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}

fn root_from_row(row: &Row<'_>) -> rusqlite::Result<RootPath> {
    Ok(RootPath {
        id: row.get(0)?,
        path: path_from_bytes(row.get(1)?),
    })
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        root_path_id: row.get(1)?,
        relative_path: path_from_bytes(row.get(2)?),
        size_bytes: row.get::<_, Option<i64>>(3)?.map(|v| v as u64),
        mtime_nanos: row.get::<_, Option<i64>>(4)?.map(|v| v as u64),
        checksum: row.get(5)?,
        existence: row.get(6)?,
        verification: row.get(7)?,
    })
}

/// Paths are stored as raw OS bytes on Unix so that non-UTF-8 names survive.
fn path_to_bytes(path: &Path) -> Vec<u8> {
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        path.as_os_str().as_bytes().to_vec()
    }
    #[cfg(not(unix))]
    {
        path.to_string_lossy().into_owned().into_bytes()
    }
}

fn path_from_bytes(bytes: Vec<u8>) -> PathBuf {
    #[cfg(unix)]
    {
        use std::ffi::OsString;
        use std::os::unix::ffi::OsStringExt;
        PathBuf::from(OsString::from_vec(bytes))
    }
    #[cfg(not(unix))]
    {
        PathBuf::from(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl ToSql for ExistenceStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value: i64 = match self {
            ExistenceStatus::Unknown => 0,
            ExistenceStatus::Present => 1,
            ExistenceStatus::Absent => 2,
        };
        Ok(ToSqlOutput::from(value))
    }
}

impl FromSql for ExistenceStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_i64()? {
            0 => Ok(ExistenceStatus::Unknown),
            1 => Ok(ExistenceStatus::Present),
            2 => Ok(ExistenceStatus::Absent),
            other => Err(FromSqlError::OutOfRange(other)),
        }
    }
}

impl ToSql for VerificationStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value: i64 = match self {
            VerificationStatus::Unpending => 0,
            VerificationStatus::Intact => 1,
            VerificationStatus::Corrupted => 2,
        };
        Ok(ToSqlOutput::from(value))
    }
}

impl FromSql for VerificationStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_i64()? {
            0 => Ok(VerificationStatus::Unpending),
            1 => Ok(VerificationStatus::Intact),
            2 => Ok(VerificationStatus::Corrupted),
            other => Err(FromSqlError::OutOfRange(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_with_root() -> (RecordStore, RootPath) {
        let store = RecordStore::open_in_memory().unwrap();
        let root = store.upsert_root(Path::new("/data")).unwrap();
        (store, root)
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_upsert_root_is_idempotent() {
        let store = RecordStore::open_in_memory().unwrap();

        let first = store.upsert_root(Path::new("/data")).unwrap();
        let second = store.upsert_root(Path::new("/data")).unwrap();
        let other = store.upsert_root(Path::new("/backup")).unwrap();

        assert_eq!(first, second);
        assert_ne!(first.id, other.id);
        assert_eq!(store.roots().unwrap(), vec![first, other]);
    }

    #[test]
    fn test_find_root_missing() {
        let store = RecordStore::open_in_memory().unwrap();
        assert_eq!(store.find_root(Path::new("/nowhere")).unwrap(), None);
    }

    #[test]
    fn test_insert_files_skips_duplicates() {
        let (mut store, root) = store_with_root();

        let (inserted, skipped) = store
            .insert_files(root.id, &paths(&["a.txt", "b.bin", "a.txt"]))
            .unwrap();
        assert_eq!((inserted, skipped), (2, 1));

        let (inserted, skipped) = store
            .insert_files(root.id, &paths(&["a.txt", "c.txt"]))
            .unwrap();
        assert_eq!((inserted, skipped), (1, 1));

        let record = store
            .file_by_path(root.id, Path::new("a.txt"))
            .unwrap()
            .unwrap();
        assert_eq!(record.existence, ExistenceStatus::Unknown);
        assert_eq!(record.verification, VerificationStatus::Unpending);
        assert_eq!(record.size_bytes, None);
        assert_eq!(record.checksum, None);
    }

    #[test]
    fn test_same_relative_path_under_different_roots() {
        let (mut store, root) = store_with_root();
        let other = store.upsert_root(Path::new("/backup")).unwrap();

        store.insert_files(root.id, &paths(&["a.txt"])).unwrap();
        let (inserted, _) = store.insert_files(other.id, &paths(&["a.txt"])).unwrap();

        assert_eq!(inserted, 1);
    }

    #[test]
    fn test_pending_pages_by_id() {
        let (mut store, root) = store_with_root();
        store
            .insert_files(root.id, &paths(&["1", "2", "3", "4", "5"]))
            .unwrap();

        let first = store.pending(root.id, Pending::Existence, 0, 2).unwrap();
        assert_eq!(first.len(), 2);
        let second = store
            .pending(root.id, Pending::Existence, first[1].id, 2)
            .unwrap();
        assert_eq!(second.len(), 2);
        assert!(second[0].id > first[1].id);
        let third = store
            .pending(root.id, Pending::Existence, second[1].id, 2)
            .unwrap();
        assert_eq!(third.len(), 1);
    }

    #[test]
    fn test_pending_predicates_follow_state() {
        let (mut store, root) = store_with_root();
        store.insert_files(root.id, &paths(&["a", "b"])).unwrap();
        let a = store.file_by_path(root.id, Path::new("a")).unwrap().unwrap();
        let b = store.file_by_path(root.id, Path::new("b")).unwrap().unwrap();

        assert!(store.pending(root.id, Pending::Size, 0, 10).unwrap().is_empty());

        store
            .apply(&[
                RecordUpdate::Existence {
                    id: a.id,
                    status: ExistenceStatus::Present,
                },
                RecordUpdate::Existence {
                    id: b.id,
                    status: ExistenceStatus::Absent,
                },
            ])
            .unwrap();

        let size = store.pending(root.id, Pending::Size, 0, 10).unwrap();
        assert_eq!(size.len(), 1);
        assert_eq!(size[0].id, a.id);
        assert!(
            store
                .pending(root.id, Pending::Verification, 0, 10)
                .unwrap()
                .is_empty()
        );

        store
            .apply(&[RecordUpdate::Checksum {
                id: a.id,
                checksum: "abc".to_string(),
            }])
            .unwrap();
        assert!(store.pending(root.id, Pending::Checksum, 0, 10).unwrap().is_empty());
        assert_eq!(
            store
                .pending(root.id, Pending::Verification, 0, 10)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_checksum_and_size_never_overwritten() {
        let (mut store, root) = store_with_root();
        store.insert_files(root.id, &paths(&["a"])).unwrap();
        let a = store.file_by_path(root.id, Path::new("a")).unwrap().unwrap();

        store
            .apply(&[
                RecordUpdate::Existence {
                    id: a.id,
                    status: ExistenceStatus::Present,
                },
                RecordUpdate::Size {
                    id: a.id,
                    size_bytes: 10,
                    mtime_nanos: Some(5),
                },
                RecordUpdate::Checksum {
                    id: a.id,
                    checksum: "first".to_string(),
                },
            ])
            .unwrap();

        let changed = store
            .apply(&[
                RecordUpdate::Size {
                    id: a.id,
                    size_bytes: 20,
                    mtime_nanos: None,
                },
                RecordUpdate::Checksum {
                    id: a.id,
                    checksum: "second".to_string(),
                },
            ])
            .unwrap();
        assert_eq!(changed, 0);

        let a = store.file_by_path(root.id, Path::new("a")).unwrap().unwrap();
        assert_eq!(a.size_bytes, Some(10));
        assert_eq!(a.mtime_nanos, Some(5));
        assert_eq!(a.checksum.as_deref(), Some("first"));
    }

    #[test]
    fn test_checksum_requires_present() {
        let (mut store, root) = store_with_root();
        store.insert_files(root.id, &paths(&["a"])).unwrap();
        let a = store.file_by_path(root.id, Path::new("a")).unwrap().unwrap();

        let changed = store
            .apply(&[RecordUpdate::Checksum {
                id: a.id,
                checksum: "abc".to_string(),
            }])
            .unwrap();

        assert_eq!(changed, 0);
    }

    #[test]
    fn test_existence_only_leaves_unknown_once() {
        let (mut store, root) = store_with_root();
        store.insert_files(root.id, &paths(&["a"])).unwrap();
        let a = store.file_by_path(root.id, Path::new("a")).unwrap().unwrap();

        store
            .apply(&[RecordUpdate::Existence {
                id: a.id,
                status: ExistenceStatus::Absent,
            }])
            .unwrap();
        let changed = store
            .apply(&[RecordUpdate::Existence {
                id: a.id,
                status: ExistenceStatus::Present,
            }])
            .unwrap();

        assert_eq!(changed, 0);
        let a = store.file_by_path(root.id, Path::new("a")).unwrap().unwrap();
        assert_eq!(a.existence, ExistenceStatus::Absent);
    }

    fn verified_store(statuses: &[(&str, VerificationStatus)]) -> (RecordStore, RootPath) {
        let (mut store, root) = store_with_root();
        let names: Vec<&str> = statuses.iter().map(|(n, _)| *n).collect();
        store.insert_files(root.id, &paths(&names)).unwrap();
        for (name, status) in statuses {
            let r = store.file_by_path(root.id, Path::new(name)).unwrap().unwrap();
            store
                .apply(&[
                    RecordUpdate::Existence {
                        id: r.id,
                        status: ExistenceStatus::Present,
                    },
                    RecordUpdate::Size {
                        id: r.id,
                        size_bytes: name.len() as u64,
                        mtime_nanos: Some(name.len() as u64),
                    },
                    RecordUpdate::Checksum {
                        id: r.id,
                        checksum: format!("sum-{name}"),
                    },
                    RecordUpdate::Verification {
                        id: r.id,
                        status: *status,
                    },
                ])
                .unwrap();
        }
        (store, root)
    }

    #[test]
    fn test_reset_verification_only_touches_present() {
        let (mut store, root) = verified_store(&[
            ("a", VerificationStatus::Intact),
            ("bb", VerificationStatus::Corrupted),
        ]);
        store.insert_files(root.id, &paths(&["new"])).unwrap();

        let reset = store.reset_verification(root.id).unwrap();

        assert_eq!(reset, 2);
        assert_eq!(
            store
                .pending(root.id, Pending::Verification, 0, 10)
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn test_accept_changes_clears_corrupted_baseline() {
        let (store, root) = verified_store(&[
            ("a", VerificationStatus::Intact),
            ("bb", VerificationStatus::Corrupted),
        ]);

        assert_eq!(store.accept_changes(root.id).unwrap(), 1);

        let bb = store.file_by_path(root.id, Path::new("bb")).unwrap().unwrap();
        assert_eq!(bb.checksum, None);
        assert_eq!(bb.size_bytes, None);
        assert_eq!(bb.verification, VerificationStatus::Unpending);
        assert_eq!(bb.existence, ExistenceStatus::Present);

        let a = store.file_by_path(root.id, Path::new("a")).unwrap().unwrap();
        assert_eq!(a.checksum.as_deref(), Some("sum-a"));
    }

    #[test]
    fn test_requeue_absent() {
        let (mut store, root) = verified_store(&[("a", VerificationStatus::Intact)]);
        let a = store.file_by_path(root.id, Path::new("a")).unwrap().unwrap();
        store.apply(&[RecordUpdate::Absent { id: a.id }]).unwrap();

        assert_eq!(store.requeue_absent(root.id).unwrap(), 1);

        let a = store.file_by_path(root.id, Path::new("a")).unwrap().unwrap();
        assert_eq!(a.existence, ExistenceStatus::Unknown);
        assert_eq!(a.checksum.as_deref(), Some("sum-a"));
    }

    #[test]
    fn test_summary_counts() {
        let (mut store, root) = verified_store(&[
            ("a", VerificationStatus::Intact),
            ("bb", VerificationStatus::Corrupted),
            ("ccc", VerificationStatus::Unpending),
        ]);
        store.insert_files(root.id, &paths(&["new"])).unwrap();

        let summary = store.summary(root.id).unwrap();

        assert_eq!(
            summary,
            Summary {
                files: 4,
                unknown: 1,
                present: 3,
                absent: 0,
                sized: 3,
                checksummed: 3,
                awaiting_verification: 1,
                intact: 1,
                corrupted: 1,
                total_bytes: 6,
            }
        );
    }

    #[test]
    fn test_summary_of_empty_root() {
        let (store, root) = store_with_root();
        assert_eq!(store.summary(root.id).unwrap(), Summary::default());
    }

    #[test]
    fn test_listing_orders() {
        let (store, root) = verified_store(&[
            ("a", VerificationStatus::Intact),
            ("ccc", VerificationStatus::Corrupted),
            ("bb", VerificationStatus::Corrupted),
        ]);

        let largest: Vec<PathBuf> = store
            .listing(root.id, Listing::Largest, Some(2))
            .unwrap()
            .into_iter()
            .map(|r| r.relative_path)
            .collect();
        assert_eq!(largest, paths(&["ccc", "bb"]));

        let corrupted = store.listing(root.id, Listing::Corrupted, None).unwrap();
        assert_eq!(corrupted.len(), 2);

        let recent = store.listing(root.id, Listing::Recent, None).unwrap();
        assert_eq!(recent[0].relative_path, PathBuf::from("ccc"));

        assert!(store.listing(root.id, Listing::Absent, None).unwrap().is_empty());
    }

    #[test]
    fn test_reopen_preserves_records() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("audit.db");

        {
            let mut store = RecordStore::open(&db).unwrap();
            let root = store.upsert_root(Path::new("/data")).unwrap();
            store.insert_files(root.id, &paths(&["a"])).unwrap();
        }

        let store = RecordStore::open(&db).unwrap();
        let root = store.find_root(Path::new("/data")).unwrap().unwrap();
        assert!(store.file_by_path(root.id, Path::new("a")).unwrap().is_some());
    }

    #[test]
    fn test_unsupported_schema_version() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("audit.db");

        drop(RecordStore::open(&db).unwrap());
        {
            let conn = Connection::open(&db).unwrap();
            conn.execute(
                "UPDATE meta SET value = '99' WHERE key = 'schema_version'",
                [],
            )
            .unwrap();
        }

        match RecordStore::open(&db) {
            Err(StoreError::UnsupportedVersion(99)) => {}
            other => panic!("Expected UnsupportedVersion, got {:?}", other.err()),
        }
    }

    #[test]
    #[cfg(unix)]
    fn test_non_utf8_relative_path_round_trips() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let (mut store, root) = store_with_root();
        let name = PathBuf::from(OsStr::from_bytes(b"caf\xe9.txt"));

        store.insert_files(root.id, &[name.clone()]).unwrap();

        let record = store.file_by_path(root.id, &name).unwrap().unwrap();
        assert_eq!(record.relative_path, name);
    }
}
