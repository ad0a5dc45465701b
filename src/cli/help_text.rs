pub(super) const ROOT_LONG_ABOUT: &str = "\
Resumable integrity auditing for large, slowly changing file trees

Checksummer keeps one record per file in a SQLite database and works through
each root in small, durable steps. Every step only touches the files that still
owe it work, so an interrupted run picks up where it stopped and a repeated run
over an unchanged tree does nothing.

CORE CONCEPTS:

  Roots:
    An absolute directory registered with the database. Files are recorded
    relative to their root.

  Per-file state:
    existence     unknown, present or absent
    size          recorded once, when first measured
    checksum      SHA-256, recorded once, when first computed
    verification  unpending, intact or corrupted

  Stages:
    catalog            record files not seen before
    check-existence    decide present or absent for new records
    check-size         record the size of present files
    compute-checksums  record the checksum of present files
    reset-verification queue every present file for a new check
    verify             re-hash queued files and compare

TYPICAL WORKFLOW:

  1. Record a tree and its checksums:
     $ checksummer audit /srv/archive

  2. Re-check it periodically:
     $ checksummer audit /srv/archive --strict || alert_admin

  3. Look at what changed:
     $ checksummer status /srv/archive
     $ checksummer report /srv/archive corrupted
     $ checksummer report /srv/archive absent

  4. If a change was intended, take it as the new baseline:
     $ checksummer accept-changes /srv/archive
     $ checksummer audit /srv/archive

GLOBAL OPTIONS:

  -d, --database <FILE>
    Database file. Defaults to `database` from the config file, else
    checksummer.db in the current directory. The database is never cataloged
    even when it lives inside a root.

  --config <FILE>
    TOML file with any of: database, page_size, probe_jobs, hash_jobs,
    catalog_chunk, large_file_threshold, external_hasher.

  --jobs <N>
    Worker threads for every stage.

EXIT STATUS:

  0    completed
  1    corruption found and --strict given
  130  interrupted; every finished record was saved
  255  error (unregistered root, unreadable root, database unavailable,
       invalid path, bad config)
";

pub(super) const CATALOG_LONG_ABOUT: &str = "\
Register a root and record every regular file below it

The root is registered on first use. Every regular file found below it that is
not yet recorded gets a new record with unknown existence. Files recorded
earlier are left untouched, including their sizes and checksums. Symlinks are
not followed and unreadable subdirectories are skipped with a warning.

Files are written in chunks while the tree is still being walked, so
cataloging can be interrupted and repeated safely.
";

pub(super) const VERIFY_LONG_ABOUT: &str = "\
Re-hash files awaiting verification and compare with their recorded checksums

Each present file with a recorded checksum that has not been verified since the
last reset is read again. A matching checksum marks it intact. A differing
checksum marks it corrupted and prints both checksums, plus both sizes when they
differ:

  C  photos/img.raw
     size: 16.0 MB -> 8.0 MB
     sha256: <recorded> -> <observed>

Recorded checksums are never replaced. Files that cannot be read are marked
absent.

Verification runs once per file. Use 'reset-verification' (or 'audit', which
resets for you) to check everything again.

With --strict the command exits with status 1 when corruption was found.
";

pub(super) const AUDIT_LONG_ABOUT: &str = "\
Catalog, run every stage and re-verify all present files

Runs, in order: catalog, check-existence, check-size, compute-checksums,
reset-verification and verify. New files get their baseline recorded and every
file with a baseline is checked against it.

With --strict the command exits with status 1 when corruption was found.
";

pub(super) const ACCEPT_CHANGES_LONG_ABOUT: &str = "\
Take the current content of corrupted files as their new baseline

Clears the recorded size, modification time and checksum of every corrupted
file so that the next 'check-size' and 'compute-checksums' record the content
as it is now. Only use this after confirming the change was intended.
";
