mod audit;
mod cancel;
mod catalog;
mod checksum;
mod cli;
mod config;
mod enumerate;
mod pipeline;
mod probe;
mod registry;
mod report;
mod store;

use cancel::Cancellation;
use cli::{Cli, Command, LogLevel};
use config::{ConfigFile, Settings};
use pipeline::StageTally;
use std::ffi::OsString;
use std::fmt as stdfmt;
use std::io::{IsTerminal, stderr};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use store::{Listing, RecordStore, RootPath};
use tracing::{Event, Level, Subscriber, error, info, warn};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt as tracing_fmt;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;

struct AuditExitCode;

impl AuditExitCode {
    /// Exit code used when corruption was found and `--strict` was given.
    const CORRUPTION_FOUND: u8 = 1;

    /// Exit code used when a stage stopped early because of Ctrl-C.
    const INTERRUPTED: u8 = 130;

    /// Exit code used for other errors (unregistered root, store unavailable, etc.).
    fn any_error() -> ExitCode {
        ExitCode::from(255)
    }
}

fn completion_code(cancelled: bool, corrupted: usize, strict: bool) -> u8 {
    if cancelled {
        AuditExitCode::INTERRUPTED
    } else if strict && corrupted > 0 {
        AuditExitCode::CORRUPTION_FOUND
    } else {
        0
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_level);

    match run(cli) {
        Ok(exit_code) => exit_code,
        Err(err) => {
            error!("{err}");
            AuditExitCode::any_error()
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config_file = match &cli.config {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::default(),
    };
    let settings = Settings::from_file(config_file).with_overrides(cli.database, cli.jobs);

    let mut store = RecordStore::open(&settings.database)?;

    let cancel = Cancellation::install_handler().unwrap_or_else(|e| {
        warn!("Cannot install Ctrl-C handler: {}", e);
        Cancellation::new()
    });

    match cli.command {
        Command::Catalog { root } => handle_catalog(&mut store, &root, &settings, &cancel),
        Command::CheckExistence { root } => {
            let root = registry::resolve(&store, &root_argument(&root))?;
            let tally = probe::probe_existence(&mut store, &root, &settings.probe_stage(), &cancel)?;
            Ok(finish_stage("check-existence", &tally))
        }
        Command::CheckSize { root } => {
            let root = registry::resolve(&store, &root_argument(&root))?;
            let tally = probe::probe_size(&mut store, &root, &settings.probe_stage(), &cancel)?;
            Ok(finish_stage("check-size", &tally))
        }
        Command::ComputeChecksums { root } => {
            let root = registry::resolve(&store, &root_argument(&root))?;
            let tally = audit::compute_checksums(
                &mut store,
                &root,
                &settings.hash_stage(),
                &settings.hash,
                &cancel,
            )?;
            Ok(finish_stage("compute-checksums", &tally))
        }
        Command::Verify { root, strict } => {
            handle_verify(&mut store, &root, strict, &settings, &cancel)
        }
        Command::ResetVerification { root } => {
            let root = registry::resolve(&store, &root_argument(&root))?;
            let reset = audit::reset_verification(&store, &root)?;
            println!("reset-verification: {} queued", reset);
            Ok(ExitCode::SUCCESS)
        }
        Command::Audit { root, strict } => {
            handle_audit(&mut store, &root, strict, &settings, &cancel)
        }
        Command::Status { root } => {
            let root = registry::resolve(&store, &root_argument(&root))?;
            report::print_summary(&root, &store.summary(root.id)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Report { root, kind, limit } => {
            let root = registry::resolve(&store, &root_argument(&root))?;
            let records = store.listing(root.id, Listing::from(kind), limit)?;
            report::print_records(&records);
            Ok(ExitCode::SUCCESS)
        }
        Command::AcceptChanges { root } => {
            let root = registry::resolve(&store, &root_argument(&root))?;
            let accepted = store.accept_changes(root.id)?;
            info!(
                "Cleared the baseline of {} corrupted files under {}",
                accepted,
                root.path.display()
            );
            println!("accept-changes: {} files will be re-baselined", accepted);
            Ok(ExitCode::SUCCESS)
        }
        Command::RequeueAbsent { root } => {
            let root = registry::resolve(&store, &root_argument(&root))?;
            let requeued = store.requeue_absent(root.id)?;
            println!("requeue-absent: {} files queued for existence checks", requeued);
            Ok(ExitCode::SUCCESS)
        }
        Command::Roots => {
            report::print_roots(&registry::list(&store)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn handle_catalog(
    store: &mut RecordStore,
    root: &Path,
    settings: &Settings,
    cancel: &Cancellation,
) -> anyhow::Result<ExitCode> {
    let (_, result) = catalog::catalog(
        store,
        &root_argument(root),
        &database_files(&settings.database),
        settings.catalog_chunk,
        cancel,
    )?;
    report::print_catalog(&result);
    Ok(ExitCode::from(completion_code(result.cancelled, 0, false)))
}

fn handle_verify(
    store: &mut RecordStore,
    root: &Path,
    strict: bool,
    settings: &Settings,
    cancel: &Cancellation,
) -> anyhow::Result<ExitCode> {
    let root = registry::resolve(store, &root_argument(root))?;
    let tally = audit::verify(
        store,
        &root,
        &settings.hash_stage(),
        &settings.hash,
        cancel,
        report::print_mismatch,
    )?;

    report::print_tally("verify", &tally);
    warn_corruption(&root, &tally);

    Ok(ExitCode::from(completion_code(
        tally.cancelled,
        tally.corrupted,
        strict,
    )))
}

fn handle_audit(
    store: &mut RecordStore,
    root: &Path,
    strict: bool,
    settings: &Settings,
    cancel: &Cancellation,
) -> anyhow::Result<ExitCode> {
    let path = root_argument(root);
    let run = audit::run_audit(
        store,
        &path,
        &database_files(&settings.database),
        settings,
        cancel,
        report::print_mismatch,
    )?;

    report::print_catalog(&run.catalog);
    report::print_tally("check-existence", &run.existence);
    report::print_tally("check-size", &run.size);
    report::print_tally("compute-checksums", &run.checksums);
    report::print_tally("verify", &run.verification);
    if let Some(root) = store.find_root(&path)? {
        warn_corruption(&root, &run.verification);
    }

    Ok(ExitCode::from(completion_code(
        run.cancelled,
        run.verification.corrupted,
        strict,
    )))
}

fn finish_stage(stage: &str, tally: &StageTally) -> ExitCode {
    report::print_tally(stage, tally);
    ExitCode::from(completion_code(tally.cancelled, 0, false))
}

fn warn_corruption(root: &RootPath, tally: &StageTally) {
    if tally.corrupted > 0 {
        warn!(
            "{} corrupted file(s) under {}; see 'checksummer report {} corrupted'",
            tally.corrupted,
            root.path.display(),
            root.path.display()
        );
    }
}

/// Roots are stored as absolute paths; relative arguments are resolved against
/// the current directory. Symlinks are resolved when the path exists.
fn root_argument(path: &Path) -> PathBuf {
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// The database and its WAL siblings, which must never be cataloged.
fn database_files(database: &Path) -> Vec<PathBuf> {
    let database = root_argument(database);
    let sibling = |suffix: &str| {
        let mut name = OsString::from(database.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    };
    vec![sibling("-wal"), sibling("-shm"), database.clone()]
}

/// Explicit flags win over RUST_LOG; without them RUST_LOG applies, else warn.
fn explicit_log_level(verbose: u8, log_level: Option<LogLevel>) -> Option<&'static str> {
    match (log_level, verbose) {
        (Some(level), _) => Some(level.as_str()),
        (None, 0) => None,
        (None, 1) => Some("info"),
        (None, _) => Some("debug"),
    }
}

fn init_tracing(verbose: u8, log_level: Option<LogLevel>) {
    let stderr_is_terminal = stderr().is_terminal();
    let formatter = EmojiFormatter { stderr_is_terminal };

    let filter = match explicit_log_level(verbose, log_level) {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    let fmt_layer = tracing_fmt::layer()
        .event_format(formatter)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

struct EmojiFormatter {
    stderr_is_terminal: bool,
}

impl<S, N> FormatEvent<S, N> for EmojiFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> stdfmt::Result {
        if self.stderr_is_terminal {
            match *event.metadata().level() {
                Level::DEBUG => write!(writer, "🔍 ")?,
                Level::INFO => write!(writer, "ℹ️ ")?,
                Level::WARN => write!(writer, "⚠️  ")?,
                Level::ERROR => write!(writer, "❌️ ")?,
                _ => {}
            }
        } else {
            match *event.metadata().level() {
                Level::DEBUG => writer.write_str("DEBUG: ")?,
                Level::INFO => writer.write_str("INFO: ")?,
                Level::WARN => writer.write_str("WARN: ")?,
                Level::ERROR => writer.write_str("ERROR: ")?,
                _ => {}
            }
        }

        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
