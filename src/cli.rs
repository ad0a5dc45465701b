mod help_text;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::store::Listing;

/// Resumable integrity auditing for large, slowly changing file trees
#[derive(Parser, Debug)]
#[command(name = "checksummer", version, about, long_about = help_text::ROOT_LONG_ABOUT)]
pub struct Cli {
    /// Record store database [default: checksummer.db, or `database` from the config file]
    #[arg(short = 'd', long, value_name = "FILE", global = true)]
    pub database: Option<PathBuf>,

    /// TOML config file
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Worker threads per stage (overrides probe_jobs and hash_jobs)
    #[arg(long, value_name = "N", global = true, value_parser = parse_jobs)]
    pub jobs: Option<usize>,

    #[arg(
        short,
        long,
        action = ArgAction::Count,
        global = true,
        conflicts_with = "log_level",
        help = "Increase logging verbosity (-v info, -vv debug). Takes precedence over RUST_LOG."
    )]
    pub verbose: u8,

    #[arg(
        long,
        value_name = "LEVEL",
        global = true,
        help = "Set the log level explicitly. Takes precedence over RUST_LOG."
    )]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Register a root and record every regular file below it
    #[command(long_about = help_text::CATALOG_LONG_ABOUT)]
    Catalog {
        #[arg(value_name = "ROOT")]
        root: PathBuf,
    },

    /// Decide present or absent for newly cataloged files
    CheckExistence {
        #[arg(value_name = "ROOT")]
        root: PathBuf,
    },

    /// Record sizes of present files that have none yet
    CheckSize {
        #[arg(value_name = "ROOT")]
        root: PathBuf,
    },

    /// Record SHA-256 checksums of present files that have none yet
    ComputeChecksums {
        #[arg(value_name = "ROOT")]
        root: PathBuf,
    },

    /// Re-hash files awaiting verification and compare with their recorded checksums
    #[command(long_about = help_text::VERIFY_LONG_ABOUT)]
    Verify {
        #[arg(value_name = "ROOT")]
        root: PathBuf,

        /// Exit with status 1 if any file is corrupted
        #[arg(long)]
        strict: bool,
    },

    /// Queue every present file for verification again
    ResetVerification {
        #[arg(value_name = "ROOT")]
        root: PathBuf,
    },

    /// Catalog, run every stage and re-verify all present files
    #[command(long_about = help_text::AUDIT_LONG_ABOUT)]
    Audit {
        #[arg(value_name = "ROOT")]
        root: PathBuf,

        /// Exit with status 1 if any file is corrupted
        #[arg(long)]
        strict: bool,
    },

    /// Show record counts per state
    Status {
        #[arg(value_name = "ROOT")]
        root: PathBuf,
    },

    /// List absent, corrupted, largest or most recently modified files
    Report {
        #[arg(value_name = "ROOT")]
        root: PathBuf,

        #[arg(value_name = "KIND")]
        kind: ReportKind,

        /// Show at most N files
        #[arg(long, value_name = "N")]
        limit: Option<usize>,
    },

    /// Take the current content of corrupted files as their new baseline
    #[command(long_about = help_text::ACCEPT_CHANGES_LONG_ABOUT)]
    AcceptChanges {
        #[arg(value_name = "ROOT")]
        root: PathBuf,
    },

    /// Check absent files for existence again
    RequeueAbsent {
        #[arg(value_name = "ROOT")]
        root: PathBuf,
    },

    /// List registered roots
    Roots,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportKind {
    Absent,
    Corrupted,
    Largest,
    Recent,
}

impl From<ReportKind> for Listing {
    fn from(kind: ReportKind) -> Self {
        match kind {
            ReportKind::Absent => Listing::Absent,
            ReportKind::Corrupted => Listing::Corrupted,
            ReportKind::Largest => Listing::Largest,
            ReportKind::Recent => Listing::Recent,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn parse_jobs(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(jobs) => Ok(jobs),
        Err(e) => Err(e.to_string()),
    }
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
