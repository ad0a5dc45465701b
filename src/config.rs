use crate::catalog::DEFAULT_CHUNK_SIZE;
use crate::checksum::{DEFAULT_LARGE_FILE_THRESHOLD, HashOptions, LargeFileStrategy};
use crate::pipeline::{DEFAULT_PAGE_SIZE, StageOptions, default_hash_jobs, default_probe_jobs};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_DATABASE: &str = "checksummer.db";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Contents of the optional TOML config file. Every key may be omitted.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub database: Option<PathBuf>,
    pub page_size: Option<usize>,
    pub probe_jobs: Option<usize>,
    pub hash_jobs: Option<usize>,
    pub catalog_chunk: Option<usize>,
    pub large_file_threshold: Option<u64>,
    /// Program used for files above the threshold, e.g. "sha256sum".
    pub external_hasher: Option<String>,
}

impl ConfigFile {
    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content, path)
    }
}

/// Effective settings after merging defaults, the config file and command line flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database: PathBuf,
    pub page_size: usize,
    pub probe_jobs: usize,
    pub hash_jobs: usize,
    pub catalog_chunk: usize,
    pub hash: HashOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database: PathBuf::from(DEFAULT_DATABASE),
            page_size: DEFAULT_PAGE_SIZE,
            probe_jobs: default_probe_jobs(),
            hash_jobs: default_hash_jobs(),
            catalog_chunk: DEFAULT_CHUNK_SIZE,
            hash: HashOptions::default(),
        }
    }
}

impl Settings {
    pub fn from_file(file: ConfigFile) -> Self {
        let defaults = Settings::default();
        let large_file_strategy = match file.external_hasher {
            Some(program) => LargeFileStrategy::External(program),
            None => LargeFileStrategy::Buffered,
        };
        Settings {
            database: file.database.unwrap_or(defaults.database),
            page_size: file.page_size.unwrap_or(defaults.page_size).max(1),
            probe_jobs: file.probe_jobs.unwrap_or(defaults.probe_jobs).max(1),
            hash_jobs: file.hash_jobs.unwrap_or(defaults.hash_jobs).max(1),
            catalog_chunk: file.catalog_chunk.unwrap_or(defaults.catalog_chunk).max(1),
            hash: HashOptions {
                large_file_threshold: file
                    .large_file_threshold
                    .unwrap_or(DEFAULT_LARGE_FILE_THRESHOLD),
                large_file_strategy,
            },
        }
    }

    /// Apply command line overrides. `jobs` bounds both probe and hash stages.
    pub fn with_overrides(mut self, database: Option<PathBuf>, jobs: Option<usize>) -> Self {
        if let Some(database) = database {
            self.database = database;
        }
        if let Some(jobs) = jobs {
            self.probe_jobs = jobs.max(1);
            self.hash_jobs = jobs.max(1);
        }
        self
    }

    pub fn probe_stage(&self) -> StageOptions {
        StageOptions {
            jobs: self.probe_jobs,
            page_size: self.page_size,
        }
    }

    pub fn hash_stage(&self) -> StageOptions {
        StageOptions {
            jobs: self.hash_jobs,
            page_size: self.page_size,
        }
    }
}
