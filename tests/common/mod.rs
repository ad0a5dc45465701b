use assert_cmd::{Command, cargo::cargo_bin_cmd};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A tree to audit plus a separate directory holding the database.
pub struct Workspace {
    tree: TempDir,
    state: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Workspace {
            tree: TempDir::new().unwrap(),
            state: TempDir::new().unwrap(),
        }
    }

    // Each integration test file is its own crate; not all of them need these.
    /// Canonical root path, as the binary stores it.
    #[allow(dead_code)]
    pub fn root(&self) -> PathBuf {
        fs::canonicalize(self.tree.path()).unwrap()
    }

    pub fn database(&self) -> PathBuf {
        self.state.path().join("audit.db")
    }

    pub fn write(&self, relative: &str, content: impl AsRef<[u8]>) {
        let path = self.tree.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[allow(dead_code)]
    pub fn path(&self, relative: &str) -> PathBuf {
        self.tree.path().join(relative)
    }

    /// Run `subcommand` against the workspace root.
    pub fn run(&self, subcommand: &str) -> Command {
        let mut cmd = checksummer_cmd(&self.database());
        cmd.arg(subcommand).arg(self.tree.path());
        cmd
    }
}

pub fn checksummer_cmd(database: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("checksummer");
    cmd.env_remove("RUST_LOG").arg("-d").arg(database);
    cmd
}

// Only the scenario tests compare digests directly.
#[allow(dead_code)]
pub fn sha256_hex(content: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    format!("{:x}", Sha256::digest(content))
}
