//! Global context for kernelplan operations.
//!
//! Provides centralized access to the project root and config locations.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::BaseDirs;

/// Directory holding the extension's native sources; marks a project root.
pub const SOURCE_DIR: &str = "csrc";

/// Global context containing paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Home directory for global kernelplan data (~/.kernelplan/)
    home: Option<PathBuf>,
}

impl GlobalContext {
    /// Create a new GlobalContext for the current directory.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Ok(Self::with_cwd(cwd))
    }

    /// Create a GlobalContext with a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Self {
        let home = BaseDirs::new().map(|b| b.home_dir().join(".kernelplan"));
        GlobalContext { cwd, home }
    }

    /// Get the global configuration file path.
    pub fn config_path(&self) -> Option<PathBuf> {
        self.home.as_ref().map(|h| h.join("config.toml"))
    }

    /// Get the project configuration file path.
    pub fn project_config_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(".kernelplan").join("config.toml")
    }

    /// Find the project root: the nearest directory at or above cwd that
    /// contains `csrc/`. Falls back to cwd.
    pub fn find_project_root(&self) -> PathBuf {
        let mut current = self.cwd.clone();
        loop {
            if current.join(SOURCE_DIR).is_dir() {
                return current;
            }
            if !current.pop() {
                return self.cwd.clone();
            }
        }
    }
}
