//! On-disk locations for the two configuration documents
//!
//! The machine-wide document lives in the host's shared config area, the
//! per-user document under the user's config directory. One directory per
//! document; both are created recursively on startup and failure to do so is
//! fatal (there is nowhere to persist anything).

use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;

use crate::constants::{APP_DIR, PERSISTENT_FILE, USER_FILE};
use crate::error::StoreError;

/// Resolved directories and file paths for both stores.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub persistent_dir: PathBuf,
    pub persistent_file: PathBuf,
    pub user_dir: PathBuf,
    pub user_file: PathBuf,
}

impl ConfigPaths {
    /// Resolve the platform-default locations.
    pub fn resolve() -> Result<Self, StoreError> {
        let persistent_dir = machine_config_root().join(APP_DIR);
        let user_dir = BaseDirs::new()
            .ok_or(StoreError::NoConfigDir)?
            .config_dir()
            .join(APP_DIR);
        Ok(Self::at(persistent_dir, user_dir))
    }

    /// Build paths rooted at explicit directories.
    pub fn at(persistent_dir: impl Into<PathBuf>, user_dir: impl Into<PathBuf>) -> Self {
        let persistent_dir = persistent_dir.into();
        let user_dir = user_dir.into();
        Self {
            persistent_file: persistent_dir.join(PERSISTENT_FILE),
            user_file: user_dir.join(USER_FILE),
            persistent_dir,
            user_dir,
        }
    }

    /// Create both directories recursively.
    pub fn ensure_dirs(&self) -> Result<(), StoreError> {
        create_dir(&self.persistent_dir)?;
        create_dir(&self.user_dir)
    }
}

fn create_dir(path: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(path).map_err(|source| StoreError::CreateDir {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(windows)]
fn machine_config_root() -> PathBuf {
    std::env::var_os("ProgramData")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(r"C:\ProgramData"))
}

#[cfg(not(windows))]
fn machine_config_root() -> PathBuf {
    PathBuf::from("/etc")
}
