//! Exclusive-access lock for a crawl-state store
//!
//! The lock is an advisory marker file at `<store>/.locked`. It is created
//! with exclusive-create semantics so two processes can never both believe
//! they created it.

use crate::storage::traits::{StorageError, StorageResult};
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Name of the lock marker inside the store directory
pub const LOCK_NAME: &str = ".locked";

/// A held store lock
///
/// Call `release` to remove the marker and observe errors. A lock dropped
/// without being released is removed on a best-effort basis.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    released: bool,
}

impl StoreLock {
    /// Acquires the lock of the store at `store_dir`
    ///
    /// # Arguments
    ///
    /// * `store_dir` - The crawl-state store directory
    /// * `force` - Take over an existing lock file instead of failing
    /// * `owner` - Free-form text written into the marker for diagnostics
    ///
    /// # Returns
    ///
    /// * `Ok(StoreLock)` - The lock is held
    /// * `Err(StorageError::Locked)` - Another run holds the lock and `force` is off,
    ///   or the lock path is a directory
    pub fn acquire(store_dir: &Path, force: bool, owner: &str) -> StorageResult<Self> {
        let path = store_dir.join(LOCK_NAME);

        let created = OpenOptions::new().write(true).create_new(true).open(&path);
        let mut file = match created {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                if path.is_dir() || !force {
                    return Err(StorageError::Locked(path));
                }
                tracing::warn!("Overriding existing lock {}", path.display());
                OpenOptions::new().write(true).truncate(true).open(&path)?
            }
            Err(error) => return Err(error.into()),
        };

        writeln!(
            file,
            "pid={}\nacquired={}\nowner={}",
            std::process::id(),
            Utc::now().to_rfc3339(),
            owner
        )?;
        file.sync_all()?;

        tracing::debug!("Acquired store lock {}", path.display());
        Ok(Self {
            path,
            released: false,
        })
    }

    /// Returns true if the store at `store_dir` is currently locked
    pub fn is_locked(store_dir: &Path) -> bool {
        store_dir.join(LOCK_NAME).exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the lock marker
    pub fn release(mut self) -> StorageResult<()> {
        self.released = true;
        remove_marker(&self.path)?;
        tracing::debug!("Released store lock {}", self.path.display());
        Ok(())
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = remove_marker(&self.path) {
            tracing::error!("Failed to release store lock {}: {}", self.path.display(), e);
        }
    }
}

fn remove_marker(path: &Path) -> StorageResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        // Already gone, e.g. a forced run released it first.
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
