//! Per-revision advisory file lock
//!
//! Concurrent producers serialize through an exclusive `flock` on the
//! `<revision>.lock` sibling before writing into the revision directory.
//! The lock is held for the lifetime of the guard and released when the
//! file handle drops.

use dop_errors::{CacheError, Error};
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// An acquired exclusive lock on a revision directory
pub struct RevisionLock {
    // kept open to maintain the lock
    _file: File,
    path: PathBuf,
}

impl RevisionLock {
    /// Acquire the lock, blocking until available
    ///
    /// # Errors
    ///
    /// Returns `CacheError::LockFailed` when the lock file cannot be
    /// created or locked.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let file = open_lock_file(&path)?;
        file.lock_exclusive().map_err(|e| CacheError::LockFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        debug!(path = %path.display(), "acquired revision lock");
        Ok(Self { _file: file, path })
    }

    /// Try to acquire the lock without blocking
    ///
    /// Returns `Ok(None)` when another process holds it.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::LockFailed` on I/O failure.
    pub fn try_acquire(path: impl Into<PathBuf>) -> Result<Option<Self>, Error> {
        let path = path.into();
        let file = open_lock_file(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(path = %path.display(), "acquired revision lock");
                Ok(Some(Self { _file: file, path }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(CacheError::LockFailed {
                path: path.display().to_string(),
                message: e.to_string(),
            }
            .into()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RevisionLock {
    fn drop(&mut self) {
        // the lock itself is released when the file handle closes
        debug!(path = %self.path.display(), "released revision lock");
    }
}

fn open_lock_file(path: &Path) -> Result<File, Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io_with_path(&e, parent))?;
    }
    File::options()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .map_err(|e| {
            CacheError::LockFailed {
                path: path.display().to_string(),
                message: e.to_string(),
            }
            .into()
        })
}
