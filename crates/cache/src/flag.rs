//! Flag files
//!
//! A flag file is the witness that a packaging stage has been reached:
//! its modification time is the reached-time and its body is the stage's
//! output path (source dir, install dir, or empty). Freshness comparison
//! is strict `>` on mtime — assuming at least second resolution from the
//! underlying filesystem.

use dop_errors::Error;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A stage flag file
#[derive(Debug, Clone)]
pub struct FlagFile {
    path: PathBuf,
}

impl FlagFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Modification time, `None` when the flag has not been written
    #[must_use]
    pub fn mtime(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
    }

    /// The stage's output path recorded in the body, trimmed
    ///
    /// # Errors
    ///
    /// Returns an error when the flag cannot be read.
    pub fn read(&self) -> Result<String, Error> {
        let body = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::io_with_path(&e, &self.path))?;
        Ok(body.trim().to_string())
    }

    /// Write the flag with the stage's output path as body, creating
    /// parent directories. The write itself marks the stage reached.
    ///
    /// # Errors
    ///
    /// Returns an error when the directories or the file cannot be
    /// written.
    pub fn write(&self, body: &str) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io_with_path(&e, parent))?;
        }
        std::fs::write(&self.path, body).map_err(|e| Error::io_with_path(&e, &self.path))
    }

    /// Whether this flag exists and is strictly newer than every given
    /// reference time. A missing reference (`None`) fails the check: the
    /// stage it stands for has not been reached.
    #[must_use]
    pub fn newer_than_all(&self, refs: &[Option<SystemTime>]) -> bool {
        let Some(own) = self.mtime() else {
            return false;
        };
        refs.iter().all(|r| matches!(r, Some(t) if own > *t))
    }
}

/// Modification time of an arbitrary path
#[must_use]
pub fn path_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};

    #[test]
    fn write_read_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let flag = FlagFile::new(tmp.path().join("profile-dir/source.flag"));
        assert!(!flag.exists());
        assert!(flag.mtime().is_none());

        flag.write("/tmp/src/pkg-1.0.0").unwrap();
        assert!(flag.exists());
        assert_eq!(flag.read().unwrap(), "/tmp/src/pkg-1.0.0");
        assert!(flag.mtime().is_some());
    }

    #[test]
    fn freshness_is_strict() {
        let tmp = tempfile::tempdir().unwrap();
        let older = FlagFile::new(tmp.path().join("older.flag"));
        let newer = FlagFile::new(tmp.path().join("newer.flag"));
        older.write("").unwrap();
        newer.write("").unwrap();

        set_file_mtime(older.path(), FileTime::from_unix_time(1_000_000, 0)).unwrap();
        set_file_mtime(newer.path(), FileTime::from_unix_time(1_000_100, 0)).unwrap();

        assert!(newer.newer_than_all(&[older.mtime()]));
        assert!(!older.newer_than_all(&[newer.mtime()]));

        // equal mtimes are not fresh
        set_file_mtime(newer.path(), FileTime::from_unix_time(1_000_000, 0)).unwrap();
        assert!(!newer.newer_than_all(&[older.mtime()]));

        // missing reference fails the check
        assert!(!newer.newer_than_all(&[None]));
        // missing flag is never fresh
        let ghost = FlagFile::new(tmp.path().join("ghost.flag"));
        assert!(!ghost.newer_than_all(&[older.mtime()]));
    }
}
