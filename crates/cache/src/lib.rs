#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Local package cache layout for dopamine
//!
//! The cache is a content-addressed hierarchy mapping
//! `(package, version, revision)` to recipe revisions and per-profile
//! build state:
//!
//! ```text
//! <cache-root>/<pkg>/<version>/<revision>/
//!     dopamine.lua
//!     <shorthash>-<basename>/
//!         build/  install/
//!         source.flag config.flag build.flag install.flag
//! <cache-root>/<pkg>/<version>/<revision>.lock
//! ```
//!
//! This crate owns the path arithmetic, the per-revision advisory file
//! lock and the flag files. Entries are created under the lock and never
//! mutated afterwards; reads that tolerate torn writes (listings,
//! membership checks) go lock-free.

mod flag;
mod lock;

pub use flag::{path_mtime, FlagFile};
pub use lock::RevisionLock;

use dop_errors::Error;
use dop_profile::Profile;
use dop_types::Version;
use std::path::{Path, PathBuf};

/// Name of the recipe file inside a revision directory
pub const RECIPE_FILE: &str = "dopamine.lua";

/// Root of the local package cache
#[derive(Debug, Clone)]
pub struct CacheDir {
    root: PathBuf,
}

impl CacheDir {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn package_dir(&self, name: &str) -> PackageDir {
        PackageDir {
            path: self.root.join(name),
            name: name.to_string(),
        }
    }

    /// Direct path to a revision directory
    #[must_use]
    pub fn revision_dir(&self, name: &str, version: &Version, revision: &str) -> RevisionDir {
        self.package_dir(name)
            .version_dir(version)
            .revision_dir(revision)
    }

    /// Package names present in the cache, sorted
    ///
    /// # Errors
    ///
    /// Returns an error when the cache root exists but cannot be read.
    pub fn packages(&self) -> Result<Vec<String>, Error> {
        let mut names = Vec::new();
        for entry in read_dir_or_empty(&self.root)? {
            let entry = entry.map_err(Error::from)?;
            if entry.file_type().map_err(Error::from)?.is_dir() {
                if let Ok(name) = entry.file_name().into_string() {
                    names.push(name);
                }
            }
        }
        names.sort_unstable();
        Ok(names)
    }
}

/// `<cache-root>/<pkg>/`
#[derive(Debug, Clone)]
pub struct PackageDir {
    path: PathBuf,
    name: String,
}

impl PackageDir {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn version_dir(&self, version: &Version) -> VersionDir {
        VersionDir {
            path: self.path.join(version.to_string()),
            name: self.name.clone(),
            version: version.clone(),
        }
    }

    /// Versions present on disk, sorted ascending. Directory names that
    /// do not parse as versions are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error when the package directory exists but cannot be
    /// read.
    pub fn versions(&self) -> Result<Vec<Version>, Error> {
        let mut versions = Vec::new();
        for entry in read_dir_or_empty(&self.path)? {
            let entry = entry.map_err(Error::from)?;
            if !entry.file_type().map_err(Error::from)?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(version) = Version::parse(name) {
                    versions.push(version);
                }
            }
        }
        versions.sort_unstable();
        versions.dedup();
        Ok(versions)
    }
}

/// `<cache-root>/<pkg>/<version>/`
#[derive(Debug, Clone)]
pub struct VersionDir {
    path: PathBuf,
    name: String,
    version: Version,
}

impl VersionDir {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn version(&self) -> &Version {
        &self.version
    }

    #[must_use]
    pub fn revision_dir(&self, revision: &str) -> RevisionDir {
        RevisionDir {
            path: self.path.join(revision),
            revision: revision.to_string(),
        }
    }

    /// Revisions present on disk, in directory order. Only directories
    /// holding a recipe file count.
    ///
    /// # Errors
    ///
    /// Returns an error when the version directory exists but cannot be
    /// read.
    pub fn revisions(&self) -> Result<Vec<RevisionDir>, Error> {
        let mut revisions = Vec::new();
        for entry in read_dir_or_empty(&self.path)? {
            let entry = entry.map_err(Error::from)?;
            if !entry.file_type().map_err(Error::from)?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                let dir = self.revision_dir(name);
                if dir.exists() {
                    revisions.push(dir);
                }
            }
        }
        revisions.sort_by(|a, b| a.revision.cmp(&b.revision));
        Ok(revisions)
    }

    /// Whether any revision of this version is cached
    #[must_use]
    pub fn has_any_revision(&self) -> bool {
        self.revisions().map(|revs| !revs.is_empty()).unwrap_or(false)
    }
}

/// `<cache-root>/<pkg>/<version>/<revision>/`
#[derive(Debug, Clone)]
pub struct RevisionDir {
    path: PathBuf,
    revision: String,
}

impl RevisionDir {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// The revision directory exists iff it contains a recipe file —
    /// a bare directory left over from an interrupted write does not
    /// count.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.recipe_file().is_file()
    }

    #[must_use]
    pub fn recipe_file(&self) -> PathBuf {
        self.path.join(RECIPE_FILE)
    }

    /// Path of the advisory lock sibling: `<revision>.lock`
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        let mut file_name = self.revision.clone();
        file_name.push_str(".lock");
        match self.path.parent() {
            Some(parent) => parent.join(file_name),
            None => PathBuf::from(file_name),
        }
    }

    /// Acquire the exclusive per-revision lock, blocking until available
    ///
    /// Every mutating access to this revision directory (recipe writes,
    /// profile dirs, flag files, install copies) must happen under this
    /// lock.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::LockFailed` when the lock file cannot be
    /// created or locked.
    pub fn lock(&self) -> Result<RevisionLock, Error> {
        RevisionLock::acquire(self.lock_path())
    }

    /// Try to acquire the lock without blocking
    ///
    /// # Errors
    ///
    /// Returns `CacheError::LockFailed` on I/O failure (a held lock is
    /// `Ok(None)`, not an error).
    pub fn try_lock(&self) -> Result<Option<RevisionLock>, Error> {
        RevisionLock::try_acquire(self.lock_path())
    }

    /// Most recent flag-file modification time across every profile dir
    /// of this revision, falling back to the recipe file's mtime.
    ///
    /// Revision-less cache lookups use this to pick "the" revision of a
    /// version: the one most recently worked on.
    #[must_use]
    pub fn latest_flag_mtime(&self) -> Option<std::time::SystemTime> {
        let mut latest: Option<std::time::SystemTime> = None;
        if let Ok(entries) = std::fs::read_dir(&self.path) {
            for entry in entries.flatten() {
                if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    continue;
                }
                for flag in ["source.flag", "config.flag", "build.flag", "install.flag"] {
                    let mtime = flag::path_mtime(&entry.path().join(flag));
                    if mtime > latest {
                        latest = mtime;
                    }
                }
            }
        }
        latest.or_else(|| flag::path_mtime(&self.recipe_file()))
    }

    /// Per-profile working directories under this revision
    #[must_use]
    pub fn profile_dirs(&self, profile: &Profile) -> ProfileDirs {
        ProfileDirs {
            root: self.path.join(profile.dirname()),
        }
    }
}

/// `<revision>/<shorthash>-<basename>/` with its build/install dirs and
/// flag files
#[derive(Debug, Clone)]
pub struct ProfileDirs {
    root: PathBuf,
}

impl ProfileDirs {
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn build(&self) -> PathBuf {
        self.root.join("build")
    }

    #[must_use]
    pub fn install(&self) -> PathBuf {
        self.root.join("install")
    }

    #[must_use]
    pub fn source_flag(&self) -> FlagFile {
        FlagFile::new(self.root.join("source.flag"))
    }

    #[must_use]
    pub fn config_flag(&self) -> FlagFile {
        FlagFile::new(self.root.join("config.flag"))
    }

    #[must_use]
    pub fn build_flag(&self) -> FlagFile {
        FlagFile::new(self.root.join("build.flag"))
    }

    #[must_use]
    pub fn install_flag(&self) -> FlagFile {
        FlagFile::new(self.root.join("install.flag"))
    }

    /// Most recent flag-file modification time, if any flag exists.
    /// Used to pick "the" revision when the caller did not name one.
    #[must_use]
    pub fn latest_flag_mtime(&self) -> Option<std::time::SystemTime> {
        [
            self.source_flag(),
            self.config_flag(),
            self.build_flag(),
            self.install_flag(),
        ]
        .iter()
        .filter_map(FlagFile::mtime)
        .max()
    }

    /// Create the build and install directories
    ///
    /// # Errors
    ///
    /// Returns an error when directory creation fails.
    pub fn create(&self) -> Result<(), Error> {
        std::fs::create_dir_all(self.build()).map_err(|e| Error::io_with_path(&e, self.build()))?;
        std::fs::create_dir_all(self.install())
            .map_err(|e| Error::io_with_path(&e, self.install()))?;
        Ok(())
    }
}

/// Like `read_dir`, but a missing directory yields an empty iterator
fn read_dir_or_empty(path: &Path) -> Result<std::vec::IntoIter<std::io::Result<std::fs::DirEntry>>, Error> {
    match std::fs::read_dir(path) {
        Ok(entries) => Ok(entries.collect::<Vec<_>>().into_iter()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new().into_iter()),
        Err(e) => Err(Error::io_with_path(&e, path)),
    }
}
