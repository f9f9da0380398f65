#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Error types for the dopamine package manager
//!
//! This crate provides fine-grained error types organized by domain.
//! Every other crate in the workspace reports failures through these
//! types and the root [`Error`] enum.

pub mod build;
pub mod cache;
pub mod config;
pub mod lockfile;
pub mod profile;
pub mod recipe;
pub mod registry;
pub mod resolve;
pub mod version;

// Re-export all error types at the root
pub use build::BuildError;
pub use cache::CacheError;
pub use config::ConfigError;
pub use lockfile::LockfileError;
pub use profile::ProfileError;
pub use recipe::RecipeError;
pub use registry::RegistryError;
pub use resolve::ResolveError;
pub use version::VersionError;

use thiserror::Error;

/// Generic error type for cross-crate boundaries
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("version error: {0}")]
    Version(#[from] VersionError),

    #[error("profile error: {0}")]
    Profile(#[from] ProfileError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("recipe error: {0}")]
    Recipe(#[from] RecipeError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("lock-file error: {0}")]
    Lockfile(#[from] LockfileError),

    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("build error: {0}")]
    Build(#[from] BuildError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("I/O error: {message}")]
    Io {
        kind: std::io::ErrorKind,
        message: String,
        path: Option<std::path::PathBuf>,
    },
}

impl Error {
    /// Create an internal error with a message
    ///
    /// Internal errors signal programming bugs (broken invariants) and
    /// are treated as fatal by every caller.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an Io error with an associated path
    pub fn io_with_path(err: &std::io::Error, path: impl Into<std::path::PathBuf>) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: Some(path.into()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: None,
        }
    }
}

impl From<semver::Error> for Error {
    fn from(err: semver::Error) -> Self {
        Self::Version(VersionError::ParseError {
            message: err.to_string(),
        })
    }
}

/// Result type alias for dopamine operations
pub type Result<T> = std::result::Result<T, Error>;
