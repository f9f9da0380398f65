//! Local package cache error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum CacheError {
    #[error("package {name}-{version} is not in the local cache")]
    NotCached {
        name: String,
        version: String,
        revision: Option<String>,
    },

    #[error("could not acquire lock {path}: {message}")]
    LockFailed { path: String, message: String },

    #[error("corrupted cache entry at {path}: {reason}")]
    CorruptedEntry { path: String, reason: String },
}
