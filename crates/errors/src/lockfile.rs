//! Lock-file codec error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum LockfileError {
    /// Malformed directive or content. Line numbers are 1-based.
    #[error("{file}:{line}: invalid lock-file: {reason}")]
    Invalid {
        file: String,
        line: usize,
        reason: String,
    },

    #[error("{file}: unsupported lock-file version {version}")]
    UnsupportedVersion { file: String, version: u32 },
}
