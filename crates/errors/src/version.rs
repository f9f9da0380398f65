//! Version and version-spec parsing error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum VersionError {
    #[error("invalid version '{input}': {reason}")]
    InvalidVersion { input: String, reason: String },

    #[error("invalid version spec '{input}': {reason}")]
    InvalidSpec { input: String, reason: String },

    #[error("version parse error: {message}")]
    ParseError { message: String },
}
