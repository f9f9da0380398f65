//! Registry client error types
//!
//! Covers transport failures, not-found answers and integrity violations
//! detected while talking to the package registry.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum RegistryError {
    #[error("registry unreachable at {url}: {message}")]
    ServerDown { url: String, message: String },

    #[error("no such package: {name}")]
    NoSuchPackage { name: String },

    #[error("no such version: {name}/{version}")]
    NoSuchVersion { name: String, version: String },

    #[error("no such revision: {name}/{version}/{revision}")]
    NoSuchRevision {
        name: String,
        version: String,
        revision: String,
    },

    #[error("registry answered {status}: {message}")]
    Http { status: u16, message: String },

    #[error(
        "registry returned revision {received} for {name}/{version}, requested {requested}"
    )]
    RevisionMismatch {
        name: String,
        version: String,
        requested: String,
        received: String,
    },

    #[error("registry payload disagrees with request: expected {expected}, got {received}")]
    PackageMismatch { expected: String, received: String },

    #[error("invalid registry payload: {message}")]
    InvalidPayload { message: String },
}
