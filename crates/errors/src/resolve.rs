//! Dependency resolution error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ResolveError {
    #[error("no version of {name} satisfies {spec}")]
    NoCompatibleVersion { name: String, spec: String },

    #[error("package {name} has no considered version left after filtering")]
    NoConsideredVersion { name: String },

    #[error("package {name} is not resolved")]
    UnresolvedPackage { name: String },

    /// A resolved version escaped the spec that discovered it. This is a
    /// programming bug, not a user error.
    #[error("resolved {name}-{version} violates spec {spec}")]
    SpecViolation {
        name: String,
        version: String,
        spec: String,
    },
}
