//! Build-state engine and orchestrator error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum BuildError {
    /// A stage was asserted to be ready but was not, and the current
    /// command refuses to run prerequisites on its own.
    #[error("{message}")]
    StateNotReached { message: String },

    #[error("build failed: {message}")]
    Failed { message: String },

    #[error("build reported an install but {path} does not exist")]
    InstallDirMissing { path: String },

    #[error("recipe `{name}` neither installed during build nor has a pack function")]
    NothingToInstall { name: String },

    #[error("no profile for {dir}; supply one or save it to .dop/profile.ini")]
    NoProfile { dir: String },
}
