//! Recipe facade error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum RecipeError {
    #[error("recipe hook `{hook}` failed: {message}")]
    HookFailed { hook: String, message: String },

    #[error("recipe `{name}` has no `{hook}` function")]
    MissingHook { name: String, hook: String },

    #[error("in-tree source of `{name}` must be a relative path, got {path}")]
    SourceNotRelative { name: String, path: String },
}
