//! Build-profile error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ProfileError {
    #[error("unknown language: {input}")]
    UnknownLanguage { input: String },

    #[error("unknown architecture: {input}")]
    UnknownArch { input: String },

    #[error("unknown operating system: {input}")]
    UnknownOs { input: String },

    #[error("unknown build type: {input}")]
    UnknownBuildType { input: String },

    #[error("duplicate compiler for language {lang}")]
    DuplicateLanguage { lang: String },

    #[error("profile has no compiler for language {lang}")]
    MissingLanguage { lang: String },

    #[error("no {lang} compiler found on this system")]
    CompilerNotFound { lang: String },

    #[error("could not extract a version from `{command} --version` output")]
    VersionNotRecognized { command: String },

    #[error("invalid profile file {path} (line {line}): {reason}")]
    InvalidIni {
        path: String,
        line: usize,
        reason: String,
    },

    #[error("profile digest mismatch in {path}: stored {stored}, computed {computed}")]
    DigestMismatch {
        path: String,
        stored: String,
        computed: String,
    },
}
