//! Dependency declarations and build-time dependency info

use crate::VersionSpec;
use dop_errors::VersionError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// A dependency declared by a recipe: a package name and the versions
/// the recipe accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub spec: VersionSpec,
}

impl Dependency {
    #[must_use]
    pub fn new(name: impl Into<String>, spec: VersionSpec) -> Self {
        Self {
            name: name.into(),
            spec,
        }
    }

    /// Parse `<name> <spec>` (e.g. `zlib >=1.2.0 <2.0.0`)
    ///
    /// # Errors
    ///
    /// Returns `VersionError::InvalidSpec` when the name is missing or
    /// the spec part does not parse.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let mut parts = input.trim().splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default();
        let spec = parts.next().unwrap_or_default();
        if name.is_empty() || spec.is_empty() {
            return Err(VersionError::InvalidSpec {
                input: input.to_string(),
                reason: "expected `<name> <spec>`".to_string(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            spec: spec.parse()?,
        })
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.spec)
    }
}

impl FromStr for Dependency {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// What a built dependency hands to its dependents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepInfo {
    /// Directory the dependency was installed (or staged) into
    pub install_dir: PathBuf,
}

impl DepInfo {
    #[must_use]
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
        }
    }
}
