#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Dependency resolution for dopamine
//!
//! This crate builds and resolves the dependency DAG of a recipe in two
//! phases — `prepare` (top-down discovery) then `filter` (bottom-up
//! fixed point) and `resolve` (top-down pinning) — and serializes the
//! result to the textual lock-file format.

mod dag;
mod lockfile;

pub use dag::{DepDag, PackId, VerId};
pub use lockfile::{
    parse_lockfile, read_lockfile, serialize_lockfile, write_lockfile, LOCKFILE_NAME,
    LOCKFILE_VERSION,
};

use dop_errors::Error;
use dop_repo::PackRepo;
use dop_types::Version;
use std::fmt;
use std::str::FromStr;

/// Version-picking heuristics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heuristics {
    /// Highest locally cached version, falling back to the highest
    PreferCached,
    /// Always the highest compatible version
    PickHighest,
}

impl Heuristics {
    /// Canonical key, as written in lock-files
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::PreferCached => "preferCached",
            Self::PickHighest => "pickHighest",
        }
    }

    /// Pick one version out of a sorted candidate list
    ///
    /// Candidates must be sorted ascending. Ties break towards the
    /// highest version, whether cached or not.
    ///
    /// # Errors
    ///
    /// An empty candidate list is a programming bug and yields an
    /// internal error.
    pub async fn choose_version<R: PackRepo>(
        self,
        repo: &R,
        name: &str,
        versions: &[Version],
    ) -> Result<Version, Error> {
        let Some(highest) = versions.last() else {
            return Err(Error::internal(format!(
                "choose_version called with no candidate for {name}"
            )));
        };
        match self {
            Self::PickHighest => Ok(highest.clone()),
            Self::PreferCached => {
                for version in versions.iter().rev() {
                    if repo.is_cached(name, version, None).await {
                        return Ok(version.clone());
                    }
                }
                Ok(highest.clone())
            }
        }
    }
}

impl fmt::Display for Heuristics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Heuristics {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preferCached" => Ok(Self::PreferCached),
            "pickHighest" => Ok(Self::PickHighest),
            _ => Err(format!("unknown heuristics: {s}")),
        }
    }
}
