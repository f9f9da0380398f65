//! Version spec parsing and matching
//!
//! A spec is a conjunction of comparisons over semantic versions:
//! `=1.2.3`, `>=1.0.0`, `>=1.0.0 <2.0.0`. Partial versions are allowed
//! in the textual form (`>=1`, `>=1.1`) and pad the missing parts with
//! zeros; the display form is always normalized to full versions.

use crate::Version;
use dop_errors::VersionError;
use std::fmt;
use std::str::FromStr;

/// A single version comparison
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Comparator {
    Less(Version),
    LessEq(Version),
    Exact(Version),
    GreaterEq(Version),
    Greater(Version),
}

impl Comparator {
    /// Check whether a version satisfies this comparison
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        match self {
            Self::Less(v) => version < v,
            Self::LessEq(v) => version <= v,
            Self::Exact(v) => version == v,
            Self::GreaterEq(v) => version >= v,
            Self::Greater(v) => version > v,
        }
    }

    fn parse(input: &str) -> Result<Self, VersionError> {
        let (ctor, rest): (fn(Version) -> Self, &str) = if let Some(r) = input.strip_prefix(">=") {
            (Self::GreaterEq, r)
        } else if let Some(r) = input.strip_prefix("<=") {
            (Self::LessEq, r)
        } else if let Some(r) = input.strip_prefix('>') {
            (Self::Greater, r)
        } else if let Some(r) = input.strip_prefix('<') {
            (Self::Less, r)
        } else if let Some(r) = input.strip_prefix('=') {
            (Self::Exact, r)
        } else {
            (Self::Exact, input)
        };
        Ok(ctor(parse_lenient(rest.trim())?))
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Less(v) => write!(f, "<{v}"),
            Self::LessEq(v) => write!(f, "<={v}"),
            Self::Exact(v) => write!(f, "={v}"),
            Self::GreaterEq(v) => write!(f, ">={v}"),
            Self::Greater(v) => write!(f, ">{v}"),
        }
    }
}

/// Parse a version, padding missing minor/patch parts with zeros.
///
/// Pre-release and build metadata require the full three-part form.
fn parse_lenient(input: &str) -> Result<Version, VersionError> {
    if !input.is_empty()
        && input.bytes().all(|b| b.is_ascii_digit() || b == b'.')
        && !input.starts_with('.')
        && !input.ends_with('.')
    {
        let dots = input.bytes().filter(|b| *b == b'.').count();
        match dots {
            0 => return Version::parse(&format!("{input}.0.0")),
            1 => return Version::parse(&format!("{input}.0")),
            _ => {}
        }
    }
    Version::parse(input)
}

/// A version spec: the conjunction of one or more comparisons
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionSpec {
    comparators: Vec<Comparator>,
}

impl VersionSpec {
    /// Create a spec from a single comparison
    #[must_use]
    pub fn single(comparator: Comparator) -> Self {
        Self {
            comparators: vec![comparator],
        }
    }

    /// Create an exact-equality spec
    #[must_use]
    pub fn exact(version: Version) -> Self {
        Self::single(Comparator::Exact(version))
    }

    /// Check whether a version satisfies every comparison
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.comparators.iter().all(|c| c.matches(version))
    }

    /// The individual comparisons
    #[must_use]
    pub fn comparators(&self) -> &[Comparator] {
        &self.comparators
    }
}

impl FromStr for VersionSpec {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let comparators: Result<Vec<_>, _> = s
            .split_whitespace()
            .map(Comparator::parse)
            .collect();
        let comparators = comparators.map_err(|e| VersionError::InvalidSpec {
            input: s.to_string(),
            reason: e.to_string(),
        })?;

        if comparators.is_empty() {
            return Err(VersionError::InvalidSpec {
                input: s.to_string(),
                reason: "empty spec".to_string(),
            });
        }

        Ok(Self { comparators })
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for c in &self.comparators {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{c}")?;
            first = false;
        }
        Ok(())
    }
}
