//! Semantic version type
//!
//! [`Version`] wraps [`semver::Version`] to give dopamine the exact
//! semantics it relies on everywhere: SemVer 2.0 precedence for ordering,
//! and equality/hashing that deliberately ignore build metadata. Two
//! revisions of `1.2.3+linux` and `1.2.3+windows` are the same version.

use dop_errors::VersionError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A semantic version
#[derive(Debug, Clone)]
pub struct Version(semver::Version);

impl Version {
    /// Create a version from its numeric components
    #[must_use]
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(semver::Version::new(major, minor, patch))
    }

    /// Parse a version string per SemVer 2.0
    ///
    /// # Errors
    ///
    /// Returns `VersionError::InvalidVersion` for anything the SemVer
    /// grammar rejects: missing parts, negative numbers, empty
    /// pre-release, empty dotted sub-token, characters outside
    /// `[A-Za-z0-9-]`.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        semver::Version::parse(input)
            .map(Self)
            .map_err(|e| VersionError::InvalidVersion {
                input: input.to_string(),
                reason: e.to_string(),
            })
    }

    /// Non-throwing validity check
    #[must_use]
    pub fn is_valid(input: &str) -> bool {
        semver::Version::parse(input).is_ok()
    }

    #[must_use]
    pub fn major(&self) -> u64 {
        self.0.major
    }

    #[must_use]
    pub fn minor(&self) -> u64 {
        self.0.minor
    }

    #[must_use]
    pub fn patch(&self) -> u64 {
        self.0.patch
    }

    /// Pre-release identifiers, empty string if none
    #[must_use]
    pub fn pre(&self) -> &str {
        self.0.pre.as_str()
    }

    /// Build metadata, empty string if none. Ignored by `Eq` and `Hash`.
    #[must_use]
    pub fn build(&self) -> &str {
        self.0.build.as_str()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.0.cmp_precedence(&other.0) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp_precedence(&other.0)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // must agree with Eq: build metadata stays out
        self.0.major.hash(state);
        self.0.minor.hash(state);
        self.0.patch.hash(state);
        self.0.pre.as_str().hash(state);
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_round_trip() {
        for s in [
            "0.0.0",
            "1.2.3",
            "10.20.30",
            "1.2.3-alpha",
            "1.2.3-alpha.1",
            "1.2.3-0.0",
            "1.2.3+build.5",
            "1.2.3-rc.1+build.5",
        ] {
            assert!(Version::is_valid(s), "{s} should be valid");
            assert_eq!(Version::parse(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn rejects_malformed() {
        for s in [
            "", "1", "1.2", "1.2.3.4", "-1.2.3", "1.2.3-", "1.2.3-a..b", "1.2.3-a_b",
            "1.2.3+", "01.2.3",
        ] {
            assert!(!Version::is_valid(s), "{s} should be invalid");
            assert!(Version::parse(s).is_err());
        }
    }

    #[test]
    fn ordering_follows_semver_precedence() {
        let ordered = [
            "1.0.0-alpha",
            "1.0.0-alpha.1",
            "1.0.0-alpha.beta",
            "1.0.0-beta",
            "1.0.0-beta.2",
            "1.0.0-beta.11",
            "1.0.0-rc.1",
            "1.0.0",
            "1.0.1",
            "1.1.0",
            "2.0.0",
        ];
        for pair in ordered.windows(2) {
            let lo = Version::parse(pair[0]).unwrap();
            let hi = Version::parse(pair[1]).unwrap();
            assert!(lo < hi, "{lo} should sort before {hi}");
        }
    }

    #[test]
    fn equality_ignores_build_metadata() {
        let a = Version::parse("1.2.3+linux").unwrap();
        let b = Version::parse("1.2.3+windows").unwrap();
        assert_eq!(a, b);

        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut ha = DefaultHasher::new();
        let mut hb = DefaultHasher::new();
        a.hash(&mut ha);
        b.hash(&mut hb);
        assert_eq!(ha.finish(), hb.finish());
    }

    #[test]
    fn prerelease_sorts_before_release() {
        assert!(Version::parse("1.0.0-rc.1").unwrap() < Version::parse("1.0.0").unwrap());
    }

    proptest! {
        #[test]
        fn numeric_versions_round_trip(major in 0u64..1000, minor in 0u64..1000, patch in 0u64..1000) {
            let s = format!("{major}.{minor}.{patch}");
            prop_assert_eq!(Version::parse(&s).unwrap().to_string(), s);
        }
    }
}
