//! Language tags
//!
//! Profiles, recipes and the resolver all describe toolchains in terms of
//! the languages they compile. The derived ordering is what keeps profile
//! names and digest input stable.

use dop_errors::ProfileError;
use std::fmt;
use std::str::FromStr;

/// A compiled language dopamine knows how to drive a toolchain for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Language {
    C,
    Cpp,
    D,
}

impl Language {
    /// All languages, in their canonical order
    pub const ALL: [Language; 3] = [Language::C, Language::Cpp, Language::D];

    /// Canonical textual form, as used in profile names, INI sections
    /// and lock-files
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::D => "d",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Language {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "c" => Ok(Self::C),
            "cpp" | "c++" => Ok(Self::Cpp),
            "d" => Ok(Self::D),
            _ => Err(ProfileError::UnknownLanguage {
                input: s.to_string(),
            }),
        }
    }
}

/// Sort and deduplicate a language list in place
pub fn sort_unique(langs: &mut Vec<Language>) {
    langs.sort_unstable();
    langs.dedup();
}
