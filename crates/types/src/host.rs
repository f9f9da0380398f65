//! Host description types

use dop_errors::ProfileError;
use std::fmt;
use std::str::FromStr;

/// Processor architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86,
    X86_64,
    Aarch64,
}

impl Arch {
    /// Stable numeric code, fed into the profile digest as a 4-byte
    /// little-endian value. Never renumber.
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            Self::X86 => 0,
            Self::X86_64 => 1,
            Self::Aarch64 => 2,
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::X86 => "x86",
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "aarch64",
        })
    }
}

impl FromStr for Arch {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x86" => Ok(Self::X86),
            "x86_64" => Ok(Self::X86_64),
            "aarch64" => Ok(Self::Aarch64),
            _ => Err(ProfileError::UnknownArch {
                input: s.to_string(),
            }),
        }
    }
}

/// Operating system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Linux,
    Macos,
    Windows,
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Linux => "linux",
            Self::Macos => "macos",
            Self::Windows => "windows",
        })
    }
}

impl FromStr for Os {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linux" => Ok(Self::Linux),
            "macos" => Ok(Self::Macos),
            "windows" => Ok(Self::Windows),
            _ => Err(ProfileError::UnknownOs {
                input: s.to_string(),
            }),
        }
    }
}

/// The host a build runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostInfo {
    pub arch: Arch,
    pub os: Os,
}

impl HostInfo {
    #[must_use]
    pub fn new(arch: Arch, os: Os) -> Self {
        Self { arch, os }
    }
}

/// Build type of a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildType {
    Release,
    Debug,
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Release => "release",
            Self::Debug => "debug",
        })
    }
}

impl FromStr for BuildType {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "release" => Ok(Self::Release),
            "debug" => Ok(Self::Debug),
            _ => Err(ProfileError::UnknownBuildType {
                input: s.to_string(),
            }),
        }
    }
}
