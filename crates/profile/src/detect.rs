//! Host and compiler detection
//!
//! Each language carries an ordered list of probers, OS-dependent: on
//! Linux C/C++ prefer GCC over Clang, on macOS the order is reversed,
//! and Windows additionally probes MSVC. A prober locates its command,
//! runs `<cmd> --version` and extracts the version with an anchored
//! regular expression.

use crate::Compiler;
use dop_errors::{Error, ProfileError};
use dop_types::{Arch, BuildType, HostInfo, Language, Os, Version};
use regex::Regex;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// Host info of the running process
///
/// # Errors
///
/// Returns an error on targets dopamine has no toolchain support for.
pub fn current_host() -> Result<HostInfo, Error> {
    let arch = if cfg!(target_arch = "x86_64") {
        Arch::X86_64
    } else if cfg!(target_arch = "x86") {
        Arch::X86
    } else if cfg!(target_arch = "aarch64") {
        Arch::Aarch64
    } else {
        return Err(ProfileError::UnknownArch {
            input: std::env::consts::ARCH.to_string(),
        }
        .into());
    };
    let os = if cfg!(target_os = "linux") {
        Os::Linux
    } else if cfg!(target_os = "macos") {
        Os::Macos
    } else if cfg!(target_os = "windows") {
        Os::Windows
    } else {
        return Err(ProfileError::UnknownOs {
            input: std::env::consts::OS.to_string(),
        }
        .into());
    };
    Ok(HostInfo::new(arch, os))
}

struct Prober {
    /// Compiler name recorded in the profile (part of the digest)
    name: &'static str,
    /// Command probed on PATH
    command: &'static str,
    /// Anchored pattern extracting the version from `--version` output
    pattern: &'static str,
}

const GCC: Prober = Prober {
    name: "gcc",
    command: "gcc",
    pattern: r"(?m)^gcc\S* \([^)]*\) (\d+\.\d+\.\d+)",
};
const GXX: Prober = Prober {
    name: "g++",
    command: "g++",
    pattern: r"(?m)^g\+\+\S* \([^)]*\) (\d+\.\d+\.\d+)",
};
const CLANG: Prober = Prober {
    name: "clang",
    command: "clang",
    pattern: r"(?m)^(?:\S+ )*?clang version (\d+\.\d+\.\d+)",
};
const CLANGXX: Prober = Prober {
    name: "clang++",
    command: "clang++",
    pattern: r"(?m)^(?:\S+ )*?clang version (\d+\.\d+\.\d+)",
};
const MSVC: Prober = Prober {
    name: "msvc",
    command: "cl",
    pattern: r"Compiler Version (\d+\.\d+\.\d+)",
};
const DMD: Prober = Prober {
    name: "dmd",
    command: "dmd",
    pattern: r"(?m)^DMD\d* D Compiler v(\d+\.\d+\.\d+)",
};
const LDC: Prober = Prober {
    name: "ldc",
    command: "ldc2",
    pattern: r"(?m)^LDC - the LLVM D compiler \((\d+\.\d+\.\d+)\)",
};

fn probers(lang: Language, os: Os) -> &'static [Prober] {
    match (lang, os) {
        (Language::C, Os::Linux) => &[GCC, CLANG],
        (Language::C, Os::Macos) => &[CLANG, GCC],
        (Language::C, Os::Windows) => &[MSVC, GCC, CLANG],
        (Language::Cpp, Os::Linux) => &[GXX, CLANGXX],
        (Language::Cpp, Os::Macos) => &[CLANGXX, GXX],
        (Language::Cpp, Os::Windows) => &[MSVC, GXX, CLANGXX],
        (Language::D, _) => &[DMD, LDC],
    }
}

/// Extract a version from prober output. Exposed for tests.
#[must_use]
pub fn extract_version(pattern: &str, output: &str) -> Option<Version> {
    let re = Regex::new(pattern).ok()?;
    let captured = re.captures(output)?.get(1)?;
    Version::parse(captured.as_str()).ok()
}

fn probe(prober: &Prober) -> Option<Compiler> {
    let path: PathBuf = which::which(prober.command).ok()?;
    let output = Command::new(&path).arg("--version").output().ok()?;
    // MSVC prints its banner on stderr
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    let version = extract_version(prober.pattern, &text)?;
    debug!(
        compiler = prober.name,
        %version,
        path = %path.display(),
        "detected compiler"
    );
    Some(Compiler::new(
        prober.lang_of(),
        prober.name,
        version,
        path,
    ))
}

impl Prober {
    fn lang_of(&self) -> Language {
        match self.name {
            "gcc" | "clang" => Language::C,
            "g++" | "clang++" => Language::Cpp,
            "msvc" => Language::C, // fixed up by the caller for C++
            _ => Language::D,
        }
    }
}

/// Detect the preferred compiler for a language on the given OS
///
/// # Errors
///
/// Returns `ProfileError::CompilerNotFound` when no prober succeeds.
/// Missing compilers are fatal: a profile cannot be built without one
/// compiler per requested language.
pub fn detect_compiler(lang: Language, os: Os) -> Result<Compiler, Error> {
    for prober in probers(lang, os) {
        if let Some(mut compiler) = probe(prober) {
            compiler.lang = lang;
            return Ok(compiler);
        }
    }
    Err(ProfileError::CompilerNotFound {
        lang: lang.to_string(),
    }
    .into())
}

/// Detect a full profile for the running host
///
/// # Errors
///
/// Returns an error when the host is unsupported or any compiler is
/// missing.
pub fn default_profile(
    basename: &str,
    build_type: BuildType,
    langs: &[Language],
) -> Result<crate::Profile, Error> {
    let host = current_host()?;
    let mut compilers = Vec::with_capacity(langs.len());
    for lang in langs {
        compilers.push(detect_compiler(*lang, host.os)?);
    }
    crate::Profile::new(basename, host, build_type, compilers)
}
