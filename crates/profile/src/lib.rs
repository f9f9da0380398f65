#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Build profiles for dopamine
//!
//! A profile captures the toolchain identity a package is built with:
//! host, build type and one compiler per language. Its SHA-1 digest is
//! stable across machines that agree on `(lang, name, version)` for every
//! compiler — the compiler *path* deliberately stays out — and its first
//! ten hex characters partition the cache and build directories.

mod detect;
mod ini;

pub use detect::{current_host, default_profile, detect_compiler, extract_version};
pub use ini::{from_ini_string, load_ini, save_ini, to_ini_string};

use dop_errors::{Error, ProfileError};
use dop_types::{BuildType, HostInfo, Language, Version};
use sha1::{Digest, Sha1};
use std::path::PathBuf;

/// Number of digest characters used as directory prefix
pub const SHORT_HASH_LEN: usize = 10;

/// One compiler of a profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compiler {
    pub lang: Language,
    pub name: String,
    pub version: Version,
    pub path: PathBuf,
}

impl Compiler {
    #[must_use]
    pub fn new(
        lang: Language,
        name: impl Into<String>,
        version: Version,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            lang,
            name: name.into(),
            version,
            path: path.into(),
        }
    }
}

/// A build profile
///
/// Compilers are kept sorted by language; no language appears twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    basename: String,
    host: HostInfo,
    build_type: BuildType,
    compilers: Vec<Compiler>,
}

impl Profile {
    /// Create a profile, sorting compilers by language
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::DuplicateLanguage` when two compilers share
    /// a language.
    pub fn new(
        basename: impl Into<String>,
        host: HostInfo,
        build_type: BuildType,
        mut compilers: Vec<Compiler>,
    ) -> Result<Self, Error> {
        compilers.sort_by_key(|c| c.lang);
        for pair in compilers.windows(2) {
            if pair[0].lang == pair[1].lang {
                return Err(ProfileError::DuplicateLanguage {
                    lang: pair[0].lang.to_string(),
                }
                .into());
            }
        }
        Ok(Self {
            basename: basename.into(),
            host,
            build_type,
            compilers,
        })
    }

    #[must_use]
    pub fn basename(&self) -> &str {
        &self.basename
    }

    #[must_use]
    pub fn host(&self) -> HostInfo {
        self.host
    }

    #[must_use]
    pub fn build_type(&self) -> BuildType {
        self.build_type
    }

    /// Compilers, sorted by language
    #[must_use]
    pub fn compilers(&self) -> &[Compiler] {
        &self.compilers
    }

    /// Languages this profile can build, in canonical order
    #[must_use]
    pub fn langs(&self) -> Vec<Language> {
        self.compilers.iter().map(|c| c.lang).collect()
    }

    /// Full profile name: basename and language keys joined with dashes
    /// (e.g. `default-c-cpp`)
    #[must_use]
    pub fn name(&self) -> String {
        let mut name = self.basename.clone();
        for c in &self.compilers {
            name.push('-');
            name.push_str(c.lang.key());
        }
        name
    }

    #[must_use]
    pub fn compiler_for(&self, lang: Language) -> Option<&Compiler> {
        self.compilers.iter().find(|c| c.lang == lang)
    }

    #[must_use]
    pub fn has_all_langs(&self, langs: &[Language]) -> bool {
        langs.iter().all(|l| self.compiler_for(*l).is_some())
    }

    /// A profile restricted to the given languages
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::MissingLanguage` when this profile has no
    /// compiler for one of them.
    pub fn subset(&self, langs: &[Language]) -> Result<Profile, Error> {
        let mut compilers = Vec::with_capacity(langs.len());
        for lang in langs {
            let compiler =
                self.compiler_for(*lang)
                    .ok_or_else(|| ProfileError::MissingLanguage {
                        lang: lang.to_string(),
                    })?;
            compilers.push(compiler.clone());
        }
        Profile::new(
            self.basename.clone(),
            self.host,
            self.build_type,
            compilers,
        )
    }

    /// The profile digest: lowercase hex SHA-1 over host, build type and
    /// the identity of every compiler.
    ///
    /// Feeding order is fixed: arch code (4-byte little-endian), os,
    /// build type, 4-byte compiler count, then per compiler sorted by
    /// language: language key, name, version. Strings are fed as bytes
    /// followed by a single NUL.
    #[must_use]
    pub fn digest_hash(&self) -> String {
        fn feed(hasher: &mut Sha1, s: &str) {
            hasher.update(s.as_bytes());
            hasher.update([0u8]);
        }

        let mut hasher = Sha1::new();
        hasher.update(self.host.arch.code().to_le_bytes());
        feed(&mut hasher, &self.host.os.to_string());
        feed(&mut hasher, &self.build_type.to_string());
        let count = u32::try_from(self.compilers.len()).unwrap_or(u32::MAX);
        hasher.update(count.to_le_bytes());
        for c in &self.compilers {
            feed(&mut hasher, c.lang.key());
            feed(&mut hasher, &c.name);
            feed(&mut hasher, &c.version.to_string());
        }
        hex::encode(hasher.finalize())
    }

    /// First [`SHORT_HASH_LEN`] characters of the digest, used as cache
    /// directory prefix
    #[must_use]
    pub fn short_hash(&self) -> String {
        let mut hash = self.digest_hash();
        hash.truncate(SHORT_HASH_LEN);
        hash
    }

    /// Directory name holding per-profile build state:
    /// `<short-hash>-<basename>`
    #[must_use]
    pub fn dirname(&self) -> String {
        format!("{}-{}", self.short_hash(), self.basename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dop_types::{Arch, Os};

    fn compiler(lang: Language, name: &str, version: &str, path: &str) -> Compiler {
        Compiler::new(lang, name, Version::parse(version).unwrap(), path)
    }

    pub(crate) fn sample_profile() -> Profile {
        Profile::new(
            "default",
            HostInfo::new(Arch::X86_64, Os::Linux),
            BuildType::Release,
            vec![
                compiler(Language::D, "dmd", "2.105.2", "/usr/bin/dmd"),
                compiler(Language::C, "gcc", "12.1.0", "/usr/bin/gcc"),
                compiler(Language::Cpp, "g++", "12.1.0", "/usr/bin/g++"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn name_appends_sorted_langs() {
        assert_eq!(sample_profile().name(), "default-c-cpp-d");
    }

    #[test]
    fn rejects_duplicate_language() {
        let result = Profile::new(
            "default",
            HostInfo::new(Arch::X86_64, Os::Linux),
            BuildType::Release,
            vec![
                compiler(Language::C, "gcc", "12.1.0", "/usr/bin/gcc"),
                compiler(Language::C, "clang", "14.0.0", "/usr/bin/clang"),
            ],
        );
        assert!(result.is_err());
    }

    #[test]
    fn digest_ignores_compiler_path() {
        let a = sample_profile();
        let b = Profile::new(
            "default",
            a.host(),
            a.build_type(),
            a.compilers()
                .iter()
                .map(|c| Compiler::new(c.lang, c.name.clone(), c.version.clone(), "/opt/other"))
                .collect(),
        )
        .unwrap();
        assert_eq!(a.digest_hash(), b.digest_hash());
    }

    #[test]
    fn digest_ignores_compiler_order() {
        let a = sample_profile();
        let mut compilers: Vec<_> = a.compilers().to_vec();
        compilers.reverse();
        let b = Profile::new(a.basename(), a.host(), a.build_type(), compilers).unwrap();
        assert_eq!(a.digest_hash(), b.digest_hash());
    }

    #[test]
    fn digest_changes_with_toolchain_identity() {
        let a = sample_profile();

        let debug = Profile::new(
            a.basename(),
            a.host(),
            BuildType::Debug,
            a.compilers().to_vec(),
        )
        .unwrap();
        assert_ne!(a.digest_hash(), debug.digest_hash());

        let mut compilers = a.compilers().to_vec();
        compilers[0].version = Version::parse("12.1.1").unwrap();
        let bumped = Profile::new(a.basename(), a.host(), a.build_type(), compilers).unwrap();
        assert_ne!(a.digest_hash(), bumped.digest_hash());
    }

    #[test]
    fn short_hash_prefixes_digest() {
        let p = sample_profile();
        let digest = p.digest_hash();
        assert_eq!(digest.len(), 40);
        assert!(digest.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
        assert_eq!(p.short_hash(), &digest[..SHORT_HASH_LEN]);
        assert_eq!(p.dirname(), format!("{}-default", p.short_hash()));
    }

    #[test]
    fn subset_keeps_named_languages() {
        let p = sample_profile();
        let sub = p.subset(&[Language::C, Language::D]).unwrap();
        assert_eq!(sub.langs(), vec![Language::C, Language::D]);
        assert_ne!(sub.digest_hash(), p.digest_hash());
        assert!(p.has_all_langs(&[Language::C, Language::Cpp]));

        assert!(sub.subset(&[Language::Cpp]).is_err());
        assert!(!sub.has_all_langs(&[Language::Cpp]));
    }
}
