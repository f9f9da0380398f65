//! Profile INI persistence
//!
//! The file layout is fixed and ordered — `[main]`, `[host]`, one
//! `[compiler.<lang>]` section per language, `[digest]` — so no generic
//! INI encoder is used. The stored digest is recomputed on load and any
//! disagreement fails the load.

use crate::{Compiler, Profile};
use dop_errors::{Error, ProfileError};
use dop_types::{Language, Version};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

/// Render a profile to its INI text
#[must_use]
pub fn to_ini_string(profile: &Profile) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "[main]");
    let _ = writeln!(out, "basename={}", profile.basename());
    let _ = writeln!(out, "buildtype={}", profile.build_type());
    let _ = writeln!(out);
    let _ = writeln!(out, "[host]");
    let _ = writeln!(out, "arch={}", profile.host().arch);
    let _ = writeln!(out, "os={}", profile.host().os);
    for compiler in profile.compilers() {
        let _ = writeln!(out);
        let _ = writeln!(out, "[compiler.{}]", compiler.lang.key());
        let _ = writeln!(out, "name={}", compiler.name);
        let _ = writeln!(out, "ver={}", compiler.version);
        let _ = writeln!(
            out,
            "path={}",
            compiler.path.display().to_string().replace('\\', "\\\\")
        );
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[digest]");
    let _ = writeln!(out, "hash={}", profile.digest_hash());

    out
}

/// Write a profile to an INI file, creating parent directories
///
/// # Errors
///
/// Returns an error when the directories or the file cannot be written.
pub fn save_ini(profile: &Profile, path: &Path) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io_with_path(&e, parent))?;
    }
    std::fs::write(path, to_ini_string(profile)).map_err(|e| Error::io_with_path(&e, path))
}

/// Load a profile from an INI file, verifying the stored digest
///
/// # Errors
///
/// Returns `ProfileError::InvalidIni` for malformed content and
/// `ProfileError::DigestMismatch` when the stored digest disagrees with
/// the recomputed one.
pub fn load_ini(path: &Path) -> Result<Profile, Error> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io_with_path(&e, path))?;
    from_ini_string(&content, &path.display().to_string())
}

/// Parse a profile from INI text. `origin` names the source in errors.
///
/// # Errors
///
/// See [`load_ini`].
pub fn from_ini_string(content: &str, origin: &str) -> Result<Profile, Error> {
    let invalid = |line: usize, reason: String| -> Error {
        ProfileError::InvalidIni {
            path: origin.to_string(),
            line,
            reason,
        }
        .into()
    };

    let mut section = String::new();
    // section -> key -> (line, value)
    let mut values: BTreeMap<String, BTreeMap<String, (usize, String)>> = BTreeMap::new();
    let mut section_order: Vec<String> = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        let lineno = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[') {
            let name = name
                .strip_suffix(']')
                .ok_or_else(|| invalid(lineno, "unterminated section header".to_string()))?;
            section = name.trim().to_string();
            if !values.contains_key(&section) {
                section_order.push(section.clone());
            }
            values.entry(section.clone()).or_default();
        } else if let Some((key, value)) = line.split_once('=') {
            if section.is_empty() {
                return Err(invalid(lineno, "key outside of any section".to_string()));
            }
            values
                .entry(section.clone())
                .or_default()
                .insert(key.trim().to_string(), (lineno, value.trim().to_string()));
        } else {
            return Err(invalid(lineno, format!("unrecognized line `{line}`")));
        }
    }

    let get = |section: &str, key: &str| -> Result<(usize, String), Error> {
        values
            .get(section)
            .and_then(|keys| keys.get(key))
            .cloned()
            .ok_or_else(|| invalid(0, format!("missing key `{key}` in section [{section}]")))
    };

    let (line, basename) = get("main", "basename")?;
    if basename.is_empty() {
        return Err(invalid(line, "empty basename".to_string()));
    }
    let (line, buildtype) = get("main", "buildtype")?;
    let build_type = buildtype
        .parse()
        .map_err(|e: ProfileError| invalid(line, e.to_string()))?;

    let (line, arch) = get("host", "arch")?;
    let arch = arch
        .parse()
        .map_err(|e: ProfileError| invalid(line, e.to_string()))?;
    let (line, os) = get("host", "os")?;
    let os = os
        .parse()
        .map_err(|e: ProfileError| invalid(line, e.to_string()))?;

    let mut compilers = Vec::new();
    for section in &section_order {
        let Some(lang_key) = section.strip_prefix("compiler.") else {
            continue;
        };
        let lang: Language = lang_key
            .parse()
            .map_err(|e: ProfileError| invalid(0, e.to_string()))?;
        let (_, name) = get(section, "name")?;
        let (line, ver) = get(section, "ver")?;
        let version =
            Version::parse(&ver).map_err(|e| invalid(line, e.to_string()))?;
        let (_, path) = get(section, "path")?;
        compilers.push(Compiler::new(
            lang,
            name,
            version,
            path.replace("\\\\", "\\"),
        ));
    }

    let profile = Profile::new(
        basename,
        dop_types::HostInfo::new(arch, os),
        build_type,
        compilers,
    )?;

    if let Some(keys) = values.get("digest") {
        if let Some((_, stored)) = keys.get("hash") {
            let computed = profile.digest_hash();
            if *stored != computed {
                return Err(ProfileError::DigestMismatch {
                    path: origin.to_string(),
                    stored: stored.clone(),
                    computed,
                }
                .into());
            }
        }
    }

    Ok(profile)
}
