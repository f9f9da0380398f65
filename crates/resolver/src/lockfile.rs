//! Lock-file codec
//!
//! Line-oriented, 2-space indented, UTF-8. The format round-trips
//! exactly: serializing a parsed lock-file reproduces the input byte for
//! byte. Because key order is part of the contract, this is an explicit
//! line writer and reader, not a generic encoder.
//!
//! ```text
//! # dop lock-file v1
//! heuristics: preferCached
//!
//! package: <name>
//!   version: <semver>[ [resolved]|[considered]]
//!     revision: <hex>
//!     langs: <l1>, <l2>
//!     dependency: <down-name> <spec>
//! ```

use crate::{DepDag, Heuristics, PackId, VerId};
use dop_errors::{Error, LockfileError};
use dop_types::{Language, Version, VersionSpec};
use std::fmt::Write as _;
use std::path::Path;

/// Supported lock-file format version
pub const LOCKFILE_VERSION: u32 = 1;

/// Conventional lock-file name next to a recipe
pub const LOCKFILE_NAME: &str = "dop.lock";

/// Serialize a DAG to lock-file text
///
/// Packages appear in discovery order, versions in each package's
/// known-version order. With `emit_all_versions` unset, versions without
/// a considered/resolved node are left out.
#[must_use]
pub fn serialize_lockfile(dag: &DepDag, emit_all_versions: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# dop lock-file v{LOCKFILE_VERSION}");
    let _ = writeln!(out, "heuristics: {}", dag.heuristics().key());

    for pack in dag.packs() {
        let _ = writeln!(out);
        let _ = writeln!(out, "package: {}", dag.pack_name(pack));
        for version in dag.all_versions(pack) {
            match dag.node_of(pack, version) {
                None => {
                    if emit_all_versions {
                        let _ = writeln!(out, "  version: {version}");
                    }
                }
                Some(ver) => {
                    let attr = if dag.resolved(pack) == Some(ver) {
                        "resolved"
                    } else {
                        "considered"
                    };
                    let _ = writeln!(out, "  version: {version} [{attr}]");
                    if let Some(revision) = dag.revision(ver) {
                        let _ = writeln!(out, "    revision: {revision}");
                    }
                    let langs = dag.languages(ver);
                    if !langs.is_empty() {
                        let keys: Vec<&str> = langs.iter().map(|l| l.key()).collect();
                        let _ = writeln!(out, "    langs: {}", keys.join(", "));
                    }
                    for (down, spec) in dag.down_deps(ver) {
                        let _ = writeln!(out, "    dependency: {} {spec}", dag.pack_name(down));
                    }
                }
            }
        }
    }
    out
}

/// Serialize a DAG to a lock-file on disk
///
/// # Errors
///
/// Returns an error when the file cannot be written.
pub fn write_lockfile(dag: &DepDag, path: &Path) -> Result<(), Error> {
    std::fs::write(path, serialize_lockfile(dag, true))
        .map_err(|e| Error::io_with_path(&e, path))
}

/// Parse lock-file text back into a DAG
///
/// `filename` names the source in errors; line numbers are 1-based.
///
/// # Errors
///
/// - `LockfileError::UnsupportedVersion` for any format version but 1.
/// - `LockfileError::Invalid` for malformed directives, unparsable
///   versions or specs, and dependencies on unknown packages.
pub fn parse_lockfile(content: &str, filename: &str) -> Result<DepDag, Error> {
    let invalid = |line: usize, reason: String| -> Error {
        LockfileError::Invalid {
            file: filename.to_string(),
            line,
            reason,
        }
        .into()
    };

    let mut lines = content.lines().enumerate();

    // the first data line carries the format version
    let (first_lineno, first) = lines
        .by_ref()
        .find(|(_, line)| !line.trim().is_empty())
        .ok_or_else(|| invalid(1, "empty lock-file".to_string()))?;
    let version = first
        .trim()
        .strip_prefix("# dop lock-file v")
        .and_then(|v| v.parse::<u32>().ok())
        .ok_or_else(|| {
            invalid(
                first_lineno + 1,
                format!("expected `# dop lock-file v{LOCKFILE_VERSION}`"),
            )
        })?;
    if version != LOCKFILE_VERSION {
        return Err(LockfileError::UnsupportedVersion {
            file: filename.to_string(),
            version,
        }
        .into());
    }

    let mut dag = DepDag::empty(Heuristics::PickHighest);
    let mut cur_pack: Option<PackId> = None;
    let mut cur_ver: Option<VerId> = None;
    let mut seen_package = false;
    // dependency directives become edges once every package is known
    let mut pending_deps: Vec<(VerId, String, VersionSpec, usize)> = Vec::new();

    for (idx, raw) in lines {
        let lineno = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((directive, value)) = line.split_once(':') else {
            return Err(invalid(lineno, format!("unrecognized line `{line}`")));
        };
        let value = value.trim();

        match directive.trim() {
            "heuristics" => {
                if seen_package {
                    return Err(invalid(
                        lineno,
                        "heuristics must come before any package".to_string(),
                    ));
                }
                let heuristics = value
                    .parse::<Heuristics>()
                    .map_err(|e| invalid(lineno, e))?;
                dag = DepDag::empty(heuristics);
            }
            "package" => {
                if value.is_empty() {
                    return Err(invalid(lineno, "empty package name".to_string()));
                }
                if dag.pack_by_name(value).is_some() {
                    return Err(invalid(lineno, format!("duplicate package `{value}`")));
                }
                seen_package = true;
                cur_pack = Some(dag.create_pack(value));
                cur_ver = None;
            }
            "version" => {
                let Some(pack) = cur_pack else {
                    return Err(invalid(
                        lineno,
                        "version directive outside of a package".to_string(),
                    ));
                };
                let mut words = value.split_whitespace();
                let version = words
                    .next()
                    .ok_or_else(|| invalid(lineno, "missing version".to_string()))
                    .and_then(|v| {
                        Version::parse(v).map_err(|e| invalid(lineno, e.to_string()))
                    })?;
                if dag.all_versions(pack).contains(&version) {
                    return Err(invalid(lineno, format!("duplicate version {version}")));
                }
                dag.push_version(pack, version.clone());
                cur_ver = match words.next() {
                    None => None,
                    Some("[considered]") => Some(dag.create_version(pack, version)),
                    Some("[resolved]") => {
                        if dag.resolved(pack).is_some() {
                            return Err(invalid(
                                lineno,
                                "package already has a resolved version".to_string(),
                            ));
                        }
                        let ver = dag.create_version(pack, version);
                        dag.set_resolved(pack, ver);
                        Some(ver)
                    }
                    Some(attr) => {
                        return Err(invalid(lineno, format!("unknown attribute `{attr}`")));
                    }
                };
                if words.next().is_some() {
                    return Err(invalid(lineno, "trailing content after version".to_string()));
                }
            }
            "revision" => {
                let ver = cur_ver.ok_or_else(|| {
                    invalid(lineno, "revision requires a current version".to_string())
                })?;
                dag.set_revision(ver, value.to_string());
            }
            "langs" => {
                let ver = cur_ver.ok_or_else(|| {
                    invalid(lineno, "langs requires a current version".to_string())
                })?;
                let mut langs = Vec::new();
                for item in value.split(',') {
                    let lang = item
                        .trim()
                        .parse::<Language>()
                        .map_err(|e| invalid(lineno, e.to_string()))?;
                    langs.push(lang);
                }
                dag.set_langs(ver, langs);
            }
            "dependency" => {
                let ver = cur_ver.ok_or_else(|| {
                    invalid(lineno, "dependency requires a current version".to_string())
                })?;
                let mut parts = value.splitn(2, char::is_whitespace);
                let name = parts.next().unwrap_or_default();
                let spec = parts.next().unwrap_or_default();
                if name.is_empty() || spec.is_empty() {
                    return Err(invalid(
                        lineno,
                        "expected `dependency: <name> <spec>`".to_string(),
                    ));
                }
                let spec = spec
                    .parse::<VersionSpec>()
                    .map_err(|e| invalid(lineno, e.to_string()))?;
                pending_deps.push((ver, name.to_string(), spec, lineno));
            }
            other => {
                return Err(invalid(lineno, format!("unknown directive `{other}`")));
            }
        }
    }

    for (ver, name, spec, lineno) in pending_deps {
        let down = dag
            .pack_by_name(&name)
            .ok_or_else(|| invalid(lineno, format!("dependency on unknown package `{name}`")))?;
        dag.add_edge(ver, down, spec);
    }

    Ok(dag)
}

/// Parse a lock-file from disk
///
/// # Errors
///
/// See [`parse_lockfile`]; additionally fails when the file cannot be
/// read.
pub fn read_lockfile(path: &Path) -> Result<DepDag, Error> {
    let content =
        std::fs::read_to_string(path).map_err(|e| Error::io_with_path(&e, path))?;
    parse_lockfile(&content, &path.display().to_string())
}
