#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Recipe facade for dopamine
//!
//! A [`Recipe`] is a thin, cheaply clonable handle over an interpreted
//! recipe. The interpreter itself is an external collaborator; its hook
//! surface is modeled as tagged variants so that static recipes (plain
//! values) and dynamic ones (callables into the interpreter) share one
//! type. The payload lives until the last handle drops, at which point
//! the interpreter state is released.
//!
//! The facade also owns the recipe fingerprint: the *revision* of a
//! recipe is the lowercase hex SHA-1 of its bytes, unless the recipe
//! provides its own `revision` hook.

use dop_errors::{Error, RecipeError};
use dop_profile::Profile;
use dop_types::{DepInfo, Dependency, Language, Version};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

/// `source` hook: fetch the source tree, return its directory
pub type SourceFn = Arc<dyn Fn() -> Result<String, Error> + Send + Sync>;
/// `dependencies` hook: dependencies for a profile
pub type DependsFn = Arc<dyn Fn(&Profile) -> Result<Vec<Dependency>, Error> + Send + Sync>;
/// `revision` hook: authoritative revision string
pub type RevisionFn = Arc<dyn Fn() -> Result<String, Error> + Send + Sync>;
/// `build` hook: returns true when the build step already installed
pub type BuildFn = Arc<
    dyn Fn(&BuildDirs, &Profile, &HashMap<String, DepInfo>) -> Result<bool, Error> + Send + Sync,
>;
/// `pack` hook: stage the built files into the destination directory
pub type PackFn = Arc<dyn Fn(&BuildDirs, &Profile, &Path) -> Result<(), Error> + Send + Sync>;
/// `patch_install` hook: fix up an install tree in place
pub type PatchInstallFn = Arc<dyn Fn(&Profile, &Path) -> Result<(), Error> + Send + Sync>;

/// Directories a build hook operates on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildDirs {
    /// Directory holding the recipe
    pub root: PathBuf,
    /// Source tree
    pub src: PathBuf,
    /// Out-of-source build directory
    pub build: PathBuf,
    /// Install prefix
    pub install: PathBuf,
}

/// Where a recipe's source comes from
#[derive(Clone)]
pub enum SourceSpec {
    /// Source ships with the recipe; the payload is a directory path
    /// relative to the recipe directory (defaults to `.`)
    InTree(String),
    /// Source must be fetched by invoking the hook
    Fetch(SourceFn),
}

impl fmt::Debug for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InTree(dir) => f.debug_tuple("InTree").field(dir).finish(),
            Self::Fetch(_) => f.write_str("Fetch(..)"),
        }
    }
}

/// How a recipe declares its dependencies
#[derive(Clone)]
pub enum DependSpec {
    /// Declared as a plain table
    Static(Vec<Dependency>),
    /// Declared as a callable, re-invoked with the profile on each call
    Dynamic(DependsFn),
}

impl fmt::Debug for DependSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(deps) => f.debug_tuple("Static").field(deps).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// How the recipe revision is obtained
#[derive(Clone)]
pub enum RevisionSpec {
    /// Fingerprint the recipe bytes with SHA-1
    Auto,
    /// The recipe computes its own revision
    Hook(RevisionFn),
}

struct Inner {
    name: String,
    version: Version,
    license: Option<String>,
    copyright: Option<String>,
    langs: Vec<Language>,
    source: SourceSpec,
    depends: DependSpec,
    revision_spec: RevisionSpec,
    revision: OnceLock<String>,
    build_fn: Option<BuildFn>,
    pack_fn: Option<PackFn>,
    patch_install_fn: Option<PatchInstallFn>,
    /// Recipe file on disk; hashed for the revision when present
    file: Option<PathBuf>,
    /// Recipe bytes; hashed when no file is known
    content: Vec<u8>,
    /// Interpreter release callback, run when the last handle drops
    on_release: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.on_release.lock() {
            if let Some(release) = guard.take() {
                release();
            }
        }
    }
}

/// Shared handle to an interpreted recipe
#[derive(Clone)]
pub struct Recipe {
    inner: Arc<Inner>,
}

impl fmt::Debug for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recipe")
            .field("name", &self.inner.name)
            .field("version", &self.inner.version)
            .finish_non_exhaustive()
    }
}

impl Recipe {
    #[must_use]
    pub fn build_with(name: impl Into<String>, version: Version) -> RecipeBuilder {
        RecipeBuilder::new(name, version)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn version(&self) -> &Version {
        &self.inner.version
    }

    #[must_use]
    pub fn license(&self) -> Option<&str> {
        self.inner.license.as_deref()
    }

    #[must_use]
    pub fn copyright(&self) -> Option<&str> {
        self.inner.copyright.as_deref()
    }

    /// Languages the recipe declares it is written in
    #[must_use]
    pub fn languages(&self) -> &[Language] {
        &self.inner.langs
    }

    /// Path of the recipe file, when loaded from disk
    #[must_use]
    pub fn file(&self) -> Option<&Path> {
        self.inner.file.as_deref()
    }

    /// Relative in-tree source directory, `None` for out-of-tree recipes
    #[must_use]
    pub fn in_tree(&self) -> Option<&str> {
        match &self.inner.source {
            SourceSpec::InTree(dir) => Some(dir),
            SourceSpec::Fetch(_) => None,
        }
    }

    /// Whether the recipe has a `pack` hook
    #[must_use]
    pub fn has_pack(&self) -> bool {
        self.inner.pack_fn.is_some()
    }

    /// The recipe revision
    ///
    /// The `revision` hook is authoritative when present; otherwise the
    /// SHA-1 of the recipe file bytes (or of the in-memory bytes when no
    /// file is known). Computed lazily, cached for the facade lifetime.
    ///
    /// # Errors
    ///
    /// Returns an error when the hook fails or the recipe file cannot be
    /// read.
    pub fn revision(&self) -> Result<String, Error> {
        if let Some(cached) = self.inner.revision.get() {
            return Ok(cached.clone());
        }
        let computed = match &self.inner.revision_spec {
            RevisionSpec::Hook(hook) => hook().map_err(|e| RecipeError::HookFailed {
                hook: "revision".to_string(),
                message: e.to_string(),
            })?,
            RevisionSpec::Auto => match &self.inner.file {
                Some(file) => {
                    let bytes =
                        std::fs::read(file).map_err(|e| Error::io_with_path(&e, file))?;
                    sha1_hex(&bytes)
                }
                None => sha1_hex(&self.inner.content),
            },
        };
        let _ = self.inner.revision.set(computed.clone());
        Ok(computed)
    }

    /// Obtain the source tree, fetching it for out-of-tree recipes
    ///
    /// In-tree recipes return their relative directory without invoking
    /// anything.
    ///
    /// # Errors
    ///
    /// Returns `RecipeError::HookFailed` when the fetch hook fails.
    pub fn source(&self) -> Result<String, Error> {
        match &self.inner.source {
            SourceSpec::InTree(dir) => Ok(dir.clone()),
            SourceSpec::Fetch(hook) => hook().map_err(|e| {
                RecipeError::HookFailed {
                    hook: "source".to_string(),
                    message: e.to_string(),
                }
                .into()
            }),
        }
    }

    /// Dependencies for a profile
    ///
    /// Static declarations are returned as-is; dynamic ones re-invoke the
    /// hook on every call — results are never cached across calls.
    ///
    /// # Errors
    ///
    /// Returns `RecipeError::HookFailed` when the hook fails.
    pub fn dependencies(&self, profile: &Profile) -> Result<Vec<Dependency>, Error> {
        match &self.inner.depends {
            DependSpec::Static(deps) => Ok(deps.clone()),
            DependSpec::Dynamic(hook) => hook(profile).map_err(|e| {
                RecipeError::HookFailed {
                    hook: "dependencies".to_string(),
                    message: e.to_string(),
                }
                .into()
            }),
        }
    }

    /// Run the `build` hook
    ///
    /// Returns `true` when the build step already performed the install.
    ///
    /// # Errors
    ///
    /// Returns `RecipeError::MissingHook` for recipes without a build
    /// function and `RecipeError::HookFailed` when the hook fails.
    pub fn build(
        &self,
        dirs: &BuildDirs,
        profile: &Profile,
        dep_infos: &HashMap<String, DepInfo>,
    ) -> Result<bool, Error> {
        let hook = self
            .inner
            .build_fn
            .as_ref()
            .ok_or_else(|| RecipeError::MissingHook {
                name: self.inner.name.clone(),
                hook: "build".to_string(),
            })?;
        hook(dirs, profile, dep_infos).map_err(|e| {
            RecipeError::HookFailed {
                hook: "build".to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Run the `pack` hook, staging the build into `dest`
    ///
    /// # Errors
    ///
    /// Returns `RecipeError::MissingHook` when the recipe has no pack
    /// function and `RecipeError::HookFailed` when the hook fails.
    pub fn pack(&self, dirs: &BuildDirs, profile: &Profile, dest: &Path) -> Result<(), Error> {
        let hook = self
            .inner
            .pack_fn
            .as_ref()
            .ok_or_else(|| RecipeError::MissingHook {
                name: self.inner.name.clone(),
                hook: "pack".to_string(),
            })?;
        hook(dirs, profile, dest).map_err(|e| {
            RecipeError::HookFailed {
                hook: "pack".to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Run the `patch_install` hook; a no-op when the recipe has none
    ///
    /// # Errors
    ///
    /// Returns `RecipeError::HookFailed` when the hook fails.
    pub fn patch_install(&self, profile: &Profile, install_dir: &Path) -> Result<(), Error> {
        match &self.inner.patch_install_fn {
            None => Ok(()),
            Some(hook) => hook(profile, install_dir).map_err(|e| {
                RecipeError::HookFailed {
                    hook: "patch_install".to_string(),
                    message: e.to_string(),
                }
                .into()
            }),
        }
    }
}

/// The interpreter seam: turns a recipe file into a [`Recipe`] facade
pub trait RecipeLoader {
    /// Load and interpret a recipe file
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or interpreted.
    fn load(&self, path: &Path) -> Result<Recipe, Error>;
}

impl<F> RecipeLoader for F
where
    F: Fn(&Path) -> Result<Recipe, Error>,
{
    fn load(&self, path: &Path) -> Result<Recipe, Error> {
        self(path)
    }
}

/// Builder assembling a [`Recipe`] facade
pub struct RecipeBuilder {
    name: String,
    version: Version,
    license: Option<String>,
    copyright: Option<String>,
    langs: Vec<Language>,
    source: SourceSpec,
    depends: DependSpec,
    revision_spec: RevisionSpec,
    build_fn: Option<BuildFn>,
    pack_fn: Option<PackFn>,
    patch_install_fn: Option<PatchInstallFn>,
    file: Option<PathBuf>,
    content: Vec<u8>,
    on_release: Option<Box<dyn FnOnce() + Send>>,
}

impl RecipeBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            license: None,
            copyright: None,
            langs: Vec::new(),
            source: SourceSpec::InTree(".".to_string()),
            depends: DependSpec::Static(Vec::new()),
            revision_spec: RevisionSpec::Auto,
            build_fn: None,
            pack_fn: None,
            patch_install_fn: None,
            file: None,
            content: Vec::new(),
            on_release: None,
        }
    }

    #[must_use]
    pub fn license(mut self, license: impl Into<String>) -> Self {
        self.license = Some(license.into());
        self
    }

    #[must_use]
    pub fn copyright(mut self, copyright: impl Into<String>) -> Self {
        self.copyright = Some(copyright.into());
        self
    }

    #[must_use]
    pub fn languages(mut self, langs: impl Into<Vec<Language>>) -> Self {
        self.langs = langs.into();
        dop_types::language::sort_unique(&mut self.langs);
        self
    }

    /// In-tree source at a directory relative to the recipe dir
    #[must_use]
    pub fn source_in_tree(mut self, dir: impl Into<String>) -> Self {
        self.source = SourceSpec::InTree(dir.into());
        self
    }

    /// Out-of-tree source fetched by a hook
    #[must_use]
    pub fn source_fn(
        mut self,
        hook: impl Fn() -> Result<String, Error> + Send + Sync + 'static,
    ) -> Self {
        self.source = SourceSpec::Fetch(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn dependencies(mut self, deps: Vec<Dependency>) -> Self {
        self.depends = DependSpec::Static(deps);
        self
    }

    #[must_use]
    pub fn dependencies_fn(
        mut self,
        hook: impl Fn(&Profile) -> Result<Vec<Dependency>, Error> + Send + Sync + 'static,
    ) -> Self {
        self.depends = DependSpec::Dynamic(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn revision_fn(
        mut self,
        hook: impl Fn() -> Result<String, Error> + Send + Sync + 'static,
    ) -> Self {
        self.revision_spec = RevisionSpec::Hook(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn build_fn(
        mut self,
        hook: impl Fn(&BuildDirs, &Profile, &HashMap<String, DepInfo>) -> Result<bool, Error>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.build_fn = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn pack_fn(
        mut self,
        hook: impl Fn(&BuildDirs, &Profile, &Path) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Self {
        self.pack_fn = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn patch_install_fn(
        mut self,
        hook: impl Fn(&Profile, &Path) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Self {
        self.patch_install_fn = Some(Arc::new(hook));
        self
    }

    /// Recipe file backing this facade; its bytes feed the fingerprint
    #[must_use]
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// In-memory recipe bytes, fingerprinted when no file is known
    #[must_use]
    pub fn content(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.content = bytes.into();
        self
    }

    /// Callback releasing interpreter state when the last handle drops
    #[must_use]
    pub fn on_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
        self.on_release = Some(Box::new(release));
        self
    }

    /// Finish the facade
    ///
    /// # Errors
    ///
    /// Returns `RecipeError::SourceNotRelative` for an in-tree source
    /// declared with an absolute path.
    pub fn finish(self) -> Result<Recipe, Error> {
        if let SourceSpec::InTree(dir) = &self.source {
            if Path::new(dir).is_absolute() {
                return Err(RecipeError::SourceNotRelative {
                    name: self.name,
                    path: dir.clone(),
                }
                .into());
            }
        }
        Ok(Recipe {
            inner: Arc::new(Inner {
                name: self.name,
                version: self.version,
                license: self.license,
                copyright: self.copyright,
                langs: self.langs,
                source: self.source,
                depends: self.depends,
                revision_spec: self.revision_spec,
                revision: OnceLock::new(),
                build_fn: self.build_fn,
                pack_fn: self.pack_fn,
                patch_install_fn: self.patch_install_fn,
                file: self.file,
                content: self.content,
                on_release: Mutex::new(self.on_release),
            }),
        })
    }
}

fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dop_types::{Arch, BuildType, HostInfo, Os};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn profile() -> Profile {
        Profile::new(
            "test",
            HostInfo::new(Arch::X86_64, Os::Linux),
            BuildType::Debug,
            vec![],
        )
        .unwrap()
    }

    fn recipe(name: &str) -> RecipeBuilder {
        Recipe::build_with(name, Version::new(1, 0, 0))
    }

    #[test]
    fn revision_hashes_content() {
        // sha1("dopamine")
        let r = recipe("pkg").content(b"dopamine".to_vec()).finish().unwrap();
        assert_eq!(
            r.revision().unwrap(),
            "9f9e1c6e6423fdefe1fc972d3646090892ee5b5f"
        );
        // cached: second call returns the same value
        assert_eq!(
            r.revision().unwrap(),
            "9f9e1c6e6423fdefe1fc972d3646090892ee5b5f"
        );
    }

    #[test]
    fn revision_prefers_file_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dopamine.lua");
        std::fs::write(&path, b"dopamine").unwrap();
        let r = recipe("pkg")
            .file(&path)
            .content(b"something else".to_vec())
            .finish()
            .unwrap();
        assert_eq!(
            r.revision().unwrap(),
            "9f9e1c6e6423fdefe1fc972d3646090892ee5b5f"
        );
    }

    #[test]
    fn revision_hook_is_authoritative_and_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let r = recipe("pkg")
            .content(b"ignored".to_vec())
            .revision_fn(move || {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok("deadbeef".to_string())
            })
            .finish()
            .unwrap();
        assert_eq!(r.revision().unwrap(), "deadbeef");
        assert_eq!(r.revision().unwrap(), "deadbeef");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn source_defaults_to_recipe_dir() {
        let r = recipe("pkg").finish().unwrap();
        assert_eq!(r.in_tree(), Some("."));
        assert_eq!(r.source().unwrap(), ".");
    }

    #[test]
    fn out_of_tree_source_invokes_hook() {
        let r = recipe("pkg")
            .source_fn(|| Ok("/tmp/src/pkg-1.0.0".to_string()))
            .finish()
            .unwrap();
        assert_eq!(r.in_tree(), None);
        assert_eq!(r.source().unwrap(), "/tmp/src/pkg-1.0.0");
    }

    #[test]
    fn absolute_in_tree_source_is_rejected() {
        let result = recipe("pkg").source_in_tree("/abs/path").finish();
        assert!(result.is_err());
    }

    #[test]
    fn dynamic_dependencies_reinvoke_the_hook() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let r = recipe("pkg")
            .dependencies_fn(move |_profile| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(vec![Dependency::parse("zlib >=1.2.0").unwrap()])
            })
            .finish()
            .unwrap();
        let p = profile();
        assert_eq!(r.dependencies(&p).unwrap().len(), 1);
        assert_eq!(r.dependencies(&p).unwrap().len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn interpreter_released_on_last_drop() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&released);
        let r = recipe("pkg")
            .on_release(move || flag.store(true, Ordering::SeqCst))
            .finish()
            .unwrap();
        let clone = r.clone();
        drop(r);
        assert!(!released.load(Ordering::SeqCst));
        drop(clone);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn missing_build_hook_errors() {
        let r = recipe("pkg").finish().unwrap();
        let dirs = BuildDirs {
            root: PathBuf::from("/r"),
            src: PathBuf::from("/s"),
            build: PathBuf::from("/b"),
            install: PathBuf::from("/i"),
        };
        assert!(r.build(&dirs, &profile(), &HashMap::new()).is_err());
        // patch_install is optional and defaults to a no-op
        assert!(r.patch_install(&profile(), Path::new("/i")).is_ok());
    }
}
