#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]
#![allow(async_fn_in_trait)]

//! Unified recipe lookup for dopamine
//!
//! [`PackRepo`] is the single surface the resolver and the orchestrator
//! read recipes and availability from. [`CacheRepo`] implements it with a
//! three-tier lookup — memory, disk, network — memoizing recipe facades
//! and version lists, writing freshly fetched recipes to the local cache
//! under the per-revision lock, and verifying registry answers against
//! the request before anything touches the disk.

use dashmap::DashMap;
use dop_cache::{CacheDir, RevisionDir};
use dop_errors::{CacheError, Error, RegistryError};
use dop_recipe::{Recipe, RecipeLoader};
use dop_registry::{RecipePayload, RegistryClient};
use dop_types::Version;
use tracing::debug;

/// Source of recipes and version availability
pub trait PackRepo {
    /// Recipe facade for a package revision. `None` means "whatever
    /// revision is current": the most recently used one on disk, or the
    /// registry's current revision when a network lookup is needed.
    ///
    /// # Errors
    ///
    /// Not-found and unreachable-registry errors abort the caller's whole
    /// resolution.
    async fn pack_recipe(
        &self,
        name: &str,
        version: &Version,
        revision: Option<&str>,
    ) -> Result<Recipe, Error>;

    /// Versions a package is available in, sorted ascending
    ///
    /// # Errors
    ///
    /// An empty answer is a fatal `NoSuchPackage` error, never an empty
    /// list.
    async fn available_versions(&self, name: &str) -> Result<Vec<Version>, Error>;

    /// Whether a version (or one specific revision of it) is present in
    /// the local cache. Monotone: once `true`, it stays `true` until an
    /// external clean runs.
    async fn is_cached(&self, name: &str, version: &Version, revision: Option<&str>) -> bool;
}

/// Network side of [`CacheRepo`], kept as a seam so the cache logic can
/// be exercised against a scripted registry
pub trait RegistrySource {
    /// Versions the registry advertises for a package
    ///
    /// # Errors
    ///
    /// Same contract as [`RegistryClient::package`].
    async fn package_versions(&self, name: &str) -> Result<Vec<Version>, Error>;

    /// A recipe payload, `None` revision meaning the current one
    ///
    /// # Errors
    ///
    /// Same contract as [`RegistryClient::recipe`].
    async fn recipe_payload(
        &self,
        name: &str,
        version: &Version,
        revision: Option<&str>,
    ) -> Result<RecipePayload, Error>;
}

impl RegistrySource for RegistryClient {
    async fn package_versions(&self, name: &str) -> Result<Vec<Version>, Error> {
        self.package(name).await?.parsed_versions()
    }

    async fn recipe_payload(
        &self,
        name: &str,
        version: &Version,
        revision: Option<&str>,
    ) -> Result<RecipePayload, Error> {
        self.recipe(name, version, revision).await
    }
}

type RecipeKey = (String, String, String);

/// [`PackRepo`] over the local cache and an optional registry
pub struct CacheRepo<L, S = RegistryClient> {
    cache: CacheDir,
    registry: Option<S>,
    loader: L,
    recipes: DashMap<RecipeKey, Recipe>,
    versions: DashMap<String, Vec<Version>>,
}

impl<L, S> CacheRepo<L, S>
where
    L: RecipeLoader,
    S: RegistrySource,
{
    /// Repo backed by cache and registry
    #[must_use]
    pub fn new(cache: CacheDir, registry: S, loader: L) -> Self {
        Self {
            cache,
            registry: Some(registry),
            loader,
            recipes: DashMap::new(),
            versions: DashMap::new(),
        }
    }

    #[must_use]
    pub fn cache(&self) -> &CacheDir {
        &self.cache
    }

    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.registry.is_none()
    }

    fn memo_key(name: &str, version: &Version, revision: Option<&str>) -> RecipeKey {
        (
            name.to_string(),
            version.to_string(),
            revision.unwrap_or_default().to_string(),
        )
    }

    fn remember(&self, name: &str, version: &Version, revision: Option<&str>, recipe: &Recipe) {
        self.recipes
            .insert(Self::memo_key(name, version, revision), recipe.clone());
    }

    /// The on-disk revision of a version most recently worked on, judged
    /// by flag-file modification times
    fn latest_disk_revision(&self, name: &str, version: &Version) -> Option<RevisionDir> {
        let version_dir = self.cache.package_dir(name).version_dir(version);
        let revisions = version_dir.revisions().ok()?;
        revisions
            .into_iter()
            .max_by_key(dop_cache::RevisionDir::latest_flag_mtime)
    }

    fn load_revision(
        &self,
        name: &str,
        version: &Version,
        revision: Option<&str>,
        dir: &RevisionDir,
    ) -> Result<Recipe, Error> {
        let recipe = self.loader.load(&dir.recipe_file())?;
        self.remember(name, version, Some(dir.revision()), &recipe);
        if revision.is_none() {
            self.remember(name, version, None, &recipe);
        }
        Ok(recipe)
    }

    /// Fetch from the registry, verify, and write to disk under the
    /// revision lock. Nothing is written unless the payload agrees with
    /// the request.
    async fn fetch_and_store(
        &self,
        name: &str,
        version: &Version,
        revision: Option<&str>,
        registry: &S,
    ) -> Result<Recipe, Error> {
        let payload = registry.recipe_payload(name, version, revision).await?;

        if payload.name != name || payload.version != version.to_string() {
            return Err(RegistryError::PackageMismatch {
                expected: format!("{name}/{version}"),
                received: format!("{}/{}", payload.name, payload.version),
            }
            .into());
        }
        if let Some(requested) = revision {
            if payload.revision != requested {
                return Err(RegistryError::RevisionMismatch {
                    name: name.to_string(),
                    version: version.to_string(),
                    requested: requested.to_string(),
                    received: payload.revision,
                }
                .into());
            }
        }

        let dir = self.cache.revision_dir(name, version, &payload.revision);
        let _lock = dir.lock()?;
        if !dir.exists() {
            debug!(name, %version, revision = %payload.revision, "writing recipe to cache");
            std::fs::create_dir_all(dir.path()).map_err(|e| Error::io_with_path(&e, dir.path()))?;
            // write-then-rename: readers bypassing the lock never observe
            // a half-written recipe file
            let tmp = dir.path().join(".recipe.tmp");
            std::fs::write(&tmp, payload.recipe.as_bytes())
                .map_err(|e| Error::io_with_path(&e, &tmp))?;
            std::fs::rename(&tmp, dir.recipe_file())
                .map_err(|e| Error::io_with_path(&e, dir.recipe_file()))?;
        }
        self.load_revision(name, version, revision, &dir)
    }

    fn disk_versions(&self, name: &str) -> Result<Vec<Version>, Error> {
        let package_dir = self.cache.package_dir(name);
        let mut versions = Vec::new();
        for version in package_dir.versions()? {
            if package_dir.version_dir(&version).has_any_revision() {
                versions.push(version);
            }
        }
        Ok(versions)
    }
}

impl<L: RecipeLoader> CacheRepo<L, RegistryClient> {
    /// Repo serving from the local cache only; every network lookup is
    /// skipped
    #[must_use]
    pub fn offline(cache: CacheDir, loader: L) -> Self {
        Self {
            cache,
            registry: None,
            loader,
            recipes: DashMap::new(),
            versions: DashMap::new(),
        }
    }
}

impl<L, S> PackRepo for CacheRepo<L, S>
where
    L: RecipeLoader,
    S: RegistrySource,
{
    async fn pack_recipe(
        &self,
        name: &str,
        version: &Version,
        revision: Option<&str>,
    ) -> Result<Recipe, Error> {
        if let Some(hit) = self.recipes.get(&Self::memo_key(name, version, revision)) {
            return Ok(hit.clone());
        }

        if let Some(rev) = revision {
            let dir = self.cache.revision_dir(name, version, rev);
            if dir.exists() {
                return self.load_revision(name, version, revision, &dir);
            }
        } else if let Some(dir) = self.latest_disk_revision(name, version) {
            return self.load_revision(name, version, revision, &dir);
        }

        match &self.registry {
            Some(registry) => self.fetch_and_store(name, version, revision, registry).await,
            None => Err(CacheError::NotCached {
                name: name.to_string(),
                version: version.to_string(),
                revision: revision.map(ToString::to_string),
            }
            .into()),
        }
    }

    async fn available_versions(&self, name: &str) -> Result<Vec<Version>, Error> {
        if let Some(hit) = self.versions.get(name) {
            return Ok(hit.clone());
        }

        let mut versions = self.disk_versions(name)?;
        if let Some(registry) = &self.registry {
            match registry.package_versions(name).await {
                Ok(remote) => versions.extend(remote),
                // a package only present locally is still resolvable
                Err(Error::Registry(RegistryError::NoSuchPackage { .. }))
                    if !versions.is_empty() => {}
                Err(e) => return Err(e),
            }
        }
        versions.sort_unstable();
        versions.dedup();

        if versions.is_empty() {
            return Err(RegistryError::NoSuchPackage {
                name: name.to_string(),
            }
            .into());
        }
        self.versions.insert(name.to_string(), versions.clone());
        Ok(versions)
    }

    async fn is_cached(&self, name: &str, version: &Version, revision: Option<&str>) -> bool {
        match revision {
            Some(rev) => self.cache.revision_dir(name, version, rev).exists(),
            None => self
                .cache
                .package_dir(name)
                .version_dir(version)
                .has_any_revision(),
        }
    }
}
