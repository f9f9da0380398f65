//! Integration tests for the cache-repo lookup chain

use dop_cache::CacheDir;
use dop_errors::{CacheError, Error, RegistryError};
use dop_recipe::Recipe;
use dop_registry::RecipePayload;
use dop_repo::{CacheRepo, PackRepo, RegistrySource};
use dop_types::Version;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
}

/// Loader for the `<name> <version>` one-line recipe format the tests
/// write into the cache
fn counting_loader(counter: Arc<AtomicUsize>) -> impl Fn(&Path) -> Result<Recipe, Error> {
    move |path: &Path| {
        counter.fetch_add(1, Ordering::SeqCst);
        let content = std::fs::read_to_string(path)?;
        let mut words = content.split_whitespace();
        let name = words.next().unwrap_or_default().to_string();
        let version = v(words.next().unwrap_or("0.0.0"));
        Recipe::build_with(name, version)
            .file(path)
            .finish()
    }
}

/// Scripted registry answering from in-memory tables
#[derive(Default)]
struct ScriptedRegistry {
    versions: HashMap<String, Vec<Version>>,
    recipes: HashMap<(String, String), RecipePayload>,
    calls: AtomicUsize,
}

impl ScriptedRegistry {
    fn add_package(&mut self, name: &str, versions: &[&str]) {
        self.versions
            .insert(name.to_string(), versions.iter().map(|s| v(s)).collect());
        for ver in versions {
            self.recipes.insert(
                (name.to_string(), (*ver).to_string()),
                RecipePayload {
                    name: name.to_string(),
                    version: (*ver).to_string(),
                    revision: format!("rev-{name}-{ver}"),
                    recipe: format!("{name} {ver}"),
                },
            );
        }
    }
}

impl RegistrySource for &ScriptedRegistry {
    async fn package_versions(&self, name: &str) -> Result<Vec<Version>, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.versions
            .get(name)
            .cloned()
            .ok_or_else(|| {
                RegistryError::NoSuchPackage {
                    name: name.to_string(),
                }
                .into()
            })
    }

    async fn recipe_payload(
        &self,
        name: &str,
        version: &Version,
        _revision: Option<&str>,
    ) -> Result<RecipePayload, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.recipes
            .get(&(name.to_string(), version.to_string()))
            .cloned()
            .ok_or_else(|| {
                RegistryError::NoSuchVersion {
                    name: name.to_string(),
                    version: version.to_string(),
                }
                .into()
            })
    }
}

fn seed_cache(cache: &CacheDir, name: &str, version: &str, revision: &str) {
    let dir = cache.revision_dir(name, &v(version), revision);
    std::fs::create_dir_all(dir.path()).unwrap();
    std::fs::write(dir.recipe_file(), format!("{name} {version}")).unwrap();
}

#[tokio::test]
async fn disk_hit_is_memoized() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = CacheDir::new(tmp.path());
    seed_cache(&cache, "zlib", "1.2.13", "aa");

    let loads = Arc::new(AtomicUsize::new(0));
    let repo = CacheRepo::offline(cache, counting_loader(Arc::clone(&loads)));

    let recipe = repo.pack_recipe("zlib", &v("1.2.13"), Some("aa")).await.unwrap();
    assert_eq!(recipe.name(), "zlib");
    let again = repo.pack_recipe("zlib", &v("1.2.13"), Some("aa")).await.unwrap();
    assert_eq!(again.name(), "zlib");
    assert_eq!(loads.load(Ordering::SeqCst), 1, "facade must be memoized");
}

#[tokio::test]
async fn offline_miss_is_not_cached_error() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = CacheRepo::offline(
        CacheDir::new(tmp.path()),
        counting_loader(Arc::new(AtomicUsize::new(0))),
    );
    let err = repo.pack_recipe("ghost", &v("1.0.0"), None).await.unwrap_err();
    assert!(matches!(err, Error::Cache(CacheError::NotCached { .. })));
}

#[tokio::test]
async fn revisionless_lookup_picks_most_recently_used_revision() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = CacheDir::new(tmp.path());
    seed_cache(&cache, "zlib", "1.2.13", "aa");
    seed_cache(&cache, "zlib", "1.2.13", "bb");

    // `bb` carries the most recent flag file
    for (rev, secs) in [("aa", 1_000_000), ("bb", 2_000_000)] {
        let flag = cache
            .revision_dir("zlib", &v("1.2.13"), rev)
            .path()
            .join("0000000000-default/build.flag");
        std::fs::create_dir_all(flag.parent().unwrap()).unwrap();
        std::fs::write(&flag, "").unwrap();
        filetime::set_file_mtime(&flag, filetime::FileTime::from_unix_time(secs, 0)).unwrap();
    }

    let repo = CacheRepo::offline(cache, counting_loader(Arc::new(AtomicUsize::new(0))));
    let recipe = repo.pack_recipe("zlib", &v("1.2.13"), None).await.unwrap();
    assert!(recipe
        .file()
        .unwrap()
        .to_string_lossy()
        .contains("/bb/"));
}

#[tokio::test]
async fn network_fetch_writes_through_to_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = CacheDir::new(tmp.path());
    let mut registry = ScriptedRegistry::default();
    registry.add_package("curl", &["8.5.0"]);

    let loads = Arc::new(AtomicUsize::new(0));
    let repo = CacheRepo::new(
        CacheDir::new(tmp.path()),
        &registry,
        counting_loader(Arc::clone(&loads)),
    );

    let recipe = repo.pack_recipe("curl", &v("8.5.0"), None).await.unwrap();
    assert_eq!(recipe.name(), "curl");
    assert!(cache
        .revision_dir("curl", &v("8.5.0"), "rev-curl-8.5.0")
        .exists());

    // now cached: a fresh repo over the same cache dir resolves offline
    let offline = CacheRepo::offline(cache, counting_loader(Arc::new(AtomicUsize::new(0))));
    assert!(offline.is_cached("curl", &v("8.5.0"), None).await);
    assert!(
        offline
            .is_cached("curl", &v("8.5.0"), Some("rev-curl-8.5.0"))
            .await
    );
    assert!(!offline.is_cached("curl", &v("8.5.0"), Some("other")).await);
    offline.pack_recipe("curl", &v("8.5.0"), None).await.unwrap();
}

#[tokio::test]
async fn revision_mismatch_leaves_cache_unchanged() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = CacheDir::new(tmp.path());
    let mut registry = ScriptedRegistry::default();
    registry.add_package("curl", &["8.5.0"]);

    let repo = CacheRepo::new(
        CacheDir::new(tmp.path()),
        &registry,
        counting_loader(Arc::new(AtomicUsize::new(0))),
    );

    // the registry will answer rev-curl-8.5.0, not the requested revision
    let err = repo
        .pack_recipe("curl", &v("8.5.0"), Some("0123456789"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Registry(RegistryError::RevisionMismatch { .. })
    ));
    assert!(cache.packages().unwrap().is_empty(), "no artifact may be left behind");
}

#[tokio::test]
async fn available_versions_merge_disk_and_registry() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = CacheDir::new(tmp.path());
    seed_cache(&cache, "zlib", "1.1.0", "aa");
    let mut registry = ScriptedRegistry::default();
    registry.add_package("zlib", &["1.2.13", "1.3.0"]);

    let repo = CacheRepo::new(cache, &registry, counting_loader(Arc::new(AtomicUsize::new(0))));
    let versions = repo.available_versions("zlib").await.unwrap();
    assert_eq!(versions, vec![v("1.1.0"), v("1.2.13"), v("1.3.0")]);

    // memoized: the registry is not asked twice
    let before = registry.calls.load(Ordering::SeqCst);
    repo.available_versions("zlib").await.unwrap();
    assert_eq!(registry.calls.load(Ordering::SeqCst), before);
}

#[tokio::test]
async fn unknown_package_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = ScriptedRegistry::default();
    let repo = CacheRepo::new(
        CacheDir::new(tmp.path()),
        &registry,
        counting_loader(Arc::new(AtomicUsize::new(0))),
    );
    let err = repo.available_versions("ghost").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Registry(RegistryError::NoSuchPackage { .. })
    ));
}
