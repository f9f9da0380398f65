//! Resolution scenarios over an in-memory package repository

use dop_errors::{Error, LockfileError, RegistryError, ResolveError};
use dop_profile::{Compiler, Profile};
use dop_recipe::Recipe;
use dop_repo::PackRepo;
use dop_resolver::{parse_lockfile, serialize_lockfile, DepDag, Heuristics};
use dop_types::{Arch, BuildType, Dependency, HostInfo, Language, Os, Version};
use std::collections::HashMap;

fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
}

fn dep(s: &str) -> Dependency {
    Dependency::parse(s).unwrap()
}

fn profile() -> Profile {
    let host = HostInfo::new(Arch::X86_64, Os::Linux);
    Profile::new(
        "default",
        host,
        BuildType::Release,
        vec![
            Compiler::new(Language::C, "gcc", v("12.1.0"), "/usr/bin/gcc"),
            Compiler::new(Language::Cpp, "g++", v("12.1.0"), "/usr/bin/g++"),
            Compiler::new(Language::D, "dmd", v("2.105.2"), "/usr/bin/dmd"),
        ],
    )
    .unwrap()
}

struct MockEntry {
    version: Version,
    cached: bool,
    recipe: Recipe,
}

/// In-memory [`PackRepo`]: versions, cached bits and recipes per package
#[derive(Default)]
struct MockRepo {
    packages: HashMap<String, Vec<MockEntry>>,
}

impl MockRepo {
    fn add(&mut self, name: &str, version: &str, cached: bool, langs: &[Language], deps: &[&str]) {
        let recipe = Recipe::build_with(name, v(version))
            .languages(langs.to_vec())
            .dependencies(deps.iter().map(|d| dep(d)).collect())
            .content(format!("{name} {version}").into_bytes())
            .finish()
            .unwrap();
        self.packages.entry(name.to_string()).or_default().push(MockEntry {
            version: v(version),
            cached,
            recipe,
        });
    }
}

impl PackRepo for MockRepo {
    async fn pack_recipe(
        &self,
        name: &str,
        version: &Version,
        _revision: Option<&str>,
    ) -> Result<Recipe, Error> {
        self.packages
            .get(name)
            .and_then(|entries| entries.iter().find(|e| &e.version == version))
            .map(|e| e.recipe.clone())
            .ok_or_else(|| {
                RegistryError::NoSuchVersion {
                    name: name.to_string(),
                    version: version.to_string(),
                }
                .into()
            })
    }

    async fn available_versions(&self, name: &str) -> Result<Vec<Version>, Error> {
        let mut versions: Vec<Version> = self
            .packages
            .get(name)
            .map(|entries| entries.iter().map(|e| e.version.clone()).collect())
            .ok_or_else(|| Error::from(RegistryError::NoSuchPackage {
                name: name.to_string(),
            }))?;
        versions.sort_unstable();
        Ok(versions)
    }

    async fn is_cached(&self, name: &str, version: &Version, _revision: Option<&str>) -> bool {
        self.packages
            .get(name)
            .and_then(|entries| entries.iter().find(|e| &e.version == version))
            .is_some_and(|e| e.cached)
    }
}

/// The diamond of §8: b and c both depend on a, d selects c's version
fn diamond_repo() -> MockRepo {
    let mut repo = MockRepo::default();
    repo.add("a", "1.0.0", true, &[Language::C], &[]);
    repo.add("a", "1.1.0", true, &[Language::C], &[]);
    repo.add("a", "1.1.1", false, &[Language::C], &[]);
    repo.add("a", "2.0.0", false, &[Language::C], &[]);
    repo.add("b", "0.0.1", true, &[Language::D], &["a >=1 <2"]);
    repo.add("b", "0.0.2", false, &[Language::D], &["a >=1.1"]);
    repo.add("c", "1.0.0", true, &[Language::Cpp], &[]);
    repo.add("c", "2.0.0", false, &[Language::Cpp], &["a >=1.1"]);
    repo.add("d", "1.0.0", true, &[Language::D], &["c =1.0.0"]);
    repo.add("d", "1.1.0", false, &[Language::D], &["c =2.0.0"]);
    repo
}

fn root_recipe() -> Recipe {
    Recipe::build_with("e", v("1.0.0"))
        .languages(vec![Language::D])
        .dependencies(vec![dep("b >=0.0.1"), dep("d >=1.1.0")])
        .content(b"e 1.0.0".to_vec())
        .finish()
        .unwrap()
}

async fn resolved_diamond(heuristics: Heuristics) -> DepDag {
    let repo = diamond_repo();
    let recipe = root_recipe();
    let mut dag = DepDag::prepare(&recipe, &profile(), &repo, heuristics)
        .await
        .unwrap();
    dag.filter();
    dag.resolve(&repo).await.unwrap();
    dag
}

fn resolved_of(dag: &DepDag, name: &str) -> Version {
    let pack = dag.pack_by_name(name).unwrap();
    dag.resolved_version(pack).unwrap().clone()
}

#[tokio::test]
async fn diamond_prefer_cached() {
    let dag = resolved_diamond(Heuristics::PreferCached).await;
    assert!(dag.is_resolved());
    assert_eq!(resolved_of(&dag, "e"), v("1.0.0"));
    assert_eq!(resolved_of(&dag, "d"), v("1.1.0"));
    assert_eq!(resolved_of(&dag, "c"), v("2.0.0"));
    assert_eq!(resolved_of(&dag, "b"), v("0.0.1"));
    assert_eq!(resolved_of(&dag, "a"), v("1.1.0"));
}

#[tokio::test]
async fn diamond_pick_highest() {
    let dag = resolved_diamond(Heuristics::PickHighest).await;
    assert!(dag.is_resolved());
    assert_eq!(resolved_of(&dag, "e"), v("1.0.0"));
    assert_eq!(resolved_of(&dag, "d"), v("1.1.0"));
    assert_eq!(resolved_of(&dag, "c"), v("2.0.0"));
    assert_eq!(resolved_of(&dag, "b"), v("0.0.2"));
    assert_eq!(resolved_of(&dag, "a"), v("2.0.0"));
}

#[tokio::test]
async fn resolved_path_edges_hold() {
    let dag = resolved_diamond(Heuristics::PickHighest).await;
    for pack in dag.traverse_top_down_resolved() {
        let ver = dag.resolved(pack).unwrap();
        for (down, spec) in dag.down_deps(ver) {
            let down_version = dag.resolved_version(down).unwrap();
            assert!(
                spec.matches(down_version),
                "{}: {spec} does not accept {down_version}",
                dag.pack_name(down)
            );
        }
    }
}

#[tokio::test]
async fn language_collection() {
    let mut dag = resolved_diamond(Heuristics::PickHighest).await;
    dag.collect_languages().unwrap();

    let langs_of = |name: &str| -> Vec<Language> {
        let pack = dag.pack_by_name(name).unwrap();
        dag.languages(dag.resolved(pack).unwrap()).to_vec()
    };
    use Language::{Cpp, C, D};
    assert_eq!(langs_of("a"), vec![C]);
    assert_eq!(langs_of("b"), vec![C, D]);
    assert_eq!(langs_of("c"), vec![C, Cpp]);
    assert_eq!(langs_of("d"), vec![C, Cpp, D]);
    assert_eq!(langs_of("e"), vec![C, Cpp, D]);
}

#[tokio::test]
async fn traversals_visit_each_package_once_in_order() {
    let dag = resolved_diamond(Heuristics::PickHighest).await;

    let top_down = dag.traverse_top_down_resolved();
    let names: Vec<&str> = top_down.iter().map(|p| dag.pack_name(*p)).collect();
    assert_eq!(names.len(), 5);
    assert_eq!(names[0], "e");

    let bottom_up = dag.traverse_bottom_up_resolved();
    let position = |name: &str| {
        bottom_up
            .iter()
            .position(|p| dag.pack_name(*p) == name)
            .unwrap()
    };
    // every upstream comes after all of its downstreams
    assert!(position("a") < position("b"));
    assert!(position("a") < position("c"));
    assert!(position("c") < position("d"));
    assert!(position("b") < position("e"));
    assert!(position("d") < position("e"));
    assert_eq!(position("e"), 4);
}

#[tokio::test]
async fn lockfile_round_trip_is_byte_identical() {
    let mut dag = resolved_diamond(Heuristics::PickHighest).await;
    dag.collect_languages().unwrap();

    let first = serialize_lockfile(&dag, true);
    let reparsed = parse_lockfile(&first, "dop.lock").unwrap();
    let second = serialize_lockfile(&reparsed, true);
    assert_eq!(first, second);
    assert_eq!(dag.to_dot(), reparsed.to_dot());
}

#[tokio::test]
async fn lockfile_can_omit_unconsidered_versions() {
    let dag = resolved_diamond(Heuristics::PickHighest).await;
    let full = serialize_lockfile(&dag, true);
    let narrow = serialize_lockfile(&dag, false);
    // b 0.0.1 was known but never considered
    assert!(full.contains("  version: 0.0.1\n"));
    assert!(!narrow.contains("  version: 0.0.1\n"));

    let reparsed = parse_lockfile(&narrow, "dop.lock").unwrap();
    let b = reparsed.pack_by_name("b").unwrap();
    assert_eq!(reparsed.all_versions(b), &[v("0.0.2")]);
    assert_eq!(serialize_lockfile(&reparsed, true), narrow);
}

#[tokio::test]
async fn conflicting_specs_leave_no_considered_version() {
    let mut repo = MockRepo::default();
    repo.add("x", "1.0.0", false, &[Language::C], &[]);
    repo.add("x", "2.0.0", false, &[Language::C], &[]);
    repo.add("y", "1.0.0", false, &[Language::C], &["x =2.0.0"]);
    let root = Recipe::build_with("r", v("1.0.0"))
        .languages(vec![Language::C])
        .dependencies(vec![dep("x =1.0.0"), dep("y =1.0.0")])
        .content(b"r 1.0.0".to_vec())
        .finish()
        .unwrap();

    let mut dag = DepDag::prepare(&root, &profile(), &repo, Heuristics::PickHighest)
        .await
        .unwrap();
    dag.filter();
    let x = dag.pack_by_name("x").unwrap();
    assert!(dag.considered(x).is_empty());

    let err = dag.resolve(&repo).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Resolve(ResolveError::NoConsideredVersion { .. })
    ));
}

#[tokio::test]
async fn unsatisfiable_spec_aborts_prepare() {
    let repo = diamond_repo();
    let root = Recipe::build_with("r", v("1.0.0"))
        .dependencies(vec![dep("a >=9.0.0")])
        .content(b"r 1.0.0".to_vec())
        .finish()
        .unwrap();
    let err = DepDag::prepare(&root, &profile(), &repo, Heuristics::PickHighest)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Resolve(ResolveError::NoCompatibleVersion { .. })
    ));
}

#[tokio::test]
async fn unknown_package_aborts_prepare() {
    let repo = diamond_repo();
    let root = Recipe::build_with("r", v("1.0.0"))
        .dependencies(vec![dep("nosuch >=1.0.0")])
        .content(b"r 1.0.0".to_vec())
        .finish()
        .unwrap();
    let err = DepDag::prepare(&root, &profile(), &repo, Heuristics::PickHighest)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Registry(RegistryError::NoSuchPackage { .. })
    ));
}

const FILTER_FIXTURE: &str = "\
# dop lock-file v1
heuristics: pickHighest

package: root
  version: 1.0.0 [resolved]
    dependency: u >=1.0.0
    dependency: w >=1.0.0

package: u
  version: 1.0.0 [considered]
    dependency: x =1.0.0
  version: 2.0.0 [considered]
    dependency: x =2.0.0

package: w
  version: 1.0.0 [considered]
    dependency: x >=2.0.0

package: x
  version: 1.0.0 [considered]
  version: 2.0.0 [considered]
";

#[tokio::test]
async fn filter_drops_versions_no_upstream_group_accepts() {
    let mut dag = parse_lockfile(FILTER_FIXTURE, "fixture").unwrap();
    let x = dag.pack_by_name("x").unwrap();
    assert_eq!(dag.considered(x).len(), 2);

    dag.filter();
    // x 1.0.0 fails the w group, x 2.0.0 satisfies one edge per group
    let considered: Vec<&Version> = dag.considered(x).iter().map(|v| dag.version(*v)).collect();
    assert_eq!(considered, vec![&v("2.0.0")]);

    let repo = MockRepo::default();
    dag.resolve(&repo).await.unwrap();
    assert_eq!(resolved_of(&dag, "x"), v("2.0.0"));
    assert_eq!(resolved_of(&dag, "u"), v("2.0.0"));
}

#[tokio::test]
async fn pinning_outside_a_resolved_edge_is_an_invariant_violation() {
    const FIXTURE: &str = "\
# dop lock-file v1
heuristics: preferCached

package: root
  version: 1.0.0 [resolved]
    dependency: u >=1.0.0

package: u
  version: 1.0.0 [considered]
    dependency: x =1.0.0
  version: 2.0.0 [considered]
    dependency: x =2.0.0

package: x
  version: 1.0.0 [considered]
  version: 2.0.0 [considered]
";
    let mut dag = parse_lockfile(FIXTURE, "fixture").unwrap();
    dag.filter();

    // x 1.0.0 is cached, so preferCached pins it, violating the =2.0.0
    // edge of the pinned u 2.0.0
    let mut repo = MockRepo::default();
    repo.add("x", "1.0.0", true, &[], &[]);
    repo.add("x", "2.0.0", false, &[], &[]);
    let err = dag.resolve(&repo).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Resolve(ResolveError::SpecViolation { .. })
    ));
}

#[test]
fn lockfile_v2_is_rejected() {
    let err = parse_lockfile("# dop lock-file v2\n", "dop.lock").unwrap_err();
    assert!(matches!(
        err,
        Error::Lockfile(LockfileError::UnsupportedVersion { version: 2, .. })
    ));
}

#[test]
fn lockfile_errors_carry_line_numbers() {
    let text = "\
# dop lock-file v1
heuristics: pickHighest

package: a
  version: not-a-version [resolved]
";
    match parse_lockfile(text, "dop.lock").unwrap_err() {
        Error::Lockfile(LockfileError::Invalid { file, line, .. }) => {
            assert_eq!(file, "dop.lock");
            assert_eq!(line, 5);
        }
        other => panic!("unexpected error: {other}"),
    }

    let text = "\
# dop lock-file v1

package: a
  revision: abcd
";
    match parse_lockfile(text, "dop.lock").unwrap_err() {
        Error::Lockfile(LockfileError::Invalid { line, .. }) => assert_eq!(line, 4),
        other => panic!("unexpected error: {other}"),
    }

    let text = "\
# dop lock-file v1

package: a
  version: 1.0.0 [resolved]
    dependency: ghost >=1.0.0
";
    match parse_lockfile(text, "dop.lock").unwrap_err() {
        Error::Lockfile(LockfileError::Invalid { line, reason, .. }) => {
            assert_eq!(line, 5);
            assert!(reason.contains("ghost"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn lockfile_rejects_garbage_directives() {
    let text = "# dop lock-file v1\nnot a directive\n";
    assert!(parse_lockfile(text, "dop.lock").is_err());

    let text = "# dop lock-file v1\npackage: a\npackage: a\n";
    assert!(parse_lockfile(text, "dop.lock").is_err());
}
