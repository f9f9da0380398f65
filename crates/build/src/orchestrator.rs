//! Dependency-build orchestrator
//!
//! Walks a resolved dependency DAG bottom-up and brings every dependency
//! (root excluded) to its installed state, handing install directories
//! upward as `DepInfo`. The work on each node is done by the packaging
//! stage chain of [`crate::stages`] — source, configure, build, install —
//! driven to its reached state while the per-revision lock is held. By
//! the time a version is processed, every one of its resolved
//! downstreams has an install directory.

use crate::stage::BuildState;
use crate::stages::{package_stages, StageSetup};
use dop_cache::CacheDir;
use dop_errors::{Error, ResolveError};
use dop_profile::Profile;
use dop_repo::PackRepo;
use dop_resolver::{DepDag, PackId};
use dop_types::DepInfo;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Build every dependency of a resolved DAG, bottom-up
///
/// With `stage_dest` set, every dependency's install is staged into that
/// directory (a shared sysroot) instead of its per-profile install dir.
/// Returns the root's dependency info map, ready to be threaded into the
/// top-level build.
///
/// # Errors
///
/// - `ResolveError::UnresolvedPackage` when the DAG is not resolved.
/// - `ProfileError::MissingLanguage` when the profile cannot cover a
///   recipe's languages.
/// - Recipe hook failures and integrity failures abort the walk; already
///   built dependencies stay intact in the cache.
pub async fn build_dependencies<R: PackRepo>(
    dag: &DepDag,
    profile: &Profile,
    cache: &CacheDir,
    repo: &R,
    stage_dest: Option<&Path>,
) -> Result<HashMap<String, DepInfo>, Error> {
    if !dag.is_resolved() {
        return Err(ResolveError::UnresolvedPackage {
            name: dag.pack_name(dag.root()).to_string(),
        }
        .into());
    }

    let mut install_dirs: HashMap<PackId, PathBuf> = HashMap::new();

    for pack in dag.traverse_bottom_up_resolved() {
        if pack == dag.root() {
            continue;
        }
        let name = dag.pack_name(pack);
        let ver = dag
            .resolved(pack)
            .ok_or_else(|| Error::internal(format!("{name} lost its pin mid-walk")))?;
        let version = dag.version(ver);

        let recipe = repo.pack_recipe(name, version, dag.revision(ver)).await?;
        let sub_profile = profile.subset(recipe.languages())?;
        let revision = match dag.revision(ver) {
            Some(rev) => rev.to_string(),
            None => recipe.revision()?,
        };
        let rev_dir = cache.revision_dir(name, version, &revision);
        let dirs = rev_dir.profile_dirs(&sub_profile);

        let mut dep_infos = HashMap::new();
        for (down, _) in dag.down_deps(ver) {
            let down_name = dag.pack_name(down).to_string();
            let dir = install_dirs.get(&down).cloned().ok_or_else(|| {
                Error::internal(format!("{down_name} visited after its dependent"))
            })?;
            dep_infos.insert(down_name, DepInfo::new(dir));
        }

        debug!(name, %version, revision, "building dependency");
        let install_dir = {
            let _lock = rev_dir.lock()?;
            let mut install = package_stages(StageSetup {
                recipe,
                recipe_dir: rev_dir.path().to_path_buf(),
                profile: sub_profile,
                dirs: dirs.clone(),
                dep_infos,
                stage_dest: stage_dest.map(Path::to_path_buf),
            });
            install.reach()?;
            // the install flag's body is the stage's output path
            PathBuf::from(dirs.install_flag().read()?)
        };
        info!(name, %version, install = %install_dir.display(), "dependency ready");
        install_dirs.insert(pack, install_dir);
    }

    let root_ver = dag
        .resolved(dag.root())
        .ok_or_else(|| Error::internal("root lost its pin"))?;
    let mut root_infos = HashMap::new();
    for (down, _) in dag.down_deps(root_ver) {
        let down_name = dag.pack_name(down).to_string();
        let dir = install_dirs
            .get(&down)
            .cloned()
            .ok_or_else(|| Error::internal(format!("{down_name} was never built")))?;
        root_infos.insert(down_name, DepInfo::new(dir));
    }
    Ok(root_infos)
}
