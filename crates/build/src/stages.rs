//! Packaging stages over a revision directory and a profile
//!
//! Freshness is judged on flag-file modification times with strict `>`:
//!
//! 1. Profile — supplied by the caller or loaded from
//!    `<pkg>/.dop/profile.ini`.
//! 2. Source — the recipe dir for in-tree recipes; otherwise
//!    `source.flag` must point at an existing directory and be newer
//!    than the recipe file.
//! 3. Config — `config.flag` newer than `source.flag` and the recipe.
//! 4. Build — `build.flag` newer than `config.flag` and the recipe.
//! 5. Install — `install.flag` newer than `build.flag` and the recipe;
//!    packs (or stages) the build into its destination and patches it.
//! 6. Archive — the archive file newer than `install.flag` and the
//!    recipe. Creating the archive is the adapter's business, not ours.
//!
//! The dependency orchestrator drives this same chain per node; commands
//! that operate on a single package directory compose it with
//! [`ProfileStage`] and [`ArchiveStage`].

use crate::stage::BuildState;
use dop_cache::{path_mtime, ProfileDirs};
use dop_errors::{BuildError, Error};
use dop_profile::Profile;
use dop_recipe::{BuildDirs, Recipe};
use dop_types::DepInfo;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Everything the packaging stages of one package share
#[derive(Clone)]
pub struct StageSetup {
    pub recipe: Recipe,
    /// Directory holding the recipe file
    pub recipe_dir: PathBuf,
    /// Sub-profile the package builds with
    pub profile: Profile,
    pub dirs: ProfileDirs,
    pub dep_infos: HashMap<String, DepInfo>,
    /// Shared staging destination (a sysroot) collecting the install
    /// instead of the per-profile install dir
    pub stage_dest: Option<PathBuf>,
}

impl StageSetup {
    fn recipe_file(&self) -> PathBuf {
        self.recipe
            .file()
            .map_or_else(|| self.recipe_dir.join(dop_cache::RECIPE_FILE), Path::to_path_buf)
    }

    fn build_dirs(&self) -> Result<BuildDirs, Error> {
        Ok(BuildDirs {
            root: self.recipe_dir.clone(),
            src: self.source_dir()?,
            build: self.dirs.build(),
            install: self.dirs.install(),
        })
    }

    /// The source directory once the source stage is reached
    ///
    /// # Errors
    ///
    /// Returns an error when the source flag of an out-of-tree recipe
    /// cannot be read.
    pub fn source_dir(&self) -> Result<PathBuf, Error> {
        match self.recipe.in_tree() {
            Some(rel) => Ok(self.recipe_dir.join(rel)),
            None => Ok(PathBuf::from(self.dirs.source_flag().read()?)),
        }
    }
}

/// Load (or accept) the profile a package directory builds with
pub struct ProfileStage {
    pkg_dir: PathBuf,
    profile: Option<Profile>,
}

impl ProfileStage {
    #[must_use]
    pub fn new(pkg_dir: impl Into<PathBuf>, supplied: Option<Profile>) -> Self {
        Self {
            pkg_dir: pkg_dir.into(),
            profile: supplied,
        }
    }

    /// The profile, once reached
    #[must_use]
    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    fn ini_path(&self) -> PathBuf {
        self.pkg_dir.join(".dop").join("profile.ini")
    }
}

impl BuildState for ProfileStage {
    fn name(&self) -> String {
        "Profile".to_string()
    }

    fn key(&self) -> String {
        format!("profile:{}", self.pkg_dir.display())
    }

    fn check(&mut self) -> Result<bool, Error> {
        if self.profile.is_some() {
            return Ok(true);
        }
        let path = self.ini_path();
        if !path.is_file() {
            return Ok(false);
        }
        self.profile = Some(dop_profile::load_ini(&path)?);
        Ok(true)
    }

    fn execute(&mut self) -> Result<(), Error> {
        Err(BuildError::NoProfile {
            dir: self.pkg_dir.display().to_string(),
        }
        .into())
    }
}

/// Obtain the source tree
pub struct SourceStage {
    setup: StageSetup,
}

impl SourceStage {
    #[must_use]
    pub fn new(setup: StageSetup) -> Self {
        Self { setup }
    }
}

impl BuildState for SourceStage {
    fn name(&self) -> String {
        "Source".to_string()
    }

    fn key(&self) -> String {
        format!("source:{}", self.setup.dirs.root().display())
    }

    fn check(&mut self) -> Result<bool, Error> {
        if self.setup.recipe.in_tree().is_some() {
            return Ok(true);
        }
        let flag = self.setup.dirs.source_flag();
        if !flag.newer_than_all(&[path_mtime(&self.setup.recipe_file())]) {
            return Ok(false);
        }
        Ok(Path::new(&flag.read()?).is_dir())
    }

    fn execute(&mut self) -> Result<(), Error> {
        let src = self.setup.recipe.source()?;
        self.setup.dirs.source_flag().write(&src)
    }
}

/// Set up the per-profile build tree
pub struct ConfigStage {
    setup: StageSetup,
    prereq: SourceStage,
}

impl ConfigStage {
    #[must_use]
    pub fn new(setup: StageSetup) -> Self {
        let prereq = SourceStage::new(setup.clone());
        Self { setup, prereq }
    }

    fn references(&self) -> Vec<Option<std::time::SystemTime>> {
        let mut refs = vec![path_mtime(&self.setup.recipe_file())];
        if self.setup.recipe.in_tree().is_none() {
            refs.push(self.setup.dirs.source_flag().mtime());
        }
        refs
    }
}

impl BuildState for ConfigStage {
    fn name(&self) -> String {
        "Config".to_string()
    }

    fn key(&self) -> String {
        format!("config:{}", self.setup.dirs.root().display())
    }

    fn check(&mut self) -> Result<bool, Error> {
        Ok(self
            .setup
            .dirs
            .config_flag()
            .newer_than_all(&self.references()))
    }

    fn execute(&mut self) -> Result<(), Error> {
        self.setup.dirs.create()?;
        // persist the profile the tree is configured for
        dop_profile::save_ini(
            &self.setup.profile,
            &self.setup.dirs.root().join("profile.ini"),
        )?;
        self.setup
            .dirs
            .config_flag()
            .write(&self.setup.dirs.build().display().to_string())
    }

    fn prerequisite(&mut self) -> Option<&mut dyn BuildState> {
        Some(&mut self.prereq)
    }
}

/// Run the recipe's build hook
pub struct BuildStage {
    setup: StageSetup,
    prereq: ConfigStage,
}

impl BuildStage {
    #[must_use]
    pub fn new(setup: StageSetup) -> Self {
        let prereq = ConfigStage::new(setup.clone());
        Self { setup, prereq }
    }
}

impl BuildState for BuildStage {
    fn name(&self) -> String {
        "Build".to_string()
    }

    fn key(&self) -> String {
        format!("build:{}", self.setup.dirs.root().display())
    }

    fn check(&mut self) -> Result<bool, Error> {
        Ok(self.setup.dirs.build_flag().newer_than_all(&[
            self.setup.dirs.config_flag().mtime(),
            path_mtime(&self.setup.recipe_file()),
        ]))
    }

    fn execute(&mut self) -> Result<(), Error> {
        let dirs = self.setup.build_dirs()?;
        let installed =
            self.setup
                .recipe
                .build(&dirs, &self.setup.profile, &self.setup.dep_infos)?;
        if installed && !dirs.install.is_dir() {
            return Err(BuildError::InstallDirMissing {
                path: dirs.install.display().to_string(),
            }
            .into());
        }
        if !installed && !self.setup.recipe.has_pack() {
            return Err(BuildError::NothingToInstall {
                name: self.setup.recipe.name().to_string(),
            }
            .into());
        }
        let body = if installed {
            dirs.install.display().to_string()
        } else {
            String::new()
        };
        self.setup.dirs.build_flag().write(&body)
    }

    fn prerequisite(&mut self) -> Option<&mut dyn BuildState> {
        Some(&mut self.prereq)
    }
}

/// Populate and patch the install tree
pub struct InstallStage {
    setup: StageSetup,
    prereq: BuildStage,
}

impl InstallStage {
    #[must_use]
    pub fn new(setup: StageSetup) -> Self {
        let prereq = BuildStage::new(setup.clone());
        Self { setup, prereq }
    }
}

impl BuildState for InstallStage {
    fn name(&self) -> String {
        "Install".to_string()
    }

    fn key(&self) -> String {
        format!("install:{}", self.setup.dirs.root().display())
    }

    fn check(&mut self) -> Result<bool, Error> {
        Ok(self.setup.dirs.install_flag().newer_than_all(&[
            self.setup.dirs.build_flag().mtime(),
            path_mtime(&self.setup.recipe_file()),
        ]))
    }

    fn execute(&mut self) -> Result<(), Error> {
        let dirs = self.setup.build_dirs()?;
        let dest = self
            .setup
            .stage_dest
            .clone()
            .unwrap_or_else(|| dirs.install.clone());
        if self.setup.recipe.has_pack() {
            self.setup.recipe.pack(&dirs, &self.setup.profile, &dest)?;
        } else if let Some(stage_dest) = &self.setup.stage_dest {
            // the build hook installed in place; collect it into the
            // shared staging tree
            copy_recurse(&dirs.install, stage_dest)?;
        }
        self.setup
            .recipe
            .patch_install(&self.setup.profile, &dirs.install)?;
        self.setup
            .dirs
            .install_flag()
            .write(&dest.display().to_string())
    }

    fn prerequisite(&mut self) -> Option<&mut dyn BuildState> {
        Some(&mut self.prereq)
    }
}

/// Copy a directory tree into a destination, merging with what is there
///
/// # Errors
///
/// Returns an error when any directory or file cannot be copied.
pub fn copy_recurse(from: &Path, to: &Path) -> Result<(), Error> {
    std::fs::create_dir_all(to).map_err(|e| Error::io_with_path(&e, to))?;
    for entry in std::fs::read_dir(from).map_err(|e| Error::io_with_path(&e, from))? {
        let entry = entry.map_err(Error::from)?;
        let target = to.join(entry.file_name());
        if entry.file_type().map_err(Error::from)?.is_dir() {
            copy_recurse(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)
                .map_err(|e| Error::io_with_path(&e, entry.path()))?;
        }
    }
    Ok(())
}

/// Archive creation adapter: `(install_dir, archive_path)`
pub type ArchiveFn = Box<dyn FnMut(&Path, &Path) -> Result<(), Error>>;

/// Produce the package archive out of the install tree
pub struct ArchiveStage {
    setup: StageSetup,
    prereq: InstallStage,
    archive_path: PathBuf,
    create: ArchiveFn,
}

impl BuildState for ArchiveStage {
    fn name(&self) -> String {
        "Archive".to_string()
    }

    fn key(&self) -> String {
        format!("archive:{}", self.archive_path.display())
    }

    fn check(&mut self) -> Result<bool, Error> {
        let Some(own) = path_mtime(&self.archive_path) else {
            return Ok(false);
        };
        let refs = [
            self.setup.dirs.install_flag().mtime(),
            path_mtime(&self.setup.recipe_file()),
        ];
        Ok(refs.iter().all(|r| matches!(r, Some(t) if own > *t)))
    }

    fn execute(&mut self) -> Result<(), Error> {
        (self.create)(&self.setup.dirs.install(), &self.archive_path)
    }

    fn prerequisite(&mut self) -> Option<&mut dyn BuildState> {
        Some(&mut self.prereq)
    }
}

/// The source → config → build → install chain for one package
#[must_use]
pub fn package_stages(setup: StageSetup) -> InstallStage {
    InstallStage::new(setup)
}

/// The full chain up to the archive file
#[must_use]
pub fn archive_stage(setup: StageSetup, archive_path: PathBuf, create: ArchiveFn) -> ArchiveStage {
    let prereq = InstallStage::new(setup.clone());
    ArchiveStage {
        setup,
        prereq,
        archive_path,
        create,
    }
}
