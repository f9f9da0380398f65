#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Build-state engine and dependency-build orchestrator for dopamine
//!
//! A build is a prerequisite graph of packaging stages — source,
//! configure, build, install, archive — whose reached-state lives on
//! disk as flag files ordered by modification time. [`BuildState::reach`]
//! drives a stage: prerequisites first, then observe, then do the work,
//! then observe again. Concurrent processes serialize per revision
//! through the cache's advisory lock; the loser of the race finds the
//! flag file already written and does nothing.
//!
//! The orchestrator walks a resolved dependency DAG bottom-up and, for
//! each node, drives that stage chain to its reached state, handing
//! install directories upward as [`dop_types::DepInfo`].

mod orchestrator;
mod stage;
mod stages;

pub use orchestrator::build_dependencies;
pub use stage::{BuildState, Enforced};
pub use stages::{
    archive_stage, copy_recurse, package_stages, ArchiveFn, ArchiveStage, BuildStage,
    ConfigStage, InstallStage, ProfileStage, SourceStage, StageSetup,
};
