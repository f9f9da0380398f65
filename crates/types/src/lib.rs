#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core type definitions for the dopamine package manager
//!
//! This crate provides the fundamental vocabulary used throughout the
//! system: semantic versions and version specs, language tags, host
//! description and dependency declarations.

pub mod host;
pub mod language;
pub mod package;
pub mod spec;
pub mod version;

pub use host::{Arch, BuildType, HostInfo, Os};
pub use language::Language;
pub use package::{DepInfo, Dependency};
pub use spec::{Comparator, VersionSpec};
pub use version::Version;
