//! Command line interface definition

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// dop - source-based package manager for native code
#[derive(Parser)]
#[command(name = "dop")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Source-based package manager for native code")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Detect the build profile for this machine
    Profile {
        /// Profile basename
        #[arg(long, default_value = "default")]
        basename: String,

        /// Build type
        #[arg(long, default_value = "release")]
        build_type: String,

        /// Comma-separated languages to include (e.g. `c,cpp,d`)
        #[arg(long, default_value = "c")]
        langs: String,

        /// Write the profile INI to this path instead of printing it
        #[arg(long, value_name = "PATH")]
        save: Option<PathBuf>,
    },

    /// List the versions a package is available in
    Versions {
        /// Package name
        name: String,
    },

    /// List packages, versions and revisions in the local cache
    Cache,

    /// Inspect a lock-file
    Lock {
        /// Lock-file path
        #[arg(default_value = dop_resolver::LOCKFILE_NAME)]
        file: PathBuf,

        /// Print the dependency graph in graphviz dot format
        #[arg(long)]
        dot: bool,
    },
}
