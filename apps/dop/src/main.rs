//! dop - the dopamine command line client

mod cli;

use crate::cli::{Cli, Commands};
use clap::Parser;
use dop_config::Config;
use dop_errors::Error;
use dop_types::{BuildType, Language};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(e) = run(cli).await {
        error!("{e}");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_tracing(debug: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dop={default}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), Error> {
    let config = Config::load()?;

    match cli.command {
        Commands::Profile {
            basename,
            build_type,
            langs,
            save,
        } => profile(&basename, &build_type, &langs, save.as_deref()),
        Commands::Versions { name } => versions(&config, &name).await,
        Commands::Cache => cache(&config),
        Commands::Lock { file, dot } => lock(&file, dot),
    }
}

fn profile(
    basename: &str,
    build_type: &str,
    langs: &str,
    save: Option<&std::path::Path>,
) -> Result<(), Error> {
    let build_type: BuildType = build_type.parse()?;
    let langs: Vec<Language> = langs
        .split(',')
        .map(|l| l.trim().parse::<Language>())
        .collect::<Result<_, _>>()?;

    let profile = dop_profile::default_profile(basename, build_type, &langs)?;
    match save {
        Some(path) => {
            dop_profile::save_ini(&profile, path)?;
            println!("{} saved to {}", profile.name(), path.display());
        }
        None => print!("{}", dop_profile::to_ini_string(&profile)),
    }
    Ok(())
}

async fn versions(config: &Config, name: &str) -> Result<(), Error> {
    let client = dop_registry::RegistryClient::new(config.registry.url.clone())?;
    let payload = client.package(name).await?;
    for version in payload.parsed_versions()? {
        println!("{version}");
    }
    Ok(())
}

fn cache(config: &Config) -> Result<(), Error> {
    let cache = dop_cache::CacheDir::new(config.cache_root()?);
    for name in cache.packages()? {
        let package_dir = cache.package_dir(&name);
        for version in package_dir.versions()? {
            for revision in package_dir.version_dir(&version).revisions()? {
                println!("{name}/{version}/{}", revision.revision());
            }
        }
    }
    Ok(())
}

fn lock(file: &std::path::Path, dot: bool) -> Result<(), Error> {
    let dag = dop_resolver::read_lockfile(file)?;
    if dot {
        print!("{}", dag.to_dot());
    } else {
        print!("{}", dop_resolver::serialize_lockfile(&dag, true));
    }
    Ok(())
}
