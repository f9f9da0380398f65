#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration for the dopamine client
//!
//! Configuration is loaded and merged from:
//! - Default values (hard-coded)
//! - `$DOP_HOME/config.toml`
//! - Environment variables (`DOP_HOME`, `DOP_REGISTRY`, `DOP_OFFLINE`)

use dop_errors::{ConfigError, Error};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the dopamine home directory
pub const DOP_HOME: &str = "DOP_HOME";
/// Environment variable overriding the registry URL
pub const DOP_REGISTRY: &str = "DOP_REGISTRY";
/// Environment variable forcing offline mode (any non-empty value)
pub const DOP_OFFLINE: &str = "DOP_OFFLINE";

const DEFAULT_REGISTRY_URL: &str = "http://localhost:3500";

/// The dopamine home directory
///
/// `$DOP_HOME` when set, otherwise `$HOME/.dopamine` on POSIX and
/// `%LOCALAPPDATA%\Dopamine` on Windows.
///
/// # Errors
///
/// Returns `ConfigError::NoHome` when neither the override nor a home
/// directory can be determined.
pub fn dop_home() -> Result<PathBuf, Error> {
    if let Some(home) = std::env::var_os(DOP_HOME) {
        return Ok(PathBuf::from(home));
    }
    if cfg!(windows) {
        dirs::data_local_dir()
            .map(|d| d.join("Dopamine"))
            .ok_or_else(|| ConfigError::NoHome.into())
    } else {
        dirs::home_dir()
            .map(|d| d.join(".dopamine"))
            .ok_or_else(|| ConfigError::NoHome.into())
    }
}

/// Registry access configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the package registry
    #[serde(default = "default_registry_url")]
    pub url: String,
    /// Skip every network lookup and serve from the local cache only
    #[serde(default)]
    pub offline: bool,
}

fn default_registry_url() -> String {
    DEFAULT_REGISTRY_URL.to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: default_registry_url(),
            offline: false,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Override of the local cache root (defaults to `<home>/cache`)
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    #[serde(default)]
    pub registry: RegistryConfig,
}

impl Config {
    /// Load configuration from the dopamine home, then apply environment
    /// overrides. A missing config file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error when the home directory cannot be determined, the
    /// file cannot be read, or its TOML is invalid.
    pub fn load() -> Result<Self, Error> {
        let home = dop_home()?;
        let mut config = Self::load_from(&home.join("config.toml"))?;
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific file, defaults if it is absent
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, Error> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| Error::io_with_path(&e, path))?;
        toml::from_str(&content).map_err(|e| {
            ConfigError::Invalid {
                message: format!("{}: {e}", path.display()),
            }
            .into()
        })
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(DOP_REGISTRY) {
            if !url.is_empty() {
                self.registry.url = url;
            }
        }
        if std::env::var_os(DOP_OFFLINE).is_some_and(|v| !v.is_empty()) {
            self.registry.offline = true;
        }
    }

    /// Root of the local package cache
    ///
    /// # Errors
    ///
    /// Returns an error when no explicit cache dir is configured and the
    /// home directory cannot be determined.
    pub fn cache_root(&self) -> Result<PathBuf, Error> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(dop_home()?.join("cache")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.registry.url, DEFAULT_REGISTRY_URL);
        assert!(!config.registry.offline);
        assert!(config.cache_dir.is_none());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.registry.url, DEFAULT_REGISTRY_URL);
    }

    #[test]
    fn parses_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "cache_dir = \"/tmp/dop-cache\"\n\n[registry]\nurl = \"https://pkg.example.org\"\noffline = true\n",
        )
        .unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.cache_dir.as_deref(), Some(Path::new("/tmp/dop-cache")));
        assert_eq!(config.registry.url, "https://pkg.example.org");
        assert!(config.registry.offline);
    }

    #[test]
    fn rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "registry = 42\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
