#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Registry client for dopamine
//!
//! Read-side wire contract:
//! - `GET /packages/:name` → `{name, versions: [string]}`
//! - `GET /packages/:name/:version/latest` → `{recipe, revision, …}`
//! - `GET /packages/:name/:version/:revision` → `{recipe, revision, …}`
//!
//! HTTP status ≥ 400 becomes a domain error carrying status and message;
//! transport failures become `RegistryError::ServerDown`.

use dop_errors::{Error, RegistryError};
use dop_types::Version;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Payload of `GET /packages/:name`
#[derive(Debug, Clone, Deserialize)]
pub struct PackagePayload {
    pub name: String,
    pub versions: Vec<String>,
}

impl PackagePayload {
    /// Parse and sort the advertised versions
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::InvalidPayload` when a version string does
    /// not parse.
    pub fn parsed_versions(&self) -> Result<Vec<Version>, Error> {
        let mut versions = Vec::with_capacity(self.versions.len());
        for v in &self.versions {
            versions.push(Version::parse(v).map_err(|e| RegistryError::InvalidPayload {
                message: format!("package {}: {e}", self.name),
            })?);
        }
        versions.sort_unstable();
        versions.dedup();
        Ok(versions)
    }
}

/// Payload of the recipe endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct RecipePayload {
    pub name: String,
    pub version: String,
    pub revision: String,
    /// The recipe text itself
    pub recipe: String,
}

/// HTTP client for the package registry
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: String,
    client: reqwest::Client,
}

impl RegistryClient {
    /// Create a client for a registry base URL
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::ServerDown` when the underlying HTTP
    /// client cannot be constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self, Error> {
        let base_url = base_url.into();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("dop/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RegistryError::ServerDown {
                url: base_url.clone(),
                message: e.to_string(),
            })?;
        Ok(Self { base_url, client })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch a package and its advertised versions
    ///
    /// # Errors
    ///
    /// `RegistryError::NoSuchPackage` on 404, `RegistryError::Http` on
    /// other client/server statuses, `RegistryError::ServerDown` on
    /// transport failure.
    pub async fn package(&self, name: &str) -> Result<PackagePayload, Error> {
        let url = format!("{}/packages/{name}", self.base_url);
        let response = self.get(&url).await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::NoSuchPackage {
                name: name.to_string(),
            }
            .into());
        }
        let response = Self::check_status(response).await?;
        Self::json(response, &url).await
    }

    /// Fetch a recipe revision; `None` asks for the registry's current
    /// revision of the version
    ///
    /// # Errors
    ///
    /// `RegistryError::NoSuchVersion` / `NoSuchRevision` on 404,
    /// `RegistryError::Http` on other statuses, `ServerDown` on transport
    /// failure.
    pub async fn recipe(
        &self,
        name: &str,
        version: &Version,
        revision: Option<&str>,
    ) -> Result<RecipePayload, Error> {
        let tail = revision.unwrap_or("latest");
        let url = format!("{}/packages/{name}/{version}/{tail}", self.base_url);
        let response = self.get(&url).await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(match revision {
                Some(rev) => RegistryError::NoSuchRevision {
                    name: name.to_string(),
                    version: version.to_string(),
                    revision: rev.to_string(),
                },
                None => RegistryError::NoSuchVersion {
                    name: name.to_string(),
                    version: version.to_string(),
                },
            }
            .into());
        }
        let response = Self::check_status(response).await?;
        Self::json(response, &url).await
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, Error> {
        debug!(url, "registry request");
        self.client.get(url).send().await.map_err(|e| {
            RegistryError::ServerDown {
                url: self.base_url.clone(),
                message: e.to_string(),
            }
            .into()
        })
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, Error> {
        let status = response.status();
        if status.as_u16() >= 400 {
            let message = response.text().await.unwrap_or_default();
            return Err(RegistryError::Http {
                status: status.as_u16(),
                message,
            }
            .into());
        }
        Ok(response)
    }

    async fn json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        url: &str,
    ) -> Result<T, Error> {
        response.json().await.map_err(|e| {
            RegistryError::InvalidPayload {
                message: format!("{url}: {e}"),
            }
            .into()
        })
    }
}
