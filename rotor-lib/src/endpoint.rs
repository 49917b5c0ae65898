//! Endpoint discovery: enumerates tunnel configurations from a directory of
//! config files matching `<provider>_<country>_all.conf`.

use thiserror::Error;

use std::fmt::{self, Display};
use std::fs;
use std::path::{Path, PathBuf};

/// An identified tunnel egress configuration. Immutable once discovered;
/// equality and hashing are by `name` alone.
#[derive(Clone, Debug)]
pub struct Endpoint {
    pub name: String,
    pub country: String,
    pub config_reference: PathBuf,
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Endpoint {}

impl Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.country)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("no endpoint configuration files found in {0}")]
    CatalogEmpty(PathBuf),
    #[error("IO error reading {path}: {source}")]
    IO {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Loaded once at construction; `list()` afterwards returns the cached,
/// order-stable result.
pub struct EndpointCatalog {
    endpoints: Vec<Endpoint>,
}

impl EndpointCatalog {
    /// Scans `config_dir` for files matching `<provider>_<country>_all.conf`.
    /// Filenames with fewer than three underscore-delimited tokens are
    /// skipped with a warning rather than rejected outright.
    pub fn discover(config_dir: &Path) -> Result<Self, Error> {
        let mut endpoints = Vec::new();
        let entries = fs::read_dir(config_dir).map_err(|source| Error::IO {
            path: config_dir.to_path_buf(),
            source,
        })?;

        for entry in entries {
            let entry = entry.map_err(|source| Error::IO {
                path: config_dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("conf") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !stem.ends_with("_all") {
                continue;
            }
            let tokens: Vec<&str> = stem.split('_').collect();
            if tokens.len() < 3 {
                tracing::warn!(stem, "skipping endpoint config with malformed name");
                continue;
            }
            let country = tokens[1].to_string();
            endpoints.push(Endpoint {
                name: stem.to_string(),
                country,
                config_reference: path,
            });
        }

        if endpoints.is_empty() {
            return Err(Error::CatalogEmpty(config_dir.to_path_buf()));
        }

        tracing::info!(count = endpoints.len(), dir = %config_dir.display(), "loaded endpoint catalog");
        Ok(Self { endpoints })
    }

    /// Construct directly from an in-memory list, bypassing filesystem
    /// discovery entirely. Used by tests.
    pub fn from_endpoints(endpoints: Vec<Endpoint>) -> Self {
        Self { endpoints }
    }

    pub fn list(&self) -> &[Endpoint] {
        &self.endpoints
    }
}
