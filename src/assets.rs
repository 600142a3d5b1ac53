//! Download-once cache for the remote images referenced by a deck.
//!
//! Every asset is addressed by a logical key that doubles as the cache file stem.  The first
//! [`AssetCache::resolve`] call for a key streams the remote body into a temporary file inside the
//! cache directory and renames it into place; later calls find the file and never touch the
//! network.  A failed or interrupted transfer therefore never leaves a file behind that a later run
//! would mistake for a cache hit.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Extension used for cached files when none is configured.
pub const DEFAULT_EXTENSION: &str = "jpg";

/// Errors produced while resolving an asset.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("invalid asset key `{0}`")]
    InvalidKey(String),

    #[error("no source URL defined for asset `{0}`")]
    UnknownAsset(String),

    #[error("request for {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("request for {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to construct HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("I/O error at `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl AssetError {
    fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Where the bytes of a resolved asset came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetOrigin {
    /// The file was already present in the cache directory.
    Cached,
    /// The file was fetched during this resolution.
    Downloaded { bytes: u64 },
}

/// A resolved asset: the logical key, where it came from and where it lives now.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetRecord {
    pub key: String,
    pub source_url: String,
    pub local_path: PathBuf,
    pub origin: AssetOrigin,
}

/// Transport used by [`AssetCache`] on a cache miss.
pub trait Fetcher {
    /// Streams the body behind `url` into `sink` and returns the number of bytes written.
    ///
    /// Implementations must report non-success responses as errors rather than writing the error
    /// body into `sink`.
    fn fetch_into(&self, url: &str, sink: &mut dyn Write) -> Result<u64, AssetError>;
}

impl<F: Fetcher + ?Sized> Fetcher for &F {
    fn fetch_into(&self, url: &str, sink: &mut dyn Write) -> Result<u64, AssetError> {
        (**self).fetch_into(url, sink)
    }
}

/// Blocking HTTP fetcher backed by `reqwest`.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    /// Creates a fetcher whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, AssetError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AssetError::Client)?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch_into(&self, url: &str, sink: &mut dyn Write) -> Result<u64, AssetError> {
        let transport = |source| AssetError::Transport {
            url: url.to_owned(),
            source,
        };

        let mut response = self.client.get(url).send().map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(AssetError::Status {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }

        response.copy_to(sink).map_err(transport)
    }
}

/// Directory-backed asset cache keyed by logical asset names.
pub struct AssetCache<F> {
    root: PathBuf,
    extension: String,
    fetcher: F,
}

impl<F: Fetcher> AssetCache<F> {
    /// Creates a cache rooted at `root`. The directory is created lazily on the first miss.
    pub fn new(root: impl Into<PathBuf>, fetcher: F) -> Self {
        Self {
            root: root.into(),
            extension: DEFAULT_EXTENSION.to_owned(),
            fetcher,
        }
    }

    /// Overrides the extension appended to every cached file.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Returns the cache directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the deterministic location of the cached file for `key`.
    pub fn cache_path(&self, key: &str) -> Result<PathBuf, AssetError> {
        validate_key(key)?;
        let file_name = if self.extension.is_empty() {
            key.to_owned()
        } else {
            format!("{}.{}", key, self.extension)
        };
        Ok(self.root.join(file_name))
    }

    /// Returns the local path for `key`, downloading `source_url` on the first request.
    pub fn resolve(&self, key: &str, source_url: &str) -> Result<AssetRecord, AssetError> {
        let local_path = self.cache_path(key)?;

        if local_path.is_file() {
            debug!("Asset '{}' served from {}", key, local_path.display());
            return Ok(AssetRecord {
                key: key.to_owned(),
                source_url: source_url.to_owned(),
                local_path,
                origin: AssetOrigin::Cached,
            });
        }

        fs::create_dir_all(&self.root).map_err(|err| AssetError::io(&self.root, err))?;

        let mut staging =
            NamedTempFile::new_in(&self.root).map_err(|err| AssetError::io(&self.root, err))?;
        let bytes = self.fetcher.fetch_into(source_url, staging.as_file_mut())?;
        staging
            .as_file_mut()
            .flush()
            .map_err(|err| AssetError::io(staging.path(), err))?;
        staging
            .persist(&local_path)
            .map_err(|err| AssetError::io(&local_path, err.error))?;

        info!(
            "Downloaded asset '{}' ({} bytes) to {}",
            key,
            bytes,
            local_path.display()
        );

        Ok(AssetRecord {
            key: key.to_owned(),
            source_url: source_url.to_owned(),
            local_path,
            origin: AssetOrigin::Downloaded { bytes },
        })
    }
}

fn validate_key(key: &str) -> Result<(), AssetError> {
    let invalid = key.trim().is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\'])
        || key.contains('\0');
    if invalid {
        Err(AssetError::InvalidKey(key.to_owned()))
    } else {
        Ok(())
    }
}
