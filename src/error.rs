//! Error types for the fallible seams of the pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Transport failure while fetching a remote resource.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request failed for {url}: {message}")]
    Request { url: String, message: String },

    #[error("Failed to read response body for {url}")]
    Body {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Empty response body for {0}")]
    Empty(String),
}

/// Failure while populating the on-disk media cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Failed to create cache directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write cache file {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure while loading or persisting the catalog document.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Invalid registry JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Registry snapshot I/O failed for {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure while loading or persisting the liked-id set.
#[derive(Debug, Error)]
pub enum UserDataError {
    #[error("Invalid user data JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("User data I/O failed for {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config document: {0}")]
    Document(#[from] toml_edit::TomlError),
}
