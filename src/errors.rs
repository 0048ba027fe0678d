//! Typed error hierarchy for the regress orchestrator.
//!
//! Three top-level enums cover the setup-time failure surface:
//! - `CatalogError`: test discovery failures
//! - `ConfigError`: persisted configuration store failures
//! - `SetupError`: anything that prevents the run loop from starting
//!
//! Per-test failures are not errors: they are classified results. Artifact
//! write failures are logged and swallowed by the tracker.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from test discovery.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read test directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No tests found in {path} matching test<major>.<minor> and the include/exclude filters")]
    NoTests { path: PathBuf },
}

/// Errors from the persisted configuration store.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config store {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config store {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to write config store {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize config store: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid test pattern '{0}': expected <major>.<minor> with '*' wildcards")]
    InvalidPattern(String),

    #[error("Invalid test identifier '{0}': expected <major>.<minor>")]
    InvalidTestId(String),
}

/// Errors that prevent a session from starting. These map to exit code -1.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Test directory {0} does not exist")]
    TestDirMissing(PathBuf),

    #[error("Failed to create state directory {path}: {source}")]
    StateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
