//! Configuration loading and validation for dl-core.
//!
//! This module handles:
//! - Locating config.json (CLI > env > XDG > defaults, see `dl_config::resolve`)
//! - Shape checking via serde
//! - Semantic validation (FPR ranges, split membership)
//! - Config snapshot generation for run results

pub use dl_config::{
    resolve_config, validate_run_config, ConfigSnapshot, ConfigSource, LabelConfig, ResolvedPath,
    RunConfig, ValidationError, CONFIG_SCHEMA_VERSION,
};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Invalid JSON in config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Semantic validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("I/O error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<ConfigError> for dl_common::Error {
    fn from(err: ConfigError) -> Self {
        dl_common::Error::Config(err.to_string())
    }
}

/// Resolved configuration with provenance information.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: RunConfig,
    /// Path the config was read from (None if using defaults).
    pub path: Option<PathBuf>,
    pub source: ConfigSource,
}

impl ResolvedConfig {
    /// Snapshot for the run result.
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot::new(&self.config, self.path.as_deref(), &self.source)
    }
}

/// Load and validate the run configuration.
///
/// An explicit path that does not exist is an error; a missing implicit
/// config falls back to built-in defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<ResolvedConfig, ConfigError> {
    let resolved = resolve_config(explicit);

    let config = match &resolved.path {
        Some(path) => load_config_from_file(path)?,
        None => RunConfig::default(),
    };
    validate_run_config(&config)?;

    Ok(ResolvedConfig {
        config,
        path: resolved.path,
        source: resolved.source,
    })
}

/// Read and parse a config file without semantic validation.
pub fn load_config_from_file(path: &Path) -> Result<RunConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}
