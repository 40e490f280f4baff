//! DetectLab run configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for config.json
//! - Config resolution (CLI → env → XDG → defaults)
//! - Semantic validation
//! - Config snapshots for run results

pub mod resolve;
pub mod run;
pub mod snapshot;
pub mod validate;

pub use resolve::{resolve_config, ConfigSource, ResolvedPath};
pub use run::{LabelConfig, RunConfig};
pub use snapshot::ConfigSnapshot;
pub use validate::{validate_run_config, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
