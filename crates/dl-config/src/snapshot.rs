//! Configuration snapshots for run results and reproducibility.
//!
//! A snapshot captures the exact configuration a run was evaluated under,
//! so a reported threshold can be traced back to its FPR budget.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::resolve::ConfigSource;
use crate::run::RunConfig;

/// A frozen snapshot of configuration state.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConfigSnapshot {
    /// When this snapshot was taken.
    pub timestamp: DateTime<Utc>,

    /// Schema version of the configuration.
    pub schema_version: String,

    /// Path the configuration was loaded from.
    #[serde(default)]
    pub path: Option<String>,

    /// Source of the configuration.
    pub source: String,

    /// SHA-256 of the canonical (re-serialized) configuration.
    pub content_hash: String,

    /// Split that fixed the thresholds.
    pub calibration_split: String,

    /// Target FPR per label.
    pub target_fprs: BTreeMap<String, f64>,
}

impl ConfigSnapshot {
    /// Create a snapshot from a loaded configuration.
    pub fn new(config: &RunConfig, path: Option<&std::path::Path>, source: &ConfigSource) -> Self {
        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: config.schema_version.clone(),
            path: path.map(|p| p.display().to_string()),
            source: source.to_string(),
            content_hash: content_hash(config),
            calibration_split: config.calibration_split.clone(),
            target_fprs: config
                .labels
                .iter()
                .map(|(name, label)| (name.clone(), label.target_fpr))
                .collect(),
        }
    }

    /// Check if this snapshot matches another (same content hash).
    pub fn matches(&self, other: &ConfigSnapshot) -> bool {
        self.content_hash == other.content_hash
    }
}

/// Hash the canonical JSON form of a config.
///
/// Field order is fixed by the struct and labels are a BTreeMap, so equal
/// configs always hash equal regardless of the source file's formatting.
pub fn content_hash(config: &RunConfig) -> String {
    let canonical = serde_json::to_string(config).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}
