//! Run configuration document.
//!
//! One `config.json` drives a whole evaluation run: which split fixes the
//! threshold, which splits are compared for stability, and the FPR budget
//! for every label definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-label-definition settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LabelConfig {
    /// False-positive-rate budget on the calibration split.
    pub target_fpr: f64,

    /// Free-form description shown next to the label in reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl LabelConfig {
    pub fn new(target_fpr: f64) -> Self {
        Self {
            target_fpr,
            description: None,
        }
    }
}

/// Complete run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RunConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    /// Split used to fix the decision threshold.
    #[serde(default = "default_calibration_split")]
    pub calibration_split: String,

    /// Identity-holdout split; primary side of the stability comparison.
    #[serde(default = "default_primary_split")]
    pub primary_split: String,

    /// Later time-sliced split; other side of the stability comparison.
    #[serde(default = "default_time_split")]
    pub time_split: String,

    /// Splits every model must provide scores for.
    #[serde(default = "default_splits")]
    pub splits: Vec<String>,

    /// Number of features kept per model.
    #[serde(default = "default_top_features_n")]
    pub top_features_n: usize,

    /// Number of rows in the calibration audit table.
    #[serde(default = "default_threshold_table_size")]
    pub threshold_table_size: usize,

    /// Number of largest recall shifts surfaced by the stability summary.
    #[serde(default = "default_stability_top3_n")]
    pub stability_top3_n: usize,

    /// Absolute recall delta below which a pair counts as stable.
    #[serde(default = "default_stability_tolerance")]
    pub stability_tolerance: f64,

    /// Slack added to target_fpr when testing a candidate threshold.
    #[serde(default = "default_fpr_tolerance")]
    pub fpr_tolerance: f64,

    /// Worker threads for (label, model) evaluation. None = one per core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// FPR budgets keyed by label definition.
    #[serde(default)]
    pub labels: BTreeMap<String, LabelConfig>,
}

fn default_schema_version() -> String {
    crate::CONFIG_SCHEMA_VERSION.to_string()
}

fn default_calibration_split() -> String {
    "train".to_string()
}

fn default_primary_split() -> String {
    "user_holdout".to_string()
}

fn default_time_split() -> String {
    "time_eval".to_string()
}

fn default_splits() -> Vec<String> {
    vec![
        default_calibration_split(),
        default_time_split(),
        default_primary_split(),
    ]
}

fn default_top_features_n() -> usize {
    20
}

fn default_threshold_table_size() -> usize {
    3
}

fn default_stability_top3_n() -> usize {
    3
}

fn default_stability_tolerance() -> f64 {
    0.05
}

fn default_fpr_tolerance() -> f64 {
    1e-12
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            calibration_split: default_calibration_split(),
            primary_split: default_primary_split(),
            time_split: default_time_split(),
            splits: default_splits(),
            top_features_n: default_top_features_n(),
            threshold_table_size: default_threshold_table_size(),
            stability_top3_n: default_stability_top3_n(),
            stability_tolerance: default_stability_tolerance(),
            fpr_tolerance: default_fpr_tolerance(),
            workers: None,
            labels: BTreeMap::new(),
        }
    }
}

impl RunConfig {
    /// Builder-style label registration.
    pub fn with_label(mut self, name: impl Into<String>, target_fpr: f64) -> Self {
        self.labels.insert(name.into(), LabelConfig::new(target_fpr));
        self
    }

    /// Target FPR for a label, if configured.
    pub fn target_fpr(&self, label: &str) -> Option<f64> {
        self.labels.get(label).map(|l| l.target_fpr)
    }

    /// Configured splits other than the calibration split, in config order.
    pub fn evaluation_splits(&self) -> impl Iterator<Item = &str> {
        self.splits
            .iter()
            .map(String::as_str)
            .filter(move |s| *s != self.calibration_split)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_detectlab_layout() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.calibration_split, "train");
        assert_eq!(cfg.primary_split, "user_holdout");
        assert_eq!(cfg.time_split, "time_eval");
        assert_eq!(cfg.splits, vec!["train", "time_eval", "user_holdout"]);
        assert_eq!(cfg.top_features_n, 20);
        assert_eq!(cfg.threshold_table_size, 3);
        assert!(cfg.labels.is_empty());
    }

    #[test]
    fn test_minimal_json_fills_defaults() {
        let json = r#"{"labels": {"label_replicators": {"target_fpr": 0.01}}}"#;
        let cfg: RunConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.schema_version, crate::CONFIG_SCHEMA_VERSION);
        assert_eq!(cfg.target_fpr("label_replicators"), Some(0.01));
        assert_eq!(cfg.target_fpr("label_the_mule"), None);
        assert_eq!(cfg.fpr_tolerance, 1e-12);
    }

    #[test]
    fn test_evaluation_splits_exclude_calibration() {
        let cfg = RunConfig::default();
        let splits: Vec<_> = cfg.evaluation_splits().collect();
        assert_eq!(splits, vec!["time_eval", "user_holdout"]);
    }

    #[test]
    fn test_with_label_builder() {
        let cfg = RunConfig::default()
            .with_label("label_the_mule", 0.02)
            .with_label("label_the_chameleon", 0.01);
        assert_eq!(cfg.labels.len(), 2);
        assert_eq!(cfg.target_fpr("label_the_mule"), Some(0.02));
    }
}
