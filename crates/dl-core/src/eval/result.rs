//! Run result tree handed to report consumers.
//!
//! Every level is a string-keyed `BTreeMap` of fixed-shape records, so the
//! serialized output is deterministic. Numbers are finite or `null`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dl_common::RunId;
use dl_config::ConfigSnapshot;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::confusion::ConfusionResult;
use super::features::{FeatureAttribution, FeatureKind};
use super::rank::RankSummary;
use super::slices::SliceResult;
use super::stability::{StabilityReport, StabilityStatus};
use super::threshold::ThresholdCandidate;

/// Outcome of one (label, model) evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Ok,
    Failed,
    Skipped,
}

impl std::fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelStatus::Ok => write!(f, "ok"),
            ModelStatus::Failed => write!(f, "failed"),
            ModelStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Metrics for one split at the model's fixed threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SplitResult {
    pub rank: RankSummary,
    pub confusion: ConfusionResult,
    /// Threshold this split alone would calibrate to at the same target.
    /// Diagnostic only; never used to classify.
    pub threshold_for_fpr: Option<f64>,
    /// Per-slice metrics at the same fixed threshold, keyed by slice tag.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub slices: BTreeMap<String, SliceResult>,
}

/// Per (label, model) bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModelResult {
    pub status: ModelStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<u32>,

    pub calibration_split: String,

    /// Threshold fixed on the calibration split; null unless calibrated.
    pub threshold_for_fpr: Option<f64>,

    /// No candidate met the FPR budget.
    #[serde(default)]
    pub best_effort: bool,

    #[serde(default)]
    pub n_candidates: usize,

    pub threshold_table_top3: Vec<ThresholdCandidate>,

    pub per_split: BTreeMap<String, SplitResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_kind: Option<FeatureKind>,

    pub top_features: Vec<FeatureAttribution>,
}

impl ModelResult {
    /// Empty result shell for `calibration_split`.
    pub fn new(status: ModelStatus, calibration_split: impl Into<String>) -> Self {
        Self {
            status,
            error: None,
            error_code: None,
            calibration_split: calibration_split.into(),
            threshold_for_fpr: None,
            best_effort: false,
            n_candidates: 0,
            threshold_table_top3: Vec::new(),
            per_split: BTreeMap::new(),
            feature_kind: None,
            top_features: Vec::new(),
        }
    }

    /// A failed result carrying the reason and its stable code.
    pub fn failed(
        calibration_split: impl Into<String>,
        reason: impl Into<String>,
        code: Option<u32>,
    ) -> Self {
        Self {
            error: Some(reason.into()),
            error_code: code,
            ..Self::new(ModelStatus::Failed, calibration_split)
        }
    }

    pub fn skipped(calibration_split: impl Into<String>) -> Self {
        Self::new(ModelStatus::Skipped, calibration_split)
    }

    pub fn is_ok(&self) -> bool {
        self.status == ModelStatus::Ok
    }
}

/// Aggregate state of one label definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LabelStatus {
    /// Every evaluated model succeeded.
    Ok,
    /// Some models failed, some succeeded.
    Partial,
    /// Models were evaluated and none succeeded.
    Failed,
    /// Nothing was evaluated (no models, or all skipped).
    Empty,
}

impl LabelStatus {
    pub fn from_counts(n_ok: usize, n_failed: usize) -> Self {
        match (n_ok, n_failed) {
            (0, 0) => LabelStatus::Empty,
            (_, 0) => LabelStatus::Ok,
            (0, _) => LabelStatus::Failed,
            _ => LabelStatus::Partial,
        }
    }
}

/// Per-label counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LabelMeta {
    pub n_ok: usize,
    pub n_failed: usize,
    pub n_skipped: usize,
    /// Records per split, taken from the models that provided it.
    pub row_counts_per_split: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// Everything evaluated under one label definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LabelResult {
    pub target_fpr: f64,
    pub status: LabelStatus,
    pub models: BTreeMap<String, ModelResult>,
    pub meta: LabelMeta,
}

/// Run-level counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RunSummary {
    pub n_labels: usize,
    pub n_models: usize,
    pub n_ok: usize,
    pub n_failed: usize,
    pub n_skipped: usize,
    pub stability_status: StabilityStatus,
}

impl RunSummary {
    /// One-line form for `--format summary`.
    pub fn one_line(&self, run_id: &RunId) -> String {
        format!(
            "[{}] detectlab: {} labels, {} models ({} ok, {} failed, {} skipped), stability {}",
            run_id,
            self.n_labels,
            self.n_models,
            self.n_ok,
            self.n_failed,
            self.n_skipped,
            self.stability_status
        )
    }
}

/// Full result of an evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunResult {
    pub schema_version: String,
    pub run_id: RunId,
    pub generated_at: DateTime<Utc>,
    pub config: ConfigSnapshot,
    pub labels: BTreeMap<String, LabelResult>,
    pub stability: StabilityReport,
    pub summary: RunSummary,
}

impl RunResult {
    /// Some model failed or stability could not be computed.
    pub fn is_partial(&self) -> bool {
        self.summary.n_failed > 0 || self.summary.stability_status == StabilityStatus::Partial
    }

    pub fn model(&self, label: &str, model: &str) -> Option<&ModelResult> {
        self.labels.get(label).and_then(|l| l.models.get(model))
    }
}

/// `Some(v)` when finite; the boundary never carries NaN or infinity.
pub fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}
