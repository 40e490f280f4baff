//! Confusion-derived metrics at a fixed threshold.
//!
//! A record is predicted positive when `score >= threshold`. Zero
//! denominators yield 0.0 plus a warning instead of an error, so a split
//! that raised no alerts still aggregates like any other.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::scoreset::ScoreSet;

/// Raw confusion matrix counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConfusionCounts {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
}

/// A metric that was defaulted to 0.0 because its denominator was zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConfusionWarning {
    /// Recall is not meaningful.
    NoActualPositives,
    /// FPR is not meaningful.
    NoActualNegatives,
    /// Precision defaulted to 0.
    NoPredictedPositives,
}

/// Metrics for one split at the model's fixed threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConfusionResult {
    pub threshold_used: f64,
    pub fpr: f64,
    pub precision: f64,
    pub recall: f64,
    pub counts: ConfusionCounts,
    pub rows: usize,
    pub positives: usize,
    pub pos_rate: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ConfusionWarning>,
}

impl ConfusionResult {
    /// False when the split has no actual positives.
    pub fn recall_meaningful(&self) -> bool {
        !self.warnings.contains(&ConfusionWarning::NoActualPositives)
    }

    pub fn fpr_meaningful(&self) -> bool {
        !self.warnings.contains(&ConfusionWarning::NoActualNegatives)
    }
}

/// Apply `threshold` to every record of `set`.
pub fn evaluate(set: &ScoreSet, threshold: f64) -> ConfusionResult {
    let mut counts = ConfusionCounts::default();
    for r in set.records() {
        match (r.score >= threshold, r.label) {
            (true, true) => counts.tp += 1,
            (true, false) => counts.fp += 1,
            (false, false) => counts.tn += 1,
            (false, true) => counts.fn_ += 1,
        }
    }

    let actual_pos = counts.tp + counts.fn_;
    let actual_neg = counts.fp + counts.tn;
    let predicted_pos = counts.tp + counts.fp;

    let mut warnings = Vec::new();
    if actual_pos == 0 {
        warnings.push(ConfusionWarning::NoActualPositives);
    }
    if actual_neg == 0 {
        warnings.push(ConfusionWarning::NoActualNegatives);
    }
    if predicted_pos == 0 {
        warnings.push(ConfusionWarning::NoPredictedPositives);
    }

    ConfusionResult {
        threshold_used: threshold,
        fpr: safe_div(counts.fp, actual_neg),
        precision: safe_div(counts.tp, predicted_pos),
        recall: safe_div(counts.tp, actual_pos),
        counts,
        rows: set.len(),
        positives: actual_pos,
        pos_rate: safe_div(actual_pos, set.len()),
        warnings,
    }
}

fn safe_div(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
