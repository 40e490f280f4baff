//! Recall stability between the identity holdout and the time window.
//!
//! `delta_recall = holdout_recall - time_recall`, both measured at the
//! threshold fixed on the calibration split. A positive delta means the
//! model catches held-out identities but loses ground on the later window
//! (temporal decay); a negative delta means the later window is easier than
//! unseen identities (identity overfit).

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::result::{LabelResult, ModelResult, ModelStatus};

/// Drift classification of one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Drift {
    /// |delta| within tolerance.
    Stable,
    /// Holdout recall above time recall by more than tolerance.
    TemporalDecay,
    /// Time recall above holdout recall by more than tolerance.
    IdentityOverfit,
    /// One side has no actual positives; recall carries no signal.
    Indeterminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StabilityStatus {
    Ok,
    /// No (label, model) pair qualified.
    Partial,
}

impl std::fmt::Display for StabilityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StabilityStatus::Ok => write!(f, "ok"),
            StabilityStatus::Partial => write!(f, "partial"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StabilityRow {
    pub label: String,
    pub model: String,
    pub threshold: f64,
    pub holdout_pr_auc: Option<f64>,
    pub time_pr_auc: Option<f64>,
    pub holdout_recall: f64,
    pub time_recall: f64,
    pub delta_recall: f64,
    pub drift: Drift,
}

/// A (label, model) pair left out of the table, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StabilityExclusion {
    pub label: String,
    pub model: String,
    pub status: ModelStatus,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StabilityReport {
    pub primary_split: String,
    pub time_split: String,
    pub status: StabilityStatus,
    pub tolerance: f64,
    pub rows: Vec<StabilityRow>,
    pub excluded: Vec<StabilityExclusion>,
    /// Rows with the largest |delta_recall|.
    pub largest_shifts: Vec<StabilityRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StabilityOptions {
    pub primary_split: String,
    pub time_split: String,
    pub tolerance: f64,
    pub top_n: usize,
}

impl StabilityOptions {
    pub fn new(primary_split: impl Into<String>, time_split: impl Into<String>) -> Self {
        Self {
            primary_split: primary_split.into(),
            time_split: time_split.into(),
            tolerance: 0.05,
            top_n: 3,
        }
    }
}

/// Build the stability table across every label and model.
///
/// `count(rows) + count(excluded)` equals the number of (label, model) pairs.
pub fn analyze(labels: &BTreeMap<String, LabelResult>, opts: &StabilityOptions) -> StabilityReport {
    let mut rows = Vec::new();
    let mut excluded = Vec::new();

    for (label, label_result) in labels {
        for (model, result) in &label_result.models {
            match build_row(label, model, result, opts) {
                Ok(row) => rows.push(row),
                Err(reason) => excluded.push(StabilityExclusion {
                    label: label.clone(),
                    model: model.clone(),
                    status: result.status,
                    reason,
                }),
            }
        }
    }

    let mut largest_shifts = rows.clone();
    largest_shifts.sort_by(|a, b| {
        b.delta_recall
            .abs()
            .total_cmp(&a.delta_recall.abs())
            .then_with(|| a.label.cmp(&b.label))
            .then_with(|| a.model.cmp(&b.model))
    });
    largest_shifts.truncate(opts.top_n);

    let status = if rows.is_empty() {
        StabilityStatus::Partial
    } else {
        StabilityStatus::Ok
    };

    StabilityReport {
        primary_split: opts.primary_split.clone(),
        time_split: opts.time_split.clone(),
        status,
        tolerance: opts.tolerance,
        rows,
        excluded,
        largest_shifts,
    }
}

fn build_row(
    label: &str,
    model: &str,
    result: &ModelResult,
    opts: &StabilityOptions,
) -> Result<StabilityRow, String> {
    match result.status {
        ModelStatus::Ok => {}
        ModelStatus::Skipped => return Err("model skipped".to_string()),
        ModelStatus::Failed => {
            return Err(result
                .error
                .clone()
                .unwrap_or_else(|| "model failed".to_string()))
        }
    }

    let threshold = result
        .threshold_for_fpr
        .ok_or_else(|| "no calibrated threshold".to_string())?;
    let holdout = result
        .per_split
        .get(&opts.primary_split)
        .ok_or_else(|| format!("split '{}' not evaluated", opts.primary_split))?;
    let time = result
        .per_split
        .get(&opts.time_split)
        .ok_or_else(|| format!("split '{}' not evaluated", opts.time_split))?;

    let holdout_recall = holdout.confusion.recall;
    let time_recall = time.confusion.recall;
    let delta_recall = holdout_recall - time_recall;

    let drift = if !holdout.confusion.recall_meaningful() || !time.confusion.recall_meaningful() {
        Drift::Indeterminate
    } else if delta_recall > opts.tolerance {
        Drift::TemporalDecay
    } else if delta_recall < -opts.tolerance {
        Drift::IdentityOverfit
    } else {
        Drift::Stable
    };

    Ok(StabilityRow {
        label: label.to_string(),
        model: model.to_string(),
        threshold,
        holdout_pr_auc: holdout.rank.pr_auc,
        time_pr_auc: time.rank.pr_auc,
        holdout_recall,
        time_recall,
        delta_recall,
        drift,
    })
}
