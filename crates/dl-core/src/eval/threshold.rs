//! Threshold calibration under a false-positive-rate budget.
//!
//! Candidates are the distinct scores observed on the reference split, swept
//! from highest to lowest. A candidate `t` classifies `score >= t` as
//! positive, so lowering the threshold can only add alerts.
//!
//! Selection policy, in order:
//! 1. Keep candidates whose FPR is within `target_fpr + fpr_tolerance`.
//! 2. Among those, take the largest false-positive count (loosest threshold
//!    still inside the budget).
//! 3. Ties on false positives prefer higher recall, then higher precision,
//!    then the numerically larger threshold.
//!
//! If no candidate is within budget the highest observed score is returned
//! and the calibration is flagged `best_effort`.

use std::cmp::Ordering;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::scoreset::ScoreSet;

/// Calibration failures on the reference split.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    #[error("reference split is empty")]
    EmptyReference,

    #[error("reference split has zero negatives; FPR is undefined")]
    NoNegatives,

    #[error("target_fpr must be finite and in [0, 1], got {0}")]
    InvalidTarget(f64),
}

/// One row of the calibration sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ThresholdCandidate {
    pub threshold: f64,
    pub fpr: f64,
    pub precision: f64,
    pub recall: f64,
    /// True positives at this threshold.
    pub tp: usize,
    /// False positives at this threshold.
    pub fp: usize,
    /// FPR is within the budget.
    #[serde(default)]
    pub within_budget: bool,
    /// This row is the calibrated threshold.
    #[serde(default)]
    pub selected: bool,
}

/// Calibration parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationOptions {
    pub target_fpr: f64,
    pub fpr_tolerance: f64,
    pub table_size: usize,
}

impl CalibrationOptions {
    pub fn new(target_fpr: f64) -> Self {
        Self {
            target_fpr,
            fpr_tolerance: 1e-12,
            table_size: 3,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.fpr_tolerance = tolerance;
        self
    }

    pub fn with_table_size(mut self, size: usize) -> Self {
        self.table_size = size;
        self
    }
}

/// Result of calibrating one reference split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Calibration {
    pub threshold: f64,
    pub target_fpr: f64,
    /// Measured on the reference split at `threshold`.
    pub fpr: f64,
    pub precision: f64,
    pub recall: f64,
    /// No candidate met the budget; `threshold` is the highest observed score.
    pub best_effort: bool,
    /// Number of distinct scores considered.
    pub n_candidates: usize,
    /// Audit window around the selected threshold, FPR ascending then
    /// threshold ascending.
    pub table: Vec<ThresholdCandidate>,
}

/// Sweep every distinct score, highest first.
///
/// Budget and selection flags are left unset.
pub fn sweep_candidates(set: &ScoreSet) -> Vec<ThresholdCandidate> {
    let positives = set.positives();
    let negatives = set.negatives();
    let mut tp = 0usize;
    let mut fp = 0usize;

    set.groups()
        .iter()
        .map(|g| {
            tp += g.positives;
            fp += g.negatives;
            ThresholdCandidate {
                threshold: g.score,
                fpr: ratio(fp, negatives),
                precision: ratio(tp, tp + fp),
                recall: ratio(tp, positives),
                tp,
                fp,
                within_budget: false,
                selected: false,
            }
        })
        .collect()
}

/// Pick the threshold for `opts.target_fpr` on the reference split.
pub fn calibrate(set: &ScoreSet, opts: &CalibrationOptions) -> Result<Calibration, CalibrationError> {
    let target = opts.target_fpr;
    if !target.is_finite() || !(0.0..=1.0).contains(&target) {
        return Err(CalibrationError::InvalidTarget(target));
    }
    if set.is_empty() {
        return Err(CalibrationError::EmptyReference);
    }
    if set.negatives() == 0 {
        return Err(CalibrationError::NoNegatives);
    }

    let budget = target + opts.fpr_tolerance.max(0.0);
    let mut candidates = sweep_candidates(set);
    for c in candidates.iter_mut() {
        c.within_budget = c.fpr <= budget;
    }

    let chosen = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.within_budget)
        .max_by(|(_, a), (_, b)| prefer(a, b))
        .map(|(i, _)| i);

    // Non-empty set, so there is at least one candidate.
    let (selected, best_effort) = match chosen {
        Some(i) => (i, false),
        None => (0, true),
    };
    candidates[selected].selected = true;
    let pick = candidates[selected];

    Ok(Calibration {
        threshold: pick.threshold,
        target_fpr: target,
        fpr: pick.fpr,
        precision: pick.precision,
        recall: pick.recall,
        best_effort,
        n_candidates: candidates.len(),
        table: audit_window(&candidates, selected, opts.table_size),
    })
}

/// Ordering where `Greater` means "more preferred".
fn prefer(a: &ThresholdCandidate, b: &ThresholdCandidate) -> Ordering {
    a.fp.cmp(&b.fp)
        .then(a.tp.cmp(&b.tp))
        .then(a.precision.total_cmp(&b.precision))
        .then(a.threshold.total_cmp(&b.threshold))
}

/// Up to `size` sweep rows centred on `selected`, clamped to the sweep ends.
fn audit_window(
    candidates: &[ThresholdCandidate],
    selected: usize,
    size: usize,
) -> Vec<ThresholdCandidate> {
    let size = size.min(candidates.len());
    if size == 0 {
        return Vec::new();
    }
    let start = selected
        .saturating_sub((size - 1) / 2)
        .min(candidates.len() - size);

    let mut table: Vec<ThresholdCandidate> = candidates[start..start + size].to_vec();
    table.sort_by(|a, b| {
        a.fp.cmp(&b.fp)
            .then(a.threshold.total_cmp(&b.threshold))
    });
    table
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
