//! Threshold-independent ranking metrics.
//!
//! - **PR-AUC** is reported as average precision: the step-function
//!   (non-interpolated) area `Σ_k (R_k − R_{k−1}) · P_k`, one step per
//!   distinct score, highest score first. This is the same convention as
//!   scikit-learn's `average_precision_score`; it is NOT the trapezoidal
//!   area, which overstates PR-AUC on imbalanced data.
//! - **ROC-AUC** is the Mann–Whitney probability that a random positive
//!   outscores a random negative, with ties counted as ½. Counting is done
//!   in integers so perfectly separated and fully tied sets give exactly
//!   1.0 and 0.5.
//!
//! Both metrics are undefined unless the split has at least one positive and
//! one negative. That case is returned as an explicit [`UndefinedReason`],
//! never as a sentinel 0.0 or 1.0.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::scoreset::ScoreSet;

/// Why a rank metric could not be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedReason {
    /// The split has no records.
    Empty,
    /// The split has no positive records.
    NoPositives,
    /// The split has no negative records.
    NoNegatives,
}

impl std::fmt::Display for UndefinedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UndefinedReason::Empty => write!(f, "empty"),
            UndefinedReason::NoPositives => write!(f, "no_positives"),
            UndefinedReason::NoNegatives => write!(f, "no_negatives"),
        }
    }
}

/// PR-AUC and ROC-AUC for one split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RankResult {
    pub pr_auc: f64,
    pub roc_auc: f64,
}

/// Boundary form of a rank computation: nulls instead of numbers when undefined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RankSummary {
    pub pr_auc: Option<f64>,
    pub roc_auc: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undefined: Option<UndefinedReason>,
}

impl From<Result<RankResult, UndefinedReason>> for RankSummary {
    fn from(result: Result<RankResult, UndefinedReason>) -> Self {
        match result {
            Ok(r) => RankSummary {
                pr_auc: Some(r.pr_auc),
                roc_auc: Some(r.roc_auc),
                undefined: None,
            },
            Err(reason) => RankSummary {
                pr_auc: None,
                roc_auc: None,
                undefined: Some(reason),
            },
        }
    }
}

fn check_defined(set: &ScoreSet) -> Result<(), UndefinedReason> {
    if set.is_empty() {
        return Err(UndefinedReason::Empty);
    }
    if set.positives() == 0 {
        return Err(UndefinedReason::NoPositives);
    }
    if set.negatives() == 0 {
        return Err(UndefinedReason::NoNegatives);
    }
    Ok(())
}

/// Compute PR-AUC and ROC-AUC.
pub fn compute_rank_metrics(set: &ScoreSet) -> Result<RankResult, UndefinedReason> {
    Ok(RankResult {
        pr_auc: average_precision(set)?,
        roc_auc: roc_auc(set)?,
    })
}

/// Average precision (step-function PR-AUC).
pub fn average_precision(set: &ScoreSet) -> Result<f64, UndefinedReason> {
    check_defined(set)?;

    let total_pos = set.positives() as f64;
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut weighted = 0.0;

    for g in set.groups() {
        tp += g.positives;
        fp += g.negatives;
        if g.positives > 0 {
            let precision = tp as f64 / (tp + fp) as f64;
            weighted += g.positives as f64 * precision;
        }
    }

    Ok(weighted / total_pos)
}

/// ROC-AUC with ties counted as one half.
pub fn roc_auc(set: &ScoreSet) -> Result<f64, UndefinedReason> {
    check_defined(set)?;

    // Twice the Mann–Whitney U statistic, accumulated lowest score first.
    let mut negatives_below: u128 = 0;
    let mut twice_u: u128 = 0;
    for g in set.groups().iter().rev() {
        let pos = g.positives as u128;
        let neg = g.negatives as u128;
        twice_u += pos * (2 * negatives_below + neg);
        negatives_below += neg;
    }

    let pairs = 2 * set.positives() as u128 * set.negatives() as u128;
    Ok(twice_u as f64 / pairs as f64)
}
