//! Evaluation and calibration engine.
//!
//! Data flow for one (label, model):
//!
//! ```text
//! scored records ─► ScoreSet ─► calibrate (calibration split) ─► fixed threshold
//!                                                                    │
//!            every configured split ─► rank metrics + confusion ◄────┘
//!                                      + per-slice rank + confusion
//!
//! feature table ─► attribute (once per model)
//! all ModelResults ─► stability (holdout vs time)
//! ```

pub mod confusion;
pub mod features;
pub mod input;
pub mod rank;
pub mod result;
pub mod run;
pub mod scoreset;
pub mod slices;
pub mod stability;
pub mod threshold;

pub use confusion::{evaluate, ConfusionCounts, ConfusionResult, ConfusionWarning};
pub use features::{
    attribute, Contribution, FeatureAttribution, FeatureError, FeatureKind, FeatureTable,
};
pub use input::{EvaluationInput, InputStatus, LabelInput, ModelInput, SplitRecords};
pub use rank::{average_precision, compute_rank_metrics, roc_auc, RankResult, RankSummary, UndefinedReason};
pub use result::{
    LabelMeta, LabelResult, LabelStatus, ModelResult, ModelStatus, RunResult, RunSummary,
    SplitResult,
};
pub use run::{evaluate_model, EvaluationRun};
pub use slices::{evaluate_slices, SliceResult};
pub use scoreset::{ScoreGroup, ScoreSet, ScoreSetError, ScoredRecord};
pub use stability::{
    analyze, Drift, StabilityExclusion, StabilityOptions, StabilityReport, StabilityRow,
    StabilityStatus,
};
pub use threshold::{
    calibrate, sweep_candidates, Calibration, CalibrationError, CalibrationOptions,
    ThresholdCandidate,
};

impl From<ScoreSetError> for dl_common::Error {
    fn from(err: ScoreSetError) -> Self {
        dl_common::Error::Input(err.to_string())
    }
}

impl From<CalibrationError> for dl_common::Error {
    fn from(err: CalibrationError) -> Self {
        match err {
            CalibrationError::EmptyReference => dl_common::Error::Input(err.to_string()),
            CalibrationError::NoNegatives | CalibrationError::InvalidTarget(_) => {
                dl_common::Error::Calibration(err.to_string())
            }
        }
    }
}

impl From<FeatureError> for dl_common::Error {
    fn from(err: FeatureError) -> Self {
        dl_common::Error::Input(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dl_common::ErrorCategory;

    #[test]
    fn test_engine_errors_map_to_taxonomy() {
        let e: dl_common::Error = CalibrationError::NoNegatives.into();
        assert_eq!(e.category(), ErrorCategory::Calibration);
        assert!(!e.is_fatal());

        let e: dl_common::Error = CalibrationError::EmptyReference.into();
        assert_eq!(e.category(), ErrorCategory::Input);

        let e: dl_common::Error = ScoreSetError::NonFiniteScore {
            index: 3,
            score: f64::NAN,
        }
        .into();
        assert_eq!(e.category(), ErrorCategory::Input);
        assert!(e.to_string().contains("record 3"));

        let e: dl_common::Error = FeatureError::NegativeImportance {
            feature: "f".to_string(),
            value: -1.0,
        }
        .into();
        assert_eq!(e.code(), 20);
    }
}
