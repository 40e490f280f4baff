//! DetectLab core library
//!
//! Evaluation and calibration engine for fraud/abuse classifiers:
//! - Rank metrics (PR-AUC as average precision, ROC-AUC with half-credit ties)
//! - Threshold calibration under a per-label FPR budget
//! - Confusion metrics at the fixed threshold on every split
//! - Feature attribution (signed weights vs unsigned importances)
//! - Holdout vs time-window recall stability
//!
//! The binary entry point is in `main.rs`.

pub mod config;
pub mod eval;
pub mod exit_codes;
pub mod logging;
pub mod schema;

pub use eval::{EvaluationInput, EvaluationRun, RunResult};
