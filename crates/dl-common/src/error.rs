//! Error types for DetectLab.
//!
//! Structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Remediation hints for humans
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Calibration Error
//!   Reason: reference split 'train' has zero negatives
//!   Fix: Check that the calibration split contains benign records for this label.
//! ```
//!
//! # Agent-Facing Output
//!
//! ```json
//! {
//!   "code": 31,
//!   "category": "calibration",
//!   "message": "calibration failed: reference split 'train' has zero negatives",
//!   "fatal": false
//! }
//! ```

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Result type alias for DetectLab operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Run configuration errors (missing target FPR, invalid splits).
    Config,
    /// Malformed or empty score/label input.
    Input,
    /// Threshold calibration on the reference split.
    Calibration,
    /// Applying a calibrated threshold to the evaluation splits.
    Evaluation,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Input => write!(f, "input"),
            ErrorCategory::Calibration => write!(f, "calibration"),
            ErrorCategory::Evaluation => write!(f, "evaluation"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for DetectLab.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no target_fpr configured for label '{label}'")]
    MissingTargetFpr { label: String },

    // Input errors (20-29)
    #[error("invalid input: {0}")]
    Input(String),

    #[error("split '{split}' is empty")]
    EmptySplit { split: String },

    // Calibration errors (30-39)
    #[error("calibration failed: {0}")]
    Calibration(String),

    #[error("calibration failed: reference split '{split}' not available")]
    MissingReferenceSplit { split: String },

    // Evaluation errors (40-49)
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    #[error("evaluation failed: configured split '{split}' missing")]
    MissingSplit { split: String },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Input errors
    /// - 30-39: Calibration errors
    /// - 40-49: Evaluation errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::MissingTargetFpr { .. } => 11,
            Error::Input(_) => 20,
            Error::EmptySplit { .. } => 21,
            Error::Calibration(_) => 30,
            Error::MissingReferenceSplit { .. } => 31,
            Error::Evaluation(_) => 40,
            Error::MissingSplit { .. } => 41,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::MissingTargetFpr { .. } => ErrorCategory::Config,
            Error::Input(_) | Error::EmptySplit { .. } => ErrorCategory::Input,
            Error::Calibration(_) | Error::MissingReferenceSplit { .. } => {
                ErrorCategory::Calibration
            }
            Error::Evaluation(_) | Error::MissingSplit { .. } => ErrorCategory::Evaluation,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Whether this error aborts the whole run.
    ///
    /// Config and I/O errors are run-level. Everything else is scoped to a
    /// single (label, model) pair and is recorded in its result instead.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Config | ErrorCategory::Io
        )
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => {
                "Run 'dl-core config validate' to check the run configuration."
            }
            Error::MissingTargetFpr { .. } => {
                "Add the label under 'labels' in config.json with a target_fpr value."
            }
            Error::Input(_) => {
                "Check the scores file: every record needs a finite score and a boolean label."
            }
            Error::EmptySplit { .. } => {
                "The split has no scored records. Re-run scoring for this split."
            }
            Error::Calibration(_) => {
                "Check that the calibration split contains benign records for this label."
            }
            Error::MissingReferenceSplit { .. } => {
                "Provide scores for the calibration split, or change 'calibration_split'."
            }
            Error::Evaluation(_) => "Check the scores file for this model.",
            Error::MissingSplit { .. } => {
                "Provide scores for every split listed under 'splits' in the configuration."
            }
            Error::Io(_) => "Check that the file exists and is readable.",
            Error::Json(_) => {
                "Invalid JSON in file. Check syntax with 'jq . <file>' or regenerate it."
            }
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::MissingTargetFpr { .. } => "Missing Target FPR",
            Error::Input(_) => "Invalid Input",
            Error::EmptySplit { .. } => "Empty Split",
            Error::Calibration(_) => "Calibration Error",
            Error::MissingReferenceSplit { .. } => "Missing Calibration Split",
            Error::Evaluation(_) => "Evaluation Error",
            Error::MissingSplit { .. } => "Missing Split",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
        }
    }

    /// Format for terminal output.
    pub fn human(&self) -> String {
        format!(
            "✗ {}\n  Reason: {}\n  Fix: {}",
            self.headline(),
            self,
            self.remediation()
        )
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error aborted the run.
    pub fatal: bool,

    /// Additional structured context (e.g., split name).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = BTreeMap::new();

        match err {
            Error::MissingTargetFpr { label } => {
                context.insert("label".to_string(), serde_json::json!(label));
            }
            Error::EmptySplit { split }
            | Error::MissingReferenceSplit { split }
            | Error::MissingSplit { split } => {
                context.insert("split".to_string(), serde_json::json!(split));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            fatal: err.is_fatal(),
            context,
        }
    }
}

impl StructuredError {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}
