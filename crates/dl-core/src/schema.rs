//! JSON Schema generation for input and output documents.
//!
//! # Usage
//!
//! ```bash
//! dl-core schema --list
//! dl-core schema RunResult
//! dl-core schema --all
//! ```

use schemars::schema_for;
use serde_json::Value;
use std::collections::BTreeMap;

pub use crate::eval::{
    Calibration, ConfusionResult, EvaluationInput, FeatureAttribution, FeatureTable, LabelResult,
    ModelInput, ModelResult, RankSummary, RunResult, ScoredRecord, SliceResult, StabilityReport,
    StabilityRow, ThresholdCandidate,
};
pub use dl_common::StructuredError;
pub use dl_config::{ConfigSnapshot, RunConfig};

/// Available schema types with their descriptions.
pub fn available_schemas() -> Vec<(&'static str, &'static str)> {
    vec![
        // Input documents
        ("RunConfig", "Run configuration (config.json)"),
        ("EvaluationInput", "Scores document for an evaluation run"),
        ("ModelInput", "Scores and features for one model"),
        ("ScoredRecord", "Single (score, label) record"),
        ("FeatureTable", "Signed or unsigned feature contributions"),
        // Output documents
        ("RunResult", "Complete evaluation run result tree"),
        ("LabelResult", "All models under one label definition"),
        ("ModelResult", "Per (label, model) evaluation bundle"),
        ("RankSummary", "PR-AUC and ROC-AUC, null when undefined"),
        ("ConfusionResult", "Metrics at the fixed threshold for one split"),
        ("SliceResult", "Rank and confusion metrics for one record slice"),
        ("ThresholdCandidate", "One row of the calibration sweep"),
        ("Calibration", "Threshold calibration on a single split"),
        ("FeatureAttribution", "Ranked feature with weight or importance"),
        ("StabilityReport", "Holdout vs time recall stability"),
        ("StabilityRow", "Stability comparison for one (label, model)"),
        ("ConfigSnapshot", "Configuration provenance recorded in results"),
        ("StructuredError", "Machine-readable error payload"),
    ]
}

/// Generate JSON Schema for a type by name.
///
/// Returns None if the type is unknown.
pub fn generate_schema(type_name: &str) -> Option<Value> {
    let schema = match type_name {
        "RunConfig" => schema_for!(RunConfig),
        "EvaluationInput" => schema_for!(EvaluationInput),
        "ModelInput" => schema_for!(ModelInput),
        "ScoredRecord" => schema_for!(ScoredRecord),
        "FeatureTable" => schema_for!(FeatureTable),
        "RunResult" => schema_for!(RunResult),
        "LabelResult" => schema_for!(LabelResult),
        "ModelResult" => schema_for!(ModelResult),
        "RankSummary" => schema_for!(RankSummary),
        "ConfusionResult" => schema_for!(ConfusionResult),
        "SliceResult" => schema_for!(SliceResult),
        "ThresholdCandidate" => schema_for!(ThresholdCandidate),
        "Calibration" => schema_for!(Calibration),
        "FeatureAttribution" => schema_for!(FeatureAttribution),
        "StabilityReport" => schema_for!(StabilityReport),
        "StabilityRow" => schema_for!(StabilityRow),
        "ConfigSnapshot" => schema_for!(ConfigSnapshot),
        "StructuredError" => schema_for!(StructuredError),
        _ => return None,
    };

    serde_json::to_value(schema).ok()
}

/// Generate all schemas as a map from type name to schema.
pub fn generate_all_schemas() -> BTreeMap<String, Value> {
    let mut schemas = BTreeMap::new();
    for (name, _desc) in available_schemas() {
        if let Some(schema) = generate_schema(name) {
            schemas.insert(name.to_string(), schema);
        }
    }
    schemas
}
