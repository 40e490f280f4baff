//! Evaluation input document: scores, labels and feature tables per
//! (label definition, model, split).

use std::collections::BTreeMap;
use std::path::Path;

use dl_common::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::features::FeatureTable;
use super::scoreset::ScoredRecord;

/// Upstream state of a model before evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum InputStatus {
    #[default]
    Ok,
    /// Scores could not be produced (fit or load failure).
    Failed,
    /// Model disabled for this run.
    Skipped,
}

/// Records for one split of one model.
///
/// Rows that fail to parse are kept as raw JSON so the failure stays with
/// the owning model instead of rejecting the whole document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum SplitRecords {
    Parsed(Vec<ScoredRecord>),
    Unparsed(serde_json::Value),
}

impl SplitRecords {
    /// The parsed records, or the reason they could not be read.
    pub fn records(&self) -> std::result::Result<&[ScoredRecord], String> {
        match self {
            SplitRecords::Parsed(records) => Ok(records),
            SplitRecords::Unparsed(raw) => {
                let reason = match serde_json::from_value::<Vec<ScoredRecord>>(raw.clone()) {
                    Err(e) => e.to_string(),
                    Ok(_) => "records could not be read".to_string(),
                };
                Err(format!("malformed records: {}", reason))
            }
        }
    }
}

impl From<Vec<ScoredRecord>> for SplitRecords {
    fn from(records: Vec<ScoredRecord>) -> Self {
        SplitRecords::Parsed(records)
    }
}

/// Scores and features for one model under one label definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModelInput {
    #[serde(default)]
    pub status: InputStatus,

    /// Upstream failure reason. Any value marks the model failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<FeatureTable>,

    /// Scored records keyed by split name.
    #[serde(default)]
    pub splits: BTreeMap<String, SplitRecords>,
}

impl ModelInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// A model whose scores never materialized.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: InputStatus::Failed,
            error: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn skipped() -> Self {
        Self {
            status: InputStatus::Skipped,
            ..Self::default()
        }
    }

    pub fn with_split(mut self, split: impl Into<String>, records: Vec<ScoredRecord>) -> Self {
        self.splits.insert(split.into(), records.into());
        self
    }

    /// Add a split from parallel score and label columns.
    pub fn with_columns(self, split: impl Into<String>, scores: &[f64], labels: &[bool]) -> Self {
        let records = scores
            .iter()
            .zip(labels)
            .map(|(&s, &l)| ScoredRecord::new(s, l))
            .collect();
        self.with_split(split, records)
    }

    pub fn with_features(mut self, features: FeatureTable) -> Self {
        self.features = Some(features);
        self
    }

    /// Effective status after folding in `error`.
    pub fn effective_status(&self) -> InputStatus {
        match (self.status, &self.error) {
            (InputStatus::Skipped, None) => InputStatus::Skipped,
            (InputStatus::Ok, None) => InputStatus::Ok,
            _ => InputStatus::Failed,
        }
    }
}

/// All models evaluated under one label definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LabelInput {
    #[serde(default)]
    pub models: BTreeMap<String, ModelInput>,
}

/// Top-level input document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EvaluationInput {
    #[serde(default)]
    pub labels: BTreeMap<String, LabelInput>,
}

impl EvaluationInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(
        mut self,
        label: impl Into<String>,
        model: impl Into<String>,
        input: ModelInput,
    ) -> Self {
        self.labels
            .entry(label.into())
            .or_default()
            .models
            .insert(model.into(), input);
        self
    }

    /// Parse an input document from JSON text.
    ///
    /// Only the labels, models and splits skeleton must be well formed here;
    /// malformed records surface later as a failure of their model.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Input(format!("malformed input document: {}", e)))
    }

    /// Read and parse an input document.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Total number of (label, model) pairs.
    pub fn n_models(&self) -> usize {
        self.labels.values().map(|l| l.models.len()).sum()
    }
}
