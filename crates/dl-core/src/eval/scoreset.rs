//! Scored records for one (label definition, model, split) triple.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One scored record: raw model score plus ground truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScoredRecord {
    /// Raw model score. Any finite range; only the ordering matters.
    pub score: f64,
    /// Ground truth for the label definition being evaluated.
    pub label: bool,
    /// Opaque record identifier (event id), carried through untouched.
    /// Numeric and boolean ids are accepted and kept in their JSON text form.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "opaque_id"
    )]
    #[schemars(with = "Option<serde_json::Value>")]
    pub record_id: Option<String>,
    /// Slice tags (e.g. `mfa_used:yes`, `country:US`). A record may sit in
    /// any number of slices.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slices: Vec<String>,
}

impl ScoredRecord {
    pub fn new(score: f64, label: bool) -> Self {
        Self {
            score,
            label,
            record_id: None,
            slices: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.record_id = Some(id.into());
        self
    }

    pub fn with_slice(mut self, slice: impl Into<String>) -> Self {
        self.slices.push(slice.into());
        self
    }

    pub fn in_slice(&self, slice: &str) -> bool {
        self.slices.iter().any(|s| s == slice)
    }
}

fn opaque_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error as _;
    use serde_json::Value;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(v @ (Value::Number(_) | Value::Bool(_))) => Ok(Some(v.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "record_id must be a scalar, got {}",
            other
        ))),
    }
}

/// Errors raised while building a ScoreSet.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreSetError {
    #[error("record {index} has non-finite score {score}")]
    NonFiniteScore { index: usize, score: f64 },

    #[error("scores and labels differ in length ({scores} vs {labels})")]
    LengthMismatch { scores: usize, labels: usize },
}

/// All records sharing one distinct score value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreGroup {
    pub score: f64,
    pub positives: usize,
    pub negatives: usize,
}

/// Immutable collection of scored records.
///
/// Records keep their input order. Distinct score values are pre-grouped in
/// descending order so every sweep (PR curve, ROC, threshold search) treats
/// tied scores as one step.
#[derive(Debug, Clone)]
pub struct ScoreSet {
    records: Vec<ScoredRecord>,
    groups: Vec<ScoreGroup>,
    positives: usize,
    negatives: usize,
}

impl ScoreSet {
    /// Build a ScoreSet, rejecting non-finite scores.
    ///
    /// An empty record list is accepted; metrics over it are undefined.
    pub fn new(records: Vec<ScoredRecord>) -> Result<Self, ScoreSetError> {
        if let Some((index, r)) = records
            .iter()
            .enumerate()
            .find(|(_, r)| !r.score.is_finite())
        {
            return Err(ScoreSetError::NonFiniteScore {
                index,
                score: r.score,
            });
        }

        let positives = records.iter().filter(|r| r.label).count();
        let negatives = records.len() - positives;
        let groups = group_descending(&records);

        Ok(Self {
            records,
            groups,
            positives,
            negatives,
        })
    }

    /// Build from parallel score and label columns.
    pub fn from_columns(scores: &[f64], labels: &[bool]) -> Result<Self, ScoreSetError> {
        if scores.len() != labels.len() {
            return Err(ScoreSetError::LengthMismatch {
                scores: scores.len(),
                labels: labels.len(),
            });
        }
        let records = scores
            .iter()
            .zip(labels)
            .map(|(&score, &label)| ScoredRecord::new(score, label))
            .collect();
        Self::new(records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records with a positive ground truth.
    pub fn positives(&self) -> usize {
        self.positives
    }

    /// Number of records with a negative ground truth.
    pub fn negatives(&self) -> usize {
        self.negatives
    }

    pub fn records(&self) -> &[ScoredRecord] {
        &self.records
    }

    /// Distinct scores, highest first.
    pub fn groups(&self) -> &[ScoreGroup] {
        &self.groups
    }

    /// Highest observed score.
    pub fn max_score(&self) -> Option<f64> {
        self.groups.first().map(|g| g.score)
    }
}

fn group_descending(records: &[ScoredRecord]) -> Vec<ScoreGroup> {
    let mut sorted: Vec<(f64, bool)> = records.iter().map(|r| (r.score, r.label)).collect();
    // Scores are finite here, so partial_cmp never fails.
    sorted.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut groups: Vec<ScoreGroup> = Vec::new();
    for (score, label) in sorted {
        match groups.last_mut() {
            Some(g) if g.score == score => {
                if label {
                    g.positives += 1;
                } else {
                    g.negatives += 1;
                }
            }
            _ => groups.push(ScoreGroup {
                // Fold -0.0 into 0.0 so equal scores share one group key.
                score: if score == 0.0 { 0.0 } else { score },
                positives: usize::from(label),
                negatives: usize::from(!label),
            }),
        }
    }
    groups
}
