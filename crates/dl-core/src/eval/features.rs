//! Per-model feature attribution.
//!
//! Linear models report signed coefficients, tree ensembles report
//! non-negative importances. The two are kept apart end to end: a signed
//! value serializes as `weight`, an unsigned one as `importance`.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a model expresses feature contributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// Signed coefficients (sign gives direction of risk).
    Signed,
    /// Non-negative importances (no direction).
    Unsigned,
}

impl std::fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureKind::Signed => write!(f, "signed"),
            FeatureKind::Unsigned => write!(f, "unsigned"),
        }
    }
}

/// A model's full contribution table, keyed by feature name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FeatureTable {
    pub kind: FeatureKind,
    pub values: BTreeMap<String, f64>,
}

impl FeatureTable {
    pub fn signed<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            kind: FeatureKind::Signed,
            values: values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn unsigned<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            kind: FeatureKind::Unsigned,
            values: values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// One feature's contribution, tagged by kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub enum Contribution {
    #[serde(rename = "weight")]
    Signed(f64),
    #[serde(rename = "importance")]
    Unsigned(f64),
}

impl Contribution {
    pub fn value(&self) -> f64 {
        match *self {
            Contribution::Signed(v) | Contribution::Unsigned(v) => v,
        }
    }

    /// Sort key: |weight| for signed, importance for unsigned.
    pub fn magnitude(&self) -> f64 {
        match *self {
            Contribution::Signed(v) => v.abs(),
            Contribution::Unsigned(v) => v,
        }
    }
}

/// A ranked feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FeatureAttribution {
    pub feature: String,
    #[serde(flatten)]
    pub contribution: Contribution,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    #[error("feature '{feature}' has non-finite value {value}")]
    NonFinite { feature: String, value: f64 },

    #[error("feature '{feature}' has negative importance {value}")]
    NegativeImportance { feature: String, value: f64 },
}

/// Rank features by contribution and keep the top `n`.
///
/// Ties on magnitude break by feature name so output is deterministic.
pub fn attribute(table: &FeatureTable, n: usize) -> Result<Vec<FeatureAttribution>, FeatureError> {
    let mut ranked = Vec::with_capacity(table.values.len());
    for (name, &value) in &table.values {
        if !value.is_finite() {
            return Err(FeatureError::NonFinite {
                feature: name.clone(),
                value,
            });
        }
        let contribution = match table.kind {
            FeatureKind::Signed => Contribution::Signed(value),
            FeatureKind::Unsigned if value < 0.0 => {
                return Err(FeatureError::NegativeImportance {
                    feature: name.clone(),
                    value,
                });
            }
            FeatureKind::Unsigned => Contribution::Unsigned(value),
        };
        ranked.push(FeatureAttribution {
            feature: name.clone(),
            contribution,
        });
    }

    ranked.sort_by(|a, b| {
        b.contribution
            .magnitude()
            .total_cmp(&a.contribution.magnitude())
            .then_with(|| a.feature.cmp(&b.feature))
    });
    ranked.truncate(n);
    Ok(ranked)
}
