//! Per-slice diagnostics at a model's fixed threshold.
//!
//! Records carry free-form slice tags; every tag seen on a split becomes a
//! slice. Slices overlap, and a slice with no records is never reported.

use std::collections::{BTreeMap, BTreeSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::confusion::{evaluate, ConfusionResult};
use super::rank::{compute_rank_metrics, RankSummary};
use super::scoreset::ScoreSet;

/// Rank and confusion metrics for the records of one slice.
///
/// `rows`, `positives` and `pos_rate` come from the flattened confusion block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SliceResult {
    pub rank: RankSummary,
    #[serde(flatten)]
    pub confusion: ConfusionResult,
}

/// Evaluate every slice tagged in `set` at `threshold`.
pub fn evaluate_slices(set: &ScoreSet, threshold: f64) -> BTreeMap<String, SliceResult> {
    let tags: BTreeSet<&str> = set
        .records()
        .iter()
        .flat_map(|r| r.slices.iter().map(String::as_str))
        .collect();

    let mut out = BTreeMap::new();
    for tag in tags {
        let members: Vec<_> = set
            .records()
            .iter()
            .filter(|r| r.in_slice(tag))
            .cloned()
            .collect();
        // Members come from a validated set, so this cannot fail.
        let Ok(subset) = ScoreSet::new(members) else {
            continue;
        };
        if subset.is_empty() {
            continue;
        }
        out.insert(
            tag.to_string(),
            SliceResult {
                rank: RankSummary::from(compute_rank_metrics(&subset)),
                confusion: evaluate(&subset, threshold),
            },
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::confusion::ConfusionWarning;
    use crate::eval::rank::UndefinedReason;
    use crate::eval::scoreset::ScoredRecord;

    fn tagged_set() -> ScoreSet {
        ScoreSet::new(vec![
            ScoredRecord::new(0.9, true).with_slice("mfa_used:no").with_slice("country:US"),
            ScoredRecord::new(0.8, false).with_slice("mfa_used:no"),
            ScoredRecord::new(0.6, true).with_slice("mfa_used:yes").with_slice("country:US"),
            ScoredRecord::new(0.2, false).with_slice("mfa_used:yes"),
            ScoredRecord::new(0.1, false),
        ])
        .unwrap()
    }

    #[test]
    fn test_one_entry_per_tag() {
        let slices = evaluate_slices(&tagged_set(), 0.7);
        let names: Vec<&str> = slices.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["country:US", "mfa_used:no", "mfa_used:yes"]);
    }

    #[test]
    fn test_slice_metrics_at_fixed_threshold() {
        let slices = evaluate_slices(&tagged_set(), 0.7);

        let no_mfa = &slices["mfa_used:no"];
        assert_eq!(no_mfa.confusion.rows, 2);
        assert_eq!(no_mfa.confusion.positives, 1);
        assert_eq!(no_mfa.confusion.threshold_used, 0.7);
        assert_eq!(no_mfa.confusion.recall, 1.0);
        assert_eq!(no_mfa.confusion.fpr, 1.0);
        assert_eq!(no_mfa.rank.roc_auc, Some(1.0));

        let mfa = &slices["mfa_used:yes"];
        assert_eq!(mfa.confusion.recall, 0.0);
        assert_eq!(mfa.confusion.fpr, 0.0);
    }

    #[test]
    fn test_single_class_slice_is_undefined_not_dropped() {
        let slices = evaluate_slices(&tagged_set(), 0.7);
        let us = &slices["country:US"];
        assert_eq!(us.rank.pr_auc, None);
        assert_eq!(us.rank.undefined, Some(UndefinedReason::NoNegatives));
        assert!(us.confusion.warnings.contains(&ConfusionWarning::NoActualNegatives));
    }

    #[test]
    fn test_untagged_set_has_no_slices() {
        let set = ScoreSet::from_columns(&[0.9, 0.1], &[true, false]).unwrap();
        assert!(evaluate_slices(&set, 0.5).is_empty());
    }

    #[test]
    fn test_flattened_json_shape() {
        let slices = evaluate_slices(&tagged_set(), 0.7);
        let json = serde_json::to_value(&slices["mfa_used:no"]).unwrap();
        assert_eq!(json["rows"], 2);
        assert_eq!(json["positives"], 1);
        assert_eq!(json["pos_rate"], 0.5);
        assert!(json["rank"]["pr_auc"].is_number());
    }
}
