//! End-to-end tests for EvaluationRun over a multi-label, multi-model input.

use dl_config::RunConfig;
use dl_core::eval::{
    Drift, EvaluationInput, EvaluationRun, FeatureTable, LabelStatus, ModelInput, ModelStatus,
    ScoredRecord, StabilityStatus,
};

fn config() -> RunConfig {
    RunConfig::default()
        .with_label("label_replicators", 0.34)
        .with_label("label_the_mule", 0.34)
        .with_label("label_the_chameleon", 0.01)
}

/// Calibrates to 0.7 on train; holdout keeps recall, time loses half.
fn decaying_model() -> ModelInput {
    ModelInput::new()
        .with_columns(
            "train",
            &[0.9, 0.8, 0.7, 0.6, 0.1],
            &[true, false, true, false, false],
        )
        .with_columns(
            "time_eval",
            &[0.95, 0.4, 0.3, 0.2],
            &[true, true, false, false],
        )
        .with_columns(
            "user_holdout",
            &[0.85, 0.75, 0.3, 0.2],
            &[true, true, false, false],
        )
}

fn input() -> EvaluationInput {
    EvaluationInput::new()
        .with_model(
            "label_replicators",
            "logreg",
            decaying_model().with_features(FeatureTable::signed([
                ("fail_ratio_1h", 1.4),
                ("n_distinct_ips_24h", -2.1),
                ("burst_score", 0.2),
            ])),
        )
        .with_model(
            "label_replicators",
            "rf",
            decaying_model().with_features(FeatureTable::unsigned([
                ("fail_ratio_1h", 0.3),
                ("n_distinct_ips_24h", 0.6),
            ])),
        )
        .with_model("label_replicators", "hgb", ModelInput::skipped())
        .with_model(
            "label_the_mule",
            "logreg",
            ModelInput::failed("model artifact missing"),
        )
        .with_model(
            "label_the_mule",
            "rf",
            // No calibration split.
            ModelInput::new()
                .with_columns("time_eval", &[0.5, 0.1], &[true, false])
                .with_columns("user_holdout", &[0.5, 0.1], &[true, false]),
        )
}

#[test]
fn full_run_shapes_and_counts() {
    let run = EvaluationRun::new(config()).unwrap();
    let result = run.execute(&input()).unwrap();

    assert_eq!(result.summary.n_models, 5);
    assert_eq!(result.summary.n_ok, 2);
    assert_eq!(result.summary.n_failed, 2);
    assert_eq!(result.summary.n_skipped, 1);
    assert!(result.is_partial());

    let replicators = &result.labels["label_replicators"];
    assert_eq!(replicators.status, LabelStatus::Ok);
    assert_eq!(replicators.meta.n_skipped, 1);
    assert_eq!(replicators.meta.row_counts_per_split["train"], 5);

    let mule = &result.labels["label_the_mule"];
    assert_eq!(mule.status, LabelStatus::Failed);
    let rf = &mule.models["rf"];
    assert_eq!(rf.status, ModelStatus::Failed);
    assert_eq!(rf.error_code, Some(31));

    assert_eq!(result.labels["label_the_chameleon"].status, LabelStatus::Empty);
}

#[test]
fn threshold_fixed_across_splits() {
    let result = EvaluationRun::new(config()).unwrap().execute(&input()).unwrap();
    let logreg = result.model("label_replicators", "logreg").unwrap();

    assert_eq!(logreg.threshold_for_fpr, Some(0.7));
    for (split, r) in &logreg.per_split {
        assert_eq!(r.confusion.threshold_used, 0.7, "split {split}");
    }
    assert_eq!(logreg.per_split["user_holdout"].confusion.recall, 1.0);
    assert_eq!(logreg.per_split["time_eval"].confusion.recall, 0.5);
    // Per-split recalibration is reported but not applied.
    assert_eq!(logreg.per_split["time_eval"].threshold_for_fpr, Some(0.4));
    assert_eq!(logreg.per_split["user_holdout"].threshold_for_fpr, Some(0.75));
}

#[test]
fn split_without_negatives_has_null_split_threshold() {
    let model = decaying_model().with_columns("time_eval", &[0.9, 0.1], &[true, true]);
    let input = EvaluationInput::new().with_model("label_replicators", "logreg", model);
    let result = EvaluationRun::new(config()).unwrap().execute(&input).unwrap();
    let logreg = result.model("label_replicators", "logreg").unwrap();

    assert_eq!(logreg.status, ModelStatus::Ok);
    assert_eq!(logreg.per_split["time_eval"].threshold_for_fpr, None);
    assert_eq!(logreg.per_split["time_eval"].confusion.threshold_used, 0.7);

    let json = serde_json::to_value(&result).unwrap();
    let time = &json["labels"]["label_replicators"]["models"]["logreg"]["per_split"]["time_eval"];
    assert!(time["threshold_for_fpr"].is_null());
}

#[test]
fn malformed_records_fail_only_their_model() {
    let doc = r#"{"labels": {"label_replicators": {"models": {
        "logreg": {"splits": {
            "train": [
                {"score": 0.9, "label": true, "record_id": 17},
                {"score": 0.8, "label": false, "record_id": "u-2"},
                {"score": 0.7, "label": true},
                {"score": 0.6, "label": false},
                {"score": 0.1, "label": false}
            ],
            "time_eval": [{"score": 0.95, "label": true}, {"score": 0.2, "label": false}],
            "user_holdout": [{"score": 0.85, "label": true}, {"score": 0.3, "label": false}]
        }},
        "rf": {"splits": {
            "train": [{"score": null, "label": true}, {"score": 0.2, "label": false}],
            "time_eval": [{"score": 0.95, "label": 1}],
            "user_holdout": [{"score": 0.85, "label": true}]
        }}
    }}}}"#;
    let input = EvaluationInput::from_json(doc).unwrap();
    let result = EvaluationRun::new(config()).unwrap().execute(&input).unwrap();

    assert_eq!(result.summary.n_ok, 1);
    assert_eq!(result.summary.n_failed, 1);

    let logreg = result.model("label_replicators", "logreg").unwrap();
    assert_eq!(logreg.threshold_for_fpr, Some(0.7));

    let rf = result.model("label_replicators", "rf").unwrap();
    assert_eq!(rf.status, ModelStatus::Failed);
    assert_eq!(rf.error_code, Some(20));
    assert!(rf.error.as_deref().unwrap().contains("split 'train'"));
}

#[test]
fn slices_reported_per_split() {
    let holdout = vec![
        ScoredRecord::new(0.85, true).with_slice("mfa_used:no"),
        ScoredRecord::new(0.75, true).with_slice("mfa_used:yes"),
        ScoredRecord::new(0.3, false).with_slice("mfa_used:yes"),
        ScoredRecord::new(0.2, false).with_slice("mfa_used:no"),
    ];
    let model = decaying_model().with_split("user_holdout", holdout);
    let input = EvaluationInput::new().with_model("label_replicators", "logreg", model);
    let result = EvaluationRun::new(config()).unwrap().execute(&input).unwrap();

    let json = serde_json::to_value(&result).unwrap();
    let per_split = &json["labels"]["label_replicators"]["models"]["logreg"]["per_split"];
    let yes = &per_split["user_holdout"]["slices"]["mfa_used:yes"];
    assert_eq!(yes["rows"], 2);
    assert_eq!(yes["positives"], 1);
    assert_eq!(yes["threshold_used"], 0.7);
    assert_eq!(yes["recall"], 1.0);
    assert_eq!(yes["rank"]["roc_auc"], 1.0);
    assert!(per_split["time_eval"].get("slices").is_none());
}

#[test]
fn stability_counts_ok_on_both_splits() {
    let result = EvaluationRun::new(config()).unwrap().execute(&input()).unwrap();
    let stability = &result.stability;

    assert_eq!(stability.status, StabilityStatus::Ok);
    assert_eq!(stability.primary_split, "user_holdout");
    assert_eq!(stability.rows.len(), 2);
    assert_eq!(stability.excluded.len(), 3);
    for row in &stability.rows {
        assert_eq!(row.delta_recall, 0.5);
        assert_eq!(row.drift, Drift::TemporalDecay);
    }
    assert_eq!(stability.largest_shifts.len(), 2);
}

#[test]
fn features_keep_their_kind() {
    let result = EvaluationRun::new(config()).unwrap().execute(&input()).unwrap();
    let json = serde_json::to_value(&result).unwrap();
    let models = &json["labels"]["label_replicators"]["models"];

    let logreg_top = &models["logreg"]["top_features"][0];
    assert_eq!(logreg_top["feature"], "n_distinct_ips_24h");
    assert_eq!(logreg_top["weight"], -2.1);
    assert!(logreg_top.get("importance").is_none());

    let rf_top = &models["rf"]["top_features"][0];
    assert_eq!(rf_top["importance"], 0.6);
    assert!(rf_top.get("weight").is_none());
}

#[test]
fn single_class_split_serializes_null_auc() {
    let model = decaying_model().with_columns("time_eval", &[0.9, 0.1], &[false, false]);
    let input = EvaluationInput::new().with_model("label_replicators", "logreg", model);
    let result = EvaluationRun::new(config()).unwrap().execute(&input).unwrap();

    let json = serde_json::to_value(&result).unwrap();
    let time = &json["labels"]["label_replicators"]["models"]["logreg"]["per_split"]["time_eval"];
    assert!(time["rank"]["pr_auc"].is_null());
    assert!(time["rank"]["roc_auc"].is_null());
    assert_eq!(time["rank"]["undefined"], "no_positives");
    assert_eq!(time["confusion"]["recall"], 0.0);
    assert_eq!(time["confusion"]["warnings"][0], "no_actual_positives");

    assert_eq!(result.stability.rows[0].drift, Drift::Indeterminate);
}

#[test]
fn everything_failed_makes_stability_partial() {
    let input = EvaluationInput::new()
        .with_model("label_replicators", "a", ModelInput::failed("fit error"))
        .with_model("label_replicators", "b", ModelInput::failed("fit error"));
    let result = EvaluationRun::new(config()).unwrap().execute(&input).unwrap();
    assert_eq!(result.stability.status, StabilityStatus::Partial);
    assert!(result.stability.rows.is_empty());
    assert_eq!(result.stability.excluded.len(), 2);
}

#[test]
fn extra_input_splits_are_ignored() {
    let model = decaying_model().with_columns("scratch", &[0.5], &[true]);
    let input = EvaluationInput::new().with_model("label_replicators", "logreg", model);
    let result = EvaluationRun::new(config()).unwrap().execute(&input).unwrap();
    let logreg = result.model("label_replicators", "logreg").unwrap();
    assert!(!logreg.per_split.contains_key("scratch"));
    assert_eq!(logreg.per_split.len(), 3);
}

#[test]
fn json_document_round_trip_through_run() {
    let doc = serde_json::to_string(&input()).unwrap();
    let parsed = EvaluationInput::from_json(&doc).unwrap();
    let a = EvaluationRun::new(config()).unwrap().execute(&parsed).unwrap();
    let b = EvaluationRun::new(config()).unwrap().execute(&input()).unwrap();
    assert_eq!(a.labels, b.labels);
}

#[test]
fn config_snapshot_recorded() {
    let result = EvaluationRun::new(config()).unwrap().execute(&input()).unwrap();
    assert_eq!(result.config.calibration_split, "train");
    assert_eq!(result.config.target_fprs["label_the_chameleon"], 0.01);
    assert_eq!(result.schema_version, dl_common::SCHEMA_VERSION);
}
