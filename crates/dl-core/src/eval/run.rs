//! Evaluation run orchestration.
//!
//! Label definitions × models are evaluated independently on a rayon pool.
//! A failing (label, model) is recorded as `failed` and never aborts the
//! batch; only run-level configuration problems do.

use std::collections::BTreeMap;

use chrono::Utc;
use dl_common::{Error, Result, RunId, SCHEMA_VERSION};
use dl_config::{validate_run_config, ConfigSnapshot, ConfigSource, RunConfig};
use rayon::prelude::*;

use super::confusion::evaluate;
use super::features::attribute;
use super::input::{EvaluationInput, InputStatus, ModelInput, SplitRecords};
use super::rank::{compute_rank_metrics, RankSummary};
use super::result::{
    finite, LabelMeta, LabelResult, LabelStatus, ModelResult, ModelStatus, RunResult, RunSummary,
    SplitResult,
};
use super::scoreset::ScoreSet;
use super::slices::evaluate_slices;
use super::stability::{analyze, StabilityOptions};
use super::threshold::{calibrate, CalibrationOptions};
use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};

/// One configured evaluation run.
#[derive(Debug, Clone)]
pub struct EvaluationRun {
    config: RunConfig,
    snapshot: ConfigSnapshot,
    run_id: RunId,
    log: LogContext,
}

impl EvaluationRun {
    /// Validate `config` and prepare a run.
    pub fn new(config: RunConfig) -> Result<Self> {
        validate_run_config(&config).map_err(|e| Error::Config(e.to_string()))?;
        let snapshot = ConfigSnapshot::new(&config, None, &ConfigSource::BuiltinDefault);
        let run_id = RunId::new();
        let log = LogContext::for_run(&run_id);
        Ok(Self {
            config,
            snapshot,
            run_id,
            log,
        })
    }

    /// Record where the configuration came from.
    pub fn with_snapshot(mut self, snapshot: ConfigSnapshot) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Evaluate every (label, model) in `input`.
    ///
    /// Fails only when a label in the input has no configured target FPR,
    /// or the worker pool cannot be built. Both happen before any model runs.
    pub fn execute(&self, input: &EvaluationInput) -> Result<RunResult> {
        let mut jobs: Vec<(&str, &str, &ModelInput, f64)> = Vec::new();
        for (label, label_input) in &input.labels {
            let target_fpr = self
                .config
                .target_fpr(label)
                .ok_or_else(|| Error::MissingTargetFpr {
                    label: label.clone(),
                })?;
            for (model, model_input) in &label_input.models {
                jobs.push((label.as_str(), model.as_str(), model_input, target_fpr));
            }
        }

        log_event!(
            self.log,
            INFO,
            event_names::RUN_STARTED,
            Stage::Init,
            "Starting evaluation run",
            n_labels = input.labels.len(),
            n_models = jobs.len(),
            calibration_split = self.config.calibration_split.as_str()
        );

        let evaluate_job = |&(label, model, model_input, target_fpr): &(&str, &str, &ModelInput, f64)| {
            let result = evaluate_model(label, model, model_input, target_fpr, &self.config, &self.log);
            ((label.to_string(), model.to_string()), result)
        };

        let finished: Vec<((String, String), ModelResult)> = match self.config.workers {
            Some(n) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| Error::Config(format!("cannot start {} workers: {}", n, e)))?;
                pool.install(|| jobs.par_iter().map(evaluate_job).collect())
            }
            None => jobs.par_iter().map(evaluate_job).collect(),
        };

        let mut models_by_label: BTreeMap<String, BTreeMap<String, ModelResult>> = BTreeMap::new();
        for ((label, model), result) in finished {
            models_by_label.entry(label).or_default().insert(model, result);
        }

        let mut labels = BTreeMap::new();
        for (label, label_input) in &input.labels {
            let models = models_by_label.remove(label).unwrap_or_default();
            let target_fpr = self.config.target_fpr(label).unwrap_or_default();
            labels.insert(label.clone(), assemble_label(target_fpr, models, label_input.models.iter()));
        }
        // Configured labels with no scores still show up, as empty.
        for (label, label_config) in &self.config.labels {
            labels.entry(label.clone()).or_insert_with(|| LabelResult {
                target_fpr: label_config.target_fpr,
                status: LabelStatus::Empty,
                models: BTreeMap::new(),
                meta: LabelMeta {
                    notes: vec!["no models supplied for this label".to_string()],
                    ..LabelMeta::default()
                },
            });
        }

        let stability = analyze(
            &labels,
            &StabilityOptions {
                primary_split: self.config.primary_split.clone(),
                time_split: self.config.time_split.clone(),
                tolerance: self.config.stability_tolerance,
                top_n: self.config.stability_top3_n,
            },
        );
        log_event!(
            self.log,
            INFO,
            event_names::STABILITY_FINISHED,
            Stage::Stability,
            "Stability analysis finished",
            status = stability.status.to_string().as_str(),
            n_rows = stability.rows.len(),
            n_excluded = stability.excluded.len()
        );

        let summary = RunSummary {
            n_labels: labels.len(),
            n_models: jobs.len(),
            n_ok: labels.values().map(|l| l.meta.n_ok).sum(),
            n_failed: labels.values().map(|l| l.meta.n_failed).sum(),
            n_skipped: labels.values().map(|l| l.meta.n_skipped).sum(),
            stability_status: stability.status,
        };

        log_event!(
            self.log,
            INFO,
            event_names::RUN_FINISHED,
            Stage::Output,
            "Evaluation run finished",
            n_ok = summary.n_ok,
            n_failed = summary.n_failed,
            n_skipped = summary.n_skipped
        );

        Ok(RunResult {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: self.run_id.clone(),
            generated_at: Utc::now(),
            config: self.snapshot.clone(),
            labels,
            stability,
            summary,
        })
    }
}

fn assemble_label<'a>(
    target_fpr: f64,
    models: BTreeMap<String, ModelResult>,
    inputs: impl Iterator<Item = (&'a String, &'a ModelInput)>,
) -> LabelResult {
    let mut meta = LabelMeta::default();
    for result in models.values() {
        match result.status {
            ModelStatus::Ok => meta.n_ok += 1,
            ModelStatus::Failed => meta.n_failed += 1,
            ModelStatus::Skipped => meta.n_skipped += 1,
        }
    }

    // Row counts come from models that actually supplied readable scores.
    let mut disagreements: Vec<String> = Vec::new();
    for (_, input) in inputs.filter(|(_, m)| m.effective_status() == InputStatus::Ok) {
        for (split, records) in &input.splits {
            let Ok(records) = records.records() else {
                continue;
            };
            match meta.row_counts_per_split.get(split).copied() {
                Some(seen) if seen != records.len() => {
                    if !disagreements.contains(split) {
                        disagreements.push(split.clone());
                    }
                    meta.row_counts_per_split
                        .insert(split.clone(), seen.max(records.len()));
                }
                Some(_) => {}
                None => {
                    meta.row_counts_per_split.insert(split.clone(), records.len());
                }
            }
        }
    }
    for split in disagreements {
        meta.notes.push(format!(
            "models disagree on row count for split '{}'; reporting the maximum",
            split
        ));
    }

    LabelResult {
        target_fpr,
        status: LabelStatus::from_counts(meta.n_ok, meta.n_failed),
        models,
        meta,
    }
}

/// Evaluate one (label, model). Never fails: errors land in the result.
pub fn evaluate_model(
    label: &str,
    model: &str,
    input: &ModelInput,
    target_fpr: f64,
    config: &RunConfig,
    log: &LogContext,
) -> ModelResult {
    match input.effective_status() {
        InputStatus::Skipped => {
            log_event!(
                log,
                DEBUG,
                event_names::MODEL_SKIPPED,
                Stage::Load,
                "Model skipped",
                label = label,
                model = model
            );
            return ModelResult::skipped(config.calibration_split.as_str());
        }
        InputStatus::Failed => {
            let reason = input
                .error
                .clone()
                .unwrap_or_else(|| "upstream status failed".to_string());
            log_event!(
                log,
                WARN,
                event_names::MODEL_FAILED,
                Stage::Load,
                "Model failed upstream",
                label = label,
                model = model,
                error = reason.as_str()
            );
            return ModelResult::failed(config.calibration_split.as_str(), reason, None);
        }
        InputStatus::Ok => {}
    }

    match try_evaluate_model(label, model, input, target_fpr, config, log) {
        Ok(result) => {
            log_event!(
                log,
                DEBUG,
                event_names::MODEL_FINISHED,
                Stage::Evaluate,
                "Model evaluated",
                label = label,
                model = model,
                threshold = tracing::field::debug(&result.threshold_for_fpr)
            );
            result
        }
        Err(err) => {
            let reason = err.to_string();
            log_event!(
                log,
                WARN,
                event_names::MODEL_FAILED,
                Stage::Evaluate,
                "Model evaluation failed",
                label = label,
                model = model,
                code = err.code(),
                error = reason.as_str()
            );
            ModelResult::failed(config.calibration_split.as_str(), reason, Some(err.code()))
        }
    }
}

fn try_evaluate_model(
    label: &str,
    model: &str,
    input: &ModelInput,
    target_fpr: f64,
    config: &RunConfig,
    log: &LogContext,
) -> Result<ModelResult> {
    log_event!(
        log,
        DEBUG,
        event_names::MODEL_STARTED,
        Stage::Calibrate,
        "Evaluating model",
        label = label,
        model = model,
        target_fpr = target_fpr
    );
    let calibration_split = config.calibration_split.as_str();
    let options = CalibrationOptions::new(target_fpr)
        .with_tolerance(config.fpr_tolerance)
        .with_table_size(config.threshold_table_size);

    let reference_records =
        input
            .splits
            .get(calibration_split)
            .ok_or_else(|| Error::MissingReferenceSplit {
                split: calibration_split.to_string(),
            })?;
    let reference = score_set(calibration_split, reference_records)?;
    if reference.is_empty() {
        return Err(Error::EmptySplit {
            split: calibration_split.to_string(),
        });
    }
    let calibration = calibrate(&reference, &options)
        .map_err(|e| Error::Calibration(format!("split '{}': {}", calibration_split, e)))?;
    let threshold = calibration.threshold;

    if calibration.best_effort {
        log_event!(
            log,
            WARN,
            event_names::CALIBRATE_BEST_EFFORT,
            Stage::Calibrate,
            "No threshold meets the FPR budget; using the highest score",
            label = label,
            model = model,
            target_fpr = target_fpr,
            threshold = threshold
        );
    } else {
        log_event!(
            log,
            DEBUG,
            event_names::CALIBRATE_SELECTED,
            Stage::Calibrate,
            "Threshold fixed",
            label = label,
            model = model,
            threshold = threshold,
            fpr = calibration.fpr
        );
    }

    let mut result = ModelResult::new(ModelStatus::Ok, calibration_split);
    result.threshold_for_fpr = finite(threshold);
    result.best_effort = calibration.best_effort;
    result.n_candidates = calibration.n_candidates;
    result.threshold_table_top3 = calibration.table;

    for split in &config.splits {
        let records = input
            .splits
            .get(split)
            .ok_or_else(|| Error::MissingSplit {
                split: split.clone(),
            })?;
        let set = score_set(split, records)?;
        let confusion = evaluate(&set, threshold);
        if !confusion.warnings.is_empty() {
            let warnings = format!("{:?}", confusion.warnings);
            log_event!(
                log,
                DEBUG,
                event_names::EVALUATE_SPLIT_WARNING,
                Stage::Evaluate,
                "Split metrics defaulted",
                label = label,
                model = model,
                split = split.as_str(),
                warnings = warnings.as_str()
            );
        }
        let split_result = SplitResult {
            rank: RankSummary::from(compute_rank_metrics(&set)),
            confusion,
            threshold_for_fpr: calibrate(&set, &options)
                .ok()
                .and_then(|c| finite(c.threshold)),
            slices: evaluate_slices(&set, threshold),
        };
        log_event!(
            log,
            DEBUG,
            event_names::EVALUATE_SPLIT_DONE,
            Stage::Evaluate,
            "Split evaluated",
            label = label,
            model = model,
            split = split.as_str(),
            recall = split_result.confusion.recall,
            fpr = split_result.confusion.fpr
        );
        result.per_split.insert(split.clone(), split_result);
    }

    if let Some(table) = &input.features {
        result.feature_kind = Some(table.kind);
        result.top_features = attribute(table, config.top_features_n)?;
    }

    Ok(result)
}

fn score_set(split: &str, records: &SplitRecords) -> Result<ScoreSet> {
    let records = records
        .records()
        .map_err(|reason| Error::Input(format!("split '{}': {}", split, reason)))?;
    ScoreSet::new(records.to_vec()).map_err(|e| Error::Input(format!("split '{}': {}", split, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::features::FeatureTable;
    use crate::eval::scoreset::ScoredRecord;

    fn config() -> RunConfig {
        RunConfig::default()
            .with_label("label_replicators", 0.34)
            .with_label("label_the_mule", 0.34)
    }

    fn full_model() -> ModelInput {
        ModelInput::new()
            .with_columns(
                "train",
                &[0.9, 0.8, 0.7, 0.6, 0.1],
                &[true, false, true, false, false],
            )
            .with_columns("time_eval", &[0.9, 0.5, 0.75, 0.2], &[true, true, false, false])
            .with_columns(
                "user_holdout",
                &[0.95, 0.72, 0.3, 0.1],
                &[true, true, false, false],
            )
    }

    fn ctx() -> LogContext {
        LogContext::new("dl-test", "host-test")
    }

    #[test]
    fn test_model_uses_calibration_threshold_everywhere() {
        let r = evaluate_model("l", "m", &full_model(), 0.34, &config(), &ctx());
        assert_eq!(r.status, ModelStatus::Ok);
        assert_eq!(r.threshold_for_fpr, Some(0.7));
        assert_eq!(r.per_split.len(), 3);
        for split in r.per_split.values() {
            assert_eq!(split.confusion.threshold_used, 0.7);
        }
        // time_eval: 0.9 caught, 0.5 missed.
        assert_eq!(r.per_split["time_eval"].confusion.recall, 0.5);
        assert_eq!(r.per_split["user_holdout"].confusion.recall, 1.0);
        assert_eq!(r.threshold_table_top3.len(), 3);
    }

    #[test]
    fn test_missing_reference_split() {
        let input = ModelInput::new().with_columns("time_eval", &[0.5], &[true]);
        let r = evaluate_model("l", "m", &input, 0.01, &config(), &ctx());
        assert_eq!(r.status, ModelStatus::Failed);
        assert_eq!(r.error_code, Some(31));
    }

    #[test]
    fn test_missing_evaluation_split() {
        let input = ModelInput::new()
            .with_columns("train", &[0.5, 0.2], &[true, false])
            .with_columns("user_holdout", &[0.5, 0.2], &[true, false]);
        let r = evaluate_model("l", "m", &input, 0.01, &config(), &ctx());
        assert_eq!(r.status, ModelStatus::Failed);
        assert_eq!(r.error_code, Some(41));
        assert!(r.error.unwrap().contains("time_eval"));
    }

    #[test]
    fn test_zero_negative_reference_is_calibration_error() {
        let input = full_model().with_columns("train", &[0.5, 0.2], &[true, true]);
        let r = evaluate_model("l", "m", &input, 0.01, &config(), &ctx());
        assert_eq!(r.error_code, Some(30));
    }

    #[test]
    fn test_empty_reference_is_input_error() {
        let input = full_model().with_split("train", Vec::new());
        let r = evaluate_model("l", "m", &input, 0.01, &config(), &ctx());
        assert_eq!(r.error_code, Some(21));
    }

    #[test]
    fn test_unreadable_split_fails_only_its_model() {
        let mut input = full_model();
        input.splits.insert(
            "train".to_string(),
            SplitRecords::Unparsed(serde_json::json!([{"score": null, "label": true}])),
        );
        let r = evaluate_model("l", "m", &input, 0.34, &config(), &ctx());
        assert_eq!(r.status, ModelStatus::Failed);
        assert_eq!(r.error_code, Some(20));
        assert!(r.error.unwrap().contains("split 'train'"));

        let mut input = full_model();
        input.splits.insert(
            "user_holdout".to_string(),
            SplitRecords::Unparsed(serde_json::json!("not a list")),
        );
        let r = evaluate_model("l", "m", &input, 0.34, &config(), &ctx());
        assert_eq!(r.error_code, Some(20));
    }

    #[test]
    fn test_slices_use_fixed_threshold() {
        let holdout = vec![
            ScoredRecord::new(0.95, true).with_slice("mfa_used:no"),
            ScoredRecord::new(0.72, true).with_slice("mfa_used:yes"),
            ScoredRecord::new(0.3, false).with_slice("mfa_used:yes"),
            ScoredRecord::new(0.1, false),
        ];
        let input = full_model().with_split("user_holdout", holdout);
        let r = evaluate_model("l", "m", &input, 0.34, &config(), &ctx());

        let slices = &r.per_split["user_holdout"].slices;
        assert_eq!(slices.len(), 2);
        assert_eq!(slices["mfa_used:yes"].confusion.threshold_used, 0.7);
        assert_eq!(slices["mfa_used:yes"].confusion.rows, 2);
        assert_eq!(slices["mfa_used:yes"].confusion.recall, 1.0);
        assert_eq!(
            slices["mfa_used:no"].rank.undefined,
            Some(crate::eval::UndefinedReason::NoNegatives)
        );
        assert!(r.per_split["train"].slices.is_empty());
    }

    #[test]
    fn test_upstream_failure_and_skip() {
        let failed = evaluate_model("l", "m", &ModelInput::failed("artifact missing"), 0.01, &config(), &ctx());
        assert_eq!(failed.status, ModelStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("artifact missing"));

        let skipped = evaluate_model("l", "m", &ModelInput::skipped(), 0.01, &config(), &ctx());
        assert_eq!(skipped.status, ModelStatus::Skipped);
    }

    #[test]
    fn test_features_attached() {
        let input = full_model().with_features(FeatureTable::signed([("a", -0.3), ("b", 0.1)]));
        let r = evaluate_model("l", "m", &input, 0.34, &config(), &ctx());
        assert_eq!(r.top_features.len(), 2);
        assert_eq!(r.top_features[0].feature, "a");
        assert_eq!(r.feature_kind, Some(crate::eval::FeatureKind::Signed));
    }

    #[test]
    fn test_missing_target_fpr_is_fatal() {
        let run = EvaluationRun::new(RunConfig::default().with_label("label_replicators", 0.01)).unwrap();
        let input = EvaluationInput::new()
            .with_model("label_replicators", "m", full_model())
            .with_model("label_unknown", "m", full_model());
        let err = run.execute(&input).unwrap_err();
        assert!(matches!(err, Error::MissingTargetFpr { ref label } if label == "label_unknown"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = EvaluationRun::new(RunConfig::default().with_label("x", 2.0)).unwrap_err();
        assert_eq!(err.code(), 10);
    }

    #[test]
    fn test_partial_failure_isolated() {
        let run = EvaluationRun::new(config()).unwrap();
        let input = EvaluationInput::new()
            .with_model("label_replicators", "good", full_model())
            .with_model("label_replicators", "bad", ModelInput::failed("load error"));
        let result = run.execute(&input).unwrap();
        let label = &result.labels["label_replicators"];
        assert_eq!(label.meta.n_ok, 1);
        assert_eq!(label.meta.n_failed, 1);
        assert_eq!(label.status, LabelStatus::Partial);
        assert!(result.is_partial());
        assert_eq!(result.stability.rows.len(), 1);
        assert_eq!(result.stability.excluded.len(), 1);
        // Configured but absent label is reported as empty.
        assert_eq!(result.labels["label_the_mule"].status, LabelStatus::Empty);
    }

    #[test]
    fn test_row_count_disagreement_noted() {
        let run = EvaluationRun::new(config()).unwrap();
        let other = full_model().with_columns("time_eval", &[0.9, 0.1], &[true, false]);
        let input = EvaluationInput::new()
            .with_model("label_replicators", "a", full_model())
            .with_model("label_replicators", "b", other);
        let result = run.execute(&input).unwrap();
        let meta = &result.labels["label_replicators"].meta;
        assert_eq!(meta.row_counts_per_split["time_eval"], 4);
        assert_eq!(meta.row_counts_per_split["train"], 5);
        assert_eq!(meta.notes.len(), 1);
    }

    #[test]
    fn test_workers_setting_does_not_change_result() {
        let input = EvaluationInput::new()
            .with_model("label_replicators", "a", full_model())
            .with_model("label_the_mule", "b", full_model());
        let serial = EvaluationRun::new(RunConfig {
            workers: Some(1),
            ..config()
        })
        .unwrap()
        .execute(&input)
        .unwrap();
        let parallel = EvaluationRun::new(RunConfig {
            workers: Some(4),
            ..config()
        })
        .unwrap()
        .execute(&input)
        .unwrap();
        assert_eq!(serial.labels, parallel.labels);
        assert_eq!(serial.stability, parallel.stability);
    }
}
