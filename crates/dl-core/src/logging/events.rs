//! Event vocabulary shared by every log line of a run.

use dl_common::RunId;
use serde::{Deserialize, Serialize};

/// Stages of an evaluation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup and configuration.
    Init,
    /// Reading the scores document.
    Load,
    /// Threshold selection on the calibration split.
    Calibrate,
    /// Applying the fixed threshold to every split.
    Evaluate,
    /// Holdout vs time comparison.
    Stability,
    Output,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Load => "load",
            Stage::Calibrate => "calibrate",
            Stage::Evaluate => "evaluate",
            Stage::Stability => "stability",
            Stage::Output => "output",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event names, used as tracing targets. Stable: downstream log queries key on them.
pub mod event_names {
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";

    pub const INPUT_LOADED: &str = "input.loaded";

    pub const MODEL_STARTED: &str = "model.started";
    pub const MODEL_FINISHED: &str = "model.finished";
    pub const MODEL_FAILED: &str = "model.failed";
    pub const MODEL_SKIPPED: &str = "model.skipped";

    pub const CALIBRATE_SELECTED: &str = "calibrate.selected";
    pub const CALIBRATE_BEST_EFFORT: &str = "calibrate.best_effort";

    pub const EVALUATE_SPLIT_DONE: &str = "evaluate.split_done";
    pub const EVALUATE_SPLIT_WARNING: &str = "evaluate.split_warning";

    pub const STABILITY_FINISHED: &str = "stability.finished";

    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_DEFAULT_USED: &str = "config.default_used";
    pub const CONFIG_ERROR: &str = "config.error";

    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// Correlation IDs attached to every event of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogContext {
    pub run_id: String,
    pub host_id: String,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            host_id: host_id.into(),
        }
    }

    /// Context for `run_id` on this host.
    pub fn for_run(run_id: &RunId) -> Self {
        Self::new(run_id.as_str(), super::get_host_id())
    }
}
