//! Configuration validation errors and semantic validation.

use thiserror::Error;

use crate::run::RunConfig;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::MissingField(_) => 64,
            ValidationError::InvalidValue { .. } => 65,
            ValidationError::VersionMismatch { .. } => 66,
        }
    }
}

/// Validate a run configuration semantically.
pub fn validate_run_config(config: &RunConfig) -> ValidationResult<()> {
    if config.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    if config.splits.is_empty() {
        return Err(ValidationError::MissingField("splits".to_string()));
    }

    for (field, split) in [
        ("calibration_split", &config.calibration_split),
        ("primary_split", &config.primary_split),
        ("time_split", &config.time_split),
    ] {
        if split.is_empty() {
            return Err(ValidationError::MissingField(field.to_string()));
        }
        if !config.splits.iter().any(|s| s == split) {
            return Err(ValidationError::InvalidValue {
                field: field.to_string(),
                message: format!("'{}' is not listed in splits {:?}", split, config.splits),
            });
        }
    }

    if config.primary_split == config.time_split {
        return Err(ValidationError::InvalidValue {
            field: "time_split".to_string(),
            message: format!(
                "must differ from primary_split ('{}')",
                config.primary_split
            ),
        });
    }

    let mut seen = std::collections::BTreeSet::new();
    for split in &config.splits {
        if !seen.insert(split.as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "splits".to_string(),
                message: format!("duplicate split '{}'", split),
            });
        }
    }

    validate_positive_count("top_features_n", config.top_features_n)?;
    validate_positive_count("threshold_table_size", config.threshold_table_size)?;
    validate_positive_count("stability_top3_n", config.stability_top3_n)?;

    validate_unit_interval("stability_tolerance", config.stability_tolerance)?;
    validate_unit_interval("fpr_tolerance", config.fpr_tolerance)?;

    if let Some(0) = config.workers {
        return Err(ValidationError::InvalidValue {
            field: "workers".to_string(),
            message: "must be at least 1 when set".to_string(),
        });
    }

    for (name, label) in &config.labels {
        validate_unit_interval(&format!("labels.{}.target_fpr", name), label.target_fpr)?;
    }

    Ok(())
}

fn validate_positive_count(field: &str, value: usize) -> ValidationResult<()> {
    if value == 0 {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            message: "must be at least 1".to_string(),
        });
    }
    Ok(())
}

fn validate_unit_interval(field: &str, value: f64) -> ValidationResult<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            message: format!("Must be in [0, 1], got {}", value),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = RunConfig::default().with_label("label_replicators", 0.01);
        assert!(validate_run_config(&cfg).is_ok());
    }

    #[test]
    fn test_target_fpr_out_of_range() {
        let cfg = RunConfig::default().with_label("label_replicators", 1.5);
        let err = validate_run_config(&cfg).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidValue { ref field, .. } if field == "labels.label_replicators.target_fpr"
        ));
        assert_eq!(err.code(), 65);
    }

    #[test]
    fn test_nan_target_fpr_rejected() {
        let cfg = RunConfig::default().with_label("label_the_mule", f64::NAN);
        assert!(validate_run_config(&cfg).is_err());
    }

    #[test]
    fn test_calibration_split_must_be_listed() {
        let cfg = RunConfig {
            calibration_split: "validation".to_string(),
            ..RunConfig::default()
        };
        let err = validate_run_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("calibration_split"));
    }

    #[test]
    fn test_primary_and_time_must_differ() {
        let cfg = RunConfig {
            time_split: "user_holdout".to_string(),
            ..RunConfig::default()
        };
        assert!(validate_run_config(&cfg).is_err());
    }

    #[test]
    fn test_zero_top_features_rejected() {
        let cfg = RunConfig {
            top_features_n: 0,
            ..RunConfig::default()
        };
        let err = validate_run_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("top_features_n"));
    }

    #[test]
    fn test_version_mismatch() {
        let cfg = RunConfig {
            schema_version: "0.9.0".to_string(),
            ..RunConfig::default()
        };
        assert_eq!(
            validate_run_config(&cfg),
            Err(ValidationError::VersionMismatch {
                expected: "1.0.0".to_string(),
                actual: "0.9.0".to_string(),
            })
        );
    }

    #[test]
    fn test_duplicate_split_rejected() {
        let cfg = RunConfig {
            splits: vec![
                "train".to_string(),
                "time_eval".to_string(),
                "user_holdout".to_string(),
                "train".to_string(),
            ],
            ..RunConfig::default()
        };
        assert!(validate_run_config(&cfg).is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let cfg = RunConfig {
            workers: Some(0),
            ..RunConfig::default()
        };
        assert!(validate_run_config(&cfg).is_err());
    }
}
