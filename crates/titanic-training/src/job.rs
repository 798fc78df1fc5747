use crate::error::{TrainingError, TrainingResult};
use crate::forest::ForestParams;
use crate::registry::ModelUri;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const TEST_SIZE: f64 = 0.2;
pub const TRAINING_EXPERIMENT: &str = "titanic_survival_prediction";
pub const EVALUATION_EXPERIMENT: &str = "titanic_survival_prediction_evaluation";
pub const REGISTERED_MODEL_NAME: &str = "titanic_rf_classifier";
pub const MODEL_ARTIFACT_PATH: &str = "random_forest_model";
pub const EVALUATION_RUN_NAME: &str = "evaluation";
pub const DEFAULT_DATA_PATH: &str = "data/processed";

/// Inputs of a training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingJobSpec {
    /// Directory holding (or receiving) `train_processed.csv`.
    pub data_path: PathBuf,
    pub raw_path: PathBuf,
    pub params: ForestParams,
    pub test_size: f64,
}

impl TrainingJobSpec {
    #[must_use]
    pub fn new(data_path: PathBuf, raw_path: PathBuf, params: ForestParams) -> Self {
        Self { data_path, raw_path, params, test_size: TEST_SIZE }
    }

    /// `RF_n<trees>_d<depth>`, shared by every run with the same configuration.
    #[must_use]
    pub fn run_name(&self) -> String {
        format!("RF_n{}_d{}", self.params.n_estimators, self.params.max_depth)
    }

    pub fn validate(&self) -> TrainingResult<()> {
        self.params.validate()?;
        validate_test_size(self.test_size)
    }
}

/// Inputs of an evaluation run.
#[derive(Debug, Clone)]
pub struct EvaluationJobSpec {
    pub model_uri: ModelUri,
    pub data_path: PathBuf,
    pub raw_path: PathBuf,
    pub random_state: u64,
    pub test_size: f64,
}

impl EvaluationJobSpec {
    #[must_use]
    pub fn new(model_uri: ModelUri, data_path: PathBuf, raw_path: PathBuf, random_state: u64) -> Self {
        Self { model_uri, data_path, raw_path, random_state, test_size: TEST_SIZE }
    }

    pub fn validate(&self) -> TrainingResult<()> {
        validate_test_size(self.test_size)
    }
}

fn validate_test_size(test_size: f64) -> TrainingResult<()> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(TrainingError::InvalidSpec(format!("test_size must be in (0, 1), got {test_size}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_name_encodes_trees_and_depth() {
        let spec = TrainingJobSpec::new(
            PathBuf::from(DEFAULT_DATA_PATH),
            PathBuf::from("data/raw/train.csv"),
            ForestParams { n_estimators: 10, max_depth: 3, random_state: 0 },
        );
        assert_eq!(spec.run_name(), "RF_n10_d3");
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_test_size() {
        let mut spec = TrainingJobSpec::new(PathBuf::new(), PathBuf::new(), ForestParams::default());
        spec.test_size = 1.5;
        assert!(spec.validate().is_err());
    }
}
