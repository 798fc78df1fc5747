//! Training, evaluation and inference runs.

use crate::artifacts::save_model;
use crate::classifier::Classifier;
use crate::dataset::{clean_features, ensure_processed_dataset, load_raw_records};
use crate::error::TrainingResult;
use crate::forest::RandomForestClassifier;
use crate::job::{EvaluationJobSpec, TrainingJobSpec, EVALUATION_RUN_NAME, MODEL_ARTIFACT_PATH, REGISTERED_MODEL_NAME};
use crate::metrics::ClassificationMetrics;
use crate::registry::{ModelRegistry, ModelSelector, ModelUri};
use crate::split::stratified_split;
use crate::tracking::TrackingContext;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOutcome {
    pub run_id: String,
    pub metrics: ClassificationMetrics,
    pub model_version: u32,
    /// Registry URI of the version created by this run.
    pub model_uri: ModelUri,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationOutcome {
    pub run_id: String,
    pub metrics: ClassificationMetrics,
}

/// One inference result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: u8,
    /// Probability of survival.
    pub probability: f64,
}

/// Fit a forest on the processed dataset and record it as a tracked run.
///
/// The fitted model is stored as the run's `random_forest_model` artifact and
/// registered as the next version of `titanic_rf_classifier`. Any failure
/// after the run starts leaves it marked `FAILED`.
pub fn run_training(
    ctx: &TrackingContext,
    registry: &ModelRegistry,
    spec: &TrainingJobSpec,
) -> TrainingResult<TrainingOutcome> {
    spec.validate()?;
    let dataset = ensure_processed_dataset(&spec.data_path, &spec.raw_path)?;
    let split = stratified_split(&dataset.target, spec.test_size, spec.params.random_state)?;
    let (train_x, train_y) = dataset.subset(&split.train);
    let (test_x, test_y) = dataset.subset(&split.test);
    debug!(train = train_y.len(), test = test_y.len(), "split dataset");

    let run = ctx.start_run(&spec.run_name())?;
    run.log_param("n_estimators", spec.params.n_estimators)?;
    run.log_param("max_depth", spec.params.max_depth)?;
    run.log_param("random_state", spec.params.random_state)?;
    run.log_param("test_size", spec.test_size)?;

    let mut model = RandomForestClassifier::new(spec.params);
    model.fit(train_x.rows(), &train_y)?;

    let y_pred = model.predict(test_x.rows())?;
    let metrics = ClassificationMetrics::compute(&test_y, &y_pred)?;
    run.log_metrics(metrics.as_map())?;

    let artifact_dir = run.artifact_dir(MODEL_ARTIFACT_PATH)?;
    save_model(&artifact_dir, run.run_id(), &model, &dataset.dataset_id)?;

    run.set_tag("model_type", "RandomForest")?;
    run.set_tag("dataset", "Titanic")?;
    run.set_tag("dataset_id", &dataset.dataset_id)?;

    let version = registry.register_version(REGISTERED_MODEL_NAME, run.run_id(), MODEL_ARTIFACT_PATH)?;
    let info = run.finish()?;

    info!(
        run_id = %info.run_id,
        classifier = model.id(),
        accuracy = metrics.accuracy,
        f1_score = metrics.f1_score,
        version = version.version,
        "training run complete"
    );

    Ok(TrainingOutcome {
        run_id: info.run_id,
        metrics,
        model_version: version.version,
        model_uri: ModelUri::registry(REGISTERED_MODEL_NAME, ModelSelector::Version(version.version)),
    })
}

/// Score a persisted model on a fresh split of the processed dataset.
///
/// The split is drawn with `spec.random_state`, which need not match the seed
/// the model was trained with.
pub fn run_evaluation(
    ctx: &TrackingContext,
    registry: &ModelRegistry,
    spec: &EvaluationJobSpec,
) -> TrainingResult<EvaluationOutcome> {
    spec.validate()?;
    let dataset = ensure_processed_dataset(&spec.data_path, &spec.raw_path)?;
    let split = stratified_split(&dataset.target, spec.test_size, spec.random_state)?;
    let (test_x, test_y) = dataset.subset(&split.test);

    let run = ctx.start_run(EVALUATION_RUN_NAME)?;
    run.log_param("model_uri", &spec.model_uri)?;
    run.log_param("test_size", spec.test_size)?;
    run.log_param("random_state", spec.random_state)?;

    let (model, manifest) = registry.load_model(&spec.model_uri)?;
    run.set_tag("model_run_id", &manifest.run_id)?;

    let y_pred = model.predict(test_x.rows())?;
    let metrics = ClassificationMetrics::compute(&test_y, &y_pred)?;
    run.log_metrics(metrics.as_map())?;
    let info = run.finish()?;

    info!(run_id = %info.run_id, model_uri = %spec.model_uri, accuracy = metrics.accuracy, "evaluation run complete");
    Ok(EvaluationOutcome { run_id: info.run_id, metrics })
}

/// Predict survival for every row of a raw passenger CSV.
///
/// The `Survived` column is optional and ignored when present.
pub fn predict_raw(registry: &ModelRegistry, uri: &ModelUri, raw_path: &Path) -> TrainingResult<Vec<Prediction>> {
    let records = load_raw_records(raw_path, false)?;
    let features = clean_features(&records)?;
    let (model, _) = registry.load_model(uri)?;

    let proba = model.predict_proba(features.rows())?;
    info!(rows = proba.len(), model_uri = %uri, "predicted");
    Ok(proba
        .into_iter()
        .map(|probability| Prediction { label: u8::from(probability > 0.5), probability })
        .collect())
}

/// Write predictions as a `label,probability` CSV, creating parent directories.
pub fn write_predictions(path: &Path, predictions: &[Prediction]) -> TrainingResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for prediction in predictions {
        writer.serialize(prediction)?;
    }
    writer.flush()?;
    Ok(())
}
