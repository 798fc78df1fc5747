//! Titanic Training
//!
//! Pipeline primitives for the Titanic survival classifier:
//! - Cleaning the raw passenger CSV into a cached feature table (`dataset`)
//! - Stratified train/test splitting (`split`)
//! - A seeded random forest classifier (`forest`) and its metrics (`metrics`)
//! - A local file-backed run tracker (`tracking`) and model registry (`registry`)
//! - Training, evaluation and inference runs (`pipeline`)
//! - Run-store inspection helpers (`monitor`)

pub mod artifacts;
pub mod classifier;
pub mod config;
pub mod dataset;
pub mod error;
pub mod forest;
pub mod job;
pub mod layout;
pub mod metrics;
pub mod monitor;
pub mod pipeline;
pub mod registry;
pub mod split;
pub mod tracking;

pub use artifacts::{ArtifactKind, ModelArtifact, ModelManifest};
pub use classifier::Classifier;
pub use config::PipelineConfig;
pub use dataset::{
    clean_features, ensure_processed_dataset, prepare_dataset, DatasetId, FeatureRow, FeatureTable,
    ProcessedDataset, ProcessedRecord, RawRecord, FEATURES, PROCESSED_FILE_NAME, TARGET_COL,
};
pub use error::{TrainingError, TrainingResult};
pub use forest::{ForestParams, RandomForestClassifier};
pub use job::{EvaluationJobSpec, TrainingJobSpec};
pub use layout::TrackingLayout;
pub use metrics::ClassificationMetrics;
pub use monitor::{load_registered_model, write_run_tree};
pub use pipeline::{
    predict_raw, run_evaluation, run_training, write_predictions, EvaluationOutcome, Prediction, TrainingOutcome,
};
pub use registry::{ModelRegistry, ModelSelector, ModelStage, ModelUri, ModelVersion, RegisteredModel};
pub use split::{stratified_split, SplitIndices};
pub use tracking::{ActiveRun, RunInfo, RunStatus, TrackingContext};
