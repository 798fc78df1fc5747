//! End-to-end: raw CSV → processed cache → tracked training run → registry → evaluation.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use titanic_training::job::{EVALUATION_EXPERIMENT, TRAINING_EXPERIMENT};
use titanic_training::{
    ensure_processed_dataset, load_registered_model, run_evaluation, run_training, EvaluationJobSpec,
    ForestParams, ModelRegistry, ModelSelector, ModelUri, RunStatus, TrackingContext, TrackingLayout,
    TrainingJobSpec,
};

// 6 survived / 4 not; rows 3 and 8 miss Age, row 6 misses Fare.
const RAW: &str = "\
PassengerId,Survived,Pclass,Name,Sex,Age,SibSp,Parch,Ticket,Fare,Cabin,Embarked
1,0,3,\"Braund, Mr. Owen Harris\",male,22,1,0,A/5 21171,7.25,,S
2,1,1,\"Cumings, Mrs. John Bradley\",female,38,1,0,PC 17599,71.2833,C85,C
3,1,3,\"Heikkinen, Miss. Laina\",female,,0,0,STON/O2. 3101282,7.925,,S
4,1,1,\"Futrelle, Mrs. Jacques Heath\",female,35,1,0,113803,53.1,C123,S
5,0,3,\"Allen, Mr. William Henry\",male,35,0,0,373450,8.05,,S
6,0,3,\"Moran, Mr. James\",male,54,0,0,330877,,,Q
7,1,2,\"Nasser, Mrs. Nicholas\",female,14,1,0,237736,30.0708,,C
8,0,1,\"McCarthy, Mr. Timothy J\",male,,0,0,17463,51.8625,E46,S
9,1,3,\"Johnson, Mrs. Oscar W\",female,27,0,2,347742,11.1333,,S
10,1,2,\"Sandstrom, Miss. Marguerite Rut\",female,4,1,1,PP 9549,16.7,G6,S
";

fn write_raw(dir: &Path) -> PathBuf {
    let path = dir.join("data").join("raw").join("train.csv");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, RAW).unwrap();
    path
}

#[test]
fn test_processed_cache_is_complete_and_stable() {
    let temp = TempDir::new().unwrap();
    let raw = write_raw(temp.path());
    let processing_dir = temp.path().join("data").join("processed");

    let dataset = ensure_processed_dataset(&processing_dir, &raw).unwrap();
    assert_eq!(dataset.len(), 10);
    assert_eq!(dataset.features.columns(), ["Pclass", "Sex", "Age", "SibSp", "Parch", "Fare"]);

    let ages = dataset.features.column("Age").unwrap();
    assert!(ages.iter().all(|a| a.is_finite()));
    // Known ages sorted: 4 14 22 27 35 35 38 54 → median 31.
    assert_eq!(ages[2], 31.0);
    assert_eq!(ages[7], 31.0);

    let sexes = dataset.features.column("Sex").unwrap();
    assert!(sexes.iter().all(|&s| s == 0.0 || s == 1.0));
    assert_eq!(dataset.target.iter().filter(|&&t| t == 1).count(), 6);

    let cache = processing_dir.join("train_processed.csv");
    let first = std::fs::read(&cache).unwrap();
    let again = ensure_processed_dataset(&processing_dir, &raw).unwrap();
    assert_eq!(std::fs::read(&cache).unwrap(), first);
    assert_eq!(again.dataset_id, dataset.dataset_id);
}

#[test]
fn test_train_register_load_and_evaluate() {
    let temp = TempDir::new().unwrap();
    let raw = write_raw(temp.path());
    let data_path = temp.path().join("data").join("processed");
    let root = temp.path().join("mlruns");

    let registry = ModelRegistry::new(TrackingLayout::new(root.clone()));
    let ctx = TrackingContext::open(&root, TRAINING_EXPERIMENT).unwrap();
    let spec = TrainingJobSpec::new(
        data_path.clone(),
        raw.clone(),
        ForestParams { n_estimators: 10, max_depth: 3, random_state: 0 },
    );

    let outcome = run_training(&ctx, &registry, &spec).unwrap();
    assert!((0.0..=1.0).contains(&outcome.metrics.accuracy));
    assert_eq!(ctx.get_run(&outcome.run_id).unwrap().info.status, RunStatus::Finished);

    let uri: ModelUri = "models:/titanic_rf_classifier/1".parse().unwrap();
    assert_eq!(uri, outcome.model_uri);
    let (model, manifest) = registry.load_model(&uri).unwrap();
    assert_eq!(model.trees().len(), 10);
    assert_eq!(manifest.run_id, outcome.run_id);

    let (_, latest) = load_registered_model(&registry, "titanic_rf_classifier", None).unwrap();
    assert_eq!(latest.run_id, outcome.run_id);
    assert!(load_registered_model(&registry, "titanic_rf_classifier", Some(ModelSelector::Version(2))).is_err());

    let eval_ctx = TrackingContext::open(&root, EVALUATION_EXPERIMENT).unwrap();
    let eval_spec = EvaluationJobSpec::new(uri, data_path, raw, 42);
    let evaluation = run_evaluation(&eval_ctx, &registry, &eval_spec).unwrap();
    assert!((0.0..=1.0).contains(&evaluation.metrics.f1_score));
    assert_eq!(eval_ctx.get_run(&evaluation.run_id).unwrap().info.run_name, "evaluation");
}

#[test]
fn test_missing_raw_file_is_reported() {
    let temp = TempDir::new().unwrap();
    let err = ensure_processed_dataset(&temp.path().join("processed"), &temp.path().join("train.csv")).unwrap_err();
    assert!(err.to_string().contains("train.csv"));
}
