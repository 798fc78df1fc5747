use crate::dataset::{DatasetId, FEATURES};
use crate::error::{TrainingError, TrainingResult};
use crate::forest::{ForestParams, RandomForestClassifier};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

pub const MODEL_FILE: &str = "model.json";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Model,
}

/// A file inside a model artifact directory, relative to that directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub sha256: String,
}

/// Describes a persisted model and the data it was fitted on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub model_type: String,
    pub params: ForestParams,
    pub dataset_id: DatasetId,
    pub feature_names: Vec<String>,
    pub artifacts: Vec<ModelArtifact>,
}

pub(crate) fn write_json<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> TrainingResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> TrainingResult<T> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice::<T>(&bytes)?)
}

pub fn sha256_file(path: &Path) -> TrainingResult<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

pub fn make_artifact(kind: ArtifactKind, dir: &Path, file_name: &str) -> TrainingResult<ModelArtifact> {
    let path = dir.join(file_name);
    if !path.exists() {
        return Err(TrainingError::Artifact(format!("artifact path does not exist: {}", path.display())));
    }

    let hash = sha256_file(&path)?;
    Ok(ModelArtifact { kind, path: PathBuf::from(file_name), sha256: hash })
}

/// Write a fitted forest and its manifest into `dir`.
pub fn save_model(
    dir: &Path,
    run_id: &str,
    model: &RandomForestClassifier,
    dataset_id: &DatasetId,
) -> TrainingResult<ModelManifest> {
    if !model.is_fitted() {
        return Err(TrainingError::Artifact("refusing to save an unfitted model".to_string()));
    }
    std::fs::create_dir_all(dir)?;
    write_json(dir.join(MODEL_FILE), model)?;

    let manifest = ModelManifest {
        run_id: run_id.to_string(),
        created_at: Utc::now(),
        model_type: "RandomForest".to_string(),
        params: *model.params(),
        dataset_id: dataset_id.clone(),
        feature_names: FEATURES.iter().map(ToString::to_string).collect(),
        artifacts: vec![make_artifact(ArtifactKind::Model, dir, MODEL_FILE)?],
    };
    write_json(dir.join(MANIFEST_FILE), &manifest)?;
    Ok(manifest)
}

/// Read a model directory back, verifying the model hash and feature set.
pub fn load_model(dir: &Path) -> TrainingResult<(RandomForestClassifier, ModelManifest)> {
    let manifest_path = dir.join(MANIFEST_FILE);
    if !manifest_path.exists() {
        return Err(TrainingError::Artifact(format!("missing model manifest: {}", manifest_path.display())));
    }
    let manifest: ModelManifest = read_json(&manifest_path)?;

    if manifest.feature_names != FEATURES {
        return Err(TrainingError::Artifact(format!(
            "model expects features {:?}, this pipeline produces {:?}",
            manifest.feature_names, FEATURES
        )));
    }

    let entry = manifest
        .artifacts
        .iter()
        .find(|a| a.kind == ArtifactKind::Model)
        .ok_or_else(|| TrainingError::Artifact("no model artifact in manifest".to_string()))?;
    let model_path = dir.join(&entry.path);
    if !model_path.exists() {
        return Err(TrainingError::Artifact(format!("missing model file: {}", model_path.display())));
    }
    let actual = sha256_file(&model_path)?;
    if actual != entry.sha256 {
        return Err(TrainingError::Artifact(format!(
            "model file {} does not match its manifest digest",
            model_path.display()
        )));
    }

    let model: RandomForestClassifier = read_json(&model_path)?;
    if model.n_features() != FEATURES.len() {
        return Err(TrainingError::Artifact(format!(
            "model was fitted on {} features, expected {}",
            model.n_features(),
            FEATURES.len()
        )));
    }
    Ok((model, manifest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::FeatureRow;
    use tempfile::TempDir;

    fn fitted() -> RandomForestClassifier {
        let rows: Vec<FeatureRow> = (0..20)
            .map(|i| [f64::from(i % 3 + 1), f64::from(i % 2), 30.0, 0.0, 0.0, 10.0])
            .collect();
        let labels: Vec<u8> = (0..20).map(|i| u8::from(i % 2 == 1)).collect();
        let mut model = RandomForestClassifier::new(ForestParams { n_estimators: 3, max_depth: 2, random_state: 1 });
        model.fit(&rows, &labels).unwrap();
        model
    }

    #[test]
    fn test_save_then_load_verifies_digest() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("random_forest_model");
        let dataset_id = DatasetId("abc".to_string());

        let manifest = save_model(&dir, "run-1", &fitted(), &dataset_id).unwrap();
        assert_eq!(manifest.artifacts[0].sha256, sha256_file(&dir.join(MODEL_FILE)).unwrap());

        let (model, loaded) = load_model(&dir).unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(model, fitted());
    }

    #[test]
    fn test_tampered_model_is_rejected() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("m");
        save_model(&dir, "run-1", &fitted(), &DatasetId("abc".to_string())).unwrap();

        let mut other = RandomForestClassifier::new(ForestParams::default());
        other.fit(&[[1.0; 6], [2.0; 6]], &[0, 1]).unwrap();
        write_json(dir.join(MODEL_FILE), &other).unwrap();

        assert!(matches!(load_model(&dir), Err(TrainingError::Artifact(_))));
    }

    #[test]
    fn test_missing_manifest_is_rejected() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(load_model(temp.path()), Err(TrainingError::Artifact(_))));
    }
}
