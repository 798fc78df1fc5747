use crate::error::TrainingResult;
use std::path::{Path, PathBuf};

/// Filesystem layout of the local tracking store.
///
/// Default layout is under `mlruns/`:
/// - `<experiment_id>/<run_id>/{meta.json,params,metrics,tags,artifacts}`
/// - `models/<name>/version-<n>/meta.json`
#[derive(Debug, Clone)]
pub struct TrackingLayout {
    root: PathBuf,
}

pub const DEFAULT_TRACKING_ROOT: &str = "mlruns";
pub const META_FILE: &str = "meta.json";

impl TrackingLayout {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn experiment_dir(&self, experiment_id: &str) -> PathBuf {
        self.root.join(experiment_id)
    }

    #[must_use]
    pub fn experiment_meta_path(&self, experiment_id: &str) -> PathBuf {
        self.experiment_dir(experiment_id).join(META_FILE)
    }

    #[must_use]
    pub fn run_dir(&self, experiment_id: &str, run_id: &str) -> PathBuf {
        self.experiment_dir(experiment_id).join(run_id)
    }

    #[must_use]
    pub fn run_meta_path(&self, experiment_id: &str, run_id: &str) -> PathBuf {
        self.run_dir(experiment_id, run_id).join(META_FILE)
    }

    #[must_use]
    pub fn params_dir(&self, experiment_id: &str, run_id: &str) -> PathBuf {
        self.run_dir(experiment_id, run_id).join("params")
    }

    #[must_use]
    pub fn metrics_dir(&self, experiment_id: &str, run_id: &str) -> PathBuf {
        self.run_dir(experiment_id, run_id).join("metrics")
    }

    #[must_use]
    pub fn tags_dir(&self, experiment_id: &str, run_id: &str) -> PathBuf {
        self.run_dir(experiment_id, run_id).join("tags")
    }

    #[must_use]
    pub fn artifacts_dir(&self, experiment_id: &str, run_id: &str) -> PathBuf {
        self.run_dir(experiment_id, run_id).join("artifacts")
    }

    #[must_use]
    pub fn models_dir(&self) -> PathBuf {
        self.root.join("models")
    }

    #[must_use]
    pub fn registered_model_dir(&self, name: &str) -> PathBuf {
        self.models_dir().join(name)
    }

    #[must_use]
    pub fn model_version_dir(&self, name: &str, version: u32) -> PathBuf {
        self.registered_model_dir(name).join(format!("version-{version}"))
    }

    pub fn ensure_run_dirs(&self, experiment_id: &str, run_id: &str) -> TrainingResult<()> {
        std::fs::create_dir_all(self.params_dir(experiment_id, run_id))?;
        std::fs::create_dir_all(self.metrics_dir(experiment_id, run_id))?;
        std::fs::create_dir_all(self.tags_dir(experiment_id, run_id))?;
        std::fs::create_dir_all(self.artifacts_dir(experiment_id, run_id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let temp = TempDir::new().unwrap();
        let layout = TrackingLayout::new(temp.path().join(DEFAULT_TRACKING_ROOT));

        assert!(layout.run_dir("1", "abc").ends_with("mlruns/1/abc"));
        assert!(layout.model_version_dir("titanic_rf_classifier", 2).ends_with("models/titanic_rf_classifier/version-2"));

        layout.ensure_run_dirs("1", "abc").unwrap();
        assert!(layout.metrics_dir("1", "abc").is_dir());
        assert!(layout.artifacts_dir("1", "abc").is_dir());
    }
}
